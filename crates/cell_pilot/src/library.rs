use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cell_machine::{assemble, AssemblerOptions, Diagnostic, Program};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::PilotError;

/// Extension of program source files.
pub const SOURCE_EXTENSION: &str = "cell";

/// A program that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileFailure {
    pub file: PathBuf,
    pub program: String,
    pub diagnostic: Diagnostic,
}

impl core::fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "error while compiling {}:", self.file.display())?;
        write!(f, "{}", self.diagnostic)
    }
}

/// Every program compiled from one directory, plus the ones that failed.
#[derive(Debug, Default)]
pub struct ProgramLibrary {
    programs: Vec<Program>,
    failures: Vec<CompileFailure>,
}

impl ProgramLibrary {
    /// Compiles each `*.cell` file in `dir`, in file name order. A program
    /// is named after its file stem. A file that fails to compile is
    /// recorded and the rest are still compiled.
    pub fn load_dir(dir: &Path, options: AssemblerOptions) -> Result<Self, PilotError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();

        let mut library = Self::default();
        for path in files {
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                warn!(file = %path.display(), "skipping file with a non utf-8 name");
                continue;
            };
            let name = name.to_string();
            let source = fs::read_to_string(&path)?;
            library.add_source(&name, &path, &source, options);
        }
        info!(
            dir = %dir.display(),
            compiled = library.programs.len(),
            failed = library.failures.len(),
            "programs loaded"
        );
        Ok(library)
    }

    /// Compiles one source text, keeping the program or the failure.
    pub fn add_source(&mut self, name: &str, file: &Path, source: &str, options: AssemblerOptions) {
        debug!(program = name, file = %file.display(), "compiling");
        match assemble(name, source.lines(), options) {
            Ok(program) => self.programs.push(program),
            Err(err) => {
                let failure = CompileFailure {
                    file: file.to_path_buf(),
                    program: name.to_string(),
                    diagnostic: err.diagnostic(),
                };
                warn!(program = name, error = %err, "compile failed");
                self.failures.push(failure);
            }
        }
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    pub fn failures(&self) -> &[CompileFailure] {
        &self.failures
    }

    /// Writes one line per compiled program and every diagnostic.
    pub fn report(&self, out: &mut dyn Write) -> io::Result<()> {
        for program in &self.programs {
            writeln!(out, "compiled {} successfully.", program.name())?;
        }
        for failure in &self.failures {
            writeln!(out, "{failure}")?;
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_programs(self) -> Vec<Program> {
        self.programs
    }
}
