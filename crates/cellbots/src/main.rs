//! cellbots - compile and run cell bot programs
//!
//! `cellbots check <dir>` compiles every program in a directory and reports
//! the errors. `cellbots run <dir>` compiles them, places the entry bot and
//! ticks the simulation until every bot is gone, a system bot exits, or the
//! tick limit is reached.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cell_machine::{SimulationConfig, TickReport};
use cell_pilot::{load_config, Console, Entry, Pilot, PilotError, ProgramLibrary, TickSummary};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cellbots")]
#[command(about = "Compile and run cell bot programs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile every program in a directory and report errors
    Check {
        /// Directory of `.cell` sources
        #[arg(default_value = "bots")]
        dir: PathBuf,

        #[command(flatten)]
        settings: Settings,
    },
    /// Compile a directory and run the entry bot
    Run {
        /// Directory of `.cell` sources
        #[arg(default_value = "bots")]
        dir: PathBuf,

        /// Program of the first bot
        #[arg(long, default_value = "count_to_ten")]
        entry: String,

        /// Coordinates of the first bot, comma separated
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        at: Vec<i64>,

        /// Bind the first bot to stdin and stdout
        #[arg(long)]
        system: bool,

        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Wait for Enter between ticks
        #[arg(long, conflicts_with = "system")]
        step: bool,

        /// Print a summary after every tick
        #[arg(long)]
        trace: bool,

        /// Print summaries as JSON lines
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        settings: Settings,
    },
}

#[derive(Args, Debug)]
struct Settings {
    /// JSON simulation configuration
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    dimensions: Option<usize>,

    #[arg(long)]
    registers: Option<usize>,

    #[arg(long)]
    queue_capacity: Option<usize>,

    #[arg(long)]
    message_ttl: Option<u32>,
}

impl Settings {
    fn resolve(&self) -> Result<SimulationConfig, PilotError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(dimensions) = self.dimensions {
            config.dimensions = dimensions;
        }
        if let Some(registers) = self.registers {
            config.register_count = registers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(ttl) = self.message_ttl {
            config.message_ttl = ttl;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    // stdout belongs to system bots, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cellbots=info,cell_pilot=info,cell_machine=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Check { dir, settings } => check(dir, &settings),
        Command::Run {
            dir,
            entry,
            at,
            system,
            max_ticks,
            step,
            trace,
            json,
            settings,
        } => run(
            dir,
            Entry {
                program: entry,
                coords: at,
                system,
            },
            RunOptions {
                max_ticks,
                step,
                trace,
                json,
            },
            &settings,
        ),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn load(dir: &Path, config: &SimulationConfig, console: Console) -> Result<ProgramLibrary, PilotError> {
    info!("Loading programs from: {}", dir.display());
    let library = ProgramLibrary::load_dir(dir, config.assembler_options())?;
    library.report(&mut *console.writer())?;
    Ok(library)
}

fn check(dir: PathBuf, settings: &Settings) -> Result<ExitCode, PilotError> {
    let config = settings.resolve()?;
    let library = load(&dir, &config, Console::Stdout)?;
    if library.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

struct RunOptions {
    max_ticks: Option<u64>,
    step: bool,
    trace: bool,
    json: bool,
}

fn run(
    dir: PathBuf,
    entry: Entry,
    options: RunOptions,
    settings: &Settings,
) -> Result<ExitCode, PilotError> {
    let console = Console::for_entry(&entry);
    let config = settings.resolve()?;
    let library = load(&dir, &config, console)?;
    let mut pilot = Pilot::new(config, library)?;
    pilot.place_entry(&entry, None)?;

    let show = options.trace || options.step;
    if show {
        print_summary(&pilot.summary(), options.json, console)?;
    }

    let stdin = io::stdin();
    let mut ticks = 0u64;
    loop {
        if options.max_ticks.is_some_and(|limit| ticks >= limit) {
            info!(ticks, "tick limit reached");
            return Ok(ExitCode::SUCCESS);
        }
        if options.step {
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                return Ok(ExitCode::SUCCESS);
            }
        }

        let (report, summary) = pilot.step();
        ticks = ticks.saturating_add(1);
        if show {
            print_summary(&summary, options.json, console)?;
        }

        match report {
            TickReport::Running => {}
            TickReport::Extinct => {
                info!(ticks, "all bots are gone");
                return Ok(ExitCode::SUCCESS);
            }
            TickReport::Exit(code) => {
                info!(ticks, code, "exit requested by a system bot");
                io::stdout().flush()?;
                std::process::exit(code);
            }
        }
    }
}

fn print_summary(summary: &TickSummary, json: bool, console: Console) -> Result<(), PilotError> {
    let mut out = console.writer();
    if json {
        writeln!(out, "{}", summary.to_json()?)?;
    } else {
        write!(out, "{summary}")?;
    }
    out.flush()?;
    Ok(())
}
