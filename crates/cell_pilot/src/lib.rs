#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]

//! Host side driver for the cell bot machine.
//!
//! Loads and compiles program directories, builds a [`Simulation`] from a
//! configuration, binds a system bot to the process's standard streams and
//! steps the simulation, producing a [`TickSummary`] per tick.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use cell_machine::{
    ConfigError, Coord, GeometryError, ReadSource, Simulation, SimulationConfig, SimulationError,
    SystemPort, TickReport, WriteSink,
};
use thiserror_no_std::Error;
use tracing::info;

pub mod library;
pub mod summary;

pub use library::{CompileFailure, ProgramLibrary};
pub use summary::{BotSummary, DeathSummary, TickSummary};

#[derive(Error, Debug)]
pub enum PilotError {
    #[error("i/o: {0}")]
    Io(#[from] io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("no compiled program called `{0}`")]
    UnknownEntry(String),
}

/// Reads a JSON configuration. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<SimulationConfig, PilotError> {
    let text = fs::read_to_string(path)?;
    let config: SimulationConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

/// A port reading the process's stdin and writing its stdout.
pub fn stdio_port() -> SystemPort {
    SystemPort::new(
        Box::new(ReadSource(io::stdin())),
        Box::new(WriteSink(io::stdout())),
    )
}

/// Where and how the first bot is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub program: String,
    pub coords: Vec<cell_machine::Value>,
    /// Bind the bot to the host's byte streams.
    pub system: bool,
}

/// Where the host writes its own text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Console {
    Stdout,
    /// Used when a system bot owns stdout.
    Stderr,
}

impl Console {
    pub fn for_entry(entry: &Entry) -> Self {
        if entry.system {
            Console::Stderr
        } else {
            Console::Stdout
        }
    }

    pub fn writer(self) -> Box<dyn Write> {
        match self {
            Console::Stdout => Box::new(io::stdout()),
            Console::Stderr => Box::new(io::stderr()),
        }
    }
}

pub struct Pilot {
    simulation: Simulation,
}

impl Pilot {
    /// Builds a simulation holding every program in `library`.
    pub fn new(config: SimulationConfig, library: ProgramLibrary) -> Result<Self, PilotError> {
        let mut simulation = Simulation::new(config)?;
        for program in library.into_programs() {
            simulation.add_program(program);
        }
        Ok(Self { simulation })
    }

    /// Places the entry bot. A system entry gets `port`, or the process's
    /// standard streams when `port` is `None`.
    pub fn place_entry(&mut self, entry: &Entry, port: Option<SystemPort>) -> Result<(), PilotError> {
        if self.simulation.program(&entry.program).is_none() {
            return Err(PilotError::UnknownEntry(entry.program.clone()));
        }
        let coords = if entry.coords.is_empty() {
            Coord::origin(self.simulation.config().dimensions)?
        } else {
            Coord::from_slice(&entry.coords)?
        };
        let id = if entry.system {
            let port = port.unwrap_or_else(stdio_port);
            self.simulation
                .register_system_bot(&entry.program, coords.clone(), port)?
        } else {
            self.simulation.register_bot(&entry.program, coords.clone())?
        };
        info!(bot = %id, program = %entry.program, at = %coords, system = entry.system, "entry placed");
        Ok(())
    }

    pub fn step(&mut self) -> (TickReport, TickSummary) {
        let report = self.simulation.tick();
        (report, TickSummary::capture(&self.simulation))
    }

    pub fn summary(&self) -> TickSummary {
        TickSummary::capture(&self.simulation)
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }
}
