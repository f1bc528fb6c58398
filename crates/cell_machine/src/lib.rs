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
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

//! This crate implements the cell bot machine.
//!
//! Cell bots are small register-machine programs that run side by side on
//! an unbounded N dimensional integer grid. A bot owns a handful of
//! registers, a bounded FIFO of received values, a heading and a single
//! comparison flag. Bots talk to each other by firing messages that travel
//! one cell per tick in a straight line, and they can spawn, replace or
//! crush one another.
//!
//! The pieces, leaves first:
//!
//! * [`catalog`] the opcode table shared by the assembler and the VM.
//! * [`assembler`] turns source lines into an immutable [`builder::Program`].
//! * [`bot`] the per-instance state machine that executes one instruction
//!   per tick and reports what it wants done to the world as effects.
//! * [`transport`] moves in-flight messages and hands them to bots.
//! * [`scheduler`] owns the grid and runs ticks in a fixed order.
//!
//! Everything is single threaded and deterministic: the same programs
//! registered in the same order always produce the same trace.

use core::fmt;

use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

pub mod assembler;
pub mod bot;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod port;
pub mod scheduler;
pub mod transport;


pub use assembler::{
    assemble, Assembler, AssemblerError, AssemblerErrorKind, AssemblerOptions, Diagnostic,
};
pub use bot::{Bot, BotFault, BotId, BotState, DeathCause, Effect, Payload, Reception, Step, World};
pub use builder::{Instruction, Operand, Program};
pub use catalog::{Opcode, OperandKind, Role};
pub use config::{ConfigError, SimulationConfig};
pub use port::{ByteSink, ByteSource, NoInput, NoOutput, PortError, ReadSource, SystemPort, WriteSink};
pub use scheduler::{RunOutcome, Simulation, SimulationError, TickReport};
pub use transport::{Message, MessageId, Recipients, Transport};

/// Every register, immediate and message payload is one of these.
pub type Value = i64;

/// Direction tokens carry a single digit so ten axes is the ceiling.
pub const MAX_DIMENSIONS: usize = 10;
/// Widest operand list in the catalog.
pub const MAX_OPERANDS: usize = 4;
pub const NAME_CAP: usize = 64;
/// Hard ceiling for `qmax`, and the size of the queue storage.
pub const QUEUE_CAPACITY_MAX: usize = 255;
pub const MESSAGE_TTL_MAX: u32 = 255;

/// Program and label names.
pub type Name = heapless::String<NAME_CAP>;

pub(crate) fn to_name(name: &str) -> Option<Name> {
    let mut out = Name::new();
    out.push_str(name).ok()?;
    Some(out)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("expected a {expected} dimensional vector, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("{0} dimensions exceeds the supported maximum")]
    TooManyDimensions(usize),
    #[error("axis D{axis} does not exist in a {dimensions} dimensional grid")]
    AxisOutOfRange { axis: u8, dimensions: usize },
}

/// A grid position or a velocity; the two share a representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coord(Vec<Value, MAX_DIMENSIONS>);

impl Coord {
    pub fn origin(dimensions: usize) -> Result<Self, GeometryError> {
        let mut components = Vec::new();
        for _ in 0..dimensions {
            components
                .push(0)
                .map_err(|_| GeometryError::TooManyDimensions(dimensions))?;
        }
        Ok(Self(components))
    }

    pub fn from_slice(components: &[Value]) -> Result<Self, GeometryError> {
        let components = Vec::from_slice(components)
            .map_err(|_| GeometryError::TooManyDimensions(components.len()))?;
        Ok(Self(components))
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[Value] {
        self.0.as_slice()
    }

    /// Component-wise sum. Positions wrap at the edges of `Value`.
    pub fn offset(&self, by: &Coord) -> Result<Coord, GeometryError> {
        self.check_dimensions(by)?;
        let mut out = self.clone();
        for (component, delta) in out.0.iter_mut().zip(by.0.iter()) {
            *component = component.wrapping_add(*delta);
        }
        Ok(out)
    }

    pub fn negated(&self) -> Coord {
        let mut out = self.clone();
        for component in out.0.iter_mut() {
            *component = component.wrapping_neg();
        }
        out
    }

    pub fn dot(&self, other: &Coord) -> Result<Value, GeometryError> {
        self.check_dimensions(other)?;
        Ok(self
            .0
            .iter()
            .zip(other.0.iter())
            .fold(0, |acc: Value, (a, b)| acc.wrapping_add(a.wrapping_mul(*b))))
    }

    /// `self + scale * by`, used by heading rotation.
    pub(crate) fn add_scaled(&self, by: &Coord, scale: Value) -> Result<Coord, GeometryError> {
        self.check_dimensions(by)?;
        let mut out = self.clone();
        for (component, delta) in out.0.iter_mut().zip(by.0.iter()) {
            *component = component.wrapping_add(delta.wrapping_mul(scale));
        }
        Ok(out)
    }

    fn check_dimensions(&self, other: &Coord) -> Result<(), GeometryError> {
        if self.0.len() != other.0.len() {
            return Err(GeometryError::DimensionMismatch {
                expected: self.0.len(),
                found: other.0.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (index, component) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{component}")?;
        }
        write!(f, ")")
    }
}

/// One signed grid axis, written `D<n>+`/`D<n>-` or `X+`..`Z-` in source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Axis {
    pub dimension: u8,
    pub negative: bool,
}

impl Axis {
    pub fn new(dimension: u8, negative: bool) -> Self {
        Self { dimension, negative }
    }

    /// The unit vector along this axis in a grid of `dimensions` axes.
    pub fn unit(&self, dimensions: usize) -> Result<Coord, GeometryError> {
        let mut out = Coord::origin(dimensions)?;
        let slot = out
            .0
            .get_mut(usize::from(self.dimension))
            .ok_or(GeometryError::AxisOutOfRange {
                axis: self.dimension,
                dimensions,
            })?;
        *slot = if self.negative { -1 } else { 1 };
        Ok(out)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.negative { '-' } else { '+' };
        write!(f, "D{}{}", self.dimension, sign)
    }
}

#[cfg(test)]
mod test;
