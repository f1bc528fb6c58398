//! One running bot.
//!
//! A [`Bot`] executes at most one instruction per call to [`Bot::step`].
//! It only ever mutates itself; anything that touches the grid (new bots,
//! messages, motion, death) comes back as an [`Effect`] for the scheduler
//! to apply. Reads of shared state go through the [`World`] trait.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::vec::Vec as StdVec;

use core::fmt;

use heapless::{Deque, Vec};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;
use tracing::trace;

use crate::builder::{Instruction, Operand, Program};
use crate::catalog::{Opcode, OperandKind};
use crate::config::SimulationConfig;
use crate::port::{PortError, SystemPort, READ_WINDOW};
use crate::{
    Coord, GeometryError, Name, Value, MAX_OPERANDS, MESSAGE_TTL_MAX, QUEUE_CAPACITY_MAX,
};

/// Upper bound on the effects one instruction can produce.
pub const MAX_EFFECTS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotId(pub u64);

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a message carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Value(Value),
    /// Kills the recipient instead of being queued.
    Kill,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BotFault {
    #[error("division by zero")]
    DivideByZero,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("cannot write to a {0} operand")]
    UnrecognisedDestination(OperandKind),
    #[error("cannot read a {0} operand here")]
    UnrecognisedSource(OperandKind),
    #[error("operand {position} of `{opcode}` is missing")]
    MissingOperand { opcode: Opcode, position: usize },
    #[error("no program called `{0}`")]
    UnknownProgram(Name),
    #[error("register r{register} does not exist, bots have {count}")]
    RegisterOutOfRange { register: usize, count: usize },
    #[error("`{0}` needs a system bot")]
    NotSystemBot(Opcode),
    #[error("read with an empty window, call avail first")]
    EmptyReadWindow,
    #[error("port: {0}")]
    Port(#[from] PortError),
    #[error("rotation plane axes must be perpendicular")]
    DegenerateRotation,
    #[error("program has no instructions")]
    EmptyProgram,
    #[error("instruction produced too many effects")]
    EffectOverflow,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeathCause {
    /// Ran `die`.
    Died,
    Fault(BotFault),
    /// Another bot was placed on its cell.
    Crushed,
    /// Received a kill message.
    Killed,
    /// No instruction left that could ever run.
    Deadlock,
    /// Ran `exec`.
    Replaced,
}

impl fmt::Display for DeathCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeathCause::Died => f.write_str("died"),
            DeathCause::Fault(fault) => write!(f, "fault: {fault}"),
            DeathCause::Crushed => f.write_str("crushed"),
            DeathCause::Killed => f.write_str("killed"),
            DeathCause::Deadlock => f.write_str("deadlocked"),
            DeathCause::Replaced => f.write_str("replaced"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotState {
    Ready,
    /// Blocked on `remaining` more queue values.
    AwaitingMessage { remaining: usize },
    Dead,
}

/// A request from a bot to the scheduler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Emit {
        at: Coord,
        velocity: Coord,
        payload: Payload,
        ttl: u32,
    },
    Spawn {
        program: Name,
        at: Coord,
        heading: Coord,
    },
    Fork {
        at: Coord,
        heading: Coord,
    },
    Exec {
        program: Name,
    },
    Move {
        to: Coord,
    },
    Die(DeathCause),
    /// Ask the host to end the process.
    Exit(i32),
}

pub type Effects = Vec<Effect, MAX_EFFECTS>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Nothing ran; the bot is waiting on its queue.
    Blocked,
    Executed(Effects),
}

/// What happened to a delivered payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reception {
    /// Went into the operand buffer of a blocked instruction.
    Resolved,
    Enqueued,
    /// Queue full.
    Dropped,
    /// The payload was a kill; the caller removes the bot.
    Killed,
}

/// Shared state a bot may look at while it runs.
pub trait World {
    fn dimensions(&self) -> usize;
    fn knows_program(&self, name: &str) -> bool;
    fn live_count(&self, name: &str) -> usize;
    /// The executing bot's byte stream, for system bots only.
    fn port(&mut self) -> Option<&mut SystemPort>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Pending {
    remaining: usize,
    values: Vec<Value, MAX_OPERANDS>,
}

/// A resolved source operand.
#[derive(Clone, Debug)]
enum Source {
    Value(Value),
    Vector(Coord),
    Name(Name),
    Target(usize),
}

enum Flow {
    Advance,
    Jumped,
    /// The bot is gone; skip the pointer update.
    Halted,
}

#[derive(Clone, Debug)]
pub struct Bot {
    id: BotId,
    program: Arc<Program>,
    position: Coord,
    heading: Coord,
    registers: StdVec<Value>,
    queue: Deque<Value, QUEUE_CAPACITY_MAX>,
    queue_capacity: usize,
    message_ttl: u32,
    instr_ptr: usize,
    flag: bool,
    alive: bool,
    executed_init: BTreeSet<usize>,
    pending: Option<Pending>,
    /// Set once the start-up skip scan has run.
    primed: bool,
    system: bool,
}

impl Bot {
    pub fn new(
        id: BotId,
        program: Arc<Program>,
        position: Coord,
        heading: Coord,
        config: &SimulationConfig,
    ) -> Self {
        let mut registers = StdVec::new();
        registers.resize(config.register_count, 0);
        Self {
            id,
            program,
            position,
            heading,
            registers,
            queue: Deque::new(),
            queue_capacity: config.queue_capacity.min(QUEUE_CAPACITY_MAX),
            message_ttl: config.message_ttl.min(MESSAGE_TTL_MAX),
            instr_ptr: 0,
            flag: false,
            alive: true,
            executed_init: BTreeSet::new(),
            pending: None,
            primed: false,
            system: false,
        }
    }

    pub(crate) fn set_system(&mut self, system: bool) {
        self.system = system;
    }

    pub(crate) fn set_position(&mut self, position: Coord) {
        self.position = position;
    }

    pub(crate) fn mark_dead(&mut self) {
        self.alive = false;
    }

    /// Copy for `fork`: everything but the id, position, heading and the
    /// queue contents.
    pub(crate) fn fork(&self, id: BotId, position: Coord, heading: Coord) -> Bot {
        let mut child = self.clone();
        child.id = id;
        child.position = position;
        child.heading = heading;
        child.queue.clear();
        child.pending = None;
        child
    }

    pub fn id(&self) -> BotId {
        self.id
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn name(&self) -> &str {
        self.program.name()
    }

    pub fn position(&self) -> &Coord {
        &self.position
    }

    pub fn heading(&self) -> &Coord {
        &self.heading
    }

    pub fn registers(&self) -> &[Value] {
        &self.registers
    }

    pub fn queue(&self) -> impl Iterator<Item = &Value> {
        self.queue.iter()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn message_ttl(&self) -> u32 {
        self.message_ttl
    }

    pub fn instr_ptr(&self) -> usize {
        self.instr_ptr
    }

    pub fn flag(&self) -> bool {
        self.flag
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn state(&self) -> BotState {
        if !self.alive {
            return BotState::Dead;
        }
        match &self.pending {
            Some(pending) if pending.remaining > 0 => BotState::AwaitingMessage {
                remaining: pending.remaining,
            },
            _ => BotState::Ready,
        }
    }

    /// Hands a delivered payload to the bot. A blocked bot takes values
    /// straight into its operand buffer; otherwise they are queued.
    pub fn receive(&mut self, payload: Payload) -> Reception {
        let value = match payload {
            Payload::Kill => return Reception::Killed,
            Payload::Value(value) => value,
        };
        if let Some(pending) = self.pending.as_mut() {
            if pending.remaining > 0 && pending.values.push(value).is_ok() {
                pending.remaining = pending.remaining.saturating_sub(1);
                return Reception::Resolved;
            }
        }
        if self.queue.len() < self.queue_capacity && self.queue.push_back(value).is_ok() {
            return Reception::Enqueued;
        }
        Reception::Dropped
    }

    /// Runs one instruction.
    pub fn step<W: World + ?Sized>(&mut self, world: &mut W) -> Result<Step, BotFault> {
        if !self.alive {
            return Ok(Step::Blocked);
        }
        if matches!(&self.pending, Some(pending) if pending.remaining > 0) {
            return Ok(Step::Blocked);
        }

        let mut effects = Effects::new();
        if !self.primed {
            if self.program.is_empty() {
                return Err(BotFault::EmptyProgram);
            }
            self.primed = true;
            if !self.skip_ineligible() {
                push(&mut effects, Effect::Die(DeathCause::Deadlock))?;
                return Ok(Step::Executed(effects));
            }
        }

        let program = Arc::clone(&self.program);
        let at = self.instr_ptr;
        let instruction = program.get(at).ok_or(BotFault::EmptyProgram)?;

        let demand = instruction.queue_demand();
        let values = match self.pending.take() {
            Some(pending) => pending.values,
            None => {
                let mut values = Vec::new();
                while values.len() < demand {
                    let Some(value) = self.queue.pop_front() else {
                        break;
                    };
                    if values.push(value).is_err() {
                        break;
                    }
                }
                values
            }
        };
        if values.len() < demand {
            let remaining = demand.saturating_sub(values.len());
            trace!(bot = %self.id, at, remaining, "awaiting message");
            self.pending = Some(Pending { remaining, values });
            return Ok(Step::Blocked);
        }

        let sources = self.resolve_sources(instruction, &values, world.dimensions())?;
        let flow = self.apply(instruction, &sources, world, &mut effects)?;

        if instruction.init_only {
            self.executed_init.insert(at);
        }

        match flow {
            Flow::Halted => return Ok(Step::Executed(effects)),
            Flow::Advance => self.instr_ptr = program.next_index(at),
            Flow::Jumped => {}
        }

        if !self.skip_ineligible() {
            push(&mut effects, Effect::Die(DeathCause::Deadlock))?;
        }
        Ok(Step::Executed(effects))
    }

    fn eligible(&self, index: usize) -> bool {
        match self.program.get(index) {
            Some(instruction) => {
                instruction.admits(self.flag)
                    && !(instruction.init_only && self.executed_init.contains(&index))
            }
            None => false,
        }
    }

    /// Moves the pointer forward to the next instruction allowed to run,
    /// wrapping around. False when a full lap finds nothing.
    fn skip_ineligible(&mut self) -> bool {
        let mut index = self.instr_ptr;
        for _ in 0..self.program.len() {
            if self.eligible(index) {
                self.instr_ptr = index;
                return true;
            }
            index = self.program.next_index(index);
        }
        false
    }

    fn resolve_sources(
        &self,
        instruction: &Instruction,
        values: &[Value],
        dimensions: usize,
    ) -> Result<Vec<Source, MAX_OPERANDS>, BotFault> {
        let mut queued = values.iter().copied();
        let mut sources = Vec::new();
        for operand in instruction.sources() {
            let source = match operand {
                Operand::Immediate(value) => Source::Value(*value),
                Operand::Register(register) => Source::Value(self.register(*register)?),
                Operand::Queue => Source::Value(queued.next().ok_or(BotFault::MissingOperand {
                    opcode: instruction.opcode,
                    position: sources.len(),
                })?),
                Operand::Axis(axis) => Source::Vector(axis.unit(dimensions)?),
                Operand::Heading => Source::Vector(self.heading.clone()),
                Operand::Label(label) => Source::Target(label.target),
                Operand::BotName(name) => Source::Name(name.clone()),
            };
            if sources.push(source).is_err() {
                break;
            }
        }
        Ok(sources)
    }

    fn register(&self, register: usize) -> Result<Value, BotFault> {
        self.registers
            .get(register)
            .copied()
            .ok_or(BotFault::RegisterOutOfRange {
                register,
                count: self.registers.len(),
            })
    }

    fn write<W: World + ?Sized>(
        &mut self,
        destination: &Operand,
        value: Value,
        world: &W,
        effects: &mut Effects,
    ) -> Result<(), BotFault> {
        let velocity = match destination {
            Operand::Register(register) => {
                let count = self.registers.len();
                let slot = self
                    .registers
                    .get_mut(*register)
                    .ok_or(BotFault::RegisterOutOfRange {
                        register: *register,
                        count,
                    })?;
                *slot = value;
                return Ok(());
            }
            Operand::Axis(axis) => axis.unit(world.dimensions())?,
            Operand::Heading => self.heading.clone(),
            other => return Err(BotFault::UnrecognisedDestination(other.kind())),
        };
        self.emit(velocity, Payload::Value(value), effects)
    }

    fn emit(&self, velocity: Coord, payload: Payload, effects: &mut Effects) -> Result<(), BotFault> {
        let at = self.position.offset(&velocity)?;
        push(
            effects,
            Effect::Emit {
                at,
                velocity,
                payload,
                ttl: self.message_ttl,
            },
        )
    }

    fn require_system(&self, opcode: Opcode) -> Result<(), BotFault> {
        if self.system {
            Ok(())
        } else {
            Err(BotFault::NotSystemBot(opcode))
        }
    }

    fn apply<W: World + ?Sized>(
        &mut self,
        instruction: &Instruction,
        sources: &[Source],
        world: &mut W,
        effects: &mut Effects,
    ) -> Result<Flow, BotFault> {
        let opcode = instruction.opcode;
        let mut destinations: Vec<&Operand, MAX_OPERANDS> = Vec::new();
        for destination in instruction.destinations() {
            if destinations.push(destination).is_err() {
                break;
            }
        }
        let first_destination = || {
            destinations.first().copied().ok_or(BotFault::MissingOperand {
                opcode,
                position: sources.len(),
            })
        };

        match opcode {
            Opcode::Nop => {}
            Opcode::Put => {
                let value = value_at(sources, 0, opcode)?;
                self.write(first_destination()?, value, world, effects)?;
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul => {
                let a = value_at(sources, 0, opcode)?;
                let b = value_at(sources, 1, opcode)?;
                let result = match opcode {
                    Opcode::Add => a.wrapping_add(b),
                    Opcode::Sub => a.wrapping_sub(b),
                    _ => a.wrapping_mul(b),
                };
                self.write(first_destination()?, result, world, effects)?;
            }
            Opcode::Div => {
                let (quotient, remainder) =
                    floored_div(value_at(sources, 0, opcode)?, value_at(sources, 1, opcode)?)?;
                self.write(first_destination()?, quotient, world, effects)?;
                if let Some(destination) = destinations.get(1).copied() {
                    self.write(destination, remainder, world, effects)?;
                }
            }
            Opcode::Mod => {
                let (_, remainder) =
                    floored_div(value_at(sources, 0, opcode)?, value_at(sources, 1, opcode)?)?;
                self.write(first_destination()?, remainder, world, effects)?;
            }
            Opcode::Not => {
                let destination = first_destination()?;
                let Operand::Register(register) = destination else {
                    return Err(BotFault::UnrecognisedDestination(destination.kind()));
                };
                let value = Value::from(self.register(*register)? == 0);
                self.write(destination, value, world, effects)?;
            }
            Opcode::Tgt | Opcode::Tlt | Opcode::Teq => {
                let a = value_at(sources, 0, opcode)?;
                let b = value_at(sources, 1, opcode)?;
                self.flag = match opcode {
                    Opcode::Tgt => a > b,
                    Opcode::Tlt => a < b,
                    _ => a == b,
                };
            }
            Opcode::Jmp => {
                let Some(Source::Target(target)) = sources.first() else {
                    return Err(BotFault::UnrecognisedSource(OperandKind::Label));
                };
                if *target >= self.program.len() {
                    return Err(BotFault::EmptyProgram);
                }
                self.instr_ptr = *target;
                return Ok(Flow::Jumped);
            }
            Opcode::Jmpr => {
                let offset = value_at(sources, 0, opcode)?;
                let len = Value::try_from(self.program.len()).map_err(|_| BotFault::Overflow)?;
                let here = Value::try_from(self.instr_ptr).map_err(|_| BotFault::Overflow)?;
                let target = here
                    .wrapping_add(offset)
                    .checked_rem_euclid(len)
                    .ok_or(BotFault::EmptyProgram)?;
                self.instr_ptr = usize::try_from(target).map_err(|_| BotFault::Overflow)?;
                return Ok(Flow::Jumped);
            }
            Opcode::Id => {
                let id = Value::try_from(self.id.0).map_err(|_| BotFault::Overflow)?;
                self.write(first_destination()?, id, world, effects)?;
            }
            Opcode::Count => {
                let name = name_at(sources, 0, opcode)?;
                if !world.knows_program(name) {
                    return Err(BotFault::UnknownProgram(name.clone()));
                }
                let count =
                    Value::try_from(world.live_count(name)).map_err(|_| BotFault::Overflow)?;
                self.write(first_destination()?, count, world, effects)?;
            }
            Opcode::Spawn => {
                let name = name_at(sources, 0, opcode)?;
                if !world.knows_program(name) {
                    return Err(BotFault::UnknownProgram(name.clone()));
                }
                let heading = vector_at(sources, 1, opcode)?;
                let at = self.position.offset(heading)?;
                push(
                    effects,
                    Effect::Spawn {
                        program: name.clone(),
                        at,
                        heading: heading.clone(),
                    },
                )?;
            }
            Opcode::Exec => {
                let name = name_at(sources, 0, opcode)?;
                if !world.knows_program(name) {
                    return Err(BotFault::UnknownProgram(name.clone()));
                }
                push(effects, Effect::Exec { program: name.clone() })?;
                return Ok(Flow::Halted);
            }
            Opcode::Fork => {
                let heading = vector_at(sources, 0, opcode)?;
                let at = self.position.offset(heading)?;
                push(
                    effects,
                    Effect::Fork {
                        at,
                        heading: heading.clone(),
                    },
                )?;
            }
            Opcode::Kill => {
                let velocity = vector_at(sources, 0, opcode)?.clone();
                self.emit(velocity, Payload::Kill, effects)?;
            }
            Opcode::Die => {
                push(effects, Effect::Die(DeathCause::Died))?;
                return Ok(Flow::Halted);
            }
            Opcode::Move => {
                let to = self.position.offset(&self.heading)?;
                push(effects, Effect::Move { to })?;
            }
            Opcode::Flip => self.heading = self.heading.negated(),
            Opcode::Face => self.heading = vector_at(sources, 0, opcode)?.clone(),
            Opcode::Rcw | Opcode::Rccw => {
                let a = vector_at(sources, 0, opcode)?;
                let b = vector_at(sources, 1, opcode)?;
                self.heading = rotate(&self.heading, a, b, opcode == Opcode::Rccw)?;
            }
            Opcode::Qmax => {
                let capacity = value_at(sources, 0, opcode)?.clamp(0, QUEUE_CAPACITY_MAX as Value);
                self.queue_capacity = usize::try_from(capacity).map_err(|_| BotFault::Overflow)?;
            }
            Opcode::Ttl => {
                let ttl = value_at(sources, 0, opcode)?.clamp(0, Value::from(MESSAGE_TTL_MAX));
                self.message_ttl = u32::try_from(ttl).map_err(|_| BotFault::Overflow)?;
            }
            Opcode::Avail => {
                self.require_system(opcode)?;
                let wanted = value_at(sources, 0, opcode)?.clamp(0, READ_WINDOW as Value);
                let wanted = usize::try_from(wanted).map_err(|_| BotFault::Overflow)?;
                let port = world.port().ok_or(BotFault::NotSystemBot(opcode))?;
                let available = port.probe(wanted)?;
                let available = Value::try_from(available).map_err(|_| BotFault::Overflow)?;
                self.write(first_destination()?, available, world, effects)?;
            }
            Opcode::Getb => {
                self.require_system(opcode)?;
                let port = world.port().ok_or(BotFault::NotSystemBot(opcode))?;
                let byte = port.take_byte().ok_or(BotFault::EmptyReadWindow)?;
                self.write(first_destination()?, Value::from(byte), world, effects)?;
            }
            Opcode::Putb => {
                self.require_system(opcode)?;
                let [low, ..] = value_at(sources, 0, opcode)?.to_le_bytes();
                let port = world.port().ok_or(BotFault::NotSystemBot(opcode))?;
                port.write_byte(low)?;
            }
            Opcode::Exit => {
                self.require_system(opcode)?;
                let code = value_at(sources, 0, opcode)?;
                let code = i32::try_from(code)
                    .unwrap_or(if code < 0 { i32::MIN } else { i32::MAX });
                push(effects, Effect::Exit(code))?;
            }
        }
        Ok(Flow::Advance)
    }
}

fn push(effects: &mut Effects, effect: Effect) -> Result<(), BotFault> {
    effects.push(effect).map_err(|_| BotFault::EffectOverflow)
}

fn value_at(sources: &[Source], index: usize, opcode: Opcode) -> Result<Value, BotFault> {
    match sources.get(index) {
        Some(Source::Value(value)) => Ok(*value),
        Some(Source::Vector(_)) => Err(BotFault::UnrecognisedSource(OperandKind::Direction)),
        Some(Source::Name(_)) => Err(BotFault::UnrecognisedSource(OperandKind::BotName)),
        Some(Source::Target(_)) => Err(BotFault::UnrecognisedSource(OperandKind::Label)),
        None => Err(BotFault::MissingOperand {
            opcode,
            position: index,
        }),
    }
}

fn vector_at(sources: &[Source], index: usize, opcode: Opcode) -> Result<&Coord, BotFault> {
    match sources.get(index) {
        Some(Source::Vector(vector)) => Ok(vector),
        Some(_) => Err(BotFault::UnrecognisedSource(OperandKind::Direction)),
        None => Err(BotFault::MissingOperand {
            opcode,
            position: index,
        }),
    }
}

fn name_at(sources: &[Source], index: usize, opcode: Opcode) -> Result<&Name, BotFault> {
    match sources.get(index) {
        Some(Source::Name(name)) => Ok(name),
        Some(_) => Err(BotFault::UnrecognisedSource(OperandKind::BotName)),
        None => Err(BotFault::MissingOperand {
            opcode,
            position: index,
        }),
    }
}

/// Quotient rounds toward negative infinity; the remainder takes the
/// divisor's sign.
fn floored_div(a: Value, b: Value) -> Result<(Value, Value), BotFault> {
    if b == 0 {
        return Err(BotFault::DivideByZero);
    }
    let quotient = a.checked_div(b).ok_or(BotFault::Overflow)?;
    let remainder = a.checked_rem(b).ok_or(BotFault::Overflow)?;
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        Ok((quotient.wrapping_sub(1), remainder.wrapping_add(b)))
    } else {
        Ok((quotient, remainder))
    }
}

/// Quarter turn of `heading` in the plane spanned by `a` and `b`.
/// Counter-clockwise takes `a` to `b` and `b` to `-a`; clockwise is the
/// inverse. Components outside the plane are untouched.
fn rotate(heading: &Coord, a: &Coord, b: &Coord, counter_clockwise: bool) -> Result<Coord, BotFault> {
    if a.dot(b)? != 0 {
        return Err(BotFault::DegenerateRotation);
    }
    let along_a = heading.dot(a)?;
    let along_b = heading.dot(b)?;
    let flat = heading
        .add_scaled(a, along_a.wrapping_neg())?
        .add_scaled(b, along_b.wrapping_neg())?;
    let turned = if counter_clockwise {
        flat.add_scaled(b, along_a)?.add_scaled(a, along_b.wrapping_neg())?
    } else {
        flat.add_scaled(b, along_a.wrapping_neg())?.add_scaled(a, along_b)?
    };
    Ok(turned)
}

#[cfg(test)]
mod test;
