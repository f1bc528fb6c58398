//! The simulation: grid, bots, messages and the tick loop.
//!
//! The scheduler owns every bot in an id-keyed arena. The grid only maps
//! coordinates to ids. Ids are handed out in increasing order, so walking
//! the arena visits bots oldest first, which is the turn order.
//!
//! A tick runs the message transport to completion, then gives one step to
//! every bot that is still alive, applying each bot's effects before the
//! next bot runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::vec::Vec as StdVec;

use thiserror_no_std::Error;
use tracing::{debug, info, trace, warn};

use crate::assembler::{assemble, AssemblerError};
use crate::bot::{Bot, BotFault, BotId, DeathCause, Effect, Payload, Reception, Step, World};
use crate::builder::Program;
use crate::config::{ConfigError, SimulationConfig};
use crate::port::SystemPort;
use crate::transport::{Message, MessageId, Recipients, Transport};
use crate::{Axis, Coord, GeometryError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("no program called `{0}`")]
    UnknownProgram(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Result of one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickReport {
    Running,
    /// No bots are left.
    Extinct,
    /// A system bot asked the host to exit with this status.
    Exit(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Extinct { ticks: u64 },
    Exited { code: i32, ticks: u64 },
    TickLimit { ticks: u64 },
}

/// What a bot sees of the simulation while it runs.
struct Neighbourhood<'a> {
    dimensions: usize,
    programs: &'a HashMap<String, Arc<Program>>,
    tallies: &'a BTreeMap<String, usize>,
    port: Option<&'a mut SystemPort>,
}

impl World for Neighbourhood<'_> {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn knows_program(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    fn live_count(&self, name: &str) -> usize {
        self.tallies.get(name).copied().unwrap_or(0)
    }

    fn port(&mut self) -> Option<&mut SystemPort> {
        self.port.as_deref_mut()
    }
}

pub struct Simulation {
    config: SimulationConfig,
    programs: HashMap<String, Arc<Program>>,
    bots: BTreeMap<BotId, Bot>,
    grid: HashMap<Coord, BotId>,
    transport: Transport,
    ports: HashMap<BotId, SystemPort>,
    tallies: BTreeMap<String, usize>,
    recent_deaths: StdVec<(BotId, DeathCause)>,
    next_bot_id: u64,
    time: u64,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        Ok(Self {
            config,
            programs: HashMap::new(),
            bots: BTreeMap::new(),
            grid: HashMap::new(),
            transport: Transport::default(),
            ports: HashMap::new(),
            tallies: BTreeMap::new(),
            recent_deaths: StdVec::new(),
            next_bot_id: 0,
            time: 0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Makes a program available to `register_bot`, `spawn` and `exec`.
    /// A program with the same name is replaced for bots created later.
    pub fn add_program(&mut self, program: Program) -> Arc<Program> {
        let program = Arc::new(program);
        if self
            .programs
            .insert(program.name().into(), Arc::clone(&program))
            .is_some()
        {
            debug!(program = program.name(), "program replaced");
        }
        program
    }

    /// Assembles `lines` with this simulation's options and adds the result.
    pub fn compile<'l, I>(&mut self, name: &str, lines: I) -> Result<Arc<Program>, AssemblerError>
    where
        I: IntoIterator<Item = &'l str>,
    {
        let program = assemble(name, lines, self.config.assembler_options())?;
        Ok(self.add_program(program))
    }

    pub fn program(&self, name: &str) -> Option<&Arc<Program>> {
        self.programs.get(name)
    }

    /// Places a new bot running `name` at `position`, facing `D0+`. Any
    /// bot already there is crushed.
    pub fn register_bot(&mut self, name: &str, position: Coord) -> Result<BotId, SimulationError> {
        let bot = self.new_bot(name, position)?;
        Ok(self.place(bot))
    }

    /// Like [`Simulation::register_bot`], but the bot may use the system
    /// opcodes against `port`.
    pub fn register_system_bot(
        &mut self,
        name: &str,
        position: Coord,
        port: SystemPort,
    ) -> Result<BotId, SimulationError> {
        let mut bot = self.new_bot(name, position)?;
        bot.set_system(true);
        let id = self.place(bot);
        self.ports.insert(id, port);
        Ok(id)
    }

    /// Injects a message as if a bot had emitted it. It first moves on the
    /// next tick.
    pub fn launch_message(
        &mut self,
        at: Coord,
        velocity: Coord,
        payload: Payload,
    ) -> Result<MessageId, SimulationError> {
        self.check_dimensions(&at)?;
        self.check_dimensions(&velocity)?;
        Ok(self
            .transport
            .launch(at, velocity, payload, self.config.message_ttl))
    }

    pub fn bot(&self, id: BotId) -> Option<&Bot> {
        self.bots.get(&id)
    }

    pub fn bot_at(&self, position: &Coord) -> Option<&Bot> {
        self.grid.get(position).and_then(|id| self.bots.get(id))
    }

    /// Live bots, oldest first.
    pub fn bots(&self) -> impl Iterator<Item = &Bot> {
        self.bots.values()
    }

    pub fn bot_count(&self) -> usize {
        self.bots.len()
    }

    pub fn messages(&self) -> &[Message] {
        self.transport.messages()
    }

    pub fn live_count(&self, name: &str) -> usize {
        self.tallies.get(name).copied().unwrap_or(0)
    }

    /// Live bots per program name, sorted by name.
    pub fn tallies(&self) -> impl Iterator<Item = (&str, usize)> {
        self.tallies.iter().map(|(name, count)| (name.as_str(), *count))
    }

    /// Bots that died during the last tick.
    pub fn recently_deceased(&self) -> impl Iterator<Item = BotId> + '_ {
        self.recent_deaths.iter().map(|(id, _)| *id)
    }

    pub fn recent_deaths(&self) -> &[(BotId, DeathCause)] {
        &self.recent_deaths
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn is_extinct(&self) -> bool {
        self.bots.is_empty()
    }

    pub fn tick(&mut self) -> TickReport {
        self.recent_deaths.clear();
        self.time = self.time.wrapping_add(1);
        debug!(
            tick = self.time,
            bots = self.bots.len(),
            messages = self.transport.len(),
            "tick"
        );

        let mut transport = std::mem::take(&mut self.transport);
        transport.advance(self);
        self.transport = transport;

        let turn_order: StdVec<BotId> = self.bots.keys().copied().collect();
        for id in turn_order {
            let step = {
                let Simulation {
                    bots,
                    programs,
                    tallies,
                    ports,
                    config,
                    ..
                } = self;
                let Some(bot) = bots.get_mut(&id) else {
                    continue;
                };
                let mut world = Neighbourhood {
                    dimensions: config.dimensions,
                    programs,
                    tallies,
                    port: ports.get_mut(&id),
                };
                bot.step(&mut world)
            };

            let effects = match step {
                Ok(Step::Blocked) => continue,
                Ok(Step::Executed(effects)) => effects,
                Err(fault) => {
                    self.kill(id, DeathCause::Fault(fault));
                    continue;
                }
            };
            for effect in effects {
                match self.apply(id, effect) {
                    Ok(Some(code)) => {
                        info!(bot = %id, code, "exit requested");
                        return TickReport::Exit(code);
                    }
                    Ok(None) => {}
                    Err(fault) => {
                        self.kill(id, DeathCause::Fault(fault));
                        break;
                    }
                }
            }
        }

        if self.bots.is_empty() {
            TickReport::Extinct
        } else {
            TickReport::Running
        }
    }

    /// Ticks until the grid is empty, a bot requests an exit, or `limit`
    /// ticks have run.
    pub fn run(&mut self, limit: Option<u64>) -> RunOutcome {
        let mut ticks = 0u64;
        loop {
            if self.bots.is_empty() {
                info!(ticks, "all bots are gone");
                return RunOutcome::Extinct { ticks };
            }
            if limit.is_some_and(|limit| ticks >= limit) {
                return RunOutcome::TickLimit { ticks };
            }
            let report = self.tick();
            ticks = ticks.saturating_add(1);
            match report {
                TickReport::Running => {}
                TickReport::Extinct => {
                    info!(ticks, "all bots are gone");
                    return RunOutcome::Extinct { ticks };
                }
                TickReport::Exit(code) => return RunOutcome::Exited { code, ticks },
            }
        }
    }

    fn check_dimensions(&self, coord: &Coord) -> Result<(), SimulationError> {
        if coord.dimensions() != self.config.dimensions {
            return Err(GeometryError::DimensionMismatch {
                expected: self.config.dimensions,
                found: coord.dimensions(),
            }
            .into());
        }
        Ok(())
    }

    fn new_bot(&mut self, name: &str, position: Coord) -> Result<Bot, SimulationError> {
        self.check_dimensions(&position)?;
        let program = self
            .programs
            .get(name)
            .cloned()
            .ok_or_else(|| SimulationError::UnknownProgram(name.into()))?;
        let heading = Axis::new(0, false).unit(self.config.dimensions)?;
        Ok(self.instantiate(program, position, heading))
    }

    fn instantiate(&mut self, program: Arc<Program>, position: Coord, heading: Coord) -> Bot {
        let id = self.allocate_id();
        Bot::new(id, program, position, heading, &self.config)
    }

    fn allocate_id(&mut self) -> BotId {
        let id = BotId(self.next_bot_id);
        self.next_bot_id = self.next_bot_id.wrapping_add(1);
        id
    }

    /// Puts `bot` on the grid, crushing whatever was on its cell.
    fn place(&mut self, bot: Bot) -> BotId {
        let id = bot.id();
        let position = bot.position().clone();
        if let Some(occupant) = self.grid.get(&position).copied() {
            self.kill(occupant, DeathCause::Crushed);
        }
        info!(bot = %id, program = bot.name(), at = %position, "bot placed");
        let tally = self.tallies.entry(bot.name().into()).or_insert(0);
        *tally = tally.saturating_add(1);
        self.grid.insert(position, id);
        self.bots.insert(id, bot);
        id
    }

    fn kill(&mut self, id: BotId, cause: DeathCause) {
        let Some(mut bot) = self.bots.remove(&id) else {
            return;
        };
        bot.mark_dead();
        if self.grid.get(bot.position()) == Some(&id) {
            self.grid.remove(bot.position());
        }
        if let Some(tally) = self.tallies.get_mut(bot.name()) {
            *tally = tally.saturating_sub(1);
            if *tally == 0 {
                self.tallies.remove(bot.name());
            }
        }
        self.ports.remove(&id);
        match &cause {
            DeathCause::Fault(fault) => {
                warn!(bot = %id, program = bot.name(), at = %bot.position(), %fault, "bot faulted")
            }
            _ => info!(bot = %id, program = bot.name(), at = %bot.position(), %cause, "bot died"),
        }
        self.recent_deaths.push((id, cause));
    }

    /// Applies one effect of bot `id`. Returns an exit code when the host
    /// should stop.
    fn apply(&mut self, id: BotId, effect: Effect) -> Result<Option<i32>, BotFault> {
        match effect {
            Effect::Emit {
                at,
                velocity,
                payload,
                ttl,
            } => {
                let message = self.transport.launch(at, velocity, payload, ttl);
                trace!(bot = %id, message = message.0, "message emitted");
            }
            Effect::Spawn {
                program,
                at,
                heading,
            } => {
                let program = self
                    .programs
                    .get(program.as_str())
                    .cloned()
                    .ok_or(BotFault::UnknownProgram(program))?;
                let bot = self.instantiate(program, at, heading);
                self.place(bot);
            }
            Effect::Fork { at, heading } => {
                if !self.bots.contains_key(&id) {
                    return Ok(None);
                }
                let child_id = self.allocate_id();
                let Some(parent) = self.bots.get(&id) else {
                    return Ok(None);
                };
                let mut child = parent.fork(child_id, at, heading);
                child.set_system(false);
                self.place(child);
            }
            Effect::Exec { program } => {
                let Some(caller) = self.bots.get(&id) else {
                    return Ok(None);
                };
                let position = caller.position().clone();
                let heading = caller.heading().clone();
                let program = self
                    .programs
                    .get(program.as_str())
                    .cloned()
                    .ok_or(BotFault::UnknownProgram(program))?;
                let port = self.ports.remove(&id);
                self.kill(id, DeathCause::Replaced);
                let mut bot = self.instantiate(program, position, heading);
                bot.set_system(port.is_some());
                let replacement = self.place(bot);
                if let Some(port) = port {
                    self.ports.insert(replacement, port);
                }
            }
            Effect::Move { to } => {
                let Some(from) = self.bots.get(&id).map(|bot| bot.position().clone()) else {
                    return Ok(None);
                };
                if let Some(occupant) = self.grid.get(&to).copied() {
                    if occupant != id {
                        self.kill(occupant, DeathCause::Crushed);
                    }
                }
                if self.grid.get(&from) == Some(&id) {
                    self.grid.remove(&from);
                }
                trace!(bot = %id, %from, %to, "bot moved");
                self.grid.insert(to.clone(), id);
                if let Some(bot) = self.bots.get_mut(&id) {
                    bot.set_position(to);
                }
            }
            Effect::Die(cause) => self.kill(id, cause),
            Effect::Exit(code) => return Ok(Some(code)),
        }
        Ok(None)
    }
}

impl Recipients for Simulation {
    fn occupant(&self, at: &Coord) -> Option<BotId> {
        self.grid.get(at).copied()
    }

    fn deliver(&mut self, id: BotId, payload: Payload) {
        let Some(bot) = self.bots.get_mut(&id) else {
            return;
        };
        match bot.receive(payload) {
            Reception::Killed => self.kill(id, DeathCause::Killed),
            Reception::Dropped => warn!(bot = %id, "queue full, message dropped"),
            Reception::Enqueued | Reception::Resolved => {}
        }
    }
}
