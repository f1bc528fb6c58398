use std::collections::BTreeMap;
use std::fmt;

use cell_machine::{BotId, BotState, Coord, Simulation, Value};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotSummary {
    pub name: String,
    pub id: BotId,
    pub instr_ptr: usize,
    pub coords: Coord,
    pub heading: Coord,
    pub registers: Vec<Value>,
    pub queued: usize,
    /// `None` when ready, otherwise the values still awaited.
    pub awaiting: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeathSummary {
    pub id: BotId,
    pub cause: String,
}

/// Snapshot of a simulation after a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub tick: u64,
    pub counts: BTreeMap<String, usize>,
    pub bots: Vec<BotSummary>,
    pub messages: usize,
    pub deaths: Vec<DeathSummary>,
}

impl TickSummary {
    pub fn capture(simulation: &Simulation) -> Self {
        let bots = simulation
            .bots()
            .map(|bot| BotSummary {
                name: bot.name().to_string(),
                id: bot.id(),
                instr_ptr: bot.instr_ptr(),
                coords: bot.position().clone(),
                heading: bot.heading().clone(),
                registers: bot.registers().to_vec(),
                queued: bot.queue_len(),
                awaiting: match bot.state() {
                    BotState::AwaitingMessage { remaining } => Some(remaining),
                    BotState::Ready | BotState::Dead => None,
                },
            })
            .collect();
        Self {
            tick: simulation.time(),
            counts: simulation
                .tallies()
                .map(|(name, count)| (name.to_string(), count))
                .collect(),
            bots,
            messages: simulation.messages().len(),
            deaths: simulation
                .recent_deaths()
                .iter()
                .map(|(id, cause)| DeathSummary {
                    id: *id,
                    cause: cause.to_string(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for TickSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {} message(s) in flight", self.tick, self.messages)?;
        let counts: Vec<String> = self
            .counts
            .iter()
            .map(|(name, count)| format!("{name}={count}"))
            .collect();
        writeln!(f, "{{{}}}", counts.join(", "))?;
        for death in &self.deaths {
            writeln!(f, "{} {}", death.id, death.cause)?;
        }
        for bot in &self.bots {
            write!(f, "{} id:{} ip@{}", bot.name, bot.id.0, bot.instr_ptr)?;
            if let Some(remaining) = bot.awaiting {
                write!(f, " (awaiting {remaining})")?;
            }
            writeln!(f)?;
            writeln!(f, "{}", bot.coords)?;
            writeln!(f, "{:?}", bot.registers)?;
            writeln!(f)?;
        }
        Ok(())
    }
}
