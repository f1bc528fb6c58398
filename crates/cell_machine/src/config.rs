use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::assembler::AssemblerOptions;
use crate::{MAX_DIMENSIONS, MESSAGE_TTL_MAX, QUEUE_CAPACITY_MAX};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("dimensions must be between 1 and {max}, got {found}")]
    Dimensions { found: usize, max: usize },
    #[error("bots need at least one register")]
    NoRegisters,
    #[error("queue capacity {found} exceeds the maximum of {max}")]
    QueueCapacity { found: usize, max: usize },
    #[error("message ttl {found} exceeds the maximum of {max}")]
    MessageTtl { found: u32, max: u32 },
}

/// Parameters fixed for the lifetime of one simulation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub dimensions: usize,
    /// Registers per bot, shared by every bot type.
    pub register_count: usize,
    /// Queue size a new bot starts with; `qmax` changes it per bot.
    pub queue_capacity: usize,
    /// Lifetime of emitted messages in ticks, 0 for unlimited.
    pub message_ttl: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dimensions: 2,
            register_count: 2,
            queue_capacity: 4,
            message_ttl: MESSAGE_TTL_MAX,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions == 0 || self.dimensions > MAX_DIMENSIONS {
            return Err(ConfigError::Dimensions {
                found: self.dimensions,
                max: MAX_DIMENSIONS,
            });
        }
        if self.register_count == 0 {
            return Err(ConfigError::NoRegisters);
        }
        if self.queue_capacity > QUEUE_CAPACITY_MAX {
            return Err(ConfigError::QueueCapacity {
                found: self.queue_capacity,
                max: QUEUE_CAPACITY_MAX,
            });
        }
        if self.message_ttl > MESSAGE_TTL_MAX {
            return Err(ConfigError::MessageTtl {
                found: self.message_ttl,
                max: MESSAGE_TTL_MAX,
            });
        }
        Ok(())
    }

    /// Compile options matching this simulation.
    pub fn assembler_options(&self) -> AssemblerOptions {
        AssemblerOptions {
            register_count: self.register_count,
            dimensions: self.dimensions,
        }
    }
}
