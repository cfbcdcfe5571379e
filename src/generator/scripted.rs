use super::{AdmissionPolicy, ControlContext, Release};
use crate::error::ConfigError;
use crate::simulation::SimClock;
use log::error;
use serde::{Deserialize, Serialize};

/// The role of the first vehicle released by a [ScriptedRelease].
pub const BLOCKER_ROLE: &str = "blocker";

/// The number of vehicles a [ScriptedRelease] releases.
const SCRIPT_LEN: u8 = 2;

/// The parameters of a [ScriptedRelease] policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedConfig {
    /// The second vehicle is released once the simulation time exceeds this, in s.
    pub threshold: f64,
    /// The role of the second vehicle's driver.
    pub role: String,
}

/// A repeatable two-vehicle scenario.
///
/// A blocking vehicle is released at half the speed limit on the first tick,
/// and a second vehicle with the configured role once the time exceeds the
/// threshold. Nothing is released after that.
#[derive(Clone, Debug)]
pub struct ScriptedRelease {
    threshold: f64,
    role: String,
    manufactured: u8,
    placed: u8,
}

impl ScriptedRelease {
    /// Creates the policy.
    pub fn new(config: ScriptedConfig) -> Result<Self, ConfigError> {
        if !config.threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold(config.threshold));
        }
        Ok(Self {
            threshold: config.threshold,
            role: config.role,
            manufactured: 0,
            placed: 0,
        })
    }

    /// The number of vehicles placed on the lane so far.
    pub fn placed(&self) -> u8 {
        self.placed
    }
}

impl AdmissionPolicy for ScriptedRelease {
    fn control(&mut self, ctx: &mut ControlContext<'_>) {
        if ctx.queue().is_empty() {
            let speed = 0.5 * ctx.lane().speed_limit();
            match self.manufactured {
                0 => ctx.manufacture(speed, BLOCKER_ROLE),
                1 if ctx.clock().has_passed(self.threshold) => ctx.manufacture(speed, &self.role),
                _ => return,
            };
            self.manufactured += 1;
        }

        match ctx.release_head() {
            Ok(Release::Placed { .. }) => self.placed += 1,
            Ok(Release::Held(_)) => {}
            Err(err) => error!("scripted release failed: {}", err),
        }
    }

    fn is_exhausted(&self, _clock: &SimClock) -> bool {
        self.placed >= SCRIPT_LEN
    }
}
