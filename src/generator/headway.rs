use super::{AdmissionPolicy, ControlContext};
use crate::error::ConfigError;
use crate::simulation::SimClock;
use crate::vehicle::DEFAULT_ROLE;
use log::error;
use serde::{Deserialize, Serialize};

/// The gap-acceptance test: a vehicle of length `length` travelling at
/// `speed` may enter a lane with free space `space_headway` if the time
/// headway is at least `time_headway` and the vehicle fits in the gap.
///
/// `speed` must be positive.
pub fn admits(space_headway: f64, speed: f64, time_headway: f64, length: f64) -> bool {
    space_headway / speed >= time_headway && space_headway >= length
}

/// The parameters of a [HeadwayRelease] policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeadwayConfig {
    /// The speed vehicles enter the lane at, in m/s.
    pub target_speed: f64,
    /// The minimum time headway in s.
    pub time_headway: f64,
    /// The role of the generated drivers.
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_owned()
}

/// Releases one vehicle at a time at a fixed speed whenever the lane's
/// space headway leaves at least the minimum time headway.
///
/// When the queue is empty a new vehicle is manufactured and tested
/// immediately; if the test fails it waits at the head of the queue.
/// The policy stops at the simulation horizon.
#[derive(Clone, Debug)]
pub struct HeadwayRelease {
    target_speed: f64,
    time_headway: f64,
    role: String,
}

impl HeadwayRelease {
    /// Creates the policy. Fails if the target speed is not positive,
    /// since the admission test divides by it.
    pub fn new(config: HeadwayConfig) -> Result<Self, ConfigError> {
        if !(config.target_speed.is_finite() && config.target_speed > 0.0) {
            return Err(ConfigError::NonPositiveSpeed(config.target_speed));
        }
        if !(config.time_headway.is_finite() && config.time_headway >= 0.0) {
            return Err(ConfigError::InvalidTimeHeadway(config.time_headway));
        }
        Ok(Self {
            target_speed: config.target_speed,
            time_headway: config.time_headway,
            role: config.role,
        })
    }

    /// The speed vehicles enter the lane at, in m/s.
    pub fn target_speed(&self) -> f64 {
        self.target_speed
    }

    /// The minimum time headway in s.
    pub fn time_headway(&self) -> f64 {
        self.time_headway
    }
}

impl AdmissionPolicy for HeadwayRelease {
    fn control(&mut self, ctx: &mut ControlContext<'_>) {
        if ctx.queue().is_empty() {
            ctx.manufacture(self.target_speed, &self.role);
        }

        let space_headway = ctx.space_headway();
        let length = match ctx.queue().peek() {
            Some((_, head)) => head.length(),
            None => return,
        };
        if admits(space_headway, self.target_speed, self.time_headway, length) {
            if let Err(err) = ctx.release_head() {
                error!("headway release failed: {}", err);
            }
        }
    }

    fn is_exhausted(&self, clock: &SimClock) -> bool {
        clock.is_finished()
    }
}
