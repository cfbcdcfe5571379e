//! Periodic on-board controllers.
//!
//! A [PeriodicController] decides, tick by tick, whether its owner's control
//! logic is due. It refers to its owning vehicle by ID only; the simulation
//! holds controllers in an arena and deletes them when their vehicle leaves.

use crate::error::{ConfigError, ControllerError};
use crate::simulation::TIME_EPSILON;
use crate::vehicle::Vehicle;
use crate::VehicleId;
use serde::{Deserialize, Serialize};

/// The schedule of a periodic controller.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerSchedule {
    /// The minimum interval between runs in s; zero runs on every tick.
    pub period: f64,
    /// The earliest time of the first run in s.
    pub start: f64,
}

/// Whether a controller ran on a given tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// The tick was received but the controller was not due.
    Idle,
    /// The controller ran its control logic this tick.
    Active,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Initialized,
    Deleted,
}

/// Runs every `period` seconds, starting at `start`.
#[derive(Clone, Debug)]
pub struct PeriodicController {
    period: f64,
    start: f64,
    /// The time of the last run.
    last_run: Option<f64>,
    lifecycle: Lifecycle,
    /// The owning vehicle, cleared on delete.
    owner: Option<VehicleId>,
}

impl PeriodicController {
    /// Creates a controller bound to the given vehicle.
    pub fn new(owner: VehicleId, schedule: ControllerSchedule) -> Result<Self, ConfigError> {
        if !(schedule.period.is_finite() && schedule.period >= 0.0) {
            return Err(ConfigError::InvalidPeriod(schedule.period));
        }
        if !schedule.start.is_finite() {
            return Err(ConfigError::InvalidStart(schedule.start));
        }
        Ok(Self {
            period: schedule.period,
            start: schedule.start,
            last_run: None,
            lifecycle: Lifecycle::Created,
            owner: Some(owner),
        })
    }

    /// Prepares the controller for its first tick. Must be called exactly once.
    pub fn init(&mut self) -> Result<(), ControllerError> {
        match self.lifecycle {
            Lifecycle::Created => {
                self.lifecycle = Lifecycle::Initialized;
                Ok(())
            }
            Lifecycle::Initialized => Err(ControllerError::AlreadyInitialized),
            Lifecycle::Deleted => Err(ControllerError::Deleted),
        }
    }

    /// Receives a tick at time `now`, returning [ControllerState::Active]
    /// if the controller is due, in which case the caller runs its logic.
    pub fn tick(&mut self, now: f64) -> Result<ControllerState, ControllerError> {
        match self.lifecycle {
            Lifecycle::Created => return Err(ControllerError::NotInitialized),
            Lifecycle::Deleted => return Err(ControllerError::Deleted),
            Lifecycle::Initialized => {}
        }
        if self.is_due(now) {
            self.last_run = Some(now);
            Ok(ControllerState::Active)
        } else {
            Ok(ControllerState::Idle)
        }
    }

    /// Tears the controller down, releasing and returning its owner reference.
    /// Must be called exactly once, when the owner leaves the simulation.
    pub fn delete(&mut self) -> Result<VehicleId, ControllerError> {
        if self.lifecycle == Lifecycle::Deleted {
            return Err(ControllerError::Deleted);
        }
        self.lifecycle = Lifecycle::Deleted;
        self.owner.take().ok_or(ControllerError::Deleted)
    }

    /// Whether a tick at `now` would run the controller. Times within
    /// [TIME_EPSILON] of the due time count as due.
    pub fn is_due(&self, now: f64) -> bool {
        let due = match self.last_run {
            None => self.start,
            Some(last_run) => last_run + self.period,
        };
        now >= due - TIME_EPSILON
    }

    /// The owning vehicle, until the controller is deleted.
    pub fn owner(&self) -> Option<VehicleId> {
        self.owner
    }

    /// The time of the last run, if any.
    pub fn last_run(&self) -> Option<f64> {
        self.last_run
    }

    /// The minimum interval between runs in s.
    pub fn period(&self) -> f64 {
        self.period
    }

    /// The earliest time of the first run in s.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Whether [Self::init] has been called and [Self::delete] has not.
    pub fn is_live(&self) -> bool {
        self.lifecycle == Lifecycle::Initialized
    }
}

/// The control logic of an on-board unit, run whenever its controller is due.
pub trait ControlLogic {
    fn control(&mut self, vehicle: &mut Vehicle, now: f64);
}

impl<F: FnMut(&mut Vehicle, f64)> ControlLogic for F {
    fn control(&mut self, vehicle: &mut Vehicle, now: f64) {
        self(vehicle, now)
    }
}

/// Control logic which steers a vehicle's desired speed towards a target,
/// changing it by at most `max_change` per run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedSetpoint {
    pub target: f64,
    pub max_change: f64,
}

impl ControlLogic for SpeedSetpoint {
    fn control(&mut self, vehicle: &mut Vehicle, _now: f64) {
        let current = vehicle.desired_vel();
        let change = (self.target - current).clamp(-self.max_change, self.max_change);
        vehicle.set_desired_vel(current + change);
    }
}

/// The on-board unit fitted to each vehicle a generator releases.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    /// The controller period in s.
    pub period: f64,
    /// The delay between release and the first run in s.
    #[serde(default)]
    pub delay: f64,
    /// The speed the unit steers towards in m/s.
    pub target_speed: f64,
    /// The largest change of desired speed per run in m/s.
    #[serde(default = "unlimited")]
    pub max_change: f64,
}

fn unlimited() -> f64 {
    f64::INFINITY
}

impl UnitConfig {
    /// The schedule of a unit fitted at time `released_at`.
    pub fn schedule(&self, released_at: f64) -> ControllerSchedule {
        ControllerSchedule {
            period: self.period,
            start: released_at + self.delay,
        }
    }

    /// The unit's control logic.
    pub fn logic(&self) -> SpeedSetpoint {
        SpeedSetpoint {
            target: self.target_speed,
            max_change: f64::max(self.max_change, 0.0),
        }
    }
}

/// An in-vehicle device: a periodic controller paired with its logic.
pub struct OnBoardUnit {
    pub(crate) controller: PeriodicController,
    pub(crate) logic: Box<dyn ControlLogic>,
}

impl OnBoardUnit {
    /// The unit's controller.
    pub fn controller(&self) -> &PeriodicController {
        &self.controller
    }
}
