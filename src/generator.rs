//! Vehicle generators: admission policies composed with a per-lane queue.

use crate::agent::{AgentGateway, FailurePolicy, RegistrationOutcome};
use crate::error::AdmissionError;
use crate::lane::Lane;
use crate::observer::{Observable, Observers};
use crate::simulation::SimClock;
use crate::vehicle::{AgentBinding, Vehicle, VehicleFactory};
use crate::{GeneratorId, LaneId, LaneSet, VehicleId, VehicleSet};
use log::{debug, warn};
use smallvec::SmallVec;

pub use demand::{DemandConfig, DemandGeneration};
pub use headway::{admits, HeadwayConfig, HeadwayRelease};
pub use queue::{AdmissionQueue, Ticket};
pub use scripted::{ScriptedConfig, ScriptedRelease, BLOCKER_ROLE};

mod demand;
mod headway;
mod queue;
mod scripted;

/// The vehicles released by a generator in one tick.
pub type Released = SmallVec<[VehicleId; 2]>;

/// Decides, every tick, which vehicles a generator manufactures and releases.
pub trait AdmissionPolicy {
    /// Runs the policy for one tick.
    fn control(&mut self, ctx: &mut ControlContext<'_>);

    /// Runs instead of [Self::control] while the generator is disabled
    /// or the policy is exhausted. Has no access to the queue or lane.
    fn no_control(&mut self) {}

    /// Whether the policy will never release another vehicle.
    fn is_exhausted(&self, _clock: &SimClock) -> bool {
        false
    }
}

/// The result of a successful [ControlContext::release_head] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Release {
    /// The vehicle was placed on the lane.
    Placed {
        vehicle: VehicleId,
        outcome: RegistrationOutcome,
    },
    /// Registration failed under [FailurePolicy::Hold]; the vehicle is still queued.
    Held(RegistrationOutcome),
}

/// The parts of the simulation a generator may touch during a tick.
pub(crate) struct World<'a> {
    pub clock: SimClock,
    pub lanes: &'a mut LaneSet,
    pub vehicles: &'a mut VehicleSet,
    pub gateway: &'a mut AgentGateway,
    pub seq: &'a mut u64,
}

/// A policy's view of its generator and the world for one tick.
pub struct ControlContext<'a> {
    clock: SimClock,
    lane: LaneId,
    queue: &'a mut AdmissionQueue,
    factory: &'a mut dyn VehicleFactory,
    lanes: &'a mut LaneSet,
    vehicles: &'a mut VehicleSet,
    gateway: &'a mut AgentGateway,
    seq: &'a mut u64,
    released: &'a mut Released,
}

impl<'a> ControlContext<'a> {
    /// The simulation clock.
    pub fn clock(&self) -> SimClock {
        self.clock
    }

    /// The current simulation time in s.
    pub fn now(&self) -> f64 {
        self.clock.time
    }

    /// The lane vehicles are released onto.
    pub fn lane(&self) -> &Lane {
        &self.lanes[self.lane]
    }

    /// The lane's current space headway in m.
    pub fn space_headway(&self) -> f64 {
        self.lanes[self.lane].space_headway(self.vehicles)
    }

    /// The generator's admission queue.
    pub fn queue(&self) -> &AdmissionQueue {
        &*self.queue
    }

    /// Manufactures a vehicle entering at `speed` with a driver of the given
    /// role, and adds it to the back of the queue.
    pub fn manufacture(&mut self, speed: f64, role: &str) -> Ticket {
        self.manufacture_at(speed, role, 0.0)
    }

    /// Like [ControlContext::manufacture], but the vehicle's rear will be
    /// placed `offset` metres along the lane, capped at the lane's length.
    pub fn manufacture_at(&mut self, speed: f64, role: &str, offset: f64) -> Ticket {
        *self.seq += 1;
        let lane = &self.lanes[self.lane];
        let offset = offset.max(0.0).min(lane.length());
        let mut pending = self.factory.generate(lane, offset, *self.seq);
        pending.speed = speed;
        pending.driver.set_role(role);
        self.queue.push(pending)
    }

    /// Registers the driver of the vehicle at the head of the queue and,
    /// unless the gateway holds it back, places the vehicle on the lane.
    pub fn release_head(&mut self) -> Result<Release, AdmissionError> {
        let now = self.clock.time;
        let (ticket, head) = self.queue.peek().ok_or(AdmissionError::Empty)?;
        let role = head.driver.role().to_owned();
        let outcome = self.gateway.register(&head.driver, &role, now);

        if let RegistrationOutcome::Rejected { identity, error } = &outcome {
            warn!("t={:.2}: registration of {} as {:?} failed: {}", now, identity, role, error);
            if self.gateway.policy() == FailurePolicy::Hold {
                return Ok(Release::Held(outcome));
            }
        }

        let pending = self.queue.release(ticket)?;
        let lane = &mut self.lanes[self.lane];
        let vehicle_id = self
            .vehicles
            .insert_with_key(|id| Vehicle::new(id, pending, lane));
        lane.insert_vehicle(self.vehicles, vehicle_id);

        let vehicle = &mut self.vehicles[vehicle_id];
        vehicle.set_agent(match &outcome {
            RegistrationOutcome::Registered(identity) => AgentBinding::Bound(identity.clone()),
            RegistrationOutcome::Rejected { .. } => AgentBinding::Uncontrolled,
        });
        vehicle.notify_observers();
        debug!(
            "t={:.2}: released {:?} (driver {}) at {:.2} m/s",
            now,
            vehicle_id,
            vehicle.driver().id(),
            vehicle.vel()
        );

        self.released.push(vehicle_id);
        Ok(Release::Placed {
            vehicle: vehicle_id,
            outcome,
        })
    }
}

/// Injects vehicles into one lane according to an [AdmissionPolicy].
pub struct Generator {
    id: GeneratorId,
    lane: LaneId,
    queue: AdmissionQueue,
    factory: Box<dyn VehicleFactory>,
    policy: Box<dyn AdmissionPolicy>,
    enabled: bool,
    released: usize,
    last_released: Option<VehicleId>,
    observers: Observers<Generator>,
}

impl Generator {
    pub(crate) fn new(
        id: GeneratorId,
        lane: LaneId,
        factory: Box<dyn VehicleFactory>,
        policy: Box<dyn AdmissionPolicy>,
    ) -> Self {
        Self {
            id,
            lane,
            queue: AdmissionQueue::new(),
            factory,
            policy,
            enabled: true,
            released: 0,
            last_released: None,
            observers: Observers::new(),
        }
    }

    /// Gets the generator's ID.
    pub fn id(&self) -> GeneratorId {
        self.id
    }

    /// The lane the generator releases vehicles onto.
    pub fn lane_id(&self) -> LaneId {
        self.lane
    }

    /// The generator's admission queue.
    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    /// The number of vehicles waiting to enter the lane.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// The total number of vehicles released so far.
    pub fn released(&self) -> usize {
        self.released
    }

    /// The most recently released vehicle.
    pub fn last_released(&self) -> Option<VehicleId> {
        self.last_released
    }

    /// Whether the generator runs its policy each tick.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the generator. Queued vehicles are kept either way.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the generator's policy has finished for good.
    pub fn is_exhausted(&self, clock: &SimClock) -> bool {
        self.policy.is_exhausted(clock)
    }

    /// Runs the generator for one tick, returning the vehicles it released.
    pub(crate) fn tick(&mut self, world: World<'_>) -> Released {
        let mut released = Released::new();
        if !self.enabled || self.policy.is_exhausted(&world.clock) {
            self.policy.no_control();
            return released;
        }

        let queue_len = self.queue.len();
        let mut ctx = ControlContext {
            clock: world.clock,
            lane: self.lane,
            queue: &mut self.queue,
            factory: self.factory.as_mut(),
            lanes: world.lanes,
            vehicles: world.vehicles,
            gateway: world.gateway,
            seq: world.seq,
            released: &mut released,
        };
        self.policy.control(&mut ctx);

        self.released += released.len();
        self.last_released = released.last().copied().or(self.last_released);
        if queue_len != self.queue.len() || !released.is_empty() {
            self.notify_observers();
        }
        released
    }
}

impl Observable for Generator {
    fn observers(&self) -> &Observers<Self> {
        &self.observers
    }
}
