use crate::agent::AgentIdentity;
use crate::lane::Lane;
use crate::math::Point2d;
use crate::observer::{Observable, Observers};
use crate::{LaneId, UnitId, VehicleId};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use factory::{TemplateFactory, VehicleFactory, DEFAULT_ROLE};

mod factory;

/// A simulated vehicle.
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// The driver, owned for the vehicle's lifetime.
    driver: Driver,
    /// Half the vehicle's width in m.
    half_wid: f64,
    /// Half the vehicle's length in m.
    half_len: f64,
    /// The lane the vehicle is travelling on.
    lane: LaneId,
    /// The longitudinal position of the centre of the vehicle along its lane, in m.
    pos: f64,
    /// The velocity in m/s.
    vel: f64,
    /// The velocity the vehicle travels at when unobstructed, in m/s.
    desired_vel: f64,
    /// The world space coordinates of the centre of the vehicle.
    world_pos: Point2d,
    /// Whether the driver is bound to an external agent.
    agent: AgentBinding,
    /// The on-board unit attached to the vehicle, if any.
    unit: Option<UnitId>,
    /// Whether the vehicle has left the simulation.
    exited: bool,
    /// Observers of the vehicle's state.
    observers: Observers<Vehicle>,
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleAttributes {
    /// The vehicle width in m.
    pub width: f64,
    /// The vehicle length in m.
    pub length: f64,
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            width: 2.0,
            length: 4.5,
        }
    }
}

/// Unique ID of a [Driver]. Derived from the simulation's sequence counter
/// and never reused, even after the driver leaves the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DriverId(pub u64);

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The driver of a vehicle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Driver {
    id: DriverId,
    /// Behavioural type used when registering with the agent environment.
    role: String,
}

impl Driver {
    /// Creates a new driver.
    pub fn new(id: DriverId, role: impl Into<String>) -> Self {
        Self {
            id,
            role: role.into(),
        }
    }

    /// Gets the driver's ID.
    pub fn id(&self) -> DriverId {
        self.id
    }

    /// Gets the driver's behavioural role.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Sets the driver's behavioural role.
    pub fn set_role(&mut self, role: impl Into<String>) {
        self.role = role.into();
    }
}

/// The binding between a vehicle's driver and the external agent environment.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum AgentBinding {
    /// Registration has not been attempted.
    #[default]
    Pending,
    /// The driver is controlled by the agent with the given identity.
    Bound(AgentIdentity),
    /// Registration was rejected; the vehicle drives without agent control.
    Uncontrolled,
}

/// A vehicle waiting in an admission queue, not yet on its lane.
#[derive(Clone, Debug)]
pub struct PendingVehicle {
    /// The vehicle's attributes.
    pub attributes: VehicleAttributes,
    /// The speed the vehicle enters the lane at, in m/s.
    pub speed: f64,
    /// The position the vehicle's rear is placed at, in m along the lane.
    pub offset: f64,
    /// The driver.
    pub driver: Driver,
}

impl PendingVehicle {
    /// Creates a pending vehicle.
    pub fn new(attributes: VehicleAttributes, offset: f64, driver: Driver) -> Self {
        Self {
            attributes,
            speed: 0.0,
            offset,
            driver,
        }
    }

    /// The vehicle length in m.
    pub fn length(&self) -> f64 {
        self.attributes.length
    }
}

impl Vehicle {
    /// Creates a vehicle from a released pending vehicle, placed on the given lane.
    pub(crate) fn new(id: VehicleId, pending: PendingVehicle, lane: &Lane) -> Self {
        let half_len = 0.5 * pending.attributes.length;
        let pos = pending.offset + half_len;
        Self {
            id,
            driver: pending.driver,
            half_wid: 0.5 * pending.attributes.width,
            half_len,
            lane: lane.id(),
            pos,
            vel: pending.speed,
            desired_vel: pending.speed,
            world_pos: lane.sample(pos),
            agent: AgentBinding::Pending,
            unit: None,
            exited: false,
            observers: Observers::new(),
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// Gets the vehicle's driver.
    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// The vehicle's width in m.
    pub fn width(&self) -> f64 {
        2.0 * self.half_wid
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        2.0 * self.half_len
    }

    /// The ID of the lane the vehicle is travelling on.
    pub fn lane_id(&self) -> LaneId {
        self.lane
    }

    /// The longitudinal position of the centre of the vehicle in m.
    pub fn pos_mid(&self) -> f64 {
        self.pos
    }

    /// The longitudinal position of the rear of the vehicle in m.
    pub fn pos_rear(&self) -> f64 {
        self.pos - self.half_len
    }

    /// The longitudinal position of the front of the vehicle in m.
    pub fn pos_front(&self) -> f64 {
        self.pos + self.half_len
    }

    /// The coordinates in world space of the centre of the vehicle.
    pub fn position(&self) -> Point2d {
        self.world_pos
    }

    /// The vehicle's velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// The velocity the vehicle travels at when unobstructed, in m/s.
    pub fn desired_vel(&self) -> f64 {
        self.desired_vel
    }

    /// Sets the velocity the vehicle travels at when unobstructed.
    /// Negative values are treated as zero.
    pub fn set_desired_vel(&mut self, vel: f64) {
        self.desired_vel = f64::max(vel, 0.0);
    }

    /// Whether the vehicle has stopped.
    pub fn has_stopped(&self) -> bool {
        self.vel < 0.1
    }

    /// The vehicle's binding to the external agent environment.
    pub fn agent(&self) -> &AgentBinding {
        &self.agent
    }

    /// The on-board unit attached to this vehicle, if any.
    pub fn unit(&self) -> Option<UnitId> {
        self.unit
    }

    /// Whether the vehicle has left the simulation.
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    pub(crate) fn set_agent(&mut self, agent: AgentBinding) {
        self.agent = agent;
    }

    pub(crate) fn set_unit(&mut self, unit: Option<UnitId>) {
        self.unit = unit;
    }

    pub(crate) fn set_exited(&mut self) {
        self.exited = true;
    }

    /// Integrates the vehicle's position at its desired velocity,
    /// without letting its front pass `max_front`.
    ///
    /// # Parameters
    /// * `dt` - The time step in seconds
    /// * `max_front` - The furthest longitudinal position the front may reach
    pub(crate) fn integrate(&mut self, dt: f64, max_front: f64) {
        let free_pos = self.pos + self.desired_vel * dt;
        let pos = f64::max(f64::min(free_pos, max_front - self.half_len), self.pos);
        self.vel = if dt > 0.0 { (pos - self.pos) / dt } else { 0.0 };
        self.pos = pos;
    }

    /// Updates the vehicle's world coordinates.
    pub(crate) fn update_coords(&mut self, lane: &Lane) {
        self.world_pos = lane.sample(self.pos);
    }
}

impl Observable for Vehicle {
    fn observers(&self) -> &Observers<Self> {
        &self.observers
    }
}

impl fmt::Debug for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vehicle")
            .field("id", &self.id)
            .field("driver", &self.driver)
            .field("lane", &self.lane)
            .field("pos", &self.pos)
            .field("vel", &self.vel)
            .field("agent", &self.agent)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lane::LaneAttributes;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::SlotMap;

    fn lane() -> Lane {
        let mut lanes = SlotMap::<LaneId, ()>::with_key();
        let id = lanes.insert(());
        Lane::new(
            id,
            &LaneAttributes {
                entry: [10.0, 0.0],
                direction: [0.0, 2.0],
                length: 100.0,
                speed_limit: 20.0,
            },
        )
    }

    fn vehicle(lane: &Lane, speed: f64) -> Vehicle {
        let mut vehicles = SlotMap::<VehicleId, ()>::with_key();
        let mut pending = PendingVehicle::new(
            VehicleAttributes {
                width: 2.0,
                length: 4.0,
            },
            0.0,
            Driver::new(DriverId(1), "car"),
        );
        pending.speed = speed;
        Vehicle::new(vehicles.insert(()), pending, lane)
    }

    #[test]
    fn placed_with_rear_at_offset() {
        let lane = lane();
        let vehicle = vehicle(&lane, 10.0);
        assert_approx_eq!(vehicle.pos_rear(), 0.0);
        assert_approx_eq!(vehicle.pos_front(), 4.0);
        assert_approx_eq!(vehicle.position().y, 2.0);
        assert_approx_eq!(vehicle.position().x, 10.0);
        assert_eq!(vehicle.agent(), &AgentBinding::Pending);
    }

    #[test]
    fn integrate_free_and_blocked() {
        let lane = lane();
        let mut vehicle = vehicle(&lane, 10.0);
        vehicle.integrate(0.5, f64::INFINITY);
        assert_approx_eq!(vehicle.pos_mid(), 7.0);
        assert_approx_eq!(vehicle.vel(), 10.0);

        vehicle.integrate(0.5, 10.0);
        assert_approx_eq!(vehicle.pos_front(), 10.0);
        assert_approx_eq!(vehicle.vel(), 2.0);

        // Never moves backwards
        vehicle.integrate(0.5, 0.0);
        assert_approx_eq!(vehicle.pos_front(), 10.0);
        assert!(vehicle.has_stopped());
    }
}
