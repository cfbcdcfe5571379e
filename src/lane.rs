use crate::error::ConfigError;
use crate::math::{Point2d, Vector2d};
use crate::{LaneId, VehicleId, VehicleSet};
use cgmath::prelude::*;
use serde::{Deserialize, Serialize};

/// The minimum gap to maintain between vehicles in m.
const MIN_GAP: f64 = 2.0;

/// A lane represents a single straight entry segment of the network.
#[derive(Clone, Debug)]
pub struct Lane {
    /// The lane ID.
    id: LaneId,
    /// The world space coordinates of the entry point.
    entry: Point2d,
    /// A unit vector in the direction of travel.
    dir: Vector2d,
    /// The length of the lane in m.
    length: f64,
    /// Speed limit in m/s.
    speed_limit: f64,
    /// The vehicles on the lane, ordered from the entry point forwards.
    vehicles: Vec<VehicleId>,
}

/// The attributes of a lane.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LaneAttributes {
    /// The world space coordinates of the entry point.
    pub entry: [f64; 2],
    /// The direction of travel; need not be normalised.
    pub direction: [f64; 2],
    /// The length of the lane in m.
    pub length: f64,
    /// The speed limit in m/s.
    pub speed_limit: f64,
}

impl LaneAttributes {
    /// Checks that the lane has a positive length and speed limit
    /// and a non-zero direction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.speed_limit.is_finite() && self.speed_limit > 0.0) {
            return Err(ConfigError::InvalidSpeedLimit(self.speed_limit));
        }
        if !(self.length.is_finite() && self.length > 0.0) {
            return Err(ConfigError::InvalidLaneLength(self.length));
        }
        let mag2 = Vector2d::from(self.direction).magnitude2();
        if mag2 == 0.0 || !mag2.is_finite() {
            return Err(ConfigError::ZeroDirection);
        }
        Ok(())
    }
}

impl Lane {
    /// Creates a new lane. The attributes must have been validated.
    pub(crate) fn new(id: LaneId, attribs: &LaneAttributes) -> Self {
        Self {
            id,
            entry: Point2d::from(attribs.entry),
            dir: Vector2d::from(attribs.direction).normalize(),
            length: attribs.length,
            speed_limit: attribs.speed_limit,
            vehicles: vec![],
        }
    }

    /// Gets the lane's ID.
    pub fn id(&self) -> LaneId {
        self.id
    }

    /// Gets the length of the lane in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Gets the speed limit in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    /// The world space coordinates of the entry point.
    pub fn entry_position(&self) -> Point2d {
        self.entry
    }

    /// A unit vector in the direction of travel.
    pub fn direction(&self) -> Vector2d {
        self.dir
    }

    /// The world space coordinates of a longitudinal position along the lane.
    pub fn sample(&self, pos: f64) -> Point2d {
        self.entry + pos * self.dir
    }

    /// The vehicles on the lane, ordered from the entry point forwards.
    pub fn vehicles(&self) -> &[VehicleId] {
        &self.vehicles
    }

    /// The free distance in m between the entry point and the rear of the
    /// nearest vehicle on the lane, or infinity if the lane is empty.
    pub fn space_headway(&self, vehicles: &VehicleSet) -> f64 {
        self.vehicles
            .first()
            .map(|id| f64::max(vehicles[*id].pos_rear(), 0.0))
            .unwrap_or(f64::INFINITY)
    }

    /// Inserts the vehicle with the given ID into the lane, behind any
    /// vehicles already at the same position.
    pub(crate) fn insert_vehicle(&mut self, vehicles: &VehicleSet, id: VehicleId) {
        let veh_pos = vehicles[id].pos_mid();
        let idx = self
            .vehicles
            .iter()
            .map(|id| vehicles[*id].pos_mid())
            .position(|pos| pos >= veh_pos)
            .unwrap_or(self.vehicles.len());
        self.vehicles.insert(idx, id);
    }

    /// Removes the vehicle with the given ID from the lane.
    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(idx) = self.vehicles.iter().rposition(|v| *v == id) {
            self.vehicles.remove(idx);
        }
    }

    /// Advances the vehicles on this lane by `dt` seconds, front to back,
    /// so that no vehicle closes within [MIN_GAP] of the one ahead.
    pub(crate) fn integrate(&self, vehicles: &mut VehicleSet, dt: f64) {
        let mut limit = f64::INFINITY;
        for id in self.vehicles.iter().rev() {
            let vehicle = &mut vehicles[*id];
            vehicle.integrate(dt, limit);
            vehicle.update_coords(self);
            limit = vehicle.pos_rear() - MIN_GAP;
        }
    }

    /// The vehicles whose rear has passed the end of the lane.
    pub(crate) fn exited_vehicles<'a>(
        &'a self,
        vehicles: &'a VehicleSet,
    ) -> impl Iterator<Item = VehicleId> + 'a {
        self.vehicles
            .iter()
            .copied()
            .filter(move |id| vehicles[*id].pos_rear() > self.length)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vehicle::{Driver, DriverId, PendingVehicle, Vehicle, VehicleAttributes};
    use slotmap::SlotMap;

    fn lane() -> Lane {
        let mut lanes = SlotMap::<LaneId, ()>::with_key();
        Lane::new(
            lanes.insert(()),
            &LaneAttributes {
                entry: [0.0, 0.0],
                direction: [1.0, 0.0],
                length: 100.0,
                speed_limit: 20.0,
            },
        )
    }

    fn place(lane: &mut Lane, vehicles: &mut VehicleSet, offset: f64, driver: u64) -> VehicleId {
        let pending = PendingVehicle::new(
            VehicleAttributes::default(),
            offset,
            Driver::new(DriverId(driver), "car"),
        );
        let id = vehicles.insert_with_key(|id| Vehicle::new(id, pending, lane));
        lane.insert_vehicle(vehicles, id);
        id
    }

    #[test]
    fn later_vehicle_goes_behind_at_same_position() {
        let mut lane = lane();
        let mut vehicles = VehicleSet::with_key();
        let first = place(&mut lane, &mut vehicles, 0.0, 1);
        let second = place(&mut lane, &mut vehicles, 0.0, 2);
        let third = place(&mut lane, &mut vehicles, 0.0, 3);
        assert_eq!(lane.vehicles(), &[third, second, first]);

        let ahead = place(&mut lane, &mut vehicles, 20.0, 4);
        let between = place(&mut lane, &mut vehicles, 10.0, 5);
        assert_eq!(lane.vehicles(), &[third, second, first, between, ahead]);
    }
}
