use crate::agent::{AgentEnvironment, AgentGateway, FailurePolicy};
use crate::controller::{
    ControlLogic, ControllerSchedule, ControllerState, OnBoardUnit, PeriodicController, UnitConfig,
};
use crate::error::ConfigError;
use crate::generator::{AdmissionPolicy, Generator, World};
use crate::lane::{Lane, LaneAttributes};
use crate::observer::Observable;
use crate::vehicle::{Vehicle, VehicleFactory};
use crate::{GeneratorId, LaneId, LaneSet, UnitId, VehicleId, VehicleSet};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};

/// The tolerance in s within which two simulation times are equal.
pub const TIME_EPSILON: f64 = 1e-9;

/// The simulation time and horizon.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    /// The current simulation time in s.
    pub time: f64,
    /// The time at which the simulation ends in s.
    pub horizon: f64,
}

impl SimClock {
    /// Whether the horizon has been reached.
    pub fn is_finished(&self) -> bool {
        self.has_reached(self.horizon)
    }

    /// Whether the clock is at or past `time`, to within [`TIME_EPSILON`].
    pub fn has_reached(&self, time: f64) -> bool {
        self.time >= time - TIME_EPSILON
    }

    /// Whether the clock is strictly past `time`, by more than [`TIME_EPSILON`].
    pub fn has_passed(&self, time: f64) -> bool {
        self.time > time + TIME_EPSILON
    }
}

/// A traffic simulation.
pub struct Simulation {
    /// The lanes in the network.
    lanes: LaneSet,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The vehicle generators.
    generators: SlotMap<GeneratorId, Generator>,
    /// The on-board units, each bound to one vehicle.
    units: SlotMap<UnitId, OnBoardUnit>,
    /// The units fitted to vehicles as each generator releases them.
    unit_templates: SecondaryMap<GeneratorId, UnitConfig>,
    /// The gateway drivers are registered through.
    gateway: AgentGateway,
    /// The simulation time in s.
    time: f64,
    /// The time and frame at which the current step length was first used.
    epoch: (f64, usize),
    /// The step length of the previous step in s.
    step_len: Option<f64>,
    /// The simulation horizon in s.
    horizon: f64,
    /// The current frame of simulation.
    frame: usize,
    /// The last issued sequence number.
    seq: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::with_gateway(f64::INFINITY, AgentGateway::default())
    }
}

impl Simulation {
    /// Creates a new simulation without a horizon, registering drivers
    /// with an unbounded in-process environment.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a new simulation with the given horizon and agent gateway.
    pub fn with_gateway(horizon: f64, gateway: AgentGateway) -> Self {
        Self {
            lanes: Default::default(),
            vehicles: Default::default(),
            generators: Default::default(),
            units: Default::default(),
            unit_templates: Default::default(),
            gateway,
            time: 0.0,
            epoch: (0.0, 0),
            step_len: None,
            horizon,
            frame: 0,
            seq: 0,
        }
    }

    /// Creates a new simulation registering drivers with the given environment.
    pub fn with_environment(
        horizon: f64,
        env: impl AgentEnvironment + 'static,
        policy: FailurePolicy,
    ) -> Self {
        Self::with_gateway(horizon, AgentGateway::new(env, policy))
    }

    /// Adds a lane to the network.
    pub fn add_lane(&mut self, attributes: &LaneAttributes) -> Result<LaneId, ConfigError> {
        attributes.validate()?;
        Ok(self.lanes.insert_with_key(|id| Lane::new(id, attributes)))
    }

    /// Adds a generator releasing vehicles made by `factory` onto `lane` according to `policy`.
    pub fn add_generator(
        &mut self,
        lane: LaneId,
        factory: impl VehicleFactory + 'static,
        policy: impl AdmissionPolicy + 'static,
    ) -> GeneratorId {
        self.generators
            .insert_with_key(|id| Generator::new(id, lane, Box::new(factory), Box::new(policy)))
    }

    /// Enables or disables a generator. A disabled generator keeps its queue.
    pub fn set_generator_enabled(&mut self, id: GeneratorId, enabled: bool) {
        if let Some(generator) = self.generators.get_mut(id) {
            generator.set_enabled(enabled);
        }
    }

    /// Fits every vehicle the generator releases from now on with an on-board unit.
    pub fn equip_generator(&mut self, id: GeneratorId, unit: UnitConfig) -> Result<(), ConfigError> {
        if !(unit.period.is_finite() && unit.period >= 0.0) {
            return Err(ConfigError::InvalidPeriod(unit.period));
        }
        if !unit.delay.is_finite() {
            return Err(ConfigError::InvalidStart(unit.delay));
        }
        if self.generators.contains_key(id) {
            self.unit_templates.insert(id, unit);
        }
        Ok(())
    }

    /// Attaches an on-board unit to a vehicle, replacing any existing unit.
    pub fn attach_unit(
        &mut self,
        vehicle_id: VehicleId,
        schedule: ControllerSchedule,
        logic: impl ControlLogic + 'static,
    ) -> Result<UnitId, ConfigError> {
        let old_unit = match self.vehicles.get(vehicle_id) {
            Some(vehicle) => vehicle.unit(),
            None => return Err(ConfigError::UnknownVehicle(vehicle_id)),
        };
        let mut controller = PeriodicController::new(vehicle_id, schedule)?;
        if let Err(err) = controller.init() {
            error!("on-board unit for {:?}: {}", vehicle_id, err);
        }
        if let Some(old_unit) = old_unit {
            self.delete_unit(old_unit);
        }
        let unit_id = self.units.insert(OnBoardUnit {
            controller,
            logic: Box::new(logic),
        });
        self.vehicles[vehicle_id].set_unit(Some(unit_id));
        Ok(unit_id)
    }

    /// Removes a vehicle from the simulation, deleting its on-board unit
    /// and detaching its observers.
    pub fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(vehicle) = self.vehicles.remove(id) {
            self.lanes[vehicle.lane_id()].remove_vehicle(id);
            if let Some(unit_id) = vehicle.unit() {
                self.delete_unit(unit_id);
            }
            vehicle.detach_all_observers();
        }
    }

    /// Advances the simulation by `dt` seconds.
    ///
    /// The time is computed from the number of frames stepped at the current
    /// step length, so repeated steps do not accumulate rounding error.
    pub fn step(&mut self, dt: f64) {
        if self.step_len != Some(dt) {
            self.epoch = (self.time, self.frame);
            self.step_len = Some(dt);
        }
        self.run_generators();
        self.run_units();
        self.integrate(dt);
        self.remove_exited();
        self.frame += 1;
        let (epoch_time, epoch_frame) = self.epoch;
        self.time = epoch_time + (self.frame - epoch_frame) as f64 * dt;
    }

    /// Steps the simulation until the horizon is reached.
    /// Does nothing if the horizon is infinite.
    pub fn run(&mut self, dt: f64) {
        if !self.horizon.is_finite() || dt <= 0.0 {
            return;
        }
        while !self.clock().is_finished() {
            self.step(dt);
        }
    }

    /// The simulation clock.
    pub fn clock(&self) -> SimClock {
        SimClock {
            time: self.time,
            horizon: self.horizon,
        }
    }

    /// Gets the current simulation time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Returns an iterator over all the lanes in the simulation.
    pub fn iter_lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.values()
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Returns an iterator over all the generators in the simulation.
    pub fn iter_generators(&self) -> impl Iterator<Item = &Generator> {
        self.generators.values()
    }

    /// Gets a reference to the vehicle with the given ID, if it is still simulated.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// Gets a mutable reference to the vehicle with the given ID, if it is still simulated.
    pub fn get_vehicle_mut(&mut self, vehicle_id: VehicleId) -> Option<&mut Vehicle> {
        self.vehicles.get_mut(vehicle_id)
    }

    /// Gets a reference to the lane with the given ID.
    pub fn get_lane(&self, lane_id: LaneId) -> &Lane {
        &self.lanes[lane_id]
    }

    /// The free distance in m between a lane's entry point and its nearest vehicle.
    pub fn space_headway(&self, lane_id: LaneId) -> f64 {
        self.lanes[lane_id].space_headway(&self.vehicles)
    }

    /// Gets a reference to the generator with the given ID.
    pub fn get_generator(&self, generator_id: GeneratorId) -> &Generator {
        &self.generators[generator_id]
    }

    /// Gets a reference to the on-board unit with the given ID, if it still exists.
    pub fn get_unit(&self, unit_id: UnitId) -> Option<&OnBoardUnit> {
        self.units.get(unit_id)
    }

    /// The number of on-board units.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// The agent gateway.
    pub fn gateway(&self) -> &AgentGateway {
        &self.gateway
    }

    /// Runs each generator's admission policy, then fits on-board units
    /// to the vehicles released by equipped generators.
    fn run_generators(&mut self) {
        let clock = self.clock();
        let mut fitted = vec![];
        for generator in self.generators.values_mut() {
            let released = generator.tick(World {
                clock,
                lanes: &mut self.lanes,
                vehicles: &mut self.vehicles,
                gateway: &mut self.gateway,
                seq: &mut self.seq,
            });
            if !released.is_empty() {
                debug!(
                    "frame {}: {:?} released {} vehicle(s), {} queued",
                    self.frame,
                    generator.id(),
                    released.len(),
                    generator.queue_len()
                );
            }
            if let Some(unit) = self.unit_templates.get(generator.id()) {
                fitted.extend(released.iter().map(|vehicle| (*vehicle, *unit)));
            }
        }

        for (vehicle_id, unit) in fitted {
            if let Err(err) = self.attach_unit(vehicle_id, unit.schedule(clock.time), unit.logic()) {
                error!("failed to fit on-board unit to {:?}: {}", vehicle_id, err);
            }
        }
    }

    /// Ticks each on-board unit and runs the logic of those which are due.
    fn run_units(&mut self) {
        let now = self.time;
        for (unit_id, unit) in &mut self.units {
            match unit.controller.tick(now) {
                Ok(ControllerState::Active) => {}
                Ok(ControllerState::Idle) => continue,
                Err(err) => {
                    error!("on-board unit {:?}: {}", unit_id, err);
                    continue;
                }
            }
            let vehicle = unit
                .controller
                .owner()
                .and_then(|owner| self.vehicles.get_mut(owner));
            match vehicle {
                Some(vehicle) => unit.logic.control(vehicle, now),
                None => error!("on-board unit {:?} has no vehicle", unit_id),
            }
        }
    }

    /// Integrates the positions of all vehicles and notifies their observers.
    fn integrate(&mut self, dt: f64) {
        for lane in self.lanes.values() {
            lane.integrate(&mut self.vehicles, dt);
        }
        for vehicle in self.vehicles.values() {
            vehicle.notify_observers();
        }
    }

    /// Removes the vehicles which have driven off the end of their lane.
    fn remove_exited(&mut self) {
        let exited = self
            .lanes
            .values()
            .flat_map(|lane| lane.exited_vehicles(&self.vehicles))
            .collect::<Vec<_>>();

        for vehicle_id in exited {
            if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
                vehicle.set_exited();
                vehicle.notify_observers();
            }
            self.remove_vehicle(vehicle_id);
        }
    }

    /// Deletes an on-board unit, clearing its vehicle's reference to it.
    fn delete_unit(&mut self, unit_id: UnitId) {
        if let Some(mut unit) = self.units.remove(unit_id) {
            match unit.controller.delete() {
                Ok(owner) => {
                    if let Some(vehicle) = self.vehicles.get_mut(owner) {
                        vehicle.set_unit(None);
                    }
                }
                Err(err) => error!("on-board unit {:?}: {}", unit_id, err),
            }
        }
    }
}
