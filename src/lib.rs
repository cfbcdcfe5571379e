pub use agent::{
    AgentEnvironment, AgentGateway, AgentIdentity, FailurePolicy, LocalEnvironment,
    RegistrationOutcome, RegistrationRecord,
};
pub use cgmath;
pub use config::{
    DemandPolicyConfig, GeneratorConfig, PolicyConfig, ProfileSource, ScenarioConfig,
    SimulationConfig, VehicleMix, VehicleTemplate,
};
pub use controller::{
    ControlLogic, ControllerSchedule, ControllerState, OnBoardUnit, PeriodicController,
    SpeedSetpoint, UnitConfig,
};
pub use lane::{Lane, LaneAttributes};
pub use simulation::{SimClock, Simulation, TIME_EPSILON};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use vehicle::{
    AgentBinding, Driver, DriverId, PendingVehicle, TemplateFactory, Vehicle, VehicleAttributes,
    VehicleFactory, DEFAULT_ROLE,
};

mod agent;
mod config;
mod controller;
pub mod demand;
pub mod error;
pub mod generator;
mod lane;
pub mod math;
pub mod observer;
mod simulation;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Lane].
    pub struct LaneId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
    /// Unique ID of a [Generator](generator::Generator).
    pub struct GeneratorId;
    /// Unique ID of an [OnBoardUnit].
    pub struct UnitId;
}

type LaneSet = SlotMap<LaneId, Lane>;
type VehicleSet = SlotMap<VehicleId, Vehicle>;
