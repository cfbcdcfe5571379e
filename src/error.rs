//! Error types.
//!
//! Configuration problems surface from constructors, registration failures
//! are absorbed by the [AgentGateway](crate::AgentGateway), and admission
//! queue misuse is reported per release so the rest of the tick carries on.

use crate::generator::Ticket;
use crate::VehicleId;
use thiserror::Error;

/// An invalid parameter supplied when building a simulation component.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("target speed must be positive and finite, got {0}")]
    NonPositiveSpeed(f64),

    #[error("time headway must be non-negative and finite, got {0}")]
    InvalidTimeHeadway(f64),

    #[error("speed limit must be positive and finite, got {0}")]
    InvalidSpeedLimit(f64),

    #[error("lane length must be positive and finite, got {0}")]
    InvalidLaneLength(f64),

    #[error("lane direction must be a non-zero vector")]
    ZeroDirection,

    #[error("controller period must be non-negative and finite, got {0}")]
    InvalidPeriod(f64),

    #[error("controller start must be finite, got {0}")]
    InvalidStart(f64),

    #[error("simulation horizon must be positive, got {0}")]
    InvalidHorizon(f64),

    #[error("time step must be positive and finite, got {0}")]
    InvalidTimeStep(f64),

    #[error("release threshold must be finite, got {0}")]
    InvalidThreshold(f64),

    #[error("invalid distribution: {0}")]
    Distribution(String),

    #[error("vehicle {0:?} does not exist")]
    UnknownVehicle(VehicleId),

    #[error("lane index {0} is out of range")]
    UnknownLane(usize),

    #[error("demand profile: {0}")]
    Demand(#[from] DemandError),

    #[error("scenario parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A problem with a demand profile table.
#[derive(Debug, Error)]
pub enum DemandError {
    #[error("profile has no samples")]
    Empty,

    #[error("sample times must strictly increase ({prev} is followed by {next})")]
    Unsorted { prev: f64, next: f64 },

    #[error("sample at t={time} has invalid value {value}")]
    InvalidValue { time: f64, value: f64 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A release request which would break FIFO order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("the admission queue is empty")]
    Empty,

    #[error("ticket {requested} is not at the head of the queue (head is {head})")]
    NotAtHead { requested: Ticket, head: Ticket },
}

/// Misuse of a periodic controller's lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("controller ticked before init")]
    NotInitialized,

    #[error("controller initialised twice")]
    AlreadyInitialized,

    #[error("controller used after delete")]
    Deleted,
}

/// Rejection of a driver by the external agent environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("identity {0} is already registered")]
    DuplicateIdentity(String),

    #[error("environment is at capacity ({0} agents)")]
    CapacityExceeded(usize),

    #[error("protocol error: {0}")]
    Protocol(String),
}
