//! Arrival demand: headway distributions and time-indexed demand tables.

pub use distribution::HeadwayDistribution;
pub use profile::{DemandProfile, DemandSample, Interpolation};

mod distribution;
mod profile;
