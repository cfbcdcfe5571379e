//! Time-indexed demand tables.
//!
//! # CSV format
//!
//! One row per sample, ordered by time:
//!
//! ```csv
//! time,value
//! 0,600
//! 900,1200
//! 1800,300
//! ```
//!
//! `time` is in simulation seconds, `value` is the target arrival rate in
//! vehicles per hour.

use crate::error::DemandError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// A single `(time, value)` sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandSample {
    /// The simulation time in s.
    pub time: f64,
    /// The target arrival rate in veh/h.
    pub value: f64,
}

/// How a [DemandProfile] is evaluated between samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Holds each sample's value until the next sample.
    #[default]
    Step,
    /// Interpolates linearly between neighbouring samples.
    Linear,
}

/// An ordered table of arrival rates over the simulation horizon.
/// Read-only once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProfileRepr", into = "ProfileRepr")]
pub struct DemandProfile {
    samples: Vec<DemandSample>,
    interpolation: Interpolation,
}

#[derive(Serialize, Deserialize)]
struct ProfileRepr {
    samples: Vec<DemandSample>,
    #[serde(default)]
    interpolation: Interpolation,
}

impl TryFrom<ProfileRepr> for DemandProfile {
    type Error = DemandError;

    fn try_from(repr: ProfileRepr) -> Result<Self, Self::Error> {
        Self::new(repr.samples, repr.interpolation)
    }
}

impl From<DemandProfile> for ProfileRepr {
    fn from(profile: DemandProfile) -> Self {
        Self {
            samples: profile.samples,
            interpolation: profile.interpolation,
        }
    }
}

impl DemandProfile {
    /// Creates a profile, checking that there is at least one sample, that
    /// times strictly increase and that every value is finite and non-negative.
    pub fn new(
        samples: Vec<DemandSample>,
        interpolation: Interpolation,
    ) -> Result<Self, DemandError> {
        if samples.is_empty() {
            return Err(DemandError::Empty);
        }
        if let Some(sample) = samples
            .iter()
            .find(|s| !s.time.is_finite() || !s.value.is_finite() || s.value < 0.0)
        {
            return Err(DemandError::InvalidValue {
                time: sample.time,
                value: sample.value,
            });
        }
        if let Some((prev, next)) = samples
            .iter()
            .tuple_windows()
            .find(|(prev, next)| next.time <= prev.time)
        {
            return Err(DemandError::Unsorted {
                prev: prev.time,
                next: next.time,
            });
        }
        Ok(Self {
            samples,
            interpolation,
        })
    }

    /// A profile with the same rate at all times.
    pub fn constant(value: f64) -> Result<Self, DemandError> {
        Self::new(vec![DemandSample { time: 0.0, value }], Interpolation::Step)
    }

    /// Loads a profile from a CSV file.
    pub fn load_csv(path: &Path, interpolation: Interpolation) -> Result<Self, DemandError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, interpolation)
    }

    /// Like [Self::load_csv] but accepts any `Read` source.
    pub fn from_reader<R: Read>(reader: R, interpolation: Interpolation) -> Result<Self, DemandError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let samples = csv_reader
            .deserialize::<DemandSample>()
            .map(|row| row.map_err(|e| DemandError::Parse(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(samples, interpolation)
    }

    /// The samples, ordered by time.
    pub fn samples(&self) -> &[DemandSample] {
        &self.samples
    }

    /// The interpolation mode.
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Gets the arrival rate in veh/h at the given time.
    /// Times before the first sample take the first sample's value,
    /// times after the last take the last sample's value.
    pub fn value_at(&self, time: f64) -> f64 {
        let idx = self.samples.partition_point(|s| s.time <= time);
        if idx == 0 {
            return self.samples[0].value;
        }
        let prev = self.samples[idx - 1];
        match (self.interpolation, self.samples.get(idx)) {
            (Interpolation::Linear, Some(next)) => {
                let t = (time - prev.time) / (next.time - prev.time);
                prev.value + t * (next.value - prev.value)
            }
            _ => prev.value,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn samples(pairs: &[(f64, f64)]) -> Vec<DemandSample> {
        pairs
            .iter()
            .map(|&(time, value)| DemandSample { time, value })
            .collect()
    }

    #[test]
    fn step_lookup() {
        let profile = DemandProfile::new(
            samples(&[(0.0, 600.0), (100.0, 1200.0), (200.0, 0.0)]),
            Interpolation::Step,
        )
        .unwrap();
        assert_eq!(profile.value_at(-5.0), 600.0);
        assert_eq!(profile.value_at(0.0), 600.0);
        assert_eq!(profile.value_at(99.9), 600.0);
        assert_eq!(profile.value_at(100.0), 1200.0);
        assert_eq!(profile.value_at(1e6), 0.0);
    }

    #[test]
    fn linear_lookup() {
        let profile = DemandProfile::new(
            samples(&[(10.0, 0.0), (20.0, 100.0)]),
            Interpolation::Linear,
        )
        .unwrap();
        assert_approx_eq!(profile.value_at(0.0), 0.0);
        assert_approx_eq!(profile.value_at(15.0), 50.0);
        assert_approx_eq!(profile.value_at(17.5), 75.0);
        assert_approx_eq!(profile.value_at(30.0), 100.0);
    }

    #[test]
    fn rejects_bad_tables() {
        assert!(matches!(
            DemandProfile::new(vec![], Interpolation::Step),
            Err(DemandError::Empty)
        ));
        assert!(matches!(
            DemandProfile::new(samples(&[(0.0, 1.0), (0.0, 2.0)]), Interpolation::Step),
            Err(DemandError::Unsorted { .. })
        ));
        assert!(matches!(
            DemandProfile::new(samples(&[(0.0, -1.0)]), Interpolation::Step),
            Err(DemandError::InvalidValue { .. })
        ));
    }

    #[test]
    fn loads_csv() {
        let data = "time,value\n0,600\n 900 , 1200\n1800,300\n";
        let profile = DemandProfile::from_reader(data.as_bytes(), Interpolation::Step).unwrap();
        assert_eq!(profile.samples().len(), 3);
        assert_eq!(profile.value_at(1000.0), 1200.0);
    }

    #[test]
    fn csv_parse_error() {
        let data = "time,value\n0,lots\n";
        let result = DemandProfile::from_reader(data.as_bytes(), Interpolation::Step);
        assert!(matches!(result, Err(DemandError::Parse(_))));
    }

    #[test]
    fn json_validates() {
        let json = r#"{"samples":[{"time":5,"value":1},{"time":1,"value":1}]}"#;
        assert!(serde_json::from_str::<DemandProfile>(json).is_err());
        let json = r#"{"samples":[{"time":0,"value":360}],"interpolation":"linear"}"#;
        let profile: DemandProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.interpolation(), Interpolation::Linear);
    }
}
