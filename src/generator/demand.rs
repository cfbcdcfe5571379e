use super::{AdmissionPolicy, ControlContext, Release};
use crate::demand::{DemandProfile, HeadwayDistribution};
use crate::error::ConfigError;
use crate::simulation::TIME_EPSILON;
use crate::vehicle::DEFAULT_ROLE;
use log::error;
use serde::{Deserialize, Serialize};

/// Seconds per hour, converting rates in veh/h into mean headways.
const SECS_PER_HOUR: f64 = 3600.0;

/// The shortest headway between generated vehicles in s.
const MIN_HEADWAY: f64 = 0.1;

/// The parameters of a [DemandGeneration] policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandConfig {
    /// The headway multiplier distribution; a mean of 1 reproduces the profile's rate.
    #[serde(default)]
    pub distribution: HeadwayDistribution,
    /// The arrival rate in veh/h over time.
    pub profile: DemandProfile,
    /// The seed of the headway draws.
    #[serde(default)]
    pub seed: u64,
    /// The speed vehicles enter the lane at in m/s; defaults to the speed limit.
    #[serde(default)]
    pub speed: Option<f64>,
    /// The role of the generated drivers.
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_owned()
}

/// Generates vehicles at sampled inter-arrival times whose mean follows a
/// demand profile. Vehicles are released as soon as they arrive, without a
/// gap-acceptance test.
#[derive(Clone, Debug)]
pub struct DemandGeneration {
    config: DemandConfig,
    /// The time of the next arrival, if one is scheduled.
    next_arrival: Option<f64>,
    /// The number of headways drawn so far.
    draws: u64,
}

impl DemandGeneration {
    /// Creates the policy.
    pub fn new(config: DemandConfig) -> Result<Self, ConfigError> {
        config.distribution.validate()?;
        if let Some(speed) = config.speed {
            if !(speed.is_finite() && speed > 0.0) {
                return Err(ConfigError::NonPositiveSpeed(speed));
            }
        }
        Ok(Self {
            config,
            next_arrival: None,
            draws: 0,
        })
    }

    /// The time of the next scheduled arrival, if any.
    pub fn next_arrival(&self) -> Option<f64> {
        self.next_arrival
    }

    /// Restarts the headway draws from a new seed.
    pub fn reseed(&mut self, seed: u64) {
        self.config.seed = seed;
        self.draws = 0;
        self.next_arrival = None;
    }

    /// Draws the headway following an arrival at `time`.
    /// Returns `None` while the profile's rate is zero.
    fn headway_after(&mut self, time: f64) -> Option<f64> {
        let rate = self.config.profile.value_at(time);
        if rate <= 0.0 {
            return None;
        }
        let sample = self.config.distribution.sample(self.config.seed, self.draws);
        self.draws += 1;
        Some(f64::max(sample * SECS_PER_HOUR / rate, MIN_HEADWAY))
    }
}

impl AdmissionPolicy for DemandGeneration {
    fn control(&mut self, ctx: &mut ControlContext<'_>) {
        let now = ctx.now();
        if self.next_arrival.is_none() {
            self.next_arrival = self.headway_after(now).map(|h| now + h);
        }

        let speed = self
            .config
            .speed
            .unwrap_or_else(|| ctx.lane().speed_limit());
        // Arrivals since the last tick enter at the distance they have travelled
        while let Some(arrival) = self.next_arrival.filter(|t| *t <= now + TIME_EPSILON) {
            ctx.manufacture_at(speed, &self.config.role, (now - arrival) * speed);
            self.next_arrival = self.headway_after(arrival).map(|h| arrival + h);
        }

        while !ctx.queue().is_empty() {
            match ctx.release_head() {
                Ok(Release::Placed { .. }) => {}
                Ok(Release::Held(_)) => break,
                Err(err) => {
                    error!("demand release failed: {}", err);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::demand::{DemandSample, Interpolation};

    fn config(distribution: HeadwayDistribution, rate: f64) -> DemandConfig {
        DemandConfig {
            distribution,
            profile: DemandProfile::constant(rate).unwrap(),
            seed: 3,
            speed: None,
            role: "car".into(),
        }
    }

    #[test]
    fn constant_headway_from_rate() {
        let mut policy =
            DemandGeneration::new(config(HeadwayDistribution::Constant { value: 1.0 }, 720.0)).unwrap();
        assert_eq!(policy.headway_after(0.0), Some(5.0));
        assert_eq!(policy.headway_after(100.0), Some(5.0));
    }

    #[test]
    fn zero_rate_suspends() {
        let profile = DemandProfile::new(
            vec![
                DemandSample {
                    time: 0.0,
                    value: 0.0,
                },
                DemandSample {
                    time: 60.0,
                    value: 360.0,
                },
            ],
            Interpolation::Step,
        )
        .unwrap();
        let mut policy = DemandGeneration::new(DemandConfig {
            profile,
            ..config(HeadwayDistribution::Constant { value: 1.0 }, 1.0)
        })
        .unwrap();
        assert_eq!(policy.headway_after(30.0), None);
        assert_eq!(policy.headway_after(60.0), Some(10.0));
    }

    #[test]
    fn reseed_restarts_draws() {
        let mut policy =
            DemandGeneration::new(config(HeadwayDistribution::Exponential { mean: 1.0 }, 600.0)).unwrap();
        let first = (0..10).map(|_| policy.headway_after(0.0)).collect::<Vec<_>>();
        policy.reseed(3);
        let again = (0..10).map(|_| policy.headway_after(0.0)).collect::<Vec<_>>();
        assert_eq!(first, again);
        policy.reseed(4);
        let other = (0..10).map(|_| policy.headway_after(0.0)).collect::<Vec<_>>();
        assert_ne!(first, other);
    }

    #[test]
    fn rejects_bad_config() {
        assert!(DemandGeneration::new(config(HeadwayDistribution::Exponential { mean: -1.0 }, 600.0)).is_err());
        let bad_speed = DemandConfig {
            speed: Some(0.0),
            ..config(HeadwayDistribution::default(), 600.0)
        };
        assert!(matches!(
            DemandGeneration::new(bad_speed),
            Err(ConfigError::NonPositiveSpeed(_))
        ));
    }
}
