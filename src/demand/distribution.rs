use crate::error::ConfigError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};

/// Mixes a draw index into a seed so consecutive draws are independent.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// A stateless sampler of non-negative headway multipliers.
///
/// Each draw is a pure function of `(seed, index)`, so a generator can be
/// re-run, or reseeded, and reproduce exactly the same sequence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeadwayDistribution {
    /// Always returns the same value.
    Constant { value: f64 },
    /// Exponential with the given mean; a Poisson arrival process.
    Exponential { mean: f64 },
    /// Uniform on `[min, max]`.
    Uniform { min: f64, max: f64 },
    /// Normal, truncated at zero.
    Normal { mean: f64, std_dev: f64 },
    /// Log-normal parameterised by the mean and standard deviation of the samples.
    LogNormal { mean: f64, std_dev: f64 },
}

impl Default for HeadwayDistribution {
    fn default() -> Self {
        Self::Exponential { mean: 1.0 }
    }
}

impl HeadwayDistribution {
    /// Checks the parameters, so that [Self::sample] never has to fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use HeadwayDistribution::*;
        let ok = match *self {
            Constant { value } => value.is_finite() && value >= 0.0,
            Exponential { mean } => mean.is_finite() && mean > 0.0,
            Uniform { min, max } => min.is_finite() && max.is_finite() && 0.0 <= min && min <= max,
            Normal { mean, std_dev } => mean.is_finite() && std_dev.is_finite() && std_dev >= 0.0,
            LogNormal { mean, std_dev } => {
                mean.is_finite() && mean > 0.0 && std_dev.is_finite() && std_dev >= 0.0
            }
        };
        if ok {
            Ok(())
        } else {
            Err(ConfigError::Distribution(format!("{:?}", self)))
        }
    }

    /// The mean of the samples, before truncation at zero.
    pub fn mean(&self) -> f64 {
        use HeadwayDistribution::*;
        match *self {
            Constant { value } => value,
            Exponential { mean } => mean,
            Uniform { min, max } => 0.5 * (min + max),
            Normal { mean, .. } | LogNormal { mean, .. } => mean,
        }
    }

    /// Draws the `index`th value of the sequence identified by `seed`.
    /// The result is always non-negative; invalid parameters yield zero.
    pub fn sample(&self, seed: u64, index: u64) -> f64 {
        let mut rng = StdRng::seed_from_u64(seed ^ index.wrapping_mul(MIXING_CONSTANT));
        let value = self.sample_with(&mut rng).unwrap_or(0.0);
        f64::max(value, 0.0)
    }

    fn sample_with(&self, rng: &mut StdRng) -> Option<f64> {
        use HeadwayDistribution::*;
        let value = match *self {
            Constant { value } => value,
            Exponential { mean } => Exp::new(1.0 / mean).ok()?.sample(rng),
            Uniform { min, max } if min == max => min,
            Uniform { min, max } => rand_distr::Uniform::new_inclusive(min, max).sample(rng),
            Normal { mean, std_dev } => rand_distr::Normal::new(mean, std_dev).ok()?.sample(rng),
            LogNormal { mean, std_dev } => {
                // Convert the moments of the samples into those of the underlying normal
                let var = (std_dev / mean).powi(2);
                let sigma = f64::sqrt(f64::ln(1.0 + var));
                let mu = f64::ln(mean) - 0.5 * sigma * sigma;
                rand_distr::LogNormal::new(mu, sigma).ok()?.sample(rng)
            }
        };
        Some(value)
    }
}
