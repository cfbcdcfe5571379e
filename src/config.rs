//! JSON scenario files.
//!
//! ```json
//! {
//!   "simulation": { "horizon": 120, "time_step": 0.1, "failure_policy": "fail_open" },
//!   "lanes": [
//!     { "entry": [0, 0], "direction": [1, 0], "length": 200, "speed_limit": 15 }
//!   ],
//!   "generators": [
//!     {
//!       "lane": 0,
//!       "policy": { "type": "headway", "target_speed": 12, "time_headway": 1.5 }
//!     },
//!     {
//!       "lane": 0,
//!       "policy": {
//!         "type": "demand",
//!         "profile": { "csv": "demand.csv", "interpolation": "linear" },
//!         "seed": 7
//!       },
//!       "unit": { "period": 1.0, "target_speed": 8 }
//!     }
//!   ]
//! }
//! ```
//!
//! Relative CSV paths are resolved against the directory of the scenario file.

use crate::agent::{FailurePolicy, LocalEnvironment};
use crate::controller::UnitConfig;
use crate::demand::{DemandProfile, HeadwayDistribution, Interpolation};
use crate::error::ConfigError;
use crate::generator::{
    DemandConfig, DemandGeneration, HeadwayConfig, HeadwayRelease, ScriptedConfig, ScriptedRelease,
};
use crate::lane::LaneAttributes;
use crate::simulation::Simulation;
use crate::vehicle::{TemplateFactory, VehicleAttributes, DEFAULT_ROLE};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A complete scenario: simulation settings, the lanes and their generators.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub lanes: Vec<LaneAttributes>,
    #[serde(default)]
    pub generators: Vec<GeneratorConfig>,
    /// The directory relative CSV paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// Global simulation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// The time at which the simulation ends in s.
    pub horizon: f64,
    /// The length of a tick in s.
    pub time_step: f64,
    /// What happens to vehicles whose driver cannot be registered.
    pub failure_policy: FailurePolicy,
    /// The number of agents the environment accepts; unlimited if absent.
    pub agent_capacity: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizon: 60.0,
            time_step: 0.1,
            failure_policy: FailurePolicy::default(),
            agent_capacity: None,
        }
    }
}

/// A generator and the lane it feeds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// The index of the lane in [ScenarioConfig::lanes].
    pub lane: usize,
    pub policy: PolicyConfig,
    #[serde(default)]
    pub vehicles: VehicleMix,
    /// The on-board unit fitted to each released vehicle, if any.
    #[serde(default)]
    pub unit: Option<UnitConfig>,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

/// The admission policy of a generator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyConfig {
    Headway(HeadwayConfig),
    Demand(DemandPolicyConfig),
    Scripted(ScriptedConfig),
}

/// Like [DemandConfig], but the profile may be kept in a CSV file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DemandPolicyConfig {
    #[serde(default)]
    pub distribution: HeadwayDistribution,
    pub profile: ProfileSource,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_owned()
}

/// Where a demand profile comes from.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileSource {
    /// A CSV file of `time,value` rows.
    Csv {
        csv: PathBuf,
        #[serde(default)]
        interpolation: Interpolation,
    },
    /// A constant arrival rate in veh/h.
    Rate(f64),
    Inline(DemandProfile),
}

impl ProfileSource {
    /// Loads or builds the profile.
    pub fn resolve(&self, base_dir: Option<&Path>) -> Result<DemandProfile, ConfigError> {
        let profile = match self {
            Self::Csv { csv, interpolation } => {
                let path = match base_dir {
                    Some(dir) if csv.is_relative() => dir.join(csv),
                    _ => csv.clone(),
                };
                DemandProfile::load_csv(&path, *interpolation)?
            }
            Self::Rate(rate) => DemandProfile::constant(*rate)?,
            Self::Inline(profile) => profile.clone(),
        };
        Ok(profile)
    }
}

/// The vehicles a generator manufactures.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VehicleMix {
    /// The vehicle templates; the default vehicle if empty.
    #[serde(default)]
    pub templates: Vec<VehicleTemplate>,
    /// The seed of the template choice.
    #[serde(default)]
    pub seed: u64,
}

/// A vehicle template and its relative frequency.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleTemplate {
    pub width: f64,
    pub length: f64,
    #[serde(default = "unit_weight")]
    pub weight: f64,
}

fn unit_weight() -> f64 {
    1.0
}

impl VehicleMix {
    /// Builds the vehicle factory.
    pub fn factory(&self) -> TemplateFactory {
        let templates = self
            .templates
            .iter()
            .map(|t| {
                let attributes = VehicleAttributes {
                    width: t.width,
                    length: t.length,
                };
                (attributes, t.weight)
            })
            .collect::<Vec<_>>();
        if templates.is_empty() {
            TemplateFactory::default()
        } else {
            TemplateFactory::weighted(&templates, self.seed)
        }
    }
}

impl ScenarioConfig {
    /// Parses a scenario from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a scenario from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&json)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Validates the scenario and builds the simulation it describes.
    pub fn build(&self) -> Result<Simulation, ConfigError> {
        let settings = &self.simulation;
        if !(settings.horizon > 0.0) {
            return Err(ConfigError::InvalidHorizon(settings.horizon));
        }
        if !(settings.time_step.is_finite() && settings.time_step > 0.0) {
            return Err(ConfigError::InvalidTimeStep(settings.time_step));
        }

        let env = match settings.agent_capacity {
            Some(capacity) => LocalEnvironment::with_capacity(capacity),
            None => LocalEnvironment::unbounded(),
        };
        let mut sim = Simulation::with_environment(settings.horizon, env, settings.failure_policy);

        let lanes = self
            .lanes
            .iter()
            .map(|lane| sim.add_lane(lane))
            .collect::<Result<Vec<_>, _>>()?;

        for generator in &self.generators {
            let lane = *lanes
                .get(generator.lane)
                .ok_or(ConfigError::UnknownLane(generator.lane))?;
            let factory = generator.vehicles.factory();
            let id = match &generator.policy {
                PolicyConfig::Headway(config) => {
                    sim.add_generator(lane, factory, HeadwayRelease::new(config.clone())?)
                }
                PolicyConfig::Demand(config) => {
                    let policy = DemandGeneration::new(DemandConfig {
                        distribution: config.distribution,
                        profile: config.profile.resolve(self.base_dir.as_deref())?,
                        seed: config.seed,
                        speed: config.speed,
                        role: config.role.clone(),
                    })?;
                    sim.add_generator(lane, factory, policy)
                }
                PolicyConfig::Scripted(config) => {
                    sim.add_generator(lane, factory, ScriptedRelease::new(config.clone())?)
                }
            };
            if let Some(unit) = generator.unit {
                sim.equip_generator(id, unit)?;
            }
            sim.set_generator_enabled(id, generator.enabled);
        }

        info!(
            "built scenario: {} lane(s), {} generator(s), horizon {} s",
            self.lanes.len(),
            self.generators.len(),
            settings.horizon
        );
        Ok(sim)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::DemandError;

    const SCENARIO: &str = r#"{
        "simulation": { "horizon": 30, "time_step": 0.5, "agent_capacity": 10 },
        "lanes": [
            { "entry": [0, 0], "direction": [1, 0], "length": 100, "speed_limit": 10 },
            { "entry": [0, 5], "direction": [1, 0], "length": 100, "speed_limit": 10 }
        ],
        "generators": [
            { "lane": 0, "policy": { "type": "headway", "target_speed": 10, "time_headway": 2 } },
            {
                "lane": 1,
                "policy": {
                    "type": "demand",
                    "distribution": { "kind": "constant", "value": 1 },
                    "profile": { "samples": [{ "time": 0, "value": 720 }] }
                },
                "vehicles": { "templates": [{ "width": 2, "length": 5 }] },
                "unit": { "period": 1, "target_speed": 5 }
            },
            { "lane": 1, "policy": { "type": "scripted", "threshold": 3, "role": "tailgater" }, "enabled": false }
        ]
    }"#;

    #[test]
    fn parses_and_builds() {
        let config = ScenarioConfig::from_json(SCENARIO).unwrap();
        assert_eq!(config.simulation.time_step, 0.5);
        assert_eq!(config.simulation.failure_policy, FailurePolicy::FailOpen);
        assert!(matches!(config.generators[1].policy, PolicyConfig::Demand(_)));
        assert!(!config.generators[2].enabled);

        let sim = config.build().unwrap();
        assert_eq!(sim.iter_lanes().count(), 2);
        assert_eq!(sim.iter_generators().count(), 3);
        assert_eq!(sim.iter_generators().filter(|g| g.is_enabled()).count(), 2);
        assert_eq!(sim.clock().horizon, 30.0);
    }

    #[test]
    fn defaults() {
        let config = ScenarioConfig::from_json(
            r#"{ "lanes": [{ "entry": [0, 0], "direction": [0, 1], "length": 50, "speed_limit": 5 }] }"#,
        )
        .unwrap();
        assert_eq!(config.simulation, SimulationConfig::default());
        assert!(config.generators.is_empty());
        assert!(config.build().is_ok());
    }

    #[test]
    fn rate_shorthand() {
        let source: ProfileSource = serde_json::from_str("900").unwrap();
        let profile = source.resolve(None).unwrap();
        assert_eq!(profile.value_at(1000.0), 900.0);
    }

    #[test]
    fn unknown_lane() {
        let mut config = ScenarioConfig::from_json(SCENARIO).unwrap();
        config.generators[0].lane = 5;
        assert!(matches!(config.build(), Err(ConfigError::UnknownLane(5))));
    }

    #[test]
    fn invalid_settings() {
        let mut config = ScenarioConfig::from_json(SCENARIO).unwrap();
        config.simulation.time_step = 0.0;
        assert!(matches!(config.build(), Err(ConfigError::InvalidTimeStep(_))));

        let mut config = ScenarioConfig::from_json(SCENARIO).unwrap();
        config.lanes[0].speed_limit = -1.0;
        assert!(matches!(config.build(), Err(ConfigError::InvalidSpeedLimit(_))));

        let mut config = ScenarioConfig::from_json(SCENARIO).unwrap();
        if let PolicyConfig::Headway(headway) = &mut config.generators[0].policy {
            headway.target_speed = 0.0;
        }
        assert!(matches!(config.build(), Err(ConfigError::NonPositiveSpeed(_))));
    }

    #[test]
    fn missing_csv() {
        let source = ProfileSource::Csv {
            csv: PathBuf::from("does-not-exist.csv"),
            interpolation: Interpolation::Step,
        };
        assert!(matches!(
            source.resolve(Some(Path::new("/nonexistent"))),
            Err(ConfigError::Demand(DemandError::Io(_)))
        ));
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(
            ScenarioConfig::from_json("{ \"lanes\": 3 }"),
            Err(ConfigError::Json(_))
        ));
    }
}
