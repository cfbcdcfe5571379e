//! Tests of demand-profile-driven generation.

use assert_approx_eq::assert_approx_eq;
use traffic_admission::{
    demand::{DemandProfile, DemandSample, HeadwayDistribution, Interpolation},
    generator::{DemandConfig, DemandGeneration},
    AgentGateway, LaneAttributes, RegistrationRecord, ScenarioConfig, Simulation,
    TemplateFactory,
};

fn demand_sim(horizon: f64, config: DemandConfig) -> Simulation {
    let mut sim = Simulation::with_gateway(horizon, AgentGateway::default());
    let lane = sim
        .add_lane(&LaneAttributes {
            entry: [0.0, 0.0],
            direction: [1.0, 1.0],
            length: 200.0,
            speed_limit: 15.0,
        })
        .unwrap();
    sim.add_generator(
        lane,
        TemplateFactory::default(),
        DemandGeneration::new(config).unwrap(),
    );
    sim
}

fn constant(rate: f64) -> DemandConfig {
    DemandConfig {
        distribution: HeadwayDistribution::Constant { value: 1.0 },
        profile: DemandProfile::constant(rate).unwrap(),
        seed: 0,
        speed: Some(10.0),
        role: "car".into(),
    }
}

fn release_times(sim: &Simulation) -> Vec<f64> {
    sim.gateway().history().iter().map(|r| r.time).collect()
}

/// Test that a constant rate gives evenly spaced arrivals.
#[test]
fn constant_rate() {
    // 720 veh/h is one vehicle every 5 s
    let mut sim = demand_sim(60.0, constant(720.0));
    sim.run(0.5);
    assert_eq!(
        release_times(&sim),
        vec![5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0]
    );
    let generator = sim.iter_generators().next().unwrap();
    assert_eq!(generator.released(), 11);
    assert_eq!(generator.queue_len(), 0);
}

/// Test that no vehicles arrive while the profile's rate is zero.
#[test]
fn zero_rate_suspends_arrivals() {
    let profile = DemandProfile::new(
        vec![
            DemandSample {
                time: 0.0,
                value: 0.0,
            },
            DemandSample {
                time: 30.0,
                value: 720.0,
            },
        ],
        Interpolation::Step,
    )
    .unwrap();
    let mut sim = demand_sim(
        60.0,
        DemandConfig {
            profile,
            ..constant(1.0)
        },
    );
    sim.run(0.5);
    assert_eq!(release_times(&sim), vec![35.0, 40.0, 45.0, 50.0, 55.0]);
}

/// Test that arrivals falling due in the same tick enter in arrival order,
/// each at the distance it has travelled since it arrived.
#[test]
fn several_arrivals_per_tick_keep_their_order() {
    // 7200 veh/h is one vehicle every 0.5 s, two per 1 s tick
    let config = DemandConfig {
        speed: Some(20.0),
        ..constant(7200.0)
    };
    let mut sim = demand_sim(f64::INFINITY, config);
    let lane = sim.iter_lanes().next().unwrap().id();
    sim.step(1.0);
    sim.step(1.0);

    let placed = |sim: &Simulation| {
        sim.get_lane(lane)
            .vehicles()
            .iter()
            .map(|id| sim.get_vehicle(*id).unwrap())
            .map(|v| (v.driver().id().0, v.pos_rear()))
            .collect::<Vec<_>>()
    };
    // The second arrival was placed at the entry and the first 10 m ahead,
    // then both moved on by 20 m
    let vehicles = placed(&sim);
    assert_eq!(vehicles.len(), 2);
    assert_eq!((vehicles[0].0, vehicles[1].0), (2, 1));
    assert_approx_eq!(vehicles[0].1, 20.0);
    assert_approx_eq!(vehicles[1].1, 30.0);

    for _ in 0..10 {
        sim.step(1.0);
        let vehicles = placed(&sim);
        assert!(vehicles.len() > 2);
        for pair in vehicles.windows(2) {
            assert!(pair[0].0 > pair[1].0);
            assert!(pair[0].1 < pair[1].1);
        }
    }
}

/// Test that vehicles enter at the lane's speed limit unless a speed is given.
#[test]
fn entry_speed_defaults_to_speed_limit() {
    let mut sim = demand_sim(
        10.0,
        DemandConfig {
            speed: None,
            ..constant(720.0)
        },
    );
    sim.run(0.5);
    let vehicle = sim.iter_vehicles().next().unwrap();
    assert_eq!(vehicle.desired_vel(), 15.0);
}

/// Test that sampled arrivals follow the profile's rate on average.
#[test]
fn exponential_rate() {
    let config = DemandConfig {
        distribution: HeadwayDistribution::Exponential { mean: 1.0 },
        profile: DemandProfile::constant(1800.0).unwrap(),
        seed: 12,
        speed: None,
        role: "car".into(),
    };
    let mut sim = demand_sim(1000.0, config);
    sim.run(0.5);
    let released = sim.iter_generators().next().unwrap().released();
    assert!((420..=580).contains(&released), "released {}", released);
}

/// Test that the same seed reproduces the same arrivals and identities,
/// and a different seed does not.
#[test]
fn seeded_runs_are_repeatable() {
    let run = |seed| -> Vec<RegistrationRecord> {
        let config = DemandConfig {
            distribution: HeadwayDistribution::LogNormal {
                mean: 1.0,
                std_dev: 0.5,
            },
            profile: DemandProfile::constant(1200.0).unwrap(),
            seed,
            speed: None,
            role: "car".into(),
        };
        let mut sim = demand_sim(120.0, config);
        sim.run(0.25);
        sim.gateway().history().to_vec()
    };
    let first = run(5);
    assert!(first.len() > 10);
    assert_eq!(first, run(5));
    assert_ne!(first, run(6));
}

/// Test that a scenario file describes the same simulation as one built by hand.
#[test]
fn scenario_matches_manual_setup() {
    let config = ScenarioConfig::from_json(
        r#"{
            "simulation": { "horizon": 60, "time_step": 0.5 },
            "lanes": [{ "entry": [0, 0], "direction": [1, 1], "length": 200, "speed_limit": 15 }],
            "generators": [{
                "lane": 0,
                "policy": {
                    "type": "demand",
                    "distribution": { "kind": "constant", "value": 1 },
                    "profile": 720,
                    "speed": 10,
                    "role": "car"
                }
            }]
        }"#,
    )
    .unwrap();
    let mut from_file = config.build().unwrap();
    from_file.run(config.simulation.time_step);

    let mut manual = demand_sim(60.0, constant(720.0));
    manual.run(0.5);
    assert_eq!(from_file.gateway().history(), manual.gateway().history());
}

/// Test that fitted on-board units steer every released vehicle.
#[test]
fn equipped_generator_fits_units() {
    let config = ScenarioConfig::from_json(
        r#"{
            "simulation": { "horizon": 30, "time_step": 0.5 },
            "lanes": [{ "entry": [0, 0], "direction": [1, 0], "length": 500, "speed_limit": 15 }],
            "generators": [{
                "lane": 0,
                "policy": { "type": "demand", "profile": 720, "distribution": { "kind": "constant", "value": 1 } },
                "unit": { "period": 1, "target_speed": 4, "max_change": 2 }
            }]
        }"#,
    )
    .unwrap();
    let mut sim = config.build().unwrap();
    sim.run(0.5);

    assert_eq!(sim.unit_count(), sim.iter_vehicles().count());
    let first = sim
        .iter_vehicles()
        .min_by_key(|v| v.driver().id())
        .unwrap();
    assert_eq!(first.desired_vel(), 4.0);
    assert!(sim.iter_vehicles().all(|v| v.unit().is_some()));
}
