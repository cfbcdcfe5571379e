use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info};
use traffic_admission::{ScenarioConfig, Simulation};

/// A single lane fed by a headway-controlled generator, with a scripted
/// blocker and follower on a second lane.
const BUILTIN_SCENARIO: &str = r#"{
    "simulation": { "horizon": 120, "time_step": 0.1, "agent_capacity": 40 },
    "lanes": [
        { "entry": [0, 0], "direction": [1, 0], "length": 250, "speed_limit": 16.66 },
        { "entry": [0, 4], "direction": [1, 0], "length": 250, "speed_limit": 16.66 }
    ],
    "generators": [
        {
            "lane": 0,
            "policy": { "type": "headway", "target_speed": 12, "time_headway": 1.8, "role": "commuter" },
            "vehicles": {
                "templates": [
                    { "width": 1.9, "length": 4.5, "weight": 8 },
                    { "width": 2.5, "length": 12, "weight": 1 }
                ],
                "seed": 17
            },
            "unit": { "period": 2, "delay": 1, "target_speed": 10, "max_change": 1 }
        },
        {
            "lane": 1,
            "policy": { "type": "scripted", "threshold": 5, "role": "tailgater" }
        }
    ]
}"#;

#[derive(Parser)]
#[command(name = "traffic-admission")]
#[command(about = "Runs a lane admission scenario to its horizon")]
struct Cli {
    /// The scenario file; a built-in scenario is used if omitted.
    scenario: Option<PathBuf>,
    /// Overrides the scenario's time step in s.
    #[arg(long)]
    dt: Option<f64>,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = match &cli.scenario {
        Some(path) => ScenarioConfig::load(path),
        None => ScenarioConfig::from_json(BUILTIN_SCENARIO),
    };
    let (mut sim, dt) = match config.and_then(|c| Ok((c.build()?, c.simulation.time_step))) {
        Ok(built) => built,
        Err(err) => {
            error!("failed to load scenario: {}", err);
            std::process::exit(1);
        }
    };
    let dt = cli.dt.unwrap_or(dt);
    if !(dt.is_finite() && dt > 0.0) {
        error!("time step must be positive, got {}", dt);
        std::process::exit(1);
    }

    info!("Simulating to t={} s...", sim.clock().horizon);
    let start = Instant::now();
    sim.run(dt);
    let elapsed = start.elapsed();
    info!(
        "{} frames in {:?} ({:?} per frame)",
        sim.frame(),
        elapsed,
        per_frame(elapsed, sim.frame())
    );

    report(&sim);
}

/// The mean wall-clock time per frame.
fn per_frame(elapsed: Duration, frames: usize) -> Duration {
    Duration::from_secs_f64(elapsed.as_secs_f64() / frames.max(1) as f64)
}

fn report(sim: &Simulation) {
    println!("t = {:.2} s, {} vehicles on the network", sim.time(), sim.iter_vehicles().count());
    for generator in sim.iter_generators() {
        println!(
            "{:?}: released {}, queued {}{}",
            generator.id(),
            generator.released(),
            generator.queue_len(),
            if generator.is_exhausted(&sim.clock()) { " (finished)" } else { "" }
        );
    }
    let gateway = sim.gateway();
    println!(
        "registrations: {} accepted, {} rejected",
        gateway.registered_identities().count(),
        gateway.rejected_count()
    );
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn per_frame_time() {
        assert_eq!(per_frame(Duration::from_secs(3), 0), Duration::from_secs(3));
        assert_eq!(per_frame(Duration::from_millis(500), 4), Duration::from_millis(125));

        // More frames than fit in a u32
        let frames = u32::MAX as usize + 2;
        let elapsed = Duration::from_secs(frames as u64);
        let mean = per_frame(elapsed, frames);
        assert!((mean.as_secs_f64() - 1.0).abs() < 1e-9);
    }
}
