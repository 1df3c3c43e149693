use anyhow::Result;
use std::time::Instant;
use log::{info, warn, error, debug, trace};

use brownian_common::SimulationConfig;
use brownian_engine::output::{self, SnapshotFormat};
use brownian_engine::Simulation;

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting Brownian motion engine...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = SimulationConfig::load(&config_path)?;
    info!("Loaded configuration from {}.", config_path);
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Initialize Simulation ---
    let mut sim = Simulation::new(config)?;
    info!("Placed {} agents.", sim.current_agent_count());
    debug!("Simulation Parameters: {:#?}", sim.params());

    let total_ticks = sim.config().timing.total_ticks;
    let mut record_interval = sim.config().timing.record_interval_ticks;
    if record_interval == 0 {
        warn!("record_interval_ticks is 0. Recording every tick.");
        record_interval = 1;
    }

    info!("Starting simulation loop for {} ticks...", total_ticks);
    let start_time = Instant::now();
    let mut previous_print_time = start_time;

    // --- Initial Snapshot (tick = 0) ---
    if let Err(e) = sim.record_snapshot() {
        error!("Error recording initial snapshot: {}", e);
        anyhow::bail!("Failed to record initial snapshot.");
    }

    for tick in 0..total_ticks {
        let tick_start_time = Instant::now();
        let stats = match sim.step() {
            Ok(stats) => stats,
            Err(e) => {
                error!("Error during tick {}: {}", tick + 1, e);
                anyhow::bail!("Simulation tick failed.");
            }
        };
        let tick_duration = tick_start_time.elapsed();

        let current_time = Instant::now();
        let should_print_status = current_time.duration_since(previous_print_time).as_secs_f64() >= 5.0;
        let is_record_tick = (tick + 1) % record_interval == 0;
        let is_last_tick = tick + 1 == total_ticks;

        if should_print_status || is_record_tick || is_last_tick {
            info!(
                "Tick [{}/{}] | Moved: {} | Stalled: {} | Contended: {} | Occupied: {} | Tick Time: {:6.2} ms | Elapsed: {:.2} s",
                tick + 1,
                total_ticks,
                stats.moved,
                stats.stalled,
                stats.contended,
                sim.tracker().len(),
                tick_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = current_time;

            if is_record_tick || is_last_tick {
                if let Err(e) = sim.record_snapshot() {
                    error!("Error recording snapshot at tick {}: {}", tick + 1, e);
                    anyhow::bail!("Failed to record snapshot.");
                }
            }
        } else {
            trace!("Tick [{}/{}] completed in {:.2} ms", tick + 1, total_ticks, tick_duration.as_secs_f64() * 1000.0);
        }
    }

    info!("Simulation finished in {:.3} seconds.", start_time.elapsed().as_secs_f64());

    // --- Save Recorded Data ---
    let output_config = sim.config().output.clone();
    if output_config.save_stats {
        let format = SnapshotFormat::from_config(output_config.format.as_deref());
        if let Err(e) = output::save_snapshots(&output_config.base_filename, format, sim.get_recorded_snapshots()) {
            error!("{:#}", e);
        }
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    if output_config.save_positions {
        let filename = format!("{}_final_positions.csv", output_config.base_filename);
        if let Err(e) = output::save_final_positions(&filename, &sim.get_results()) {
            error!("{:#}", e);
        }
    } else {
        info!("Skipping saving final positions as per config.");
    }

    // No tick is in flight past this point.
    sim.shutdown();
    info!("Simulation Complete.");
    Ok(())
}
