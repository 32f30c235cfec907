/*!
 * Optimizer Daemon - Main Entry Point
 *
 * Lightweight background optimizer that provides:
 * - Foreground-driven priority, affinity and I/O steering
 * - Process-group propagation with CPU-rate jobs
 * - Adaptive working-set trimming
 * - Coalesced periodic maintenance
 */

use anyhow::Context;
use optimizer_kernel::{
    init_tracing, select_platform, HardwareTopology, OptimizerConfig, OptimizerRuntime, UnifiedProcessManager,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Optimizer starting...");
    info!("================================================");

    let config = OptimizerConfig::load().context("failed to load configuration")?;

    info!("Detecting hardware topology...");
    let topology = HardwareTopology::detect();
    info!(
        cores = topology.logical_cores,
        performance = topology.performance_cores.len(),
        efficiency = topology.efficiency_cores.len(),
        numa_nodes = topology.numa_node_count(),
        "Topology detected"
    );

    let platform = select_platform();
    info!(platform = platform.name(), "Process backend selected");

    let manager = UnifiedProcessManager::builder()
        .with_config(config)
        .with_platform(platform)
        .with_topology(topology)
        .build()
        .context("failed to build process manager")?;

    let runtime = OptimizerRuntime::spawn(Arc::new(manager)).context("failed to start optimizer threads")?;

    info!("Optimizer initialization complete");
    info!("================================================");
    info!("Press Ctrl+C to exit");

    let mut stats_timer = tokio::time::interval(STATS_INTERVAL);
    stats_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = stats_timer.tick() => {
                let stats = runtime.manager().stats();
                info!(
                    ticks = stats.ticks,
                    applications = stats.applications,
                    cache_skips = stats.cache_skips,
                    knobs_applied = stats.knobs_applied,
                    knobs_failed = stats.knobs_failed,
                    trims = stats.trims,
                    "Optimizer running"
                );
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signal")?;
                break;
            }
        }
    }

    info!("Shutdown requested");
    tokio::task::spawn_blocking(move || runtime.shutdown())
        .await
        .context("shutdown task failed")?;
    Ok(())
}
