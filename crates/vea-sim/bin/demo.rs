//! Runs a handful of simulation scenarios against `vea-core`, narrating
//! progress to stderr. Not a benchmark — `vea-core/benches/reserve_publish.rs`
//! owns that; this is a demonstration/smoke-test harness.
//!
//! Run with: `cargo run -p vea-sim --bin demo`

use std::time::Duration;
use vea_sim::SimulationConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    eprintln!("=== vea-sim demo ===\n");

    run_named("small device, few streams", SimulationConfig {
        seed: 1,
        stream_count: 2,
        ops_per_stream: 300,
        capacity_blocks: 4096,
        header_blocks: 1,
        aging_window: Duration::from_millis(2),
    })
    .await;

    run_named("larger device, many streams", SimulationConfig {
        seed: 7,
        stream_count: 8,
        ops_per_stream: 500,
        capacity_blocks: 1 << 18,
        header_blocks: 4,
        aging_window: Duration::from_millis(5),
    })
    .await;

    run_named("tight aging window, heavy churn", SimulationConfig {
        seed: 99,
        stream_count: 4,
        ops_per_stream: 1000,
        capacity_blocks: 1 << 14,
        header_blocks: 1,
        aging_window: Duration::from_micros(200),
    })
    .await;

    eprintln!("\n=== all scenarios completed without an invariant violation ===");
}

async fn run_named(label: &str, config: SimulationConfig) {
    eprintln!("--- {label} (seed={}) ---", config.seed);
    let report = vea_sim::run(config).await;
    eprintln!(
        "  reserves {}/{} succeeded, {} published, {} cancelled, {} freed, {} migrations, {} invariant checks",
        report.reserves_succeeded,
        report.reserves_attempted,
        report.publishes,
        report.cancels,
        report.frees,
        report.migrations,
        report.invariant_checks,
    );
}
