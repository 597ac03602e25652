//! Repeated one-producer/one-consumer transfer with checksum validation.
//!
//! Usage:
//!     cargo run --release --example throughput -- --rounds 10 --count 10000000
//!
//! Set `RUST_LOG=turbo_spsc=debug` for per-round events.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use turbo_spsc::harness::{run_transfer, TransferConfig};

#[derive(Debug, Parser)]
#[command(about = "SPSC ring buffer throughput run")]
struct Args {
    /// Values pushed per round.
    #[arg(long, default_value_t = 10_000_000)]
    count: u64,

    /// Requested queue capacity (rounded up to a power of two).
    #[arg(long, default_value_t = 1024)]
    capacity: usize,

    /// Number of rounds.
    #[arg(long, default_value_t = 10)]
    rounds: usize,

    /// Pin the producer thread to this CPU.
    #[arg(long)]
    producer_cpu: Option<usize>,

    /// Pin the consumer thread to this CPU.
    #[arg(long)]
    consumer_cpu: Option<usize>,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("turbo_spsc=info,throughput=info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = TransferConfig {
        capacity: args.capacity,
        count: args.count,
        producer_cpu: args.producer_cpu,
        consumer_cpu: args.consumer_cpu,
    };
    info!(?config, rounds = args.rounds, "starting");

    for round in 0..args.rounds {
        let report = run_transfer(&config).with_context(|| format!("round {round} failed"))?;
        println!(
            "producer_time: {}ms; consumer_time: {}ms; {:.2} msgs/sec; {:.1} ns/op",
            report.producer_elapsed.as_millis(),
            report.consumer_elapsed.as_millis(),
            report.throughput(),
            report.nanos_per_op(),
        );
    }
    Ok(())
}
