//! Batched-RPC ping-pong latency benchmark.
//!
//! Drives one exchange scenario in a tight loop for a fixed warmup period
//! and then a fixed measurement period, recording one round-trip sample per
//! step, and reports latency percentiles at the end.
//!
//! ```bash
//! cargo run --release -p rpc_pingpong -- \
//!     --scenario ping-pong-stream --payload-size 32 --warmup 1 --benchmark 5
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use minstant::Instant;
use tracing::info;

use batchrpc::{
    ChannelBuilder, CompletionQueue, Deadline, LatencyRecorder, QueueEvent, Runtime, Scenario,
    ScenarioEnv, ScenarioKind,
};

#[derive(Parser, Debug)]
#[command(name = "rpc_pingpong")]
#[command(about = "Batched-RPC ping-pong latency benchmark")]
struct Args {
    /// Size of the payload to send in bytes
    #[arg(long, default_value = "1")]
    payload_size: usize,

    /// Target host:port
    #[arg(long, default_value = "localhost:443")]
    target: String,

    /// Run with transport security
    #[arg(long)]
    secure: bool,

    /// Exchange scenario to drive
    #[arg(long, default_value = "ping-pong-request")]
    scenario: String,

    /// Warmup seconds
    #[arg(long, default_value = "1")]
    warmup: u64,

    /// Benchmark seconds
    #[arg(long, default_value = "5")]
    benchmark: u64,
}

fn unsupported_scenario_message(name: &str) -> String {
    format!(
        "unsupported scenario '{}'. Valid are: {}",
        name,
        ScenarioKind::names().join(" ")
    )
}

/// Run warmup then measurement, recording one sample per measured step.
fn run_loops(
    args: &Args,
    runtime: &Runtime,
    scenario: &mut dyn Scenario,
    recorder: &mut LatencyRecorder,
) {
    let warmup_end = Instant::now() + Duration::from_secs(args.warmup);
    while Instant::now() < warmup_end {
        scenario.step().expect("warmup step failed");
    }

    info!("start profiling");
    runtime.profiler().start();

    let bench_end = Instant::now() + Duration::from_secs(args.benchmark);
    while Instant::now() < bench_end {
        let start = Instant::now();
        scenario.step().expect("benchmark step failed");
        let elapsed = start.elapsed();
        recorder.record(elapsed);
        runtime.profiler().record("ping_pong", elapsed);
    }

    if let Err(e) = runtime.profiler().stop() {
        tracing::warn!(error = %e, "failed to write profiler trace");
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let Some(kind) = ScenarioKind::by_name(&args.scenario) else {
        eprintln!("{}", unsupported_scenario_message(&args.scenario));
        return ExitCode::FAILURE;
    };

    let runtime = Runtime::init();
    runtime
        .profiler()
        .set_log_filename("latency_trace.rpc_pingpong.txt");

    let channel = match ChannelBuilder::new(&args.target)
        .secure(args.secure)
        .connect(&runtime)
    {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("failed to connect channel to {}: {}", args.target, e);
            return ExitCode::FAILURE;
        }
    };
    let queue = Arc::new(CompletionQueue::new());
    let payload: Arc<[u8]> = vec![b'x'; args.payload_size].into();

    let mut scenario = kind.into_scenario(ScenarioEnv {
        channel: channel.clone(),
        queue: queue.clone(),
        payload,
    });
    scenario.init().expect("scenario init failed");

    let mut recorder = LatencyRecorder::new();
    run_loops(&args, &runtime, scenario.as_mut(), &mut recorder);

    // Deterministic teardown: release the persistent call, shut the queue
    // down and drain it before dropping the channel.
    scenario.finish();
    queue.shutdown();
    loop {
        match queue.next(Deadline::Infinite) {
            QueueEvent::Shutdown => break,
            QueueEvent::Ready(_) | QueueEvent::TimedOut => continue,
        }
    }
    drop(scenario);
    drop(channel);

    info!(
        steps = recorder.len(),
        "latency (50/95/99/99.9): {:.3}/{:.3}/{:.3}/{:.3} us",
        recorder.percentile(50.0).as_nanos() as f64 / 1e3,
        recorder.percentile(95.0).as_nanos() as f64 / 1e3,
        recorder.percentile(99.0).as_nanos() as f64 / 1e3,
        recorder.percentile(99.9).as_nanos() as f64 / 1e3,
    );

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_lists_both_valid_scenarios() {
        let message = unsupported_scenario_message("bogus-name");
        assert!(message.contains("bogus-name"));
        assert!(message.contains("ping-pong-request"));
        assert!(message.contains("ping-pong-stream"));
    }
}
