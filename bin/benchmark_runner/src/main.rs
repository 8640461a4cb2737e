use std::env;
use std::time::{Duration, Instant};

use criterion::{black_box, Criterion};
use tracing_subscriber::EnvFilter;

use common::config::{load_config, FollowerConfig};
use common::metrics::{FrameRecord, FrameRecorder};
use common::policy::DriveMode;
use common::{ActuationPolicy, MotorCommand, SteeringController};
use follower::{ChannelError, CommandSink, ControlLoop, Headless, PassThroughDetector, ReplaySource};

/// Accepts every command without I/O so the loop itself is what gets timed.
#[derive(Default)]
struct NullSink {
    sent: u64,
}

impl CommandSink for NullSink {
    fn send(&mut self, command: &MotorCommand) -> Result<(), ChannelError> {
        black_box(command);
        self.sent += 1;
        Ok(())
    }

    fn close(&mut self) -> bool {
        false
    }
}

fn analyze_results(results: &[FrameRecord]) {
    if results.is_empty() {
        println!("No frames to analyze");
        return;
    }

    let total = results.len();
    let with_target = results.iter().filter(|r| r.target_present).count();
    let forward = results.iter().filter(|r| r.mode == DriveMode::Forward).count();
    let turning = results.iter().filter(|r| r.mode == DriveMode::Turn).count();
    let stopped = results.iter().filter(|r| r.mode == DriveMode::Stop).count();

    let control_us: Vec<f64> = results.iter().map(|r| r.control_ns as f64 / 1000.0).collect();
    let avg = control_us.iter().sum::<f64>() / total as f64;
    let min = control_us.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = control_us.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let max_turn = results
        .iter()
        .filter(|r| r.mode == DriveMode::Turn)
        .map(|r| r.pwm_right.abs())
        .max()
        .unwrap_or(0);

    println!("\n=== Replay Analysis ===");
    println!("Frames processed: {}", total);
    println!("Target present: {} ({:.1}%)", with_target, with_target as f64 / total as f64 * 100.0);
    println!("Forward: {}, Turn: {}, Stop: {}", forward, turning, stopped);
    println!("Control step (μs): avg={:.2}, min={:.2}, max={:.2}", avg, min, max);
    println!("Largest turn command: {}", max_turn);
}

fn benchmark_control_step(c: &mut Criterion, config: &FollowerConfig) {
    let mut steering = SteeringController::from_config(&config.steering).expect("valid steering config");
    steering.initialize_setpoint(320.0);
    let policy = ActuationPolicy::from_config(&config.policy).with_center(320);
    let mut now = Instant::now();
    let mut cx = 0i32;

    c.bench_function("control_step", |b| {
        b.iter(|| {
            now += Duration::from_millis(200);
            cx = (cx + 37) % 640;
            let correction = steering.step(black_box(cx as f64), now);
            black_box(policy.compute(true, cx, correction))
        });
    });
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: benchmark_runner <replay.jsonl> [config.toml] [--criterion]");
        eprintln!("Example: benchmark_runner configs/replay_demo.jsonl configs/follower.toml");
        std::process::exit(1);
    }

    let replay_path = &args[1];
    let use_criterion = args.iter().any(|a| a == "--criterion");
    let config = match args.get(2).filter(|a| !a.starts_with("--")) {
        Some(path) => load_config(path).unwrap_or_else(|e| {
            eprintln!("{}", e);
            std::process::exit(1);
        }),
        None => FollowerConfig::default(),
    };

    println!("========================================");
    println!("Person Follower Replay Benchmark");
    println!("========================================");
    println!("Replay: {}", replay_path);
    println!(
        "Gains: kp={} ki={} kd={}",
        config.steering.kp, config.steering.ki, config.steering.kd
    );
    println!("Dead zone: {} px, threshold: {}", config.policy.dead_zone_px, config.policy.threshold);
    println!("========================================\n");

    let source = ReplaySource::open(replay_path).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });

    let recorder = FrameRecorder::new();
    let start = Instant::now();
    let mut control = ControlLoop::new(source, PassThroughDetector, NullSink::default(), Headless, &config)
        .unwrap_or_else(|e| {
            eprintln!("{}", e);
            std::process::exit(1);
        })
        .with_recorder(recorder.clone());
    if let Err(e) = control.run() {
        eprintln!("replay failed: {}", e);
        std::process::exit(1);
    }
    println!("Replay completed in {:.3} ms", start.elapsed().as_secs_f64() * 1000.0);

    analyze_results(&recorder.get_results());

    if let Err(e) = recorder.save_to_csv("replay_results.csv") {
        eprintln!("Failed to save CSV: {}", e);
    } else {
        println!("Results saved to replay_results.csv");
    }

    if use_criterion {
        println!("\nRunning criterion statistics for one control step...");
        let mut criterion = Criterion::default()
            .sample_size(50)
            .measurement_time(Duration::from_secs(5));
        benchmark_control_step(&mut criterion, &config);
        println!("Check the target/criterion directory for detailed HTML reports.");
    }
}
