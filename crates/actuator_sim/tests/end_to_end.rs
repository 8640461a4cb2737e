use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;

use actuator_sim::SimulatedActuator;
use common::config::FollowerConfig;
use common::{Detection, FrameGeometry, MotorCommand};
use follower::{CommandChannel, ControlLoop, ExitReason, Headless, PassThroughDetector, ReplaySource};

fn person(left: u32, right: u32) -> Detection {
    Detection {
        x1: left as f64 / 640.0,
        y1: 0.2,
        x2: right as f64 / 640.0,
        y2: 0.8,
        class: 0,
        confidence: 0.9,
    }
}

async fn wait_for(log: &actuator_sim::CommandLog, count: usize) {
    for _ in 0..200 {
        if log.commands().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn control_loop_drives_simulated_actuator() {
    let actuator = SimulatedActuator::bind("127.0.0.1:0").await.unwrap();
    let addr = actuator.local_addr().unwrap().to_string();
    let log = actuator.log();
    let (stop_tx, stop_rx) = watch::channel(false);
    let server = tokio::spawn(actuator.run(stop_rx));

    let reason = tokio::task::spawn_blocking(move || {
        let mut config = FollowerConfig::default();
        config.steering.kp = 0.5;
        let channel =
            CommandChannel::connect(&addr, Duration::from_secs(1), Some(Duration::from_millis(500))).unwrap();
        let frames = vec![
            Some(vec![person(300, 340)]),
            Some(vec![person(380, 420)]),
            Some(vec![]),
        ];
        let source = ReplaySource::new(Some(FrameGeometry::new(640, 360)), frames);
        let mut control = ControlLoop::new(source, PassThroughDetector, channel, Headless, &config).unwrap();
        control.run().unwrap()
    })
    .await
    .unwrap();
    assert_eq!(reason, ExitReason::StreamEnded);

    wait_for(&log, 4).await;
    assert_eq!(
        log.commands(),
        vec![
            MotorCommand::new(255, 255),
            MotorCommand::new(190, -190),
            MotorCommand::STOP,
            MotorCommand::STOP,
        ]
    );
    assert_eq!(log.last(), Some(MotorCommand::STOP));
    assert_eq!(log.connections(), 1);

    stop_tx.send(true).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_lines_are_counted_not_recorded() {
    let actuator = SimulatedActuator::bind("127.0.0.1:0").await.unwrap();
    let addr = actuator.local_addr().unwrap();
    let log = actuator.log();
    let (stop_tx, stop_rx) = watch::channel(false);
    let server = tokio::spawn(actuator.run(stop_rx));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"{\"pwmR\": 10, \"pwmL\": -10}\nnot json\n\n{\"pwmR\": 0, \"pwmL\": 0}\n")
        .await
        .unwrap();
    stream.shutdown().await.unwrap();

    wait_for(&log, 2).await;
    assert_eq!(log.commands(), vec![MotorCommand::new(-10, 10), MotorCommand::STOP]);
    assert_eq!(log.malformed(), 1);

    stop_tx.send(true).unwrap();
    server.await.unwrap().unwrap();
}
