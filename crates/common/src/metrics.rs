use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

use crate::policy::DriveMode;

/// One row per processed frame.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct FrameRecord {
    pub frame_id: u64,
    pub target_present: bool,
    pub target_cx: Option<i32>,
    pub correction: f64,
    pub mode: DriveMode,
    pub pwm_left: i32,
    pub pwm_right: i32,
    pub control_ns: u64,
    pub send_ns: u64,
}

/// Thread-safe recorder with interior mutability.
/// Cloning shares the underlying buffer.
#[derive(Clone, Default)]
pub struct FrameRecorder {
    results: Arc<Mutex<Vec<FrameRecord>>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(Vec::with_capacity(10_000))),
        }
    }

    pub fn record(&self, record: FrameRecord) {
        if let Ok(mut data) = self.results.lock() {
            data.push(record);
        }
    }

    pub fn get_results(&self) -> Vec<FrameRecord> {
        self.results.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.results.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save_to_csv(&self, path: impl AsRef<Path>) -> Result<(), csv::Error> {
        let data = self.get_results();
        let mut wtr = csv::Writer::from_path(path.as_ref())?;
        for record in &data {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        info!("saved {} frame records to {}", data.len(), path.as_ref().display());
        Ok(())
    }
}
