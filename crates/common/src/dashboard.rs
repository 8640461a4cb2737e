use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::policy::DriveMode;
use crate::{Gains, MotorCommand, Target};

/// What the display collaborator is handed each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DashboardData {
    pub frame_id: u64,
    pub gains: Gains,
    #[serde(skip)]
    pub target: Option<Target>,
    pub correction: f64,
    pub mode: DriveMode,
    pub command: MotorCommand,
}

/// Bounded buffer of the most recent frames, shareable across threads.
#[derive(Clone)]
pub struct DashboardBuffer {
    data: Arc<Mutex<VecDeque<DashboardData>>>,
    max_size: usize,
}

impl DashboardBuffer {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            data: Arc::new(Mutex::new(VecDeque::with_capacity(max_size))),
            max_size,
        }
    }

    pub fn add(&self, item: DashboardData) {
        if let Ok(mut buffer) = self.data.lock() {
            if buffer.len() == self.max_size {
                buffer.pop_front();
            }
            buffer.push_back(item);
        }
    }

    pub fn latest(&self) -> Option<DashboardData> {
        self.data.lock().ok().and_then(|b| b.back().copied())
    }

    pub fn get_recent(&self, count: usize) -> Vec<DashboardData> {
        match self.data.lock() {
            Ok(buffer) => {
                let start = buffer.len().saturating_sub(count);
                buffer.iter().skip(start).copied().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut buffer) = self.data.lock() {
            buffer.clear();
        }
    }
}
