//! Recorded detector output played back as a video source.
//!
//! File format, one JSON value per line:
//!
//! ```text
//! {"width": 640, "height": 360}
//! [{"x1": 0.4, "y1": 0.1, "x2": 0.6, "y2": 0.9, "class": 0, "confidence": 0.87}]
//! []
//! null
//! ```
//!
//! The first line is the frame geometry. Each later line is one frame's
//! detections; `null` stands for a failed frame read.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use common::{Detection, FrameGeometry};

use crate::collaborators::{Detector, VideoSource};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read replay: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("replay has no geometry header")]
    MissingHeader,
}

pub type ReplayFrame = Vec<Detection>;

#[derive(Debug)]
pub struct ReplaySource {
    geometry: Option<FrameGeometry>,
    frames: VecDeque<Option<ReplayFrame>>,
    frame_interval: Option<Duration>,
    released: bool,
}

impl ReplaySource {
    pub fn new(geometry: Option<FrameGeometry>, frames: Vec<Option<ReplayFrame>>) -> Self {
        Self {
            geometry,
            frames: frames.into(),
            frame_interval: None,
            released: false,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self, ReplayError> {
        let mut lines = reader
            .lines()
            .enumerate()
            .filter(|(_, l)| l.as_ref().map(|s| !s.trim().is_empty()).unwrap_or(true));

        let (idx, header) = lines.next().ok_or(ReplayError::MissingHeader)?;
        let geometry: FrameGeometry =
            serde_json::from_str(&header?).map_err(|source| ReplayError::Parse { line: idx + 1, source })?;

        let mut frames = Vec::new();
        for (idx, line) in lines {
            let frame: Option<ReplayFrame> =
                serde_json::from_str(&line?).map_err(|source| ReplayError::Parse { line: idx + 1, source })?;
            frames.push(frame);
        }

        Ok(Self::new(Some(geometry), frames))
    }

    /// Paces `read_frame` like a camera delivering one frame per `interval`.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl VideoSource for ReplaySource {
    type Frame = ReplayFrame;

    fn is_open(&self) -> bool {
        !self.released && !self.frames.is_empty()
    }

    fn geometry(&self) -> Option<FrameGeometry> {
        self.geometry
    }

    fn read_frame(&mut self) -> Option<ReplayFrame> {
        if let Some(interval) = self.frame_interval {
            thread::sleep(interval);
        }
        self.frames.pop_front().flatten()
    }

    fn release(&mut self) {
        self.released = true;
        self.frames.clear();
    }
}

/// Replay frames already hold the detections.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughDetector;

impl Detector<ReplayFrame> for PassThroughDetector {
    fn detect(&mut self, frame: &ReplayFrame) -> Vec<Detection> {
        frame.clone()
    }
}
