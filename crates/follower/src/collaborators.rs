//! Seams to the camera, the vision model and the operator display.

use std::sync::mpsc::{Receiver, TryRecvError};

use common::dashboard::{DashboardBuffer, DashboardData};
use common::{Detection, FrameGeometry, UiEvent};

pub trait VideoSource {
    type Frame;

    fn is_open(&self) -> bool;

    /// Frame size, once the stream reports it.
    fn geometry(&self) -> Option<FrameGeometry>;

    /// `None` is a transient read failure; the caller skips the frame.
    fn read_frame(&mut self) -> Option<Self::Frame>;

    fn release(&mut self) {}
}

/// Runs the vision model on one frame. Boxes come back normalized to [0, 1]
/// in the model's own ordering.
pub trait Detector<F> {
    fn detect(&mut self, frame: &F) -> Vec<Detection>;
}

impl<F, T> Detector<F> for T
where
    T: FnMut(&F) -> Vec<Detection>,
{
    fn detect(&mut self, frame: &F) -> Vec<Detection> {
        self(frame)
    }
}

/// Shows the current frame state and reports operator input.
pub trait Display {
    /// Called once per processed frame. Returns any events raised since the
    /// previous call.
    fn present(&mut self, data: &DashboardData) -> Vec<UiEvent>;

    fn close(&mut self) {}
}

/// Headless display: keeps a bounded history and takes events from a channel.
pub struct DashboardDisplay {
    buffer: DashboardBuffer,
    events: Option<Receiver<UiEvent>>,
}

impl DashboardDisplay {
    pub fn new(buffer: DashboardBuffer) -> Self {
        Self { buffer, events: None }
    }

    pub fn with_events(mut self, events: Receiver<UiEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn buffer(&self) -> &DashboardBuffer {
        &self.buffer
    }
}

impl Display for DashboardDisplay {
    fn present(&mut self, data: &DashboardData) -> Vec<UiEvent> {
        self.buffer.add(*data);

        let mut raised = Vec::new();
        if let Some(rx) = &self.events {
            loop {
                match rx.try_recv() {
                    Ok(event) => raised.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.events = None;
                        break;
                    }
                }
            }
        }
        raised
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::policy::DriveMode;
    use common::{Gains, GainTerm, MotorCommand};
    use std::sync::mpsc;

    fn data(frame_id: u64) -> DashboardData {
        DashboardData {
            frame_id,
            gains: Gains::default(),
            target: None,
            correction: 0.0,
            mode: DriveMode::Stop,
            command: MotorCommand::STOP,
        }
    }

    #[test]
    fn dashboard_display_drains_pending_events() {
        let (tx, rx) = mpsc::channel();
        let mut display = DashboardDisplay::new(DashboardBuffer::new(8)).with_events(rx);
        tx.send(UiEvent::Slider { term: GainTerm::Kp, raw: 50 }).unwrap();
        tx.send(UiEvent::Quit).unwrap();

        let events = display.present(&data(0));
        assert_eq!(events, vec![UiEvent::Slider { term: GainTerm::Kp, raw: 50 }, UiEvent::Quit]);
        assert!(display.present(&data(1)).is_empty());
        assert_eq!(display.buffer().len(), 2);
    }

    #[test]
    fn closure_is_a_detector() {
        let mut detector = |_: &u32| {
            vec![Detection {
                x1: 0.1,
                y1: 0.1,
                x2: 0.2,
                y2: 0.2,
                class: 0,
                confidence: 0.5,
            }]
        };
        assert_eq!(Detector::detect(&mut detector, &7).len(), 1);
    }
}
