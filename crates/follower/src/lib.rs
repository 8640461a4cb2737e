pub mod channel;
pub mod collaborators;
pub mod control_loop;
pub mod replay;

pub use channel::{ChannelError, CommandChannel, CommandSink};
pub use collaborators::{DashboardDisplay, Detector, Display, VideoSource};
pub use control_loop::{ControlLoop, ExitReason, Headless, LoopError, LoopState, ShutdownFlag};
pub use replay::{PassThroughDetector, ReplaySource};
