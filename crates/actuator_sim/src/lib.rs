pub mod actuator;
pub mod signal;

pub use actuator::{CommandLog, MotorModel, SimulatedActuator};
pub use signal::spawn_interrupt_watcher;
