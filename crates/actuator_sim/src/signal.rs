use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Runs `on_interrupt` once when the process receives Ctrl-C.
///
/// The callback only raises a flag; the control loop notices it at the next
/// frame boundary and runs its own shutdown sequence.
pub fn spawn_interrupt_watcher<F>(on_interrupt: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping after the current frame");
                on_interrupt();
            }
            Err(e) => warn!("cannot listen for interrupts: {}", e),
        }
    })
}
