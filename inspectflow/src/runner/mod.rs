//! Async driving of a run: frames from the queue, cancellation from the
//! context, the terminal outcome back to the owner.

mod control;

pub use control::{apply_control_message, ControlMessage};

use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::source::FrameReceiver;

/// Feeds frames to `orchestrator` until its run ends.
///
/// Cancellation is picked up even while no frames arrive. When the queue
/// closes the run is closed out via [`Orchestrator::end_of_stream`].
/// Returns `None` only when no run was started.
pub async fn drive(orchestrator: &mut Orchestrator, frames: &mut FrameReceiver) -> Option<RunOutcome> {
    let woken = Arc::new(Notify::new());
    {
        let woken = woken.clone();
        orchestrator
            .context()
            .cancel
            .on_cancel(move || woken.notify_one());
    }

    loop {
        tokio::select! {
            biased;
            () = woken.notified() => {
                if let Some(outcome) = orchestrator.observe_cancellation() {
                    return Some(outcome);
                }
            }
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Some(outcome) = orchestrator.on_frame(frame) {
                        info!(outcome = %outcome, dropped = frames.metrics().dropped(), "Run ended");
                        return Some(outcome);
                    }
                }
                None => {
                    debug!("Frame queue closed");
                    return orchestrator.end_of_stream();
                }
            },
        }
    }
}
