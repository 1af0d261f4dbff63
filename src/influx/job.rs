use std::time::Duration;

use crossbeam::channel::{tick, Receiver};
use crossbeam::select;
use tracing::{debug, warn};

use super::publisher::{FlushOutcome, Shared};
use super::sink::PointSink;

/// Background loop checking the time trigger of a publisher.
///
/// Runs until `receiver` is closed. The final flush is left to the publisher's
/// drop so it also covers publishers without this job.
pub(crate) fn run_flush_job<S: PointSink>(shared: &Shared<S>, tick_every: Duration, receiver: &Receiver<()>) {
    let ticker = tick(tick_every);

    loop {
        // wait for time to check or shutdown signal
        select! {
            recv(ticker) -> _ => (),
            recv(receiver) -> _ => {
                debug!("Stopping background flush job");
                return;
            },
        }

        match shared.flush_if_due() {
            Some(Ok(FlushOutcome::Delivered { points })) => {
                debug!("Background flush delivered {points} points");
            }
            Some(Err(err)) => warn!("Background flush failed: {err}"),
            Some(Ok(FlushOutcome::Empty)) | None => {}
        }
    }
}
