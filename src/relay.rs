//! Listener and publisher wiring

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    errors::RelayError,
    listener::{NotificationListener, NotificationSource},
    publisher::{PositionBus, RelayPublisher},
};

/// Running relay tasks
pub struct RelayHandle {
    listener: JoinHandle<Result<(), RelayError>>,
    publisher: JoinHandle<Result<(), RelayError>>,
    shutdown: CancellationToken,
}

/// Start the listener and publisher tasks, joined by a queue of `capacity`
///
/// Both tasks stop when `shutdown` is cancelled.
pub fn spawn<S, B>(
    listener: NotificationListener<S>,
    bus: B,
    capacity: usize,
    shutdown: CancellationToken,
) -> RelayHandle
where
    S: NotificationSource,
    B: PositionBus,
{
    let (tx, rx) = mpsc::channel(capacity);

    let listener = tokio::spawn(listener.run(tx, shutdown.clone()));
    let publisher = tokio::spawn(RelayPublisher::new(bus).run(rx, shutdown.clone()));

    info!(capacity, "relay started");
    RelayHandle {
        listener,
        publisher,
        shutdown,
    }
}

impl RelayHandle {
    /// Wait for both tasks to stop
    ///
    /// If the listener stops on its own, the publisher is cancelled too.
    /// Returns once the publisher has closed its bus connection. The first
    /// error of either task is returned.
    pub async fn join(self) -> Result<(), RelayError> {
        let listened = self.listener.await;
        if !self.shutdown.is_cancelled() {
            warn!("notification listener stopped, cancelling publisher");
            self.shutdown.cancel();
        }
        let published = self.publisher.await;

        listened??;
        published??;
        Ok(())
    }
}
