//! Relay publisher
//!
//! Consumes payloads forwarded by the listener, normalizes newly inserted
//! positions and publishes them on the bus.

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    errors::RelayError,
    models::{Position, PositionEvent},
    normalize::normalize,
};

/// Message bus receiving canonical positions
pub trait PositionBus: Send + 'static {
    /// Publish a single position
    fn publish(
        &mut self,
        position: &Position,
    ) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Flush anything in flight and release the connection
    fn close(self) -> impl Future<Output = Result<(), RelayError>> + Send;
}

/// Outcome of handling one forwarded payload
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Handled {
    Published,
    Skipped,
    Failed,
}

pub struct RelayPublisher<B> {
    bus: B,
}

impl<B: PositionBus> RelayPublisher<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Handle one forwarded payload
    ///
    /// Only inserts are published. A position whose attributes do not decode
    /// is logged and skipped. Publish failures are logged and not retried.
    pub(crate) async fn handle(&mut self, payload: &str) -> Handled {
        let event: PositionEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, payload, "failed to decode position event");
                return Handled::Skipped;
            }
        };

        if !event.is_insert() {
            debug!(action = %event.action, id = event.position.id, "ignoring non-insert event");
            return Handled::Skipped;
        }

        let position = match normalize(&event.position) {
            Ok(position) => position,
            Err(e) => {
                error!(error = ?e, payload, "failed to decode attributes");
                return Handled::Skipped;
            }
        };

        match self.bus.publish(&position).await {
            Ok(()) => {
                debug!(
                    id = position.id,
                    device_id = position.device_id,
                    "published position"
                );
                Handled::Published
            }
            Err(e) => {
                error!(
                    error = ?e,
                    id = position.id,
                    device_id = position.device_id,
                    "failed to publish"
                );
                Handled::Failed
            }
        }
    }

    /// Run until cancelled or until the queue is closed
    ///
    /// A payload already taken off the queue is always handled to completion.
    /// Payloads still queued when cancellation arrives are not published. The
    /// bus is closed before this returns.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<String>,
        shutdown: CancellationToken,
    ) -> Result<(), RelayError> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("shutting down the publisher");
                    break;
                }
                payload = rx.recv() => match payload {
                    Some(payload) => {
                        self.handle(&payload).await;
                    }
                    None => {
                        info!("relay queue closed, shutting down the publisher");
                        break;
                    }
                }
            }
        }

        rx.close();
        if let Err(e) = self.bus.close().await {
            error!(error = ?e, "failed to close bus connection");
            return Err(e);
        }
        info!("bus connection closed");
        Ok(())
    }
}
