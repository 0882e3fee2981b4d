//! Store change notification listener
//!
//! Receives row change notifications from the store, keeps those for the
//! target table and forwards the raw payload to the publisher over a bounded
//! queue.

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::PgListener;
use sqlx::{Pool, Postgres};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{config::DatabaseConfig, errors::RelayError, models::NotificationEnvelope};

/// Source of raw notification payloads
pub trait NotificationSource: Send + 'static {
    /// Wait for the next payload
    ///
    /// `Ok(None)` means the source is exhausted and will not produce any more
    /// payloads.
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>, RelayError>> + Send;
}

/// Postgres `LISTEN` subscription on a single channel
pub struct PgNotificationSource {
    listener: PgListener,
}

impl PgNotificationSource {
    pub async fn connect(pool: &Pool<Postgres>, channel: &str) -> Result<Self, RelayError> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(channel).await?;
        info!(channel, "listening for row changes via Postgres NOTIFY");
        Ok(Self { listener })
    }
}

impl NotificationSource for PgNotificationSource {
    /// A lost connection is re-established, and the channel listened to
    /// again, on the call following the error.
    async fn recv(&mut self) -> Result<Option<String>, RelayError> {
        let notification = self.listener.recv().await?;
        Ok(Some(notification.payload().to_string()))
    }
}

/// Reconnect delay bounds after a failed receive
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

impl From<&DatabaseConfig> for Backoff {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            initial: config.reconnect_backoff,
            max: config.max_reconnect_backoff,
        }
    }
}

/// Listener for change notifications of a single table
pub struct NotificationListener<S> {
    source: S,
    table: String,
    backoff: Backoff,
}

/// What to do with a received payload
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    Forward,
    OtherTable,
    Malformed,
}

impl<S: NotificationSource> NotificationListener<S> {
    pub fn new(source: S, table: impl Into<String>, backoff: Backoff) -> Self {
        Self {
            source,
            table: table.into(),
            backoff,
        }
    }

    /// Decide whether a payload is forwarded, logging what was received
    pub(crate) fn inspect(&self, payload: &str) -> Verdict {
        let envelope = match NotificationEnvelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, payload, "failed to decode event payload");
                return Verdict::Malformed;
            }
        };

        if envelope.table != self.table {
            return Verdict::OtherTable;
        }

        info!(
            table = %envelope.table,
            action = %envelope.action,
            "received event"
        );
        Verdict::Forward
    }

    /// Run until cancelled, forwarding accepted payloads to `out`
    ///
    /// When `out` is full, forwarding waits for the publisher to drain it,
    /// and no further notifications are consumed in the meantime. Nothing
    /// is dropped on overflow.
    ///
    /// Receive errors are retried with exponential backoff. Returns an error
    /// if the source is exhausted or the queue is closed before cancellation.
    pub async fn run(
        mut self,
        out: mpsc::Sender<String>,
        shutdown: CancellationToken,
    ) -> Result<(), RelayError> {
        let mut delay = self.backoff.initial;

        loop {
            let payload = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, stopping notification listener");
                    return Ok(());
                }
                recv = self.source.recv() => recv,
            };

            match payload {
                Ok(Some(payload)) => {
                    delay = self.backoff.initial;
                    if self.inspect(&payload) != Verdict::Forward {
                        continue;
                    }

                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!("shutdown requested while forwarding, stopping notification listener");
                            return Ok(());
                        }
                        sent = out.send(payload) => {
                            if sent.is_err() {
                                error!("relay queue closed, stopping notification listener");
                                return Err(RelayError::QueueClosed);
                            }
                        }
                    }
                }
                Ok(None) => {
                    error!("notification source closed");
                    return Err(RelayError::NotificationStreamClosed);
                }
                Err(e) => {
                    warn!(error = ?e, retry_in = ?delay, "error receiving notification");
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = self.backoff.next(delay);
                    debug!("resuming notification subscription");
                }
            }
        }
    }
}
