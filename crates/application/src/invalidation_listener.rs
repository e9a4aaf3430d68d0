use std::sync::Arc;
use std::time::Duration;

use rankguard_core::AppError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::permission_engine::PermissionEngine;
use crate::permission_ports::{InvalidationBus, InvalidationMessage, InvalidationSubscription};

/// Reconnect policy of the invalidation listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationListenerConfig {
    /// First delay after a failed or closed subscription.
    pub retry_min: Duration,
    /// Largest delay between reconnect attempts.
    pub retry_max: Duration,
}

impl Default for InvalidationListenerConfig {
    fn default() -> Self {
        Self {
            retry_min: Duration::from_millis(500),
            retry_max: Duration::from_secs(30),
        }
    }
}

enum ConsumeOutcome {
    Shutdown,
    Closed,
    Failed(AppError),
}

/// Background consumer applying invalidation events to the engine caches.
///
/// Messages are handled one at a time in delivery order and acknowledged once the
/// reload finished, whether or not it succeeded.
pub struct InvalidationListener {
    engine: PermissionEngine,
    bus: Arc<dyn InvalidationBus>,
    config: InvalidationListenerConfig,
}

impl InvalidationListener {
    /// Creates a listener for `engine`.
    #[must_use]
    pub fn new(
        engine: PermissionEngine,
        bus: Arc<dyn InvalidationBus>,
        config: InvalidationListenerConfig,
    ) -> Self {
        Self {
            engine,
            bus,
            config,
        }
    }

    /// Runs the listener on a new task until `shutdown` flips to `true`.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Consumes invalidation events, resubscribing with exponential backoff.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let retry_min = self.config.retry_min;
        let retry_max = self.config.retry_max.max(retry_min);
        let mut backoff = retry_min;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let subscribed = tokio::select! {
                subscribed = self.bus.subscribe() => subscribed,
                changed = shutdown.changed() => {
                    if is_shutdown(changed, &shutdown) {
                        break;
                    }
                    continue;
                }
            };

            match subscribed {
                Ok(mut subscription) => {
                    info!("invalidation subscription opened");
                    backoff = retry_min;

                    match self.consume(subscription.as_mut(), &mut shutdown).await {
                        ConsumeOutcome::Shutdown => break,
                        ConsumeOutcome::Closed => {
                            warn!(retry_in = ?backoff, "invalidation subscription closed");
                        }
                        ConsumeOutcome::Failed(error) => {
                            warn!(
                                error = %error,
                                retry_in = ?backoff,
                                "invalidation subscription failed"
                            );
                        }
                    }
                }
                Err(error) => {
                    warn!(
                        error = %error,
                        retry_in = ?backoff,
                        "failed to open invalidation subscription"
                    );
                }
            }

            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                changed = shutdown.changed() => {
                    if is_shutdown(changed, &shutdown) {
                        break;
                    }
                }
            }
            backoff = backoff.saturating_mul(2).min(retry_max);
        }

        info!("invalidation listener stopped");
    }

    async fn consume(
        &self,
        subscription: &mut dyn InvalidationSubscription,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ConsumeOutcome {
        loop {
            let next = tokio::select! {
                next = subscription.next_message() => next,
                changed = shutdown.changed() => {
                    if is_shutdown(changed, shutdown) {
                        return ConsumeOutcome::Shutdown;
                    }
                    continue;
                }
            };

            let message = match next {
                Ok(Some(message)) => message,
                Ok(None) => return ConsumeOutcome::Closed,
                Err(error) => return ConsumeOutcome::Failed(error),
            };

            self.handle(&message).await;
            if let Err(error) = subscription.acknowledge(&message).await {
                return ConsumeOutcome::Failed(error);
            }
        }
    }

    /// Reloads the scope named by one message.
    ///
    /// Failures are logged and the previous cache state is kept.
    pub async fn handle(&self, message: &InvalidationMessage) {
        let subject = message.event.subject();

        match self.engine.apply_invalidation(&message.event).await {
            Ok(report) => debug!(
                subject = %subject.as_str(),
                delivery_id = %message.delivery_id,
                upserted = report.upserted,
                removed = report.removed,
                clamped = report.clamped,
                "invalidation applied"
            ),
            Err(error) if error.is_transient() => warn!(
                subject = %subject.as_str(),
                delivery_id = %message.delivery_id,
                event = ?message.event,
                error = %error,
                "invalidation reload failed, keeping cached state"
            ),
            Err(error) => error!(
                subject = %subject.as_str(),
                delivery_id = %message.delivery_id,
                event = ?message.event,
                error = %error,
                "invalidation reload rejected store rows, keeping cached state"
            ),
        }
    }
}

fn is_shutdown(
    changed: Result<(), watch::error::RecvError>,
    shutdown: &watch::Receiver<bool>,
) -> bool {
    changed.is_err() || *shutdown.borrow()
}

#[cfg(test)]
mod tests;
