//! Serialized work loop for one client certificate controller
//!
//! Passes run one at a time. A pass is triggered by the resync timer, by a
//! change to the credential secret, or by a change to a signing request.
//! Failed passes back off exponentially with jitter; successful passes
//! requeue at the delay the controller asks for, capped at the resync
//! interval.

use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controller::ClientCertController;
use crate::Error;

/// Why a pass was scheduled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The credential secret was created, changed or deleted
    SecretChanged,
    /// A signing request changed state
    RequestChanged(String),
}

/// Scheduling parameters
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Longest time between two passes
    pub resync_interval: Duration,
    /// Delay after the first failed pass
    pub initial_backoff: Duration,
    /// Longest delay between failed passes
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(300),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

/// Exponential backoff with jitter
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    /// Start a backoff sequence from the runner configuration
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            initial: config.initial_backoff,
            max: config.max_backoff,
            multiplier: config.backoff_multiplier,
            current: config.initial_backoff,
        }
    }

    /// Next delay, between 0.5x and 1.5x of the current step
    pub fn next_delay(&mut self) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let delay = Duration::from_secs_f64(self.current.as_secs_f64() * jitter);

        self.current = Duration::from_secs_f64(
            (self.current.as_secs_f64() * self.multiplier).min(self.max.as_secs_f64()),
        );
        delay
    }

    /// Start over after a success
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Merge secret and signing request notifications into one trigger stream
pub fn triggers(
    secret_changes: BoxStream<'static, ()>,
    request_changes: BoxStream<'static, String>,
) -> BoxStream<'static, Trigger> {
    stream::select(
        secret_changes.map(|_| Trigger::SecretChanged),
        request_changes.map(Trigger::RequestChanged),
    )
    .boxed()
}

/// Drive the controller until shutdown
///
/// The first pass runs immediately. Triggers arriving while a failed pass
/// is backing off are coalesced into the pass that ends the backoff.
/// Returns early only on an error that retrying cannot fix.
pub async fn run(
    mut controller: ClientCertController,
    mut triggers: BoxStream<'static, Trigger>,
    config: RunnerConfig,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let mut backoff = Backoff::new(&config);
    let mut deadline = Instant::now();
    let mut backing_off = false;
    let mut triggers_open = true;

    info!(
        namespace = %controller.cert_options().secret_namespace,
        secret = %controller.cert_options().secret_name,
        resync_secs = config.resync_interval.as_secs(),
        "Starting client certificate runner"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => {
                debug!("Scheduled pass");
            }
            trigger = triggers.next(), if triggers_open => match trigger {
                Some(trigger) if backing_off => {
                    debug!(?trigger, "Trigger deferred until backoff ends");
                    continue;
                }
                Some(trigger) => debug!(?trigger, "Triggered pass"),
                None => {
                    warn!("Trigger streams ended, relying on resync only");
                    triggers_open = false;
                    continue;
                }
            },
        }

        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = controller.sync() => result,
        };

        let delay = match result {
            Ok(outcome) => {
                debug!(?outcome, "Pass complete");
                backoff.reset();
                backing_off = false;
                outcome
                    .requeue_after()
                    .map_or(config.resync_interval, |d| d.min(config.resync_interval))
            }
            Err(e) if !e.is_retryable() => {
                error!(error = %e, "Client certificate pass failed permanently");
                return Err(e);
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Client certificate pass failed, backing off"
                );
                backing_off = true;
                delay
            }
        };
        deadline = Instant::now() + delay;
    }

    info!("Client certificate runner stopped");
    Ok(())
}
