//! The message-stream worker.
//!
//! One worker per transport connection: it drains the inbound stream,
//! fans each message out to its own task, and reconnects with jittered
//! exponential backoff when the connection drops. After six consecutive
//! failures the client itself is thrown away and rebuilt.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio::sync::watch;

use crate::front::AgentFront;
use crate::transport::{ChatTransport, TransportFactory};

/// Reconnect policy.
#[derive(Debug, Clone)]
pub struct StreamWorkerConfig {
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    /// Uniform extra delay fraction, 0.0–1.0.
    pub jitter: f64,
    /// Consecutive failures before the client is rebuilt.
    pub recreate_after: u32,
}

impl Default for StreamWorkerConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            backoff_factor: 1.5,
            max_delay: Duration::from_secs(60),
            jitter: 0.3,
            recreate_after: 6,
        }
    }
}

/// Run the streaming loop until `shutdown` flips to true.
pub async fn run_message_worker(
    factory: Arc<dyn TransportFactory>,
    front: Arc<AgentFront>,
    config: StreamWorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut client: Option<Arc<dyn ChatTransport>> = None;
    let mut failures = 0u32;
    let mut delay = config.base_delay;

    loop {
        if *shutdown.borrow() {
            break;
        }

        if failures >= config.recreate_after {
            tracing::warn!(failures, "recreating transport client");
            client = None;
            failures = 0;
            delay = config.base_delay;
        }

        let transport = match &client {
            Some(transport) => Arc::clone(transport),
            None => match factory.connect().await {
                Ok(transport) => {
                    client = Some(Arc::clone(&transport));
                    transport
                }
                Err(e) => {
                    tracing::warn!(error = %e, "transport connect failed");
                    failures += 1;
                    if !backoff_sleep(&mut delay, &config, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            },
        };

        let mut stream = match transport.stream().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "message stream failed to open");
                failures += 1;
                if !backoff_sleep(&mut delay, &config, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        tracing::info!("message stream open");
        failures = 0;
        delay = config.base_delay;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A closed channel means the supervisor is gone.
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                message = stream.next() => {
                    let Some(message) = message else {
                        tracing::warn!("message stream ended; reconnecting");
                        break;
                    };
                    // Each inbound message is processed on its own task.
                    let front = Arc::clone(&front);
                    let transport = Arc::clone(&transport);
                    tokio::spawn(async move {
                        for reply in front.handle_message(message).await {
                            if let Err(e) = transport.send(reply).await {
                                tracing::warn!(error = %e, "reply delivery failed");
                            }
                        }
                    });
                }
            }
        }

        failures += 1;
        if !backoff_sleep(&mut delay, &config, &mut shutdown).await {
            break;
        }
    }

    tracing::info!("message worker stopped");
}

/// Sleep the current backoff (plus jitter) and advance it. Returns
/// false when shutdown was signalled during the wait.
async fn backoff_sleep(
    delay: &mut Duration,
    config: &StreamWorkerConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let jitter = 1.0 + rand::thread_rng().gen_range(0.0..=config.jitter);
    let wait = delay.mul_f64(jitter);
    *delay = delay.mul_f64(config.backoff_factor).min(config.max_delay);

    tokio::select! {
        _ = tokio::time::sleep(wait) => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}
