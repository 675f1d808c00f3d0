use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tracing::{error, warn};

use crate::domain::signal::Signal;

/// Minimum concurrency floor at publish time: cap concurrency at
/// `max(subscribers, small constant)` rather than spawning one unbounded
/// task per subscriber per signal.
const MIN_CONCURRENCY: usize = 4;

#[async_trait]
pub trait SignalSubscriber: Send + Sync {
    fn name(&self) -> &str;
    async fn on_signal(&self, signal: &Signal) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub successes: usize,
    pub failures: usize,
}

/// Typed pub/sub delivering each published [`Signal`] to every
/// registered subscriber concurrently, with error isolation — one
/// subscriber's failure never affects another's delivery or the publish
/// call's outcome. Subscribers may register/unregister dynamically; a
/// single subscriber observes calls in the order `publish` was invoked
/// because each call awaits the prior one to completion before returning.
pub struct SignalBus {
    subscribers: RwLock<Vec<Arc<dyn SignalSubscriber>>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self { subscribers: RwLock::new(Vec::new()) }
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn SignalSubscriber>) {
        self.subscribers.write().await.push(subscriber);
    }

    pub async fn unsubscribe(&self, name: &str) {
        self.subscribers.write().await.retain(|s| s.name() != name);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn publish(&self, signal: Signal) -> PublishReport {
        let subscribers = self.subscribers.read().await.clone();
        if subscribers.is_empty() {
            return PublishReport::default();
        }

        let permits = subscribers.len().max(MIN_CONCURRENCY);
        let semaphore = Arc::new(Semaphore::new(permits));
        let signal = Arc::new(signal);

        let mut handles = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            let semaphore = semaphore.clone();
            let signal = signal.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                (subscriber.name().to_string(), subscriber.on_signal(&signal).await)
            }));
        }

        let mut report = PublishReport::default();
        for handle in handles {
            match handle.await {
                Ok((_, Ok(()))) => report.successes += 1,
                Ok((name, Err(err))) => {
                    warn!(subscriber = name, %err, "signal subscriber returned an error");
                    report.failures += 1;
                }
                Err(join_err) => {
                    error!(%join_err, "signal subscriber task panicked");
                    report.failures += 1;
                }
            }
        }
        report
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}
