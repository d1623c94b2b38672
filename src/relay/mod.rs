//! Background relay of built payloads to the AI endpoint.
//!
//! The webhook handler acknowledges the provider before the outbound call
//! finishes. Each payload gets its own spawned task; outcomes are logged by
//! the dispatcher and fanned out to any subscribers.

pub mod dispatch;

pub use dispatch::{RelayDispatcher, RelayResult, RelayStatus};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EndpointConfig;
use crate::pipeline::types::OutboundPayload;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Published when a background dispatch finishes.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchEvent {
    pub delivery_id: Uuid,
    pub thread_id: String,
    pub result: RelayResult,
    pub finished_at: DateTime<Utc>,
}

/// Spawns dispatches and broadcasts their outcomes.
#[derive(Clone)]
pub struct Relay {
    dispatcher: RelayDispatcher,
    config: Arc<EndpointConfig>,
    tx: broadcast::Sender<DispatchEvent>,
    tasks: TaskTracker,
}

impl Relay {
    pub fn new(config: Arc<EndpointConfig>) -> Self {
        Self::with_dispatcher(config, RelayDispatcher::new())
    }

    pub fn with_dispatcher(config: Arc<EndpointConfig>, dispatcher: RelayDispatcher) -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            dispatcher,
            config,
            tx,
            tasks: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Subscribe to dispatch outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.tx.subscribe()
    }

    /// Number of dispatches still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Dispatch `payload` on a new task.
    ///
    /// The task is detached from the inbound request, so it runs to
    /// completion even if the webhook caller disconnects. It is tracked so
    /// [`Relay::shutdown`] can wait for it.
    pub fn spawn(&self, delivery_id: Uuid, payload: OutboundPayload) -> JoinHandle<RelayResult> {
        let dispatcher = self.dispatcher.clone();
        let config = Arc::clone(&self.config);
        let tx = self.tx.clone();

        self.tasks.spawn(async move {
            let result = dispatcher.dispatch(&payload, &config).await;
            let event = DispatchEvent {
                delivery_id,
                thread_id: payload.thread_id,
                result: result.clone(),
                finished_at: Utc::now(),
            };
            // Ok if nobody is listening
            let _ = tx.send(event);
            result
        })
    }

    /// Close the tracker and wait for in-flight dispatches.
    ///
    /// Returns `false` if `grace` elapsed first; those tasks are dropped
    /// with the runtime.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tasks.close();
        let pending = self.tasks.len();
        if pending > 0 {
            info!(pending, grace_ms = grace.as_millis() as u64, "Draining in-flight dispatches");
        }
        match tokio::time::timeout(grace, self.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(abandoned = self.tasks.len(), "Shutdown grace period elapsed");
                false
            }
        }
    }
}
