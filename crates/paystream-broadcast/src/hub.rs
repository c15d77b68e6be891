use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{HubError, Result},
    metrics::{HubMetrics, MetricsSnapshot},
    subscriber::{Subscriber, SubscriberId},
};

/// Hub construction parameters.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the input queue; `submit` drops messages beyond it.
    pub input_capacity: usize,
    /// Upper bound on one per-listener send during fan-out. A listener that
    /// exceeds it is evicted. `None` blocks until the listener drains, which
    /// lets a single stuck listener stall the whole hub.
    pub send_timeout: Option<Duration>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            input_capacity: 10,
            send_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Lifecycle of the hub actor. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HubState {
    Open,
    /// Subscription changes are refused; queued messages are being drained.
    Closing,
    Closed,
}

struct Registration<T> {
    id: SubscriberId,
    tx: mpsc::WeakSender<T>,
    eviction: CancellationToken,
    ack: oneshot::Sender<()>,
}

struct Unregistration {
    id: SubscriberId,
    ack: Option<oneshot::Sender<()>>,
}

/// Non-owning view of a registered listener.
struct Listener<T> {
    tx: mpsc::WeakSender<T>,
    eviction: CancellationToken,
}

enum Eviction {
    /// The send did not complete within the send timeout.
    Stalled,
    /// The session dropped its queue without unregistering.
    Detached,
}

/// Cloneable façade over the hub actor.
///
/// Holds only channel endpoints and the shared counters; all listener state
/// lives inside the actor task.
pub struct HubHandle<T> {
    input_tx: mpsc::Sender<T>,
    reg_tx: mpsc::Sender<Registration<T>>,
    unreg_tx: mpsc::UnboundedSender<Unregistration>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    state_rx: watch::Receiver<HubState>,
    metrics: Arc<HubMetrics>,
}

impl<T> Clone for HubHandle<T> {
    fn clone(&self) -> Self {
        Self {
            input_tx: self.input_tx.clone(),
            reg_tx: self.reg_tx.clone(),
            unreg_tx: self.unreg_tx.clone(),
            shutdown_tx: Arc::clone(&self.shutdown_tx),
            state_rx: self.state_rx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<T: Clone + Send + 'static> HubHandle<T> {
    /// Start the hub actor on the current tokio runtime and return a handle to it.
    pub fn spawn(config: HubConfig) -> Self {
        let (input_tx, input_rx) = mpsc::channel(config.input_capacity.max(1));
        // Capacity 1 plus the ack below: a registration is a handoff, the
        // caller resumes only once the actor has applied it.
        let (reg_tx, reg_rx) = mpsc::channel(1);
        let (unreg_tx, unreg_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(HubState::Open);
        let metrics = Arc::new(HubMetrics::default());

        let actor = HubActor {
            input_rx,
            reg_rx,
            unreg_rx,
            shutdown_rx,
            state_tx,
            listeners: HashMap::new(),
            send_timeout: config.send_timeout,
            metrics: Arc::clone(&metrics),
        };
        info!(
            input_capacity = config.input_capacity.max(1),
            send_timeout_ms = config.send_timeout.map(|d| d.as_millis() as u64),
            "broadcast hub started"
        );
        tokio::spawn(actor.run());

        Self {
            input_tx,
            reg_tx,
            unreg_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            state_rx,
            metrics,
        }
    }

    /// Add `subscriber` to the fan-out set.
    ///
    /// Resolves once the actor has observed the registration; every message
    /// submitted afterwards reaches the subscriber. Registering the same
    /// subscriber twice is a no-op.
    pub async fn register(&self, subscriber: &Subscriber<T>) -> Result<()> {
        if self.is_closing() {
            return Err(HubError::Closed);
        }
        let (ack, done) = oneshot::channel();
        let registration = Registration {
            id: subscriber.id(),
            tx: subscriber.downgrade(),
            eviction: subscriber.eviction_token(),
            ack,
        };
        self.reg_tx
            .send(registration)
            .await
            .map_err(|_| HubError::Closed)?;
        // Dropped ack: the actor shut down before applying it.
        done.await.map_err(|_| HubError::Closed)
    }

    /// Remove a subscriber from the fan-out set. Absent ids and calls made
    /// after `close` are no-ops.
    ///
    /// A message already being delivered to the subscriber may still land
    /// in its queue after this returns.
    pub async fn unregister(&self, id: SubscriberId) {
        if self.is_closing() {
            debug!(subscriber = %id, "unregister after close ignored");
            return;
        }
        let (ack, done) = oneshot::channel();
        if self
            .unreg_tx
            .send(Unregistration { id, ack: Some(ack) })
            .is_err()
        {
            return;
        }
        let _ = done.await;
    }

    /// Fire-and-forget unregistration for `Drop` paths that cannot await.
    pub(crate) fn unregister_detached(&self, id: SubscriberId) {
        if self.is_closing() {
            return;
        }
        let _ = self.unreg_tx.send(Unregistration { id, ack: None });
    }

    /// Enqueue `message` for fan-out without waiting.
    ///
    /// Returns `QueueSaturated` when the input queue is full and `Closed`
    /// after `close`; in both cases the message is dropped.
    pub fn try_submit(&self, message: T) -> Result<()> {
        if self.is_closing() {
            return Err(HubError::Closed);
        }
        match self.input_tx.try_send(message) {
            Ok(()) => {
                self.metrics.record_submitted();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.record_dropped();
                Err(HubError::QueueSaturated)
            }
            Err(TrySendError::Closed(_)) => Err(HubError::Closed),
        }
    }

    /// Best-effort publish: `true` if the message was queued for fan-out.
    pub fn submit(&self, message: T) -> bool {
        match self.try_submit(message) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "message not accepted");
                false
            }
        }
    }

    /// Stop accepting subscription changes. Messages already queued are still
    /// delivered to the current listeners before the actor exits.
    ///
    /// Idempotent. Existing sessions are not disconnected by the hub.
    pub fn close(&self) -> Result<()> {
        let was_closing = self.shutdown_tx.send_replace(true);
        if !was_closing {
            info!("broadcast hub closing");
        }
        Ok(())
    }

    /// Wait until the actor has drained its queue and stopped.
    pub async fn closed(&self) {
        let mut state = self.state_rx.clone();
        let _ = state.wait_for(|s| *s == HubState::Closed).await;
    }

    pub fn state(&self) -> HubState {
        *self.state_rx.borrow()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn is_closing(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

/// Single owner of the listener set.
struct HubActor<T> {
    input_rx: mpsc::Receiver<T>,
    reg_rx: mpsc::Receiver<Registration<T>>,
    unreg_rx: mpsc::UnboundedReceiver<Unregistration>,
    shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<HubState>,
    listeners: HashMap<SubscriberId, Listener<T>>,
    send_timeout: Option<Duration>,
    metrics: Arc<HubMetrics>,
}

impl<T: Clone + Send + 'static> HubActor<T> {
    /// Main loop: one event per iteration, fully handled before the next.
    ///
    /// Arms are polled in order. Queued messages go out before any
    /// subscription change that arrived after them; shutdown comes first
    /// because `drain` still flushes the input queue.
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                changed = self.shutdown_rx.changed() => {
                    // Err: every handle is gone, nobody can close us explicitly.
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                Some(message) = self.input_rx.recv() => self.broadcast(message).await,
                Some(registration) = self.reg_rx.recv() => self.register(registration),
                Some(unregistration) = self.unreg_rx.recv() => self.unregister(unregistration),
            }
        }
        self.drain().await;
    }

    fn register(&mut self, registration: Registration<T>) {
        let Registration {
            id,
            tx,
            eviction,
            ack,
        } = registration;
        match self.listeners.entry(id) {
            Entry::Occupied(_) => debug!(subscriber = %id, "duplicate registration ignored"),
            Entry::Vacant(slot) => {
                slot.insert(Listener { tx, eviction });
                debug!(subscriber = %id, total = self.listeners.len(), "subscriber registered");
            }
        }
        self.metrics.set_subscribers(self.listeners.len());
        let _ = ack.send(());
    }

    fn unregister(&mut self, unregistration: Unregistration) {
        if self.listeners.remove(&unregistration.id).is_some() {
            debug!(subscriber = %unregistration.id, total = self.listeners.len(), "subscriber unregistered");
        }
        self.metrics.set_subscribers(self.listeners.len());
        if let Some(ack) = unregistration.ack {
            let _ = ack.send(());
        }
    }

    /// Deliver one message to every listener registered at this point.
    ///
    /// Listeners found stalled or gone are removed after the pass, so the
    /// pass always walks one consistent set.
    async fn broadcast(&mut self, message: T) {
        let mut evicted = Vec::new();
        let mut delivered = 0u64;

        for (id, listener) in &self.listeners {
            let Some(tx) = listener.tx.upgrade() else {
                evicted.push((*id, Eviction::Detached));
                continue;
            };
            let sent = match self.send_timeout {
                Some(limit) => {
                    tx.send_timeout(message.clone(), limit)
                        .await
                        .map_err(|e| match e {
                            SendTimeoutError::Timeout(_) => Eviction::Stalled,
                            SendTimeoutError::Closed(_) => Eviction::Detached,
                        })
                }
                None => tx.send(message.clone()).await.map_err(|_| Eviction::Detached),
            };
            match sent {
                Ok(()) => delivered += 1,
                Err(reason) => evicted.push((*id, reason)),
            }
        }

        self.metrics.record_delivered(delivered);
        let mut tokens = Vec::with_capacity(evicted.len());
        for (id, reason) in evicted {
            let Some(listener) = self.listeners.remove(&id) else {
                continue;
            };
            tokens.push(listener.eviction);
            match reason {
                Eviction::Stalled => {
                    self.metrics.record_stalled();
                    warn!(
                        subscriber = %id,
                        timeout_ms = self.send_timeout.map(|d| d.as_millis() as u64),
                        "subscriber stalled fan-out, evicted"
                    );
                }
                Eviction::Detached => {
                    self.metrics.record_detached();
                    debug!(subscriber = %id, "subscriber queue gone, removed");
                }
            }
        }
        self.metrics.set_subscribers(self.listeners.len());
        // Signal sessions only once the set and counters are settled.
        for token in tokens {
            token.cancel();
        }
    }

    /// Shutdown path: refuse new subscription changes, flush the input queue,
    /// then report `Closed`.
    async fn drain(mut self) {
        self.state_tx.send_replace(HubState::Closing);

        self.reg_rx.close();
        self.unreg_rx.close();
        // Registrations that raced with close are refused by dropping their ack.
        while self.reg_rx.try_recv().is_ok() {}
        // Unregistrations queued before close still apply.
        while let Ok(unregistration) = self.unreg_rx.try_recv() {
            self.unregister(unregistration);
        }

        self.input_rx.close();
        let mut drained = 0usize;
        while let Ok(message) = self.input_rx.try_recv() {
            self.broadcast(message).await;
            drained += 1;
        }

        let listeners = self.listeners.len();
        self.listeners.clear();
        self.metrics.set_subscribers(0);
        self.state_tx.send_replace(HubState::Closed);
        info!(drained, listeners, "broadcast hub stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn hub() -> HubHandle<u32> {
        HubHandle::spawn(HubConfig::default())
    }

    #[tokio::test]
    async fn duplicate_registration_is_noop() {
        let hub = hub();
        let (sub, mut rx) = Subscriber::channel(4);
        hub.register(&sub).await.unwrap();
        hub.register(&sub.clone()).await.unwrap();
        assert_eq!(hub.metrics().subscribers, 1);

        assert!(hub.submit(5));
        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(5));

        // Once the next registration is acked the fan-out above has finished.
        let (other, _orx) = Subscriber::channel(1);
        hub.register(&other).await.unwrap();
        assert!(rx.try_recv().is_err(), "delivered once, not twice");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_reaches_closed() {
        let hub = hub();
        assert_eq!(hub.state(), HubState::Open);
        hub.close().unwrap();
        hub.close().unwrap();
        timeout(WAIT, hub.closed()).await.expect("actor stops");
        assert_eq!(hub.state(), HubState::Closed);
    }

    #[tokio::test]
    async fn submit_after_close_is_rejected() {
        let hub = hub();
        hub.close().unwrap();
        assert_eq!(hub.try_submit(1), Err(HubError::Closed));
        assert!(!hub.submit(2));
    }

    #[tokio::test]
    async fn unregister_after_close_does_not_hang() {
        let hub = hub();
        let (sub, _rx) = Subscriber::channel(1);
        hub.register(&sub).await.unwrap();
        hub.close().unwrap();
        timeout(WAIT, hub.unregister(sub.id())).await.expect("returns");
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_actor() {
        let hub = hub();
        let mut state = hub.state_rx.clone();
        drop(hub);
        timeout(WAIT, state.wait_for(|s| *s == HubState::Closed))
            .await
            .expect("actor stops")
            .expect("state sender alive until Closed");
    }

    #[tokio::test]
    async fn detached_subscriber_is_pruned() {
        let hub = hub();
        let (gone, gone_rx) = Subscriber::channel(1);
        let (live, mut live_rx) = Subscriber::channel(1);
        hub.register(&gone).await.unwrap();
        hub.register(&live).await.unwrap();
        drop(gone_rx);
        drop(gone);

        assert!(hub.submit(9));
        assert_eq!(timeout(WAIT, live_rx.recv()).await.unwrap(), Some(9));

        let (probe, _probe_rx) = Subscriber::channel(1);
        hub.register(&probe).await.unwrap();
        let m = hub.metrics();
        assert_eq!(m.detached, 1);
        assert_eq!(m.subscribers, 2);
    }
}
