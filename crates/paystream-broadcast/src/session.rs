use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::Result,
    hub::HubHandle,
    subscriber::{Subscriber, SubscriberId},
};

/// Why a session stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The transport signalled cancellation (client gone, shutdown, deadline).
    Cancelled,
    /// The hub dropped this listener for not draining its queue in time.
    Evicted,
}

/// One listener bridged to one outbound connection.
///
/// Opening a session registers a fresh subscriber with the hub; the matching
/// unregistration happens exactly once, either through [`StreamSession::close`]
/// or, when the transport simply drops the session, from `Drop`.
pub struct StreamSession<T: Clone + Send + 'static> {
    hub: HubHandle<T>,
    subscriber: Subscriber<T>,
    rx: mpsc::Receiver<T>,
    registered: bool,
}

impl<T: Clone + Send + 'static> StreamSession<T> {
    /// Allocate a listener queue of `capacity` (at least 1) and register it.
    ///
    /// Fails with [`HubError::Closed`](crate::HubError::Closed) once the hub is closed.
    pub async fn open(hub: &HubHandle<T>, capacity: usize) -> Result<Self> {
        let (subscriber, rx) = Subscriber::channel(capacity);
        hub.register(&subscriber).await?;
        debug!(subscriber = %subscriber.id(), "stream session opened");
        Ok(Self {
            hub: hub.clone(),
            subscriber,
            rx,
            registered: true,
        })
    }

    pub fn id(&self) -> SubscriberId {
        self.subscriber.id()
    }

    /// Wait for the next message, or for the session to end.
    ///
    /// Messages already queued when the session is cancelled or evicted are
    /// still handed out before `Cancelled`/`Evicted` is reported, so a hub
    /// drained at shutdown reaches the transport.
    pub async fn recv(&mut self, cancel: &CancellationToken) -> std::result::Result<T, SessionEnd> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => self.rx.try_recv().map_err(|_| SessionEnd::Cancelled),
            message = self.rx.recv() => message.ok_or(SessionEnd::Evicted),
            _ = self.subscriber.evicted() => match self.rx.try_recv() {
                Ok(message) => Ok(message),
                Err(_) => Err(SessionEnd::Evicted),
            },
        }
    }

    /// Forward every message to `forward` until cancellation, eviction, or a
    /// transport error, then unregister.
    pub async fn pump<F, Fut, E>(
        mut self,
        cancel: &CancellationToken,
        mut forward: F,
    ) -> std::result::Result<SessionEnd, E>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
    {
        let outcome = loop {
            match self.recv(cancel).await {
                Ok(message) => {
                    if let Err(e) = forward(message).await {
                        break Err(e);
                    }
                }
                Err(end) => break Ok(end),
            }
        };
        self.close().await;
        outcome
    }

    /// Unregister from the hub and release the queue.
    pub async fn close(mut self) {
        if self.registered {
            self.registered = false;
            self.hub.unregister(self.subscriber.id()).await;
            debug!(subscriber = %self.subscriber.id(), "stream session closed");
        }
    }
}

impl<T: Clone + Send + 'static> Drop for StreamSession<T> {
    fn drop(&mut self) {
        if self.registered {
            self.registered = false;
            self.hub.unregister_detached(self.subscriber.id());
            debug!(subscriber = %self.subscriber.id(), "stream session dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::{HubConfig, HubError};

    const WAIT: Duration = Duration::from_secs(2);

    async fn wait_for_subscribers(hub: &HubHandle<u32>, n: usize) {
        timeout(WAIT, async {
            while hub.metrics().subscribers != n {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriber count settles");
    }

    #[tokio::test]
    async fn recv_returns_cancelled() {
        let hub = HubHandle::<u32>::spawn(HubConfig::default());
        let mut session = StreamSession::open(&hub, 1).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(session.recv(&cancel).await, Err(SessionEnd::Cancelled));
    }

    #[tokio::test]
    async fn cancel_flushes_messages_drained_at_close() {
        let hub = HubHandle::<u32>::spawn(HubConfig::default());
        let mut session = StreamSession::open(&hub, 4).await.unwrap();
        assert!(hub.submit(1));
        assert!(hub.submit(2));
        hub.close().unwrap();
        timeout(WAIT, hub.closed()).await.expect("hub drained");

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(session.recv(&cancel).await, Ok(1));
        assert_eq!(session.recv(&cancel).await, Ok(2));
        assert_eq!(session.recv(&cancel).await, Err(SessionEnd::Cancelled));
    }

    #[tokio::test]
    async fn pump_forwards_until_cancelled_then_unregisters() {
        let hub = HubHandle::<u32>::spawn(HubConfig::default());
        let session = StreamSession::open(&hub, 4).await.unwrap();
        assert_eq!(hub.metrics().subscribers, 1);

        let cancel = CancellationToken::new();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let pump_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            session
                .pump(&pump_cancel, |m| {
                    let seen_tx = seen_tx.clone();
                    async move {
                        seen_tx.send(m).map_err(|_| "sink gone")?;
                        Ok::<(), &'static str>(())
                    }
                })
                .await
        });

        assert!(hub.submit(1));
        assert!(hub.submit(2));
        assert_eq!(timeout(WAIT, seen_rx.recv()).await.unwrap(), Some(1));
        assert_eq!(timeout(WAIT, seen_rx.recv()).await.unwrap(), Some(2));

        cancel.cancel();
        let end = timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(end, Ok(SessionEnd::Cancelled));
        // close() awaits the actor's ack, so the count is already updated.
        assert_eq!(hub.metrics().subscribers, 0);
    }

    #[tokio::test]
    async fn pump_stops_on_sink_error() {
        let hub = HubHandle::<u32>::spawn(HubConfig::default());
        let session = StreamSession::open(&hub, 1).await.unwrap();
        assert!(hub.submit(3));

        let cancel = CancellationToken::new();
        let end = timeout(WAIT, session.pump(&cancel, |_| async { Err::<(), _>("broken pipe") }))
            .await
            .unwrap();
        assert_eq!(end, Err("broken pipe"));
        assert_eq!(hub.metrics().subscribers, 0);
    }

    #[tokio::test]
    async fn dropping_session_unregisters() {
        let hub = HubHandle::<u32>::spawn(HubConfig::default());
        let a = StreamSession::open(&hub, 1).await.unwrap();
        let _b = StreamSession::open(&hub, 1).await.unwrap();
        assert_eq!(hub.metrics().subscribers, 2);

        drop(a);
        wait_for_subscribers(&hub, 1).await;
    }

    #[tokio::test]
    async fn open_after_close_fails() {
        let hub = HubHandle::<u32>::spawn(HubConfig::default());
        hub.close().unwrap();
        let err = StreamSession::open(&hub, 1).await.err();
        assert_eq!(err, Some(HubError::Closed));
    }

    #[tokio::test]
    async fn stalled_session_reports_evicted() {
        let hub = HubHandle::<u32>::spawn(HubConfig {
            input_capacity: 8,
            send_timeout: Some(Duration::from_millis(20)),
        });
        let mut session = StreamSession::open(&hub, 1).await.unwrap();

        // First fills the queue, second times out and evicts.
        assert!(hub.submit(1));
        assert!(hub.submit(2));
        timeout(WAIT, session.subscriber.evicted()).await.expect("evicted");

        let cancel = CancellationToken::new();
        assert_eq!(session.recv(&cancel).await, Ok(1));
        assert_eq!(session.recv(&cancel).await, Err(SessionEnd::Evicted));
        assert_eq!(hub.metrics().stalled, 1);
    }
}
