//! `paystream-broadcast`: in-process fan-out of live events to streaming listeners.
//!
//! # Overview
//!
//! One tokio task (the hub actor) owns the set of registered listeners. Every
//! change to that set and every fan-out goes through the actor's single
//! `select!` loop, so the set needs no lock.
//!
//! ```text
//!  producers ── submit ──► [input queue] ──┐
//!                                          ▼
//!  sessions ── register ─► [reg queue] ──► HubActor ──► listener 1 ─► StreamSession ─► SSE
//!  sessions ─ unregister ► [unreg queue] ─►   │     ──► listener 2 ─► StreamSession ─► SSE
//!  close() ─────────────► [shutdown watch] ───┘     ──► listener N ─► ...
//! ```
//!
//! | Operation    | Caller blocks?                          | Failure                  |
//! |--------------|-----------------------------------------|--------------------------|
//! | `submit`     | never (`try_send`)                      | `QueueSaturated`, dropped|
//! | `register`   | until the actor has applied it          | `Closed`                 |
//! | `unregister` | until the actor has applied it          | none (no-op when absent) |
//! | `close`      | never; `closed().await` waits for drain | none (idempotent)        |
//!
//! Delivery is best-effort and at-most-once. A listener that does not drain
//! its queue within the configured send timeout is evicted from the set.

pub mod error;
pub mod hub;
pub mod metrics;
pub mod session;
pub mod subscriber;

pub use error::{HubError, Result};
pub use hub::{HubConfig, HubHandle, HubState};
pub use metrics::{HubMetrics, MetricsSnapshot};
pub use session::{SessionEnd, StreamSession};
pub use subscriber::{Subscriber, SubscriberId};
