//! Live payment feed: GET /api/payments/stream (Server-Sent Events).
//!
//! Each connection opens one `StreamSession` on the hub. The session ends
//! when the client disconnects (axum drops the stream, `Drop` unregisters),
//! when the server shuts down, or when the hub evicts it for falling behind.

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use paystream_broadcast::{SessionEnd, StreamSession};
use paystream_payments::PaymentEvent;
use std::sync::Arc;
use tracing::{info, warn};

use super::failure;
use crate::app::AppState;

/// GET /api/payments/stream
pub async fn payment_stream(State(state): State<Arc<AppState>>) -> Response {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let capacity = state.config.broadcast.subscriber_capacity;

    let mut session = match StreamSession::open(&state.hub, capacity).await {
        Ok(session) => session,
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "payment stream refused");
            return failure(
                StatusCode::SERVICE_UNAVAILABLE,
                "Live feed unavailable",
                e.to_string(),
            )
            .into_response();
        }
    };
    info!(conn_id = %conn_id, subscriber = %session.id(), "payment stream opened");

    let cancel = state.shutdown.child_token();
    let stream = async_stream::stream! {
        loop {
            match session.recv(&cancel).await {
                Ok(event) => match to_sse(&event) {
                    Ok(frame) => yield Ok::<_, std::convert::Infallible>(frame),
                    Err(e) => warn!(conn_id = %conn_id, error = %e, "payment event not serializable"),
                },
                Err(SessionEnd::Cancelled) => {
                    info!(conn_id = %conn_id, "payment stream closed by shutdown");
                    break;
                }
                Err(SessionEnd::Evicted) => {
                    warn!(conn_id = %conn_id, "payment stream evicted for falling behind");
                    break;
                }
            }
        }
        session.close().await;
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(state.config.broadcast.keepalive()))
        .into_response()
}

/// One SSE frame: `event: payment.created|payment.updated`, `data:` the payment JSON.
fn to_sse(event: &PaymentEvent) -> Result<Event, axum::Error> {
    Event::default()
        .event(event.kind.event_name())
        .json_data(&event.payment)
}
