use axum::{routing::get, Router};
use paystream_broadcast::HubHandle;
use paystream_core::config::PaystreamConfig;
use paystream_payments::{PaymentEvent, Store};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State shared by every handler through `Arc<AppState>`.
pub struct AppState {
    pub config: PaystreamConfig,
    pub store: Store,
    /// Live payment feed; handlers submit after a successful write.
    pub hub: HubHandle<PaymentEvent>,
    /// Cancelled on shutdown to end every open SSE stream.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: PaystreamConfig,
        store: Store,
        hub: HubHandle<PaymentEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            hub,
            shutdown,
        }
    }

    /// Publish a payment event, logging when the feed drops it.
    pub fn publish(&self, event: PaymentEvent) {
        let payment_id = event.payment.id;
        let kind = event.kind.event_name();
        if self.hub.submit(event) {
            tracing::debug!(payment_id, kind, "payment event queued");
        } else {
            tracing::warn!(payment_id, kind, "payment event dropped by live feed");
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    use crate::http::{health, payments, products, stream};

    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/api/products/{id}",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route(
            "/api/payments",
            get(payments::list_payments).post(payments::create_payment),
        )
        .route("/api/payments/stream", get(stream::payment_stream))
        .route(
            "/api/payments/{id}",
            get(payments::get_payment)
                .put(payments::update_payment)
                .delete(payments::delete_payment),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
