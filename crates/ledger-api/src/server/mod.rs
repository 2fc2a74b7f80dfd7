use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue, LOCATION};
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contracts::{Advertiser, ApiError, ErrorCode, ServiceConfig, ANONYMOUS_USER_ID, CLICK_ID_PARAM};
use ledger_core::{DebitOutcome, LedgerError, RankedPlacement};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::reply::{LogOnlyReplyTransport, ReplyTransport};
use crate::{LedgerApi, PersistenceError};

include!("error.rs");
include!("state.rs");
include!("routes/search.rs");
include!("routes/click.rs");
include!("routes/reward.rs");
include!("routes/admin.rs");
include!("routes/webhooks.rs");
include!("util.rs");

pub async fn serve(
    addr: SocketAddr,
    config: ServiceConfig,
    sqlite_path: Option<String>,
) -> Result<(), ServerError> {
    let state = match sqlite_path {
        Some(path) => AppState::with_sqlite(config, &path)?,
        None => AppState::in_memory(config),
    };
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "ad ledger API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/search", get(search_placements))
        .route("/click", get(click_redirect))
        .route("/track/micro-cv", post(track_micro_conversion))
        .route("/api/gacha/spin", post(spin_reward))
        .route("/api/admin/shop", get(get_shop).post(upsert_shop))
        .route("/webhook/lemonsqueezy", post(payment_webhook))
        .route("/webhook/messaging", post(messaging_webhook))
        .fallback(liveness)
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn liveness() -> &'static str {
    "ad ledger API is running."
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests;
