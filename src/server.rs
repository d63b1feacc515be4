//! HTTP control surface
//!
//! | Route                             | Action                          |
//! |-----------------------------------|---------------------------------|
//! | `GET /alive`                      | liveness probe                  |
//! | `POST /firewall/{id}`             | fetch from provider and track   |
//! | `DELETE /firewall/{id}`           | untrack                         |
//! | `POST /rules/{id}/{category}`     | add an address or temp port     |
//! | `DELETE /rules/{id}/{category}`   | remove an address or temp port  |
//!
//! Rule routes take `ip` and `port` query parameters. When API keys are
//! configured every route except `/alive` requires a matching `key` header.

use crate::config::ApiKeys;
use crate::core::firewall::Outcome;
use crate::core::mutator::RuleMutator;
use crate::core::sync::SyncOrchestrator;
use crate::validators::{self, sanitize_for_log};
use axum::Router;
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Header carrying the control API key
pub const KEY_HEADER: &str = "key";

/// Proxy headers naming the original client, most trusted first
const CLIENT_HEADERS: [&str; 2] = ["cf-connecting-ip", "x-forwarded-for"];

const INTERNAL_ERROR_BODY: &str = r#"{"error":"Internal error: Unable to handle your request."}"#;

/// Shared state of all handlers
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub mutator: RuleMutator,
    pub api_keys: Option<ApiKeys>,
}

impl AppState {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, api_keys: Option<ApiKeys>) -> Self {
        let mutator = RuleMutator::new(Arc::clone(orchestrator.store()));
        Self {
            orchestrator,
            mutator,
            api_keys,
        }
    }
}

type SharedState = Arc<AppState>;

/// Errors answered to control clients
///
/// Only coarse messages leave the process; details go to the log.
#[derive(Debug)]
pub enum ApiError {
    /// Request failed validation
    BadRequest(String),
    /// Missing or unknown API key
    Forbidden,
    /// Firewall is not tracked
    NotFound,
    /// Provider or internal failure
    Internal(String),
}

impl ApiError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            Self::BadRequest(message) => (status, message).into_response(),
            Self::Forbidden => (status, "Forbidden").into_response(),
            Self::NotFound => (status, Outcome::FirewallNotFound.to_string()).into_response(),
            Self::Internal(detail) => {
                error!(detail = %detail, "Request failed");
                (
                    status,
                    [("content-type", "application/json")],
                    INTERNAL_ERROR_BODY,
                )
                    .into_response()
            }
        }
    }
}

/// Status answered for each mutation outcome
pub const fn outcome_status(outcome: Outcome) -> StatusCode {
    match outcome {
        Outcome::Success => StatusCode::OK,
        Outcome::AlreadyPresent | Outcome::NotPresent => StatusCode::CONFLICT,
        Outcome::FirewallNotFound => StatusCode::NOT_FOUND,
        Outcome::UnknownCategory | Outcome::MissingParameter => StatusCode::BAD_REQUEST,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RuleQuery {
    ip: Option<String>,
    port: Option<String>,
}

/// Builds the control router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/firewall/{id}", post(track_firewall).delete(untrack_firewall))
        .route("/rules/{id}/{category}", post(add_rule).delete(remove_rule))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), require_key))
        .route("/alive", get(alive))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Serves the control API on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns `Err` if accepting connections fails.
pub async fn serve<F>(listener: TcpListener, state: SharedState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Control API listening");
    }
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Client address for the request log.
///
/// Behind a proxy the peer is the proxy itself, so a forwarding header wins
/// when present. Only the first `x-forwarded-for` hop is used.
fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    CLIENT_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(sanitize_for_log)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_address(request.headers(), peer);

    let response = next.run(request).await;
    info!(
        "{method} {} - {client} ({})",
        sanitize_for_log(&path),
        response.status().as_u16()
    );
    response
}

async fn require_key(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(keys) = &state.api_keys {
        let supplied = request
            .headers()
            .get(KEY_HEADER)
            .and_then(|value| value.to_str().ok());
        match supplied {
            Some(key) if keys.contains(key) => {}
            Some(_) => {
                warn!(path = %sanitize_for_log(request.uri().path()), "Rejected unknown API key");
                return Err(ApiError::Forbidden);
            }
            None => {
                debug!(path = %sanitize_for_log(request.uri().path()), "Missing API key");
                return Err(ApiError::Forbidden);
            }
        }
    }
    Ok(next.run(request).await)
}

async fn alive() -> String {
    chrono::Utc::now().timestamp().rem_euclid(60).to_string()
}

async fn track_firewall(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<&'static str, ApiError> {
    let id = validators::parse_firewall_id(&id).map_err(ApiError::BadRequest)?;

    state
        .orchestrator
        .fetch_and_track(id)
        .await
        .map_err(|e| ApiError::Internal(format!("fetch of firewall {id} failed: {e}")))?;
    Ok("fw_created")
}

async fn untrack_firewall(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<&'static str, ApiError> {
    let id = validators::parse_firewall_id(&id).map_err(ApiError::BadRequest)?;

    if state.orchestrator.untrack(id).await {
        Ok("fw_deleted")
    } else {
        Err(ApiError::NotFound)
    }
}

async fn add_rule(
    State(state): State<SharedState>,
    Path((id, category)): Path<(String, String)>,
    Query(query): Query<RuleQuery>,
) -> Result<(StatusCode, String), ApiError> {
    mutate(&state, &Method::POST, &id, &category, &query)
}

async fn remove_rule(
    State(state): State<SharedState>,
    Path((id, category)): Path<(String, String)>,
    Query(query): Query<RuleQuery>,
) -> Result<(StatusCode, String), ApiError> {
    mutate(&state, &Method::DELETE, &id, &category, &query)
}

fn mutate(
    state: &AppState,
    method: &Method,
    id: &str,
    category: &str,
    query: &RuleQuery,
) -> Result<(StatusCode, String), ApiError> {
    let id = validators::parse_firewall_id(id).map_err(ApiError::BadRequest)?;
    let params =
        validators::validate_rule_params(category, query.ip.as_deref(), query.port.as_deref())
            .map_err(ApiError::BadRequest)?;

    let category = params.category.as_str();
    let address = params.address.as_deref();
    let outcome = if *method == Method::DELETE {
        state.mutator.remove_rule(id, category, address, params.port)
    } else {
        state.mutator.add_rule(id, category, address, params.port)
    };

    Ok((outcome_status(outcome), outcome.to_string()))
}
