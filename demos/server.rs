//! REST API server for the points ledger.
//!
//! Run with: `cargo run --example server`
//!
//! Settings come from `APP_ENV`, `PORT` and `API_PREFIX` (see
//! [`points_ledger_rs::config`]). Log level follows `RUST_LOG`.
//!
//! ## Endpoints
//!
//! - `POST /api/points/transactions` - Add a batch of transactions
//! - `POST /api/points/spend` - Spend points, oldest first
//! - `GET /api/points/balances` - Balance per payer
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/api/points/transactions \
//!   -H "Content-Type: application/json" \
//!   -d '[{"payer": "DANNON", "points": 300, "timestamp": "2020-10-31T10:00:00Z"}]'
//!
//! curl -X POST http://localhost:3000/api/points/spend \
//!   -H "Content-Type: application/json" \
//!   -d '{"points": 100}'
//!
//! curl http://localhost:3000/api/points/balances
//! ```

use axum::{
    Json, Router,
    extract::{FromRequest, OriginalUri, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use points_ledger_rs::config::ServerConfig;
use points_ledger_rs::{Balances, Ledger, LedgerError, NewTransaction, SpendEntry, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// === Request/Response DTOs ===

/// One element of the `POST /points/transactions` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionRequest {
    pub payer: String,
    pub points: i64,
    pub timestamp: String,
}

/// Body of `POST /points/spend`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpendRequest {
    pub points: i64,
}

/// Response body for errors.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub timestamp: String,
    pub path: String,
    pub message: String,
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub expose_internal_errors: bool,
}

// === Error Handling ===

/// A [`LedgerError`] bound to the request that caused it.
pub struct AppError {
    error: LedgerError,
    path: String,
    expose_internal: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.error.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!(path = %self.path, error = ?self.error, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (
            status,
            Json(ErrorResponse {
                status_code: status.as_u16(),
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                path: self.path,
                message: self.error.public_message(self.expose_internal),
            }),
        )
            .into_response()
    }
}

impl AppState {
    fn fail(&self, uri: &axum::http::Uri, error: LedgerError) -> AppError {
        AppError {
            error,
            path: uri.path().to_string(),
            expose_internal: self.expose_internal_errors,
        }
    }
}

/// JSON body extractor whose rejections use the [`ErrorResponse`] shape.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let path = match req.extensions().get::<OriginalUri>() {
            Some(OriginalUri(uri)) => uri.path().to_string(),
            None => req.uri().path().to_string(),
        };

        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError {
                error: LedgerError::InvalidRequest {
                    reason: rejection.body_text(),
                },
                path,
                expose_internal: false,
            }),
        }
    }
}

// === Handlers ===

/// POST /points/transactions - Add a batch of transactions.
async fn add_transactions(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    ApiJson(request): ApiJson<Vec<TransactionRequest>>,
) -> Result<(StatusCode, Json<Vec<Transaction>>), AppError> {
    let batch = request
        .iter()
        .map(|t| NewTransaction::parse(&t.payer, t.points, &t.timestamp))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| state.fail(&uri, e))?;

    let stored = state
        .ledger
        .add_transactions(batch)
        .map_err(|e| state.fail(&uri, e))?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// POST /points/spend - Spend points oldest first.
async fn spend_points(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    ApiJson(request): ApiJson<SpendRequest>,
) -> Result<Json<Vec<SpendEntry>>, AppError> {
    state
        .ledger
        .spend_points(request.points)
        .map(Json)
        .map_err(|e| state.fail(&uri, e))
}

/// GET /points/balances - Balance per payer.
async fn get_balances(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<Balances>, AppError> {
    state
        .ledger
        .balances()
        .map(Json)
        .map_err(|e| state.fail(&uri, e))
}

// === Router ===

pub fn create_router(state: AppState, api_prefix: &str) -> Router {
    let points = Router::new()
        .route("/points/transactions", post(add_transactions))
        .route("/points/spend", post(spend_points))
        .route("/points/balances", get(get_balances))
        .with_state(state);

    if api_prefix.is_empty() {
        points
    } else {
        Router::new().nest(api_prefix, points)
    }
}

// === Main ===

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let state = AppState {
        ledger: Arc::new(Ledger::new()),
        expose_internal_errors: config.environment.exposes_internal_errors(),
    };
    let app = create_router(state, &config.api_prefix);

    let listener = match TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(port = config.port, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(
        port = config.port,
        prefix = %config.api_prefix,
        environment = %config.environment,
        "points ledger listening"
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
