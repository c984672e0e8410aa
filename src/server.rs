//! HTTP tool server.
//!
//! Serves the analysis tools from [`ToolRegistry::with_builtins`] as a JSON
//! API. One [`StabilityGuard`] is shared by every request.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all tools with parameter schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "conflict", "message": "register_component: component 'UserCard' is already registered" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `tool_error` (500).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use stability_guard_core::registry::RegistryError;

use crate::config::Config;
use crate::guard::StabilityGuard;
use crate::tools::{validate_params, ToolContext, ToolInfo, ToolRegistry};

/// Shared state handed to every handler.
#[derive(Clone)]
struct AppState {
    /// Guard and config the tools run against.
    ctx: ToolContext,
    /// The built-in tools, looked up by name.
    tools: Arc<ToolRegistry>,
}

/// Build the router. Split out so tests can serve it on any listener.
pub fn router(config: Arc<Config>, guard: Arc<StabilityGuard>) -> Router {
    let state = AppState {
        ctx: ToolContext::new(guard, config),
        tools: Arc::new(ToolRegistry::with_builtins()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: Arc<Config>, guard: Arc<StabilityGuard>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(config, guard);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("tool server listening on http://{}", bind_addr);
    println!("sguard server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error body: `{ "error": { "code", "message" } }`.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Machine-readable code plus a human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    /// One of `bad_request`, `not_found`, `conflict`, `tool_error`.
    code: String,
    /// Human-readable error message, prefixed with the tool name.
    message: String,
}

/// Handler error that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

/// Constructs a 404 Not Found error.
fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Constructs a 409 Conflict error for rejected registrations.
fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict",
        message: message.into(),
    }
}

/// Constructs a 500 error for tool execution failures.
fn tool_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "tool_error",
        message: message.into(),
    }
}

/// Map a tool failure to an HTTP error. Registry errors are typed; the
/// rest are classified by message.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = format!("{}: {}", tool_name, err);

    if let Some(registry_err) = err.downcast_ref::<RegistryError>() {
        return match registry_err {
            RegistryError::Validation { .. } | RegistryError::SnapshotVersion(_) => {
                bad_request(msg)
            }
            RegistryError::DuplicateName { .. }
            | RegistryError::FunctionalDuplicate { .. }
            | RegistryError::Locked => conflict(msg),
        };
    }

    let text = err.to_string();
    if text.contains("not found") || text.contains("does not exist") {
        not_found(msg)
    } else if text.contains("must not be empty") || text.contains("invalid") {
        bad_request(msg)
    } else {
        tool_error(msg)
    }
}

// ============ GET /health ============

/// Response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"`.
    status: String,
    /// Crate version.
    version: String,
}

/// Liveness check.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

/// Response body for `GET /tools/list`.
#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

/// Lists every tool with its parameter schema.
async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.infos(),
    })
}

// ============ POST /tools/{name} ============

/// Validates the parameters against the tool's schema, then runs it.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let validated = validate_params(&tool.parameters_schema(), &params)
        .map_err(|e| bad_request(e.to_string()))?;

    log::debug!("tool call: {}", name);
    let result = tool
        .execute(validated, &state.ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(result))
}
