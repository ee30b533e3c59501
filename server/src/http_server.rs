use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sessionkit_session::{Manager, SessionError};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Usernames are exactly three lowercase ASCII letters
pub const USERNAME_PATTERN: &str = "^[a-z]{3}$";

const USERNAME_KEY: &str = "username";

/// Application state shared with all routes
#[derive(Clone)]
pub struct AppState {
    manager: Arc<Manager>,
    username_pattern: Arc<Regex>,
}

impl AppState {
    pub fn new(manager: Arc<Manager>) -> anyhow::Result<Self> {
        Ok(Self {
            manager,
            username_pattern: Arc::new(Regex::new(USERNAME_PATTERN)?),
        })
    }
}

/// Login form fields
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    sessions: usize,
}

/// Error type for HTTP server
#[derive(Debug)]
pub enum ApiError {
    InternalError(anyhow::Error),
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self::InternalError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::InternalError(e) => {
                error!(error = %e, "Internal server error");
                let body = Json(json!({ "error": format!("Internal server error: {}", e) }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

/// Build the router with all session routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server, stopping once `shutdown` resolves
pub async fn run_server(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("Starting HTTP server on {}", addr);

    axum::Server::try_bind(&addr)
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?
        .serve(router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server failed: {}", e))
}

/// Health check handler
async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let sessions = state.manager.provider().count().await?;
    Ok(Json(HealthResponse {
        status: "running",
        sessions,
    }))
}

/// Show who is logged in on this session
async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mut response_headers = HeaderMap::new();
    let session = state
        .manager
        .session_start(&headers, &mut response_headers)
        .await?;

    let body = match session.get(USERNAME_KEY).await {
        Some(Value::String(username)) => format!("logged in as {}", username),
        _ => "please log in".to_string(),
    };
    Ok((response_headers, body).into_response())
}

/// Validate the submitted username and store it in the session
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let mut response_headers = HeaderMap::new();
    let session = state
        .manager
        .session_start(&headers, &mut response_headers)
        .await?;

    if form.username.is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            response_headers,
            "the username can not be null",
        )
            .into_response());
    }
    if !state.username_pattern.is_match(&form.username) {
        return Ok(
            (StatusCode::BAD_REQUEST, response_headers, "the username is invalid").into_response(),
        );
    }

    session
        .set(USERNAME_KEY, Value::String(form.username.clone()))
        .await?;
    info!(
        username = %form.username,
        password_supplied = !form.password.is_empty(),
        "User logged in"
    );

    Ok((response_headers, "log in successfully").into_response())
}

/// Drop the session and expire the cookie
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let mut response_headers = HeaderMap::new();
    state
        .manager
        .session_destroy(&headers, &mut response_headers)
        .await?;
    Ok((response_headers, "logged out").into_response())
}
