use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

use diary_core::db::Database;
use diary_core::models::{
    AuthSession, Credentials, Role, StoredState, UserProfile, validate_email, validate_password,
};
use diary_core::remote::{can_list_clients, can_read_state, can_write_state};
use diary_core::transfer::parse_program_state;

const BODY_LIMIT: usize = 2 * 1024 * 1024; // 2 MB

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
}

impl AppState {
    fn db(&self) -> std::sync::MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The authenticated caller, attached to each `/api` request by [`require_auth`].
#[derive(Clone)]
struct Caller {
    profile: UserProfile,
    token: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let caller = match bearer_token(&request) {
        Some(token) => {
            let token = token.to_string();
            let found = state.db().get_session_user(&token);
            match found {
                Ok(Some(profile)) => Some(Caller { profile, token }),
                Ok(None) => None,
                Err(e) => return ApiError::Internal(e).into_response(),
            }
        }
        None => None,
    };

    let Some(caller) = caller else {
        return ApiError::Unauthorized("Invalid or missing session token".to_string())
            .into_response();
    };
    request.extensions_mut().insert(caller);
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Auth handlers ---

async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthSession>), ApiError> {
    let Json(req) = payload?;
    let email = validate_email(&req.email).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    validate_password(&req.password).map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let db = state.db();
    if db
        .get_profile_by_email(&email)
        .context("database error")?
        .is_some()
    {
        return Err(ApiError::Conflict("User already registered".to_string()));
    }
    let profile = db
        .create_user(&email, &req.password, Role::Client)
        .context("failed to create user")?;
    let token = db
        .create_session(&profile.id)
        .context("failed to create session")?;
    info!(user = %profile.email, "Signed up");

    Ok((
        StatusCode::CREATED,
        Json(AuthSession {
            user_id: profile.id,
            email: profile.email,
            role: profile.role,
            token,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<AuthSession>, ApiError> {
    let Json(req) = payload?;
    let invalid = || ApiError::Unauthorized("Invalid login credentials".to_string());
    let email = validate_email(&req.email).map_err(|_| invalid())?;

    let db = state.db();
    let profile = db
        .verify_credentials(&email, &req.password)
        .context("database error")?
        .ok_or_else(invalid)?;
    let token = db
        .create_session(&profile.id)
        .context("failed to create session")?;
    info!(user = %profile.email, "Signed in");

    Ok(Json(AuthSession {
        user_id: profile.id,
        email: profile.email,
        role: profile.role,
        token,
    }))
}

async fn logout(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<StatusCode, ApiError> {
    state
        .db()
        .delete_session(&caller.token)
        .context("failed to revoke session")?;
    Ok(StatusCode::NO_CONTENT)
}

// --- API handlers ---

async fn get_profile(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state
        .db()
        .get_profile(&caller.profile.id)
        .context("database error")?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;
    Ok(Json(profile))
}

async fn get_state(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
) -> Result<Json<StoredState>, ApiError> {
    if !can_read_state(&caller.profile, &user_id) {
        return Err(ApiError::Forbidden(
            "Not allowed to read this diary".to_string(),
        ));
    }
    let stored = state
        .db()
        .get_user_state(&user_id)
        .context("database error")?
        .ok_or_else(|| ApiError::NotFound("No saved state".to_string()))?;
    Ok(Json(stored))
}

async fn put_state(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
    body: String,
) -> Result<Json<StoredState>, ApiError> {
    if !can_write_state(&caller.profile, &user_id) {
        return Err(ApiError::Forbidden(
            "Not allowed to write this diary".to_string(),
        ));
    }
    let program = parse_program_state(&body).map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    let stored = state
        .db()
        .upsert_user_state(&user_id, &program)
        .context("failed to save state")?;
    Ok(Json(stored))
}

async fn list_clients(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    if !can_list_clients(&caller.profile) {
        return Err(ApiError::Forbidden("Coach access required".to_string()));
    }
    let clients = state.db().list_clients().context("database error")?;
    Ok(Json(clients))
}

// --- Router ---

fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/api/profile", get(get_profile))
        .route("/api/state/{user_id}", get(get_state).put(put_state))
        .route("/api/clients", get(list_clients))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(db: Database, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
    };
    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind} over plain HTTP. Passwords and tokens are sent unencrypted."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Serve a fresh in-memory backend on an ephemeral loopback port.
#[cfg(test)]
pub(crate) async fn spawn_for_tests() -> (String, Arc<Mutex<Database>>) {
    let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(AppState { db: db.clone() });
    tokio::spawn(axum::serve(listener, app).into_future());
    (format!("http://{addr}"), db)
}
