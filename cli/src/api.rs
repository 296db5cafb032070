// HTTP API handlers for accounts and call logs
//
// Handlers take already-extracted input and return a status code plus JSON
// body. Every failure is converted at this boundary; nothing propagates to
// the HTTP layer as a rejection.

use peercall_core::account::{AuthService, NewAccount};
use peercall_core::CallLogStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use warp::http::StatusCode;

/// Public URL prefix under which uploads are served
pub const UPLOADS_PREFIX: &str = "/uploads";

/// Shared state for HTTP endpoints
#[derive(Clone)]
pub struct ApiContext {
    pub auth: Arc<AuthService>,
    pub calls: CallLogStore,
    pub upload_dir: PathBuf,
}

#[derive(Debug)]
pub struct ApiReply {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiReply {
    fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    fn failure(message: &str, error: impl std::fmt::Display) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "message": message, "error": error.to_string() }),
        )
    }
}

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub profile_picture: Option<UploadedFile>,
}

#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /api/auth/signup
pub async fn signup(ctx: &ApiContext, form: SignupForm) -> ApiReply {
    let stored = match &form.profile_picture {
        Some(file) => match store_upload(&ctx.upload_dir, file).await {
            Ok(path) => Some(path),
            Err(e) => return ApiReply::failure("Error signing up", e),
        },
        None => None,
    };

    let account = NewAccount {
        username: form.username,
        email: form.email,
        password: form.password,
        profile_picture: stored.as_ref().map(|(_, url)| url.clone()),
    };

    let auth = ctx.auth.clone();
    let result = tokio::task::spawn_blocking(move || auth.signup(account)).await;

    match result {
        Ok(Ok(_)) => ApiReply::new(
            StatusCode::CREATED,
            json!({ "message": "User registered successfully" }),
        ),
        Ok(Err(e)) => {
            tracing::warn!("Signup failed: {}", e);
            discard_upload(stored).await;
            ApiReply::failure("Error signing up", e)
        }
        Err(e) => {
            discard_upload(stored).await;
            ApiReply::failure("Error signing up", e)
        }
    }
}

/// POST /api/auth/login
pub async fn login(ctx: &ApiContext, request: LoginRequest) -> ApiReply {
    let auth = ctx.auth.clone();
    let result =
        tokio::task::spawn_blocking(move || auth.login(&request.email, &request.password)).await;

    match result {
        Ok(Ok(login)) => match serde_json::to_value(&login) {
            Ok(body) => ApiReply::new(StatusCode::OK, body),
            Err(e) => ApiReply::failure("Error logging in", e),
        },
        Ok(Err(e)) if e.is_client_error() => {
            ApiReply::new(StatusCode::BAD_REQUEST, json!({ "message": e.to_string() }))
        }
        Ok(Err(e)) => {
            tracing::error!("Login failed: {}", e);
            ApiReply::failure("Error logging in", e)
        }
        Err(e) => ApiReply::failure("Error logging in", e),
    }
}

/// GET /api/call/logs
pub async fn call_logs(ctx: &ApiContext) -> ApiReply {
    match ctx.calls.list_with_participants(ctx.auth.users()) {
        Ok(logs) => match serde_json::to_value(&logs) {
            Ok(body) => ApiReply::new(StatusCode::OK, body),
            Err(e) => ApiReply::failure("Error fetching call logs", e),
        },
        Err(e) => {
            tracing::error!("Listing call logs failed: {}", e);
            ApiReply::failure("Error fetching call logs", e)
        }
    }
}

// ============================================================================
// UPLOADS
// ============================================================================

/// Name an upload is stored under: `<millis>-<basename>`
pub fn upload_name(millis: u128, filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("upload");
    format!("{}-{}", millis, base)
}

/// Write an upload to disk, returning its path and public URL
async fn store_upload(dir: &Path, file: &UploadedFile) -> std::io::Result<(PathBuf, String)> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let name = upload_name(millis, &file.filename);

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(&name);
    tokio::fs::write(&path, &file.data).await?;

    tracing::debug!(path = %path.display(), bytes = file.data.len(), "Stored upload");
    Ok((path, format!("{}/{}", UPLOADS_PREFIX, name)))
}

async fn discard_upload(stored: Option<(PathBuf, String)>) {
    if let Some((path, _)) = stored {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!(path = %path.display(), "Could not remove upload: {}", e);
        }
    }
}
