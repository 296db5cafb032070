use crate::api::{self, ApiContext, ApiReply, LoginRequest, SignupForm, UploadedFile};
use bytes::Buf;
use futures::{SinkExt, StreamExt, TryStreamExt};
use peercall_core::SignalingRelay;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::filters::BoxedFilter;
use warp::Filter;

/// Largest accepted signup form, profile image included
const MAX_FORM_BYTES: u64 = 10 * 1024 * 1024;

// ============================================================================
// SERVER START
// ============================================================================

pub async fn run(addr: SocketAddr, relay: Arc<SignalingRelay>, api_ctx: ApiContext) {
    let routes = routes(relay, api_ctx);

    tracing::info!(%addr, "Starting WebSocket + HTTP server");
    warp::serve(routes).run(addr).await;
}

/// Every HTTP and WebSocket route, with CORS applied
pub fn routes(
    relay: Arc<SignalingRelay>,
    api_ctx: ApiContext,
) -> BoxedFilter<(impl warp::Reply,)> {
    // --- Warp filters for shared state ---

    let relay_filter = warp::any().map({
        let relay = relay.clone();
        move || relay.clone()
    });

    let ctx_filter = warp::any().map({
        let ctx = api_ctx.clone();
        move || ctx.clone()
    });

    // --- Routes ---

    // 1. Signaling WebSocket at /ws
    let ws_route = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(relay_filter)
        .map(|ws: warp::ws::Ws, relay: Arc<SignalingRelay>| {
            ws.on_upgrade(move |socket| handle_connection(socket, relay))
        })
        .boxed();

    // 2. Signup (multipart, optional profile picture)
    let signup_route = warp::path!("api" / "auth" / "signup")
        .and(warp::post())
        .and(warp::multipart::form().max_length(MAX_FORM_BYTES))
        .and(ctx_filter.clone())
        .and_then(handle_signup)
        .boxed();

    // 3. Login
    let login_route = warp::path!("api" / "auth" / "login")
        .and(warp::post())
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(handle_login)
        .boxed();

    // 4. Call logs
    let logs_route = warp::path!("api" / "call" / "logs")
        .and(warp::get())
        .and(ctx_filter)
        .and_then(handle_call_logs)
        .boxed();

    // 5. Uploaded profile pictures
    let uploads_route = warp::path("uploads")
        .and(warp::fs::dir(api_ctx.upload_dir.clone()))
        .boxed();

    // Combine all routes with CORS
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type", "authorization"]);
    ws_route
        .or(signup_route)
        .or(login_route)
        .or(logs_route)
        .or(uploads_route)
        .with(cors)
        .boxed()
}

// ============================================================================
// API HANDLERS
// ============================================================================

fn into_reply(reply: ApiReply) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&reply.body), reply.status)
}

async fn handle_signup(
    form: warp::multipart::FormData,
    ctx: ApiContext,
) -> Result<impl warp::Reply, warp::Rejection> {
    let reply = match read_signup_form(form).await {
        Ok(form) => api::signup(&ctx, form).await,
        Err(e) => {
            tracing::warn!("Malformed signup form: {}", e);
            ApiReply {
                status: warp::http::StatusCode::INTERNAL_SERVER_ERROR,
                body: serde_json::json!({
                    "message": "Error signing up",
                    "error": e.to_string(),
                }),
            }
        }
    };
    Ok(into_reply(reply))
}

async fn handle_login(
    request: LoginRequest,
    ctx: ApiContext,
) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(into_reply(api::login(&ctx, request).await))
}

async fn handle_call_logs(ctx: ApiContext) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(into_reply(api::call_logs(&ctx).await))
}

/// Collect the multipart parts of a signup request
async fn read_signup_form(
    form: warp::multipart::FormData,
) -> Result<SignupForm, warp::Error> {
    let mut parts = Box::pin(form);
    let mut signup = SignupForm::default();

    while let Some(part) = parts.try_next().await? {
        let name = part.name().to_string();
        let filename = part.filename().map(str::to_string);
        let data = part
            .stream()
            .try_fold(Vec::new(), |mut acc, mut buf| async move {
                while buf.has_remaining() {
                    let chunk = buf.chunk();
                    let len = chunk.len();
                    acc.extend_from_slice(chunk);
                    buf.advance(len);
                }
                Ok(acc)
            })
            .await?;

        match name.as_str() {
            "username" => signup.username = String::from_utf8_lossy(&data).into_owned(),
            "email" => signup.email = String::from_utf8_lossy(&data).into_owned(),
            "password" => signup.password = String::from_utf8_lossy(&data).into_owned(),
            "profilePicture" => {
                if let Some(filename) = filename.filter(|f| !f.is_empty()) {
                    signup.profile_picture = Some(UploadedFile { filename, data });
                }
            }
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(signup)
}

// ============================================================================
// WEBSOCKET HANDLER
// ============================================================================

async fn handle_connection(ws: warp::ws::WebSocket, relay: Arc<SignalingRelay>) {
    let mut session = match relay.open_session() {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Refusing signaling connection: {}", e);
            let _ = ws.close().await;
            return;
        }
    };

    let Some(mut events) = session.take_events() else {
        return;
    };
    let (mut user_ws_tx, mut user_ws_rx) = ws.split();

    // Task to forward relay events -> WebSocket
    let forward_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event.encode() {
                Ok(json) => {
                    if user_ws_tx
                        .send(warp::ws::Message::text(json))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Dropping unencodable event: {}", e),
            }
        }
    });

    // Handle WebSocket -> relay, in arrival order
    while let Some(result) = user_ws_rx.next().await {
        match result {
            Ok(msg) => {
                if let Ok(text) = msg.to_str() {
                    session.handle_text(text);
                } else if msg.is_close() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(id = %session.id(), "WebSocket error: {}", e);
                break;
            }
        }
    }

    // Unregister, then stop the writer
    drop(session);
    forward_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use peercall_core::account::{AuthService, PasswordHasher, TokenIssuer, UserStore};
    use peercall_core::{CallLogStore, LocalRegistry, MemoryStorage, ServerEvent, StorageBackend};
    use serde_json::{json, Value};
    use std::path::Path;
    use std::time::Duration;

    const BOUNDARY: &str = "peercall-test-boundary";

    fn test_server(upload_dir: &Path) -> (Arc<SignalingRelay>, ApiContext) {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let api_ctx = ApiContext {
            auth: Arc::new(AuthService::new(
                UserStore::new(backend.clone()),
                PasswordHasher::new(4),
                TokenIssuer::new(b"test-secret", 3600),
            )),
            calls: CallLogStore::new(backend),
            upload_dir: upload_dir.to_path_buf(),
        };
        let relay = Arc::new(SignalingRelay::new(Arc::new(LocalRegistry::new())));
        (relay, api_ctx)
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((name, filename, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                    BOUNDARY, name, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post_signup(
        routes: &BoxedFilter<(impl warp::Reply + 'static,)>,
        body: Vec<u8>,
    ) -> (u16, Value) {
        let res = warp::test::request()
            .method("POST")
            .path("/api/auth/signup")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(body)
            .reply(routes)
            .await;
        let status = res.status().as_u16();
        (status, serde_json::from_slice(res.body()).unwrap())
    }

    async fn connected_id(client: &mut warp::test::WsClient) -> String {
        let msg = client.recv().await.expect("Failed to receive");
        match ServerEvent::decode(msg.to_str().unwrap()).unwrap() {
            ServerEvent::Connected { id } => id,
            other => panic!("Expected connected event, got {:?}", other),
        }
    }

    async fn wait_for_live(relay: &SignalingRelay, expected: usize) {
        for _ in 0..200 {
            if relay.registry().len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "Expected {} live connections, found {}",
            expected,
            relay.registry().len()
        );
    }

    #[tokio::test]
    async fn test_ws_invite_and_answer_over_frames() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, api_ctx) = test_server(dir.path());
        let routes = routes(relay.clone(), api_ctx);

        let mut a = warp::test::ws().path("/ws").handshake(routes.clone()).await.unwrap();
        let mut b = warp::test::ws().path("/ws").handshake(routes.clone()).await.unwrap();

        let a_id = connected_id(&mut a).await;
        let b_id = connected_id(&mut b).await;
        assert_ne!(a_id, b_id);
        wait_for_live(&relay, 2).await;

        a.send_text(
            json!({
                "event": "callUser",
                "data": {"to": b_id, "signalData": {"sdp": "x"}, "from": a_id}
            })
            .to_string(),
        )
        .await;

        let frame: Value = serde_json::from_str(b.recv().await.unwrap().to_str().unwrap()).unwrap();
        assert_eq!(
            frame,
            json!({
                "event": "incomingCall",
                "data": {"from": a_id, "signalData": {"sdp": "x"}}
            })
        );

        b.send_text(
            json!({"event": "answerCall", "data": {"to": a_id, "signal": {"sdp": "y"}}}).to_string(),
        )
        .await;

        let frame: Value = serde_json::from_str(a.recv().await.unwrap().to_str().unwrap()).unwrap();
        assert_eq!(
            frame,
            json!({"event": "callAnswered", "data": {"signal": {"sdp": "y"}}})
        );
    }

    #[tokio::test]
    async fn test_ws_close_unregisters() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, api_ctx) = test_server(dir.path());
        let routes = routes(relay.clone(), api_ctx);

        let mut a = warp::test::ws().path("/ws").handshake(routes.clone()).await.unwrap();
        let mut b = warp::test::ws().path("/ws").handshake(routes.clone()).await.unwrap();
        connected_id(&mut a).await;
        connected_id(&mut b).await;
        wait_for_live(&relay, 2).await;

        b.send(warp::ws::Message::close()).await;
        wait_for_live(&relay, 1).await;
    }

    #[tokio::test]
    async fn test_ws_malformed_frame_keeps_connection() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, api_ctx) = test_server(dir.path());
        let routes = routes(relay.clone(), api_ctx);

        let mut a = warp::test::ws().path("/ws").handshake(routes.clone()).await.unwrap();
        let a_id = connected_id(&mut a).await;

        a.send_text("not json").await;
        a.send_text(
            json!({"event": "answerCall", "data": {"to": a_id, "signal": 7}}).to_string(),
        )
        .await;

        let frame: Value = serde_json::from_str(a.recv().await.unwrap().to_str().unwrap()).unwrap();
        assert_eq!(frame["event"], "callAnswered");
        assert_eq!(frame["data"]["signal"], 7);
        assert_eq!(relay.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_multipart_signup_with_picture() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, api_ctx) = test_server(dir.path());
        let routes = routes(relay, api_ctx.clone());

        let body = multipart_body(
            &[
                ("username", "alice"),
                ("email", "alice@example.com"),
                ("password", "hunter22"),
                ("nickname", "ignored"),
            ],
            Some(("profilePicture", "me.png", &[7u8, 8, 9][..])),
        );
        let (status, reply) = post_signup(&routes, body).await;
        assert_eq!(status, 201);
        assert_eq!(reply, json!({"message": "User registered successfully"}));

        let user = api_ctx
            .auth
            .users()
            .find_by_email("alice@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.profile_picture.ends_with("-me.png"));

        // The stored picture is served back under /uploads
        let res = warp::test::request()
            .method("GET")
            .path(&user.profile_picture)
            .reply(&routes)
            .await;
        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(res.body().to_vec(), vec![7u8, 8, 9]);
    }

    #[tokio::test]
    async fn test_duplicate_multipart_signup_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, api_ctx) = test_server(dir.path());
        let routes = routes(relay, api_ctx.clone());

        let fields = [
            ("username", "alice"),
            ("email", "alice@example.com"),
            ("password", "hunter22"),
        ];
        let (status, _) = post_signup(&routes, multipart_body(&fields, None)).await;
        assert_eq!(status, 201);

        let (status, reply) = post_signup(&routes, multipart_body(&fields, None)).await;
        assert_eq!(status, 500);
        assert_eq!(reply["message"], "Error signing up");
        assert_eq!(api_ctx.auth.users().count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_form_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, api_ctx) = test_server(dir.path());
        let routes = routes(relay, api_ctx.clone());

        let (status, reply) = post_signup(&routes, b"garbage".to_vec()).await;
        assert_eq!(status, 500);
        assert_eq!(reply["message"], "Error signing up");
        assert_eq!(api_ctx.auth.users().count(), 0);
    }

    #[tokio::test]
    async fn test_login_and_call_logs_routes() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, api_ctx) = test_server(dir.path());
        let routes = routes(relay, api_ctx.clone());

        let fields = [
            ("username", "alice"),
            ("email", "alice@example.com"),
            ("password", "hunter22"),
        ];
        post_signup(&routes, multipart_body(&fields, None)).await;

        let res = warp::test::request()
            .method("POST")
            .path("/api/auth/login")
            .json(&json!({"email": "alice@example.com", "password": "wrong"}))
            .reply(&routes)
            .await;
        assert_eq!(res.status().as_u16(), 400);
        let reply: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(reply, json!({"message": "Invalid credentials"}));

        let res = warp::test::request()
            .method("POST")
            .path("/api/auth/login")
            .json(&json!({"email": "alice@example.com", "password": "hunter22"}))
            .reply(&routes)
            .await;
        assert_eq!(res.status().as_u16(), 200);
        let reply: Value = serde_json::from_slice(res.body()).unwrap();
        assert!(reply["token"].is_string());

        let alice_id = reply["user"]["id"].as_str().unwrap().to_string();
        api_ctx.calls.record(&alice_id, "gone").unwrap();

        let res = warp::test::request()
            .method("GET")
            .path("/api/call/logs")
            .reply(&routes)
            .await;
        assert_eq!(res.status().as_u16(), 200);
        let logs: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(logs[0]["caller"]["username"], "alice");
        assert!(logs[0]["receiver"].is_null());
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, api_ctx) = test_server(dir.path());
        let routes = routes(relay, api_ctx);

        let res = warp::test::request()
            .method("OPTIONS")
            .path("/api/auth/login")
            .header("origin", "http://client.example")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .reply(&routes)
            .await;

        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(
            res.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("http://client.example")
        );
    }
}
