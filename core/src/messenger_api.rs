/// Lost & found REST API + SSE: HTTP server for web and terminal clients
///
/// Caller identity is the `X-User-Id` header.
///
/// Endpoints:
///   GET    /api/status
///   GET    /api/posts                         ?q=..&category=..&type=..
///   POST   /api/posts                         body: NewPost
///   DELETE /api/posts/:id
///   PUT    /api/profile                       body: {"name":"...","email":"...","avatar_url":null}
///   GET    /api/profile/:user_id
///   GET    /api/conversations
///   DELETE /api/conversations/:post_id/:counterpart_id
///   POST   /api/messages                      body: {"to":"<id>","post_id":1,"text":"..."}
///   GET    /events                            ?user=<id>  SSE stream of MessengerEvent JSON,
///                                             or {"type":"resync"} after the stream fell behind
use crate::backend::Backend;
use crate::error::{LostFoundError, Result};
use crate::ids::{PostId, UserId};
use crate::messenger_types::MessengerEvent;
use crate::models::{default_avatar_url, Category, NewPost, PostType, Profile};
use crate::post_service::PostFilter;
use chrono::Utc;
use futures_util::stream::{unfold, StreamExt};
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body, Frame};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

// ─── Type alias ──────────────────────────────────────────────────────────────

type BoxBody = http_body_util::combinators::BoxBody<bytes::Bytes, Infallible>;
pub type Resp = Response<BoxBody>;

/// Sent when a subscriber fell behind the event channel
const RESYNC_FRAME: &str = "data: {\"type\":\"resync\"}\n\n";

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn cors_headers(builder: http::response::Builder) -> http::response::Builder {
    builder
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, X-User-Id")
}

fn json_resp(status: StatusCode, body: Vec<u8>) -> Resp {
    cors_headers(Response::builder())
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(bytes::Bytes::from(body)).boxed())
        .unwrap_or_else(|_| Response::new(Full::new(bytes::Bytes::new()).boxed()))
}

fn json_ok(value: serde_json::Value) -> Resp {
    json_resp(StatusCode::OK, serde_json::to_vec(&value).unwrap_or_default())
}

fn json_err(status: StatusCode, msg: &str) -> Resp {
    json_resp(
        status,
        serde_json::to_vec(&serde_json::json!({ "error": msg })).unwrap_or_default(),
    )
}

fn error_resp(e: &LostFoundError) -> Resp {
    let status = match e {
        LostFoundError::InvalidArgument(_) | LostFoundError::Serialization(_) => {
            StatusCode::BAD_REQUEST
        }
        LostFoundError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        LostFoundError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => {
            error!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_err(status, &e.to_string())
}

fn sse_resp(rx: tokio::sync::broadcast::Receiver<MessengerEvent>, user: UserId) -> Resp {
    // Keepalive comment sent immediately so the client knows the connection is live
    let initial = bytes::Bytes::from(": connected\n\n");
    let first = futures_util::stream::once(async move {
        Ok::<Frame<bytes::Bytes>, Infallible>(Frame::data(initial))
    });

    let events = unfold((rx, user), |(mut rx, user)| async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.involves(&user) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    let data = format!("data: {}\n\n", json);
                    let frame = Frame::data(bytes::Bytes::from(data));
                    return Some((Ok::<_, Infallible>(frame), (rx, user)));
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    // Dropped events may have targeted this user; tell the client to re-fetch
                    warn!("SSE client {} lagged {} events", user, n);
                    let frame = Frame::data(bytes::Bytes::from(RESYNC_FRAME));
                    return Some((Ok::<_, Infallible>(frame), (rx, user)));
                }
                Err(_) => return None, // channel closed
            }
        }
    });

    let stream = first.chain(events);
    cors_headers(Response::builder())
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream; charset=utf-8")
        .header("Cache-Control", "no-cache")
        .header("X-Accel-Buffering", "no") // disable nginx buffering
        .body(StreamBody::new(stream).boxed())
        .unwrap_or_else(|_| Response::new(Full::new(bytes::Bytes::new()).boxed()))
}

// ─── Entry point ─────────────────────────────────────────────────────────────

pub async fn start_messenger_api(backend: Backend, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(LostFoundError::Io)?;
    serve(listener, backend).await
}

/// Accept loop on an already bound listener
pub async fn serve(listener: TcpListener, backend: Backend) -> Result<()> {
    let addr = listener.local_addr().map_err(LostFoundError::Io)?;
    info!("Lost & found API started on http://{}", addr);

    let backend = Arc::new(backend);
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                let io = TokioIo::new(stream);
                let backend = backend.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let backend = backend.clone();
                        async move { Ok::<_, Infallible>(handle(req, backend).await) }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                        // Ignore client-disconnect errors (normal for SSE)
                        if !e.is_incomplete_message() {
                            error!("API connection error: {:?}", e);
                        }
                    }
                });
            }
            Err(e) => error!("API accept error: {}", e),
        }
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub async fn handle<B>(req: Request<B>, backend: Arc<Backend>) -> Resp
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    debug!("{} {}", method, path);

    // CORS preflight
    if method == Method::OPTIONS {
        return cors_headers(Response::builder())
            .status(StatusCode::NO_CONTENT)
            .body(Full::new(bytes::Bytes::new()).boxed())
            .unwrap_or_else(|_| Response::new(Full::new(bytes::Bytes::new()).boxed()));
    }

    let viewer = viewer_id(&req);

    match (method.clone(), path.as_str()) {
        (Method::GET, "/api/status") => get_status(),
        (Method::GET, "/api/posts") => get_posts(&query, &backend).await,
        (Method::POST, "/api/posts") => post_create(req, viewer, &backend).await,
        (Method::PUT, "/api/profile") => put_profile(req, viewer, &backend).await,
        (Method::GET, "/api/conversations") => get_conversations(viewer, &backend).await,
        (Method::POST, "/api/messages") => post_message(req, viewer, &backend).await,
        (Method::GET, "/events") => get_sse(&query, &backend),
        _ => {
            // Dynamic segments
            if method == Method::DELETE && path.starts_with("/api/posts/") {
                let id = path.trim_start_matches("/api/posts/").to_string();
                return delete_post(&id, viewer, &backend).await;
            }
            if method == Method::GET && path.starts_with("/api/profile/") {
                let id = path.trim_start_matches("/api/profile/").to_string();
                return get_profile(&id, &backend);
            }
            if method == Method::DELETE && path.starts_with("/api/conversations/") {
                let rest = path.trim_start_matches("/api/conversations/").to_string();
                return delete_conversation(&rest, viewer, &backend).await;
            }
            json_err(StatusCode::NOT_FOUND, "not found")
        }
    }
}

fn viewer_id<B>(req: &Request<B>) -> Result<UserId> {
    let raw = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| LostFoundError::Unauthorized("missing X-User-Id header".to_string()))?;
    UserId::new(raw).map_err(|_| LostFoundError::Unauthorized("empty X-User-Id header".to_string()))
}

fn viewer_profile(viewer: Result<UserId>, backend: &Backend) -> Result<Profile> {
    let id = viewer?;
    backend.profiles.get(&id)?.ok_or_else(|| {
        LostFoundError::Unauthorized(format!("no profile for {}; PUT /api/profile first", id))
    })
}

// ─── Handlers ────────────────────────────────────────────────────────────────

fn get_status() -> Resp {
    json_ok(serde_json::json!({
        "service": "lostfound",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn get_posts(query: &str, backend: &Backend) -> Resp {
    let filter = match parse_filter(query) {
        Ok(f) => f,
        Err(e) => return error_resp(&e),
    };
    match backend.posts.list_posts().await {
        Ok(posts) => {
            let visible = filter.apply(&posts);
            json_ok(serde_json::json!({ "posts": visible }))
        }
        Err(e) => error_resp(&e),
    }
}

async fn post_create<B>(req: Request<B>, viewer: Result<UserId>, backend: &Backend) -> Resp
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let owner = match viewer_profile(viewer, backend) {
        Ok(p) => p,
        Err(e) => return error_resp(&e),
    };
    let new: NewPost = match read_json(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match backend.posts.create_post(&owner, new).await {
        Ok(post) => json_ok(serde_json::json!({ "post": post })),
        Err(e) => error_resp(&e),
    }
}

async fn delete_post(id: &str, viewer: Result<UserId>, backend: &Backend) -> Resp {
    match try_delete_post(id, viewer, backend).await {
        Ok(()) => json_ok(serde_json::json!({ "deleted": true })),
        Err(e) => error_resp(&e),
    }
}

async fn try_delete_post(id: &str, viewer: Result<UserId>, backend: &Backend) -> Result<()> {
    let viewer = viewer?;
    let id: PostId = id.parse()?;
    backend.posts.delete_post(&viewer, id).await
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    name: String,
    #[serde(default)]
    email: String,
    avatar_url: Option<String>,
}

async fn put_profile<B>(req: Request<B>, viewer: Result<UserId>, backend: &Backend) -> Resp
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let id = match viewer {
        Ok(id) => id,
        Err(e) => return error_resp(&e),
    };
    let r: UpdateProfileRequest = match read_json(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    if r.name.trim().is_empty() {
        return json_err(StatusCode::BAD_REQUEST, "name must not be empty");
    }

    let joined_at = match backend.profiles.get(&id) {
        Ok(existing) => existing.map(|p| p.joined_at).unwrap_or_else(Utc::now),
        Err(e) => return error_resp(&e),
    };
    let profile = Profile {
        avatar_url: r
            .avatar_url
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| default_avatar_url(&r.name)),
        id,
        name: r.name,
        email: r.email,
        joined_at,
    };
    match backend.profiles.upsert(&profile) {
        Ok(()) => json_ok(serde_json::json!({ "profile": profile })),
        Err(e) => error_resp(&e),
    }
}

fn get_profile(id: &str, backend: &Backend) -> Resp {
    let id = match UserId::new(decode(id)) {
        Ok(id) => id,
        Err(e) => return error_resp(&e),
    };
    match backend.profiles.get(&id) {
        Ok(Some(p)) => json_ok(serde_json::json!({ "profile": p })),
        Ok(None) => json_err(StatusCode::NOT_FOUND, "profile not found"),
        Err(e) => error_resp(&e),
    }
}

async fn get_conversations(viewer: Result<UserId>, backend: &Backend) -> Resp {
    let viewer = match viewer {
        Ok(v) => v,
        Err(e) => return error_resp(&e),
    };
    match backend.chat.conversations(&viewer).await {
        Ok(convs) => json_ok(serde_json::json!({ "conversations": convs })),
        Err(e) => error_resp(&e),
    }
}

async fn delete_conversation(rest: &str, viewer: Result<UserId>, backend: &Backend) -> Resp {
    match try_delete_conversation(rest, viewer, backend).await {
        Ok(removed) => json_ok(serde_json::json!({ "removed": removed })),
        Err(e) => error_resp(&e),
    }
}

async fn try_delete_conversation(
    rest: &str,
    viewer: Result<UserId>,
    backend: &Backend,
) -> Result<usize> {
    let viewer = viewer?;
    let (post, counterpart) = rest.split_once('/').ok_or_else(|| {
        LostFoundError::InvalidArgument(
            "expected /api/conversations/:post_id/:counterpart_id".to_string(),
        )
    })?;
    let post_id: PostId = post.parse()?;
    let counterpart = UserId::new(decode(counterpart))?;
    backend
        .chat
        .delete_conversation(&viewer, &counterpart, post_id)
        .await
}

#[derive(Deserialize)]
struct SendRequest {
    to: UserId,
    post_id: PostId,
    text: String,
}

async fn post_message<B>(req: Request<B>, viewer: Result<UserId>, backend: &Backend) -> Resp
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let sender = match viewer_profile(viewer, backend) {
        Ok(p) => p,
        Err(e) => return error_resp(&e),
    };
    let r: SendRequest = match read_json(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match backend
        .chat
        .send_message(&sender, &r.to, r.post_id, &r.text)
        .await
    {
        Ok(message) => json_ok(serde_json::json!({ "message": message })),
        Err(e) => error_resp(&e),
    }
}

fn get_sse(query: &str, backend: &Backend) -> Resp {
    let user = match query_param(query, "user").map(UserId::new) {
        Some(Ok(u)) => u,
        _ => return json_err(StatusCode::BAD_REQUEST, "missing user parameter"),
    };
    sse_resp(backend.chat.events(), user)
}

// ─── Utilities ────────────────────────────────────────────────────────────────

async fn read_json<T, B>(req: Request<B>) -> std::result::Result<T, Resp>
where
    T: serde::de::DeserializeOwned,
    B: Body,
    B::Error: std::fmt::Display,
{
    let body = req
        .into_body()
        .collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| json_err(StatusCode::BAD_REQUEST, &format!("body read error: {}", e)))?;
    serde_json::from_slice(&body)
        .map_err(|e| json_err(StatusCode::BAD_REQUEST, &format!("invalid JSON: {}", e)))
}

/// Percent-decoding only; `+` stays literal in path segments
fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn query_param(query: &str, key: &str) -> Option<String> {
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == key {
                return Some(decode(&v.replace('+', " ")));
            }
        }
    }
    None
}

fn parse_filter(query: &str) -> Result<PostFilter> {
    let category = match query_param(query, "category").filter(|c| !c.is_empty() && c != "ALL") {
        Some(c) => Some(c.parse::<Category>().map_err(LostFoundError::InvalidArgument)?),
        None => None,
    };
    let post_type = match query_param(query, "type").filter(|t| !t.is_empty() && t != "ALL") {
        Some(t) => Some(t.parse::<PostType>().map_err(LostFoundError::InvalidArgument)?),
        None => None,
    };
    Ok(PostFilter {
        query: query_param(query, "q"),
        category,
        post_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_decodes_values() {
        assert_eq!(
            query_param("q=blue+wallet&type=LOST", "q").as_deref(),
            Some("blue wallet")
        );
        assert_eq!(query_param("q=caf%C3%A9", "q").as_deref(), Some("café"));
        assert_eq!(query_param("a=1", "q"), None);
    }

    #[test]
    fn test_path_segments_keep_plus() {
        assert_eq!(decode("anna+bo"), "anna+bo");
        assert_eq!(decode("anna%20bo"), "anna bo");
        assert_eq!(query_param("user=anna+bo", "user").as_deref(), Some("anna bo"));
    }

    #[test]
    fn test_parse_filter() {
        let f = parse_filter("q=keys&category=keys_cards&type=found").unwrap();
        assert_eq!(f.query.as_deref(), Some("keys"));
        assert_eq!(f.category, Some(Category::KeysCards));
        assert_eq!(f.post_type, Some(PostType::Found));

        let all = parse_filter("category=ALL&type=ALL").unwrap();
        assert_eq!(all, PostFilter::default());

        assert!(parse_filter("category=furniture").is_err());
    }
}
