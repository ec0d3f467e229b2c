//! Streamable HTTP transport.
//!
//! One endpoint (`/mcp`, also reachable as `/mcp/`) carries every JSON-RPC
//! message:
//! - `POST` delivers a single client message. Requests are answered with
//!   either `application/json` or a one-event `text/event-stream` body;
//!   notifications and client responses get `202 Accepted`.
//! - `DELETE` terminates the session named by `Mcp-Session-Id`.
//! - `GET` would open a server-initiated stream, which this server does not
//!   offer, so it answers `405`.

use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer,
    dev::Server,
    http::{StatusCode, header},
    middleware::{Compress, DefaultHeaders, Logger},
    web,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::ServerConfig;
use crate::core::server::{
    self, AppState, Incoming, MCPError, MCPResponse, SUPPORTED_PROTOCOL_VERSIONS, ToolRegistry,
    error_codes,
};
use crate::core::session::{ClientInfo, SessionStore};

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
pub const MCP_PATHS: [&str; 2] = ["/mcp", "/mcp/"];

/// State shared by every HTTP worker.
#[derive(Clone)]
pub struct HttpState {
    pub app: AppState,
    pub registry: Arc<ToolRegistry>,
    pub sessions: SessionStore,
    /// Never answer with SSE, even when the client accepts it.
    pub json_response: bool,
}

impl HttpState {
    pub fn new(app: AppState, registry: Arc<ToolRegistry>, json_response: bool) -> Self {
        Self {
            app,
            registry,
            sessions: SessionStore::new(),
            json_response,
        }
    }

    /// Replace the session table, e.g. to set its idle timeout.
    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = sessions;
        self
    }
}

/// Register the MCP endpoint routes.
///
/// Used by the real server and by tests through `App::configure`.
pub fn mcp_routes(cfg: &mut web::ServiceConfig) {
    for path in MCP_PATHS {
        cfg.service(
            web::resource(path)
                .route(web::post().to(handle_post))
                .route(web::delete().to(handle_delete))
                .route(web::get().to(handle_get)),
        );
    }
}

/// Error replies outside JSON-RPC dispatch still carry a JSON-RPC body so
/// clients can surface the message.
fn http_error(status: StatusCode, code: i32, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(MCPResponse::failure(None, MCPError::new(code, message)))
}

fn header_str<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Media ranges from the Accept header, lowercased, parameters stripped.
fn accepted_types(req: &HttpRequest) -> Option<Vec<String>> {
    let accept = header_str(req, header::ACCEPT.as_str())?;
    Some(
        accept
            .split(',')
            .filter_map(|range| range.split(';').next())
            .map(|media| media.trim().to_ascii_lowercase())
            .filter(|media| !media.is_empty())
            .collect(),
    )
}

/// A missing Accept header accepts anything.
fn accept_allows_response(req: &HttpRequest) -> bool {
    match accepted_types(req) {
        None => true,
        Some(types) => types.iter().any(|t| {
            matches!(
                t.as_str(),
                "application/json" | "application/*" | "text/event-stream" | "text/*" | "*/*"
            )
        }),
    }
}

fn client_wants_sse(req: &HttpRequest) -> bool {
    accepted_types(req)
        .map(|types| types.iter().any(|t| t == "text/event-stream"))
        .unwrap_or(false)
}

fn is_json_content(req: &HttpRequest) -> bool {
    header_str(req, header::CONTENT_TYPE.as_str())
        .and_then(|ct| ct.split(';').next())
        .map(|media| media.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Format one response as a Server-Sent Events body: "event: message\ndata: {json}\n\n".
pub fn sse_event(response: &MCPResponse) -> String {
    let json = serde_json::to_string(response).unwrap_or_else(|_| "{}".to_string());
    format!("event: message\ndata: {}\n\n", json)
}

fn reply(response: &MCPResponse, sse: bool, session_id: Option<&str>) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    if let Some(id) = session_id {
        builder.insert_header((SESSION_HEADER, id));
    }
    if sse {
        builder
            .content_type("text/event-stream")
            // Disable caching so intermediaries never replay a response
            .insert_header(header::CacheControl(vec![
                header::CacheDirective::NoCache,
                header::CacheDirective::NoStore,
                header::CacheDirective::MustRevalidate,
            ]))
            // Disable nginx buffering
            .insert_header(("x-accel-buffering", "no"))
            .body(sse_event(response))
    } else {
        builder.json(response)
    }
}

/// Handle a POSTed JSON-RPC message.
async fn handle_post(req: HttpRequest, body: web::Bytes, state: web::Data<HttpState>) -> HttpResponse {
    if !accept_allows_response(&req) {
        return http_error(
            StatusCode::NOT_ACCEPTABLE,
            error_codes::INVALID_REQUEST,
            "Not Acceptable: client must accept application/json or text/event-stream",
        );
    }
    if !is_json_content(&req) {
        return http_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            error_codes::INVALID_REQUEST,
            "Unsupported Media Type: Content-Type must be application/json",
        );
    }

    let message = match server::parse_message(&body) {
        Ok(message) => message,
        Err(response) => {
            tracing::debug!(error = ?response.error, "rejecting malformed message");
            return HttpResponse::BadRequest().json(response);
        }
    };

    let sse = !state.json_response && client_wants_sse(&req);

    // initialize is the only message allowed without a session.
    if let Incoming::Request(request) = &message {
        if request.method == "initialize" {
            let Some(response) = server::dispatch(&state.app, &state.registry, request) else {
                return HttpResponse::Accepted().finish();
            };
            if !response.is_success() {
                return reply(&response, sse, None);
            }
            let version = response
                .result
                .as_ref()
                .and_then(|r| r.get("protocolVersion"))
                .and_then(|v| v.as_str())
                .unwrap_or(server::LATEST_PROTOCOL_VERSION)
                .to_string();
            let client = ClientInfo::from_initialize_params(request.params.as_ref());
            let session_id = state.sessions.create(&version, client.clone());
            tracing::info!(
                session = %session_id,
                protocol_version = %version,
                client = ?client.map(|c| c.name),
                "session opened"
            );
            return reply(&response, sse, Some(&session_id));
        }
    }

    if let Err(rejection) = check_session(&req, &state) {
        return rejection;
    }

    match message {
        Incoming::Request(request) => match server::dispatch(&state.app, &state.registry, &request) {
            Some(response) => reply(&response, sse, None),
            None => HttpResponse::Accepted().finish(),
        },
        Incoming::Notification(notification) => {
            tracing::debug!(method = %notification.method, "notification accepted");
            HttpResponse::Accepted().finish()
        }
        Incoming::Response(_) => HttpResponse::Accepted().finish(),
    }
}

/// Session and protocol-version headers required after initialization.
fn check_session(req: &HttpRequest, state: &HttpState) -> Result<(), HttpResponse> {
    let Some(session_id) = header_str(req, SESSION_HEADER) else {
        return Err(http_error(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_REQUEST,
            "Bad Request: Missing session ID",
        ));
    };
    if !state.sessions.touch(session_id) {
        return Err(http_error(
            StatusCode::NOT_FOUND,
            error_codes::INVALID_REQUEST,
            "Session not found",
        ));
    }
    if let Some(version) = header_str(req, PROTOCOL_VERSION_HEADER) {
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&version) {
            return Err(http_error(
                StatusCode::BAD_REQUEST,
                error_codes::INVALID_REQUEST,
                &format!("Bad Request: Unsupported protocol version: {}", version),
            ));
        }
    }
    Ok(())
}

/// Terminate a session.
async fn handle_delete(req: HttpRequest, state: web::Data<HttpState>) -> HttpResponse {
    let Some(session_id) = header_str(&req, SESSION_HEADER) else {
        return http_error(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_REQUEST,
            "Bad Request: Missing session ID",
        );
    };
    if state.sessions.remove(session_id) {
        tracing::info!(session = %session_id, "session closed");
        HttpResponse::Ok().finish()
    } else {
        http_error(StatusCode::NOT_FOUND, error_codes::INVALID_REQUEST, "Session not found")
    }
}

async fn handle_get() -> HttpResponse {
    HttpResponse::MethodNotAllowed()
        .insert_header((header::ALLOW, "POST, DELETE"))
        .json(MCPResponse::failure(
            None,
            MCPError::new(error_codes::INVALID_REQUEST, "Method Not Allowed: server-initiated streams are not offered"),
        ))
}

/// Build and bind the HTTP server without starting it.
///
/// Returns the server future and the addresses it is bound to, so callers
/// binding port 0 can learn the real port.
pub fn bind_http(
    state: HttpState,
    bind_addr: &str,
    workers: usize,
) -> std::io::Result<(Server, Vec<SocketAddr>)> {
    let data = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            // Enable compression for JSON responses (gzip/brotli)
            .wrap(Compress::default())
            // Add security headers to all responses
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY")),
            )
            // Format: %r = request line, %s = status, %Dms = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(mcp_routes)
    })
    .workers(workers)
    // Connection limits for high-traffic scenarios
    .max_connections(10000)
    .max_connection_rate(1000)
    // Timeout configurations to prevent resource exhaustion
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .bind(bind_addr)?;

    let addrs = server.addrs();
    Ok((server.run(), addrs))
}

/// Run the MCP server in HTTP mode until the process is terminated.
pub async fn run_server_http(config: &ServerConfig) -> std::io::Result<()> {
    let state = HttpState::new(config.app_state(), server::initialize_tools(), config.json_response)
        .with_sessions(SessionStore::with_idle_timeout(config.session_idle_timeout()));
    let workers = config.worker_count();
    let tools: Vec<String> = state.registry.tools().iter().map(|t| t.name.clone()).collect();
    let session_idle_secs = state.sessions.idle_timeout().as_secs();

    let (server, addrs) = bind_http(state, &config.bind_addr(), workers)?;

    tracing::info!(
        name = %config.name,
        version = %config.server_version,
        addrs = ?addrs,
        workers,
        tools = ?tools,
        json_response = config.json_response,
        session_idle_secs,
        "MCP server listening (streamable HTTP at /mcp/)"
    );

    server.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use serde_json::{Value, json};

    fn state(json_response: bool) -> HttpState {
        let app = AppState {
            server_name: "test".to_string(),
            server_version: "0.0.0".to_string(),
            instructions: None,
        };
        HttpState::new(app, server::initialize_tools(), json_response)
    }

    fn initialize_body() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": { "name": "unit", "version": "1" }
            }
        })
    }

    #[actix_rt::test]
    async fn initialize_opens_session() {
        let http_state = state(true);
        let sessions = http_state.sessions.clone();
        let app = test::init_service(App::new().app_data(web::Data::new(http_state)).configure(mcp_routes)).await;

        let req = test::TestRequest::post()
            .uri("/mcp/")
            .insert_header((header::ACCEPT, "application/json, text/event-stream"))
            .set_json(initialize_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let session_id = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap();
        assert!(sessions.contains(&session_id));
        assert_eq!(sessions.get(&session_id).unwrap().client.unwrap().name, "unit");

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["result"]["protocolVersion"], "2025-06-18");
    }

    #[actix_rt::test]
    async fn sse_framing_when_accepted() {
        let app = test::init_service(App::new().app_data(web::Data::new(state(false))).configure(mcp_routes)).await;
        let req = test::TestRequest::post()
            .uri("/mcp")
            .insert_header((header::ACCEPT, "application/json, text/event-stream"))
            .set_json(initialize_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap(),
            "text/event-stream"
        );
        let body = test::read_body(resp).await;
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.starts_with("event: message\ndata: {"));
        assert!(text.ends_with("\n\n"));
    }

    #[actix_rt::test]
    async fn requests_without_session_are_rejected() {
        let app = test::init_service(App::new().app_data(web::Data::new(state(true))).configure(mcp_routes)).await;

        let list = json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" });
        let req = test::TestRequest::post().uri("/mcp/").set_json(&list).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/mcp/")
            .insert_header((SESSION_HEADER, "deadbeef"))
            .set_json(&list)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn session_lifecycle() {
        let http_state = state(true);
        let sessions = http_state.sessions.clone();
        let session_id = sessions.create("2025-06-18", None);
        let app = test::init_service(App::new().app_data(web::Data::new(http_state)).configure(mcp_routes)).await;

        let note = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        let req = test::TestRequest::post()
            .uri("/mcp/")
            .insert_header((SESSION_HEADER, session_id.as_str()))
            .set_json(&note)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);

        let call = json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": { "name": "add_numbers", "arguments": { "a": -5, "b": 5 } }
        });
        let req = test::TestRequest::post()
            .uri("/mcp/")
            .insert_header((SESSION_HEADER, session_id.as_str()))
            .insert_header((PROTOCOL_VERSION_HEADER, "2025-06-18"))
            .set_json(&call)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["id"], 3);
        assert_eq!(body["result"]["structuredContent"]["result"], 0.0);

        let req = test::TestRequest::delete()
            .uri("/mcp/")
            .insert_header((SESSION_HEADER, session_id.as_str()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert!(!sessions.contains(&session_id));

        let req = test::TestRequest::delete()
            .uri("/mcp/")
            .insert_header((SESSION_HEADER, session_id.as_str()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn client_response_is_accepted() {
        let http_state = state(true);
        let session_id = http_state.sessions.create("2025-06-18", None);
        let app = test::init_service(App::new().app_data(web::Data::new(http_state)).configure(mcp_routes)).await;

        let req = test::TestRequest::post()
            .uri("/mcp/")
            .insert_header((SESSION_HEADER, session_id.as_str()))
            .set_json(json!({ "jsonrpc": "2.0", "id": 1, "result": {} }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(test::read_body(resp).await.is_empty());
    }

    #[actix_rt::test]
    async fn delete_without_session_header_is_bad_request() {
        let http_state = state(true);
        let sessions = http_state.sessions.clone();
        let session_id = sessions.create("2025-06-18", None);
        let app = test::init_service(App::new().app_data(web::Data::new(http_state)).configure(mcp_routes)).await;

        let req = test::TestRequest::delete().uri("/mcp/").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        assert!(sessions.contains(&session_id));
    }

    #[actix_rt::test]
    async fn idle_session_is_not_found() {
        let sessions = SessionStore::with_idle_timeout(Duration::from_millis(20));
        let http_state = state(true).with_sessions(sessions.clone());
        let session_id = sessions.create("2025-06-18", None);
        let app = test::init_service(App::new().app_data(web::Data::new(http_state)).configure(mcp_routes)).await;

        actix_rt::time::sleep(Duration::from_millis(40)).await;
        let req = test::TestRequest::post()
            .uri("/mcp/")
            .insert_header((SESSION_HEADER, session_id.as_str()))
            .set_json(json!({ "jsonrpc": "2.0", "id": 5, "method": "ping" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
        assert!(sessions.is_empty());
    }

    #[actix_rt::test]
    async fn unsupported_protocol_header_is_rejected() {
        let http_state = state(true);
        let session_id = http_state.sessions.create("2025-06-18", None);
        let app = test::init_service(App::new().app_data(web::Data::new(http_state)).configure(mcp_routes)).await;

        let req = test::TestRequest::post()
            .uri("/mcp/")
            .insert_header((SESSION_HEADER, session_id.as_str()))
            .insert_header((PROTOCOL_VERSION_HEADER, "1999-01-01"))
            .set_json(json!({ "jsonrpc": "2.0", "id": 4, "method": "ping" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn header_checks() {
        let app = test::init_service(App::new().app_data(web::Data::new(state(true))).configure(mcp_routes)).await;

        let req = test::TestRequest::post()
            .uri("/mcp/")
            .insert_header((header::CONTENT_TYPE, "text/plain"))
            .set_payload(initialize_body().to_string())
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );

        let req = test::TestRequest::post()
            .uri("/mcp/")
            .insert_header((header::ACCEPT, "text/html"))
            .set_json(initialize_body())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_ACCEPTABLE);

        let req = test::TestRequest::post()
            .uri("/mcp/")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], error_codes::PARSE_ERROR);

        let req = test::TestRequest::get().uri("/mcp/").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
