//! Minimal HTTP surface.
//!
//! One accept loop on a plain `TcpListener`, one request per connection,
//! JSON bodies. Read endpoints (`/images`, `/show`, `/show-labeled`) sit
//! behind the bearer-credential gate; `/upload` is gated only when the
//! deployment opts in. Each core failure maps to a stable status so
//! clients can tell non-retryable rejections from server-side faults.

use anyhow::{anyhow, Result};
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::auth::{AccessGate, CredentialIssuer, DEFAULT_TOKEN_VALIDITY};
use crate::error::{AuthError, FetchError, GateError, IngestError, IssueError};
use crate::media::MediaStore;
use crate::pipeline::IngestionPipeline;
use crate::storage::RecordStore;
use crate::{format_civil, is_valid_device_id, ImageRecordView};

const MAX_HEADER_BYTES: usize = 8 * 1024;
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Greeting of the reference deployment, kept verbatim.
const GREETING: &str = r#"{"message":"Hallo Selamat Datang di API IoT Iteba"}"#;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Gate the upload path too. The reference behavior trusts the device
    /// network and leaves uploads open; this is a policy knob, not a given.
    pub require_upload_token: bool,
    pub default_token_validity: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8640".to_string(),
            require_upload_token: false,
            default_token_validity: DEFAULT_TOKEN_VALIDITY,
        }
    }
}

/// Everything the request handlers need, constructor-injected so tests can
/// swap stores and models freely.
pub struct ApiServices {
    pub pipeline: IngestionPipeline,
    pub gate: AccessGate,
    pub issuer: CredentialIssuer,
    pub records: Box<dyn RecordStore>,
    pub media: MediaStore,
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    services: ApiServices,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, services: ApiServices) -> Self {
        Self { cfg, services }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let mut services = self.services;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, &cfg, &mut services, shutdown_thread) {
                log::error!("api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: &ApiConfig,
    services: &mut ApiServices,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, cfg, services) {
                    log::warn!("api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    services: &mut ApiServices,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => write_json_response(&mut stream, 200, GREETING),
        ("GET", "/health") => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        ("POST", "/upload") => handle_upload(&mut stream, &request, cfg, services),
        ("GET", "/images") => handle_list_images(&mut stream, &request, services),
        ("GET", "/show") => handle_show(&mut stream, &request, services, Root::Original),
        ("GET", "/show-labeled") => handle_show(&mut stream, &request, services, Root::Labeled),
        ("POST", "/token") => handle_issue_token(&mut stream, &request, cfg, services),
        (_, "/" | "/health" | "/images" | "/show" | "/show-labeled" | "/upload" | "/token") => {
            write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

// -------------------- Handlers --------------------

fn handle_upload(
    stream: &mut TcpStream,
    request: &HttpRequest,
    cfg: &ApiConfig,
    services: &mut ApiServices,
) -> Result<()> {
    if cfg.require_upload_token {
        if let Err((status, body)) = authorize(request, &services.gate) {
            return write_json_response(stream, status, &body);
        }
    }

    let Some(device_id) = request.header("x-device-id") else {
        return write_json_response(stream, 400, r#"{"error":"missing_device_id"}"#);
    };
    if !is_valid_device_id(device_id) {
        return write_json_response(stream, 400, r#"{"error":"invalid_device_id"}"#);
    }
    if request.body.is_empty() {
        return write_json_response(stream, 400, r#"{"error":"empty_body"}"#);
    }

    match services.pipeline.ingest(&request.body, device_id) {
        Ok(result) => {
            let payload = serde_json::to_vec(&result)?;
            write_response(stream, 200, "application/json", &payload)
        }
        Err(IngestError::Decode(e)) => {
            log::warn!("upload from {device_id} rejected: {e}");
            write_json_response(stream, 400, r#"{"error":"invalid_image"}"#)
        }
        Err(e @ IngestError::UnknownClass(_)) => {
            log::error!("ingestion failed for {device_id}: {e}");
            write_json_response(stream, 500, r#"{"error":"unknown_class"}"#)
        }
        Err(e) => {
            log::error!("ingestion failed for {device_id}: {e}");
            write_json_response(stream, 500, r#"{"error":"ingestion_failed"}"#)
        }
    }
}

fn handle_list_images(
    stream: &mut TcpStream,
    request: &HttpRequest,
    services: &mut ApiServices,
) -> Result<()> {
    if let Err((status, body)) = authorize(request, &services.gate) {
        return write_json_response(stream, status, &body);
    }
    match services.records.list_records() {
        Ok(records) => {
            let views: Vec<ImageRecordView> = records.iter().map(|r| r.view()).collect();
            let payload = serde_json::to_vec(&views)?;
            write_response(stream, 200, "application/json", &payload)
        }
        Err(e) => {
            log::error!("listing records failed: {e}");
            write_json_response(stream, 500, r#"{"error":"listing_failed"}"#)
        }
    }
}

enum Root {
    Original,
    Labeled,
}

fn handle_show(
    stream: &mut TcpStream,
    request: &HttpRequest,
    services: &mut ApiServices,
    root: Root,
) -> Result<()> {
    if let Err((status, body)) = authorize(request, &services.gate) {
        return write_json_response(stream, status, &body);
    }
    let Some(filename) = request.query_param("filename") else {
        return write_json_response(stream, 400, r#"{"error":"missing_filename"}"#);
    };
    let fetched = match root {
        Root::Original => services.media.fetch_original(&filename),
        Root::Labeled => services.media.fetch_labeled(&filename),
    };
    match fetched {
        Ok(bytes) => write_response(stream, 200, content_type_for(&filename), &bytes),
        Err(FetchError::NotFound(_)) => {
            write_json_response(stream, 404, r#"{"error":"file_not_found"}"#)
        }
        Err(FetchError::Io(e)) => {
            log::error!("reading stored file '{filename}' failed: {e}");
            write_json_response(stream, 500, r#"{"error":"read_failed"}"#)
        }
    }
}

fn handle_issue_token(
    stream: &mut TcpStream,
    request: &HttpRequest,
    cfg: &ApiConfig,
    services: &mut ApiServices,
) -> Result<()> {
    let validity = match request.query_param("validity_secs") {
        Some(raw) => match raw.parse::<i64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs as u64),
            _ => {
                return write_json_response(stream, 400, r#"{"error":"invalid_validity"}"#);
            }
        },
        None => cfg.default_token_validity,
    };
    match services.issuer.issue(validity) {
        Ok(credential) => {
            let payload = serde_json::to_vec(&json!({
                "token": credential.token,
                "issued_at": format_civil(credential.issued_at_ms),
                "expires_at": format_civil(credential.expires_at_ms),
            }))?;
            write_response(stream, 200, "application/json", &payload)
        }
        Err(IssueError::InvalidValidity) => {
            write_json_response(stream, 400, r#"{"error":"invalid_validity"}"#)
        }
        Err(e) => {
            log::error!("issuing credential failed: {e}");
            write_json_response(stream, 500, r#"{"error":"issuance_failed"}"#)
        }
    }
}

/// Maps gate outcomes to `(status, body)` rejections. Tokens travel in the
/// Authorization header only; a token query parameter would end up in
/// request logs, so it is rejected outright.
fn authorize(request: &HttpRequest, gate: &AccessGate) -> Result<(), (u16, String)> {
    if request.has_query_token() {
        return Err((
            400,
            r#"{"error":"token_query_param_not_allowed"}"#.to_string(),
        ));
    }
    let Some(token) = request.bearer_token() else {
        return Err((401, r#"{"error":"missing_token"}"#.to_string()));
    };
    match gate.authorize(&token) {
        Ok(_) => Ok(()),
        Err(GateError::Auth(AuthError::InvalidCredential)) => {
            Err((401, r#"{"error":"invalid_token"}"#.to_string()))
        }
        Err(GateError::Auth(AuthError::Expired)) => {
            Err((401, r#"{"error":"token_expired"}"#.to_string()))
        }
        Err(e) => {
            log::error!("credential lookup failed: {e}");
            Err((500, r#"{"error":"auth_failed"}"#.to_string()))
        }
    }
}

fn content_type_for(filename: &str) -> &'static str {
    if filename.ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

// -------------------- HTTP plumbing --------------------

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request header too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before header end"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let header_text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| anyhow!("missing method"))?
        .to_string();
    let raw_path = parts
        .next()
        .ok_or_else(|| anyhow!("missing path"))?
        .to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .map(|v| v.parse())
        .transpose()
        .map_err(|_| anyhow!("invalid content-length"))?
        .unwrap_or(0);
    if content_length > MAX_UPLOAD_BYTES {
        return Err(anyhow!("request body too large"));
    }

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before body end"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path
        .split('?')
        .next()
        .unwrap_or(&raw_path)
        .trim_end_matches('/')
        .to_string();
    let path = if path.is_empty() { "/".to_string() } else { path };

    Ok(HttpRequest {
        method,
        path,
        raw_path,
        headers,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        401 => "HTTP/1.1 401 Unauthorized",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    raw_path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn bearer_token(&self) -> Option<String> {
        let value = self.headers.get("authorization")?;
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() == 2 && parts[0].eq_ignore_ascii_case("bearer") {
            return Some(parts[1].to_string());
        }
        None
    }

    fn query_param(&self, key: &str) -> Option<String> {
        let query = self.raw_path.split('?').nth(1)?;
        for pair in query.split('&') {
            if let Some((k, v)) = pair.split_once('=') {
                if k == key {
                    return Some(v.to_string());
                }
            }
        }
        None
    }

    fn has_query_token(&self) -> bool {
        self.query_param("token").is_some()
    }
}
