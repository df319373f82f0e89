//! Inbound HTTP surface: a single `POST /api/recommendations/batch` endpoint
//! that runs a batch synchronously and always responds 200 with a populated
//! result list, except for the input-validation and auth failures called
//! out below.

use std::io::Read as _;

use tiny_http::{Method, Response, Server};

use crate::config::Config;
use crate::orchestrator;
use crate::types::{BatchRequest, ErrorCode};
use crate::usage;

fn parse_batch_body(request: &mut tiny_http::Request) -> Result<BatchRequest, String> {
    let mut body = String::new();
    request
        .as_reader()
        .read_to_string(&mut body)
        .map_err(|e| format!("read body: {e}"))?;
    let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| format!("json: {e}"))?;

    if value.get("run_id").and_then(|v| v.as_str()).is_none() {
        return Err("missing run_id".to_string());
    }
    match value.get("cams") {
        Some(serde_json::Value::Array(_)) => {}
        Some(_) => return Err("cams must be a list".to_string()),
        None => return Err("missing cams".to_string()),
    }

    serde_json::from_value(value).map_err(|e| format!("invalid batch request: {e}"))
}

fn requires_session_cookie(request: &tiny_http::Request, config: &Config) -> bool {
    if config.mode != crate::config::Mode::Cloud {
        return false;
    }
    !request.headers().iter().any(|h| h.field.equiv("Cookie"))
}

fn respond_json(request: tiny_http::Request, status: u16, body: &serde_json::Value) {
    let text = body.to_string();
    let response = Response::from_string(text)
        .with_status_code(status)
        .with_header(
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
        );
    let _ = request.respond(response);
}

/// Runs the HTTP server, blocking on `server.incoming_requests()` exactly
/// the way the teacher's webhook bridges do. Every non-POST request is
/// answered with a bare "ok"; POST requests are validated, authenticated
/// (cloud mode only), run through the orchestrator, and reported on.
pub(crate) fn run_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::http(&config.bind_addr)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("server: {e}")))?;
    eprintln!("[server] listening on http://{}", config.bind_addr);

    for mut request in server.incoming_requests() {
        if *request.method() != Method::Post {
            let response = Response::from_string("ok");
            let _ = request.respond(response);
            continue;
        }
        if request.url() != "/api/recommendations/batch" {
            let response = Response::from_string("not found").with_status_code(404);
            let _ = request.respond(response);
            continue;
        }

        if requires_session_cookie(&request, config) {
            respond_json(request, 401, &serde_json::json!({"error": "missing session cookie"}));
            continue;
        }

        let batch_request = match parse_batch_body(&mut request) {
            Ok(req) => req,
            Err(err) => {
                eprintln!("[server] rejected batch request: {err}");
                respond_json(request, 400, &serde_json::json!({"error": err}));
                continue;
            }
        };

        match orchestrator::run_batch(config, &batch_request) {
            Ok(response) => {
                usage::write_manifest(config, &response.run_id, &response.results, &response.usage);
                let body = serde_json::to_value(&response).unwrap_or_else(|_| serde_json::json!({}));
                respond_json(request, 200, &body);
            }
            Err(ErrorCode::InvalidInput) => {
                respond_json(request, 400, &serde_json::json!({"error": "batch too large"}));
            }
            Err(code) => {
                respond_json(request, 500, &serde_json::json!({"error": code.as_str()}));
            }
        }
    }
    Ok(())
}
