//! C4 Model Client: streaming call to the generative model with
//! quota-aware exponential backoff. Usage is collected from the terminal
//! chunk of the stream and retained even when the call ultimately fails.

use std::io::{BufRead, BufReader};
use std::thread;
use std::time::Duration;

use crate::types::Usage;
use crate::util::jitter_ratio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModelErrorType {
    ApiError,
    StreamError,
    GenerationError,
}

impl ModelErrorType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::ApiError => "APIError",
            Self::StreamError => "StreamError",
            Self::GenerationError => "GenerationError",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ModelRequest<'a> {
    pub(crate) prompt: &'a str,
    pub(crate) model_name: &'a str,
    pub(crate) temperature: f64,
    pub(crate) top_p: f64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ModelResponse {
    pub(crate) text: String,
    pub(crate) usage: Usage,
    pub(crate) error_type: Option<&'static str>,
}

/// Benchmark mode forces deterministic generation parameters regardless of
/// what config supplies.
pub(crate) fn benchmark_params(benchmark_mode: bool, temperature: f64, top_p: f64) -> (f64, f64) {
    if benchmark_mode {
        (0.0, 1.0)
    } else {
        (temperature, top_p)
    }
}

const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE_SECS: f64 = 2.0;

fn is_retryable(status: u16, body: &str) -> bool {
    status == 429 || body.contains("RESOURCE_EXHAUSTED")
}

/// One streaming chunk of the model's NDJSON response body: either partial
/// text, or the terminal chunk's usage metadata (or both).
#[derive(Debug, Default, serde::Deserialize)]
struct StreamChunk {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

fn read_stream(reader: impl std::io::Read) -> Result<(String, Usage), std::io::Error> {
    let mut buf_reader = BufReader::new(reader);
    let mut text = String::new();
    let mut usage = Usage::default();
    let mut line = String::new();
    loop {
        line.clear();
        let read = buf_reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(chunk) = serde_json::from_str::<StreamChunk>(trimmed) {
            if let Some(t) = chunk.text {
                text.push_str(&t);
            }
            if let Some(meta) = chunk.usage_metadata {
                usage = Usage {
                    prompt_tokens: meta.prompt_token_count,
                    completion_tokens: meta.candidates_token_count,
                    total_tokens: meta.total_token_count,
                };
            }
        }
    }
    Ok((text, usage))
}

/// Calls the model endpoint, retrying only on 429/`RESOURCE_EXHAUSTED` with
/// exponential backoff (`2s * 2^attempt`, up to `MAX_RETRIES` retries). Any
/// other transport or generation failure terminates the call immediately
/// with an empty-text, error-tagged response; usage collected before the
/// failure (from an earlier retry's partial stream) is preserved on the
/// accumulator the caller passes in, never on this return value, since a
/// failed attempt's own stream never reaches a terminal chunk.
pub(crate) fn call_model(endpoint: &str, request: &ModelRequest, oidc_token: Option<&str>) -> ModelResponse {
    let agent = ureq::AgentBuilder::new().build();
    let payload = serde_json::json!({
        "model": request.model_name,
        "prompt": request.prompt,
        "temperature": request.temperature,
        "top_p": request.top_p,
        "stream": true,
    });

    for attempt in 0..=MAX_RETRIES {
        let mut req = agent.post(endpoint);
        if let Some(token) = oidc_token {
            req = req.set("Authorization", &format!("Bearer {token}"));
        }
        let response = req.send_json(payload.clone());
        match response {
            Ok(resp) => match read_stream(resp.into_reader()) {
                Ok((text, usage)) => {
                    return ModelResponse {
                        text,
                        usage,
                        error_type: None,
                    };
                }
                Err(err) => {
                    eprintln!("[model_client] stream read failed: {err}");
                    return ModelResponse {
                        text: String::new(),
                        usage: Usage::default(),
                        error_type: Some(ModelErrorType::StreamError.as_str()),
                    };
                }
            },
            Err(ureq::Error::Status(code, resp)) => {
                let retry_after = crate::util::parse_retry_after(&resp);
                let body = resp.into_string().unwrap_or_default();
                if attempt < MAX_RETRIES && is_retryable(code, &body) {
                    let delay = BACKOFF_BASE_SECS * 2.0_f64.powi(attempt as i32);
                    let jittered = retry_after.unwrap_or(delay * (1.0 + jitter_ratio() * 0.1));
                    eprintln!(
                        "[model_client] {code} on attempt {attempt}, retrying in {jittered:.1}s"
                    );
                    thread::sleep(Duration::from_secs_f64(jittered));
                    continue;
                }
                eprintln!("[model_client] non-retryable failure {code}: {body}");
                return ModelResponse {
                    text: String::new(),
                    usage: Usage::default(),
                    error_type: Some(ModelErrorType::ApiError.as_str()),
                };
            }
            Err(ureq::Error::Transport(err)) => {
                eprintln!("[model_client] transport error: {err}");
                return ModelResponse {
                    text: String::new(),
                    usage: Usage::default(),
                    error_type: Some(ModelErrorType::GenerationError.as_str()),
                };
            }
        }
    }

    ModelResponse {
        text: String::new(),
        usage: Usage::default(),
        error_type: Some(ModelErrorType::ApiError.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write as _;
    use std::net::TcpListener;

    #[test]
    fn benchmark_mode_forces_temperature_zero_and_top_p_one() {
        assert_eq!(benchmark_params(true, 0.5, 0.9), (0.0, 1.0));
        assert_eq!(benchmark_params(false, 0.5, 0.9), (0.5, 0.9));
    }

    #[test]
    fn is_retryable_matches_429_and_resource_exhausted() {
        assert!(is_retryable(429, ""));
        assert!(is_retryable(400, "RESOURCE_EXHAUSTED"));
        assert!(!is_retryable(500, "internal error"));
    }

    #[test]
    fn read_stream_collects_text_and_terminal_usage() {
        let body = concat!(
            "{\"text\":\"hello \"}\n",
            "{\"text\":\"world\"}\n",
            "{\"usage_metadata\":{\"prompt_token_count\":10,\"candidates_token_count\":5,\"total_token_count\":15}}\n",
        );
        let (text, usage) = read_stream(Cursor::new(body.as_bytes())).unwrap();
        assert_eq!(text, "hello world");
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn call_model_surfaces_non_retryable_status_as_api_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let body = "{\"error\":\"bad request\"}";
                let response = format!(
                    "HTTP/1.1 400 Bad Request\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        let endpoint = format!("http://{addr}/generate");
        let req = ModelRequest {
            prompt: "hi",
            model_name: "tyre-rec-model",
            temperature: 0.5,
            top_p: 0.9,
        };
        let resp = call_model(&endpoint, &req, None);
        assert_eq!(resp.error_type, Some("APIError"));
        handle.join().unwrap();
    }
}
