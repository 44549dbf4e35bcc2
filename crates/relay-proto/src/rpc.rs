//! JSON-RPC 2.0 shapes spoken by the relay daemon, and the rate-limit
//! metadata it attaches to refused sends.
//!
//! A refused send looks roughly like:
//!
//! ```json
//! {"jsonrpc":"2.0","id":1,"error":{"code":-5,"message":"Rate limit exceeded",
//!   "data":{"response":{"results":[{"type":"RATE_LIMIT_FAILURE",
//!     "token":"5a6e...","retryAfterSeconds":86400}]}}}}
//! ```
//!
//! The exact layout varies between relay versions, so the challenge token
//! is searched for breadth-first.

use std::collections::VecDeque;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC call.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    /// Method name (`send`, `receive`, ...).
    pub method: &'a str,
    /// Named parameters.
    pub params: P,
    /// Request id echoed by the server.
    pub id: u64,
}

impl<'a, P: Serialize> RpcRequest<'a, P> {
    /// Build a request.
    pub fn new(method: &'a str, params: P, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

/// A JSON-RPC reply.
#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    /// Present on success.
    #[serde(default)]
    pub result: Option<T>,
    /// Present on failure.
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// Error object of a JSON-RPC reply.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Structured details.
    #[serde(default)]
    pub data: Option<Value>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "json-rpc error {}: {}", self.code, self.message)
    }
}

/// JSON-RPC code the signal-cli daemon uses for rate-limit failures.
pub const RATE_LIMIT_CODE: i64 = -5;

impl RpcError {
    /// Rate-limit metadata, if this error is a rate-limit refusal.
    #[must_use]
    pub fn rate_limit(&self) -> Option<RateLimit> {
        let hints = self
            .data
            .as_ref()
            .map(RateLimit::from_data)
            .unwrap_or_default();
        let flagged = self.code == RATE_LIMIT_CODE
            || self.message.to_ascii_lowercase().contains("rate limit");
        if flagged || !hints.is_empty() {
            let challenge = hints
                .challenge
                .or_else(|| extract_challenge(&Value::String(self.message.clone())));
            Some(RateLimit { challenge, ..hints })
        } else {
            None
        }
    }
}

/// Structured rate-limit refusal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimit {
    /// Challenge token to solve before sending again.
    pub challenge: Option<String>,
    /// Challenge kinds the server accepts (`recaptcha`, `pushChallenge`).
    pub options: Vec<String>,
    /// Seconds the server asks us to wait.
    pub wait_seconds: Option<u64>,
}

impl RateLimit {
    /// Pull hints out of an error `data` object.
    ///
    /// Recognizes `challenge`/`token`, `options`/`availableOptions` and
    /// `wait`/`retryAfter`/`retryAfterSeconds`, at the top level or nested.
    #[must_use]
    pub fn from_data(data: &Value) -> Self {
        let challenge = find_key(data, &["challenge", "token"])
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| extract_challenge(data));
        let options = match find_key(data, &["options", "availableOptions"]) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            Some(Value::String(s)) => s.split(',').map(|o| o.trim().to_owned()).collect(),
            _ => Vec::new(),
        };
        let wait_seconds = find_key(data, &["wait", "retryAfter", "retryAfterSeconds"]).and_then(
            |v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            },
        );
        Self {
            challenge,
            options,
            wait_seconds,
        }
    }

    /// True when no hint was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.challenge.is_none() && self.options.is_empty() && self.wait_seconds.is_none()
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "challenge={} options='{}' wait={}",
            self.challenge.as_deref().unwrap_or("n/a"),
            self.options.join(","),
            self.wait_seconds
                .map_or_else(|| "n/a".to_owned(), |w| w.to_string()),
        )
    }
}

fn captcha_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"signalcaptcha://[^\s'"}]+"#).expect("static regex"))
}

/// First value found under any of `keys`, searching breadth-first.
fn find_key<'v>(root: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    let mut queue = VecDeque::from([root]);
    while let Some(cur) = queue.pop_front() {
        match cur {
            Value::Object(map) => {
                if let Some(v) = keys.iter().find_map(|k| map.get(*k)) {
                    return Some(v);
                }
                queue.extend(map.values());
            }
            Value::Array(items) => queue.extend(items),
            _ => {}
        }
    }
    None
}

/// Search any JSON value for a challenge token.
///
/// Accepts `signalcaptcha://` URLs anywhere, and the verbatim value of any
/// key whose name contains `challenge`. Bare UUIDs under other keys are
/// ignored since they are usually recipient addresses.
#[must_use]
pub fn extract_challenge(root: &Value) -> Option<String> {
    let re = captcha_re();
    let mut queue = VecDeque::from([root]);
    while let Some(cur) = queue.pop_front() {
        match cur {
            Value::String(s) => {
                if let Some(m) = re.find(s) {
                    return Some(m.as_str().to_owned());
                }
            }
            Value::Object(map) => {
                for (key, value) in map {
                    let key = key.to_ascii_lowercase();
                    if !(key.contains("captcha") || key.contains("challenge")) {
                        continue;
                    }
                    match value {
                        Value::String(s) => {
                            if let Some(m) = re.find(s) {
                                return Some(m.as_str().to_owned());
                            }
                            if key.contains("challenge") {
                                return Some(s.clone());
                            }
                        }
                        Value::Object(inner) => {
                            if let Some(Value::String(c)) = inner.get("challenge") {
                                return Some(c.clone());
                            }
                            if let Some(Value::String(c)) = inner.get("captcha") {
                                if let Some(m) = re.find(c) {
                                    return Some(m.as_str().to_owned());
                                }
                            }
                        }
                        _ => {}
                    }
                }
                queue.extend(map.values());
            }
            Value::Array(items) => queue.extend(items),
            _ => {}
        }
    }
    None
}
