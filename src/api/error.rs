use serde_json::Value;

/// Classified failure of a remote call.
///
/// Every transport outcome collapses into one of these four categories before
/// it leaves the api layer; callers never see raw HTTP errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Request rejected by the service (4xx other than 401)
    #[error("{0}")]
    Validation(String),
    /// Credential missing, expired or revoked (401)
    #[error("{0}")]
    AuthDenied(String),
    /// Service-side failure or an unreadable response
    #[error("{0}")]
    Server(String),
    /// Connection failure or timeout
    #[error("{0}")]
    Transport(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Classify a non-success HTTP response from its status code and body
    pub fn from_response(status: u16, body: &str, fallback: &str) -> Self {
        let message = match serde_json::from_str::<Value>(body) {
            Ok(value) => error_message(&value, fallback),
            Err(_) => fallback.to_string(),
        };

        match status {
            401 => ApiError::AuthDenied(message),
            400..=499 => ApiError::Validation(message),
            _ => ApiError::Server(message),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation(msg)
            | ApiError::AuthDenied(msg)
            | ApiError::Server(msg)
            | ApiError::Transport(msg) => msg,
        }
    }

    pub fn is_auth_denied(&self) -> bool {
        matches!(self, ApiError::AuthDenied(_))
    }

    /// Transient failures a caller may choose to retry
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }

    pub fn category(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::AuthDenied(_) => "auth",
            ApiError::Server(_) => "server",
            ApiError::Transport(_) => "transport",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ApiError::Transport(format!("request timed out: {}", error))
        } else if error.is_connect() || error.is_request() {
            ApiError::Transport(error.to_string())
        } else if error.is_decode() {
            ApiError::Server(format!("unreadable response: {}", error))
        } else {
            ApiError::Transport(error.to_string())
        }
    }
}

/// Unwrap the service's error envelope into one human-readable string.
///
/// Accepts `{"detail": "..."}` and `{"detail": [{"msg": "..."}, ...]}`
/// (entries may also use `message`); anything else yields `fallback`.
pub fn error_message(envelope: &Value, fallback: &str) -> String {
    match envelope.get("detail") {
        Some(Value::String(detail)) if !detail.is_empty() => detail.clone(),
        Some(Value::Array(entries)) => {
            let messages: Vec<&str> = entries
                .iter()
                .filter_map(|entry| {
                    entry
                        .get("msg")
                        .or_else(|| entry.get("message"))
                        .and_then(Value::as_str)
                })
                .collect();

            if messages.is_empty() {
                fallback.to_string()
            } else {
                messages.join(", ")
            }
        }
        _ => fallback.to_string(),
    }
}
