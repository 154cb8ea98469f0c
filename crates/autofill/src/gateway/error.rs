use thiserror::Error;

/// Errors returned by either gateway implementation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request never produced a response (network, DNS, TLS, timeout).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Status {
            status: 404,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            Self::Decode(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Best-effort human readable message for a failed response body:
/// `error.message`, then `message`, then short plain text, then `HTTP <code>`.
pub fn message_from_body(status: u16, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let nested = json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str());
        let flat = json.get("message").and_then(|m| m.as_str());
        if let Some(msg) = nested.or(flat).filter(|m| !m.trim().is_empty()) {
            return msg.to_string();
        }
        return format!("HTTP {status}");
    }

    let text = body.trim();
    if !text.is_empty() && text.len() <= 500 && !text.starts_with('<') {
        return text.to_string();
    }
    format!("HTTP {status}")
}
