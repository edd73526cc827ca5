use thiserror::Error;

/// Message fragments the platform uses for retryable rejections
const TRANSIENT_MARKERS: &[&str] = &[
    "rate limit exceeded",
    "rate limit",
    "ratelimit",
    "maxconcurrencyexceeded",
    "concurrency limit",
    "transient validation",
];

/// GraphQL error codes that mark a retryable rejection
const TRANSIENT_CODES: &[&str] = &[
    "RATE_LIMIT_EXCEEDED",
    "ComplexityException",
    "COMPLEXITY_BUDGET_EXHAUSTED",
    "maxConcurrencyExceeded",
    "TRANSIENT_VALIDATION",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Network failure or non-success HTTP status
    #[error("transport error: {message}")]
    Transport { status: Option<u16>, message: String },

    /// HTTP success, but the body carried an `errors` list
    #[error("GraphQL error: {}", .messages.join("; "))]
    GraphQl {
        messages: Vec<String>,
        codes: Vec<String>,
    },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("gave up after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: Box<ApiError> },
}

fn has_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

impl ApiError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn graphql(message: impl Into<String>) -> Self {
        Self::GraphQl {
            messages: vec![message.into()],
            codes: vec![],
        }
    }

    /// Default classifier: rate limits, concurrency limits, transient
    /// validation errors, HTTP 429 and 5xx are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { status, message } => match status {
                Some(429) => true,
                Some(code) if (500..600).contains(code) => true,
                Some(_) => has_marker(message),
                None => has_marker(message) || message.to_lowercase().contains("timed out"),
            },
            Self::GraphQl { messages, codes } => {
                codes
                    .iter()
                    .any(|c| TRANSIENT_CODES.iter().any(|t| t.eq_ignore_ascii_case(c)))
                    || messages.iter().any(|m| has_marker(m))
            }
            Self::Decode(_) | Self::NotFound(_) | Self::ExhaustedRetries { .. } => false,
        }
    }

    /// The innermost error, looking through `ExhaustedRetries`
    pub fn root(&self) -> &ApiError {
        match self {
            Self::ExhaustedRetries { last, .. } => last.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_rate_limits() {
        assert!(ApiError::graphql("Rate Limit Exceeded").is_transient());
        assert!(ApiError::transport(Some(429), "HTTP 429 Too Many Requests").is_transient());
        assert!(ApiError::transport(Some(503), "HTTP 503").is_transient());
        assert!(ApiError::GraphQl {
            messages: vec!["Too many requests".to_string()],
            codes: vec!["maxConcurrencyExceeded".to_string()],
        }
        .is_transient());
    }

    #[test]
    fn test_classifies_fatal() {
        assert!(!ApiError::graphql("Parse error on \"}\" (RCURLY)").is_transient());
        assert!(!ApiError::transport(Some(401), "HTTP 401 Unauthorized").is_transient());
        assert!(!ApiError::transport(Some(403), "permission denied").is_transient());
        assert!(!ApiError::Decode("missing data".to_string()).is_transient());
    }

    #[test]
    fn test_exhausted_is_never_retried() {
        let err = ApiError::ExhaustedRetries {
            attempts: 3,
            last: Box::new(ApiError::graphql("Rate Limit Exceeded")),
        };
        assert!(!err.is_transient());
        assert!(err.root().is_transient());
        assert!(err.to_string().contains("gave up after 3 attempts"));
    }
}
