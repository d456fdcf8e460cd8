use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[source] reqwest::Error),

    #[error("Failed to read response body: {0}")]
    ReadBody(#[source] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid response format: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },
}

impl ApiError {
    /// True when the transport gave up because a configured timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        match self {
            ApiError::RequestFailed(err) | ApiError::ReadBody(err) => err.is_timeout(),
            _ => false,
        }
    }

    pub fn suggestion(&self) -> Option<&str> {
        match self {
            ApiError::AuthenticationFailed { .. } => {
                Some("Verify your access token using: teamcity-cli auth test")
            }
            ApiError::NotFound { .. } => Some("Check if the build ID or artifact path is correct"),
            ApiError::BadRequest { .. } => Some("Review the request parameters"),
            ApiError::InvalidUrl(_) => Some("Check the base_url configured for this profile"),
            ApiError::RequestFailed(err) if err.is_timeout() => {
                Some("Check your network connection or raise the profile timeouts")
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_have_suggestions() {
        let err = ApiError::AuthenticationFailed {
            message: "bad token".to_string(),
        };
        assert!(err.suggestion().unwrap().contains("auth test"));

        let err = ApiError::NotFound {
            resource: "/app/rest/builds/id:1".to_string(),
        };
        assert!(err.to_string().contains("/app/rest/builds/id:1"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_decode_error_is_not_timeout() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ApiError::Decode(source);
        assert!(!err.is_timeout());
        assert!(err.suggestion().is_none());
        assert!(err.to_string().starts_with("Invalid response format"));
    }

    #[test]
    fn test_invalid_url_from_parse_error() {
        let err: ApiError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }
}
