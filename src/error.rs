//! Crate-wide error types and `Result` alias.

// self
use crate::response::EsiResponse;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the ESI client crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[cfg(feature = "redis")]
	#[error(transparent)]
	Redis(#[from] redis::RedisError),

	#[error("Access denied for {method} {uri} with the current scopes.")]
	AccessDenied { method: http::Method, uri: String },
	#[error("Authentication data is required for this operation.")]
	AuthenticationMissing,
	#[error("Authentication data is invalid: {field} must not be empty.")]
	AuthenticationInvalid { field: &'static str },
	#[error("Cache error: {0}")]
	Cache(String),
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: http::StatusCode, url: url::Url, body: Option<String> },
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Request failed with HTTP status {}.", .0.status())]
	RequestFailed(Box<EsiResponse>),
	#[error("Security violation: {0}")]
	Security(String),
	#[error("Token verification failed: {0}")]
	TokenVerification(String),
	#[error("Missing value for URI parameter '{name}'.")]
	UriParameterMissing { name: String },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Response record carried by a failed exchange, when the upstream answered at all.
	pub fn response(&self) -> Option<&EsiResponse> {
		match self {
			Self::RequestFailed(response) => Some(response),
			_ => None,
		}
	}

	/// Whether the HTTP exchange itself failed or came back with a 4xx/5xx status.
	pub fn is_transport_failure(&self) -> bool {
		matches!(self, Self::RequestFailed(_) | Self::Reqwest(_))
	}
}
#[cfg(feature = "prometheus")]
impl<T> From<metrics::SetRecorderError<T>> for Error
where
	T: std::fmt::Display,
{
	fn from(value: metrics::SetRecorderError<T>) -> Self {
		Self::Metrics(value.to_string())
	}
}
