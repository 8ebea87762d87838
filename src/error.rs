//! Crate-level error types shared across credentials, signing, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Operator-facing authentication failure; requires a new login.
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
	/// Signing endpoint broke its response contract.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	/// Provider rejected the grant (e.g., an expired or revoked refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
	/// Endpoint answered with a status that is not worth retrying.
	#[error("The {endpoint} endpoint answered with HTTP {status}: {message}.")]
	Http {
		/// Endpoint label.
		endpoint: &'static str,
		/// HTTP status code.
		status: u16,
		/// Body preview returned by the endpoint.
		message: String,
	},
	/// The value handed to a signing helper has no signable shape.
	#[error("Cannot sign a value of kind `{kind}`.")]
	UnsupportedInput {
		/// Kind of the rejected value.
		kind: &'static str,
	},
}
impl Error {
	/// Status code and retry hint carried by retryable variants.
	pub(crate) fn retry_hint(&self) -> Option<(Option<u16>, Option<Duration>)> {
		match self {
			Self::Transient(TransientError::Endpoint { status, retry_after, .. }) =>
				Some((*status, *retry_after)),
			Self::Transport(TransportError::Network { .. }) => Some((None, None)),
			_ => None,
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Endpoint URL could not be joined with a route.
	#[error("Route `{route}` cannot be joined onto the endpoint.")]
	InvalidRoute {
		/// Route that failed to join.
		route: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Storage domain cannot be turned into a URL pattern.
	#[error("Storage domain cannot be matched inside text.")]
	StoragePattern(#[from] regex::Error),
	/// An environment setting holds a value that cannot be parsed.
	#[error("Setting {name} has an invalid value `{value}`.")]
	InvalidSetting {
		/// Environment variable name.
		name: &'static str,
		/// Offending raw value.
		value: String,
	},
	/// Endpoint must use `http` or `https`.
	#[error("The {name} endpoint must start with http:// or https://: {url}.")]
	UnsupportedScheme {
		/// Which endpoint failed validation.
		name: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Token endpoint issued a token without a refresh token.
	#[error("Token endpoint response is missing refresh_token.")]
	MissingRefreshToken,
	/// Token builder validation failed.
	#[error("Unable to build token.")]
	TokenBuild(#[from] crate::auth::TokenBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Endpoint returned a retryable status or an unexpected but non-fatal response.
	#[error("The {endpoint} endpoint returned an unexpected response: {message}.")]
	Endpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Endpoint- or crate-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Identity provider responded with JSON that could not be parsed.
	#[error("Identity provider returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the {endpoint} endpoint.")]
	Network {
		/// Endpoint label.
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during an HTTP exchange.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}
}

/// Failures that require the operator to log in again.
#[derive(Debug, ThisError)]
pub enum AuthenticationError {
	/// Nobody approved the device link before it expired.
	#[error("User has not logged in yet and the authentication link expired after {expires_in}.")]
	DeviceCodeExpired {
		/// Lifetime the provider granted to the device code.
		expires_in: Duration,
	},
	/// Device authorization request was refused or malformed.
	#[error("Unable to start device authorization with the SSO: {reason}.")]
	DeviceAuthorization {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
	/// Provider answered the device grant with an unusable token.
	#[error("SSO rejected the authentication: {reason}.")]
	Rejected {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
}

/// Violations of the signing endpoint response contract; never retried.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
	/// Response omitted some of the requested URLs.
	#[error("Signing endpoint omitted {} of the requested URLs.", .missing.len())]
	MissingUrls {
		/// Requested URLs absent from `hrefs`.
		missing: Vec<String>,
	},
	/// Response carried no signed URL at all.
	#[error("Signing endpoint returned an empty batch for {requested} URLs.")]
	EmptyBatch {
		/// Number of URLs in the request.
		requested: usize,
	},
	/// Response body did not match the expected schema.
	#[error("The {endpoint} endpoint returned a malformed body.")]
	MalformedResponse {
		/// Endpoint label.
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retry_hint_only_covers_retryable_variants() {
		let transient: Error = TransientError::Endpoint {
			endpoint: "signing",
			message: "busy".into(),
			status: Some(503),
			retry_after: Some(Duration::seconds(2)),
		}
		.into();
		let http = Error::Http { endpoint: "signing", status: 403, message: "forbidden".into() };
		let protocol: Error = ProtocolError::EmptyBatch { requested: 3 }.into();

		assert_eq!(transient.retry_hint(), Some((Some(503), Some(Duration::seconds(2)))));
		assert!(http.retry_hint().is_none());
		assert!(protocol.retry_hint().is_none());
	}

	#[test]
	fn protocol_messages_describe_the_violation() {
		let err = ProtocolError::MissingUrls { missing: vec!["a".into(), "b".into()] };

		assert_eq!(err.to_string(), "Signing endpoint omitted 2 of the requested URLs.");
	}
}
