//! Immutable OAuth 2.0 token values, their persisted shape, and lifecycle evaluation.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Lifecycle state of the credential manager, derived from the current token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialState {
	/// Nothing has been loaded from durable storage yet.
	Uninitialized,
	/// The access token can be used as-is.
	Valid,
	/// The access token is (nearly) expired but the refresh token may still work.
	NeedsRefresh,
	/// A full device-authorization login is required.
	NeedsReauth,
}
impl CredentialState {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialState::Uninitialized => "uninitialized",
			CredentialState::Valid => "valid",
			CredentialState::NeedsRefresh => "needs_refresh",
			CredentialState::NeedsReauth => "needs_reauth",
		}
	}

	/// Evaluates the state for an optional token at `now`, keeping `margin` of access-token
	/// lifetime in reserve.
	///
	/// Records without a persisted `issued_at` never report an expired refresh token, so their
	/// first use goes through the refresh grant.
	pub fn of(token: Option<&Token>, now: OffsetDateTime, margin: Duration) -> Self {
		let Some(token) = token else {
			return CredentialState::NeedsReauth;
		};

		if token.ttl_at(now) > margin {
			return CredentialState::Valid;
		}
		if token.issued_at != OffsetDateTime::UNIX_EPOCH
			&& token.refresh_expires_at().is_some_and(|deadline| now >= deadline)
		{
			return CredentialState::NeedsReauth;
		}

		CredentialState::NeedsRefresh
	}
}
impl Display for CredentialState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Errors produced by [`TokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no refresh token value was provided.
	#[error("Refresh token is required.")]
	MissingRefreshToken,
	/// Issued when no access-token lifetime was configured.
	#[error("Access token lifetime must be supplied via expires_in.")]
	MissingExpiry,
	/// Issued when a lifetime is negative.
	#[error("Token lifetimes cannot be negative.")]
	NegativeLifetime,
	/// Issued when the refresh token would expire before the access token.
	#[error(
		"Refresh token lifetime ({refresh}s) is shorter than the access token lifetime ({access}s)."
	)]
	RefreshOutlivedByAccess {
		/// Access-token lifetime in seconds.
		access: i64,
		/// Refresh-token lifetime in seconds.
		refresh: i64,
	},
}

/// Access/refresh token pair issued by the identity provider.
///
/// Tokens are immutable values: a refresh or a new login replaces the whole value. The JSON shape
/// matches the token endpoint response, plus `issued_at` so a reloaded token can be evaluated
/// without a network call. Records written without `issued_at` deserialize as issued at the Unix
/// epoch, which forces a refresh on first use.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	/// Bearer token presented to the signing service.
	pub access_token: TokenSecret,
	/// Access-token lifetime in seconds, counted from `issued_at`.
	pub expires_in: i64,
	/// Refresh token used by the `refresh_token` grant.
	pub refresh_token: TokenSecret,
	/// Refresh-token lifetime in seconds; `0` means the provider declared no expiry.
	#[serde(default)]
	pub refresh_expires_in: i64,
	/// Token type reported by the provider (usually `Bearer`).
	pub token_type: String,
	/// Instant the token was obtained.
	#[serde(default = "unix_epoch", with = "time::serde::rfc3339")]
	pub issued_at: OffsetDateTime,
}
impl Token {
	/// Returns a builder for constructing tokens.
	pub fn builder() -> TokenBuilder {
		TokenBuilder::default()
	}

	/// Access-token expiry instant.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.issued_at + Duration::seconds(self.expires_in)
	}

	/// Refresh-token expiry instant, when the provider declared one.
	pub fn refresh_expires_at(&self) -> Option<OffsetDateTime> {
		(self.refresh_expires_in > 0)
			.then(|| self.issued_at + Duration::seconds(self.refresh_expires_in))
	}

	/// Remaining access-token lifetime at `now`; negative once expired.
	pub fn ttl_at(&self, now: OffsetDateTime) -> Duration {
		self.expires_at() - now
	}

	/// Evaluates the lifecycle state at `now` with the provided safety margin.
	pub fn state_at(&self, now: OffsetDateTime, margin: Duration) -> CredentialState {
		CredentialState::of(Some(self), now, margin)
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("access_token", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.field("refresh_token", &"<redacted>")
			.field("refresh_expires_in", &self.refresh_expires_in)
			.field("token_type", &self.token_type)
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

/// Builder for [`Token`].
#[derive(Clone, Debug, Default)]
pub struct TokenBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	expires_in: Option<i64>,
	refresh_expires_in: Option<i64>,
	token_type: Option<String>,
	issued_at: Option<OffsetDateTime>,
}
impl TokenBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the access-token lifetime in seconds.
	pub fn expires_in(mut self, seconds: i64) -> Self {
		self.expires_in = Some(seconds);

		self
	}

	/// Sets the refresh-token lifetime in seconds (`0` for no declared expiry).
	pub fn refresh_expires_in(mut self, seconds: i64) -> Self {
		self.refresh_expires_in = Some(seconds);

		self
	}

	/// Sets the token type (defaults to `Bearer`).
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the issued-at instant (defaults to the current clock).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Consumes the builder and produces a [`Token`].
	pub fn build(self) -> Result<Token, TokenBuilderError> {
		let access_token = self.access_token.ok_or(TokenBuilderError::MissingAccessToken)?;
		let refresh_token = self.refresh_token.ok_or(TokenBuilderError::MissingRefreshToken)?;
		let expires_in = self.expires_in.ok_or(TokenBuilderError::MissingExpiry)?;
		let refresh_expires_in = self.refresh_expires_in.unwrap_or(0);

		if expires_in < 0 || refresh_expires_in < 0 {
			return Err(TokenBuilderError::NegativeLifetime);
		}
		if refresh_expires_in != 0 && refresh_expires_in < expires_in {
			return Err(TokenBuilderError::RefreshOutlivedByAccess {
				access: expires_in,
				refresh: refresh_expires_in,
			});
		}

		Ok(Token {
			access_token,
			expires_in,
			refresh_token,
			refresh_expires_in,
			token_type: self.token_type.unwrap_or_else(|| "Bearer".into()),
			issued_at: self.issued_at.unwrap_or_else(OffsetDateTime::now_utc),
		})
	}
}

fn unix_epoch() -> OffsetDateTime {
	OffsetDateTime::UNIX_EPOCH
}
