//! Static API key credentials that bypass OAuth 2.0 entirely.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Header carrying the API access key.
pub const ACCESS_KEY_HEADER: &str = "dinamis-access-key";
/// Header carrying the API secret key.
pub const SECRET_KEY_HEADER: &str = "dinamis-secret-key";

/// Access/secret key pair issued by the signing service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
	/// Public access key identifier.
	#[serde(rename = "access-key")]
	pub access_key: String,
	/// Secret half of the key pair.
	#[serde(rename = "secret-key")]
	pub secret_key: TokenSecret,
}
impl ApiKey {
	/// Creates a key pair from raw values.
	pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
		Self { access_key: access_key.into(), secret_key: TokenSecret::new(secret_key) }
	}

	/// Header name/value pairs authenticating a signing request.
	pub fn headers(&self) -> [(&'static str, &str); 2] {
		[
			(ACCESS_KEY_HEADER, self.access_key.as_str()),
			(SECRET_KEY_HEADER, self.secret_key.expose()),
		]
	}
}
impl Debug for ApiKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiKey")
			.field("access_key", &self.access_key)
			.field("secret_key", &"<redacted>")
			.finish()
	}
}
