//! Secret wrapper that keeps token and key material out of logs.

// self
use crate::_prelude::*;

/// Redacted secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Short `head…tail` preview that is safe for debug logs.
	pub fn preview(&self) -> String {
		let chars = self.0.chars().count();

		if chars <= 16 {
			return "<redacted>".into();
		}

		let head = self.0.chars().take(8).collect::<String>();
		let tail = self.0.chars().skip(chars - 8).collect::<String>();

		format!("{head}...{tail}")
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
		assert_eq!(secret.preview(), "<redacted>");
	}

	#[test]
	fn preview_keeps_only_the_edges() {
		let secret = TokenSecret::new("eyJhbGciOiJSUzI1NiIsInR5cCI6.payload.signature-tail");

		assert_eq!(secret.preview(), "eyJhbGci...ure-tail");
	}

	#[test]
	fn serializes_as_a_plain_string() {
		let secret = TokenSecret::new("abc");

		assert_eq!(serde_json::to_string(&secret).expect("Secret should serialize."), "\"abc\"");
	}
}
