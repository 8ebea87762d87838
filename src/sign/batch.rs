//! Wire format of the `sign_urls` route and validation of its responses.

// crates.io
use serde::Deserializer;
use time::{
	PrimitiveDateTime,
	format_description::{BorrowedFormatItem, well_known::Rfc3339},
	macros::format_description,
};
// self
use crate::{_prelude::*, error::ProtocolError, sign::SignedUrl};

/// Route of the batch signing call, relative to the signing endpoint.
pub const SIGN_URLS_ROUTE: &str = "sign_urls";

const NAIVE_FORMATS: [&[BorrowedFormatItem<'static>]; 2] = [
	format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
	format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
];

/// Body returned by the `sign_urls` route.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct SignUrlsResponse {
	#[serde(deserialize_with = "deserialize_expiry")]
	pub expiry: OffsetDateTime,
	#[serde(default)]
	pub hrefs: HashMap<String, String>,
}
impl SignUrlsResponse {
	/// Checks the response against the `requested` chunk and turns it into cache entries.
	///
	/// Every requested URL must be present; otherwise nothing from the chunk is kept.
	pub(crate) fn into_signed(
		self,
		requested: &[String],
	) -> Result<HashMap<String, SignedUrl>, ProtocolError> {
		if self.hrefs.is_empty() {
			return Err(ProtocolError::EmptyBatch { requested: requested.len() });
		}

		let missing = requested
			.iter()
			.filter(|url| !self.hrefs.contains_key(url.as_str()))
			.cloned()
			.collect::<Vec<_>>();

		if !missing.is_empty() {
			return Err(ProtocolError::MissingUrls { missing });
		}

		let expiry = self.expiry;

		Ok(self.hrefs.into_iter().map(|(url, href)| (url, SignedUrl { href, expiry })).collect())
	}
}

/// Query pairs for one chunk; `duration_seconds` is only sent when positive.
pub(crate) fn query<'a>(chunk: &'a [String], duration: &'a str) -> Vec<(&'static str, &'a str)> {
	let mut pairs = chunk.iter().map(|url| ("urls", url.as_str())).collect::<Vec<_>>();

	if duration != "0" {
		pairs.push(("duration_seconds", duration));
	}

	pairs
}

/// Parses an expiry given as RFC 3339, or as an ISO 8601 timestamp without offset read as UTC.
pub fn parse_expiry(raw: &str) -> Option<OffsetDateTime> {
	let raw = raw.trim();

	if let Ok(expiry) = OffsetDateTime::parse(raw, &Rfc3339) {
		return Some(expiry);
	}

	NAIVE_FORMATS
		.iter()
		.find_map(|format| PrimitiveDateTime::parse(raw, format).ok())
		.map(PrimitiveDateTime::assume_utc)
}

fn deserialize_expiry<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;

	parse_expiry(&raw)
		.ok_or_else(|| serde::de::Error::custom(format!("unrecognized expiry timestamp `{raw}`")))
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn response(hrefs: &[(&str, &str)]) -> SignUrlsResponse {
		SignUrlsResponse {
			expiry: macros::datetime!(2025-06-01 12:00 UTC),
			hrefs: hrefs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
		}
	}

	#[test]
	fn expiry_accepts_offsets_and_naive_utc() {
		let expected = macros::datetime!(2025-06-01 12:00 UTC);

		assert_eq!(parse_expiry("2025-06-01T12:00:00Z"), Some(expected));
		assert_eq!(parse_expiry("2025-06-01T14:00:00+02:00"), Some(expected));
		assert_eq!(parse_expiry("2025-06-01T12:00:00"), Some(expected));
		assert_eq!(
			parse_expiry("2025-06-01T12:00:00.250000"),
			Some(expected + Duration::milliseconds(250))
		);
		assert_eq!(parse_expiry("tomorrow"), None);
	}

	#[test]
	fn body_parses_with_naive_expiry() {
		let body: SignUrlsResponse = serde_json::from_str(
			r#"{"expiry":"2025-06-01T12:00:00","hrefs":{"https://s/a":"https://s/a?sig"}}"#,
		)
		.expect("Signing body should parse.");

		assert_eq!(body.hrefs.len(), 1);
		assert_eq!(body.expiry, macros::datetime!(2025-06-01 12:00 UTC));
	}

	#[test]
	fn missing_urls_reject_the_whole_chunk() {
		let requested = vec!["a".to_owned(), "b".to_owned()];
		let err = response(&[("a", "a?sig")])
			.into_signed(&requested)
			.expect_err("Missing URL should be a protocol violation.");

		assert!(matches!(err, ProtocolError::MissingUrls { ref missing } if missing == &["b"]));

		let err = response(&[]).into_signed(&requested).expect_err("Empty batch should fail.");

		assert!(matches!(err, ProtocolError::EmptyBatch { requested: 2 }));
	}

	#[test]
	fn duration_is_only_sent_when_set() {
		let chunk = vec!["a".to_owned(), "b".to_owned()];

		assert_eq!(query(&chunk, "0"), vec![("urls", "a"), ("urls", "b")]);
		assert_eq!(query(&chunk, "600").last(), Some(&("duration_seconds", "600")));
	}
}
