//! Environment-driven settings and fixed service constants.
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `DINAMIS_SDK_SIGNING_ENDPOINT` | [`SIGNING_ENDPOINT`] | Signing service base URL |
//! | `DINAMIS_SDK_TTL_MARGIN` | `1800` | Seconds a cached signed URL must still be valid for |
//! | `DINAMIS_SDK_URL_DURATION` | `0` | Requested signed URL lifetime in seconds (`0` = server default) |
//! | `DINAMIS_SDK_BYPASS_AUTH_API` | unset | Signing endpoint that needs no authentication |
//! | `DINAMIS_SDK_CONFIG_DIR` | per-user config dir | Where token and API key files live |
//! | `DINAMIS_SDK_ACCESS_KEY` / `DINAMIS_SDK_SECRET_KEY` | unset | Static API key pair |
//! | `DINAMIS_SDK_RETRY_TOTAL` | `10` | Retries for signing calls |
//! | `DINAMIS_SDK_RETRY_BACKOFF_FACTOR` | `0.8` | Exponential backoff factor in seconds |
//!
//! Empty values are treated as unset.

// std
use std::fs;
// self
use crate::{_prelude::*, auth::ApiKey, error::ConfigError, http::RetryPolicy};

/// Directory name under the per-user configuration directory.
pub const APP_NAME: &str = "dinamis_sdk_auth";
/// Maximum number of URLs sent in one signing request.
pub const MAX_URLS: usize = 64;
/// Storage domain whose objects require signing.
pub const S3_STORAGE_DOMAIN: &str = "meso.umontpellier.fr";
/// Default signing service endpoint.
pub const SIGNING_ENDPOINT: &str = "https://s3-signing-cdos.apps.okd.crocc.meso.umontpellier.fr/";
/// Access-token lifetime kept in reserve before a refresh is triggered.
pub const CREDENTIAL_MARGIN: Duration = Duration::seconds(30);

const ENV_SIGNING_ENDPOINT: &str = "DINAMIS_SDK_SIGNING_ENDPOINT";
const ENV_TTL_MARGIN: &str = "DINAMIS_SDK_TTL_MARGIN";
const ENV_URL_DURATION: &str = "DINAMIS_SDK_URL_DURATION";
const ENV_BYPASS_AUTH_API: &str = "DINAMIS_SDK_BYPASS_AUTH_API";
const ENV_CONFIG_DIR: &str = "DINAMIS_SDK_CONFIG_DIR";
const ENV_ACCESS_KEY: &str = "DINAMIS_SDK_ACCESS_KEY";
const ENV_SECRET_KEY: &str = "DINAMIS_SDK_SECRET_KEY";
const ENV_RETRY_TOTAL: &str = "DINAMIS_SDK_RETRY_TOTAL";
const ENV_RETRY_BACKOFF_FACTOR: &str = "DINAMIS_SDK_RETRY_BACKOFF_FACTOR";

/// Runtime settings for the signing session and the signed-URL cache.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
	/// Signing service base URL.
	pub signing_endpoint: String,
	/// Minimum remaining validity for a cached signed URL to be served.
	pub ttl_margin: Duration,
	/// Requested signed-URL lifetime in seconds; `0` lets the server decide.
	pub url_duration: u64,
	/// Endpoint that skips authentication entirely.
	pub bypass_auth_api: Option<String>,
	/// Explicit configuration directory.
	pub config_dir: Option<PathBuf>,
	/// Static API access key.
	pub access_key: Option<String>,
	/// Static API secret key.
	pub secret_key: Option<String>,
	/// Retries allowed for signing calls.
	pub retry_total: u32,
	/// Exponential backoff factor, in seconds.
	pub retry_backoff_factor: f64,
	/// Maximum URLs per signing request.
	pub max_urls: usize,
	/// Storage domain whose objects require signing.
	pub storage_domain: String,
}
impl Settings {
	/// Reads settings from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads settings through `lookup`, which maps a variable name to its value.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
		let mut settings = Self::default();

		if let Some(endpoint) = lookup(ENV_SIGNING_ENDPOINT) {
			settings.signing_endpoint = endpoint;
		}
		if let Some(raw) = lookup(ENV_TTL_MARGIN) {
			settings.ttl_margin = Duration::seconds(parse::<u32>(ENV_TTL_MARGIN, &raw)?.into());
		}
		if let Some(raw) = lookup(ENV_URL_DURATION) {
			settings.url_duration = parse(ENV_URL_DURATION, &raw)?;
		}
		if let Some(raw) = lookup(ENV_RETRY_TOTAL) {
			settings.retry_total = parse(ENV_RETRY_TOTAL, &raw)?;
		}
		if let Some(raw) = lookup(ENV_RETRY_BACKOFF_FACTOR) {
			let factor = parse::<f64>(ENV_RETRY_BACKOFF_FACTOR, &raw)?;

			if !factor.is_finite() || factor < 0. {
				return Err(ConfigError::InvalidSetting {
					name: ENV_RETRY_BACKOFF_FACTOR,
					value: raw,
				}
				.into());
			}

			settings.retry_backoff_factor = factor;
		}

		settings.bypass_auth_api = lookup(ENV_BYPASS_AUTH_API);
		settings.config_dir = lookup(ENV_CONFIG_DIR).map(PathBuf::from);
		settings.access_key = lookup(ENV_ACCESS_KEY);
		settings.secret_key = lookup(ENV_SECRET_KEY);

		Ok(settings)
	}

	/// Overrides the signing endpoint.
	pub fn with_signing_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.signing_endpoint = endpoint.into();

		self
	}

	/// Overrides the cached signed-URL margin.
	pub fn with_ttl_margin(mut self, margin: Duration) -> Self {
		self.ttl_margin = margin;

		self
	}

	/// Requests signed URLs valid for `seconds`.
	pub fn with_url_duration(mut self, seconds: u64) -> Self {
		self.url_duration = seconds;

		self
	}

	/// Routes signing requests to an endpoint without authentication.
	pub fn with_bypass_auth_api(mut self, endpoint: impl Into<String>) -> Self {
		self.bypass_auth_api = Some(endpoint.into());

		self
	}

	/// Overrides the configuration directory.
	pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config_dir = Some(dir.into());

		self
	}

	/// Configures a static API key pair.
	pub fn with_api_key(
		mut self,
		access_key: impl Into<String>,
		secret_key: impl Into<String>,
	) -> Self {
		self.access_key = Some(access_key.into());
		self.secret_key = Some(secret_key.into());

		self
	}

	/// Overrides the retry budget and backoff factor.
	pub fn with_retry(mut self, total: u32, backoff_factor: f64) -> Self {
		self.retry_total = total;
		self.retry_backoff_factor = backoff_factor;

		self
	}

	/// Overrides the signing chunk size.
	pub fn with_max_urls(mut self, max_urls: usize) -> Self {
		self.max_urls = max_urls.max(1);

		self
	}

	/// Overrides the managed storage domain.
	pub fn with_storage_domain(mut self, domain: impl Into<String>) -> Self {
		self.storage_domain = domain.into();

		self
	}

	/// API key configured through settings, when both halves are present.
	pub fn api_key(&self) -> Option<ApiKey> {
		match (&self.access_key, &self.secret_key) {
			(Some(access), Some(secret)) => Some(ApiKey::new(access.clone(), secret.clone())),
			_ => None,
		}
	}

	/// Retry policy for signing calls and identity provider requests.
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy::new(self.retry_total, self.retry_backoff_factor)
	}

	/// Resolves and creates the configuration directory.
	///
	/// Returns `None` (with a warning) when no directory is available, in which case credentials
	/// live in memory only.
	pub fn ensure_config_dir(&self) -> Option<PathBuf> {
		let Some(dir) =
			self.config_dir.clone().or_else(|| dirs::config_dir().map(|d| d.join(APP_NAME)))
		else {
			tracing::warn!("No per-user configuration directory is available.");

			return None;
		};

		if dir.is_dir() {
			tracing::debug!(path = %dir.display(), "Using existing config dir.");

			return Some(dir);
		}

		match fs::create_dir_all(&dir) {
			Ok(()) => {
				tracing::debug!(path = %dir.display(), "Config dir created.");

				Some(dir)
			},
			Err(e) => {
				tracing::warn!(path = %dir.display(), error = %e, "Unable to use config dir.");

				None
			},
		}
	}
}
impl Default for Settings {
	fn default() -> Self {
		Self {
			signing_endpoint: SIGNING_ENDPOINT.into(),
			ttl_margin: Duration::seconds(1800),
			url_duration: 0,
			bypass_auth_api: None,
			config_dir: None,
			access_key: None,
			secret_key: None,
			retry_total: 10,
			retry_backoff_factor: 0.8,
			max_urls: MAX_URLS,
			storage_domain: S3_STORAGE_DOMAIN.into(),
		}
	}
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T>
where
	T: FromStr,
{
	raw.trim()
		.parse()
		.map_err(|_| ConfigError::InvalidSetting { name, value: raw.to_owned() }.into())
}
