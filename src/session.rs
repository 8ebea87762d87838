//! Authenticated access to the signing service.
//!
//! A [`SigningSession`] owns the signing endpoint, the [`ConnectionMethod`] that authenticates
//! signing calls, and the retry policy wrapped around every request. It also exposes the API key
//! management routes, which always authenticate with OAuth 2.0 when credentials are attached.

// crates.io
use oauth2::{
	HttpResponse,
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::ApiKey,
	credentials::AccessTokenSource,
	error::{ConfigError, ProtocolError, TransientError},
	http::{self, Endpoint, HttpTransport, RetryPolicy, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	settings::Settings,
	store::{ApiKeyStorage, StoreError},
};
#[cfg(feature = "reqwest")]
use crate::{
	credentials::CredentialManager,
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
};

#[cfg(feature = "reqwest")]
/// Signing session specialized for the crate's default reqwest transport stack.
pub type ReqwestSigningSession = SigningSession<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// How requests to the signing service authenticate.
#[derive(Clone)]
pub enum ConnectionMethod {
	/// No credentials; used with a bypass endpoint.
	Bare,
	/// Static access/secret key headers.
	ApiKey(ApiKey),
	/// Bearer token from an OAuth 2.0 credential source.
	OAuth2(Arc<dyn AccessTokenSource>),
}
impl ConnectionMethod {
	/// Picks the method and endpoint from settings.
	///
	/// A bypass endpoint wins, then an API key from settings, then the key stored in `key_ring`
	/// for the signing endpoint; OAuth 2.0 is the fallback.
	pub fn resolve(
		settings: &Settings,
		key_ring: Option<&ApiKeyStorage>,
		oauth2: Arc<dyn AccessTokenSource>,
	) -> (String, Self) {
		if let Some(bypass) = &settings.bypass_auth_api {
			tracing::debug!(endpoint = %bypass, "Using the bypass endpoint without credentials.");

			return (bypass.clone(), Self::Bare);
		}

		let endpoint = canonical_endpoint(&settings.signing_endpoint);

		if let Some(key) = settings.api_key() {
			tracing::debug!(access_key = %key.access_key, "Using the API key from settings.");

			return (endpoint, Self::ApiKey(key));
		}

		match key_ring.map(|ring| ring.get(&endpoint)).transpose() {
			Ok(Some(Some(key))) => {
				tracing::debug!(access_key = %key.access_key, "Using the stored API key.");

				return (endpoint, Self::ApiKey(key));
			},
			Ok(_) => (),
			Err(e) => tracing::warn!(error = %e, "Unable to read the API key ring, ignoring it."),
		}

		(endpoint, Self::OAuth2(oauth2))
	}

	/// Stable label suitable for log fields.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Bare => "bare",
			Self::ApiKey(_) => "api_key",
			Self::OAuth2(_) => "oauth2",
		}
	}

	/// Authentication headers for one request.
	pub async fn headers(&self) -> Result<Vec<(&'static str, String)>> {
		match self {
			Self::Bare => Ok(Vec::new()),
			Self::ApiKey(key) => Ok(key
				.headers()
				.into_iter()
				.map(|(name, value)| (name, value.to_owned()))
				.collect()),
			Self::OAuth2(source) => {
				let token = source.access_token().await?;

				Ok(vec![("authorization", format!("Bearer {}", token.expose()))])
			},
		}
	}
}
impl Debug for ConnectionMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Bare => f.write_str("Bare"),
			Self::ApiKey(key) => f.debug_tuple("ApiKey").field(key).finish(),
			Self::OAuth2(_) => f.write_str("OAuth2"),
		}
	}
}

/// HTTP session bound to one signing endpoint.
pub struct SigningSession<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	endpoint: Url,
	method: ConnectionMethod,
	management: ConnectionMethod,
	key_ring: Option<ApiKeyStorage>,
	retry: RetryPolicy,
}
impl<C, M> SigningSession<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a session for `endpoint`, which must be an `http(s)` URL.
	///
	/// A trailing `/` is appended when missing so routes resolve below the endpoint path.
	pub fn with_http_client(
		endpoint: &str,
		method: ConnectionMethod,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		Ok(Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			endpoint: parse_endpoint(endpoint)?,
			management: method.clone(),
			method,
			key_ring: None,
			retry: RetryPolicy::default(),
		})
	}

	/// Replaces the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Authenticates API key management calls with `source`.
	pub fn with_credentials(mut self, source: Arc<dyn AccessTokenSource>) -> Self {
		self.management = ConnectionMethod::OAuth2(source);

		self
	}

	/// Attaches the key ring used by [`SigningSession::register_api_key`].
	pub fn with_key_ring(mut self, key_ring: ApiKeyStorage) -> Self {
		self.key_ring = Some(key_ring);

		self
	}

	/// Normalized signing endpoint.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Method authenticating signing calls.
	pub fn method(&self) -> &ConnectionMethod {
		&self.method
	}

	/// Retry policy applied to every request.
	pub fn retry_policy(&self) -> &RetryPolicy {
		&self.retry
	}

	/// Resolves `route` (which may carry a query) against the endpoint.
	pub fn route(&self, route: &str) -> Result<Url> {
		self.endpoint.join(route).map_err(|source| {
			ConfigError::InvalidRoute { route: route.to_owned(), source }.into()
		})
	}

	/// Sends an authenticated `POST` with `query` parameters and returns the successful response.
	pub async fn post(&self, route: &str, query: &[(&str, &str)]) -> Result<HttpResponse> {
		self.send(Method::POST, route, query, &self.method).await
	}

	/// Sends an authenticated `GET` with `query` parameters and returns the successful response.
	pub async fn get(&self, route: &str, query: &[(&str, &str)]) -> Result<HttpResponse> {
		self.send(Method::GET, route, query, &self.method).await
	}

	/// Creates a new API key on the signing service.
	pub async fn create_api_key(&self) -> Result<ApiKey> {
		self.api_keys("create_api_key", async {
			let response = self.manage("create_api_key", &[]).await?;

			decode(&response)
		})
		.await
	}

	/// Lists the access keys known to the signing service.
	pub async fn list_api_keys(&self) -> Result<Vec<String>> {
		self.api_keys("list_api_keys", async {
			let response = self.manage("list_api_keys", &[]).await?;

			decode(&response)
		})
		.await
	}

	/// Revokes one access key on the signing service.
	pub async fn revoke_api_key(&self, access_key: &str) -> Result<()> {
		self.api_keys("revoke_api_key", async {
			self.manage("revoke_api_key", &[("access_key", access_key)]).await?;

			tracing::info!(access_key, "API key revoked.");

			Ok(())
		})
		.await
	}

	/// Revokes every access key on the signing service and returns the revoked keys.
	pub async fn revoke_all_api_keys(&self) -> Result<Vec<String>> {
		let keys = self.list_api_keys().await?;

		if keys.is_empty() {
			tracing::info!("No API key found.");
		}

		for key in &keys {
			self.revoke_api_key(key).await?;
		}

		Ok(keys)
	}

	/// Creates a new API key and stores it in the key ring for this endpoint.
	pub async fn register_api_key(&self) -> Result<ApiKey> {
		let key_ring = self.key_ring()?;
		let key = self.create_api_key().await?;

		key_ring.insert(self.endpoint.as_str(), key.clone())?;

		tracing::info!(access_key = %key.access_key, "API key created and stored.");

		Ok(key)
	}

	/// Removes the stored key for this endpoint, revoking it first unless `revoke` is false.
	pub async fn delete_stored_api_key(&self, revoke: bool) -> Result<Option<ApiKey>> {
		let key_ring = self.key_ring()?;
		let Some(key) = key_ring.get(self.endpoint.as_str())? else {
			return Ok(None);
		};

		if revoke {
			self.revoke_api_key(&key.access_key).await?;
		}

		Ok(key_ring.remove(self.endpoint.as_str())?)
	}

	fn key_ring(&self) -> Result<&ApiKeyStorage> {
		self.key_ring.as_ref().ok_or_else(|| {
			StoreError::Backend { message: "No configuration directory holds the key ring".into() }
				.into()
		})
	}

	async fn api_keys<T, Fut>(&self, stage: &'static str, fut: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		const KIND: FlowKind = FlowKind::ApiKeys;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = FlowSpan::new(KIND, stage).instrument(fut).await;

		obs::record_result(KIND, result)
	}

	async fn manage(&self, route: &str, query: &[(&str, &str)]) -> Result<HttpResponse> {
		self.send(Method::GET, route, query, &self.management).await
	}

	async fn send(
		&self,
		method: Method,
		route: &str,
		query: &[(&str, &str)],
		auth: &ConnectionMethod,
	) -> Result<HttpResponse> {
		let mut url = self.route(route)?;

		if !query.is_empty() {
			url.query_pairs_mut().extend_pairs(query);
		}

		tracing::debug!(%method, route, auth = auth.as_str(), "Calling the signing service.");

		let url = &url;
		let method = &method;

		self.retry.run(Endpoint::Signing, move || self.send_once(method, url, auth)).await
	}

	async fn send_once(
		&self,
		method: &Method,
		url: &Url,
		auth: &ConnectionMethod,
	) -> Result<HttpResponse> {
		let mut builder = Request::builder()
			.method(method.clone())
			.uri(url.as_str())
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "application/json");

		for (name, value) in auth.headers().await? {
			builder = builder.header(name, value);
		}

		let request = builder.body(Vec::new()).map_err(ConfigError::from)?;
		let response = http::execute(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			Endpoint::Signing,
			request,
		)
		.await?;

		self.check_status(response)
	}

	fn check_status(&self, response: HttpResponse) -> Result<HttpResponse> {
		let status = response.status();

		if status.is_success() {
			return Ok(response);
		}

		let message = http::body_preview(response.body());

		tracing::warn!(status = status.as_u16(), %message, "Signing service returned an error.");

		if self.retry.is_retryable_status(status.as_u16()) {
			return Err(TransientError::Endpoint {
				endpoint: Endpoint::Signing.as_str(),
				message,
				status: Some(status.as_u16()),
				retry_after: http::parse_retry_after(response.headers()),
			}
			.into());
		}

		Err(Error::Http { endpoint: Endpoint::Signing.as_str(), status: status.as_u16(), message })
	}
}
#[cfg(feature = "reqwest")]
impl SigningSession<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds the session described by `settings`, with OAuth 2.0 credentials for the DINAMIS
	/// realm persisted under the configuration directory.
	pub fn from_settings(settings: &Settings) -> Result<Self> {
		let config_dir = settings.ensure_config_dir();
		let key_ring = config_dir.as_deref().map(ApiKeyStorage::in_dir).transpose()?;
		let credentials: Arc<dyn AccessTokenSource> =
			Arc::new(CredentialManager::from_settings(settings)?);
		let (endpoint, method) =
			ConnectionMethod::resolve(settings, key_ring.as_ref(), credentials.clone());
		let mut session = Self::with_http_client(
			&endpoint,
			method,
			ReqwestHttpClient::new()?,
			ReqwestTransportErrorMapper,
		)?
		.with_retry(settings.retry_policy())
		.with_credentials(credentials);

		if let Some(key_ring) = key_ring {
			session = session.with_key_ring(key_ring);
		}

		tracing::debug!(
			endpoint = %session.endpoint,
			method = session.method.as_str(),
			"Signing session ready."
		);

		Ok(session)
	}
}
impl<C, M> Debug for SigningSession<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SigningSession")
			.field("endpoint", &self.endpoint.as_str())
			.field("method", &self.method)
			.field("retry", &self.retry)
			.finish()
	}
}

/// Decodes a JSON response body from the signing service.
pub(crate) fn decode<T>(response: &HttpResponse) -> Result<T>
where
	T: DeserializeOwned,
{
	let de = &mut serde_json::Deserializer::from_slice(response.body());

	serde_path_to_error::deserialize(de).map_err(|source| {
		ProtocolError::MalformedResponse { endpoint: Endpoint::Signing.as_str(), source }.into()
	})
}

fn normalize_endpoint(raw: &str) -> String {
	let raw = raw.trim();

	if raw.ends_with('/') { raw.to_owned() } else { format!("{raw}/") }
}

/// Endpoint string as the session stores it, which is also the key-ring key.
///
/// Unparsable endpoints keep their trimmed, slash-terminated form; building the session reports
/// the error.
fn canonical_endpoint(raw: &str) -> String {
	parse_endpoint(raw).map(String::from).unwrap_or_else(|_| normalize_endpoint(raw))
}

fn parse_endpoint(raw: &str) -> Result<Url> {
	let normalized = normalize_endpoint(raw);
	let lowercase = normalized.to_ascii_lowercase();

	if !lowercase.starts_with("http://") && !lowercase.starts_with("https://") {
		return Err(ConfigError::UnsupportedScheme { name: "signing", url: raw.to_owned() }.into());
	}

	Url::parse(&normalized).map_err(|source| ConfigError::InvalidDescriptor { source }.into())
}
