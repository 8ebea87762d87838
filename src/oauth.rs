//! OAuth 2.0 client facade: refresh grant, device authorization request, and device-code polling.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, Client, ClientId, DeviceAuthorizationUrl, EndpointNotSet, EndpointSet,
	ExtraTokenFields, HttpClientError, HttpRequest, RefreshToken, RequestTokenError, Scope,
	StandardDeviceAuthorizationResponse, StandardRevocableToken, StandardTokenResponse,
	TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicErrorResponseType, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use tokio::time::Instant;
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{Token, TokenSecret},
	error::{AuthenticationError, ConfigError, TransientError},
	http::{
		self, Endpoint, HttpTransport, ResponseMetadata, ResponseMetadataSlot, RetryPolicy,
		TransportErrorMapper,
	},
	provider::ProviderDescriptor,
};

/// Grant type used while polling the token endpoint (RFC 8628 §3.4).
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

const SLOW_DOWN_STEP: Duration = Duration::seconds(5);

type KeycloakTokenResponse = StandardTokenResponse<KeycloakTokenFields, BasicTokenType>;
type ConfiguredClient = Client<
	BasicErrorResponse,
	KeycloakTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeRequestError<E> = RequestTokenError<HttpClientError<E>, BasicErrorResponse>;

/// Keycloak extension fields carried by token responses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakTokenFields {
	/// Refresh-token lifetime in seconds; `0` for offline tokens.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_expires_in: Option<u64>,
}
impl ExtraTokenFields for KeycloakTokenFields {}

/// Pending device login handed to the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceAuthorization {
	/// Code exchanged while polling; never shown to the operator.
	pub device_code: TokenSecret,
	/// Short code the operator confirms in the browser.
	pub user_code: String,
	/// Verification page.
	pub verification_uri: String,
	/// Verification page with the user code pre-filled, when provided.
	pub verification_uri_complete: Option<String>,
	/// Lifetime of the device code.
	pub expires_in: Duration,
	/// Minimum delay between polls.
	pub interval: Duration,
}
impl DeviceAuthorization {
	/// URL the operator should open.
	pub fn login_url(&self) -> &str {
		self.verification_uri_complete.as_deref().unwrap_or(&self.verification_uri)
	}

	fn from_response(response: &StandardDeviceAuthorizationResponse) -> Result<Self> {
		let expires_in = Duration::try_from(response.expires_in())
			.map_err(|_| ConfigError::ExpiresInOutOfRange)?;
		let interval =
			Duration::try_from(response.interval()).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

		if !expires_in.is_positive() {
			return Err(ConfigError::NonPositiveExpiresIn.into());
		}

		Ok(Self {
			device_code: TokenSecret::new(response.device_code().secret().to_owned()),
			user_code: response.user_code().secret().to_owned(),
			verification_uri: response.verification_uri().url().as_str().to_owned(),
			verification_uri_complete: response
				.verification_uri_complete()
				.map(|uri| uri.secret().to_owned()),
			expires_in,
			interval,
		})
	}
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

pub(crate) struct DeviceFacade<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	descriptor: ProviderDescriptor,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	retry: RetryPolicy,
}
impl<C, M> DeviceFacade<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: ProviderDescriptor,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let device_url =
			DeviceAuthorizationUrl::new(descriptor.endpoints.device_authorization.to_string())
				.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let oauth_client = Client::new(ClientId::new(descriptor.client_id.clone()))
			.set_auth_type(AuthType::RequestBody)
			.set_token_uri(token_url)
			.set_device_authorization_url(device_url);

		Ok(Self {
			oauth_client,
			descriptor,
			http_client,
			error_mapper,
			retry: RetryPolicy::default(),
		})
	}

	/// Replaces the retry policy wrapped around refresh and device authorization requests.
	pub(crate) fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	pub(crate) fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	/// Exchanges the refresh token of `current` for a new token.
	///
	/// Retryable failures are retried under the facade's policy; a rejected grant is not.
	pub(crate) async fn refresh(&self, current: &Token) -> Result<Token> {
		self.retry.run(Endpoint::Token, || self.refresh_once(current)).await
	}

	/// Requests a device code and verification URL, retrying retryable failures.
	pub(crate) async fn start_device_authorization(&self) -> Result<DeviceAuthorization> {
		self.retry
			.run(Endpoint::DeviceAuthorization, || self.start_device_authorization_once())
			.await
	}

	async fn refresh_once(&self, current: &Token) -> Result<Token> {
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let refresh_token = RefreshToken::new(current.refresh_token.expose().to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&refresh_token)
			.add_scope(Scope::new(self.descriptor.scope.clone()))
			.request_async(&handle)
			.await
			.map_err(|e| self.map_request_error(Endpoint::Token, slot.take(), e))?;

		token_from_response(&response, Some(&current.refresh_token))
	}

	async fn start_device_authorization_once(&self) -> Result<DeviceAuthorization> {
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let response: StandardDeviceAuthorizationResponse = self
			.oauth_client
			.exchange_device_code()
			.add_scope(Scope::new(self.descriptor.scope.clone()))
			.request_async(&handle)
			.await
			.map_err(|e| self.map_request_error(Endpoint::DeviceAuthorization, slot.take(), e))?;

		DeviceAuthorization::from_response(&response)
	}

	/// Polls the token endpoint until the operator approves the login or the device code expires.
	///
	/// Any non-success status keeps the loop going; `slow_down` widens the interval by five
	/// seconds. Transport failures abort immediately.
	pub(crate) async fn poll_device_token(&self, device: &DeviceAuthorization) -> Result<Token> {
		let deadline = Instant::now() + device.expires_in.unsigned_abs();
		let mut interval = device.interval;
		let mut attempt = 0_u32;

		loop {
			attempt += 1;

			let request = self.device_token_request(device.device_code.expose())?;
			let response = http::execute(
				self.http_client.as_ref(),
				self.error_mapper.as_ref(),
				Endpoint::Token,
				request,
			)
			.await?;
			let status = response.status();

			if status.is_success() {
				tracing::debug!(attempt, "Device login approved.");

				return token_from_body(response.body(), status.as_u16());
			}

			match serde_json::from_slice::<OAuthErrorBody>(response.body()) {
				Ok(body) if body.error == "slow_down" => {
					interval += SLOW_DOWN_STEP;

					tracing::debug!(attempt, %interval, "Token endpoint asked to slow down.");
				},
				Ok(body) => tracing::debug!(
					attempt,
					status = status.as_u16(),
					error = %body.error,
					description = body.error_description.as_deref().unwrap_or_default(),
					"Device login still pending."
				),
				Err(_) => tracing::debug!(
					attempt,
					status = status.as_u16(),
					"Device login still pending."
				),
			}

			let now = Instant::now();

			if now >= deadline {
				return Err(AuthenticationError::DeviceCodeExpired { expires_in: device.expires_in }
					.into());
			}

			tokio::time::sleep(interval.unsigned_abs().min(deadline - now)).await;
		}
	}

	fn device_token_request(&self, device_code: &str) -> Result<HttpRequest> {
		let body = form_urlencoded::Serializer::new(String::new())
			.append_pair("grant_type", DEVICE_CODE_GRANT)
			.append_pair("device_code", device_code)
			.append_pair("client_id", &self.descriptor.client_id)
			.append_pair("scope", &self.descriptor.scope)
			.finish();
		let request = Request::builder()
			.method(Method::POST)
			.uri(self.descriptor.endpoints.token.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json")
			.body(body.into_bytes())
			.map_err(ConfigError::from)?;

		Ok(request)
	}

	fn map_request_error(
		&self,
		endpoint: Endpoint,
		meta: Option<ResponseMetadata>,
		err: FacadeRequestError<C::TransportError>,
	) -> Error {
		let meta = meta.as_ref();

		match err {
			RequestTokenError::ServerResponse(response) => {
				let reason = match response.error_description() {
					Some(description) => format!("{} ({description})", response.error().as_ref()),
					None => response.error().as_ref().to_owned(),
				};

				match (endpoint, response.error()) {
					(Endpoint::DeviceAuthorization, _) =>
						AuthenticationError::DeviceAuthorization { reason }.into(),
					(_, BasicErrorResponseType::InvalidGrant) => Error::InvalidGrant { reason },
					_ => AuthenticationError::Rejected { reason }.into(),
				}
			},
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(endpoint, meta, error),
			RequestTokenError::Parse(source, body) => match meta.and_then(|m| m.status) {
				Some(status) if !(200..300).contains(&status) => TransientError::Endpoint {
					endpoint: endpoint.as_str(),
					message: http::body_preview(&body),
					status: Some(status),
					retry_after: meta.and_then(|m| m.retry_after),
				}
				.into(),
				status => TransientError::TokenResponseParse { source, status }.into(),
			},
			RequestTokenError::Other(message) => TransientError::Endpoint {
				endpoint: endpoint.as_str(),
				message,
				status: meta.and_then(|m| m.status),
				retry_after: meta.and_then(|m| m.retry_after),
			}
			.into(),
		}
	}
}

fn token_from_body(body: &[u8], status: u16) -> Result<Token> {
	let de = &mut serde_json::Deserializer::from_slice(body);
	let response: KeycloakTokenResponse = serde_path_to_error::deserialize(de)
		.map_err(|source| TransientError::TokenResponseParse { source, status: Some(status) })?;

	token_from_response(&response, None)
}

/// Builds a [`Token`] from a token endpoint response.
///
/// A response without `refresh_token` keeps `previous_refresh`; a missing `refresh_expires_in` is
/// read as "no declared expiry", and a refresh lifetime shorter than the access lifetime is raised
/// to match it.
fn token_from_response(
	response: &KeycloakTokenResponse,
	previous_refresh: Option<&TokenSecret>,
) -> Result<Token> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let refresh_token = response
		.refresh_token()
		.map(|token| token.secret().to_owned())
		.or_else(|| previous_refresh.map(|secret| secret.expose().to_owned()))
		.ok_or(ConfigError::MissingRefreshToken)?;
	let refresh_expires_in = response.extra_fields().refresh_expires_in.unwrap_or(0);
	let refresh_expires_in =
		i64::try_from(refresh_expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;
	let refresh_expires_in =
		if refresh_expires_in == 0 { 0 } else { refresh_expires_in.max(expires_in) };
	let token = Token::builder()
		.access_token(response.access_token().secret().to_owned())
		.token_type(token_type_label(response.token_type()))
		.refresh_token(refresh_token)
		.expires_in(expires_in)
		.refresh_expires_in(refresh_expires_in)
		.issued_at(OffsetDateTime::now_utc())
		.build()
		.map_err(ConfigError::from)?;

	Ok(token)
}

fn token_type_label(token_type: &BasicTokenType) -> String {
	match token_type {
		BasicTokenType::Bearer => "Bearer".into(),
		BasicTokenType::Mac => "MAC".into(),
		BasicTokenType::Extension(other) => other.clone(),
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

	fn facade() -> DeviceFacade<ReqwestHttpClient, ReqwestTransportErrorMapper> {
		let descriptor =
			ProviderDescriptor::dinamis().expect("Built-in descriptor should be valid.");

		DeviceFacade::from_descriptor(
			descriptor,
			Arc::new(ReqwestHttpClient::default()),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.expect("Failed to build device facade.")
	}

	#[test]
	fn device_poll_request_is_a_form_post() {
		let request = facade().device_token_request("dev-123").expect("Request should build.");
		let body = String::from_utf8(request.body().clone()).expect("Body should be UTF-8.");

		assert_eq!(request.method(), Method::POST);
		assert!(request.uri().to_string().ends_with("/protocol/openid-connect/token"));
		assert!(body.contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code"));
		assert!(body.contains("device_code=dev-123"));
		assert!(body.contains("client_id=gdal"));
		assert!(body.contains("scope=offline_access"));
	}

	#[test]
	fn token_bodies_keep_keycloak_lifetimes() {
		let body = br#"{"access_token":"at","token_type":"Bearer","expires_in":300,"refresh_token":"rt","refresh_expires_in":1800}"#;
		let token = token_from_body(body, 200).expect("Keycloak body should parse.");

		assert_eq!(token.access_token.expose(), "at");
		assert_eq!(token.refresh_token.expose(), "rt");
		assert_eq!((token.expires_in, token.refresh_expires_in), (300, 1800));
	}

	#[test]
	fn refresh_without_rotation_keeps_the_previous_refresh_token() {
		let response: KeycloakTokenResponse = serde_json::from_str(
			r#"{"access_token":"at2","token_type":"bearer","expires_in":300,"refresh_expires_in":60}"#,
		)
		.expect("Refresh response should parse.");
		let previous = TokenSecret::new("rt-old");
		let token = token_from_response(&response, Some(&previous))
			.expect("Refresh should map to a token.");

		assert_eq!(token.refresh_token.expose(), "rt-old");
		assert_eq!(token.refresh_expires_in, 300);
		assert_eq!(token.token_type, "Bearer");
	}

	#[test]
	fn token_type_follows_the_response() {
		let body = br#"{"access_token":"at","token_type":"dpop","expires_in":300,"refresh_token":"rt"}"#;
		let token = token_from_body(body, 200).expect("Extension token type should parse.");

		assert_eq!(token.token_type, "dpop");
		assert_eq!(token_type_label(&BasicTokenType::Mac), "MAC");
	}

	#[test]
	fn unparsable_error_responses_are_retryable() {
		let source = serde_path_to_error::deserialize::<_, KeycloakTokenResponse>(
			&mut serde_json::Deserializer::from_slice(b"maintenance"),
		)
		.expect_err("Plain text should not parse as a token response.");
		let meta = ResponseMetadata {
			status: Some(503),
			retry_after: Some(Duration::seconds(1)),
		};
		let err = facade().map_request_error(
			Endpoint::Token,
			Some(meta),
			RequestTokenError::Parse(source, b"maintenance".to_vec()),
		);

		assert!(matches!(
			&err,
			Error::Transient(TransientError::Endpoint {
				status: Some(503),
				retry_after: Some(delay),
				message,
				..
			}) if *delay == Duration::seconds(1) && message == "maintenance"
		));
		assert_eq!(err.retry_hint(), Some((Some(503), Some(Duration::seconds(1)))));
	}

	#[test]
	fn malformed_bodies_are_transient_parse_errors() {
		let err =
			token_from_body(br#"{"access_token":1}"#, 200).expect_err("Bad body should fail.");

		assert!(matches!(
			err,
			Error::Transient(TransientError::TokenResponseParse { status: Some(200), .. })
		));
	}
}
