//! OAuth 2.0 credential manager for the signing service.
//!
//! [`CredentialManager::get_access_token`] hands out a bearer token that stays valid for at least
//! the configured margin. The first call loads the persisted token; later calls reuse the token
//! in memory, run the `refresh_token` grant once it is close to expiry, and fall back to an
//! interactive device login when refreshing is impossible or fails. Refreshes and logins are
//! serialized behind one async mutex, so concurrent callers wait for the in-flight acquisition
//! and then observe its token.

mod metrics;
mod prompt;

pub use metrics::CredentialMetrics;
pub use prompt::{DevicePrompt, RecordingPrompt, TerminalPrompt};

// self
use crate::{
	_prelude::*,
	auth::{CredentialState, Token, TokenSecret},
	http::{HttpTransport, RetryPolicy, TransportErrorMapper},
	oauth::DeviceFacade,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderDescriptor,
	settings::CREDENTIAL_MARGIN,
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	settings::Settings,
	store::{FileStore, MemoryStore},
};

#[cfg(feature = "reqwest")]
/// Credential manager specialized for the crate's default reqwest transport stack.
pub type ReqwestCredentialManager =
	CredentialManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Boxed future returned by [`AccessTokenSource::access_token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenSecret>> + 'a + Send>>;

/// Anything able to hand out a currently valid bearer token.
///
/// The signing session depends on this contract instead of a concrete manager, so tests can plug
/// in a fixed token.
pub trait AccessTokenSource
where
	Self: Send + Sync,
{
	/// Returns an access token valid for at least the source's safety margin.
	fn access_token(&self) -> TokenFuture<'_>;
}

#[derive(Clone, Debug)]
enum Slot {
	Unloaded,
	Loaded(Option<Token>),
}

/// Owns the token lifecycle: load, reuse, refresh, and device login.
pub struct CredentialManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every identity provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Durable single-record token store.
	pub store: Arc<dyn TokenStore>,
	/// OAuth 2.0 endpoints and client identity.
	pub descriptor: ProviderDescriptor,
	/// Shared counters for refreshes and device logins.
	pub metrics: Arc<CredentialMetrics>,
	prompt: Arc<dyn DevicePrompt>,
	margin: Duration,
	retry: RetryPolicy,
	slot: RwLock<Slot>,
	acquisition: AsyncMutex<()>,
}
impl<C, M> CredentialManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		descriptor: ProviderDescriptor,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			descriptor,
			metrics: Default::default(),
			prompt: Arc::new(TerminalPrompt),
			margin: CREDENTIAL_MARGIN,
			retry: RetryPolicy::default(),
			slot: RwLock::new(Slot::Unloaded),
			acquisition: AsyncMutex::new(()),
		}
	}

	/// Replaces the prompt that presents device logins.
	pub fn with_prompt(mut self, prompt: Arc<dyn DevicePrompt>) -> Self {
		self.prompt = prompt;

		self
	}

	/// Replaces the retry policy applied to refresh and device authorization requests.
	///
	/// The manager falls back to a device login only after the policy gives up or the refresh
	/// grant is rejected.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Overrides the access-token safety margin.
	pub fn with_margin(mut self, margin: Duration) -> Self {
		self.margin = margin;

		self
	}

	/// Lifecycle state as of now, without touching the network or the store.
	pub fn state(&self) -> CredentialState {
		match &*self.slot.read() {
			Slot::Unloaded => CredentialState::Uninitialized,
			Slot::Loaded(token) =>
				CredentialState::of(token.as_ref(), OffsetDateTime::now_utc(), self.margin),
		}
	}

	/// Returns an access token valid for at least the configured margin.
	pub async fn get_access_token(&self) -> Result<TokenSecret> {
		Ok(self.current_token().await?.access_token)
	}

	/// Returns the full current token, acquiring a new one when needed.
	pub async fn current_token(&self) -> Result<Token> {
		if let Some(token) = self.valid_in_memory() {
			return Ok(token);
		}

		let _singleflight = self.acquisition.lock().await;
		let current = self.loaded().await;
		let state = CredentialState::of(current.as_ref(), OffsetDateTime::now_utc(), self.margin);

		tracing::debug!(%state, "Evaluated credential state.");

		match (state, current) {
			(CredentialState::Valid, Some(token)) => return Ok(token),
			(CredentialState::NeedsRefresh, Some(token)) => match self.refresh(&token).await {
				Ok(refreshed) => return Ok(self.install(refreshed).await),
				Err(e) => {
					tracing::warn!(error = %e, "Token refresh failed, starting a new login.");

					*self.slot.write() = Slot::Loaded(None);
				},
			},
			(_, Some(_)) => {
				tracing::debug!("Refresh token expired, starting a new login.");

				*self.slot.write() = Slot::Loaded(None);
			},
			(_, None) => (),
		}

		let token = self.reauthenticate().await?;

		Ok(self.install(token).await)
	}

	fn valid_in_memory(&self) -> Option<Token> {
		let Slot::Loaded(Some(token)) = &*self.slot.read() else {
			return None;
		};

		(token.state_at(OffsetDateTime::now_utc(), self.margin) == CredentialState::Valid)
			.then(|| token.clone())
	}

	async fn loaded(&self) -> Option<Token> {
		let cached = match &*self.slot.read() {
			Slot::Loaded(token) => Some(token.clone()),
			Slot::Unloaded => None,
		};

		if let Some(token) = cached {
			return token;
		}

		let token = match self.store.load().await {
			Ok(token) => token,
			Err(e) => {
				tracing::warn!(error = %e, "Unable to load the persisted token, ignoring it.");

				None
			},
		};

		*self.slot.write() = Slot::Loaded(token.clone());

		token
	}

	async fn install(&self, token: Token) -> Token {
		tracing::debug!(
			access_token = %token.access_token.preview(),
			expires_in = token.expires_in,
			refresh_expires_in = token.refresh_expires_in,
			"Installing a new token."
		);

		*self.slot.write() = Slot::Loaded(Some(token.clone()));

		if let Err(e) = self.store.save(token.clone()).await {
			tracing::warn!(error = %e, "Unable to persist the token, keeping it in memory only.");
		}

		token
	}

	fn facade(&self) -> Result<DeviceFacade<C, M>> {
		Ok(DeviceFacade::from_descriptor(
			self.descriptor.clone(),
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)?
		.with_retry(self.retry.clone()))
	}

	async fn refresh(&self, current: &Token) -> Result<Token> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_refresh_attempt();

		let result = span
			.instrument(async move { self.facade()?.refresh(current).await })
			.await;

		match &result {
			Ok(_) => self.metrics.record_refresh_success(),
			Err(_) => self.metrics.record_refresh_failure(),
		}

		obs::record_result(KIND, result)
	}

	async fn reauthenticate(&self) -> Result<Token> {
		const KIND: FlowKind = FlowKind::DeviceAuthorization;

		let span = FlowSpan::new(KIND, "reauthenticate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_reauthentication();

		let result = span
			.instrument(async move {
				let facade = self.facade()?;
				let device = facade.start_device_authorization().await?;

				tracing::info!(
					provider = %facade.descriptor().id,
					expires_in = %device.expires_in,
					"Waiting for the operator to approve the device login."
				);

				self.prompt.present(&device);

				facade.poll_device_token(&device).await
			})
			.await;

		obs::record_result(KIND, result)
	}
}
impl<C, M> AccessTokenSource for CredentialManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn access_token(&self) -> TokenFuture<'_> {
		Box::pin(self.get_access_token())
	}
}
#[cfg(feature = "reqwest")]
impl CredentialManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a manager backed by the default reqwest transport.
	pub fn new(store: Arc<dyn TokenStore>, descriptor: ProviderDescriptor) -> Self {
		Self::with_http_client(
			store,
			descriptor,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}

	/// Creates the manager for the DINAMIS realm, persisting the token under the configuration
	/// directory when one can be created.
	pub fn from_settings(settings: &Settings) -> Result<Self> {
		let store: Arc<dyn TokenStore> = match settings.ensure_config_dir() {
			Some(dir) => Arc::new(FileStore::in_dir(&dir)?),
			None => Arc::new(MemoryStore::default()),
		};

		Ok(Self::with_http_client(
			store,
			ProviderDescriptor::dinamis()?,
			ReqwestHttpClient::new()?,
			ReqwestTransportErrorMapper,
		)
		.with_retry(settings.retry_policy()))
	}
}
impl<C, M> Debug for CredentialManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialManager")
			.field("descriptor", &self.descriptor)
			.field("state", &self.state())
			.field("margin", &self.margin)
			.field("retry", &self.retry)
			.finish()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	fn fresh_token() -> Token {
		Token::builder()
			.access_token("cached-access")
			.refresh_token("cached-refresh")
			.expires_in(3_600)
			.refresh_expires_in(7_200)
			.build()
			.expect("Failed to build fresh token.")
	}

	#[tokio::test]
	async fn starts_uninitialized_and_serves_a_valid_persisted_token() {
		let descriptor = test_descriptor("http://127.0.0.1:9");
		let (manager, store, prompt) = build_reqwest_test_manager(descriptor, Some(fresh_token()));

		assert_eq!(manager.state(), CredentialState::Uninitialized);

		let access = manager.get_access_token().await.expect("Persisted token should be reused.");

		assert_eq!(access.expose(), "cached-access");
		assert_eq!(manager.state(), CredentialState::Valid);
		assert_eq!(store.save_count(), 0);
		assert!(prompt.presented().is_empty());
		assert_eq!(manager.metrics.refresh_attempts(), 0);
	}

	#[test]
	fn debug_output_hides_tokens() {
		let descriptor = test_descriptor("http://127.0.0.1:9");
		let (manager, _, _) = build_reqwest_test_manager(descriptor, Some(fresh_token()));
		let rendered = format!("{manager:?}");

		assert!(rendered.contains("Uninitialized"));
		assert!(!rendered.contains("cached-access"));
	}
}
