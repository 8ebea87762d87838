#![allow(dead_code)]

// std
use std::{env, fs, path::PathBuf, process, sync::Arc};
// crates.io
use httpmock::MockServer;
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};
use url::Url;
// self
use dinamis_sdk::{
	auth::{ApiKey, Token, TokenSecret},
	credentials::{
		AccessTokenSource, CredentialManager, RecordingPrompt, ReqwestCredentialManager,
		TokenFuture,
	},
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper, RetryPolicy},
	provider::ProviderDescriptor,
	session::{ConnectionMethod, ReqwestSigningSession, SigningSession},
	settings::Settings,
	sign::ReqwestUrlSigner,
	store::{MemoryStore, TokenStore},
};

pub const STORAGE_DOMAIN: &str = "s3.example.org";

/// Token source that always hands out the same bearer token.
pub struct FixedToken(pub &'static str);
impl AccessTokenSource for FixedToken {
	fn access_token(&self) -> TokenFuture<'_> {
		let token = self.0;

		Box::pin(async move { Ok(TokenSecret::new(token)) })
	}
}

pub fn storage_url(name: &str) -> String {
	format!("https://bucket.{STORAGE_DOMAIN}/{name}")
}

pub fn signed_url(name: &str) -> String {
	format!("{}?X-Amz-Signature=sig-{name}", storage_url(name))
}

pub fn rfc3339(instant: OffsetDateTime) -> String {
	instant.format(&Rfc3339).expect("Failed to format expiry.")
}

pub fn far_expiry() -> String {
	rfc3339(OffsetDateTime::now_utc() + Duration::days(1))
}

pub fn settings(max_urls: usize) -> Settings {
	Settings::default().with_storage_domain(STORAGE_DOMAIN).with_max_urls(max_urls)
}

pub fn session(
	server: &MockServer,
	method: ConnectionMethod,
	retry: RetryPolicy,
) -> ReqwestSigningSession {
	SigningSession::with_http_client(
		&server.base_url(),
		method,
		ReqwestHttpClient::default(),
		ReqwestTransportErrorMapper,
	)
	.expect("Mock signing endpoint should be accepted.")
	.with_retry(retry)
}

pub fn api_key_signer(server: &MockServer, max_urls: usize) -> ReqwestUrlSigner {
	let method = ConnectionMethod::ApiKey(ApiKey::new("ak", "sk"));
	let session = session(server, method, RetryPolicy::none());

	ReqwestUrlSigner::new(Arc::new(session), &settings(max_urls))
		.expect("Signer should build from test settings.")
}

pub fn descriptor(server: &MockServer) -> ProviderDescriptor {
	ProviderDescriptor::builder("test-realm")
		.device_authorization_endpoint(
			Url::parse(&server.url("/device")).expect("Failed to parse device endpoint."),
		)
		.token_endpoint(Url::parse(&server.url("/token")).expect("Failed to parse token endpoint."))
		.client_id("test-client")
		.build()
		.expect("Failed to build test provider descriptor.")
}

pub fn manager(
	server: &MockServer,
	seed: Option<Token>,
) -> (ReqwestCredentialManager, Arc<MemoryStore>, Arc<RecordingPrompt>) {
	let backend = Arc::new(MemoryStore::seeded(seed));
	let store: Arc<dyn TokenStore> = backend.clone();
	let prompt = Arc::new(RecordingPrompt::default());
	let manager = CredentialManager::with_http_client(
		store,
		descriptor(server),
		ReqwestHttpClient::default(),
		ReqwestTransportErrorMapper,
	)
	.with_prompt(prompt.clone());

	(manager, backend, prompt)
}

/// Token issued `age` ago with the given lifetimes.
pub fn token_issued(age: Duration, expires_in: i64, refresh_expires_in: i64) -> Token {
	Token::builder()
		.access_token("seed-access")
		.refresh_token("seed-refresh")
		.expires_in(expires_in)
		.refresh_expires_in(refresh_expires_in)
		.issued_at(OffsetDateTime::now_utc() - age)
		.build()
		.expect("Failed to build seed token.")
}

pub fn temp_dir(label: &str) -> PathBuf {
	let dir = env::temp_dir().join(format!(
		"dinamis_sdk_it_{label}_{}_{}",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	));

	fs::create_dir_all(&dir).expect("Failed to create temporary directory.");

	dir
}
