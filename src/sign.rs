//! Expiry-aware URL signing on top of a [`SigningSession`].
//!
//! [`UrlSigner::sign_urls`] partitions its input without touching the network: URLs outside the
//! storage domain and URLs that already carry a signature pass through, cached signatures with
//! more than the TTL margin left are reused, and everything else is sent to the signing service
//! in chunks of at most `max_urls`. A chunk whose response omits a requested URL fails the whole
//! call and leaves the cache untouched for that chunk.

pub mod batch;
pub mod cache;
pub mod classify;
pub mod document;
pub mod vrt;

pub use cache::{SignedUrl, UrlCache};
pub use classify::{UrlKind, classify};
pub use document::Signable;
pub use vrt::{find_storage_urls, is_vrt_string};

// crates.io
use regex::Regex;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{HttpTransport, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::{self, SigningSession},
	settings::Settings,
	sign::batch::{SIGN_URLS_ROUTE, SignUrlsResponse},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// URL signer specialized for the crate's default reqwest transport stack.
pub type ReqwestUrlSigner = UrlSigner<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Signs storage URLs and documents that reference them.
pub struct UrlSigner<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	session: Arc<SigningSession<C, M>>,
	cache: Arc<UrlCache>,
	ttl_margin: Duration,
	max_urls: usize,
	url_duration: u64,
	storage_domain: String,
	storage_pattern: Regex,
}
impl<C, M> UrlSigner<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a signer with a fresh cache, tuned by `settings`.
	pub fn new(session: Arc<SigningSession<C, M>>, settings: &Settings) -> Result<Self> {
		Ok(Self {
			session,
			cache: Default::default(),
			ttl_margin: settings.ttl_margin,
			max_urls: settings.max_urls.max(1),
			url_duration: settings.url_duration,
			storage_domain: settings.storage_domain.clone(),
			storage_pattern: vrt::storage_url_pattern(&settings.storage_domain)
				.map_err(ConfigError::from)?,
		})
	}

	/// Shares `cache` with other signers.
	pub fn with_cache(mut self, cache: Arc<UrlCache>) -> Self {
		self.cache = cache;

		self
	}

	/// Signed-URL cache backing this signer.
	pub fn cache(&self) -> &Arc<UrlCache> {
		&self.cache
	}

	/// Session used for signing calls.
	pub fn session(&self) -> &Arc<SigningSession<C, M>> {
		&self.session
	}

	/// Maps every input URL to a URL usable for reading.
	///
	/// Foreign and already-signed URLs map to themselves; duplicates collapse.
	pub async fn sign_urls<I, S>(&self, urls: I) -> Result<HashMap<String, String>>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let (mut out, signed) = self.resolve(urls).await?;

		out.extend(signed.into_iter().map(|(url, entry)| (url, entry.href)));

		Ok(out)
	}

	/// Returns signed URLs with their expiry for the managed URLs among `urls`.
	///
	/// Foreign and already-signed URLs are left out.
	pub async fn get_signed_urls<I, S>(&self, urls: I) -> Result<HashMap<String, SignedUrl>>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		Ok(self.resolve(urls).await?.1)
	}

	/// Signs one URL, or every storage URL inside a VRT document.
	pub async fn sign_string(&self, text: &str) -> Result<String> {
		if is_vrt_string(text) {
			return self.sign_vrt_string(text).await;
		}

		let mut signed = self.sign_urls([text]).await?;

		Ok(signed.remove(text).unwrap_or_else(|| text.to_owned()))
	}

	/// Signs every storage URL embedded in `vrt` with a single batch.
	pub async fn sign_vrt_string(&self, vrt: &str) -> Result<String> {
		let spans = find_storage_urls(vrt, &self.storage_pattern);

		tracing::debug!(urls = spans.len(), "Signing URLs embedded in a VRT.");

		if spans.is_empty() {
			return Ok(vrt.to_owned());
		}

		let signed = self.sign_urls(spans.iter().map(|span| &vrt[span.clone()])).await?;

		Ok(vrt::substitute(vrt, &spans, &signed))
	}

	/// Returns a signed copy of `value`; the input stays untouched.
	pub async fn sign<T>(&self, value: &T) -> Result<T>
	where
		T: Signable,
	{
		let mut copy = value.clone();

		self.sign_in_place(&mut copy).await?;

		Ok(copy)
	}

	/// Rewrites every URL referenced by `value` with its signed counterpart.
	pub async fn sign_in_place<T>(&self, value: &mut T) -> Result<()>
	where
		T: Signable,
	{
		let signed = self.sign_urls(value.extract_urls()).await?;

		value.rewrite_urls(&signed);

		Ok(())
	}

	/// Returns a signed copy of a JSON document: kerchunk references, STAC items and
	/// collections, or feature collections. Other objects come back unchanged; non-objects are
	/// rejected.
	pub async fn sign_json(&self, value: &Value) -> Result<Value> {
		ensure_document(value)?;

		self.sign(value).await
	}

	/// In-place counterpart of [`UrlSigner::sign_json`].
	pub async fn sign_json_in_place(&self, value: &mut Value) -> Result<()> {
		ensure_document(value)?;

		self.sign_in_place(value).await
	}

	async fn resolve<I, S>(
		&self,
		urls: I,
	) -> Result<(HashMap<String, String>, HashMap<String, SignedUrl>)>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		const KIND: FlowKind = FlowKind::SignUrls;

		let now = OffsetDateTime::now_utc();
		let mut passthrough = HashMap::new();
		let mut signed = HashMap::new();
		let mut pending = Vec::new();
		let mut queued = HashSet::new();

		for url in urls {
			let url = url.as_ref();

			if classify(url, &self.storage_domain).passes_through() {
				passthrough.insert(url.to_owned(), url.to_owned());

				continue;
			}

			match self.cache.get_usable(url, now, self.ttl_margin) {
				Some(entry) => {
					signed.insert(url.to_owned(), entry);
				},
				None =>
					if queued.insert(url.to_owned()) {
						pending.push(url.to_owned());
					},
			}
		}

		tracing::debug!(
			passthrough = passthrough.len(),
			cached = signed.len(),
			pending = pending.len(),
			"Partitioned URLs for signing."
		);

		if pending.is_empty() {
			return Ok((passthrough, signed));
		}

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = FlowSpan::new(KIND, "sign_urls")
			.instrument(async {
				let chunks = pending.chunks(self.max_urls).collect::<Vec<_>>();

				for (index, chunk) in chunks.iter().enumerate() {
					tracing::debug!(
						chunk = index + 1,
						chunks = chunks.len(),
						urls = chunk.len(),
						"Signing chunk."
					);

					let fresh = self.sign_chunk(chunk).await?;

					self.cache.extend(fresh.clone());

					signed.extend(fresh.into_iter().filter(|(url, _)| queued.contains(url)));
				}

				Ok::<_, Error>(())
			})
			.await;

		obs::record_result(KIND, result)?;

		Ok((passthrough, signed))
	}

	async fn sign_chunk(&self, chunk: &[String]) -> Result<HashMap<String, SignedUrl>> {
		let duration = self.url_duration.to_string();
		let query = batch::query(chunk, &duration);
		let response = self.session.post(SIGN_URLS_ROUTE, &query).await?;
		let body = session::decode::<SignUrlsResponse>(&response)?;

		Ok(body.into_signed(chunk)?)
	}
}
#[cfg(feature = "reqwest")]
impl UrlSigner<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds the session and signer described by `settings`.
	pub fn from_settings(settings: &Settings) -> Result<Self> {
		Self::new(Arc::new(SigningSession::from_settings(settings)?), settings)
	}

	/// Builds a signer from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_settings(&Settings::from_env()?)
	}
}
impl<C, M> Debug for UrlSigner<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UrlSigner")
			.field("session", &self.session)
			.field("cached", &self.cache.len())
			.field("ttl_margin", &self.ttl_margin)
			.field("max_urls", &self.max_urls)
			.field("storage_domain", &self.storage_domain)
			.finish()
	}
}

/// Rejects JSON values that cannot hold a signable document.
fn ensure_document(value: &Value) -> Result<()> {
	let kind = match value {
		Value::Object(_) => return Ok(()),
		Value::Null => "null",
		Value::Bool(_) => "bool",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
	};

	Err(Error::UnsupportedInput { kind })
}
