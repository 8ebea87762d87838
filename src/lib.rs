//! Time-limited, pre-signed read access to DINAMIS object storage: an OAuth 2.0 device-flow
//! credential manager, an expiry-aware signed-URL cache, and the signing-service session that ties
//! them together.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod credentials;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod session;
pub mod settings;
pub mod sign;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::Token,
		credentials::{CredentialManager, RecordingPrompt},
		http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
		provider::ProviderDescriptor,
		store::{MemoryStore, TokenStore},
	};

	/// Credential manager type alias used by reqwest-backed tests.
	pub type ReqwestTestManager = CredentialManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a descriptor whose endpoints live on the provided mock server base URL.
	pub fn test_descriptor(base_url: &str) -> ProviderDescriptor {
		let base = base_url.trim_end_matches('/');

		ProviderDescriptor::builder("test-realm")
			.device_authorization_endpoint(
				Url::parse(&format!("{base}/device")).expect("Failed to parse device endpoint."),
			)
			.token_endpoint(
				Url::parse(&format!("{base}/token")).expect("Failed to parse token endpoint."),
			)
			.client_id("test-client")
			.build()
			.expect("Failed to build test provider descriptor.")
	}

	/// Constructs a [`CredentialManager`] backed by an in-memory store (optionally seeded) and a
	/// recording device prompt.
	pub fn build_reqwest_test_manager(
		descriptor: ProviderDescriptor,
		seed: Option<Token>,
	) -> (ReqwestTestManager, Arc<MemoryStore>, Arc<RecordingPrompt>) {
		let store_backend = Arc::new(MemoryStore::seeded(seed));
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let prompt = Arc::new(RecordingPrompt::default());
		let manager = CredentialManager::with_http_client(
			store,
			descriptor,
			ReqwestHttpClient::default(),
			ReqwestTransportErrorMapper,
		)
		.with_prompt(prompt.clone());

		(manager, store_backend, prompt)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		path::{Path, PathBuf},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
