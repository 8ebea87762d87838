//! Storage contract for the persisted token plus the built-in file and memory backends.

pub mod file;
pub mod memory;

pub use file::{ApiKeyRing, ApiKeyStorage, FileStore};
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::Token};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable single-record storage for the current [`Token`].
///
/// Only the credential manager writes through this contract; everything else reads the bearer
/// string the manager hands out.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Loads the persisted token, if one exists.
	fn load(&self) -> StoreFuture<'_, Option<Token>>;

	/// Replaces the persisted token.
	fn save(&self, token: Token) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`TokenStore`] implementations and the API key ring.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Stored payload could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Filesystem or backend failure.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as _;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "disk full".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("disk full"));

		let source = error.source().expect("Crate error should expose the store error as source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
