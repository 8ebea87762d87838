//! In-memory [`TokenStore`] used when no configuration directory is available, and in tests.

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// self
use crate::{
	_prelude::*,
	auth::Token,
	store::{StoreFuture, TokenStore},
};

/// Keeps the token in-process only.
#[derive(Debug, Default)]
pub struct MemoryStore {
	token: RwLock<Option<Token>>,
	saves: AtomicUsize,
}
impl MemoryStore {
	/// Creates a store pre-populated with `token`.
	pub fn seeded(token: Option<Token>) -> Self {
		Self { token: RwLock::new(token), saves: AtomicUsize::new(0) }
	}

	/// Currently stored token.
	pub fn current(&self) -> Option<Token> {
		self.token.read().clone()
	}

	/// Number of successful saves since construction.
	pub fn save_count(&self) -> usize {
		self.saves.load(Ordering::SeqCst)
	}
}
impl TokenStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<Token>> {
		Box::pin(async move { Ok(self.current()) })
	}

	fn save(&self, token: Token) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			*self.token.write() = Some(token);

			self.saves.fetch_add(1, Ordering::SeqCst);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn save_replaces_the_seed() {
		let seed = Token::builder()
			.access_token("old")
			.refresh_token("r")
			.expires_in(60)
			.build()
			.expect("Failed to build seed token.");
		let store = MemoryStore::seeded(Some(seed));
		let replacement = Token::builder()
			.access_token("new")
			.refresh_token("r")
			.expires_in(60)
			.build()
			.expect("Failed to build replacement token.");

		store.save(replacement).await.expect("Memory store save should succeed.");

		let loaded = store.load().await.expect("Memory store load should succeed.");

		assert_eq!(loaded.map(|t| t.access_token.expose().to_owned()).as_deref(), Some("new"));
		assert_eq!(store.save_count(), 1);
	}
}
