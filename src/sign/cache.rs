//! Process-wide cache of signed URLs keyed by their unsigned source URL.

// self
use crate::_prelude::*;

/// Signed href together with the instant it stops working.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedUrl {
	/// Pre-signed URL granting read access.
	pub href: String,
	/// Expiry reported by the signing service.
	pub expiry: OffsetDateTime,
}
impl SignedUrl {
	/// Remaining validity at `now`; negative once expired.
	pub fn ttl_at(&self, now: OffsetDateTime) -> Duration {
		self.expiry - now
	}

	/// Whether more than `margin` of validity remains at `now`.
	pub fn is_usable_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		self.ttl_at(now) > margin
	}
}

/// Unbounded map of source URL to [`SignedUrl`].
///
/// Entries are replaced on re-sign and never evicted. The lock is never held across an await.
#[derive(Debug, Default)]
pub struct UrlCache {
	entries: RwLock<HashMap<String, SignedUrl>>,
}
impl UrlCache {
	/// Returns the entry for `url` when it is still usable at `now` with `margin` to spare.
	pub fn get_usable(
		&self,
		url: &str,
		now: OffsetDateTime,
		margin: Duration,
	) -> Option<SignedUrl> {
		self.entries.read().get(url).filter(|entry| entry.is_usable_at(now, margin)).cloned()
	}

	/// Returns the entry for `url` regardless of expiry.
	pub fn get(&self, url: &str) -> Option<SignedUrl> {
		self.entries.read().get(url).cloned()
	}

	/// Stores every entry, replacing older ones.
	pub fn extend<I>(&self, entries: I)
	where
		I: IntoIterator<Item = (String, SignedUrl)>,
	{
		self.entries.write().extend(entries);
	}

	/// Number of cached source URLs.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Whether nothing has been cached yet.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
