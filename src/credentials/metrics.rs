// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for credential acquisitions.
#[derive(Debug, Default)]
pub struct CredentialMetrics {
	refresh_attempts: AtomicU64,
	refresh_successes: AtomicU64,
	refresh_failures: AtomicU64,
	reauthentications: AtomicU64,
}
impl CredentialMetrics {
	/// Returns the total number of refresh grant calls.
	pub fn refresh_attempts(&self) -> u64 {
		self.refresh_attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh calls that produced a token.
	pub fn refresh_successes(&self) -> u64 {
		self.refresh_successes.load(Ordering::Relaxed)
	}

	/// Returns the number of failed refresh calls.
	pub fn refresh_failures(&self) -> u64 {
		self.refresh_failures.load(Ordering::Relaxed)
	}

	/// Returns the number of device logins started.
	pub fn reauthentications(&self) -> u64 {
		self.reauthentications.load(Ordering::Relaxed)
	}

	pub(crate) fn record_refresh_attempt(&self) {
		self.refresh_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_success(&self) {
		self.refresh_successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_failure(&self) {
		self.refresh_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_reauthentication(&self) {
		self.reauthentications.fetch_add(1, Ordering::Relaxed);
	}
}
