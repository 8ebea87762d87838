//! Bounded exponential-backoff retry for signing-service calls.
//!
//! The n-th retry waits `backoff_factor × 2^(n−1)` seconds, except the first retry which is
//! immediate; waits are capped at [`RetryPolicy::backoff_max`]. A `Retry-After` hint on a 413, 429,
//! or 503 response replaces the computed wait.

// self
use crate::{_prelude::*, http::Endpoint};

const RETRY_AFTER_STATUSES: [u16; 3] = [413, 429, 503];

/// Retry budget and backoff shape.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
	/// Retries allowed after the first attempt.
	pub total: u32,
	/// Backoff factor, in seconds.
	pub backoff_factor: f64,
	/// Upper bound for a single wait.
	pub backoff_max: Duration,
	/// Statuses worth retrying.
	pub status_forcelist: Vec<u16>,
}
impl RetryPolicy {
	/// Policy with the default status list and cap.
	pub fn new(total: u32, backoff_factor: f64) -> Self {
		Self { total, backoff_factor, ..Default::default() }
	}

	/// Policy that never retries.
	pub fn none() -> Self {
		Self::new(0, 0.)
	}

	/// Whether `status` belongs to the retry list.
	pub fn is_retryable_status(&self, status: u16) -> bool {
		self.status_forcelist.contains(&status)
	}

	/// Wait before the `retry`-th retry (1-based).
	pub fn backoff(&self, retry: u32) -> Duration {
		if retry <= 1 {
			return Duration::ZERO;
		}

		let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
		let seconds = self.backoff_factor * 2_f64.powi(exponent);

		if !seconds.is_finite() || seconds >= self.backoff_max.as_seconds_f64() {
			return self.backoff_max;
		}

		Duration::seconds_f64(seconds.max(0.))
	}

	fn delay_for(
		&self,
		retry: u32,
		status: Option<u16>,
		retry_after: Option<Duration>,
	) -> Duration {
		match (status, retry_after) {
			(Some(status), Some(hint)) if RETRY_AFTER_STATUSES.contains(&status) =>
				hint.min(self.backoff_max),
			_ => self.backoff(retry),
		}
	}

	/// Runs `operation` until it succeeds, fails with a non-retryable error, or exhausts the
	/// budget.
	///
	/// Retryable errors are transport failures and endpoint failures whose status is absent or in
	/// [`RetryPolicy::status_forcelist`]; the last error is returned once retries are exhausted.
	pub(crate) async fn run<F, Fut, T>(&self, endpoint: Endpoint, mut operation: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut retry = 0;

		loop {
			let err = match operation().await {
				Ok(value) => {
					if retry > 0 {
						tracing::debug!(
							%endpoint,
							attempt = retry + 1,
							"Request succeeded after retry."
						);
					}

					return Ok(value);
				},
				Err(err) => err,
			};
			let Some((status, retry_after)) = err.retry_hint() else {
				return Err(err);
			};

			if status.is_some_and(|s| !self.is_retryable_status(s)) {
				return Err(err);
			}
			if retry >= self.total {
				tracing::warn!(%endpoint, retries = retry, error = %err, "Retries exhausted.");

				return Err(err);
			}

			retry += 1;

			let delay = self.delay_for(retry, status, retry_after);

			tracing::debug!(
				%endpoint,
				retry,
				max_retries = self.total,
				delay_ms = delay.whole_milliseconds() as u64,
				error = %err,
				"Retryable failure, backing off."
			);

			if delay.is_positive() {
				tokio::time::sleep(delay.unsigned_abs()).await;
			}
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			total: 10,
			backoff_factor: 0.8,
			backoff_max: Duration::seconds(120),
			status_forcelist: vec![404, 429, 500, 502, 503, 504],
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;
	use crate::error::{ProtocolError, TransientError};

	fn unavailable(status: u16) -> Error {
		TransientError::Endpoint {
			endpoint: "signing",
			message: "busy".into(),
			status: Some(status),
			retry_after: None,
		}
		.into()
	}

	#[test]
	fn backoff_doubles_after_an_immediate_first_retry() {
		let policy = RetryPolicy::new(10, 0.5);

		assert_eq!(policy.backoff(1), Duration::ZERO);
		assert_eq!(policy.backoff(2), Duration::seconds(1));
		assert_eq!(policy.backoff(3), Duration::seconds(2));
		assert_eq!(policy.backoff(4), Duration::seconds(4));
		assert_eq!(policy.backoff(40), Duration::seconds(120));
	}

	#[test]
	fn retry_after_only_applies_to_throttling_statuses() {
		let policy = RetryPolicy::new(3, 0.5);

		assert_eq!(
			policy.delay_for(2, Some(429), Some(Duration::seconds(3))),
			Duration::seconds(3)
		);
		assert_eq!(
			policy.delay_for(2, Some(500), Some(Duration::seconds(3))),
			Duration::seconds(1)
		);
	}

	#[tokio::test]
	async fn retries_forcelisted_statuses_until_success() {
		let policy = RetryPolicy::new(3, 0.);
		let calls = &AtomicU32::new(0);
		let value = policy
			.run(Endpoint::Signing, move || async move {
				match calls.fetch_add(1, Ordering::SeqCst) {
					0 | 1 => Err(unavailable(503)),
					_ => Ok("signed"),
				}
			})
			.await
			.expect("Third attempt should succeed.");

		assert_eq!(value, "signed");
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn gives_up_after_the_budget() {
		let policy = RetryPolicy::new(2, 0.);
		let calls = &AtomicU32::new(0);
		let err = policy
			.run(Endpoint::Signing, move || async move {
				calls.fetch_add(1, Ordering::SeqCst);

				Err::<(), _>(unavailable(502))
			})
			.await
			.expect_err("Persistent 502 should propagate.");

		assert!(matches!(err, Error::Transient(_)));
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn protocol_errors_are_never_retried() {
		let policy = RetryPolicy::new(5, 0.);
		let calls = &AtomicU32::new(0);
		let err = policy
			.run(Endpoint::Signing, move || async move {
				calls.fetch_add(1, Ordering::SeqCst);

				Err::<(), _>(ProtocolError::EmptyBatch { requested: 1 }.into())
			})
			.await
			.expect_err("Protocol violation should propagate.");

		assert!(matches!(err, Error::Protocol(_)));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
