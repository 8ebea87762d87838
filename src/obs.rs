//! Observability helpers shared by credential and signing flows.
//!
//! Every flow runs inside a `dinamis_sdk.flow` span carrying the `flow` and `stage` fields. With
//! the `metrics` feature enabled, each attempt, success, and failure also increments the
//! `dinamis_sdk_flow_total` counter labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the SDK.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Refresh-token grant.
	Refresh,
	/// Device-authorization grant (interactive login).
	DeviceAuthorization,
	/// Batch URL signing.
	SignUrls,
	/// API key management calls.
	ApiKeys,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::DeviceAuthorization => "device_authorization",
			FlowKind::SignUrls => "sign_urls",
			FlowKind::ApiKeys => "api_keys",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records the terminal outcome of `result` and passes it through.
pub(crate) fn record_result<T>(kind: FlowKind, result: Result<T>) -> Result<T> {
	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => record_flow_outcome(kind, FlowOutcome::Failure),
	}

	result
}
