//! Operator-facing presentation of a pending device login.

// std
use std::io::Write;
// crates.io
use qrcode::{QrCode, render::unicode::Dense1x2};
// self
use crate::{_prelude::*, oauth::DeviceAuthorization};

/// Shows the verification URL of a device login to whoever can approve it.
pub trait DevicePrompt
where
	Self: Send + Sync,
{
	/// Called once per device login, before polling starts.
	fn present(&self, device: &DeviceAuthorization);
}

/// Writes the login URL and a QR code to standard error.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalPrompt;
impl TerminalPrompt {
	/// Renders `url` as a QR code made of half-block characters.
	pub fn render_qr(url: &str) -> Option<String> {
		match QrCode::new(url.as_bytes()) {
			Ok(code) => Some(
				code.render::<Dense1x2>()
					.dark_color(Dense1x2::Light)
					.light_color(Dense1x2::Dark)
					.build(),
			),
			Err(e) => {
				tracing::warn!(error = %e, "Unable to render the login URL as a QR code.");

				None
			},
		}
	}
}
impl DevicePrompt for TerminalPrompt {
	fn present(&self, device: &DeviceAuthorization) {
		let url = device.login_url();
		let mut stderr = std::io::stderr().lock();
		let mut lines = vec![format!("Open the following URL to log in:\n\n  {url}\n")];

		if device.verification_uri_complete.is_none() {
			lines.push(format!("Enter the code {} when asked.\n", device.user_code));
		}
		if let Some(qr) = Self::render_qr(url) {
			lines.push(qr);
		}

		for line in lines {
			if let Err(e) = writeln!(stderr, "{line}") {
				tracing::warn!(error = %e, "Unable to write the login prompt.");

				return;
			}
		}
	}
}

/// Keeps every presented login in memory; used by tests and headless callers.
#[derive(Debug, Default)]
pub struct RecordingPrompt {
	presented: Mutex<Vec<DeviceAuthorization>>,
}
impl RecordingPrompt {
	/// Device logins presented so far, oldest first.
	pub fn presented(&self) -> Vec<DeviceAuthorization> {
		self.presented.lock().clone()
	}

	/// Login URL of the latest presented device login.
	pub fn last_login_url(&self) -> Option<String> {
		self.presented.lock().last().map(|device| device.login_url().to_owned())
	}
}
impl DevicePrompt for RecordingPrompt {
	fn present(&self, device: &DeviceAuthorization) {
		self.presented.lock().push(device.clone());
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::TokenSecret;

	fn device(complete: Option<&str>) -> DeviceAuthorization {
		DeviceAuthorization {
			device_code: TokenSecret::new("dev"),
			user_code: "ABCD-EFGH".into(),
			verification_uri: "https://sso.example.test/device".into(),
			verification_uri_complete: complete.map(Into::into),
			expires_in: Duration::seconds(600),
			interval: Duration::seconds(5),
		}
	}

	#[test]
	fn login_url_prefers_the_complete_uri() {
		assert_eq!(
			device(Some("https://sso.example.test/device?user_code=ABCD-EFGH")).login_url(),
			"https://sso.example.test/device?user_code=ABCD-EFGH"
		);
		assert_eq!(device(None).login_url(), "https://sso.example.test/device");
	}

	#[test]
	fn recording_prompt_keeps_presentations() {
		let prompt = RecordingPrompt::default();

		prompt.present(&device(None));

		assert_eq!(prompt.presented().len(), 1);
		assert_eq!(prompt.last_login_url().as_deref(), Some("https://sso.example.test/device"));
	}

	#[test]
	fn qr_codes_render_as_text() {
		let qr = TerminalPrompt::render_qr("https://sso.example.test/device")
			.expect("Short URLs should fit in a QR code.");

		assert!(qr.lines().count() > 10);
	}
}
