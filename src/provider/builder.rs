//! Builder API for assembling provider descriptors.

// self
use crate::{
	_prelude::*,
	provider::{OFFLINE_ACCESS, ProviderDescriptor, ProviderEndpoints},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// Device authorization endpoint is required for interactive logins.
	#[error("Missing device authorization endpoint.")]
	MissingDeviceAuthorizationEndpoint,
	/// Token endpoint is mandatory.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Public clients still identify themselves.
	#[error("Missing client identifier.")]
	MissingClientId,
	/// Endpoints must use HTTP(S).
	#[error("The {endpoint} endpoint must use http or https: {url}.")]
	UnsupportedScheme {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	id: String,
	device_authorization_endpoint: Option<Url>,
	token_endpoint: Option<Url>,
	client_id: Option<String>,
	scope: String,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			device_authorization_endpoint: None,
			token_endpoint: None,
			client_id: None,
			scope: OFFLINE_ACCESS.into(),
		}
	}

	/// Sets the device authorization endpoint.
	pub fn device_authorization_endpoint(mut self, url: Url) -> Self {
		self.device_authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the public client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Overrides the requested scope (defaults to `offline_access`).
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let device_authorization = self
			.device_authorization_endpoint
			.ok_or(ProviderDescriptorError::MissingDeviceAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?;
		let client_id = self
			.client_id
			.filter(|id| !id.trim().is_empty())
			.ok_or(ProviderDescriptorError::MissingClientId)?;
		let descriptor = ProviderDescriptor {
			id: self.id,
			endpoints: ProviderEndpoints { device_authorization, token },
			client_id,
			scope: self.scope,
		};

		validate_endpoint("device authorization", &descriptor.endpoints.device_authorization)?;
		validate_endpoint("token", &descriptor.endpoints.token)?;

		Ok(descriptor)
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	match url.scheme() {
		"http" | "https" => Ok(()),
		_ => Err(ProviderDescriptorError::UnsupportedScheme {
			endpoint: name,
			url: url.to_string(),
		}),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("Failed to parse test URL.")
	}

	#[test]
	fn requires_both_endpoints_and_a_client() {
		let err = ProviderDescriptor::builder("realm")
			.token_endpoint(url("https://idp.example.org/token"))
			.client_id("cli")
			.build()
			.expect_err("Device endpoint should be required.");

		assert_eq!(err, ProviderDescriptorError::MissingDeviceAuthorizationEndpoint);

		let err = ProviderDescriptor::builder("realm")
			.device_authorization_endpoint(url("https://idp.example.org/device"))
			.token_endpoint(url("https://idp.example.org/token"))
			.client_id(" ")
			.build()
			.expect_err("Blank client identifiers should be rejected.");

		assert_eq!(err, ProviderDescriptorError::MissingClientId);
	}

	#[test]
	fn rejects_non_http_schemes() {
		let err = ProviderDescriptor::builder("realm")
			.device_authorization_endpoint(url("ftp://idp.example.org/device"))
			.token_endpoint(url("https://idp.example.org/token"))
			.client_id("cli")
			.build()
			.expect_err("FTP endpoints should be rejected.");

		assert!(matches!(
			err,
			ProviderDescriptorError::UnsupportedScheme { endpoint: "device authorization", .. }
		));
	}
}
