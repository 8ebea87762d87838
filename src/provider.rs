//! OAuth 2.0 provider descriptor: the identity provider endpoints and public client the
//! credential manager talks to.

pub mod builder;

pub use builder::*;

// self
use crate::{_prelude::*, error::ConfigError};

/// Keycloak server hosting the DINAMIS realm.
pub const KEYCLOAK_SERVER_URL: &str =
	"https://keycloak-dinamis.apps.okd.crocc.meso.umontpellier.fr/auth";
/// Keycloak realm name.
pub const KEYCLOAK_REALM: &str = "dinamis";
/// Public client registered for device logins.
pub const DEVICE_CLIENT_ID: &str = "gdal";
/// Scope requested so refresh tokens survive across sessions.
pub const OFFLINE_ACCESS: &str = "offline_access";

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Device authorization endpoint (RFC 8628).
	pub device_authorization: Url,
	/// Token endpoint used for refreshes and device-code polling.
	pub token: Url,
}

/// Immutable provider descriptor consumed by the credential manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Descriptor identifier (the realm name for Keycloak).
	pub id: String,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Public client identifier.
	pub client_id: String,
	/// Scope sent with every grant.
	pub scope: String,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: impl Into<String>) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Descriptor for the DINAMIS Keycloak realm.
	pub fn dinamis() -> Result<Self> {
		Self::keycloak(KEYCLOAK_SERVER_URL, KEYCLOAK_REALM, DEVICE_CLIENT_ID)
	}

	/// Descriptor for a Keycloak realm's OpenID Connect endpoints.
	pub fn keycloak(server_url: &str, realm: &str, client_id: &str) -> Result<Self> {
		let base =
			format!("{}/realms/{realm}/protocol/openid-connect", server_url.trim_end_matches('/'));
		let parse = |raw: String| {
			Url::parse(&raw).map_err(|source| ConfigError::InvalidDescriptor { source })
		};
		let descriptor = Self::builder(realm)
			.device_authorization_endpoint(parse(format!("{base}/auth/device"))?)
			.token_endpoint(parse(format!("{base}/token"))?)
			.client_id(client_id)
			.build()
			.map_err(ConfigError::from)?;

		Ok(descriptor)
	}
}
