//! Network-free URL inspection deciding which URLs need a signature.

// self
use crate::_prelude::*;

/// Query parameters whose presence marks a URL as already pre-signed.
pub const SIGNATURE_PARAMS: [&str; 3] =
	["X-Amz-Security-Token", "X-Amz-Signature", "X-Amz-Credential"];

/// Outcome of inspecting one URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UrlKind {
	/// Not hosted on the managed storage domain (or not a URL at all).
	Foreign,
	/// Already carries signature query parameters.
	AlreadySigned,
	/// Managed object that needs a signature.
	Managed,
}
impl UrlKind {
	/// Whether the URL is returned unchanged.
	pub const fn passes_through(self) -> bool {
		!matches!(self, UrlKind::Managed)
	}
}

/// Classifies `url` against `storage_domain`.
///
/// The host must equal the domain or be one of its subdomains. A trailing `/` is ignored.
pub fn classify(url: &str, storage_domain: &str) -> UrlKind {
	let Ok(parsed) = Url::parse(url.trim_end_matches('/')) else {
		return UrlKind::Foreign;
	};
	let Some(host) = parsed.host_str() else {
		return UrlKind::Foreign;
	};

	if !is_managed_host(host, storage_domain) {
		return UrlKind::Foreign;
	}
	if parsed.query_pairs().any(|(name, _)| SIGNATURE_PARAMS.contains(&name.as_ref())) {
		return UrlKind::AlreadySigned;
	}

	UrlKind::Managed
}

fn is_managed_host(host: &str, storage_domain: &str) -> bool {
	let host = host.to_ascii_lowercase();
	let domain = storage_domain.trim_matches('.').to_ascii_lowercase();

	host == domain
		|| host.strip_suffix(domain.as_str()).is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const DOMAIN: &str = "meso.umontpellier.fr";

	#[test]
	fn storage_hosts_are_managed() {
		assert_eq!(
			classify(
				"https://acc.minio-dinamis.apps.okd.crocc.meso.umontpellier.fr/c/a.tif",
				DOMAIN
			),
			UrlKind::Managed
		);
		assert_eq!(classify("https://meso.umontpellier.fr/c/a.tif/", DOMAIN), UrlKind::Managed);
	}

	#[test]
	fn lookalike_and_unparsable_urls_are_foreign() {
		assert_eq!(classify("https://evilmeso.umontpellier.fr/a.tif", DOMAIN), UrlKind::Foreign);
		assert_eq!(classify("https://example.com/a.tif", DOMAIN), UrlKind::Foreign);
		assert_eq!(classify("not a url", DOMAIN), UrlKind::Foreign);
		assert!(UrlKind::Foreign.passes_through());
	}

	#[test]
	fn signature_markers_mean_already_signed() {
		for marker in SIGNATURE_PARAMS {
			let url = format!("https://s3.meso.umontpellier.fr/c/a.tif?{marker}=abc");

			assert_eq!(classify(&url, DOMAIN), UrlKind::AlreadySigned);
		}

		assert_eq!(
			classify("https://s3.meso.umontpellier.fr/c/a.tif?X-Amz-Date=1", DOMAIN),
			UrlKind::Managed
		);
	}
}
