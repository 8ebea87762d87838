//! Storage URLs embedded in GDAL VRT mosaic descriptors.

// std
use std::ops::Range;
// crates.io
use regex::Regex;
// self
use crate::_prelude::*;

/// Whether `text` looks like a `<VRTDataset>` document.
pub fn is_vrt_string(text: &str) -> bool {
	let text = text.trim();

	text.starts_with("<VRTDataset") && text.ends_with("</VRTDataset>")
}

/// Builds the pattern matching `https` URLs on `storage_domain` or its subdomains.
///
/// A match runs until the next `<`, quote, or whitespace character.
pub fn storage_url_pattern(storage_domain: &str) -> Result<Regex, regex::Error> {
	let domain = regex::escape(storage_domain.trim_matches('.'));

	Regex::new(&format!(r#"https://(?:[A-Za-z0-9-]+\.)*{domain}/[^<\s"]+"#))
}

/// Byte spans of every storage URL found in `text`, in order.
pub fn find_storage_urls(text: &str, pattern: &Regex) -> Vec<Range<usize>> {
	pattern.find_iter(text).map(|m| m.range()).collect()
}

/// Replaces each span with its signed counterpart; spans missing from `signed` are kept.
pub fn substitute(text: &str, spans: &[Range<usize>], signed: &HashMap<String, String>) -> String {
	let mut out = String::with_capacity(text.len());
	let mut cursor = 0;

	for span in spans {
		let url = &text[span.clone()];

		out.push_str(&text[cursor..span.start]);
		out.push_str(signed.get(url).map(String::as_str).unwrap_or(url));

		cursor = span.end;
	}

	out.push_str(&text[cursor..]);

	out
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const VRT: &str = r#"<VRTDataset rasterXSize="2" rasterYSize="2">
  <VRTRasterBand dataType="Byte" band="1">
    <SimpleSource><SourceFilename>/vsicurl/https://acc.minio-dinamis.apps.okd.crocc.meso.umontpellier.fr/spot/a.tif</SourceFilename></SimpleSource>
    <SimpleSource><SourceFilename>/vsicurl/https://acc.minio-dinamis.apps.okd.crocc.meso.umontpellier.fr/spot/b.tif</SourceFilename></SimpleSource>
    <SimpleSource><SourceFilename>/vsicurl/https://example.com/c.tif</SourceFilename></SimpleSource>
  </VRTRasterBand>
</VRTDataset>"#;

	fn pattern() -> Regex {
		storage_url_pattern("meso.umontpellier.fr").expect("Storage pattern should compile.")
	}

	#[test]
	fn detects_vrt_documents() {
		assert!(is_vrt_string(VRT));
		assert!(is_vrt_string(&format!("\n  {VRT}\n")));
		assert!(!is_vrt_string("https://example.com/a.tif"));
	}

	#[test]
	fn finds_only_storage_urls() {
		let spans = find_storage_urls(VRT, &pattern());
		let urls = spans.iter().map(|span| &VRT[span.clone()]).collect::<Vec<_>>();

		assert_eq!(
			urls,
			[
				"https://acc.minio-dinamis.apps.okd.crocc.meso.umontpellier.fr/spot/a.tif",
				"https://acc.minio-dinamis.apps.okd.crocc.meso.umontpellier.fr/spot/b.tif",
			]
		);
	}

	#[test]
	fn substitutes_by_span() {
		let spans = find_storage_urls(VRT, &pattern());
		let first = VRT[spans[0].clone()].to_owned();
		let signed = HashMap::from([(first.clone(), format!("{first}?X-Amz-Signature=s"))]);
		let out = substitute(VRT, &spans, &signed);

		assert!(out.contains("a.tif?X-Amz-Signature=s</SourceFilename>"));
		assert!(out.contains("b.tif</SourceFilename>"));
		assert!(out.contains("https://example.com/c.tif"));
	}
}
