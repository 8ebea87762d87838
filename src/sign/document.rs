//! Documents whose URLs can be signed in place or on a copy.

// crates.io
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Closed contract for values that reference storage URLs.
pub trait Signable
where
	Self: Clone,
{
	/// URLs referenced by the value, duplicates allowed.
	fn extract_urls(&self) -> Vec<String>;

	/// Replaces every URL found in `signed` with its signed counterpart.
	fn rewrite_urls(&mut self, signed: &HashMap<String, String>);
}
impl Signable for String {
	fn extract_urls(&self) -> Vec<String> {
		vec![self.clone()]
	}

	fn rewrite_urls(&mut self, signed: &HashMap<String, String>) {
		if let Some(href) = signed.get(self.as_str()) {
			self.clone_from(href);
		}
	}
}
impl Signable for Value {
	fn extract_urls(&self) -> Vec<String> {
		let Value::Object(map) = self else {
			return Vec::new();
		};

		match Shape::of(map) {
			Shape::Kerchunk => map
				.get("templates")
				.and_then(Value::as_object)
				.map(|templates| {
					templates.values().filter_map(Value::as_str).map(str::to_owned).collect()
				})
				.unwrap_or_default(),
			Shape::Assets => asset_hrefs(map),
			Shape::FeatureCollection => map
				.get("features")
				.and_then(Value::as_array)
				.into_iter()
				.flatten()
				.filter_map(Value::as_object)
				.flat_map(asset_hrefs)
				.collect(),
			Shape::Unsupported => Vec::new(),
		}
	}

	fn rewrite_urls(&mut self, signed: &HashMap<String, String>) {
		let Value::Object(map) = self else {
			return;
		};

		match Shape::of(map) {
			Shape::Kerchunk =>
				if let Some(Value::Object(templates)) = map.get_mut("templates") {
					templates.values_mut().for_each(|value| rewrite_str(value, signed));
				},
			Shape::Assets => rewrite_asset_hrefs(map, signed),
			Shape::FeatureCollection =>
				if let Some(Value::Array(features)) = map.get_mut("features") {
					for feature in features {
						if let Value::Object(feature) = feature {
							rewrite_asset_hrefs(feature, signed);
						}
					}
				},
			Shape::Unsupported => (),
		}
	}
}
impl<T> Signable for Vec<T>
where
	T: Signable,
{
	fn extract_urls(&self) -> Vec<String> {
		self.iter().flat_map(Signable::extract_urls).collect()
	}

	fn rewrite_urls(&mut self, signed: &HashMap<String, String>) {
		self.iter_mut().for_each(|item| item.rewrite_urls(signed));
	}
}

/// JSON layouts that carry storage URLs, checked in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
	/// Kerchunk reference file: `version`, `templates`, and `refs` keys.
	Kerchunk,
	/// STAC item or collection: an `assets` map of objects with `href`.
	Assets,
	/// GeoJSON feature collection whose features carry `assets`.
	FeatureCollection,
	Unsupported,
}
impl Shape {
	fn of(map: &Map<String, Value>) -> Self {
		if ["version", "templates", "refs"].iter().all(|key| map.contains_key(*key)) {
			return Shape::Kerchunk;
		}
		if map.get("assets").is_some_and(Value::is_object) {
			return Shape::Assets;
		}
		if map.get("type").and_then(Value::as_str) == Some("FeatureCollection")
			&& map.get("features").and_then(Value::as_array).is_some_and(|f| !f.is_empty())
		{
			return Shape::FeatureCollection;
		}

		Shape::Unsupported
	}
}

fn asset_hrefs(map: &Map<String, Value>) -> Vec<String> {
	map.get("assets")
		.and_then(Value::as_object)
		.into_iter()
		.flat_map(|assets| assets.values())
		.filter_map(|asset| asset.get("href").and_then(Value::as_str))
		.map(str::to_owned)
		.collect()
}

fn rewrite_asset_hrefs(map: &mut Map<String, Value>, signed: &HashMap<String, String>) {
	let Some(Value::Object(assets)) = map.get_mut("assets") else {
		return;
	};

	for asset in assets.values_mut() {
		if let Some(href) = asset.get_mut("href") {
			rewrite_str(href, signed);
		}
	}
}

fn rewrite_str(value: &mut Value, signed: &HashMap<String, String>) {
	if let Some(href) = value.as_str().and_then(|url| signed.get(url)) {
		*value = Value::String(href.clone());
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn signed(urls: &[&str]) -> HashMap<String, String> {
		urls.iter().map(|url| (url.to_string(), format!("{url}?sig"))).collect()
	}

	#[test]
	fn kerchunk_templates_are_signed() {
		let mut refs = json!({
			"version": 1,
			"templates": { "a": "https://s3.example.org/a.nc", "n": 3 },
			"refs": { "x/0": ["{{a}}", 0, 10] }
		});

		assert_eq!(refs.extract_urls(), ["https://s3.example.org/a.nc"]);

		refs.rewrite_urls(&signed(&["https://s3.example.org/a.nc"]));

		assert_eq!(refs["templates"]["a"], "https://s3.example.org/a.nc?sig");
		assert_eq!(refs["refs"]["x/0"][0], "{{a}}");
	}

	#[test]
	fn items_and_feature_collections_sign_asset_hrefs() {
		let item = json!({
			"type": "Feature",
			"assets": { "b1": { "href": "https://s3.example.org/b1.tif" } }
		});
		let mut collection = json!({
			"type": "FeatureCollection",
			"features": [
				item.clone(),
				{
					"type": "Feature",
					"assets": { "b2": { "href": "https://s3.example.org/b2.tif" } }
				}
			]
		});

		assert_eq!(collection.extract_urls().len(), 2);

		collection.rewrite_urls(&signed(&["https://s3.example.org/b2.tif"]));

		assert_eq!(
			collection["features"][0]["assets"]["b1"]["href"],
			"https://s3.example.org/b1.tif"
		);
		assert_eq!(
			collection["features"][1]["assets"]["b2"]["href"],
			"https://s3.example.org/b2.tif?sig"
		);
	}

	#[test]
	fn unsupported_shapes_are_left_alone() {
		let mut value = json!({ "type": "Unknown", "href": "https://s3.example.org/x" });
		let before = value.clone();

		assert!(value.extract_urls().is_empty());

		value.rewrite_urls(&signed(&["https://s3.example.org/x"]));

		assert_eq!(value, before);
		assert!(json!([1, 2]).extract_urls().is_empty());
	}

	#[test]
	fn vectors_forward_to_their_items() {
		let mut urls = vec!["https://s3.example.org/a".to_owned(), "https://x.org/b".to_owned()];

		urls.rewrite_urls(&signed(&["https://s3.example.org/a"]));

		assert_eq!(urls, ["https://s3.example.org/a?sig", "https://x.org/b"]);
	}
}
