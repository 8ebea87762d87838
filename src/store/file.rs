//! JSON files under the configuration directory: the `.jwt` token record and the
//! `.apikeystorage` key ring.

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
};
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{ApiKey, Token},
	store::{StoreError, StoreFuture, TokenStore},
};

/// File name of the persisted token record.
pub const TOKEN_FILE_NAME: &str = ".jwt";
/// File name of the API key ring.
pub const API_KEY_FILE_NAME: &str = ".apikeystorage";

/// Single JSON document replaced atomically on every write.
#[derive(Clone, Debug)]
struct JsonFile {
	path: PathBuf,
}
impl JsonFile {
	fn open(path: PathBuf) -> Result<Self, StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(Self { path })
	}

	fn read<T>(&self) -> Result<Option<T>, StoreError>
	where
		T: DeserializeOwned,
	{
		let bytes = match fs::read(&self.path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to read {}: {e}", self.path.display()),
				}),
		};

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		let de = &mut serde_json::Deserializer::from_slice(&bytes);

		serde_path_to_error::deserialize(de).map(Some).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", self.path.display()),
		})
	}

	fn write<T>(&self, value: &T) -> Result<(), StoreError>
	where
		T: Serialize,
	{
		let serialized = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize {}: {e}", self.path.display()),
		})?;
		let mut tmp_path = self.path.clone().into_os_string();

		tmp_path.push(".tmp");

		let tmp_path = PathBuf::from(tmp_path);

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}

/// Persists the current token to a JSON file.
#[derive(Clone, Debug)]
pub struct FileStore {
	file: JsonFile,
}
impl FileStore {
	/// Opens a store at `path`, creating its parent directory when needed.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		Ok(Self { file: JsonFile::open(path.into())? })
	}

	/// Opens the `.jwt` record inside `dir`.
	pub fn in_dir(dir: &Path) -> Result<Self, StoreError> {
		Self::open(dir.join(TOKEN_FILE_NAME))
	}

	/// Location of the token record.
	pub fn path(&self) -> &Path {
		&self.file.path
	}
}
impl TokenStore for FileStore {
	fn load(&self) -> StoreFuture<'_, Option<Token>> {
		Box::pin(async move { self.file.read() })
	}

	fn save(&self, token: Token) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.file.write(&token)?;

			tracing::debug!(path = %self.file.path.display(), "Token saved.");

			Ok(())
		})
	}
}

/// API keys indexed by the signing endpoint they were issued for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRing {
	/// Endpoint → key pair.
	#[serde(default)]
	pub api_keys: BTreeMap<String, ApiKey>,
}

/// File-backed [`ApiKeyRing`].
#[derive(Clone, Debug)]
pub struct ApiKeyStorage {
	file: JsonFile,
}
impl ApiKeyStorage {
	/// Opens the key ring at `path`, creating its parent directory when needed.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		Ok(Self { file: JsonFile::open(path.into())? })
	}

	/// Opens the `.apikeystorage` ring inside `dir`.
	pub fn in_dir(dir: &Path) -> Result<Self, StoreError> {
		Self::open(dir.join(API_KEY_FILE_NAME))
	}

	/// Reads the whole ring; a missing file is an empty ring.
	pub fn load(&self) -> Result<ApiKeyRing, StoreError> {
		Ok(self.file.read()?.unwrap_or_default())
	}

	/// Key stored for `endpoint`.
	pub fn get(&self, endpoint: &str) -> Result<Option<ApiKey>, StoreError> {
		Ok(self.load()?.api_keys.remove(endpoint))
	}

	/// Stores `key` for `endpoint`, replacing any previous key.
	pub fn insert(&self, endpoint: &str, key: ApiKey) -> Result<(), StoreError> {
		let mut ring = self.load()?;

		ring.api_keys.insert(endpoint.to_owned(), key);

		self.file.write(&ring)
	}

	/// Drops the key stored for `endpoint`, returning it.
	pub fn remove(&self, endpoint: &str) -> Result<Option<ApiKey>, StoreError> {
		let mut ring = self.load()?;
		let removed = ring.api_keys.remove(endpoint);

		if removed.is_some() {
			self.file.write(&ring)?;
		}

		Ok(removed)
	}
}
