//! Source resolution
//!
//! Turns a [`SourceSpec`] into something the engine can open and starts the
//! engine on it. Bundled assets are copied byte-for-byte into the cache
//! directory first; the file name is derived from the asset lookup key, so
//! the same asset always lands at the same path and every resolution
//! rewrites it.

use crate::engine::{EngineSource, PlaybackEngine};
use crate::{Error, Result, SourceSpec};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Read access to bundled resources
pub trait AssetBundle: Send + Sync {
    /// Platform lookup key for an asset path as the UI names it
    fn lookup_key(&self, asset: &str) -> String;

    /// Open the resource behind a lookup key
    fn open(&self, key: &str) -> io::Result<Box<dyn Read + Send>>;
}

/// Assets stored as plain files under a root directory
#[derive(Debug, Clone)]
pub struct DirAssetBundle {
    root: PathBuf,
    prefix: String,
}

impl DirAssetBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefix: String::new(),
        }
    }

    /// Prepend a fixed prefix to every lookup key (e.g. `flutter_assets/`)
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

impl AssetBundle for DirAssetBundle {
    fn lookup_key(&self, asset: &str) -> String {
        format!("{}{}", self.prefix, asset.trim_start_matches('/'))
    }

    fn open(&self, key: &str) -> io::Result<Box<dyn Read + Send>> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("asset key escapes bundle root: {key}"),
            ));
        }
        Ok(Box::new(File::open(self.root.join(relative))?))
    }
}

/// Cache file name for an asset lookup key
pub fn cache_file_name(key: &str) -> String {
    format!("{}.mp4", URL_SAFE_NO_PAD.encode(key.as_bytes()))
}

/// True when the URI names a network resource rather than a local file
pub fn is_remote_uri(uri: &str) -> bool {
    match Url::parse(uri) {
        Ok(url) => !matches!(url.scheme(), "file"),
        Err(_) => false,
    }
}

/// Picks the source strategy and starts the engine on it
pub struct SourceResolver {
    assets: Arc<dyn AssetBundle>,
    cache_dir: PathBuf,
}

impl SourceResolver {
    pub fn new(assets: Arc<dyn AssetBundle>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets,
            cache_dir: cache_dir.into(),
        }
    }

    /// Resolve the source and start engine playback from it
    #[instrument(skip(self, engine), fields(kind = source.kind()))]
    pub fn start(&self, source: &SourceSpec, engine: &dyn PlaybackEngine) -> Result<EngineSource> {
        let resolved = self.resolve(source)?;
        engine.start(resolved.clone())?;
        Ok(resolved)
    }

    /// Resolve the source without starting anything
    pub fn resolve(&self, source: &SourceSpec) -> Result<EngineSource> {
        match source {
            SourceSpec::AuthToken { app_id, file_id } => {
                debug!(app_id, file_id = %file_id, "Using auth token source");
                Ok(EngineSource::Auth {
                    app_id: *app_id,
                    file_id: file_id.clone(),
                })
            }
            SourceSpec::AssetRef { asset_path } => {
                let path = self.materialize_asset(asset_path)?;
                Ok(EngineSource::LocalFile(path))
            }
            SourceSpec::DirectUri { uri } => {
                debug!(uri = %uri, remote = is_remote_uri(uri), "Using direct URI source");
                Ok(EngineSource::Uri(uri.clone()))
            }
        }
    }

    fn materialize_asset(&self, asset_path: &str) -> Result<PathBuf> {
        let key = self.assets.lookup_key(asset_path);
        let mut reader = self
            .assets
            .open(&key)
            .map_err(|e| Error::source_failed(format!("cannot open asset {key}: {e}")))?;

        fs::create_dir_all(&self.cache_dir).map_err(|e| {
            Error::source_failed(format!(
                "cannot create cache dir {}: {e}",
                self.cache_dir.display()
            ))
        })?;

        let path = self.cache_dir.join(cache_file_name(&key));
        match copy_to(&mut reader, &path) {
            Ok(bytes) => {
                info!(asset = %key, path = %path.display(), bytes, "Asset copied to cache");
                Ok(path)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&path) {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        warn!(
                            path = %path.display(),
                            error = %cleanup,
                            "Failed to remove partial asset copy"
                        );
                    }
                }
                Err(Error::source_failed(format!("cannot copy asset {key}: {e}")))
            }
        }
    }
}

fn copy_to(reader: &mut dyn Read, path: &Path) -> io::Result<u64> {
    let mut writer = BufWriter::new(File::create(path)?);
    let bytes = io::copy(reader, &mut writer)?;
    writer.flush()?;
    Ok(bytes)
}
