pub mod decode;
pub mod timing;

#[cfg(test)]
pub(crate) mod fixtures;

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::UVec2;
use image::RgbaImage;

/// Extension tried first when resolving a logical name.
const ANIMATED_EXT: &str = "gif";
/// Fallback extension for still images.
const STILL_EXT: &str = "png";
/// Lookup order. Matching is exact, so `Idle.GIF` is not an asset.
const SUPPORTED_EXTS: [&str; 2] = [ANIMATED_EXT, STILL_EXT];

/// Logical name of `file` if it has a supported extension.
fn logical_name(file: &str) -> Option<&str> {
    let (stem, ext) = file.rsplit_once('.')?;
    (SUPPORTED_EXTS.contains(&ext) && !stem.is_empty()).then_some(stem)
}

pub type AssetResult<T> = Result<T, AssetError>;

#[derive(thiserror::Error, Debug)]
pub enum AssetError {
    #[error("no .gif or .png file named '{name}' in asset directory")]
    NotFound { name: String },

    #[error("failed to read '{file}': {source}")]
    Io {
        file: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode '{file}': {source}")]
    Decode {
        file: String,
        #[source]
        source: image::ImageError,
    },
}

// ---------------------------------------------------------------------------
// Asset types
// ---------------------------------------------------------------------------

/// One decoded animation frame (premultiplied RGBA8).
#[derive(Debug, Clone)]
pub struct AnimFrame {
    pub image: RgbaImage,
    /// Display interval in milliseconds, if the file specified one.
    pub delay_ms: Option<u32>,
}

/// Multi-frame animation, immutable once loaded.
#[derive(Debug)]
pub struct AnimationAsset {
    pub name: String,
    pub frames: Vec<AnimFrame>,
    /// Natural playback duration, computed once at load.
    pub duration_ms: u32,
}

impl AnimationAsset {
    /// Effective interval of frame `idx`.
    pub fn frame_ms(&self, idx: usize) -> u32 {
        self.frames
            .get(idx)
            .and_then(|f| f.delay_ms)
            .unwrap_or(timing::DEFAULT_FRAME_MS)
    }
}

/// Single still image (premultiplied RGBA8).
#[derive(Debug)]
pub struct StillImage {
    pub name: String,
    pub image: RgbaImage,
}

/// Anything the cache can hand out.
#[derive(Debug, Clone)]
pub enum Asset {
    Still(Arc<StillImage>),
    Animation(Arc<AnimationAsset>),
}

impl Asset {
    pub fn name(&self) -> &str {
        match self {
            Asset::Still(s) => &s.name,
            Asset::Animation(a) => &a.name,
        }
    }

    /// Time for exactly one loop. A still image counts as a single frame
    /// without an explicit interval.
    pub fn natural_duration(&self) -> u32 {
        match self {
            Asset::Still(_) => timing::DEFAULT_FRAME_MS,
            Asset::Animation(a) => a.duration_ms,
        }
    }

    /// Identity of the shared allocation, stable for the asset's lifetime.
    pub fn id(&self) -> usize {
        match self {
            Asset::Still(s) => Arc::as_ptr(s) as *const () as usize,
            Asset::Animation(a) => Arc::as_ptr(a) as *const () as usize,
        }
    }

    /// True when both values refer to the same cached allocation.
    #[cfg(test)]
    pub fn same_as(&self, other: &Asset) -> bool {
        self.id() == other.id()
    }
}

// ---------------------------------------------------------------------------
// Asset directory
// ---------------------------------------------------------------------------

/// Where asset files come from. File names are relative, e.g. `idle.gif`.
pub trait AssetSource {
    fn exists(&self, file: &str) -> bool;
    fn read(&self, file: &str) -> io::Result<Vec<u8>>;
    /// All file names in the source.
    fn list(&self) -> io::Result<Vec<String>>;

    /// Human-readable origin for log lines.
    fn describe(&self) -> String {
        "memory".to_owned()
    }
}

/// Asset directory on disk, one per companion identity.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for DirSource {
    fn exists(&self, file: &str) -> bool {
        self.root.join(file).is_file()
    }

    fn read(&self, file: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(file))
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_owned());
                }
            }
        }
        Ok(names)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

type CacheKey = (String, Option<UVec2>);

/// Loads assets by logical name and memoizes them by (name, target size).
///
/// Single-threaded: only the event loop touches the cache. Sharing it across
/// threads would need one lock around the whole lookup-or-insert in `try_load`.
pub struct AssetCache<S = DirSource> {
    source: S,
    entries: HashMap<CacheKey, Asset>,
}

impl<S: AssetSource> AssetCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: HashMap::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Load `name`, fitted into `size` if given. Failures are logged and
    /// reported as `None` so callers can treat the feature as absent.
    pub fn load(&mut self, name: &str, size: Option<UVec2>) -> Option<Asset> {
        match self.try_load(name, size) {
            Ok(asset) => Some(asset),
            Err(e) => {
                log::warn!("Asset '{name}' unavailable: {e}");
                None
            }
        }
    }

    pub fn try_load(&mut self, name: &str, size: Option<UVec2>) -> AssetResult<Asset> {
        let key = (name.to_owned(), size);
        if let Some(asset) = self.entries.get(&key) {
            return Ok(asset.clone());
        }

        let asset = self.read_asset(name, size)?;
        log::info!(
            "Loaded {} '{}' from {} ({}ms)",
            match asset {
                Asset::Still(_) => "image",
                Asset::Animation(_) => "animation",
            },
            asset.name(),
            self.source.describe(),
            asset.natural_duration()
        );
        self.entries.insert(key, asset.clone());
        Ok(asset)
    }

    /// File that `name` resolves to: animated format first, then still image.
    pub fn resolve(&self, name: &str) -> Option<String> {
        SUPPORTED_EXTS
            .iter()
            .map(|ext| format!("{name}.{ext}"))
            .find(|file| self.source.exists(file))
    }

    /// Distinct logical names across both supported formats, sorted.
    pub fn list_available(&self) -> Vec<String> {
        let files = match self.source.list() {
            Ok(files) => files,
            Err(e) => {
                log::warn!("Cannot list asset directory: {e}");
                return Vec::new();
            }
        };

        let names: BTreeSet<String> = files
            .iter()
            .filter_map(|file| logical_name(file))
            .map(str::to_owned)
            .collect();

        let names: Vec<String> = names.into_iter().collect();
        log::info!("Available animations: {names:?}");
        names
    }

    /// Evict everything; later loads re-read storage.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn clear(&mut self) {
        self.entries.clear();
        log::info!("Asset cache cleared");
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn read_asset(&self, name: &str, size: Option<UVec2>) -> AssetResult<Asset> {
        let file = self.resolve(name).ok_or_else(|| AssetError::NotFound {
            name: name.to_owned(),
        })?;
        let bytes = self.source.read(&file).map_err(|source| AssetError::Io {
            file: file.clone(),
            source,
        })?;
        let decode_err = |source| AssetError::Decode {
            file: file.clone(),
            source,
        };

        if file.ends_with(ANIMATED_EXT) {
            let frames = decode::decode_gif(&bytes, size).map_err(decode_err)?;
            let duration_ms = timing::natural_duration(&frames);
            Ok(Asset::Animation(Arc::new(AnimationAsset {
                name: name.to_owned(),
                frames,
                duration_ms,
            })))
        } else {
            let image = decode::decode_png(&bytes, size).map_err(decode_err)?;
            Ok(Asset::Still(Arc::new(StillImage {
                name: name.to_owned(),
                image,
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// In-memory source that counts reads.
    #[derive(Default)]
    struct CountingSource {
        files: HashMap<String, Vec<u8>>,
        reads: Cell<usize>,
    }

    impl CountingSource {
        fn with(mut self, file: &str, bytes: Vec<u8>) -> Self {
            self.files.insert(file.to_owned(), bytes);
            self
        }
    }

    impl AssetSource for CountingSource {
        fn exists(&self, file: &str) -> bool {
            self.files.contains_key(file)
        }

        fn read(&self, file: &str) -> io::Result<Vec<u8>> {
            self.reads.set(self.reads.get() + 1);
            self.files
                .get(file)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }

        fn list(&self) -> io::Result<Vec<String>> {
            Ok(self.files.keys().cloned().collect())
        }
    }

    #[test]
    fn cache_hit_returns_same_instance_without_reading() {
        let source = CountingSource::default().with("idle.gif", fixtures::gif_bytes(&[100, 100], 4, 4));
        let mut cache = AssetCache::new(source);

        let size = Some(UVec2::new(8, 8));
        let first = cache.load("idle", size).unwrap();
        let second = cache.load("idle", size).unwrap();

        assert!(first.same_as(&second));
        assert_eq!(cache.source().reads.get(), 1);
        assert_eq!(first.natural_duration(), 200);
    }

    #[test]
    fn animation_duration_comes_from_its_frames() {
        let source = CountingSource::default().with("idle.gif", fixtures::gif_bytes(&[120, 0, 30], 4, 4));
        let mut cache = AssetCache::new(source);

        let Some(Asset::Animation(anim)) = cache.load("idle", None) else {
            panic!("expected animation");
        };
        assert_eq!(anim.duration_ms, 250);
        assert_eq!(
            anim.duration_ms,
            timing::total_duration(anim.frames.iter().map(|f| f.delay_ms))
        );
        assert_eq!(cache.source().reads.get(), 1);
    }

    #[test]
    fn size_is_part_of_the_key() {
        let source = CountingSource::default().with("idle.gif", fixtures::gif_bytes(&[100], 4, 4));
        let mut cache = AssetCache::new(source);

        let small = cache.load("idle", Some(UVec2::new(8, 8))).unwrap();
        let large = cache.load("idle", Some(UVec2::new(16, 16))).unwrap();

        assert!(!small.same_as(&large));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.source().reads.get(), 2);
        match large {
            Asset::Animation(a) => assert_eq!(a.frames[0].image.dimensions(), (16, 16)),
            Asset::Still(_) => panic!("expected animation"),
        }
    }

    #[test]
    fn clear_forces_reread() {
        let source = CountingSource::default().with("click.png", fixtures::png_bytes(4, 4));
        let mut cache = AssetCache::new(source);

        cache.load("click", None).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        cache.load("click", None).unwrap();
        assert_eq!(cache.source().reads.get(), 2);
    }

    #[test]
    fn gif_wins_over_png() {
        let source = CountingSource::default()
            .with("idle.png", fixtures::png_bytes(4, 4))
            .with("idle.gif", fixtures::gif_bytes(&[50], 4, 4));
        let mut cache = AssetCache::new(source);

        assert_eq!(cache.resolve("idle").as_deref(), Some("idle.gif"));
        assert!(matches!(cache.load("idle", None), Some(Asset::Animation(_))));
    }

    #[test]
    fn still_image_has_single_frame_duration() {
        let source = CountingSource::default().with("click.png", fixtures::png_bytes(4, 4));
        let mut cache = AssetCache::new(source);
        let asset = cache.load("click", None).unwrap();
        assert!(matches!(asset, Asset::Still(_)));
        assert_eq!(asset.natural_duration(), timing::DEFAULT_FRAME_MS);
    }

    #[test]
    fn missing_and_corrupt_are_absent_not_fatal() {
        let source = CountingSource::default().with("click.gif", b"GIF89a garbage".to_vec());
        let mut cache = AssetCache::new(source);

        assert!(matches!(cache.try_load("idle", None), Err(AssetError::NotFound { .. })));
        assert!(matches!(cache.try_load("click", None), Err(AssetError::Decode { .. })));
        assert!(cache.load("click", None).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn list_available_dedupes_formats() {
        let source = CountingSource::default()
            .with("idle.gif", Vec::new())
            .with("idle.png", Vec::new())
            .with("click.png", Vec::new())
            .with("notes.txt", Vec::new());
        let cache = AssetCache::new(source);

        assert_eq!(cache.list_available(), vec!["click".to_owned(), "idle".to_owned()]);
    }

    #[test]
    fn every_listed_name_loads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("idle.gif"), fixtures::gif_bytes(&[100], 4, 4)).unwrap();
        std::fs::write(dir.path().join("click.png"), fixtures::png_bytes(4, 4)).unwrap();
        std::fs::write(dir.path().join("Wave.GIF"), fixtures::gif_bytes(&[100], 4, 4)).unwrap();
        std::fs::write(dir.path().join("Sleep.Png"), fixtures::png_bytes(4, 4)).unwrap();

        let mut cache = AssetCache::new(DirSource::new(dir.path()));
        let listed = cache.list_available();
        assert_eq!(listed, vec!["click".to_owned(), "idle".to_owned()]);
        for name in &listed {
            assert!(cache.try_load(name, None).is_ok(), "listed '{name}' failed to load");
        }
    }

    #[test]
    fn logical_name_requires_exact_extension() {
        assert_eq!(logical_name("idle.gif"), Some("idle"));
        assert_eq!(logical_name("my.pet.png"), Some("my.pet"));
        assert_eq!(logical_name("Idle.GIF"), None);
        assert_eq!(logical_name(".gif"), None);
        assert_eq!(logical_name("gif"), None);
    }

    #[test]
    fn dir_source_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("idle.gif"), fixtures::gif_bytes(&[120, 80], 4, 4)).unwrap();
        std::fs::write(dir.path().join("idle.png"), fixtures::png_bytes(4, 4)).unwrap();

        let mut cache = AssetCache::new(DirSource::new(dir.path()));
        assert_eq!(cache.list_available(), vec!["idle".to_owned()]);
        assert_eq!(cache.load("idle", None).unwrap().natural_duration(), 200);
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::new(DirSource::new(dir.path().join("missing")));
        assert!(cache.list_available().is_empty());
    }
}
