use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, warn};

use super::{FontAsset, FontOrigin, FontStyle};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FontKey {
    path: PathBuf,
    style: FontStyle,
}

type Slot = Arc<OnceLock<Option<Arc<FontAsset>>>>;

/// Process-wide font cache. Each `(path, style)` is loaded at most once, even
/// when many workers ask for it at the same time; failed loads are cached too.
#[derive(Default)]
pub struct FontCache {
    slots: RwLock<HashMap<FontKey, Slot>>,
    loads: AtomicUsize,
}

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a font file, or returns the asset already loaded for the key.
    pub fn get_or_load(&self, path: &Path, style: FontStyle) -> Option<Arc<FontAsset>> {
        self.get_or_insert_with(path, style, || {
            if !path.is_file() {
                return None;
            }
            let data = match std::fs::read(path) {
                Ok(data) => data,
                Err(err) => {
                    warn!("failed to read font {}: {}", path.display(), err);
                    return None;
                }
            };
            match FontAsset::from_data(data, style, FontOrigin::File(path.to_path_buf())) {
                Ok(asset) => {
                    debug!("loaded font {} ({})", path.display(), asset.family);
                    Some(asset)
                }
                Err(err) => {
                    warn!("failed to parse font {}: {}", path.display(), err);
                    None
                }
            }
        })
    }

    /// Same single-load guarantee for fonts that do not come from a file.
    /// `key` only needs to be unique among such fonts.
    pub fn get_or_insert_with<F>(&self, key: &Path, style: FontStyle, load: F) -> Option<Arc<FontAsset>>
    where
        F: FnOnce() -> Option<FontAsset>,
    {
        let slot = self.slot(FontKey {
            path: key.to_path_buf(),
            style,
        });
        slot.get_or_init(|| {
            self.loads.fetch_add(1, Ordering::SeqCst);
            load().map(Arc::new)
        })
        .clone()
    }

    /// Number of load attempts performed so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn slot(&self, key: FontKey) -> Slot {
        {
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = slots.get(&key) {
                return slot.clone();
            }
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key).or_default().clone()
    }
}
