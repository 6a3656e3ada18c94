use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use usvg::fontdb;

use super::{BUILTIN_FAMILY, FontAsset, FontCache, FontOrigin, FontStyle};
use crate::model::Degradation;
use crate::scripts::{FontCandidate, ScriptProfile};
use crate::settings::FontSettings;

const FONT_EXTENSIONS: [&str; 2] = ["ttf", "otf"];

#[derive(Debug, Clone)]
pub struct ResolvedFont {
    pub asset: Arc<FontAsset>,
    /// Present when the profile's primary candidate could not be used.
    pub fallback: Option<Degradation>,
}

/// Picks a loaded font for a script profile and style.
///
/// Candidates are tried in profile order from the font directory
/// (`<dir>/<file>-<Style>.ttf`, falling back to the `Regular` file when the
/// styled variant is absent), then as installed system fonts, then the
/// builtin Helvetica. Every load goes through the shared [`FontCache`].
pub struct FontResolver {
    dir: PathBuf,
    system_fallback: bool,
    cache: FontCache,
    system_db: OnceLock<fontdb::Database>,
}

impl FontResolver {
    pub fn new(dir: impl Into<PathBuf>, system_fallback: bool) -> Self {
        Self {
            dir: dir.into(),
            system_fallback,
            cache: FontCache::new(),
            system_db: OnceLock::new(),
        }
    }

    pub fn from_settings(settings: &FontSettings) -> Self {
        Self::new(settings.dir.clone(), settings.system_fallback)
    }

    pub fn cache(&self) -> &FontCache {
        &self.cache
    }

    pub fn resolve(&self, profile: &ScriptProfile, style: FontStyle) -> ResolvedFont {
        let requested = profile
            .fonts
            .first()
            .map(|candidate| candidate.family.clone())
            .unwrap_or_else(|| BUILTIN_FAMILY.to_string());

        for (position, candidate) in profile.fonts.iter().enumerate() {
            if let Some(asset) = self.load_from_dir(candidate, style) {
                return self.resolved(asset, position > 0, &requested, profile);
            }
        }

        if self.system_fallback {
            for candidate in &profile.fonts {
                if let Some(asset) = self.load_from_system(&candidate.family, style) {
                    return self.resolved(asset, true, &requested, profile);
                }
            }
        }

        let asset = self.builtin(style);
        warn!(
            "no font for profile '{}' could be loaded; using {}",
            profile.id, BUILTIN_FAMILY
        );
        self.resolved(asset, true, &requested, profile)
    }

    pub fn builtin(&self, style: FontStyle) -> Arc<FontAsset> {
        self.cache
            .get_or_insert_with(Path::new("builtin:helvetica"), style, || Some(FontAsset::builtin(style)))
            .unwrap_or_else(|| Arc::new(FontAsset::builtin(style)))
    }

    /// `PartialGlyphCoverage` when `text` has characters the font cannot draw.
    pub fn check_coverage(font: &FontAsset, text: &str) -> Option<Degradation> {
        let missing = font.missing_chars(text);
        if missing.is_empty() {
            return None;
        }
        Some(Degradation::PartialGlyphCoverage {
            font: font.family.clone(),
            missing: missing.into_iter().collect(),
        })
    }

    fn resolved(
        &self,
        asset: Arc<FontAsset>,
        fell_back: bool,
        requested: &str,
        profile: &ScriptProfile,
    ) -> ResolvedFont {
        debug!(
            "profile '{}' resolved to {} ({:?})",
            profile.id, asset.family, asset.style
        );
        let fallback = fell_back.then(|| Degradation::FontFallback {
            requested: requested.to_string(),
            used: asset.family.clone(),
        });
        ResolvedFont { asset, fallback }
    }

    fn load_from_dir(&self, candidate: &FontCandidate, style: FontStyle) -> Option<Arc<FontAsset>> {
        if let Some(path) = self.font_path(&candidate.file, style) {
            return self.cache.get_or_load(&path, style);
        }
        if style != FontStyle::Regular
            && let Some(path) = self.font_path(&candidate.file, FontStyle::Regular)
        {
            debug!(
                "{} has no {} variant; using Regular",
                candidate.family,
                style.suffix()
            );
            return self.cache.get_or_load(&path, FontStyle::Regular);
        }
        None
    }

    fn font_path(&self, stem: &str, style: FontStyle) -> Option<PathBuf> {
        FONT_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}-{}.{}", stem, style.suffix(), ext)))
            .find(|path| path.is_file())
    }

    fn load_from_system(&self, family: &str, style: FontStyle) -> Option<Arc<FontAsset>> {
        let key = PathBuf::from(format!("system:{}", family));
        self.cache.get_or_insert_with(&key, style, || {
            let db = self.system_db.get_or_init(|| {
                let mut db = fontdb::Database::new();
                db.load_system_fonts();
                info!("indexed {} system font faces", db.len());
                db
            });
            let families = [fontdb::Family::Name(family)];
            let query = fontdb::Query {
                families: &families,
                weight: if style.is_bold() {
                    fontdb::Weight::BOLD
                } else {
                    fontdb::Weight::NORMAL
                },
                style: if style.is_italic() {
                    fontdb::Style::Italic
                } else {
                    fontdb::Style::Normal
                },
                ..Default::default()
            };
            let id = db.query(&query)?;
            let (data, index) = db.with_face_data(id, |data, index| (data.to_vec(), index))?;
            match FontAsset::from_face(data, index, style, FontOrigin::System(family.to_string())) {
                Ok(asset) => Some(asset),
                Err(err) => {
                    warn!("failed to parse system font {}: {}", family, err);
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::test_support::fixture_dir;
    use tempfile::tempdir;

    fn profile() -> ScriptProfile {
        ScriptProfile {
            id: "latin".to_string(),
            script: "Latn".to_string(),
            rtl: false,
            languages: vec!["en".to_string()],
            fonts: vec![
                FontCandidate {
                    family: "Noto Sans".to_string(),
                    file: "NotoSans".to_string(),
                },
                FontCandidate {
                    family: "DejaVu Sans".to_string(),
                    file: "DejaVuSans".to_string(),
                },
            ],
        }
    }

    fn font_dir(files: &[&str]) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for file in files {
            std::fs::copy(fixture_dir().join(file), dir.path().join(file)).unwrap();
        }
        dir
    }

    #[test]
    fn resolution_is_cached_and_identical() {
        let dir = font_dir(&["DejaVuSans-Regular.ttf"]);
        let resolver = FontResolver::new(dir.path(), false);
        let first = resolver.resolve(&profile(), FontStyle::Regular);
        let second = resolver.resolve(&profile(), FontStyle::Regular);
        assert!(Arc::ptr_eq(&first.asset, &second.asset));
        assert_eq!(resolver.cache().load_count(), 1);
        assert_eq!(first.asset.family, "DejaVu Sans");
        assert_eq!(
            first.fallback,
            Some(Degradation::FontFallback {
                requested: "Noto Sans".to_string(),
                used: "DejaVu Sans".to_string(),
            })
        );
    }

    #[test]
    fn missing_style_variant_uses_regular_file() {
        let dir = font_dir(&["DejaVuSans-Regular.ttf"]);
        let resolver = FontResolver::new(dir.path(), false);
        let bold = resolver.resolve(&profile(), FontStyle::Bold);
        let regular = resolver.resolve(&profile(), FontStyle::Regular);
        assert!(Arc::ptr_eq(&bold.asset, &regular.asset));
        assert_eq!(bold.asset.style, FontStyle::Regular);
    }

    #[test]
    fn exact_style_variant_wins() {
        let dir = font_dir(&["DejaVuSans-Regular.ttf", "DejaVuSans-Bold.ttf"]);
        let resolver = FontResolver::new(dir.path(), false);
        let bold = resolver.resolve(&profile(), FontStyle::Bold);
        assert_eq!(bold.asset.style, FontStyle::Bold);
        assert!(matches!(bold.asset.origin, FontOrigin::File(ref path) if path.ends_with("DejaVuSans-Bold.ttf")));
    }

    #[test]
    fn empty_directory_falls_back_to_builtin() {
        let dir = tempdir().unwrap();
        let resolver = FontResolver::new(dir.path(), false);
        let resolved = resolver.resolve(&profile(), FontStyle::Regular);
        assert!(resolved.asset.is_builtin());
        assert_eq!(
            resolved.fallback,
            Some(Degradation::FontFallback {
                requested: "Noto Sans".to_string(),
                used: "Helvetica".to_string(),
            })
        );
        let again = resolver.resolve(&profile(), FontStyle::Regular);
        assert!(Arc::ptr_eq(&resolved.asset, &again.asset));
    }

    #[test]
    fn coverage_gaps_are_reported() {
        let resolver = FontResolver::new(tempdir().unwrap().path(), false);
        let font = resolver.builtin(FontStyle::Regular);
        assert_eq!(FontResolver::check_coverage(&font, "Hello"), None);
        assert_eq!(
            FontResolver::check_coverage(&font, "नमस्ते Hi"),
            Some(Degradation::PartialGlyphCoverage {
                font: "Helvetica".to_string(),
                missing: "नमस्ते".to_string(),
            })
        );
    }
}
