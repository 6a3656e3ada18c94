//! Language → script → font candidates.
//!
//! The registry is parsed once from the embedded `scripts.toml` and never
//! mutated afterwards, so lookups need no synchronization.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::EngineError;

const SCRIPTS_TOML: &str = include_str!("scripts.toml");

static BUILTIN: OnceLock<ScriptRegistry> = OnceLock::new();

/// A font the resolver may load for a script, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FontCandidate {
    /// Family name, also used for the system font lookup.
    pub family: String,
    /// File stem inside the font directory (`<file>-<Style>.ttf`).
    pub file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptProfile {
    pub id: String,
    pub script: String,
    pub rtl: bool,
    pub fonts: Vec<FontCandidate>,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScriptRegistry {
    profiles: Vec<ScriptProfile>,
    index: HashMap<String, usize>,
    default: usize,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    default_profile: String,
    profiles: Vec<ProfileEntry>,
}

#[derive(Debug, Deserialize)]
struct ProfileEntry {
    id: String,
    script: String,
    #[serde(default)]
    rtl: bool,
    languages: Vec<String>,
    fonts: Vec<FontCandidate>,
}

impl ScriptRegistry {
    /// The process-wide registry built from the embedded table.
    pub fn builtin() -> Result<&'static ScriptRegistry> {
        if let Some(registry) = BUILTIN.get() {
            return Ok(registry);
        }
        let parsed = Self::from_toml(SCRIPTS_TOML).with_context(|| "invalid embedded script table")?;
        Ok(BUILTIN.get_or_init(|| parsed))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: RegistryFile = toml::from_str(content)?;
        let mut profiles = Vec::with_capacity(file.profiles.len());
        let mut index = HashMap::new();

        for (position, entry) in file.profiles.into_iter().enumerate() {
            if entry.fonts.is_empty() {
                return Err(anyhow!("profile '{}' lists no fonts", entry.id));
            }
            let mut keys = vec![normalize(&entry.id), normalize(&entry.script)];
            keys.extend(entry.languages.iter().map(|lang| normalize(lang)));
            for key in keys {
                if let Some(previous) = index.insert(key.clone(), position) {
                    if previous != position {
                        return Err(anyhow!(
                            "language '{}' is mapped by more than one profile",
                            key
                        ));
                    }
                }
            }
            profiles.push(ScriptProfile {
                id: entry.id,
                script: entry.script,
                rtl: entry.rtl,
                fonts: entry.fonts,
                languages: entry.languages,
            });
        }

        let default = profiles
            .iter()
            .position(|profile| profile.id == file.default_profile)
            .ok_or_else(|| anyhow!("default profile '{}' is not defined", file.default_profile))?;

        Ok(Self {
            profiles,
            index,
            default,
        })
    }

    /// Case-insensitive lookup by language name, ISO code, script code or
    /// profile id. Region subtags (`pt-BR`) fall back to the base language.
    pub fn resolve(&self, language: &str) -> Result<&ScriptProfile, EngineError> {
        let key = normalize(language);
        if let Some(position) = self.index.get(&key) {
            return Ok(&self.profiles[*position]);
        }
        if let Some((base, _)) = key.split_once('-') {
            if let Some(position) = self.index.get(base) {
                return Ok(&self.profiles[*position]);
            }
        }
        Err(EngineError::UnknownLanguage(language.trim().to_string()))
    }

    /// Like [`resolve`](Self::resolve) but never fails: unknown languages get
    /// the profile named `default_id`, or the table's default.
    pub fn resolve_or_default(&self, language: &str, default_id: &str) -> &ScriptProfile {
        match self.resolve(language) {
            Ok(profile) => profile,
            Err(err) => {
                let fallback = self.profile(default_id).unwrap_or(self.default_profile());
                warn!("{}; rendering with the '{}' profile", err, fallback.id);
                fallback
            }
        }
    }

    pub fn profile(&self, id: &str) -> Option<&ScriptProfile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    pub fn default_profile(&self) -> &ScriptProfile {
        &self.profiles[self.default]
    }

    pub fn profiles(&self) -> &[ScriptProfile] {
        &self.profiles
    }
}

fn normalize(language: &str) -> String {
    language.trim().to_lowercase().replace('_', "-")
}
