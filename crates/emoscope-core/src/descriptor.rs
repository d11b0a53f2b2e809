//! Emotion descriptor table.
//!
//! Maps an expression key to its icon, display label and wellness tip. The
//! table is embedded at compile time from `data/emotions.toml` and parsed once
//! on first access.

use serde::Deserialize;
use std::sync::OnceLock;

const EMOTIONS_TOML: &str = include_str!("../data/emotions.toml");

/// Key used when a dominant category has no descriptor of its own.
pub const FALLBACK_KEY: &str = "neutral";

static DESCRIPTORS: OnceLock<Vec<EmotionDescriptor>> = OnceLock::new();

/// Display metadata for one expression category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmotionDescriptor {
    pub key: String,
    pub icon: String,
    pub label: String,
    pub tip: String,
}

#[derive(Deserialize)]
struct DescriptorFile {
    emotion: Vec<EmotionDescriptor>,
}

fn descriptors() -> &'static Vec<EmotionDescriptor> {
    DESCRIPTORS.get_or_init(|| match toml::from_str::<DescriptorFile>(EMOTIONS_TOML) {
        Ok(file) => file.emotion,
        Err(e) => {
            tracing::error!(error = %e, "bad emotion descriptor TOML");
            Vec::new()
        }
    })
}

/// Look up the descriptor for an expression key.
pub fn lookup(key: &str) -> Option<&'static EmotionDescriptor> {
    descriptors().iter().find(|d| d.key == key)
}

/// Look up a descriptor, falling back to the neutral entry for unknown keys.
pub fn lookup_or_fallback(key: &str) -> Option<&'static EmotionDescriptor> {
    lookup(key).or_else(|| {
        tracing::debug!(key, fallback = FALLBACK_KEY, "no descriptor for key");
        lookup(FALLBACK_KEY)
    })
}

/// All known descriptors in table order.
pub fn all() -> &'static [EmotionDescriptor] {
    descriptors()
}
