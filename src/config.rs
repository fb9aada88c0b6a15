//! Viewer configuration: which model to show, where its assets live, and
//! which naming policy resolves textures.
//!
//! The configuration is a small JSON document passed to the binary. Nothing
//! in here is hot-reloaded; a config change means a new session.

use serde::Deserialize;

use crate::resolve::SyntheticNaming;

#[derive(Clone, Debug, Deserialize)]
pub struct ViewerConfig {
    /// Model file (GLB/glTF), as a URL or a local path.
    pub model: String,
    /// HDR environment map, as a URL or a local path. Omitting it disables
    /// image-based lighting and the background.
    #[serde(default)]
    pub environment: Option<String>,
    /// Base URL or directory that texture paths resolve against.
    pub assets_base: String,
    /// Part/variant naming policy.
    #[serde(default)]
    pub naming: NamingConfig,
    /// Issue HEAD/metadata probes for assets whose transfer size reads zero.
    #[serde(default)]
    pub probe_sizes: bool,
    /// Environment light intensity multiplier.
    #[serde(default = "default_intensity")]
    pub env_intensity: f32,
}

fn default_intensity() -> f32 {
    1.0
}

/// The two resolution policies. They are intentionally separate: manifest
/// lookup and synthetic filename construction come from different asset
/// pipelines and must not be unified.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NamingConfig {
    /// Policy A: resolve parts against a manifest document.
    Manifest {
        /// Manifest JSON, as a URL or path relative to nothing in
        /// particular; resolved like the model path.
        manifest: String,
    },
    /// Policy B: construct filenames from tokens mined out of node names.
    Synthetic {
        #[serde(default)]
        default_variant: Option<String>,
        #[serde(default)]
        extension: Option<String>,
    },
}

impl Default for NamingConfig {
    fn default() -> Self {
        NamingConfig::Synthetic {
            default_variant: None,
            extension: None,
        }
    }
}

impl NamingConfig {
    /// Synthetic naming with config overrides applied over the defaults.
    /// Only meaningful for the synthetic policy.
    pub fn synthetic_naming(&self) -> SyntheticNaming {
        let mut naming = SyntheticNaming::default();
        if let NamingConfig::Synthetic {
            default_variant,
            extension,
        } = self
        {
            if let Some(variant) = default_variant {
                naming.default_variant = variant.clone();
            }
            if let Some(ext) = extension {
                naming.extension = ext.clone();
            }
        }
        naming
    }
}

impl ViewerConfig {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", path.display(), e))?;
        Ok(Self::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_mode_config() {
        let config = ViewerConfig::from_slice(
            br#"{
                "model": "https://cdn.example.com/gearbox.glb",
                "environment": "https://cdn.example.com/studio.hdr",
                "assets_base": "https://cdn.example.com/textures",
                "naming": { "mode": "manifest", "manifest": "https://cdn.example.com/manifest.json" },
                "probe_sizes": true
            }"#,
        )
        .unwrap();
        assert!(matches!(config.naming, NamingConfig::Manifest { .. }));
        assert!(config.probe_sizes);
        assert_eq!(config.env_intensity, 1.0);
    }

    #[test]
    fn test_synthetic_mode_defaults() {
        let config = ViewerConfig::from_slice(
            br#"{ "model": "gearbox.glb", "assets_base": "textures" }"#,
        )
        .unwrap();
        let naming = config.naming.synthetic_naming();
        assert_eq!(naming.extension, "ktx2");
        assert!(!config.probe_sizes);
        assert!(config.environment.is_none());
    }

    #[test]
    fn test_synthetic_overrides() {
        let config = ViewerConfig::from_slice(
            br#"{
                "model": "gearbox.glb",
                "assets_base": "textures",
                "naming": { "mode": "synthetic", "default_variant": "matpaint", "extension": "png" }
            }"#,
        )
        .unwrap();
        let naming = config.naming.synthetic_naming();
        assert_eq!(naming.default_variant, "matpaint");
        assert_eq!(naming.extension, "png");
    }
}
