//! Texture loading and the per-session texture cache.
//!
//! [`TexturePipeline`] is the one entry point for getting a texture onto the
//! GPU: it fetches bytes, dispatches to a decoder by file extension, tags
//! the result with the requested color space, fills the mip chain, and
//! records load telemetry. Decoded textures are cached by absolute location
//! so meshes sharing a texture share one fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::data_structures::texture::{ColorSpace, Texture};
use crate::pipelines::mipmap::MipmapGenerator;
use crate::resources::fetch::{self, FetchError, Location};
use crate::telemetry::Telemetry;

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("decode failed: {0}")]
    Decode(#[from] anyhow::Error),
    #[error("unsupported compressed texture container {0:?}")]
    UnsupportedContainer(String),
}

/// Outcome of one texture load, as stored in the cache. Failures are cached
/// too: every failure is terminal for that asset, re-requests must not
/// re-fetch.
pub type CachedTexture = Result<Arc<Texture>, Arc<TextureError>>;

/// Texture load outcomes keyed by absolute location. One per session.
#[derive(Default)]
pub struct TextureCache {
    entries: Mutex<HashMap<String, CachedTexture>>,
}

impl TextureCache {
    pub fn get(&self, key: &str) -> Option<CachedTexture> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn insert(&self, key: String, outcome: CachedTexture) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, outcome);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything texture loading needs, bundled per session.
pub struct TexturePipeline {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub mips: Arc<MipmapGenerator>,
    pub client: reqwest::Client,
    pub cache: TextureCache,
    pub telemetry: Arc<Telemetry>,
    pub max_anisotropy: u16,
    pub probe_sizes: bool,
}

impl TexturePipeline {
    /// Load one texture, consulting the cache first.
    ///
    /// Concurrent first requests for the same path are deduplicated by the
    /// caller's load plan; the cache covers every request after that. Cache
    /// hits touch no telemetry: the bytes were already accounted for.
    pub async fn load(&self, location: &Location, color_space: ColorSpace) -> CachedTexture {
        let key = location.to_string();
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        self.telemetry.texture_started();
        let outcome = match self.fetch_and_decode(location, color_space).await {
            Ok((texture, size)) => {
                self.telemetry.texture_settled(&key, size);
                Ok(Arc::new(texture))
            }
            Err(e) => {
                self.telemetry.texture_settled(&key, None);
                Err(Arc::new(e))
            }
        };
        self.cache.insert(key, outcome.clone());
        outcome
    }

    async fn fetch_and_decode(
        &self,
        location: &Location,
        color_space: ColorSpace,
    ) -> Result<(Texture, Option<u64>), TextureError> {
        let fetched = fetch::fetch(&self.client, location).await?;
        let size = fetched.transfer_size;
        if size.unwrap_or(0) == 0 && self.probe_sizes {
            // The transfer reported nothing; recover the size out of band.
            if let Some(probed) = fetch::probe_size(&self.client, location).await {
                self.telemetry
                    .record_probed_size(&location.to_string(), probed);
            }
        }

        let label = location.to_string();
        let ext = location.extension();
        let texture = match ext.as_deref() {
            Some("hdr") | Some("exr") => Texture::from_hdr_bytes(
                &self.device,
                &self.queue,
                &fetched.bytes,
                &label,
                self.max_anisotropy,
            )?,
            Some(container @ ("ktx" | "ktx2" | "basis" | "dds")) => {
                return Err(TextureError::UnsupportedContainer(container.to_string()));
            }
            other => Texture::from_bytes(
                &self.device,
                &self.queue,
                &fetched.bytes,
                &label,
                other,
                color_space,
                self.max_anisotropy,
            )?,
        };
        self.mips.generate(&self.device, &self.queue, &texture.texture);

        Ok((texture, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_returns_the_same_outcome_handle() {
        let cache = TextureCache::default();
        assert!(cache.is_empty());
        assert!(cache.get("https://cdn/a.png").is_none());

        // Failures are cached like successes: one fetch per absolute path,
        // every later request resolves to the same stored outcome.
        let failure: CachedTexture =
            Err(Arc::new(TextureError::UnsupportedContainer("ktx2".into())));
        cache.insert("https://cdn/a.png".to_string(), failure.clone());

        let first = cache.get("https://cdn/a.png").unwrap();
        let second = cache.get("https://cdn/a.png").unwrap();
        let (Err(a), Err(b), Err(c)) = (&failure, &first, &second) else {
            panic!("expected the cached failure");
        };
        assert!(Arc::ptr_eq(a, b) && Arc::ptr_eq(b, c));
        assert_eq!(cache.len(), 1);
    }
}
