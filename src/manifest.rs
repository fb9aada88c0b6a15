//! The asset manifest: a static table mapping model parts and material
//! variants to their texture filenames.
//!
//! The manifest is authored as JSON with the shape
//! `part key -> variant key -> channel -> filename`. Declaration order of
//! both parts and variants is preserved because the resolver breaks ties by
//! first declaration, so the manifest is parsed into ordered vectors rather
//! than a hash map.

use serde_json::Value;

use crate::data_structures::texture::ColorSpace;

/// The semantic role of a texture within a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    BaseColor,
    Normal,
    Orm,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::BaseColor, Channel::Normal, Channel::Orm];

    /// The channel's name as it appears in manifest keys and constructed
    /// filenames.
    pub fn label(&self) -> &'static str {
        match self {
            Channel::BaseColor => "BaseColor",
            Channel::Normal => "Normal",
            Channel::Orm => "ORM",
        }
    }

    /// Base color is authored in sRGB; normal and ORM data are linear.
    pub fn color_space(&self) -> ColorSpace {
        match self {
            Channel::BaseColor => ColorSpace::Srgb,
            Channel::Normal | Channel::Orm => ColorSpace::Linear,
        }
    }
}

/// Texture filenames declared for one variant, keyed by channel.
#[derive(Clone, Debug, Default)]
pub struct ChannelSet {
    pub base_color: Option<String>,
    pub normal: Option<String>,
    pub orm: Option<String>,
}

impl ChannelSet {
    pub fn get(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::BaseColor => self.base_color.as_deref(),
            Channel::Normal => self.normal.as_deref(),
            Channel::Orm => self.orm.as_deref(),
        }
    }

    fn set(&mut self, key: &str, filename: String) -> bool {
        match key {
            "BaseColor" => self.base_color = Some(filename),
            "Normal" => self.normal = Some(filename),
            "ORM" => self.orm = Some(filename),
            _ => return false,
        }
        true
    }
}

/// A named material variant of a part and its texture set.
#[derive(Clone, Debug)]
pub struct VariantEntry {
    pub key: String,
    pub textures: ChannelSet,
}

/// A named part and its variants, in declaration order.
#[derive(Clone, Debug)]
pub struct PartEntry {
    pub key: String,
    pub variants: Vec<VariantEntry>,
}

/// The parsed manifest. Read-only after construction.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    pub parts: Vec<PartEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("manifest root must be an object of parts")]
    NotAnObject,
    #[error("part {0:?} must be an object of variants")]
    BadPart(String),
    #[error("part {0:?} declares no variants")]
    EmptyPart(String),
    #[error("variant {1:?} of part {0:?} must be an object of channel filenames")]
    BadVariant(String, String),
    #[error("channel {2:?} of {0:?}/{1:?} must be a filename string")]
    BadChannel(String, String, String),
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Build a manifest from a JSON value, keeping part and variant order as
    /// authored. Unknown channel keys are skipped with a warning so asset
    /// pipelines can carry extra metadata alongside the known channels.
    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        let root = match value {
            Value::Object(map) => map,
            _ => return Err(ManifestError::NotAnObject),
        };

        let mut parts = Vec::with_capacity(root.len());
        for (part_key, variants_value) in root {
            let variant_map = match variants_value {
                Value::Object(map) => map,
                _ => return Err(ManifestError::BadPart(part_key)),
            };
            if variant_map.is_empty() {
                return Err(ManifestError::EmptyPart(part_key));
            }

            let mut variants = Vec::with_capacity(variant_map.len());
            for (variant_key, channels_value) in variant_map {
                let channel_map = match channels_value {
                    Value::Object(map) => map,
                    _ => return Err(ManifestError::BadVariant(part_key, variant_key)),
                };

                let mut textures = ChannelSet::default();
                for (channel_key, filename) in channel_map {
                    let filename = match filename {
                        Value::String(s) => s,
                        _ => {
                            return Err(ManifestError::BadChannel(
                                part_key,
                                variant_key,
                                channel_key,
                            ));
                        }
                    };
                    if !textures.set(&channel_key, filename) {
                        log::warn!(
                            "manifest: unknown channel {:?} in {}/{} skipped",
                            channel_key,
                            part_key,
                            variant_key
                        );
                    }
                }
                variants.push(VariantEntry {
                    key: variant_key,
                    textures,
                });
            }
            parts.push(PartEntry {
                key: part_key,
                variants,
            });
        }

        Ok(Manifest { parts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_parts_and_variants_in_order() {
        let manifest = Manifest::from_value(json!({
            "Gear_Housing": {
                "matMetal": { "BaseColor": "a.png", "Normal": "n.png", "ORM": "o.png" },
                "matPaint": { "BaseColor": "b.png" }
            },
            "Axle": {
                "matRubber": { "BaseColor": "c.png" }
            }
        }))
        .unwrap();

        assert_eq!(manifest.parts.len(), 2);
        assert_eq!(manifest.parts[0].key, "Gear_Housing");
        assert_eq!(manifest.parts[0].variants[0].key, "matMetal");
        assert_eq!(manifest.parts[0].variants[1].key, "matPaint");
        assert_eq!(
            manifest.parts[0].variants[0].textures.get(Channel::BaseColor),
            Some("a.png")
        );
        assert_eq!(manifest.parts[1].key, "Axle");
    }

    #[test]
    fn test_unknown_channels_are_skipped() {
        let manifest = Manifest::from_value(json!({
            "Body": { "matA": { "BaseColor": "a.png", "Emissive": "e.png" } }
        }))
        .unwrap();
        let set = &manifest.parts[0].variants[0].textures;
        assert_eq!(set.get(Channel::BaseColor), Some("a.png"));
        assert_eq!(set.get(Channel::Normal), None);
    }

    #[test]
    fn test_rejects_part_without_variants() {
        let err = Manifest::from_value(json!({ "Body": {} })).unwrap_err();
        assert!(matches!(err, ManifestError::EmptyPart(_)));
    }

    #[test]
    fn test_rejects_non_object_root() {
        let err = Manifest::from_value(json!(["nope"])).unwrap_err();
        assert!(matches!(err, ManifestError::NotAnObject));
    }

    #[test]
    fn test_rejects_non_string_filename() {
        let err = Manifest::from_value(json!({
            "Body": { "matA": { "BaseColor": 7 } }
        }))
        .unwrap_err();
        assert!(matches!(err, ManifestError::BadChannel(..)));
    }
}
