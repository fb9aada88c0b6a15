//! Part and variant resolution.
//!
//! Externally-authored assets carry node and material names that only loosely
//! encode which part of the product a mesh belongs to. This module turns
//! those names into texture lookups. Two incompatible policies are in use by
//! the asset pipelines we consume and both are kept, selected by
//! configuration:
//!
//! - [`resolve_part`] matches names against the manifest (closest ancestor
//!   wins, ties break to first declaration order).
//! - [`SyntheticNaming::resolve`] mines a part index out of the name itself
//!   and constructs texture filenames deterministically, with no manifest.
//!
//! Everything here is pure string work over an ordered candidate list; no
//! rendering state is involved.

use crate::manifest::{Channel, Manifest, PartEntry, VariantEntry};

/// Lowercase and strip everything outside `[a-z0-9_]`.
///
/// Matching is case- and punctuation-insensitive: `"Gear.Housing-01"` and
/// `"gearhousing01"` normalize to comparable forms.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Extract a variant token: the first case-insensitive occurrence of `mat`
/// followed by at least one alphanumeric character, lowercased.
///
/// Mirrors the authoring convention of naming material variants `matMetal`,
/// `matPaint3` and so on. Underscores end the token.
pub fn extract_variant_token(s: &str) -> Option<String> {
    for start in 0..s.len().saturating_sub(3) {
        if !s.is_char_boundary(start) {
            continue;
        }
        let rest = &s[start..];
        match rest.get(..3) {
            Some(prefix) if rest.len() >= 4 && prefix.eq_ignore_ascii_case("mat") => {}
            _ => continue,
        }
        let run: String = rest[3..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        if !run.is_empty() {
            return Some(format!("mat{}", run).to_lowercase());
        }
    }
    None
}

/// A successful manifest resolution for one mesh.
#[derive(Clone, Copy, Debug)]
pub struct Resolved<'m> {
    pub part: &'m PartEntry,
    pub variant: &'m VariantEntry,
}

/// Resolve a mesh against the manifest (policy A).
///
/// `chain` is the mesh's name followed by its ancestor names, closest first,
/// ending at the scene root. The walk starts at the mesh itself so the
/// closest matching ancestor wins. For the matched part, the variant token
/// extracted from the material name (falling back to the mesh name) selects
/// a declared variant; an unknown or missing token falls back to the part's
/// first declared variant.
///
/// Returns `None` when no name in the chain matches any manifest key; the
/// caller is expected to fall back to a flat default material.
pub fn resolve_part<'m>(
    manifest: &'m Manifest,
    chain: &[String],
    material_name: Option<&str>,
) -> Option<Resolved<'m>> {
    let part = chain.iter().find_map(|name| {
        let candidate = normalize(name);
        if candidate.is_empty() {
            return None;
        }
        manifest.parts.iter().find(|part| {
            let key = normalize(&part.key);
            !key.is_empty() && (candidate.starts_with(&key) || candidate.contains(&key))
        })
    })?;

    let token = material_name
        .and_then(extract_variant_token)
        .or_else(|| chain.first().and_then(|name| extract_variant_token(name)));

    let variant = token
        .map(|t| normalize(&t))
        .and_then(|t| part.variants.iter().find(|v| normalize(&v.key) == t))
        .or_else(|| part.variants.first())?;

    Some(Resolved { part, variant })
}

/// Relative texture path for a manifest resolution: manifest filenames live
/// under a per-part directory.
pub fn manifest_texture_path(resolved: &Resolved<'_>, channel: Channel) -> Option<String> {
    resolved
        .variant
        .textures
        .get(channel)
        .map(|file| format!("{}/{}", resolved.part.key, file))
}

/// Policy B: deterministic filename construction with no manifest.
#[derive(Clone, Debug)]
pub struct SyntheticNaming {
    /// Variant assumed when no `mat…` token can be extracted at all.
    pub default_variant: String,
    /// Extension of the constructed filenames. The authored sets ship KTX2.
    pub extension: String,
    /// Variant key -> display name used inside constructed filenames.
    pub display_names: Vec<(String, String)>,
}

impl Default for SyntheticNaming {
    fn default() -> Self {
        Self {
            default_variant: "matstandard".to_string(),
            extension: "ktx2".to_string(),
            display_names: vec![
                ("matstandard".to_string(), "Standard".to_string()),
                ("matmetal".to_string(), "Metal".to_string()),
                ("matpaint".to_string(), "Paint".to_string()),
                ("matrubber".to_string(), "Rubber".to_string()),
            ],
        }
    }
}

/// Outcome of synthetic resolution. Unlike the manifest policy there is no
/// failure mode: a default variant is always assumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticSet {
    pub part_key: Option<String>,
    pub variant_key: String,
}

impl SyntheticNaming {
    /// Mine a part key and variant out of the mesh/material/ancestor names.
    ///
    /// Candidates are tried in priority order: mesh name, material name, then
    /// each ancestor outward. The first candidate yielding at least two part
    /// tokens wins.
    pub fn resolve(&self, chain: &[String], material_name: Option<&str>) -> SyntheticSet {
        let mesh_name = chain.first().map(String::as_str);
        let ancestors = chain.iter().skip(1).map(String::as_str);

        let part_key = mesh_name
            .into_iter()
            .chain(material_name)
            .chain(ancestors)
            .find_map(mine_part_key);

        let variant_key = material_name
            .and_then(extract_variant_token)
            .or_else(|| mesh_name.and_then(extract_variant_token))
            .or_else(|| part_key.as_deref().and_then(extract_variant_token))
            .map(|t| normalize(&t))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.default_variant.clone());

        SyntheticSet {
            part_key,
            variant_key,
        }
    }

    /// Constructed filename for a channel: `model_<Display>_<Channel>.<ext>`.
    pub fn texture_path(&self, set: &SyntheticSet, channel: Channel) -> String {
        format!(
            "model_{}_{}.{}",
            self.display_name(&set.variant_key),
            channel.label(),
            self.extension
        )
    }

    fn display_name(&self, variant_key: &str) -> String {
        if let Some((_, display)) = self
            .display_names
            .iter()
            .find(|(key, _)| key == variant_key)
        {
            return display.clone();
        }
        // Unlisted variants fall back to the token with the `mat` prefix
        // dropped and the first letter uppercased.
        let stem = variant_key.strip_prefix("mat").unwrap_or(variant_key);
        let mut chars = stem.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => stem.to_string(),
        }
    }
}

/// Mine a part key from one candidate name (policy B).
///
/// The candidate is normalized (whitespace runs collapse to `_`, one
/// trailing `_low` suffix is dropped, then punctuation is stripped and the
/// result lowercased), split on `_`, and scanned for the first purely
/// numeric token. Tokens from that index onward are collected until a token
/// beginning with `mat` (exclusive) or the end. Fewer than two collected
/// tokens rejects the candidate. A trailing `_<digits>` instance suffix is
/// dropped from the joined key.
pub fn mine_part_key(candidate: &str) -> Option<String> {
    let collapsed = candidate.split_whitespace().collect::<Vec<_>>().join("_");
    let n = collapsed.len();
    let collapsed = if n >= 4
        && collapsed.is_char_boundary(n - 4)
        && collapsed[n - 4..].eq_ignore_ascii_case("_low")
    {
        &collapsed[..n - 4]
    } else {
        collapsed.as_str()
    };
    let norm = normalize(collapsed);

    let tokens: Vec<&str> = norm.split('_').filter(|t| !t.is_empty()).collect();
    let start = tokens
        .iter()
        .position(|t| t.chars().all(|c| c.is_ascii_digit()))?;

    let mut collected = Vec::new();
    for token in &tokens[start..] {
        if token.starts_with("mat") {
            break;
        }
        collected.push(*token);
    }
    if collected.len() < 2 {
        return None;
    }

    let mut key = collected.join("_");
    if let Some(pos) = key.rfind('_') {
        let suffix = &key[pos + 1..];
        if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            key.truncate(pos);
        }
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use serde_json::json;

    fn fixture() -> Manifest {
        Manifest::from_value(json!({
            "Gear_Housing": {
                "matMetal": { "BaseColor": "a.png" },
                "matPaint": { "BaseColor": "b.png" }
            },
            "Axle": {
                "matRubber": { "BaseColor": "c.png" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Gear.Housing-01"), "gearhousing01");
        assert_eq!(normalize("Gear_Housing"), "gear_housing");
        assert_eq!(normalize("  WAT? "), "wat");
    }

    #[test]
    fn test_variant_token_extraction() {
        assert_eq!(
            extract_variant_token("Gear_Housing_mesh_matMetal"),
            Some("matmetal".to_string())
        );
        assert_eq!(extract_variant_token("MATpaint3"), Some("matpaint3".to_string()));
        // `mat` with nothing alphanumeric after it is not a token.
        assert_eq!(extract_variant_token("Gear_mat_Metal"), None);
        assert_eq!(extract_variant_token("plain_name"), None);
        // First occurrence wins, scanning left to right.
        assert_eq!(
            extract_variant_token("matA_then_matB"),
            Some("mata".to_string())
        );
    }

    #[test]
    fn test_resolves_part_and_variant_from_mesh_name() {
        let manifest = fixture();
        let chain = vec!["Gear_Housing_mesh_matMetal".to_string()];
        let resolved = resolve_part(&manifest, &chain, None).unwrap();
        assert_eq!(resolved.part.key, "Gear_Housing");
        assert_eq!(resolved.variant.key, "matMetal");
        assert_eq!(
            manifest_texture_path(&resolved, Channel::BaseColor),
            Some("Gear_Housing/a.png".to_string())
        );
    }

    #[test]
    fn test_prefix_and_substring_both_match() {
        let manifest = fixture();
        for name in ["Gear_Housing_01", "SM_Gear_Housing_lod0", "x.Gear_Housing.y"] {
            let chain = vec![name.to_string()];
            let resolved = resolve_part(&manifest, &chain, None).unwrap();
            assert_eq!(resolved.part.key, "Gear_Housing", "candidate {:?}", name);
        }
    }

    #[test]
    fn test_closest_ancestor_wins() {
        let manifest = fixture();
        let chain = vec![
            "polySurface1".to_string(),
            "Axle_grp".to_string(),
            "Gear_Housing_grp".to_string(),
        ];
        let resolved = resolve_part(&manifest, &chain, None).unwrap();
        assert_eq!(resolved.part.key, "Axle");
    }

    #[test]
    fn test_material_name_selects_variant_over_mesh_name() {
        let manifest = fixture();
        let chain = vec!["Gear_Housing_matMetal".to_string()];
        let resolved = resolve_part(&manifest, &chain, Some("lambert_matPaint")).unwrap();
        assert_eq!(resolved.variant.key, "matPaint");
    }

    #[test]
    fn test_unknown_variant_falls_back_to_first_declared() {
        let manifest = fixture();
        let chain = vec!["Gear_Housing".to_string()];
        let resolved = resolve_part(&manifest, &chain, Some("matChrome")).unwrap();
        assert_eq!(resolved.variant.key, "matMetal");
        let resolved = resolve_part(&manifest, &chain, Some("lambert3")).unwrap();
        assert_eq!(resolved.variant.key, "matMetal");
    }

    #[test]
    fn test_no_match_reports_none() {
        let manifest = fixture();
        let chain = vec!["polySurface1".to_string(), "group1".to_string()];
        assert!(resolve_part(&manifest, &chain, Some("lambert1")).is_none());
        assert!(resolve_part(&manifest, &[], None).is_none());
    }

    #[test]
    fn test_mine_part_key_basic() {
        assert_eq!(
            mine_part_key("SM_01_Gear_Housing"),
            Some("01_gear_housing".to_string())
        );
        // Tokens stop before a `mat` token.
        assert_eq!(
            mine_part_key("SM_01_Gear_Housing_matMetal"),
            Some("01_gear_housing".to_string())
        );
        // Trailing instance suffix is dropped.
        assert_eq!(
            mine_part_key("SM_02_Axle_Mount_003"),
            Some("02_axle_mount".to_string())
        );
    }

    #[test]
    fn test_mine_part_key_normalization() {
        // Whitespace collapses to underscores and `_low` is stripped before
        // tokenizing.
        assert_eq!(
            mine_part_key("SM 01 Gear Housing_low"),
            Some("01_gear_housing".to_string())
        );
        assert_eq!(
            mine_part_key("SM_01_Gear.Housing"),
            Some("01_gearhousing".to_string())
        );
    }

    #[test]
    fn test_mine_part_key_rejections() {
        // No numeric token at all.
        assert_eq!(mine_part_key("Gear_Housing"), None);
        // Fewer than two collected tokens.
        assert_eq!(mine_part_key("SM_01_matMetal"), None);
        assert_eq!(mine_part_key("SM_01"), None);
        assert_eq!(mine_part_key(""), None);
    }

    #[test]
    fn test_synthetic_resolution_prefers_mesh_then_material_then_ancestors() {
        let naming = SyntheticNaming::default();
        let chain = vec![
            "polySurface1".to_string(),
            "SM_04_Brake_Disc".to_string(),
        ];
        let set = naming.resolve(&chain, Some("SM_02_Gear_Housing_matMetal"));
        // Mesh name yields nothing, material name wins before the ancestor.
        assert_eq!(set.part_key, Some("02_gear_housing".to_string()));
        assert_eq!(set.variant_key, "matmetal");
    }

    #[test]
    fn test_synthetic_default_variant_when_no_token() {
        let naming = SyntheticNaming::default();
        let chain = vec!["SM_01_Gear_Housing".to_string()];
        let set = naming.resolve(&chain, Some("lambert1"));
        assert_eq!(set.variant_key, "matstandard");
    }

    #[test]
    fn test_synthetic_filename_construction() {
        let naming = SyntheticNaming::default();
        let set = SyntheticSet {
            part_key: Some("01_gear_housing".to_string()),
            variant_key: "matmetal".to_string(),
        };
        assert_eq!(
            naming.texture_path(&set, Channel::BaseColor),
            "model_Metal_BaseColor.ktx2"
        );
        assert_eq!(
            naming.texture_path(&set, Channel::Orm),
            "model_Metal_ORM.ktx2"
        );

        // Unlisted variants get a derived display name.
        let set = SyntheticSet {
            part_key: None,
            variant_key: "matchrome".to_string(),
        };
        assert_eq!(
            naming.texture_path(&set, Channel::Normal),
            "model_Chrome_Normal.ktx2"
        );
    }
}
