//! Material planning and construction.
//!
//! For every mesh the naming policy yields a [`MaterialPlan`]: which part
//! and variant the mesh belongs to and where its channel textures live.
//! [`build_material`] then fetches the three channels with fan-out/fan-in
//! and binds whatever arrived; a channel that failed to load is tolerated
//! and filled with a neutral pixel. A mesh with no plan at all gets the
//! shared flat fallback material.

use std::sync::Arc;

use crate::config::NamingConfig;
use crate::data_structures::model::{Material, MaterialFactors};
use crate::data_structures::texture::Texture;
use crate::manifest::{Channel, Manifest};
use crate::resolve::{self, SyntheticNaming};
use crate::resources::fetch::{FetchError, Location};
use crate::resources::texture::TexturePipeline;

/// Runtime naming policy, constructed from config (and, for the manifest
/// policy, the fetched manifest document).
pub enum Naming {
    Manifest(Manifest),
    Synthetic(SyntheticNaming),
}

impl Naming {
    /// Build the runtime policy. A manifest-mode config whose manifest could
    /// not be fetched degrades to an empty manifest: every mesh then reports
    /// no-match and renders with the flat fallback, never the other policy.
    pub fn from_config(config: &NamingConfig, manifest: Option<Manifest>) -> Self {
        match config {
            NamingConfig::Manifest { .. } => Naming::Manifest(manifest.unwrap_or_default()),
            NamingConfig::Synthetic { .. } => Naming::Synthetic(config.synthetic_naming()),
        }
    }
}

/// Where one mesh's textures come from.
#[derive(Clone, Debug)]
pub struct MaterialPlan {
    pub part_key: String,
    pub variant_key: String,
    pub base_color: Option<Location>,
    pub normal: Option<Location>,
    pub orm: Option<Location>,
}

impl MaterialPlan {
    fn channel(&self, channel: Channel) -> Option<&Location> {
        match channel {
            Channel::BaseColor => self.base_color.as_ref(),
            Channel::Normal => self.normal.as_ref(),
            Channel::Orm => self.orm.as_ref(),
        }
    }

    /// Declared channel locations, for pre-fetch deduplication.
    pub fn channels(&self) -> impl Iterator<Item = (Channel, &Location)> {
        Channel::ALL
            .into_iter()
            .filter_map(|c| self.channel(c).map(|loc| (c, loc)))
    }
}

/// Resolve one mesh against the naming policy.
///
/// `Ok(None)` means the manifest policy found no entry; the caller falls
/// back to the flat default material. The synthetic policy always yields a
/// plan.
pub fn plan_material(
    naming: &Naming,
    assets_base: &Location,
    chain: &[String],
    material_name: Option<&str>,
) -> Result<Option<MaterialPlan>, FetchError> {
    match naming {
        Naming::Manifest(manifest) => {
            let resolved = match resolve::resolve_part(manifest, chain, material_name) {
                Some(resolved) => resolved,
                None => return Ok(None),
            };
            let channel = |c: Channel| -> Result<Option<Location>, FetchError> {
                resolve::manifest_texture_path(&resolved, c)
                    .map(|rel| assets_base.join(&rel))
                    .transpose()
            };
            Ok(Some(MaterialPlan {
                part_key: resolved.part.key.clone(),
                variant_key: resolved.variant.key.clone(),
                base_color: channel(Channel::BaseColor)?,
                normal: channel(Channel::Normal)?,
                orm: channel(Channel::Orm)?,
            }))
        }
        Naming::Synthetic(naming) => {
            let set = naming.resolve(chain, material_name);
            let channel = |c: Channel| -> Result<Option<Location>, FetchError> {
                assets_base.join(&naming.texture_path(&set, c)).map(Some)
            };
            Ok(Some(MaterialPlan {
                part_key: set.part_key.clone().unwrap_or_default(),
                variant_key: set.variant_key.clone(),
                base_color: channel(Channel::BaseColor)?,
                normal: channel(Channel::Normal)?,
                orm: channel(Channel::Orm)?,
            }))
        }
    }
}

/// Neutral per-channel textures used when a channel is undeclared or its
/// load failed, plus the shared flat fallback material.
#[derive(Clone)]
pub struct DefaultMaps {
    pub base_color: Texture,
    pub normal: Texture,
    pub orm: Texture,
}

impl DefaultMaps {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            base_color: Texture::create_solid(
                device,
                queue,
                "default base color",
                [255, 255, 255, 255],
                crate::data_structures::texture::ColorSpace::Srgb,
            ),
            normal: Texture::create_default_normal_map(device, queue),
            orm: Texture::create_neutral_orm(device, queue),
        }
    }

    /// The flat default material substituted for unresolvable meshes.
    pub fn flat_material(&self, device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Material {
        Material::new(
            device,
            "flat fallback",
            &self.base_color,
            &self.normal,
            &self.orm,
            MaterialFactors::flat_fallback(),
            layout,
        )
    }
}

/// Fetch and bind the planned channels into a material.
///
/// The three channel loads run concurrently and settle independently; a
/// failed channel logs a warning and keeps its neutral default. The
/// material is only constructed once all channels have settled.
pub async fn build_material(
    pipeline: &TexturePipeline,
    layout: &wgpu::BindGroupLayout,
    defaults: &DefaultMaps,
    mesh_name: &str,
    plan: &MaterialPlan,
) -> Material {
    let load = |channel: Channel| async move {
        let location = plan.channel(channel)?;
        let outcome = pipeline.load(location, channel.color_space()).await;
        #[cfg(feature = "trace")]
        pipeline.telemetry.push_trace(crate::telemetry::TraceEntry {
            path: location.to_string(),
            ok: outcome.is_ok(),
            part: Some(plan.part_key.clone()),
            variant: Some(plan.variant_key.clone()),
        });
        match outcome {
            Ok(texture) => Some(texture),
            Err(e) => {
                log::warn!(
                    "mesh {:?}: {} texture {} failed to load: {}",
                    mesh_name,
                    channel.label(),
                    location,
                    e
                );
                None
            }
        }
    };

    let (base_color, normal, orm) = futures::join!(
        load(Channel::BaseColor),
        load(Channel::Normal),
        load(Channel::Orm)
    );

    let name = format!("{}/{}", plan.part_key, plan.variant_key);
    Material::new(
        &pipeline.device,
        &name,
        base_color.as_deref().unwrap_or(&defaults.base_color),
        normal.as_deref().unwrap_or(&defaults.normal),
        orm.as_deref().unwrap_or(&defaults.orm),
        MaterialFactors::default(),
        layout,
    )
}
