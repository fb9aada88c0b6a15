//! Scene loading orchestration.
//!
//! One [`load_session`] future loads everything a session needs: the
//! environment map and the model concurrently, then every mesh's material
//! with fan-out/fan-in over the texture pipeline. Results are delivered to
//! the event loop as [`ViewerEvent`]s; if the loop is gone by then the
//! results are simply dropped.
//!
//! Failure severity follows the error design: the model or the environment
//! failing is critical (loading stops, nothing is shown); a texture channel
//! failing is tolerated per channel; an unresolvable mesh falls back to the
//! flat default material.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::config::{NamingConfig, ViewerConfig};
use crate::context::Context;
use crate::data_structures::model::{Material, Mesh, Model};
use crate::data_structures::texture::ColorSpace;
use crate::environment::Environment;
use crate::manifest::Manifest;
use crate::material::{self, DefaultMaps, Naming};
use crate::pipelines::mipmap::MipmapGenerator;
use crate::resources::fetch::{self, Fetched, Location};
use crate::resources::texture::{TextureCache, TexturePipeline};
use crate::telemetry::Telemetry;

/// Results of the load tasks, delivered to the event loop.
pub enum ViewerEvent {
    /// GPU context is up (web bootstrap path; native blocks instead).
    Ready(Box<Context>),
    /// Environment decoded and prefiltered.
    EnvironmentReady(Box<Environment>),
    /// Model geometry loaded and every mesh's material settled.
    SceneReady(Box<Model>),
    /// Critical failure; the message is surfaced to the operator.
    LoadFailed(String),
}

impl std::fmt::Debug for ViewerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Ready"),
            Self::EnvironmentReady(env) => {
                f.debug_tuple("EnvironmentReady").field(&env.mip_count).finish()
            }
            Self::SceneReady(model) => f
                .debug_struct("SceneReady")
                .field("meshes", &model.meshes.len())
                .finish(),
            Self::LoadFailed(message) => f.debug_tuple("LoadFailed").field(message).finish(),
        }
    }
}

/// Everything the load tasks need, cloned out of the context so the future
/// owns its handles outright.
pub struct SceneRequest {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub material_layout: wgpu::BindGroupLayout,
    pub env_layout: wgpu::BindGroupLayout,
    pub mips: Arc<MipmapGenerator>,
    pub default_maps: DefaultMaps,
    pub default_material: Arc<Material>,
    pub telemetry: Arc<Telemetry>,
    pub config: ViewerConfig,
    pub max_anisotropy: u16,
}

impl SceneRequest {
    pub fn new(ctx: &Context, config: ViewerConfig, telemetry: Arc<Telemetry>) -> Self {
        Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            material_layout: ctx.layouts.material.clone(),
            env_layout: ctx.layouts.env.clone(),
            mips: ctx.mips.clone(),
            default_maps: ctx.default_maps.clone(),
            default_material: ctx.default_material.clone(),
            telemetry,
            config,
            max_anisotropy: crate::context::MAX_ANISOTROPY,
        }
    }
}

/// Load the whole session, emitting an event per settled stage.
pub async fn load_session(request: SceneRequest, emit: impl Fn(ViewerEvent)) {
    let client = reqwest::Client::new();

    let env_task = load_environment(&request, &client);
    let scene_task = load_scene(&request, &client);
    let (env, scene) = futures::join!(env_task, scene_task);

    match env {
        Ok(Some(environment)) => emit(ViewerEvent::EnvironmentReady(Box::new(environment))),
        Ok(None) => {}
        Err(message) => {
            request.telemetry.fail(message.clone());
            emit(ViewerEvent::LoadFailed(message));
            return;
        }
    }
    match scene {
        Ok(model) => emit(ViewerEvent::SceneReady(Box::new(model))),
        Err(message) => {
            request.telemetry.fail(message.clone());
            emit(ViewerEvent::LoadFailed(message));
        }
    }
}

async fn load_environment(
    request: &SceneRequest,
    client: &reqwest::Client,
) -> Result<Option<Environment>, String> {
    let Some(path) = request.config.environment.as_deref() else {
        return Ok(None);
    };
    request.telemetry.asset_started();
    let result = async {
        let location = Location::parse(path).map_err(|e| e.to_string())?;
        let fetched = fetch::fetch(client, &location)
            .await
            .map_err(|e| format!("environment map {}: {}", location, e))?;
        Environment::from_hdr_bytes(
            &request.device,
            &request.queue,
            &request.env_layout,
            &request.mips,
            &fetched.bytes,
            request.config.env_intensity,
        )
        .map_err(|e| format!("environment map {}: {}", location, e))
    }
    .await;
    request.telemetry.asset_settled();
    result.map(Some)
}

async fn load_scene(request: &SceneRequest, client: &reqwest::Client) -> Result<Model, String> {
    // The manifest, for the manifest naming policy. A broken manifest is
    // not critical: resolution degrades to the flat fallback everywhere.
    let manifest = match &request.config.naming {
        NamingConfig::Manifest { manifest } => {
            request.telemetry.asset_started();
            let loaded = fetch_manifest(client, manifest).await;
            request.telemetry.asset_settled();
            match loaded {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    log::error!("manifest {}: {}; all parts will render flat", manifest, e);
                    None
                }
            }
        }
        NamingConfig::Synthetic { .. } => None,
    };
    let naming = Naming::from_config(&request.config.naming, manifest);

    // The model itself; failure here is critical.
    request.telemetry.model_started();
    let model_location =
        Location::parse(&request.config.model).map_err(|e| e.to_string())?;
    let fetched = fetch::fetch(client, &model_location)
        .await
        .map_err(|e| format!("model {}: {}", model_location, e))?;
    let model_size = resolve_size(client, &model_location, &fetched, request.config.probe_sizes).await;
    let geometry = crate::resources::load_model_glb(
        &request.device,
        &fetched.bytes,
        &model_location,
        client,
    )
    .await
    .map_err(|e| format!("model {}: {}", model_location, e))?;
    request.telemetry.model_finished(model_size);

    // Materials: plan every mesh, then fan out over the distinct texture
    // locations so shared textures fetch exactly once, then bind per mesh.
    let assets_base =
        Location::parse(&request.config.assets_base).map_err(|e| e.to_string())?;
    let pipeline = TexturePipeline {
        device: request.device.clone(),
        queue: request.queue.clone(),
        mips: request.mips.clone(),
        client: client.clone(),
        cache: TextureCache::default(),
        telemetry: request.telemetry.clone(),
        max_anisotropy: request.max_anisotropy,
        probe_sizes: request.config.probe_sizes,
    };

    let plans: Vec<_> = geometry
        .meshes
        .iter()
        .map(|mesh| {
            match material::plan_material(
                &naming,
                &assets_base,
                &mesh.chain,
                mesh.material_name.as_deref(),
            ) {
                Ok(plan) => plan,
                Err(e) => {
                    log::warn!("mesh {:?}: cannot plan textures: {}", mesh.name, e);
                    None
                }
            }
        })
        .collect();

    let mut distinct: HashMap<String, (Location, ColorSpace)> = HashMap::new();
    for plan in plans.iter().flatten() {
        for (channel, location) in plan.channels() {
            distinct
                .entry(location.to_string())
                .or_insert_with(|| (location.clone(), channel.color_space()));
        }
    }
    join_all(
        distinct
            .values()
            .map(|(location, color_space)| pipeline.load(location, *color_space)),
    )
    .await;

    let materials = join_all(geometry.meshes.iter().zip(&plans).map(|(mesh, plan)| {
        let pipeline = &pipeline;
        let request = &request;
        async move {
            match plan {
                Some(plan) => Arc::new(
                    material::build_material(
                        pipeline,
                        &request.material_layout,
                        &request.default_maps,
                        &mesh.name,
                        plan,
                    )
                    .await,
                ),
                None => {
                    log::warn!(
                        "mesh {:?}: no manifest entry resolved, using flat fallback",
                        mesh.name
                    );
                    request.default_material.clone()
                }
            }
        }
    }))
    .await;

    let mut model = Model {
        meshes: Vec::with_capacity(geometry.meshes.len()),
        materials,
        bounds: geometry.bounds,
    };
    for (index, source) in geometry.meshes.into_iter().enumerate() {
        model.meshes.push(Mesh {
            name: source.name,
            vertex_buffer: source.vertex_buffer,
            index_buffer: source.index_buffer,
            num_elements: source.num_elements,
            material: index,
        });
    }

    Ok(model)
}

async fn fetch_manifest(client: &reqwest::Client, path: &str) -> Result<Manifest, String> {
    let location = Location::parse(path).map_err(|e| e.to_string())?;
    let fetched = fetch::fetch(client, &location)
        .await
        .map_err(|e| e.to_string())?;
    Manifest::from_slice(&fetched.bytes).map_err(|e| e.to_string())
}

/// Preferred size source is the transfer itself; a probe only runs when the
/// transfer size read zero and probing was explicitly enabled.
async fn resolve_size(
    client: &reqwest::Client,
    location: &Location,
    fetched: &Fetched,
    probe_enabled: bool,
) -> Option<u64> {
    match fetched.transfer_size {
        Some(n) if n > 0 => Some(n),
        other => {
            if probe_enabled {
                fetch::probe_size(client, location).await.or(other)
            } else {
                other
            }
        }
    }
}
