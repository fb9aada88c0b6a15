//! Central GPU and window context.
//!
//! One [`Context`] is constructed per mounted window and owns every
//! per-scene GPU resource: surface, device, pipelines, camera, the mipmap
//! generator and the default material. Dropping the context tears all of it
//! down; nothing engine-side outlives it.

use std::sync::Arc;

use cgmath::Deg;
use winit::window::Window;

use crate::camera::{CameraResources, Projection};
use crate::data_structures::model::Material;
use crate::data_structures::texture::Texture;
use crate::environment::{self, Environment};
use crate::material::DefaultMaps;
use crate::pipelines::{mipmap::MipmapGenerator, pbr, sky};

/// Maximum sampler anisotropy the renderer requests; WGPU caps the valid
/// range at 16 on every backend.
pub const MAX_ANISOTROPY: u16 = 16;

pub struct Pipelines {
    pub pbr: wgpu::RenderPipeline,
    pub sky: wgpu::RenderPipeline,
}

pub struct Layouts {
    pub material: wgpu::BindGroupLayout,
    pub env: wgpu::BindGroupLayout,
}

pub struct Context {
    pub window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub depth_texture: Texture,
    pub camera: CameraResources,
    pub projection: Projection,
    pub pipelines: Pipelines,
    pub layouts: Layouts,
    pub mips: Arc<MipmapGenerator>,
    pub default_maps: DefaultMaps,
    pub default_material: Arc<Material>,
    /// Bound while no environment has loaded (or none is configured).
    pub placeholder_env: Environment,
}

impl Context {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL does not support all of wgpu's features.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // The shaders write linear values and rely on an sRGB surface for
        // the transfer function.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let projection =
            Projection::new(config.width, config.height, Deg(45.0), 0.05, 2000.0);
        let camera = CameraResources::new(&device, &projection);

        let depth_texture = Texture::create_depth_texture(
            &device,
            [config.width, config.height],
            "depth_texture",
        );

        let material_layout = pbr::material_bind_group_layout(&device);
        let env_layout = environment::env_bind_group_layout(&device);
        let pipelines = Pipelines {
            pbr: pbr::mk_pbr_pipeline(
                &device,
                &config,
                &material_layout,
                &camera.bind_group_layout,
                &env_layout,
            ),
            sky: sky::mk_sky_pipeline(&device, &config, &camera.bind_group_layout, &env_layout),
        };

        let mips = Arc::new(MipmapGenerator::new(&device));
        let default_maps = DefaultMaps::new(&device, &queue);
        let default_material = Arc::new(default_maps.flat_material(&device, &material_layout));
        let placeholder_env = Environment::disabled(&device, &queue, &env_layout);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth_texture,
            camera,
            projection,
            pipelines,
            layouts: Layouts {
                material: material_layout,
                env: env_layout,
            },
            mips,
            default_maps,
            default_material,
            placeholder_env,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.projection.resize(width, height);
        self.surface.configure(&self.device, &self.config);
        self.depth_texture =
            Texture::create_depth_texture(&self.device, [width, height], "depth_texture");
    }

    /// Push the current camera state to the GPU.
    pub fn update_camera(&mut self) {
        self.camera
            .uniform
            .update_view_proj(&self.camera.controller, &self.projection);
        self.queue.write_buffer(
            &self.camera.buffer,
            0,
            bytemuck::cast_slice(&[self.camera.uniform]),
        );
    }
}
