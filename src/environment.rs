//! HDR environment map loading and GPU resources.
//!
//! The environment is an equirectangular HDR image uploaded as half floats
//! with a full prefiltered mip chain; the PBR pass selects a mip by surface
//! roughness and the sky pass shows the base level behind the model.

use wgpu::util::DeviceExt;

use crate::data_structures::texture::{Texture, create_default_sampler};
use crate::pipelines::mipmap::MipmapGenerator;

/// Environment parameters as seen by the shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EnvUniform {
    /// Intensity multiplier over the sampled radiance.
    pub intensity: f32,
    /// Mip chain length, for roughness-to-mip mapping.
    pub mip_count: f32,
    /// 1.0 when an environment is bound, 0.0 for the constant fallback.
    pub enabled: f32,
    pub _pad: f32,
}

/// Bind group layout for the environment (group 2 of the PBR pass).
pub fn env_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("env bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

/// A bound environment map.
#[derive(Debug)]
pub struct Environment {
    pub texture: Texture,
    pub uniform_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub mip_count: u32,
}

impl Environment {
    /// Decode an equirectangular HDR/EXR image and prefilter its mip chain.
    pub fn from_hdr_bytes(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        mips: &MipmapGenerator,
        bytes: &[u8],
        intensity: f32,
    ) -> anyhow::Result<Self> {
        let texture = Texture::from_hdr_bytes(device, queue, bytes, "hdr environment", 1)?;
        mips.generate(device, queue, &texture.texture);
        let mip_count = texture.texture.mip_level_count();

        let uniform = EnvUniform {
            intensity,
            mip_count: mip_count as f32,
            enabled: 1.0,
            _pad: 0.0,
        };
        Ok(Self::bind(device, layout, texture, uniform, mip_count))
    }

    /// A 1x1 black environment for sessions without one configured; shaders
    /// fall back to a constant ambient term when `enabled` is zero.
    pub fn disabled(device: &wgpu::Device, queue: &wgpu::Queue, layout: &wgpu::BindGroupLayout) -> Self {
        let texture = Texture::create_solid(
            device,
            queue,
            "disabled environment",
            [0, 0, 0, 255],
            crate::data_structures::texture::ColorSpace::Linear,
        );
        let uniform = EnvUniform {
            intensity: 0.0,
            mip_count: 1.0,
            enabled: 0.0,
            _pad: 0.0,
        };
        Self::bind(device, layout, texture, uniform, 1)
    }

    fn bind(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        texture: Texture,
        uniform: EnvUniform,
        mip_count: u32,
    ) -> Self {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("env uniform buffer"),
            contents: bytemuck::bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let sampler = texture
            .sampler
            .clone()
            .unwrap_or_else(|| create_default_sampler(device));
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("env bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        Self {
            texture,
            uniform_buffer,
            bind_group,
            mip_count,
        }
    }
}
