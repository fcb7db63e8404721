//! Volume raymarch compositing pipeline.
//!
//! Blends the accumulated volume color over the lit HDR image. The sampler
//! fast path (linear filtering of float 3D textures) is only taken when the
//! adapter reports `FLOAT32_FILTERABLE`; otherwise the pass degrades to
//! nearest-neighbor sampling instead of failing.

use wgpu::{BindGroupLayout, ShaderModule};

use crate::data_structures::texture::Texture;
use crate::data_structures::volume::{VolumeDescriptor, VolumeKind};

/// Volume parameters as laid out in GPU memory.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VolumeInfoUniform {
    half_size: [f32; 4],
    params: [f32; 4],
}

impl VolumeInfoUniform {
    pub fn new(descriptor: &VolumeDescriptor, scale: f32, opacity: f32) -> Self {
        let size = descriptor.world_size(scale);
        let kind = match descriptor.kind {
            VolumeKind::Scalar => 0.0,
            VolumeKind::Color => 1.0,
        };
        Self {
            half_size: [size[0] / 2.0, size[1] / 2.0, size[2] / 2.0, kind],
            params: [opacity, 0.0, 0.0, 0.0],
        }
    }
}

pub fn volume_bind_group_layout(device: &wgpu::Device, filterable: bool) -> BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension: wgpu::TextureViewDimension::D3,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(if filterable {
                    wgpu::SamplerBindingType::Filtering
                } else {
                    wgpu::SamplerBindingType::NonFiltering
                }),
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
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
        ],
        label: Some("volume_bind_group_layout"),
    })
}

/// Sampler matching the layout's capability-selected binding type.
pub fn mk_volume_sampler(device: &wgpu::Device, filterable: bool) -> wgpu::Sampler {
    let filter = if filterable {
        wgpu::FilterMode::Linear
    } else {
        wgpu::FilterMode::Nearest
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

fn volume_shader(device: &wgpu::Device) -> ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Volume Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("volume.wgsl").into()),
    })
}

pub fn mk_volume_pipeline(
    device: &wgpu::Device,
    camera_layout: &BindGroupLayout,
    volume_layout: &BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Volume Pipeline Layout"),
        bind_group_layouts: &[camera_layout, volume_layout],
        push_constant_ranges: &[],
    });
    let shader = volume_shader(device);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Volume Pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: Texture::HDR_FORMAT,
                // blend the raymarch result over the lit scene
                blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_uniform_halves_world_size() {
        let descriptor = VolumeDescriptor {
            dimensions: [32, 32, 64],
            voxel_spacing: [1.0, 1.0, 0.5],
            kind: VolumeKind::Scalar,
        };
        let info = VolumeInfoUniform::new(&descriptor, 1.0, 1.0);
        assert_eq!(info.half_size[0], 16.0);
        assert_eq!(info.half_size[2], 16.0);
        assert_eq!(info.half_size[3], 0.0);
    }

    #[test]
    fn info_uniform_flags_color_volumes() {
        let descriptor = VolumeDescriptor {
            dimensions: [8, 8, 8],
            voxel_spacing: [1.0; 3],
            kind: VolumeKind::Color,
        };
        let info = VolumeInfoUniform::new(&descriptor, 1.0, 1.0);
        assert_eq!(info.half_size[3], 1.0);
    }
}
