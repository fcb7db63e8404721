//! Deferred lighting pass pipeline and the lights uniform.

use wgpu::{BindGroupLayout, ShaderModule};

use crate::data_structures::texture::Texture;
use crate::scene::Light;

/// Maximum number of directional lights the lighting pass composes.
pub const MAX_LIGHTS: usize = 8;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct LightRaw {
    color_ambient: [f32; 4],
    direction: [f32; 4],
}

/// Light data as laid out in GPU memory. Lights beyond [`MAX_LIGHTS`] are
/// dropped with a log message.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightsUniform {
    count: [u32; 4],
    lights: [LightRaw; MAX_LIGHTS],
}

impl LightsUniform {
    pub fn from_lights<'a>(lights: impl Iterator<Item = &'a Light>) -> Self {
        let mut uniform = Self {
            count: [0; 4],
            lights: [LightRaw {
                color_ambient: [0.0; 4],
                direction: [0.0; 4],
            }; MAX_LIGHTS],
        };
        for light in lights {
            let i = uniform.count[0] as usize;
            if i >= MAX_LIGHTS {
                log::warn!("more than {} lights, dropping the rest", MAX_LIGHTS);
                break;
            }
            uniform.lights[i] = LightRaw {
                color_ambient: [
                    light.color[0],
                    light.color[1],
                    light.color[2],
                    light.ambient_factor,
                ],
                direction: [
                    light.direction[0],
                    light.direction[1],
                    light.direction[2],
                    0.0,
                ],
            };
            uniform.count[0] += 1;
        }
        uniform
    }

    pub fn len(&self) -> u32 {
        self.count[0]
    }
}

pub fn gbuffer_bind_group_layout(device: &wgpu::Device) -> BindGroupLayout {
    let texture_entry = |binding, sample_type| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            texture_entry(0, wgpu::TextureSampleType::Float { filterable: false }),
            texture_entry(1, wgpu::TextureSampleType::Float { filterable: false }),
            texture_entry(2, wgpu::TextureSampleType::Depth),
        ],
        label: Some("gbuffer_bind_group_layout"),
    })
}

pub fn lights_bind_group_layout(device: &wgpu::Device) -> BindGroupLayout {
    super::single_uniform_layout(device, "lights_bind_group_layout")
}

fn lighting_shader(device: &wgpu::Device) -> ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Lighting Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("lighting.wgsl").into()),
    })
}

pub fn mk_lighting_pipeline(
    device: &wgpu::Device,
    camera_layout: &BindGroupLayout,
    gbuffer_layout: &BindGroupLayout,
    lights_layout: &BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Lighting Pipeline Layout"),
        bind_group_layouts: &[camera_layout, gbuffer_layout, lights_layout],
        push_constant_ranges: &[],
    });
    let shader = lighting_shader(device);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Lighting Pipeline"),
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
                blend: None,
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

    fn light(ambient: f32) -> Light {
        Light {
            color: [1.0, 0.5, 0.25],
            direction: [0.0, 1.0, 0.0],
            ambient_factor: ambient,
        }
    }

    #[test]
    fn uniform_counts_lights() {
        let lights = [light(0.1), light(0.2)];
        let uniform = LightsUniform::from_lights(lights.iter());
        assert_eq!(uniform.len(), 2);
    }

    #[test]
    fn uniform_caps_at_max_lights() {
        let lights: Vec<_> = (0..20).map(|_| light(0.0)).collect();
        let uniform = LightsUniform::from_lights(lights.iter());
        assert_eq!(uniform.len(), MAX_LIGHTS as u32);
    }
}
