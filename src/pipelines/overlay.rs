//! Grid and bounding-box overlay pipelines. Both draw line lists with
//! vertices generated from the vertex index, so neither needs a vertex
//! buffer.

use wgpu::{BindGroupLayout, ShaderModule};

use crate::data_structures::texture::Texture;

/// Grid parameters as laid out in GPU memory.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GridUniform {
    params: [f32; 4],
    color: [f32; 4],
}

impl GridUniform {
    pub fn new(spacing: f32, half_count: u32, color: [f32; 4]) -> Self {
        Self {
            params: [spacing, half_count as f32, 0.0, 0.0],
            color,
        }
    }

    /// Vertex count for the line list the grid shader generates.
    pub fn vertex_count(half_count: u32) -> u32 {
        let lines_per_axis = half_count * 2 + 1;
        lines_per_axis * 2 * 2
    }
}

/// Bounding-box parameters as laid out in GPU memory. The model matrix maps
/// a unit cube centered at the origin onto the box being outlined.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BboxUniform {
    model: [[f32; 4]; 4],
    color: [f32; 4],
}

impl BboxUniform {
    pub fn new(model: cgmath::Matrix4<f32>, color: [f32; 4]) -> Self {
        Self {
            model: model.into(),
            color,
        }
    }
}

/// Vertex count of the 12-edge line list drawn by the bbox shader.
pub const BBOX_VERTEX_COUNT: u32 = 24;

pub fn overlay_bind_group_layout(device: &wgpu::Device) -> BindGroupLayout {
    super::single_uniform_layout(device, "overlay_bind_group_layout")
}

fn line_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: &ShaderModule,
    camera_layout: &BindGroupLayout,
    overlay_layout: &BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[camera_layout, overlay_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: Texture::HDR_FORMAT,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::LineList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        // test against the scene depth but never write it
        depth_stencil: Some(wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}

pub fn mk_grid_pipeline(
    device: &wgpu::Device,
    camera_layout: &BindGroupLayout,
    overlay_layout: &BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Grid Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("grid.wgsl").into()),
    });
    line_pipeline(device, "Grid Pipeline", &shader, camera_layout, overlay_layout)
}

pub fn mk_bbox_pipeline(
    device: &wgpu::Device,
    camera_layout: &BindGroupLayout,
    overlay_layout: &BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Bbox Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("bbox.wgsl").into()),
    });
    line_pipeline(device, "Bbox Pipeline", &shader, camera_layout, overlay_layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_vertex_count_covers_both_axes() {
        // 21 lines per axis, 2 axes, 2 endpoints each
        assert_eq!(GridUniform::vertex_count(10), 84);
    }
}
