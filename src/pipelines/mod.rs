//! Definitions for the per-pass render pipelines.
//!
//! One linked pipeline per pass: geometry stage, deferred lighting, volume
//! raymarch compositing, selection, grid/bbox overlays and the final blit.
//! All of them are created once during context setup and live until the
//! context is dropped; a shader that fails to compile or link aborts setup.

pub mod blit;
pub mod geometry;
pub mod lighting;
pub mod overlay;
pub mod selection;
pub mod volume;

/// All pass pipelines plus the bind group layouts that outlive setup.
#[derive(Debug)]
pub struct Pipelines {
    pub geometry: wgpu::RenderPipeline,
    pub lighting: wgpu::RenderPipeline,
    pub volume: wgpu::RenderPipeline,
    pub selection: wgpu::RenderPipeline,
    pub grid: wgpu::RenderPipeline,
    pub bbox: wgpu::RenderPipeline,
    pub blit: wgpu::RenderPipeline,

    pub model_layout: wgpu::BindGroupLayout,
    pub gbuffer_layout: wgpu::BindGroupLayout,
    pub lights_layout: wgpu::BindGroupLayout,
    pub volume_layout: wgpu::BindGroupLayout,
    pub overlay_layout: wgpu::BindGroupLayout,
    pub blit_layout: wgpu::BindGroupLayout,
}

impl Pipelines {
    /// Compile and link every pass program.
    ///
    /// `filterable_volume` selects the volume sampler fast path: linear
    /// filtering of float 3D textures when the adapter supports it, nearest
    /// filtering otherwise.
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        camera_layout: &wgpu::BindGroupLayout,
        filterable_volume: bool,
    ) -> Self {
        let model_layout = geometry::model_bind_group_layout(device);
        let gbuffer_layout = lighting::gbuffer_bind_group_layout(device);
        let lights_layout = lighting::lights_bind_group_layout(device);
        let volume_layout = volume::volume_bind_group_layout(device, filterable_volume);
        let overlay_layout = overlay::overlay_bind_group_layout(device);
        let blit_layout = blit::blit_bind_group_layout(device);

        Self {
            geometry: geometry::mk_geometry_pipeline(device, camera_layout, &model_layout),
            lighting: lighting::mk_lighting_pipeline(
                device,
                camera_layout,
                &gbuffer_layout,
                &lights_layout,
            ),
            volume: volume::mk_volume_pipeline(device, camera_layout, &volume_layout),
            selection: selection::mk_selection_pipeline(device, camera_layout, &model_layout),
            grid: overlay::mk_grid_pipeline(device, camera_layout, &overlay_layout),
            bbox: overlay::mk_bbox_pipeline(device, camera_layout, &overlay_layout),
            blit: blit::mk_blit_pipeline(device, surface_format, &blit_layout),
            model_layout,
            gbuffer_layout,
            lights_layout,
            volume_layout,
            overlay_layout,
            blit_layout,
        }
    }
}

/// Layout with a single uniform buffer visible to both stages; shared by the
/// model, lights and overlay bind groups.
pub(crate) fn single_uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some(label),
    })
}
