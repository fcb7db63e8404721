//! WGPU context setup and the per-resolution frame targets.

use std::marker::PhantomData;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::camera::{self, CameraResources, CameraUniform, Projection};
use crate::data_structures::texture::{self, Texture};
use crate::error::SetupError;
use crate::pipelines::lighting::LightsUniform;
use crate::pipelines::overlay::GridUniform;
use crate::pipelines::Pipelines;

/// Proof of being on the render thread.
///
/// Every entry point that touches GPU state takes a `&RenderToken`. The token
/// is created once during context setup and is not `Send`, so those entry
/// points cannot be called from producer threads by construction.
#[derive(Debug)]
pub struct RenderToken {
    _not_send: PhantomData<*const ()>,
}

impl RenderToken {
    pub(crate) fn new() -> Self {
        Self {
            _not_send: PhantomData,
        }
    }
}

/// Grid overlay defaults: 1 unit spacing, 10 lines out from the origin.
pub const GRID_SPACING: f32 = 1.0;
pub const GRID_HALF_COUNT: u32 = 10;

#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: CameraResources,
    pub projection: Projection,
    pub pipelines: Pipelines,
    pub targets: FrameTargets,
    pub lights_buffer: wgpu::Buffer,
    pub lights_bind_group: wgpu::BindGroup,
    /// Whether the adapter filters float 3D textures linearly.
    pub filterable_volume: bool,
    pub(crate) token: RenderToken,
}

impl Context {
    pub async fn new(window: Arc<Window>) -> Result<Self, SetupError> {
        let size = window.inner_size();

        log::info!("wgpu setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
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

        // Linear filtering of float volume textures is optional; without it
        // the volume pass falls back to nearest-neighbor sampling.
        let filterable_volume = adapter
            .features()
            .contains(wgpu::Features::FLOAT32_FILTERABLE);
        if !filterable_volume {
            log::warn!("FLOAT32_FILTERABLE unavailable, volume sampling degrades to nearest");
        }

        log::info!("device and queue");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: if filterable_volume {
                    wgpu::Features::FLOAT32_FILTERABLE
                } else {
                    wgpu::Features::empty()
                },
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // The blit shader assumes an sRGB surface and only tonemaps.
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
        surface.configure(&device, &config);

        let camera = camera::Camera::new((0.0, 0.0, 0.0), 10.0, cgmath::Deg(-90.0), cgmath::Deg(-20.0));
        let projection =
            camera::Projection::new(config.width, config.height, cgmath::Deg(45.0), 0.1, 500.0);
        let controller = camera::CameraController::new(1.0, 0.4);

        let mut camera_uniform = CameraUniform::new();
        camera_uniform.update_view_proj(&camera, &projection);

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group_layout = camera::mk_bind_group_layout(&device);
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });
        let camera = CameraResources {
            camera,
            controller,
            uniform: camera_uniform,
            buffer: camera_buffer,
            bind_group: camera_bind_group,
            bind_group_layout: camera_bind_group_layout,
        };

        let pipelines = Pipelines::new(
            &device,
            config.format,
            &camera.bind_group_layout,
            filterable_volume,
        );

        // Starts out black; the admission queue delivers lights later.
        let lights_uniform = LightsUniform::from_lights(std::iter::empty());
        let lights_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lights Buffer"),
            contents: bytemuck::cast_slice(&[lights_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let lights_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &pipelines.lights_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: lights_buffer.as_entire_binding(),
            }],
            label: Some("lights_bind_group"),
        });

        let targets = FrameTargets::new(&device, [config.width, config.height], &pipelines);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            camera,
            projection,
            pipelines,
            targets,
            lights_buffer,
            lights_bind_group,
            filterable_volume,
            token: RenderToken::new(),
        })
    }

    /// Reconfigure the surface and rebuild every resolution-dependent target.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.projection.resize(width, height);
        self.targets = FrameTargets::new(&self.device, [width, height], &self.pipelines);
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

/// Offscreen targets and the bind groups reading them, rebuilt on resize.
#[derive(Debug)]
pub struct FrameTargets {
    pub normal: Texture,
    pub albedo: Texture,
    pub depth: Texture,
    pub hdr: Texture,
    pub gbuffer_bind_group: wgpu::BindGroup,
    pub blit_bind_group: wgpu::BindGroup,
    pub grid_buffer: wgpu::Buffer,
    pub grid_bind_group: wgpu::BindGroup,
    pub bbox_buffer: wgpu::Buffer,
    pub bbox_bind_group: wgpu::BindGroup,
}

impl FrameTargets {
    pub fn new(device: &wgpu::Device, size: [u32; 2], pipelines: &Pipelines) -> Self {
        let normal = Texture::create_color_target(device, size, Texture::NORMAL_FORMAT, "g_normal");
        let albedo = Texture::create_color_target(device, size, Texture::ALBEDO_FORMAT, "g_albedo");
        let depth = Texture::create_depth_texture(device, size, "g_depth");
        let hdr = Texture::create_color_target(device, size, Texture::HDR_FORMAT, "hdr_target");

        let gbuffer_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &pipelines.gbuffer_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&albedo.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&depth.view),
                },
            ],
            label: Some("gbuffer_bind_group"),
        });

        let blit_sampler = texture::create_target_sampler(device);
        let blit_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &pipelines.blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&hdr.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&blit_sampler),
                },
            ],
            label: Some("blit_bind_group"),
        });

        let grid_uniform = GridUniform::new(GRID_SPACING, GRID_HALF_COUNT, [0.35, 0.35, 0.4, 1.0]);
        let grid_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Grid Buffer"),
            contents: bytemuck::cast_slice(&[grid_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let grid_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &pipelines.overlay_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: grid_buffer.as_entire_binding(),
            }],
            label: Some("grid_bind_group"),
        });

        // Rewritten each frame a volume is resident.
        let bbox_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bbox Buffer"),
            size: std::mem::size_of::<crate::pipelines::overlay::BboxUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bbox_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &pipelines.overlay_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: bbox_buffer.as_entire_binding(),
            }],
            label: Some("bbox_bind_group"),
        });

        Self {
            normal,
            albedo,
            depth,
            hdr,
            gbuffer_bind_group,
            blit_bind_group,
            grid_buffer,
            grid_bind_group,
            bbox_buffer,
            bbox_bind_group,
        }
    }
}
