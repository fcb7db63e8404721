//! Public facade and the window event loop.
//!
//! [`Visualizer`] owns the render thread side: it runs the winit event loop,
//! drives a [`Renderer`] every redraw and reacts to input. [`SceneClient`] is
//! the producer-side handle: cloneable, sendable and safe to use from any
//! thread; every mutation travels through the admission queue and is applied
//! by the render thread before the next frame.
//!
//! The event loop follows this pattern each frame:
//! 1. Resolve the pick readback issued last frame
//! 2. Drain the admission queue and apply scene mutations
//! 3. Update camera and light uniforms
//! 4. Record and submit the pass sequence
//! 5. Kick off a selection render if a pick was requested

use std::sync::Arc;

use anyhow::ensure;
use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use crate::admission::{PendingOp, PickResult, Shared};
use crate::context::Context;
use crate::data_structures::mesh::MeshVertex;
use crate::data_structures::volume::{VolumeDescriptor, VolumeKind};
use crate::error::SetupError;
use crate::render::Renderer;
use crate::scene::{GeometryData, Light, Material, Transform};

/// Producer-side handle into a running (or starting) visualizer.
///
/// All methods are callable from any thread and never touch the GPU; they
/// enqueue work the render thread applies before its next frame.
#[derive(Debug, Clone)]
pub struct SceneClient {
    shared: Arc<Shared>,
}

impl SceneClient {
    /// Create or replace a geometry under the given name.
    pub fn upsert_geometry(
        &self,
        name: &str,
        vertices: Vec<MeshVertex>,
        indices: Vec<u32>,
        transform: Transform,
        material: Material,
    ) {
        self.shared.queue.submit(PendingOp::UpsertGeometry(
            name.to_string(),
            GeometryData {
                vertices,
                indices,
                transform,
                material,
                visible: true,
            },
        ));
    }

    /// Update only the transform of an existing geometry.
    pub fn set_transform(&self, name: &str, transform: Transform) {
        self.shared
            .queue
            .submit(PendingOp::SetTransform(name.to_string(), transform));
    }

    pub fn remove_geometry(&self, name: &str) {
        self.shared
            .queue
            .submit(PendingOp::RemoveGeometry(name.to_string()));
    }

    /// Replace the resident volume with scalar data, one `f32` per voxel.
    /// The samples are copied; the caller keeps ownership of its buffer.
    pub fn set_volume_scalar(
        &self,
        dimensions: [u32; 3],
        voxel_spacing: [f32; 3],
        samples: &[f32],
    ) -> anyhow::Result<()> {
        let descriptor = VolumeDescriptor {
            dimensions,
            voxel_spacing,
            kind: VolumeKind::Scalar,
        };
        ensure!(
            dimensions.iter().all(|&d| d > 0),
            "volume dimensions must all be non-zero, got {:?}",
            dimensions
        );
        ensure!(
            samples.len() == descriptor.voxel_count(),
            "scalar volume of {:?} needs {} samples, got {}",
            dimensions,
            descriptor.voxel_count(),
            samples.len()
        );
        let texels = descriptor.expand_samples(samples);
        self.shared
            .queue
            .submit(PendingOp::SetVolume(descriptor, texels));
        Ok(())
    }

    /// Replace the resident volume with color data, one RGB triplet per voxel.
    pub fn set_volume_color(
        &self,
        dimensions: [u32; 3],
        voxel_spacing: [f32; 3],
        samples: &[f32],
    ) -> anyhow::Result<()> {
        let descriptor = VolumeDescriptor {
            dimensions,
            voxel_spacing,
            kind: VolumeKind::Color,
        };
        ensure!(
            dimensions.iter().all(|&d| d > 0),
            "volume dimensions must all be non-zero, got {:?}",
            dimensions
        );
        ensure!(
            samples.len() == 3 * descriptor.voxel_count(),
            "color volume of {:?} needs {} samples, got {}",
            dimensions,
            3 * descriptor.voxel_count(),
            samples.len()
        );
        let texels = descriptor.expand_samples(samples);
        self.shared
            .queue
            .submit(PendingOp::SetVolume(descriptor, texels));
        Ok(())
    }

    /// Add or replace a directional light.
    pub fn add_light(&self, id: u16, light: Light) {
        self.shared.queue.submit(PendingOp::AddLight(id, light));
    }

    pub fn show_grid(&self, on: bool) {
        self.shared.settings.set_show_grid(on);
    }

    pub fn show_volume_bounding_box(&self, on: bool) {
        self.shared.settings.set_show_volume_bbox(on);
    }

    /// Scene scale: world units per physical unit of volume spacing.
    pub fn set_scale(&self, scale: f32) {
        self.shared.settings.set_scale(scale);
    }

    /// Request a pick at the given surface pixel. A newer request supersedes
    /// a pending one.
    pub fn request_pick_at(&self, x: u32, y: u32) {
        self.shared.picks.request(x, y);
    }

    /// Poll for the result of the most recent pick. Returns `None` while the
    /// readback is still in flight.
    pub fn take_pick_result(&self) -> Option<PickResult> {
        self.shared.picks.take_result()
    }

    /// Ask the render thread to shut down after its current frame. Queued
    /// ops that were not applied yet are discarded.
    pub fn close(&self) {
        self.shared.request_shutdown();
    }
}

/// Owns the event loop; consumed by [`Visualizer::start`].
#[derive(Debug)]
pub struct Visualizer {
    shared: Arc<Shared>,
}

impl Visualizer {
    /// Create the visualizer plus a client handle for producer threads. The
    /// client can be cloned freely and used before and after `start`.
    pub fn new() -> (Self, SceneClient) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            SceneClient {
                shared: Arc::clone(&shared),
            },
        )
    }

    /// Run the window event loop on the calling thread until the window is
    /// closed. Setup failures are returned; per-frame errors are logged and
    /// retried.
    pub fn start(self) -> Result<(), SetupError> {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        }

        #[cfg(all(feature = "integration-tests", target_os = "linux"))]
        let event_loop: EventLoop<()> = {
            use winit::platform::wayland::EventLoopBuilderExtWayland;

            EventLoop::builder()
                .with_any_thread(true)
                .build()
                .expect("Failed to create an event loop")
        };

        #[cfg(all(feature = "integration-tests", target_os = "windows"))]
        let event_loop: EventLoop<()> = {
            use winit::platform::windows::EventLoopBuilderExtWindows;

            EventLoop::builder()
                .with_any_thread(true)
                .build()
                .expect("Failed to create an event loop")
        };

        #[cfg(not(feature = "integration-tests"))]
        let event_loop: EventLoop<()> = EventLoop::new()?;

        let mut app = App::new(self.shared);
        event_loop.run_app(&mut app)?;

        if let Some(e) = app.setup_error {
            return Err(e);
        }
        Ok(())
    }
}

struct AppState {
    ctx: Context,
    renderer: Renderer,
}

struct App {
    shared: Arc<Shared>,
    async_runtime: tokio::runtime::Runtime,
    state: Option<AppState>,
    setup_error: Option<SetupError>,
    last_time: Instant,
    cursor: winit::dpi::PhysicalPosition<f64>,
    left_pressed: bool,
}

impl App {
    fn new(shared: Arc<Shared>) -> Self {
        let async_runtime = tokio::runtime::Runtime::new()
            .expect("Failed to create the async runtime for GPU readbacks");
        Self {
            shared,
            async_runtime,
            state: None,
            setup_error: None,
            last_time: Instant::now(),
            cursor: winit::dpi::PhysicalPosition::new(0.0, 0.0),
            left_pressed: false,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window_attributes = Window::default_attributes()
            .with_title("voxvis")
            .with_inner_size(winit::dpi::LogicalSize::new(800.0, 600.0));
        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.setup_error = Some(SetupError::Window(e));
                event_loop.exit();
                return;
            }
        };

        match self.async_runtime.block_on(Context::new(window)) {
            Ok(ctx) => {
                let renderer = Renderer::new(&ctx);
                ctx.window().request_redraw();
                self.state = Some(AppState { ctx, renderer });
            }
            Err(e) => {
                log::error!("context setup failed: {}", e);
                self.setup_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if self.left_pressed {
                // Dragging with a picked geometry moves it; otherwise the
                // drag orbits the camera.
                if !state.renderer.drag_selected(&state.ctx, dx as f32, dy as f32) {
                    let speed_factor = 5.0;
                    state
                        .ctx
                        .camera
                        .controller
                        .handle_mouse(dx * speed_factor, dy * speed_factor);
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };

        state.ctx.camera.controller.handle_window_events(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.ctx.resize(size.width, size.height);
                state.renderer.resize(&state.ctx);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = position;
            }
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => {
                let pressed = button_state == ElementState::Pressed;
                if pressed && !self.left_pressed {
                    // A press requests a pick at the cursor; the following
                    // drag either moves the picked geometry or orbits.
                    self.shared
                        .picks
                        .request(self.cursor.x as u32, self.cursor.y as u32);
                }
                self.left_pressed = pressed;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed && !event.repeat {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::KeyG) => self.shared.settings.toggle_grid(),
                        PhysicalKey::Code(KeyCode::KeyB) => {
                            self.shared.settings.toggle_volume_bbox()
                        }
                        _ => {}
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if self.shared.shutdown_requested() {
                    event_loop.exit();
                    return;
                }
                state.ctx.window().request_redraw();

                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();

                match state.renderer.render(
                    &mut state.ctx,
                    &self.shared,
                    &self.async_runtime,
                    dt,
                ) {
                    Ok(()) => {}
                    Err(crate::error::RenderError::Surface(
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                    )) => {
                        // Reconfigure the surface and retry on the next redraw
                        let size = state.ctx.window().inner_size();
                        state.ctx.resize(size.width, size.height);
                        state.renderer.resize(&state.ctx);
                    }
                    Err(e) => {
                        log::error!("Unable to render {}", e);
                    }
                }
            }
            _ => {}
        }
    }
}
