//! Per-frame orchestration: drains the admission queue, updates GPU-side
//! uniforms and records the pass sequence.
//!
//! Pass order is fixed: geometry into the G-buffer, deferred lighting into
//! the HDR target, volume compositing, overlays, then the blit onto the
//! surface. The selection pass only runs on frames with a pending pick
//! request and renders into the offscreen pick targets.

use instant::Duration;

use crate::admission::{PendingOp, Shared};
use crate::context::Context;
use crate::error::RenderError;
use crate::pick::PickContext;
use crate::pipelines::lighting::LightsUniform;
use crate::pipelines::overlay::{self, BboxUniform, GridUniform};
use crate::admission::PickResult;
use crate::pipelines::volume::{VolumeInfoUniform, mk_volume_sampler};
use crate::scene::SceneStore;

/// Base opacity per world-space unit of marched volume.
const VOLUME_OPACITY: f32 = 2.0;

/// Owns the scene state and drives one frame at a time.
pub struct Renderer {
    pub scene: SceneStore,
    pick: PickContext,
    volume_sampler: wgpu::Sampler,
    volume_info_buffer: wgpu::Buffer,
    volume_bind_group: Option<wgpu::BindGroup>,
    /// Set when the volume or the depth target changed; the bind group
    /// referencing them is rebuilt on the next frame.
    volume_dirty: bool,
    /// Name of the geometry the last resolved pick hit, if any. While set,
    /// a left-drag moves this geometry instead of orbiting the camera.
    selected: Option<String>,
}

impl Renderer {
    pub fn new(ctx: &Context) -> Self {
        let volume_info_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Volume Info Buffer"),
            size: std::mem::size_of::<VolumeInfoUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            scene: SceneStore::new(),
            pick: PickContext::new(&ctx.device, [ctx.config.width, ctx.config.height]),
            volume_sampler: mk_volume_sampler(&ctx.device, ctx.filterable_volume),
            volume_info_buffer,
            volume_bind_group: None,
            volume_dirty: false,
            selected: None,
        }
    }

    /// Translate the picked geometry across the view plane by a mouse delta.
    /// Returns `false` when nothing is selected (or the selection has been
    /// removed meanwhile), letting the caller fall back to the camera orbit.
    pub fn drag_selected(&mut self, ctx: &Context, dx: f32, dy: f32) -> bool {
        let Some(name) = self.selected.clone() else {
            return false;
        };
        let Some(record) = self.scene.geometry_by_name(&name) else {
            self.selected = None;
            return false;
        };
        let mut transform = record.transform;
        transform.position += ctx.camera.camera.drag_translation(dx, dy);
        self.scene
            .set_transform(&ctx.token, &ctx.queue, &name, transform)
            .is_ok()
    }

    pub fn resize(&mut self, ctx: &Context) {
        self.pick
            .resize(&ctx.device, [ctx.config.width, ctx.config.height]);
        // The volume bind group references the old depth view.
        self.volume_dirty = true;
    }

    /// Apply queued scene mutations. Render thread only; ops are taken in
    /// enqueue order and each is applied exactly once.
    fn drain_admission_queue(&mut self, ctx: &Context, shared: &Shared) {
        for op in shared.queue.drain() {
            match op {
                PendingOp::UpsertGeometry(name, data) => self.scene.upsert_geometry(
                    &ctx.token,
                    &ctx.device,
                    &ctx.queue,
                    &ctx.pipelines.model_layout,
                    &name,
                    data,
                ),
                PendingOp::SetTransform(name, transform) => {
                    if let Err(e) = self.scene.set_transform(&ctx.token, &ctx.queue, &name, transform) {
                        log::warn!("skipping transform update: {}", e);
                    }
                }
                PendingOp::RemoveGeometry(name) => self.scene.remove_geometry(&ctx.token, &name),
                PendingOp::SetVolume(descriptor, texels) => {
                    self.scene
                        .set_volume(&ctx.token, &ctx.device, &ctx.queue, descriptor, &texels);
                    self.volume_dirty = true;
                }
                PendingOp::AddLight(name, light) => self.scene.add_light(&ctx.token, name, light),
            }
        }
    }

    fn refresh_volume_bind_group(&mut self, ctx: &Context) {
        if !std::mem::take(&mut self.volume_dirty) {
            return;
        }
        let Some(volume) = self.scene.volume() else {
            self.volume_bind_group = None;
            return;
        };
        self.volume_bind_group = Some(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &ctx.pipelines.volume_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&volume.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.volume_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.volume_info_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&ctx.targets.depth.view),
                },
            ],
            label: Some("volume_bind_group"),
        }));
    }

    /// Render one frame.
    ///
    /// `Err(RenderError::Surface)` bubbles surface loss up to the event loop,
    /// which reconfigures and retries on the next redraw.
    pub fn render(
        &mut self,
        ctx: &mut Context,
        shared: &Shared,
        async_runtime: &tokio::runtime::Runtime,
        dt: Duration,
    ) -> Result<(), RenderError> {
        // Resolve the pick readback issued last frame before anything else
        // mutates the scene, so the ID maps back to the state it was
        // rendered from.
        if self.pick.has_in_flight() {
            if let Some(result) = self.pick.resolve(&ctx.token, ctx, &self.scene, async_runtime) {
                self.selected = match &result {
                    PickResult::Hit(name) => Some(name.clone()),
                    PickResult::Miss => None,
                };
                shared.picks.deliver(result);
            }
        }

        self.drain_admission_queue(ctx, shared);
        self.refresh_volume_bind_group(ctx);

        if self.scene.take_lights_dirty() {
            let uniform = LightsUniform::from_lights(self.scene.lights());
            ctx.queue
                .write_buffer(&ctx.lights_buffer, 0, bytemuck::cast_slice(&[uniform]));
        }

        let camera = &mut ctx.camera;
        camera.controller.update(&mut camera.camera, dt);
        camera
            .uniform
            .update_view_proj(&camera.camera, &ctx.projection);
        ctx.queue
            .write_buffer(&camera.buffer, 0, bytemuck::cast_slice(&[camera.uniform]));

        let scale = shared.settings.scale();
        let show_grid = shared.settings.show_grid();
        let show_bbox = shared.settings.show_volume_bbox() && self.scene.volume().is_some();

        if let Some(volume) = self.scene.volume() {
            let info = VolumeInfoUniform::new(&volume.descriptor, scale, VOLUME_OPACITY);
            ctx.queue
                .write_buffer(&self.volume_info_buffer, 0, bytemuck::cast_slice(&[info]));
            if show_bbox {
                let size = volume.descriptor.world_size(scale);
                let model = cgmath::Matrix4::from_nonuniform_scale(size[0], size[1], size[2]);
                let bbox = BboxUniform::new(model, [1.0, 0.8, 0.2, 1.0]);
                ctx.queue.write_buffer(
                    &ctx.targets.bbox_buffer,
                    0,
                    bytemuck::cast_slice(&[bbox]),
                );
            }
        }

        let output = ctx.surface.get_current_texture()?;
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        self.record_geometry_pass(ctx, &mut encoder);
        self.record_lighting_pass(ctx, &mut encoder);
        if self.volume_bind_group.is_some() {
            self.record_volume_pass(ctx, &mut encoder);
        }
        if show_grid || show_bbox {
            self.record_overlay_pass(ctx, &mut encoder, show_grid, show_bbox);
        }
        self.record_blit_pass(ctx, &mut encoder, &surface_view);

        ctx.queue.submit(std::iter::once(encoder.finish()));

        // The selection pass renders from the same scene state the visible
        // frame was recorded from.
        if let Some(request) = shared.picks.take_request() {
            self.pick.render(&ctx.token, ctx, &self.scene, request);
        }

        output.present();
        Ok(())
    }

    fn record_geometry_pass(&self, ctx: &Context, encoder: &mut wgpu::CommandEncoder) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Geometry Pass"),
            color_attachments: &[
                Some(wgpu::RenderPassColorAttachment {
                    view: &ctx.targets.normal.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                }),
                Some(wgpu::RenderPassColorAttachment {
                    view: &ctx.targets.albedo.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                }),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &ctx.targets.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        render_pass.set_pipeline(&ctx.pipelines.geometry);
        render_pass.set_bind_group(0, &ctx.camera.bind_group, &[]);
        for (_, record) in self.scene.geometries() {
            if !record.visible {
                continue;
            }
            render_pass.set_bind_group(1, &record.bind_group, &[]);
            render_pass.set_vertex_buffer(0, record.mesh.vertex_buffer.slice(..));
            render_pass
                .set_index_buffer(record.mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..record.mesh.num_indices, 0, 0..1);
        }
    }

    fn record_lighting_pass(&self, ctx: &Context, encoder: &mut wgpu::CommandEncoder) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Lighting Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &ctx.targets.hdr.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        render_pass.set_pipeline(&ctx.pipelines.lighting);
        render_pass.set_bind_group(0, &ctx.camera.bind_group, &[]);
        render_pass.set_bind_group(1, &ctx.targets.gbuffer_bind_group, &[]);
        render_pass.set_bind_group(2, &ctx.lights_bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }

    fn record_volume_pass(&self, ctx: &Context, encoder: &mut wgpu::CommandEncoder) {
        let Some(volume_bind_group) = self.volume_bind_group.as_ref() else {
            return;
        };
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Volume Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &ctx.targets.hdr.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        render_pass.set_pipeline(&ctx.pipelines.volume);
        render_pass.set_bind_group(0, &ctx.camera.bind_group, &[]);
        render_pass.set_bind_group(1, volume_bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }

    fn record_overlay_pass(
        &self,
        ctx: &Context,
        encoder: &mut wgpu::CommandEncoder,
        show_grid: bool,
        show_bbox: bool,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Overlay Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &ctx.targets.hdr.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &ctx.targets.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        render_pass.set_bind_group(0, &ctx.camera.bind_group, &[]);
        if show_grid {
            render_pass.set_pipeline(&ctx.pipelines.grid);
            render_pass.set_bind_group(1, &ctx.targets.grid_bind_group, &[]);
            render_pass.draw(0..GridUniform::vertex_count(crate::context::GRID_HALF_COUNT), 0..1);
        }
        if show_bbox {
            render_pass.set_pipeline(&ctx.pipelines.bbox);
            render_pass.set_bind_group(1, &ctx.targets.bbox_bind_group, &[]);
            render_pass.draw(0..overlay::BBOX_VERTEX_COUNT, 0..1);
        }
    }

    fn record_blit_pass(
        &self,
        ctx: &Context,
        encoder: &mut wgpu::CommandEncoder,
        surface_view: &wgpu::TextureView,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Blit Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: surface_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        render_pass.set_pipeline(&ctx.pipelines.blit);
        render_pass.set_bind_group(0, &ctx.targets.blit_bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}
