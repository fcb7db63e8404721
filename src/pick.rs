//! GPU-based mouse picking.
//!
//! The selection pass renders each geometry's selection ID into an offscreen
//! `R32Uint` target, then a single texel at the cursor position is copied into
//! a readback buffer. Targets and readback buffers are double-buffered: the
//! copy issued in one frame is resolved at the start of the next, so picking
//! never stalls the frame that renders it and a result is available after at
//! most one frame of latency.

use crate::admission::{PickRequest, PickResult};
use crate::context::{Context, RenderToken};
use crate::data_structures::texture::Texture;
use crate::scene::SceneStore;

struct PickTarget {
    color: Texture,
    depth: Texture,
    readback: wgpu::Buffer,
}

impl PickTarget {
    fn new(device: &wgpu::Device, size: [u32; 2], index: usize) -> Self {
        let color =
            Texture::create_selection_target(device, size, &format!("selection_target_{index}"));
        let depth =
            Texture::create_depth_texture(device, size, &format!("selection_depth_{index}"));
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pick Readback Buffer"),
            size: std::mem::size_of::<u32>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            color,
            depth,
            readback,
        }
    }
}

struct InFlight {
    slot: usize,
    receiver:
        futures_intrusive::channel::shared::OneshotReceiver<Result<(), wgpu::BufferAsyncError>>,
}

/// Double-buffered selection targets plus the readback in flight, if any.
pub struct PickContext {
    targets: [PickTarget; 2],
    back: usize,
    in_flight: Option<InFlight>,
}

impl PickContext {
    pub fn new(device: &wgpu::Device, size: [u32; 2]) -> Self {
        Self {
            targets: [
                PickTarget::new(device, size, 0),
                PickTarget::new(device, size, 1),
            ],
            back: 0,
            in_flight: None,
        }
    }

    /// Rebuild both targets for a new surface size. An outstanding readback
    /// is abandoned since its coordinates no longer match the surface.
    pub fn resize(&mut self, device: &wgpu::Device, size: [u32; 2]) {
        self.in_flight = None;
        self.targets = [
            PickTarget::new(device, size, 0),
            PickTarget::new(device, size, 1),
        ];
    }

    /// Render the selection pass into the back target, copy the texel under
    /// the cursor into its readback buffer and kick off the mapping. The
    /// buffers swap afterwards, so [`PickContext::resolve`] picks the copy up
    /// on the next frame.
    pub fn render(
        &mut self,
        _token: &RenderToken,
        ctx: &Context,
        scene: &SceneStore,
        request: PickRequest,
    ) {
        let target = &self.targets[self.back];
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pick Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Selection Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        // background sentinel
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&ctx.pipelines.selection);
            render_pass.set_bind_group(0, &ctx.camera.bind_group, &[]);
            for (_, record) in scene.geometries() {
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

        let x = request.x.min(ctx.config.width.saturating_sub(1));
        let y = request.y.min(ctx.config.height.saturating_sub(1));
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.color.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &target.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    // single texel, no row padding constraints apply
                    bytes_per_row: None,
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );

        ctx.queue.submit(std::iter::once(encoder.finish()));

        // NOTE: the mapping has to be created before the device is polled,
        // which happens when the readback is resolved next frame.
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        target
            .readback
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });

        self.in_flight = Some(InFlight {
            slot: self.back,
            receiver: rx,
        });
        self.back = 1 - self.back;
    }

    /// Resolve the readback issued on the previous frame, if any, mapping the
    /// selection ID back to a geometry name.
    pub fn resolve(
        &mut self,
        _token: &RenderToken,
        ctx: &Context,
        scene: &SceneStore,
        async_runtime: &tokio::runtime::Runtime,
    ) -> Option<PickResult> {
        let in_flight = self.in_flight.take()?;
        let target = &self.targets[in_flight.slot];

        if let Err(e) = ctx.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: Some(std::time::Duration::from_secs(1)),
        }) {
            log::error!("pick readback poll failed: {:?}", e);
            return None;
        }
        match async_runtime.block_on(in_flight.receiver.receive()) {
            Some(Ok(())) => {}
            other => {
                log::error!("pick readback mapping failed: {:?}", other);
                return None;
            }
        }

        let id = {
            let data = target.readback.slice(..).get_mapped_range();
            u32::from_le_bytes([data[0], data[1], data[2], data[3]])
        };
        target.readback.unmap();

        log::info!("pick resolved to selection id {}", id);
        Some(match scene.geometry_by_selection_id(id) {
            Some(name) => PickResult::Hit(name.to_string()),
            None => PickResult::Miss,
        })
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}
