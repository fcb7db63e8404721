//! Authoritative store of live geometry and volume records.
//!
//! All mutation entry points are called exclusively from the render thread
//! after the admission queue has been drained; the [`RenderToken`] parameter
//! enforces this at the type level, which is why the store itself needs no
//! locking. The store exclusively owns every GPU resource of its records, so
//! removal and replacement release buffers and textures exactly once through
//! plain drop semantics.

use std::collections::HashMap;

use cgmath::{Matrix4, Quaternion, Vector3};

use crate::context::RenderToken;
use crate::data_structures::mesh::{MeshBuffers, MeshVertex};
use crate::error::RenderError;
use crate::data_structures::volume::{VolumeDescriptor, VolumeRecord};

/// Position, orientation and scale of a geometry record.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Transform {
    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl Default for Transform {
    fn default() -> Self {
        use cgmath::One;
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

/// Flat surface material of a geometry record.
#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub color: [f32; 3],
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: [0.8, 0.8, 0.8],
            shininess: 10.0,
        }
    }
}

/// A directional light. The direction points towards the light source.
#[derive(Debug, Clone, Copy)]
pub struct Light {
    pub color: [f32; 3],
    pub direction: [f32; 3],
    pub ambient_factor: f32,
}

/// CPU-side geometry payload carried through the admission queue.
#[derive(Debug, Clone)]
pub struct GeometryData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub transform: Transform,
    pub material: Material,
    pub visible: bool,
}

/// Per-record uniform as laid out in GPU memory. The rotation part doubles
/// as the normal matrix since only rigid transforms plus uniform scale are
/// expected; `id_flags.x` carries the selection ID the selection pass writes.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelUniform {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
    color_shininess: [f32; 4],
    id_flags: [u32; 4],
}

impl ModelUniform {
    fn new(transform: &Transform, material: &Material, selection_id: u32) -> Self {
        Self {
            model: transform.to_matrix().into(),
            normal: Matrix4::from(transform.rotation).into(),
            color_shininess: [
                material.color[0],
                material.color[1],
                material.color[2],
                material.shininess,
            ],
            id_flags: [selection_id, 0, 0, 0],
        }
    }
}

/// A live geometry: GPU buffers, transform, material and its selection ID.
#[derive(Debug)]
pub struct GeometryRecord {
    pub mesh: MeshBuffers,
    pub transform: Transform,
    pub material: Material,
    pub visible: bool,
    pub selection_id: u32,
    pub uniform_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

/// Allocates selection IDs and maps them back to geometry names.
///
/// IDs start at 1 (0 is the background sentinel) and are never reused within
/// a process run, so a read-back racing a removal can never alias onto a
/// different record.
#[derive(Debug)]
pub struct SelectionIds {
    next: u32,
    by_id: HashMap<u32, String>,
}

impl SelectionIds {
    pub fn new() -> Self {
        Self {
            next: 1,
            by_id: HashMap::new(),
        }
    }

    pub fn allocate(&mut self, name: &str) -> u32 {
        let id = self.next;
        self.next = self
            .next
            .checked_add(1)
            .expect("selection ID space exhausted");
        self.by_id.insert(id, name.to_string());
        id
    }

    pub fn retire(&mut self, id: u32) {
        self.by_id.remove(&id);
    }

    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }
}

impl Default for SelectionIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Authoritative mapping from names to geometry and volume state.
#[derive(Debug, Default)]
pub struct SceneStore {
    geometries: HashMap<String, GeometryRecord>,
    ids: SelectionIds,
    volume: Option<VolumeRecord>,
    lights: HashMap<u16, Light>,
    lights_dirty: bool,
}

impl SceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the named geometry. Replacement keeps the record's
    /// selection ID so a pick across an update still resolves to the same
    /// name; the old GPU buffers are dropped on overwrite.
    pub fn upsert_geometry(
        &mut self,
        _token: &RenderToken,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        model_layout: &wgpu::BindGroupLayout,
        name: &str,
        data: GeometryData,
    ) {
        use wgpu::util::DeviceExt;

        let mesh = MeshBuffers::upload(device, name, &data.vertices, &data.indices);

        if let Some(record) = self.geometries.get_mut(name) {
            let uniform = ModelUniform::new(&data.transform, &data.material, record.selection_id);
            queue.write_buffer(&record.uniform_buffer, 0, bytemuck::cast_slice(&[uniform]));
            record.mesh = mesh;
            record.transform = data.transform;
            record.material = data.material;
            record.visible = data.visible;
            return;
        }

        let selection_id = self.ids.allocate(name);
        let uniform = ModelUniform::new(&data.transform, &data.material, selection_id);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Model Buffer", name)),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: model_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
            label: Some(&format!("{:?} Model Bind Group", name)),
        });

        log::info!("init geometry '{}' (selection id {})", name, selection_id);
        self.geometries.insert(
            name.to_string(),
            GeometryRecord {
                mesh,
                transform: data.transform,
                material: data.material,
                visible: data.visible,
                selection_id,
                uniform_buffer,
                bind_group,
            },
        );
    }

    /// Update only the transform of an existing record. An unknown name is
    /// reported as [`RenderError::ResourceNotReady`]; the producer may have
    /// raced a removal or the upsert may not have been admitted yet.
    pub fn set_transform(
        &mut self,
        _token: &RenderToken,
        queue: &wgpu::Queue,
        name: &str,
        transform: Transform,
    ) -> Result<(), RenderError> {
        let Some(record) = self.geometries.get_mut(name) else {
            return Err(RenderError::ResourceNotReady(name.to_string()));
        };
        record.transform = transform;
        let uniform = ModelUniform::new(&transform, &record.material, record.selection_id);
        queue.write_buffer(&record.uniform_buffer, 0, bytemuck::cast_slice(&[uniform]));
        Ok(())
    }

    /// Remove a geometry, releasing its GPU buffers and retiring its
    /// selection ID slot.
    pub fn remove_geometry(&mut self, _token: &RenderToken, name: &str) {
        if let Some(record) = self.geometries.remove(name) {
            self.ids.retire(record.selection_id);
            log::info!("removed geometry '{}'", name);
        } else {
            log::warn!("removal of unknown geometry '{}'", name);
        }
    }

    /// Replace the resident volume. Dropping the previous record releases its
    /// texture.
    pub fn set_volume(
        &mut self,
        _token: &RenderToken,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        descriptor: VolumeDescriptor,
        texels: &[f32],
    ) {
        self.volume = Some(VolumeRecord::upload(device, queue, descriptor, texels));
    }

    pub fn add_light(&mut self, _token: &RenderToken, name: u16, light: Light) {
        self.lights.insert(name, light);
        self.lights_dirty = true;
    }

    pub fn geometry_by_name(&self, name: &str) -> Option<&GeometryRecord> {
        self.geometries.get(name)
    }

    /// Resolve a selection ID read back from the selection target. Returns
    /// `None` for the background sentinel and for retired IDs.
    pub fn geometry_by_selection_id(&self, id: u32) -> Option<&str> {
        self.ids.name_of(id)
    }

    pub fn geometries(&self) -> impl Iterator<Item = (&String, &GeometryRecord)> {
        self.geometries.iter()
    }

    pub fn volume(&self) -> Option<&VolumeRecord> {
        self.volume.as_ref()
    }

    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        self.lights.values()
    }

    /// True when lights changed since the last call; clears the flag.
    pub fn take_lights_dirty(&mut self) -> bool {
        std::mem::take(&mut self.lights_dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_ids_start_past_the_sentinel() {
        let mut ids = SelectionIds::new();
        assert_eq!(ids.allocate("a"), 1);
        assert_eq!(ids.name_of(0), None);
    }

    #[test]
    fn selection_ids_are_never_reused() {
        let mut ids = SelectionIds::new();
        let a = ids.allocate("a");
        ids.retire(a);
        let b = ids.allocate("b");
        assert_ne!(a, b);
        assert_eq!(ids.name_of(a), None);
        assert_eq!(ids.name_of(b), Some("b"));
    }

    #[test]
    fn retired_ids_resolve_to_none() {
        let mut ids = SelectionIds::new();
        let a = ids.allocate("a");
        assert_eq!(ids.name_of(a), Some("a"));
        ids.retire(a);
        assert_eq!(ids.name_of(a), None);
    }
}

#[cfg(all(test, feature = "integration-tests"))]
mod gpu_tests {
    use super::*;
    use crate::data_structures::volume::VolumeKind;

    fn device_and_queue() -> (wgpu::Device, wgpu::Queue) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions::default())
                .await
                .expect("no adapter available");
            adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                    trace: wgpu::Trace::Off,
                    experimental_features: wgpu::ExperimentalFeatures::disabled(),
                })
                .await
                .expect("no device available")
        })
    }

    fn scalar_descriptor(extent: u32) -> VolumeDescriptor {
        VolumeDescriptor {
            dimensions: [extent, extent, extent],
            voxel_spacing: [1.0, 1.0, 1.0],
            kind: VolumeKind::Scalar,
        }
    }

    #[test]
    fn replacing_the_volume_leaves_one_texture_with_the_new_extent() {
        let (device, queue) = device_and_queue();
        let token = RenderToken::new();
        let mut scene = SceneStore::new();

        let small = vec![0.5_f32; 32 * 32 * 32];
        scene.set_volume(&token, &device, &queue, scalar_descriptor(32), &small);
        let large = vec![0.5_f32; 64 * 64 * 64];
        scene.set_volume(&token, &device, &queue, scalar_descriptor(64), &large);

        let volume = scene.volume().expect("volume resident after replacement");
        assert_eq!(volume.descriptor.dimensions, [64, 64, 64]);
        assert_eq!(volume.texture.width(), 64);
        assert_eq!(volume.texture.height(), 64);
        assert_eq!(volume.texture.depth_or_array_layers(), 64);
    }

    #[test]
    fn transform_update_for_unknown_geometry_reports_not_ready() {
        let (_device, queue) = device_and_queue();
        let token = RenderToken::new();
        let mut scene = SceneStore::new();

        let err = scene
            .set_transform(&token, &queue, "ghost", Transform::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::ResourceNotReady(name) if name == "ghost"));
    }
}
