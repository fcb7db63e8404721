//! Volume descriptors and the 3D sample texture.
//!
//! A volume is described by its voxel dimensions and spacing; the samples are
//! handed in as an externally-owned read-only view and copied into GPU-owned
//! storage. At most one volume is resident at a time; replacing it drops the
//! previous texture.

/// Sample interpretation of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    /// One scalar per voxel.
    Scalar,
    /// One RGB color per voxel.
    Color,
}

/// Shape of a volume: integer voxel extent plus the physical spacing of one
/// voxel along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeDescriptor {
    pub dimensions: [u32; 3],
    pub voxel_spacing: [f32; 3],
    pub kind: VolumeKind,
}

impl VolumeDescriptor {
    pub fn voxel_count(&self) -> usize {
        self.dimensions.iter().map(|&d| d as usize).product()
    }

    /// Number of `f32` texels per voxel in the GPU texture layout.
    /// Color volumes are stored RGBA since tightly packed RGB float textures
    /// are not addressable on the GPU.
    pub fn texel_stride(&self) -> usize {
        match self.kind {
            VolumeKind::Scalar => 1,
            VolumeKind::Color => 4,
        }
    }

    pub fn texture_format(&self) -> wgpu::TextureFormat {
        match self.kind {
            VolumeKind::Scalar => wgpu::TextureFormat::R32Float,
            VolumeKind::Color => wgpu::TextureFormat::Rgba32Float,
        }
    }

    /// Bounding size of the whole volume in scene units at the given scale.
    pub fn world_size(&self, scale: f32) -> [f32; 3] {
        [
            self.dimensions[0] as f32 * self.voxel_spacing[0] / scale,
            self.dimensions[1] as f32 * self.voxel_spacing[1] / scale,
            self.dimensions[2] as f32 * self.voxel_spacing[2] / scale,
        ]
    }

    /// Expands caller-provided samples into the texel layout of
    /// [`texture_format`](Self::texture_format). Scalar data passes through;
    /// RGB triplets gain an opaque alpha channel.
    pub fn expand_samples(&self, samples: &[f32]) -> Vec<f32> {
        match self.kind {
            VolumeKind::Scalar => {
                debug_assert_eq!(samples.len(), self.voxel_count());
                samples.to_vec()
            }
            VolumeKind::Color => {
                debug_assert_eq!(samples.len(), 3 * self.voxel_count());
                let mut texels = Vec::with_capacity(4 * self.voxel_count());
                for rgb in samples.chunks_exact(3) {
                    texels.extend_from_slice(rgb);
                    texels.push(1.0);
                }
                texels
            }
        }
    }
}

/// A resident volume: descriptor plus the GPU texture holding its samples.
///
/// The texture extent always equals `descriptor.dimensions` exactly. Dropping
/// the record releases the texture, which is how volume replacement frees the
/// prior one exactly once.
#[derive(Debug)]
pub struct VolumeRecord {
    pub descriptor: VolumeDescriptor,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl VolumeRecord {
    /// Allocate the 3D texture and upload expanded texel data into it.
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        descriptor: VolumeDescriptor,
        texels: &[f32],
    ) -> Self {
        let [width, height, depth] = descriptor.dimensions;
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };
        let stride = descriptor.texel_stride() as u32;

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: descriptor.texture_format(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            bytemuck::cast_slice(texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * stride * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            descriptor,
            texture,
            view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(kind: VolumeKind) -> VolumeDescriptor {
        VolumeDescriptor {
            dimensions: [4, 2, 3],
            voxel_spacing: [1.0, 1.0, 2.0],
            kind,
        }
    }

    #[test]
    fn voxel_count_multiplies_dimensions() {
        assert_eq!(descriptor(VolumeKind::Scalar).voxel_count(), 24);
    }

    #[test]
    fn scalar_samples_pass_through() {
        let desc = descriptor(VolumeKind::Scalar);
        let samples: Vec<f32> = (0..24).map(|i| i as f32).collect();
        assert_eq!(desc.expand_samples(&samples), samples);
    }

    #[test]
    fn color_samples_gain_alpha() {
        let desc = descriptor(VolumeKind::Color);
        let samples: Vec<f32> = (0..72).map(|i| i as f32).collect();
        let texels = desc.expand_samples(&samples);
        assert_eq!(texels.len(), 96);
        assert_eq!(&texels[..4], &[0.0, 1.0, 2.0, 1.0]);
        assert_eq!(texels[7], 1.0);
    }

    #[test]
    fn world_size_scales_spacing() {
        let desc = descriptor(VolumeKind::Scalar);
        assert_eq!(desc.world_size(2.0), [2.0, 1.0, 3.0]);
    }
}
