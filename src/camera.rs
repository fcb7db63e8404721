//! Orbit camera, controller and view/projection uniforms.
//!
//! The camera orbits a focus point: left-drag rotates, the scroll wheel
//! dollies along the view axis. The uniform carries the inverse
//! view-projection matrix as well, since the volume compositing pass
//! reconstructs world-space rays per pixel.

use cgmath::{InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3, perspective};
use instant::Duration;
use winit::event::{MouseScrollDelta, WindowEvent};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Bundles the camera state with its GPU-side resources.
#[derive(Debug)]
pub struct CameraResources {
    pub camera: Camera,
    pub controller: CameraController,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

#[derive(Debug)]
pub struct Camera {
    /// Point the camera orbits around.
    pub target: Point3<f32>,
    /// Distance from the target along the view axis.
    pub distance: f32,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
}

impl Camera {
    pub fn new<T: Into<Rad<f32>>>(target: (f32, f32, f32), distance: f32, yaw: T, pitch: T) -> Self {
        Self {
            target: Point3::new(target.0, target.1, target.2),
            distance,
            yaw: yaw.into(),
            pitch: pitch.into(),
        }
    }

    pub fn position(&self) -> Point3<f32> {
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        let dir = Vector3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw);
        self.target - dir * self.distance
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position(), self.target, Vector3::unit_y())
    }

    /// World-space translation for a screen-space drag across the view plane.
    /// Screen-right maps onto camera-right and screen-up onto camera-up; the
    /// step scales with the orbit distance so a drag covers the same fraction
    /// of the view at any zoom. The pitch clamp keeps the view axis off the
    /// world up axis, so the cross products stay well defined.
    pub fn drag_translation(&self, dx: f32, dy: f32) -> Vector3<f32> {
        let forward = (self.target - self.position()).normalize();
        let right = forward.cross(Vector3::unit_y()).normalize();
        let up = right.cross(forward);
        (right * dx - up * dy) * self.distance * 0.002
    }
}

#[derive(Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height as f32;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Camera data as laid out in GPU memory.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
    inv_view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
            inv_view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        let pos = camera.position();
        self.view_position = [pos.x, pos.y, pos.z, 1.0];
        let view_proj = projection.calc_matrix() * camera.calc_matrix();
        self.view_proj = view_proj.into();
        self.inv_view_proj = view_proj
            .invert()
            .unwrap_or_else(Matrix4::identity)
            .into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// Translates mouse drags into orbit rotation and scroll into dolly movement.
#[derive(Debug)]
pub struct CameraController {
    rotate_horizontal: f32,
    rotate_vertical: f32,
    scroll: f32,
    speed: f32,
    sensitivity: f32,
}

impl CameraController {
    pub fn new(speed: f32, sensitivity: f32) -> Self {
        Self {
            rotate_horizontal: 0.0,
            rotate_vertical: 0.0,
            scroll: 0.0,
            speed,
            sensitivity,
        }
    }

    /// Accumulate a raw mouse-motion delta while the rotate button is held.
    pub fn handle_mouse(&mut self, dx: f64, dy: f64) {
        self.rotate_horizontal += dx as f32;
        self.rotate_vertical += dy as f32;
    }

    pub fn handle_window_events(&mut self, event: &WindowEvent) {
        if let WindowEvent::MouseWheel { delta, .. } = event {
            self.scroll += match delta {
                MouseScrollDelta::LineDelta(_, y) => *y,
                MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 20.0,
            };
        }
    }

    pub fn update(&mut self, camera: &mut Camera, dt: Duration) {
        let dt = dt.as_secs_f32();

        camera.yaw += Rad(self.rotate_horizontal) * self.sensitivity * dt;
        camera.pitch += Rad(self.rotate_vertical) * self.sensitivity * dt;
        self.rotate_horizontal = 0.0;
        self.rotate_vertical = 0.0;

        // Keep the pitch away from the poles so look_at stays well defined.
        let limit = Rad(std::f32::consts::FRAC_PI_2 - 1e-3);
        if camera.pitch > limit {
            camera.pitch = limit;
        } else if camera.pitch < -limit {
            camera.pitch = -limit;
        }

        camera.distance = (camera.distance - self.scroll * self.speed).max(0.1);
        self.scroll = 0.0;
    }
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
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
        label: Some("camera_bind_group_layout"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Deg;

    #[test]
    fn position_orbits_the_target() {
        let camera = Camera::new((0.0, 0.0, 0.0), 10.0, Deg(-90.0), Deg(0.0));
        let pos = camera.position();
        assert!(pos.x.abs() < 1e-4);
        assert!(pos.y.abs() < 1e-4);
        assert!((pos.z - 10.0).abs() < 1e-4);
    }

    #[test]
    fn controller_clamps_pitch() {
        let mut camera = Camera::new((0.0, 0.0, 0.0), 10.0, Deg(0.0), Deg(0.0));
        let mut controller = CameraController::new(1.0, 1.0);
        controller.handle_mouse(0.0, 10_000.0);
        controller.update(&mut camera, Duration::from_secs(1));
        assert!(camera.pitch.0 < std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn drag_moves_along_the_screen_axes() {
        // Camera on +z looking towards -z: screen-right is world +x,
        // screen-up is world +y.
        let camera = Camera::new((0.0, 0.0, 0.0), 10.0, Deg(-90.0), Deg(0.0));
        let t = camera.drag_translation(1.0, 0.0);
        assert!(t.x > 0.0);
        assert!(t.y.abs() < 1e-6 && t.z.abs() < 1e-6);
        let t = camera.drag_translation(0.0, 1.0);
        assert!(t.y < 0.0);
        assert!(t.x.abs() < 1e-6 && t.z.abs() < 1e-6);
    }

    #[test]
    fn drag_stays_in_the_view_plane() {
        let camera = Camera::new((1.0, 2.0, 3.0), 8.0, Deg(30.0), Deg(20.0));
        let forward = (camera.target - camera.position()).normalize();
        let t = camera.drag_translation(3.0, -2.0);
        assert!(t.dot(forward).abs() < 1e-4);
    }

    #[test]
    fn scroll_never_pushes_through_the_target() {
        let mut camera = Camera::new((0.0, 0.0, 0.0), 1.0, Deg(0.0), Deg(0.0));
        let mut controller = CameraController::new(100.0, 1.0);
        controller.scroll = 50.0;
        controller.update(&mut camera, Duration::from_secs(1));
        assert!(camera.distance > 0.0);
    }
}
