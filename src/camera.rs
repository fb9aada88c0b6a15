//! Camera types, orbit controller and uniforms for view/projection.
//!
//! The viewer uses a single orbit camera around the model. Framing is
//! computed from the model bounds: the view direction is fixed, only the
//! distance is derived (bounding diagonal against the vertical field of
//! view), so every model lands in frame the same way.

use cgmath::{Deg, EuclideanSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3, perspective};
use winit::event::{MouseScrollDelta, WindowEvent};

use crate::data_structures::model::Bounds;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Fixed framing direction: yaw/pitch the camera snaps to when a model is
/// fitted. Chosen to show the front-right top quarter.
const FIT_YAW: Deg<f32> = Deg(45.0);
const FIT_PITCH: Deg<f32> = Deg(22.0);
/// Breathing room around the fitted bounding sphere.
const FIT_MARGIN: f32 = 1.25;

pub struct Projection {
    aspect: f32,
    pub fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Orbit controller: yaw/pitch/distance around a target point.
pub struct OrbitController {
    pub target: Point3<f32>,
    pub distance: f32,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
    rotate_speed: f32,
    zoom_speed: f32,
    min_distance: f32,
}

impl OrbitController {
    pub fn new(target: Point3<f32>, distance: f32) -> Self {
        Self {
            target,
            distance,
            yaw: FIT_YAW.into(),
            pitch: FIT_PITCH.into(),
            rotate_speed: 0.005,
            zoom_speed: 0.1,
            min_distance: 0.05,
        }
    }

    fn direction(&self) -> Vector3<f32> {
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        Vector3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw)
    }

    pub fn position(&self) -> Point3<f32> {
        self.target + self.direction() * self.distance
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position(), self.target, Vector3::unit_y())
    }

    /// Mouse drag rotation. The pitch stays shy of the poles so the view
    /// matrix never degenerates.
    pub fn handle_mouse(&mut self, dx: f64, dy: f64) {
        self.yaw += Rad(dx as f32 * self.rotate_speed);
        let limit = Rad::from(Deg(89.0)).0;
        self.pitch = Rad((self.pitch.0 + dy as f32 * self.rotate_speed).clamp(-limit, limit));
    }

    pub fn handle_window_events(&mut self, event: &WindowEvent) {
        if let WindowEvent::MouseWheel { delta, .. } = event {
            let amount = match delta {
                MouseScrollDelta::LineDelta(_, y) => *y,
                MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 120.0,
            };
            self.zoom(amount);
        }
    }

    pub fn zoom(&mut self, amount: f32) {
        self.distance = (self.distance * (1.0 - amount * self.zoom_speed)).max(self.min_distance);
    }

    /// Frame the model: fixed view direction, target at the bounds center,
    /// distance derived from the bounding diagonal and the field of view.
    pub fn fit(&mut self, bounds: &Bounds, projection: &Projection) {
        if bounds.is_empty() {
            return;
        }
        self.target = bounds.center();
        self.yaw = FIT_YAW.into();
        self.pitch = FIT_PITCH.into();
        let radius = bounds.diagonal() * 0.5;
        if radius > 0.0 {
            self.distance = radius / (projection.fovy.0 * 0.5).tan() * FIT_MARGIN;
        }
    }
}

/// Camera data as seen by the shaders. Field order matches the WGSL struct.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    view_proj_inv: [[f32; 4]; 4],
    view_position: [f32; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_proj: Matrix4::identity().into(),
            view_proj_inv: Matrix4::identity().into(),
            view_position: [0.0; 4],
        }
    }

    pub fn update_view_proj(&mut self, controller: &OrbitController, projection: &Projection) {
        let view_proj = projection.calc_matrix() * controller.view_matrix();
        self.view_proj = view_proj.into();
        self.view_proj_inv = view_proj
            .invert()
            .unwrap_or_else(Matrix4::identity)
            .into();
        self.view_position = controller.position().to_homogeneous().into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// GPU-side camera state bundle.
pub struct CameraResources {
    pub controller: OrbitController,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraResources {
    pub fn new(device: &wgpu::Device, projection: &Projection) -> Self {
        use wgpu::util::DeviceExt;

        let controller = OrbitController::new(Point3::new(0.0, 0.0, 0.0), 5.0);
        let mut uniform = CameraUniform::new();
        uniform.update_view_proj(&controller, projection);

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout =
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
            });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        Self {
            controller,
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_distance_follows_diagonal_and_fov() {
        let projection = Projection::new(800, 600, Deg(45.0), 0.1, 500.0);
        let mut bounds = Bounds::empty();
        bounds.include(Point3::new(-1.0, -1.0, -1.0));
        bounds.include(Point3::new(1.0, 1.0, 1.0));

        let mut controller = OrbitController::new(Point3::new(9.0, 9.0, 9.0), 1.0);
        controller.fit(&bounds, &projection);

        assert_eq!(controller.target, Point3::new(0.0, 0.0, 0.0));
        let radius = bounds.diagonal() * 0.5;
        let expected = radius / (Rad::from(Deg(45.0f32)).0 * 0.5).tan() * FIT_MARGIN;
        assert!((controller.distance - expected).abs() < 1e-5);
    }

    #[test]
    fn test_fit_ignores_empty_bounds() {
        let projection = Projection::new(800, 600, Deg(45.0), 0.1, 500.0);
        let mut controller = OrbitController::new(Point3::new(1.0, 2.0, 3.0), 7.0);
        controller.fit(&Bounds::empty(), &projection);
        assert_eq!(controller.distance, 7.0);
        assert_eq!(controller.target, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_pitch_clamps_short_of_poles() {
        let mut controller = OrbitController::new(Point3::new(0.0, 0.0, 0.0), 5.0);
        controller.handle_mouse(0.0, 1e6);
        assert!(controller.pitch.0 <= Rad::from(Deg(89.0)).0 + 1e-6);
        controller.handle_mouse(0.0, -2e6);
        assert!(controller.pitch.0 >= -Rad::from(Deg(89.0)).0 - 1e-6);
        // The view matrix stays invertible at the clamp.
        assert!(controller.view_matrix().invert().is_some());
    }

    #[test]
    fn test_zoom_respects_minimum_distance(){
        let mut controller = OrbitController::new(Point3::new(0.0, 0.0, 0.0), 1.0);
        for _ in 0..200 {
            controller.zoom(5.0);
        }
        assert!(controller.distance >= 0.05);
    }
}
