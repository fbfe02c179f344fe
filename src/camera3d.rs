use glam::{EulerRot, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

const DEFAULT_UP: Vec3 = Vec3::Y;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Position and orientation of a camera; `orientation` maps camera space (-Z forward) to world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self { position: Vec3::ZERO, orientation: Quat::IDENTITY }
    }
}

impl CameraPose {
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::X
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.orientation = look_rotation(target - self.position, DEFAULT_UP);
    }
}

/// Per-frame input consumed by interactive controllers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraInput {
    /// Positive moves along the view direction.
    pub forward: f32,
    /// Positive strafes to the right.
    pub right: f32,
    /// Pointer motion in pixels since the last frame.
    pub look_delta: Vec2,
}

/// Strategy that moves a camera between frames.
pub trait CameraController: std::fmt::Debug {
    fn update(&mut self, pose: &mut CameraPose, dt: f32);

    fn handle_input(&mut self, _input: &CameraInput) {}
}

/// Leaves the pose untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedController;

impl CameraController for FixedController {
    fn update(&mut self, _pose: &mut CameraPose, _dt: f32) {}
}

#[derive(Debug, Clone)]
pub struct FreeFlyController {
    /// World units per second.
    pub move_speed: f32,
    /// Radians per pixel of pointer motion.
    pub rotation_speed: f32,
    input: CameraInput,
}

impl FreeFlyController {
    pub fn new(move_speed: f32, rotation_speed: f32) -> Self {
        Self { move_speed, rotation_speed, input: CameraInput::default() }
    }
}

impl Default for FreeFlyController {
    fn default() -> Self {
        Self::new(30.0, 0.002)
    }
}

impl CameraController for FreeFlyController {
    fn update(&mut self, pose: &mut CameraPose, dt: f32) {
        let look = std::mem::take(&mut self.input.look_delta);
        if look != Vec2::ZERO {
            let (mut yaw, mut pitch) = yaw_pitch(pose.forward());
            yaw -= look.x * self.rotation_speed;
            pitch = (pitch - look.y * self.rotation_speed).clamp(-PITCH_LIMIT, PITCH_LIMIT);
            pose.orientation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0);
        }
        let step = (pose.forward() * self.input.forward + pose.right() * self.input.right) * self.move_speed;
        pose.position += step * dt;
    }

    fn handle_input(&mut self, input: &CameraInput) {
        self.input.forward = input.forward.clamp(-1.0, 1.0);
        self.input.right = input.right.clamp(-1.0, 1.0);
        self.input.look_delta += input.look_delta;
    }
}

/// Circles a pivot at a fixed radius and height while looking at `target`.
#[derive(Debug, Clone)]
pub struct TurntableController {
    pub pivot: Vec3,
    pub radius: f32,
    /// Radians per second.
    pub angular_speed: f32,
    pub target: Vec3,
    angle: f32,
}

impl TurntableController {
    pub fn new(pivot: Vec3, radius: f32, angular_speed: f32, target: Vec3) -> Self {
        Self { pivot, radius: radius.max(0.01), angular_speed, target, angle: 0.0 }
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }
}

impl Default for TurntableController {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 10.0, 0.0), 30.0, 0.6, Vec3::ZERO)
    }
}

impl CameraController for TurntableController {
    fn update(&mut self, pose: &mut CameraPose, dt: f32) {
        self.angle = (self.angle + self.angular_speed * dt) % std::f32::consts::TAU;
        let (sin, cos) = self.angle.sin_cos();
        pose.position = Vec3::new(self.pivot.x + self.radius * sin, self.pivot.y, self.pivot.z + self.radius * cos);
        pose.look_at(self.target);
    }
}

/// Perspective camera with zero-to-one depth and a pluggable controller.
#[derive(Debug)]
pub struct Camera {
    pose: CameraPose,
    fov_y_radians: f32,
    aspect: f32,
    near: f32,
    far: f32,
    projection: Mat4,
    controller: Box<dyn CameraController>,
}

impl Camera {
    pub fn new(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Self {
        let near = near.max(1e-4);
        let far = far.max(near + 1e-3);
        let aspect = aspect.max(1e-4);
        Self {
            pose: CameraPose::default(),
            fov_y_radians,
            aspect,
            near,
            far,
            projection: Mat4::perspective_rh(fov_y_radians, aspect, near, far),
            controller: Box::new(FixedController),
        }
    }

    pub fn with_controller(mut self, controller: impl CameraController + 'static) -> Self {
        self.controller = Box::new(controller);
        self
    }

    pub fn set_controller(&mut self, controller: Box<dyn CameraController>) {
        self.controller = controller;
    }

    pub fn handle_input(&mut self, input: &CameraInput) {
        self.controller.handle_input(input);
    }

    pub fn pose(&self) -> &CameraPose {
        &self.pose
    }

    pub fn position(&self) -> Vec3 {
        self.pose.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.pose.position = position;
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.pose.look_at(target);
    }

    pub fn fov_y_radians(&self) -> f32 {
        self.fov_y_radians
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect
    }

    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.aspect = aspect.max(1e-4);
        self.projection = Mat4::perspective_rh(self.fov_y_radians, self.aspect, self.near, self.far);
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.pose.orientation.conjugate()) * Mat4::from_translation(-self.pose.position)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view_matrix()
    }

    /// Advances the controller by `dt` seconds and returns the resulting view matrix.
    pub fn update_and_view_matrix(&mut self, dt: f32) -> Mat4 {
        self.controller.update(&mut self.pose, dt);
        self.view_matrix()
    }

    /// World-space corners of the frustum slice between two normalized depth fractions.
    ///
    /// Fractions are linear in view distance between the near and far planes and are mapped
    /// through the projection before unprojecting. Fractions above one extend the slice past
    /// the far plane. `(0, 0)` selects the whole frustum. Corners are ordered with x in
    /// {-1, 1} outermost, then y in {-1, 1}, then z in {near, far}.
    pub fn world_space_corners(&self, near_t: f32, far_t: f32) -> [Vec3; 8] {
        let (near_t, far_t) =
            if near_t == 0.0 && far_t == 0.0 { (0.0, 1.0) } else { (near_t.max(0.0), far_t.max(0.0)) };
        let near_z = self.ndc_depth(near_t);
        let far_z = self.ndc_depth(far_t);
        let inv_view_proj = self.view_projection().inverse();

        let mut corners = [Vec3::ZERO; 8];
        let mut idx = 0;
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [near_z, far_z] {
                    let world = inv_view_proj * Vec4::new(x, y, z, 1.0);
                    corners[idx] = world.truncate() / world.w;
                    idx += 1;
                }
            }
        }
        corners
    }

    fn ndc_depth(&self, t: f32) -> f32 {
        if t <= 0.0 {
            return 0.0;
        }
        let distance = self.near + (self.far - self.near) * t;
        let clip = self.projection * Vec4::new(0.0, 0.0, -distance, 1.0);
        (clip.z / clip.w).max(0.0)
    }
}

fn yaw_pitch(forward: Vec3) -> (f32, f32) {
    let forward = forward.normalize_or_zero();
    let yaw = (-forward.x).atan2(-forward.z);
    let pitch = forward.y.clamp(-1.0, 1.0).asin();
    (yaw, pitch)
}

fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let forward = forward.normalize_or_zero();
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let mut right = forward.cross(up);
    if right.length_squared() < 1e-8 {
        right = forward.cross(Vec3::X);
    }
    let right = right.normalize();
    let true_up = right.cross(forward);
    Quat::from_mat3(&Mat3::from_cols(right, true_up, -forward))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis_camera() -> Camera {
        Camera::new(60.0_f32.to_radians(), 1.5, 1.0, 100.0)
    }

    fn bounds(points: &[Vec3]) -> (Vec3, Vec3) {
        points.iter().fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(min, max), p| (min.min(*p), max.max(*p)))
    }

    fn assert_close(a: Vec3, b: Vec3, tolerance: f32) {
        assert!((a - b).abs().max_element() <= tolerance, "{a:?} != {b:?}");
    }

    #[test]
    fn view_projection_is_finite() {
        let mut camera = axis_camera();
        camera.set_position(Vec3::new(0.0, 1.0, 5.0));
        camera.look_at(Vec3::ZERO);
        let vp = camera.view_projection();
        assert!(!vp.to_cols_array().iter().any(|v| v.is_nan() || v.is_infinite()));
    }

    #[test]
    fn full_frustum_corners_are_symmetric_about_view_axis() {
        let camera = axis_camera();
        let corners = camera.world_space_corners(0.0, 1.0);
        for idx in 0..4 {
            let mirrored_x = corners[idx + 4];
            assert!((corners[idx].x + mirrored_x.x).abs() < 1e-3);
            assert!((corners[idx].y - mirrored_x.y).abs() < 1e-3);
            assert!((corners[idx].z - mirrored_x.z).abs() < 1e-3);
        }
        for idx in [0, 1, 4, 5] {
            let mirrored_y = corners[idx + 2];
            assert!((corners[idx].y + mirrored_y.y).abs() < 1e-3);
        }
        assert!((corners[0].z + 1.0).abs() < 1e-3, "near corner at -near");
        assert!((corners[1].z + 100.0).abs() < 1e-1, "far corner at -far");
        assert!(corners[1].x < 0.0 && corners[1].y < 0.0);
        assert!(corners[7].x > 0.0 && corners[7].y > 0.0);
    }

    #[test]
    fn zero_zero_selects_whole_frustum() {
        let camera = axis_camera();
        let whole = camera.world_space_corners(0.0, 1.0);
        let special = camera.world_space_corners(0.0, 0.0);
        for (a, b) in whole.iter().zip(special.iter()) {
            assert_close(*a, *b, 1e-4);
        }
    }

    #[test]
    fn split_frustums_cover_the_whole_frustum_without_gaps() {
        let mut camera = axis_camera();
        camera.set_position(Vec3::new(2.0, 3.0, -4.0));
        camera.look_at(Vec3::new(10.0, 0.0, -40.0));
        let whole = camera.world_space_corners(0.0, 1.0);
        let first = camera.world_space_corners(0.0, 0.5);
        let second = camera.world_space_corners(0.5, 1.0);

        for idx in (0..8).step_by(2) {
            assert_close(first[idx + 1], second[idx], 1e-2);
        }
        let mut union = first.to_vec();
        union.extend_from_slice(&second);
        let (union_min, union_max) = bounds(&union);
        let (whole_min, whole_max) = bounds(&whole);
        assert_close(union_min, whole_min, 5e-2);
        assert_close(union_max, whole_max, 5e-2);
    }

    #[test]
    fn far_fraction_near_one_stays_finite() {
        let camera = Camera::new(45.0_f32.to_radians(), 1.0, 0.1, 10_000.0);
        let corners = camera.world_space_corners(0.9999, 1.0);
        assert!(corners.iter().all(|c| c.is_finite()));

        let camera = Camera::new(36.0_f32.to_radians(), 1.0, 0.5, 500.0);
        let half_depth = camera.world_space_corners(0.0, 0.5);
        assert!((half_depth[1].z + 250.25).abs() < 0.5, "{:?}", half_depth[1]);
    }

    #[test]
    fn fractions_past_one_extend_beyond_the_far_plane() {
        let camera = Camera::new(36.0_f32.to_radians(), 16.0 / 9.0, 0.5, 500.0);
        let at_far = camera.world_space_corners(0.0, 1.0);
        let beyond = camera.world_space_corners(1.0, 2.0);
        assert!(beyond.iter().all(|c| c.is_finite()));
        assert_close(beyond[0], at_far[1], 0.5);
        let expected = -(0.5 + 499.5 * 2.0);
        assert!((beyond[1].z - expected).abs() < 5.0, "{:?}", beyond[1]);
    }

    #[test]
    fn aspect_change_rebuilds_projection() {
        let mut camera = axis_camera();
        let before = camera.projection_matrix();
        camera.set_aspect_ratio(2.0);
        assert_ne!(before, camera.projection_matrix());
        assert!((camera.aspect_ratio() - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn look_at_points_forward_at_target() {
        let mut pose = CameraPose { position: Vec3::new(3.0, 4.0, 5.0), orientation: Quat::IDENTITY };
        pose.look_at(Vec3::ZERO);
        assert_close(pose.forward(), (-pose.position).normalize(), 1e-4);
    }

    #[test]
    fn free_fly_moves_along_forward() {
        let mut camera = axis_camera().with_controller(FreeFlyController::new(10.0, 0.01));
        camera.handle_input(&CameraInput { forward: 1.0, right: 0.0, look_delta: Vec2::ZERO });
        camera.update_and_view_matrix(0.5);
        assert_close(camera.position(), Vec3::new(0.0, 0.0, -5.0), 1e-4);
    }

    #[test]
    fn free_fly_yaw_turns_left_for_negative_motion() {
        let mut camera = axis_camera().with_controller(FreeFlyController::new(10.0, 0.01));
        camera.handle_input(&CameraInput { look_delta: Vec2::new(-100.0, 0.0), ..Default::default() });
        camera.update_and_view_matrix(0.016);
        let forward = camera.pose().forward();
        assert!(forward.x < -0.5, "yawed left: {forward:?}");
        assert!(forward.y.abs() < 1e-4);
    }

    #[test]
    fn turntable_orbits_at_radius_and_faces_target() {
        let mut camera = axis_camera().with_controller(TurntableController::new(
            Vec3::new(0.0, 10.0, 0.0),
            30.0,
            1.0,
            Vec3::ZERO,
        ));
        for _ in 0..10 {
            camera.update_and_view_matrix(0.1);
            let position = camera.position();
            assert!((Vec2::new(position.x, position.z).length() - 30.0).abs() < 1e-3);
            assert!((position.y - 10.0).abs() < 1e-5);
            assert_close(camera.pose().forward(), (-position).normalize(), 1e-3);
        }
    }

    #[test]
    fn fixed_controller_keeps_pose() {
        let mut camera = axis_camera();
        camera.set_position(Vec3::new(1.0, 2.0, 3.0));
        let before = *camera.pose();
        let view = camera.update_and_view_matrix(1.0);
        assert_eq!(before, *camera.pose());
        assert_eq!(view, camera.view_matrix());
    }
}
