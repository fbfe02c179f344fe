use anyhow::Result;
use glam::Mat4;

use super::renderable::{shadow_casters, Renderable};
use super::shadow_settings::{ShadowSettingsSnapshot, SimpleShadowTuning};
use super::shadow_target::{draw_casters, ShadowMapCore};
use crate::camera3d::Camera;

const SHADOW_SHADER: &str = include_str!("../../assets/shaders/shadow_simple.wgsl");

/// One shadow map fitted to the `[0, depth percentage]` slice of the camera frustum.
pub struct SimpleShadowMap {
    pub(super) core: ShadowMapCore,
    tuning: SimpleShadowTuning,
    last_projection: Mat4,
}

impl SimpleShadowMap {
    pub fn new(
        device: &wgpu::Device,
        settings: ShadowSettingsSnapshot,
        tuning: SimpleShadowTuning,
        light_buffer: &wgpu::Buffer,
        renderable_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let core = ShadowMapCore::new(
            device,
            "Simple Shadow Map",
            SHADOW_SHADER.to_string(),
            settings,
            light_buffer,
            renderable_layout,
        );
        Self { core, tuning, last_projection: Mat4::IDENTITY }
    }

    pub fn tuning(&self) -> SimpleShadowTuning {
        self.tuning
    }

    pub fn set_min_bias(&mut self, bias: f32) {
        self.tuning.min_bias = bias.max(0.0);
    }

    pub fn set_max_bias(&mut self, bias: f32) {
        self.tuning.max_bias = bias.max(0.0);
    }

    pub fn set_z_mult(&mut self, z_mult: f32) {
        self.tuning.z_mult = z_mult.max(1.0);
    }

    pub fn light_view_projection(&mut self, camera: Option<&Camera>) -> Mat4 {
        let range = [(0.0, self.core.settings().depth_percentage)];
        let projection =
            self.core.fit(camera, &range, self.tuning.z_mult).first().copied().unwrap_or(Mat4::IDENTITY);
        self.last_projection = projection;
        projection
    }

    pub fn last_projection(&self) -> Mat4 {
        self.last_projection
    }

    pub fn render(&self, encoder: &mut wgpu::CommandEncoder, renderables: &[Renderable]) -> Result<()> {
        let mut pass = self.core.begin_depth_pass(encoder, wgpu::LoadOp::Clear(1.0))?;
        draw_casters(&mut pass, shadow_casters(renderables), 0..1);
        Ok(())
    }
}
