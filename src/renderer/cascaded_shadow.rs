use anyhow::{Context, Result};
use glam::Mat4;
use std::collections::HashMap;

use super::renderable::{shadow_casters, Renderable};
use super::shadow_fit::{cascade_depth_ranges, cascade_viewport};
use super::shadow_settings::{CascadedShadowTuning, ShadowSettingsSnapshot};
use super::shadow_target::{draw_casters, ShadowMapCore};
use super::NUM_CASCADES;
use crate::camera3d::Camera;
use crate::shader_preprocessor::preprocess;

const SHADOW_SHADER: &str = include_str!("../../assets/shaders/shadow_cascaded.wgsl");

/// Cascaded shadow maps packed into the four quadrants of one atlas texture.
pub struct CascadedShadowMap {
    pub(super) core: ShadowMapCore,
    tuning: CascadedShadowTuning,
    last_projections: [Mat4; NUM_CASCADES],
}

impl CascadedShadowMap {
    pub fn new(
        device: &wgpu::Device,
        settings: ShadowSettingsSnapshot,
        tuning: CascadedShadowTuning,
        light_buffer: &wgpu::Buffer,
        renderable_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self> {
        let count = NUM_CASCADES.to_string();
        let defines = HashMap::from([("NUM_CASCADES", count.as_str())]);
        let source = preprocess(SHADOW_SHADER, &defines, &HashMap::new())
            .context("Failed to preprocess cascaded shadow shader")?;
        let core =
            ShadowMapCore::new(device, "Cascaded Shadow Map", source, settings, light_buffer, renderable_layout);
        Ok(Self { core, tuning, last_projections: [Mat4::IDENTITY; NUM_CASCADES] })
    }

    pub fn tuning(&self) -> CascadedShadowTuning {
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

    pub fn set_assignment_exponent(&mut self, exponent: f32) {
        self.tuning.assignment_exponent = exponent.max(1.0);
    }

    pub fn depth_ranges(&self) -> Vec<(f32, f32)> {
        cascade_depth_ranges(
            NUM_CASCADES,
            self.core.settings().depth_percentage,
            self.tuning.assignment_exponent,
        )
    }

    pub fn light_view_projections(&mut self, camera: Option<&Camera>) -> [Mat4; NUM_CASCADES] {
        let ranges = self.depth_ranges();
        let fitted = self.core.fit(camera, &ranges, self.tuning.z_mult);
        let mut projections = [Mat4::IDENTITY; NUM_CASCADES];
        for (dst, src) in projections.iter_mut().zip(fitted) {
            *dst = src;
        }
        self.last_projections = projections;
        projections
    }

    pub fn last_projections(&self) -> [Mat4; NUM_CASCADES] {
        self.last_projections
    }

    /// One depth pass per cascade into its atlas quadrant. Only the first pass clears.
    pub fn render(&self, encoder: &mut wgpu::CommandEncoder, renderables: &[Renderable]) -> Result<()> {
        let resolution = self.core.target().resolution().pixels();
        for cascade in 0..NUM_CASCADES {
            let load = if cascade == 0 { wgpu::LoadOp::Clear(1.0) } else { wgpu::LoadOp::Load };
            let viewport = cascade_viewport(cascade, resolution);
            let mut pass = self.core.begin_depth_pass(encoder, load)?;
            pass.set_viewport(
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
            pass.set_scissor_rect(viewport.x, viewport.y, viewport.width, viewport.height);
            let instance = cascade as u32;
            draw_casters(&mut pass, shadow_casters(renderables), instance..instance + 1);
        }
        Ok(())
    }
}
