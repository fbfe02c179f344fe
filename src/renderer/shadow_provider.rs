use anyhow::Result;
use glam::{Mat4, Vec3};
use std::sync::Arc;

use super::cascaded_shadow::CascadedShadowMap;
use super::renderable::Renderable;
use super::shadow_settings::{
    ResolutionChangeListener, ShadowMode, ShadowResolution, ShadowSettings, ShadowSettingsSnapshot,
    ShadowTuningStore,
};
use super::shadow_target::{ShadowMapCore, ShadowTarget};
use super::simple_shadow::SimpleShadowMap;
use crate::camera3d::Camera;

/// The active shadow technique.
pub enum ShadowProvider {
    Simple(SimpleShadowMap),
    Cascaded(CascadedShadowMap),
}

impl ShadowProvider {
    /// Builds the provider for `mode`, seeded with the shared settings and the stored tuning.
    pub fn new(
        device: &wgpu::Device,
        mode: ShadowMode,
        settings: ShadowSettingsSnapshot,
        tuning: &ShadowTuningStore,
        light_buffer: &wgpu::Buffer,
        renderable_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self> {
        let provider = match mode {
            ShadowMode::Simple => ShadowProvider::Simple(SimpleShadowMap::new(
                device,
                settings,
                tuning.simple(),
                light_buffer,
                renderable_layout,
            )),
            ShadowMode::Cascaded => ShadowProvider::Cascaded(CascadedShadowMap::new(
                device,
                settings,
                tuning.cascaded(),
                light_buffer,
                renderable_layout,
            )?),
        };
        Ok(provider)
    }

    pub fn mode(&self) -> ShadowMode {
        match self {
            ShadowProvider::Simple(_) => ShadowMode::Simple,
            ShadowProvider::Cascaded(_) => ShadowMode::Cascaded,
        }
    }

    fn core(&self) -> &ShadowMapCore {
        match self {
            ShadowProvider::Simple(map) => &map.core,
            ShadowProvider::Cascaded(map) => &map.core,
        }
    }

    fn core_mut(&mut self) -> &mut ShadowMapCore {
        match self {
            ShadowProvider::Simple(map) => &mut map.core,
            ShadowProvider::Cascaded(map) => &mut map.core,
        }
    }

    /// `(min_bias, max_bias)` of the active technique.
    pub fn bias(&self) -> (f32, f32) {
        match self {
            ShadowProvider::Simple(map) => (map.tuning().min_bias, map.tuning().max_bias),
            ShadowProvider::Cascaded(map) => (map.tuning().min_bias, map.tuning().max_bias),
        }
    }

    pub fn store_tuning(&self, store: &mut ShadowTuningStore) {
        match self {
            ShadowProvider::Simple(map) => store.store_simple(map.tuning()),
            ShadowProvider::Cascaded(map) => store.store_cascaded(map.tuning()),
        }
    }

    /// Light view-projections for this frame: one for the simple map, one per cascade otherwise.
    pub fn light_view_projections(&mut self, camera: Option<&Camera>) -> Vec<Mat4> {
        match self {
            ShadowProvider::Simple(map) => vec![map.light_view_projection(camera)],
            ShadowProvider::Cascaded(map) => map.light_view_projections(camera).to_vec(),
        }
    }

    pub fn render(&self, encoder: &mut wgpu::CommandEncoder, renderables: &[Renderable]) -> Result<()> {
        match self {
            ShadowProvider::Simple(map) => map.render(encoder, renderables),
            ShadowProvider::Cascaded(map) => map.render(encoder, renderables),
        }
    }

    pub fn set_resolution(&mut self, device: &wgpu::Device, resolution: ShadowResolution) {
        self.core_mut().set_resolution(device, resolution);
    }

    pub fn set_backface_culling(&mut self, device: &wgpu::Device, enabled: bool) {
        self.core_mut().set_backface_culling(device, enabled);
    }

    pub fn set_follow_camera(&mut self, follow: bool) {
        self.core_mut().set_follow_camera(follow);
    }

    pub fn set_shadow_depth_percentage(&mut self, percentage: f32) {
        self.core_mut().set_depth_percentage(percentage);
    }

    pub fn set_light_direction(&mut self, direction: Vec3) {
        self.core_mut().set_light_direction(direction);
    }

    pub fn register_listener(&mut self, listener: Arc<dyn ResolutionChangeListener>) {
        self.core_mut().register_listener(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.core().listener_count()
    }

    pub fn set_min_bias(&mut self, bias: f32) {
        match self {
            ShadowProvider::Simple(map) => map.set_min_bias(bias),
            ShadowProvider::Cascaded(map) => map.set_min_bias(bias),
        }
    }

    pub fn set_max_bias(&mut self, bias: f32) {
        match self {
            ShadowProvider::Simple(map) => map.set_max_bias(bias),
            ShadowProvider::Cascaded(map) => map.set_max_bias(bias),
        }
    }

    pub fn set_z_mult(&mut self, z_mult: f32) {
        match self {
            ShadowProvider::Simple(map) => map.set_z_mult(z_mult),
            ShadowProvider::Cascaded(map) => map.set_z_mult(z_mult),
        }
    }

    /// Only the cascaded technique has a split exponent; returns whether it was applied.
    pub fn set_assignment_exponent(&mut self, exponent: f32) -> bool {
        match self {
            ShadowProvider::Simple(_) => false,
            ShadowProvider::Cascaded(map) => {
                map.set_assignment_exponent(exponent);
                true
            }
        }
    }

    pub fn target(&self) -> &ShadowTarget {
        self.core().target()
    }

    pub fn release(&mut self) {
        self.core_mut().release();
    }
}

impl ShadowSettings for ShadowProvider {
    fn is_culling_backfaces(&self) -> bool {
        self.core().is_culling_backfaces()
    }

    fn resolution(&self) -> ShadowResolution {
        self.core().resolution()
    }

    fn is_following_camera(&self) -> bool {
        self.core().is_following_camera()
    }

    fn shadow_depth_percentage(&self) -> f32 {
        self.core().shadow_depth_percentage()
    }
}
