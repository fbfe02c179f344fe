use glam::{Mat4, Quat, Vec3, Vec4};
use std::sync::Arc;

use crate::mesh::GpuMesh;

/// GPU mirror of the per-object uniform block.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RenderableUniform {
    pub model: [[f32; 4]; 4],
    pub normal_model: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub shininess: f32,
    pub specular_intensity: f32,
    pub _padding: [f32; 2],
}

/// Transform and material of one object. Every setter marks it dirty; the forward pass
/// uploads dirty objects once and clears the flag.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderableProperties {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    color: Vec3,
    shininess: f32,
    specular_intensity: f32,
    dirty: bool,
}

impl Default for RenderableProperties {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            color: Vec3::ONE,
            shininess: 10.0,
            specular_intensity: 1.0,
            dirty: true,
        }
    }
}

impl RenderableProperties {
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty = true;
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
        self.dirty = true;
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty = true;
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
        self.dirty = true;
    }

    pub fn set_shininess(&mut self, shininess: f32) {
        self.shininess = shininess;
        self.dirty = true;
    }

    pub fn set_specular_intensity(&mut self, specular_intensity: f32) {
        self.specular_intensity = specular_intensity;
        self.dirty = true;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn uniform(&self) -> RenderableUniform {
        let model = self.model_matrix();
        let normal_model = if model.determinant().abs() > f32::EPSILON {
            model.inverse().transpose()
        } else {
            Mat4::IDENTITY
        };
        RenderableUniform {
            model: model.to_cols_array_2d(),
            normal_model: normal_model.to_cols_array_2d(),
            color: Vec4::from((self.color, 1.0)).to_array(),
            shininess: self.shininess,
            specular_intensity: self.specular_intensity,
            _padding: [0.0; 2],
        }
    }

    /// Returns the uniform to upload if the object changed, clearing the flag.
    pub fn take_upload(&mut self) -> Option<RenderableUniform> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.uniform())
    }
}

/// Index and uniform of every object whose properties changed since the last upload.
pub fn collect_dirty_uploads<'a>(
    properties: impl IntoIterator<Item = &'a mut RenderableProperties>,
) -> Vec<(usize, RenderableUniform)> {
    properties
        .into_iter()
        .enumerate()
        .filter_map(|(idx, props)| props.take_upload().map(|uniform| (idx, uniform)))
        .collect()
}

/// Geometry and bind group of every renderable that has been bound for the current layout.
pub(crate) fn shadow_casters(renderables: &[Renderable]) -> impl Iterator<Item = (&GpuMesh, &wgpu::BindGroup)> {
    renderables.iter().filter_map(|renderable| renderable.bind_group().map(|bg| (renderable.mesh(), bg)))
}

pub(crate) struct RenderableBinding {
    pub bind_group: wgpu::BindGroup,
    pub layout_generation: u64,
}

/// One drawable object: shared geometry plus its own uniform buffer and bind group.
pub struct Renderable {
    name: String,
    mesh: Arc<GpuMesh>,
    pub properties: RenderableProperties,
    pub(crate) uniform_buffer: Option<wgpu::Buffer>,
    pub(crate) binding: Option<RenderableBinding>,
}

impl Renderable {
    pub fn new(name: impl Into<String>, mesh: Arc<GpuMesh>) -> Self {
        Self {
            name: name.into(),
            mesh,
            properties: RenderableProperties::default(),
            uniform_buffer: None,
            binding: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> &GpuMesh {
        &self.mesh
    }

    pub fn shared_mesh(&self) -> Arc<GpuMesh> {
        Arc::clone(&self.mesh)
    }

    pub(crate) fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.binding.as_ref().map(|binding| &binding.bind_group)
    }
}

impl std::fmt::Debug for Renderable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderable")
            .field("name", &self.name)
            .field("index_count", &self.mesh.index_count)
            .field("properties", &self.properties)
            .finish()
    }
}
