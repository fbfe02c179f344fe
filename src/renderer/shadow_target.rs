use anyhow::{Context, Result};
use glam::{Mat4, Vec3};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::shadow_fit::{fit_light_view_projection, FrustumFreeze};
use super::shadow_settings::{
    ResolutionChangeListener, ResolutionListeners, ShadowResolution, ShadowSettings, ShadowSettingsSnapshot,
};
use super::SHADOW_MAP_FORMAT;
use crate::camera3d::Camera;
use crate::mesh::GpuMesh;

/// Depth texture, its view and the comparison sampler the forward pass reads it with.
pub struct ShadowTarget {
    texture: Option<wgpu::Texture>,
    view: Option<wgpu::TextureView>,
    sampler: Option<wgpu::Sampler>,
    resolution: ShadowResolution,
    revision: u64,
}

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

impl ShadowTarget {
    pub fn new(device: &wgpu::Device, resolution: ShadowResolution, label: &str) -> Self {
        let mut target = Self { texture: None, view: None, sampler: None, resolution, revision: 0 };
        target.recreate(device, resolution, label);
        target
    }

    /// Replaces the texture, view and sampler. The previous texture is destroyed.
    pub fn recreate(&mut self, device: &wgpu::Device, resolution: ShadowResolution, label: &str) {
        let pixels = resolution.pixels();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width: pixels, height: pixels, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_MAP_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Shadow Map View"),
            format: Some(SHADOW_MAP_FORMAT),
            dimension: Some(wgpu::TextureViewDimension::D2),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Comparison Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::Less),
            ..Default::default()
        });
        if let Some(old) = self.texture.replace(texture) {
            old.destroy();
        }
        self.view = Some(view);
        self.sampler = Some(sampler);
        self.resolution = resolution;
        self.revision = NEXT_REVISION.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resolution(&self) -> ShadowResolution {
        self.resolution
    }

    /// Unique per texture allocation, across all targets.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn texture(&self) -> Result<&wgpu::Texture> {
        self.texture.as_ref().context("Shadow map texture missing")
    }

    pub fn view(&self) -> Result<&wgpu::TextureView> {
        self.view.as_ref().context("Shadow map view missing")
    }

    pub fn sampler(&self) -> Result<&wgpu::Sampler> {
        self.sampler.as_ref().context("Shadow sampler missing")
    }

    pub fn release(&mut self) {
        self.view = None;
        self.sampler = None;
        if let Some(texture) = self.texture.take() {
            texture.destroy();
        }
    }
}

/// State shared by both shadow techniques: the shared settings, the depth target, the
/// depth-only pipeline and the light binding that feeds it.
pub struct ShadowMapCore {
    label: &'static str,
    shader_source: String,
    settings: ShadowSettingsSnapshot,
    target: ShadowTarget,
    light_bind_group: wgpu::BindGroup,
    light_layout: wgpu::BindGroupLayout,
    renderable_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    listeners: ResolutionListeners,
    light_direction: Option<Vec3>,
    freeze: FrustumFreeze,
}

impl ShadowMapCore {
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        shader_source: String,
        settings: ShadowSettingsSnapshot,
        light_buffer: &wgpu::Buffer,
        renderable_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let target = ShadowTarget::new(device, settings.resolution, label);
        let light_layout = light_bind_group_layout(device);
        let light_bind_group = light_bind_group(device, &light_layout, light_buffer);
        let pipeline = create_depth_pipeline(
            device,
            label,
            shader_source.clone(),
            &light_layout,
            renderable_layout,
            settings.backface_culling,
        );
        Self {
            label,
            shader_source,
            settings,
            target,
            light_bind_group,
            light_layout,
            renderable_layout: renderable_layout.clone(),
            pipeline,
            listeners: ResolutionListeners::default(),
            light_direction: None,
            freeze: FrustumFreeze::default(),
        }
    }

    pub fn settings(&self) -> ShadowSettingsSnapshot {
        self.settings
    }

    /// Recreates the depth target at the new size, then notifies listeners in order.
    pub fn set_resolution(&mut self, device: &wgpu::Device, resolution: ShadowResolution) {
        if self.settings.resolution == resolution && self.target.resolution() == resolution {
            return;
        }
        self.target.recreate(device, resolution, self.label);
        self.settings.resolution = resolution;
        log::info!("{} resolution set to {}", self.label, resolution.pixels());
        self.listeners.notify(resolution);
    }

    pub fn set_backface_culling(&mut self, device: &wgpu::Device, enabled: bool) {
        if self.settings.backface_culling == enabled {
            return;
        }
        self.settings.backface_culling = enabled;
        self.pipeline = create_depth_pipeline(
            device,
            self.label,
            self.shader_source.clone(),
            &self.light_layout,
            &self.renderable_layout,
            enabled,
        );
        log::debug!("{} depth pipeline rebuilt with {:?} culling", self.label, cull_mode(enabled));
    }

    pub fn set_follow_camera(&mut self, follow: bool) {
        self.settings.follow_camera = follow;
    }

    pub fn set_depth_percentage(&mut self, percentage: f32) {
        self.settings.depth_percentage = percentage.clamp(0.0, 1.0);
    }

    pub fn set_light_direction(&mut self, direction: Vec3) {
        if direction.length_squared() <= f32::EPSILON {
            log::warn!("Ignoring degenerate light direction {direction:?}");
            return;
        }
        self.light_direction = Some(direction.normalize());
    }

    pub fn register_listener(&mut self, listener: Arc<dyn ResolutionChangeListener>) {
        self.listeners.register(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// One light view-projection per depth range, or identities while no camera or light is known.
    pub fn fit(&mut self, camera: Option<&Camera>, ranges: &[(f32, f32)], z_mult: f32) -> Vec<Mat4> {
        let (Some(camera), Some(direction)) = (camera, self.light_direction) else {
            return vec![Mat4::IDENTITY; ranges.len()];
        };
        let corners = ranges.iter().map(|(near, far)| camera.world_space_corners(*near, *far)).collect();
        let corners = self.freeze.resolve(self.settings.follow_camera, corners);
        corners.iter().map(|corners| fit_light_view_projection(corners, direction, z_mult)).collect()
    }

    pub fn begin_depth_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        load: wgpu::LoadOp<f32>,
    ) -> Result<wgpu::RenderPass<'e>> {
        let view = self.target.view()?;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(self.label),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations { load, store: wgpu::StoreOp::Store }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.light_bind_group, &[]);
        Ok(pass)
    }

    pub fn target(&self) -> &ShadowTarget {
        &self.target
    }

    pub fn release(&mut self) {
        self.target.release();
    }
}

impl ShadowSettings for ShadowMapCore {
    fn is_culling_backfaces(&self) -> bool {
        self.settings.backface_culling
    }

    fn resolution(&self) -> ShadowResolution {
        self.settings.resolution
    }

    fn is_following_camera(&self) -> bool {
        self.settings.follow_camera
    }

    fn shadow_depth_percentage(&self) -> f32 {
        self.settings.depth_percentage
    }
}

pub fn light_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Shadow Light BGL"),
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
    })
}

pub fn light_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    light_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Shadow Light BG"),
        layout,
        entries: &[wgpu::BindGroupEntry { binding: 0, resource: light_buffer.as_entire_binding() }],
    })
}

pub fn cull_mode(backface_culling: bool) -> wgpu::Face {
    if backface_culling {
        wgpu::Face::Back
    } else {
        wgpu::Face::Front
    }
}

/// Depth-only pipeline over `[light, renderable]` bind groups reading positions from slot 0.
pub fn create_depth_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader_source: String,
    light_layout: &wgpu::BindGroupLayout,
    renderable_layout: &wgpu::BindGroupLayout,
    backface_culling: bool,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(shader_source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Shadow Pipeline Layout"),
        bind_group_layouts: &[light_layout, renderable_layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[GpuMesh::position_layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: None,
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(cull_mode(backface_culling)),
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: SHADOW_MAP_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Records indexed draws for every caster; `instances` selects the matrix in the shader.
pub fn draw_casters<'a>(
    pass: &mut wgpu::RenderPass<'_>,
    casters: impl IntoIterator<Item = (&'a GpuMesh, &'a wgpu::BindGroup)>,
    instances: std::ops::Range<u32>,
) {
    for (mesh, bind_group) in casters {
        pass.set_bind_group(1, bind_group, &[]);
        pass.set_vertex_buffer(0, mesh.position_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count, 0, instances.clone());
    }
}
