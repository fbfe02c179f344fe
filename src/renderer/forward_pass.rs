use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use super::renderable::{collect_dirty_uploads, Renderable, RenderableBinding};
use super::shadow_provider::ShadowProvider;
use super::shadow_settings::{
    ResolutionChangeListener, PendingResolution, ShadowMode, ShadowResolution, ShadowSettings,
    ShadowSettingsSnapshot, ShadowTuningStore,
};
use super::shadow_target::ShadowTarget;
use super::uniform_layout::{
    align_to, camera_block, cascaded_light_block, fields, renderable_block, shadow_params_block,
    simple_light_block, StructLayout,
};
use super::{DEPTH_FORMAT, NUM_CASCADES};
use crate::camera3d::Camera;
use crate::mesh::GpuMesh;
use crate::shader_preprocessor::preprocess;

const FORWARD_SHADER: &str = include_str!("../../assets/shaders/forward.wgsl");

pub const PCF_SAMPLE_OPTIONS: [u32; 5] = [0, 9, 25, 49, 81];

/// Filter radius in texels for a square kernel of `samples` taps. Zero samples yields a
/// negative radius, which disables shadowing in the shader.
pub fn pcf_radius(samples: u32) -> f32 {
    ((samples as f32).sqrt() - 1.0) / 2.0
}

/// Binding slot of the light block inside the per-frame bind group.
pub fn light_binding(mode: ShadowMode) -> u32 {
    match mode {
        ShadowMode::Simple => 1,
        ShadowMode::Cascaded => 5,
    }
}

pub fn light_block(mode: ShadowMode) -> StructLayout {
    match mode {
        ShadowMode::Simple => simple_light_block(),
        ShadowMode::Cascaded => cascaded_light_block(NUM_CASCADES),
    }
}

fn uniform_size(layout: &StructLayout) -> u64 {
    align_to(layout.size(), 16).max(16)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub ambient_intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self { direction: Vec3::NEG_Y, color: Vec3::ONE, ambient_intensity: 0.05 }
    }
}

impl DirectionalLight {
    /// Unit direction, or an error for a zero-length vector.
    pub fn normalized_direction(&self) -> Result<Vec3> {
        let direction = self.direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return Err(anyhow!("Directional light needs a non-zero direction, got {:?}", self.direction));
        }
        Ok(direction)
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    view_projection: [[f32; 4]; 4],
    position: [f32; 4],
}

/// Construction-time options of the forward pass.
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardSettings {
    pub msaa_samples: u32,
    pub pcf_samples: u32,
    pub clear_color: [f64; 4],
    pub shadow_mode: ShadowMode,
    pub shadow: ShadowSettingsSnapshot,
    pub tuning: ShadowTuningStore,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            msaa_samples: 4,
            pcf_samples: 9,
            clear_color: [0.53, 0.81, 0.98, 1.0],
            shadow_mode: ShadowMode::default(),
            shadow: ShadowSettingsSnapshot::default(),
            tuning: ShadowTuningStore::default(),
        }
    }
}

/// Inputs of one recorded frame.
pub struct ForwardFrame<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub target: &'a wgpu::TextureView,
    pub camera: Option<&'a Camera>,
    pub renderables: &'a mut [Renderable],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub renderable_uploads: usize,
    pub params_uploaded: bool,
    pub draws: usize,
}

/// Layouts, pipeline and buffers whose shape depends on the shadow mode.
struct ModeResources {
    mode: ShadowMode,
    frame_layout: wgpu::BindGroupLayout,
    renderable_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    light_layout: StructLayout,
    light_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
}

impl ModeResources {
    fn new(
        device: &wgpu::Device,
        mode: ShadowMode,
        color_format: wgpu::TextureFormat,
        msaa_samples: u32,
    ) -> Result<Self> {
        let (frame_layout, renderable_layout) = create_bind_group_layouts(device, mode);
        let pipeline =
            create_forward_pipeline(device, mode, color_format, msaa_samples, &frame_layout, &renderable_layout)?;
        let light_layout = light_block(mode);
        let light_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Forward Light Buffer"),
            size: uniform_size(&light_layout),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shadow Params Buffer"),
            size: uniform_size(&shadow_params_block()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        log::debug!("Forward pipeline built for {} shadows", mode.label());
        Ok(Self { mode, frame_layout, renderable_layout, pipeline, light_layout, light_buffer, params_buffer })
    }
}

struct RenderTargets {
    msaa_view: Option<wgpu::TextureView>,
    depth_view: wgpu::TextureView,
}

/// Forward renderer: owns the per-frame uniforms, switches shadow techniques and records
/// the shadow and colour passes of each frame.
pub struct ForwardRenderer {
    color_format: wgpu::TextureFormat,
    msaa_samples: u32,
    size: (u32, u32),
    clear_color: wgpu::Color,
    camera_layout: StructLayout,
    camera_buffer: wgpu::Buffer,
    resources: ModeResources,
    frame_bind_group: wgpu::BindGroup,
    layout_generation: u64,
    shadow: ShadowProvider,
    tuning: ShadowTuningStore,
    pending_resolution: Arc<PendingResolution>,
    light: DirectionalLight,
    pcf_samples: u32,
    debug_show_cascades: bool,
    uploaded_params: Option<[f32; 3]>,
    targets: RenderTargets,
}

impl ForwardRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color_format: wgpu::TextureFormat,
        size: (u32, u32),
        settings: &ForwardSettings,
    ) -> Result<Self> {
        let msaa_samples = if settings.msaa_samples > 1 { 4 } else { 1 };
        let camera_layout = camera_block();
        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Forward Camera Buffer"),
            size: uniform_size(&camera_layout),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let resources = ModeResources::new(device, settings.shadow_mode, color_format, msaa_samples)?;
        let mut shadow = ShadowProvider::new(
            device,
            settings.shadow_mode,
            settings.shadow,
            &settings.tuning,
            &resources.light_buffer,
            &resources.renderable_layout,
        )?;
        let pending_resolution = Arc::new(PendingResolution::default());
        shadow.register_listener(pending_resolution.clone());
        let frame_bind_group = create_frame_bind_group(device, &resources, &camera_buffer, shadow.target())?;
        let [r, g, b, a] = settings.clear_color;
        let mut renderer = Self {
            color_format,
            msaa_samples,
            size,
            clear_color: wgpu::Color { r, g, b, a },
            camera_layout,
            camera_buffer,
            resources,
            frame_bind_group,
            layout_generation: 0,
            shadow,
            tuning: settings.tuning,
            pending_resolution,
            light: DirectionalLight::default(),
            pcf_samples: settings.pcf_samples,
            debug_show_cascades: false,
            uploaded_params: None,
            targets: create_render_targets(device, color_format, msaa_samples, size),
        };
        renderer.set_directional_light(queue, DirectionalLight::default())?;
        renderer.refresh_shadow_params(queue);
        Ok(renderer)
    }

    pub fn shadow_mode(&self) -> ShadowMode {
        self.resources.mode
    }

    pub fn shadow_settings(&self) -> ShadowSettingsSnapshot {
        self.shadow.snapshot()
    }

    /// Stored tuning of both techniques, including unsaved changes of the active one.
    pub fn shadow_tuning(&self) -> ShadowTuningStore {
        let mut tuning = self.tuning;
        self.shadow.store_tuning(&mut tuning);
        tuning
    }

    pub fn shadow_provider(&self) -> &ShadowProvider {
        &self.shadow
    }

    pub fn shadow_map(&self) -> &ShadowTarget {
        self.shadow.target()
    }

    pub fn light(&self) -> DirectionalLight {
        self.light
    }

    pub fn pcf_samples(&self) -> u32 {
        self.pcf_samples
    }

    pub fn debug_show_cascades(&self) -> bool {
        self.debug_show_cascades
    }

    pub fn layout_generation(&self) -> u64 {
        self.layout_generation
    }

    pub fn msaa_samples(&self) -> u32 {
        self.msaa_samples
    }

    pub fn renderable_layout(&self) -> &wgpu::BindGroupLayout {
        &self.resources.renderable_layout
    }

    pub fn light_buffer(&self) -> &wgpu::Buffer {
        &self.resources.light_buffer
    }

    pub fn light_layout(&self) -> &StructLayout {
        &self.resources.light_layout
    }

    /// Subscribes to resolution changes of the active shadow technique.
    pub fn register_resolution_listener(&mut self, listener: Arc<dyn ResolutionChangeListener>) {
        self.shadow.register_listener(listener);
    }

    /// Replaces the shadow technique, carrying the shared settings over and keeping each
    /// technique's tuning for the next time it becomes active.
    pub fn set_shadow_mode(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, mode: ShadowMode) -> Result<()> {
        if mode == self.resources.mode {
            return Ok(());
        }
        let settings = self.shadow.snapshot();
        self.shadow.store_tuning(&mut self.tuning);

        let resources = ModeResources::new(device, mode, self.color_format, self.msaa_samples)?;
        let mut shadow = ShadowProvider::new(
            device,
            mode,
            settings,
            &self.tuning,
            &resources.light_buffer,
            &resources.renderable_layout,
        )?;
        shadow.register_listener(self.pending_resolution.clone());
        let frame_bind_group = create_frame_bind_group(device, &resources, &self.camera_buffer, shadow.target())?;

        let mut previous = std::mem::replace(&mut self.shadow, shadow);
        previous.release();
        self.resources = resources;
        self.frame_bind_group = frame_bind_group;
        self.layout_generation += 1;
        self.uploaded_params = None;
        self.pending_resolution.clear();

        self.set_directional_light(queue, self.light)?;
        self.write_debug_flag(queue)?;
        self.refresh_shadow_params(queue);
        log::info!("Shadow mode switched to {}", mode.label());
        Ok(())
    }

    /// Recreates the shadow map and rebinds it before returning.
    pub fn set_shadow_map_resolution(&mut self, device: &wgpu::Device, resolution: ShadowResolution) -> Result<()> {
        self.shadow.set_resolution(device, resolution);
        if let Some(resolution) = self.pending_resolution.take() {
            self.frame_bind_group =
                create_frame_bind_group(device, &self.resources, &self.camera_buffer, self.shadow.target())?;
            log::debug!("Frame bind group rebuilt for {}px shadow map", resolution.pixels());
        }
        Ok(())
    }

    /// Writes direction, colour and ambient intensity into the light block and forwards the
    /// direction to the shadow technique. A zero-length direction is rejected before anything
    /// is written.
    pub fn set_directional_light(&mut self, queue: &wgpu::Queue, light: DirectionalLight) -> Result<()> {
        let direction = light.normalized_direction()?;
        let layout = &self.resources.light_layout;
        let buffer = &self.resources.light_buffer;
        queue.write_buffer(
            buffer,
            layout.field_offset(fields::DIRECTION)?,
            bytemuck::cast_slice(&direction.extend(0.0).to_array()),
        );
        queue.write_buffer(
            buffer,
            layout.field_offset(fields::COLOR)?,
            bytemuck::cast_slice(&light.color.extend(1.0).to_array()),
        );
        queue.write_buffer(
            buffer,
            layout.field_offset(fields::AMBIENT_INTENSITY)?,
            bytemuck::bytes_of(&light.ambient_intensity),
        );
        self.light = light;
        self.shadow.set_light_direction(light.direction);
        Ok(())
    }

    pub fn set_pcf_samples(&mut self, queue: &wgpu::Queue, samples: u32) -> Result<()> {
        if !PCF_SAMPLE_OPTIONS.contains(&samples) {
            return Err(anyhow!("Unsupported PCF sample count {samples}; expected one of {PCF_SAMPLE_OPTIONS:?}"));
        }
        self.pcf_samples = samples;
        self.refresh_shadow_params(queue);
        Ok(())
    }

    pub fn set_debug_show_cascades(&mut self, queue: &wgpu::Queue, enabled: bool) -> Result<()> {
        self.debug_show_cascades = enabled;
        self.write_debug_flag(queue)
    }

    pub fn set_backface_culling(&mut self, device: &wgpu::Device, enabled: bool) {
        self.shadow.set_backface_culling(device, enabled);
    }

    pub fn set_follow_camera(&mut self, follow: bool) {
        self.shadow.set_follow_camera(follow);
    }

    pub fn set_shadow_depth_percentage(&mut self, percentage: f32) {
        self.shadow.set_shadow_depth_percentage(percentage);
    }

    pub fn set_min_bias(&mut self, bias: f32) {
        self.shadow.set_min_bias(bias);
    }

    pub fn set_max_bias(&mut self, bias: f32) {
        self.shadow.set_max_bias(bias);
    }

    pub fn set_z_mult(&mut self, z_mult: f32) {
        self.shadow.set_z_mult(z_mult);
    }

    pub fn set_assignment_exponent(&mut self, exponent: f32) {
        if !self.shadow.set_assignment_exponent(exponent) {
            log::warn!("Assignment exponent only applies to cascaded shadows");
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.size {
            return;
        }
        self.size = (width, height);
        self.targets = create_render_targets(device, self.color_format, self.msaa_samples, self.size);
    }

    /// Records the shadow pass(es) and the colour pass for one frame.
    pub fn render(&mut self, frame: ForwardFrame<'_>) -> Result<FrameStats> {
        let mut stats = FrameStats::default();
        self.ensure_renderable_bindings(frame.device, frame.renderables);

        let uploads = collect_dirty_uploads(frame.renderables.iter_mut().map(|r| &mut r.properties));
        for (idx, uniform) in &uploads {
            let buffer = frame.renderables[*idx].uniform_buffer.as_ref().context("Renderable buffer missing")?;
            frame.queue.write_buffer(buffer, 0, bytemuck::bytes_of(uniform));
        }
        stats.renderable_uploads = uploads.len();
        stats.params_uploaded = self.refresh_shadow_params(frame.queue);

        if let Some(camera) = frame.camera {
            let uniform = CameraUniform {
                view_projection: camera.view_projection().to_cols_array_2d(),
                position: camera.position().extend(1.0).to_array(),
            };
            frame.queue.write_buffer(
                &self.camera_buffer,
                self.camera_layout.field_offset(fields::VIEW_PROJECTION)?,
                bytemuck::bytes_of(&uniform),
            );
        }

        let projections = self.shadow.light_view_projections(frame.camera);
        self.write_light_projections(frame.queue, &projections)?;
        self.shadow.render(frame.encoder, frame.renderables)?;

        let (view, resolve_target) = match self.targets.msaa_view.as_ref() {
            Some(msaa) => (msaa, Some(frame.target)),
            None => (frame.target, None),
        };
        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Forward Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target,
                ops: wgpu::Operations { load: wgpu::LoadOp::Clear(self.clear_color), store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.targets.depth_view,
                depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: wgpu::StoreOp::Store }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.resources.pipeline);
        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        for renderable in frame.renderables.iter() {
            let Some(bind_group) = renderable.bind_group() else {
                continue;
            };
            let mesh: &GpuMesh = renderable.mesh();
            pass.set_bind_group(1, bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.position_buffer.slice(..));
            pass.set_vertex_buffer(1, mesh.normal_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            stats.draws += 1;
        }
        Ok(stats)
    }

    /// Creates missing uniform buffers and rebinds objects bound against an older layout.
    fn ensure_renderable_bindings(&self, device: &wgpu::Device, renderables: &mut [Renderable]) {
        let size = uniform_size(&renderable_block());
        for renderable in renderables.iter_mut() {
            if renderable.uniform_buffer.is_none() {
                renderable.uniform_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Renderable Buffer"),
                    size,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }));
                renderable.binding = None;
                renderable.properties.mark_dirty();
            }
            let current = renderable
                .binding
                .as_ref()
                .map(|binding| binding.layout_generation == self.layout_generation)
                .unwrap_or(false);
            if current {
                continue;
            }
            if let Some(buffer) = renderable.uniform_buffer.as_ref() {
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Renderable BG"),
                    layout: &self.resources.renderable_layout,
                    entries: &[wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() }],
                });
                renderable.binding =
                    Some(RenderableBinding { bind_group, layout_generation: self.layout_generation });
            }
        }
    }

    fn write_light_projections(&self, queue: &wgpu::Queue, projections: &[Mat4]) -> Result<()> {
        let flattened: Vec<f32> = projections.iter().flat_map(|m| m.to_cols_array()).collect();
        let offset = self.resources.light_layout.field_offset(fields::VIEW_PROJECTION)?;
        queue.write_buffer(&self.resources.light_buffer, offset, bytemuck::cast_slice(&flattened));
        Ok(())
    }

    fn write_debug_flag(&self, queue: &wgpu::Queue) -> Result<()> {
        if self.resources.mode != ShadowMode::Cascaded {
            return Ok(());
        }
        let offset = self.resources.light_layout.field_offset(fields::DEBUG_SHOW_CASCADES)?;
        let value: f32 = if self.debug_show_cascades { 1.0 } else { 0.0 };
        queue.write_buffer(&self.resources.light_buffer, offset, bytemuck::bytes_of(&value));
        Ok(())
    }

    /// Uploads bias and filter radius when they differ from the last upload.
    fn refresh_shadow_params(&mut self, queue: &wgpu::Queue) -> bool {
        let (min_bias, max_bias) = self.shadow.bias();
        let params = [min_bias, max_bias, pcf_radius(self.pcf_samples)];
        if self.uploaded_params == Some(params) {
            return false;
        }
        queue.write_buffer(&self.resources.params_buffer, 0, bytemuck::cast_slice(&params));
        self.uploaded_params = Some(params);
        true
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages, min_size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(min_size),
        },
        count: None,
    }
}

fn create_bind_group_layouts(
    device: &wgpu::Device,
    mode: ShadowMode,
) -> (wgpu::BindGroupLayout, wgpu::BindGroupLayout) {
    let vertex_fragment = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
    let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Forward Frame BGL"),
        entries: &[
            uniform_entry(0, vertex_fragment, camera_block().size()),
            uniform_entry(light_binding(mode), vertex_fragment, 0),
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
            uniform_entry(4, wgpu::ShaderStages::FRAGMENT, 0),
        ],
    });
    let renderable_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Forward Renderable BGL"),
        entries: &[uniform_entry(0, vertex_fragment, renderable_block().size())],
    });
    (frame_layout, renderable_layout)
}

fn create_frame_bind_group(
    device: &wgpu::Device,
    resources: &ModeResources,
    camera_buffer: &wgpu::Buffer,
    shadow_map: &ShadowTarget,
) -> Result<wgpu::BindGroup> {
    Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Forward Frame BG"),
        layout: &resources.frame_layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: camera_buffer.as_entire_binding() },
            wgpu::BindGroupEntry {
                binding: light_binding(resources.mode),
                resource: resources.light_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(shadow_map.view()?) },
            wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::Sampler(shadow_map.sampler()?) },
            wgpu::BindGroupEntry { binding: 4, resource: resources.params_buffer.as_entire_binding() },
        ],
    }))
}

fn create_forward_pipeline(
    device: &wgpu::Device,
    mode: ShadowMode,
    color_format: wgpu::TextureFormat,
    msaa_samples: u32,
    frame_layout: &wgpu::BindGroupLayout,
    renderable_layout: &wgpu::BindGroupLayout,
) -> Result<wgpu::RenderPipeline> {
    let cascades = NUM_CASCADES.to_string();
    let defines = HashMap::from([("NUM_CASCADES", cascades.as_str())]);
    let checks = HashMap::from([("useCSM", mode == ShadowMode::Cascaded)]);
    let source = preprocess(FORWARD_SHADER, &defines, &checks).context("Failed to preprocess forward shader")?;
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Forward Shader"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Forward Pipeline Layout"),
        bind_group_layouts: &[frame_layout, renderable_layout],
        push_constant_ranges: &[],
    });
    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Forward Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[GpuMesh::position_layout(), GpuMesh::normal_layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState { count: msaa_samples, mask: !0, alpha_to_coverage_enabled: false },
        multiview: None,
        cache: None,
    }))
}

fn create_render_targets(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    msaa_samples: u32,
    size: (u32, u32),
) -> RenderTargets {
    let extent = wgpu::Extent3d { width: size.0.max(1), height: size.1.max(1), depth_or_array_layers: 1 };
    let msaa_view = (msaa_samples > 1).then(|| {
        device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Forward MSAA Target"),
                size: extent,
                mip_level_count: 1,
                sample_count: msaa_samples,
                dimension: wgpu::TextureDimension::D2,
                format: color_format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    });
    let depth_view = device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Forward Depth Texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: msaa_samples,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default());
    RenderTargets { msaa_view, depth_view }
}
