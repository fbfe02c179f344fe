use anyhow::Result;

use super::shadow_target::ShadowTarget;

const DEBUG_SHADER: &str = include_str!("../../assets/shaders/debug_texture.wgsl");

/// Fraction of the shorter screen side covered by the preview square.
const VIEWPORT_FRACTION: f32 = 0.3;
const VIEWPORT_MARGIN: f32 = 8.0;

/// Overlays the active shadow map in the bottom-right corner of the final image.
pub struct DebugTexturePass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    bind_group: Option<(u64, wgpu::BindGroup)>,
    enabled: bool,
}

impl DebugTexturePass {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Debug Texture BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Debug Texture Shader"),
            source: wgpu::ShaderSource::Wgsl(DEBUG_SHADER.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Debug Texture Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Debug Texture Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
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
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        Self { pipeline, layout, bind_group: None, enabled: false }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Revision of the shadow map the cached bind group points at.
    pub fn bound_revision(&self) -> Option<u64> {
        self.bind_group.as_ref().map(|(revision, _)| *revision)
    }

    fn ensure_bind_group(&mut self, device: &wgpu::Device, shadow_map: &ShadowTarget) -> Result<()> {
        if self.bound_revision() == Some(shadow_map.revision()) {
            return Ok(());
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Debug Texture BG"),
            layout: &self.layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(shadow_map.view()?),
            }],
        });
        log::debug!("Debug texture bound to shadow map revision {}", shadow_map.revision());
        self.bind_group = Some((shadow_map.revision(), bind_group));
        Ok(())
    }

    pub fn render(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        target_size: (u32, u32),
        shadow_map: &ShadowTarget,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let Some((x, y, side)) = corner_viewport(target_size) else {
            return Ok(());
        };
        self.ensure_bind_group(device, shadow_map)?;
        let Some((_, bind_group)) = self.bind_group.as_ref() else {
            return Ok(());
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Debug Texture Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_viewport(x, y, side, side, 0.0, 1.0);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }
}

/// `(x, y, side)` of the preview square, or `None` when the target is too small to hold it.
fn corner_viewport((width, height): (u32, u32)) -> Option<(f32, f32, f32)> {
    let side = (width.min(height) as f32 * VIEWPORT_FRACTION).floor();
    if side < 1.0 || side + VIEWPORT_MARGIN > width as f32 || side + VIEWPORT_MARGIN > height as f32 {
        return None;
    }
    Some((width as f32 - side - VIEWPORT_MARGIN, height as f32 - side - VIEWPORT_MARGIN, side))
}
