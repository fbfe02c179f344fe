pub mod cascaded_shadow;
pub mod debug_texture_pass;
pub mod forward_pass;
pub mod renderable;
pub mod shadow_fit;
pub mod shadow_provider;
pub mod shadow_settings;
pub mod shadow_target;
pub mod simple_shadow;
pub mod uniform_layout;
pub mod window_surface;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

use crate::camera3d::{Camera, CameraController, FixedController, FreeFlyController, TurntableController};
use crate::config::{AppConfig, CameraConfig, CameraControllerKind};
use crate::mesh::{GeometryData, GpuMesh};
use crate::scene::{MeshKind, SceneDescription};
use debug_texture_pass::DebugTexturePass;
use forward_pass::{DirectionalLight, ForwardFrame, ForwardRenderer, ForwardSettings, FrameStats};
use renderable::Renderable;
use shadow_settings::{ShadowMode, ShadowResolution, ShadowSettings};
use window_surface::WindowSurface;

pub const NUM_CASCADES: usize = 4;
pub const SHADOW_MAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

pub fn build_camera(cfg: &CameraConfig, aspect: f32) -> Camera {
    let controller: Box<dyn CameraController> = match cfg.controller {
        CameraControllerKind::Fixed => Box::new(FixedController),
        CameraControllerKind::FreeFly => Box::new(FreeFlyController::default()),
        CameraControllerKind::Turntable => Box::new(TurntableController::default()),
    };
    let mut camera = Camera::new(cfg.fov_y_degrees.to_radians(), aspect, cfg.near, cfg.far);
    camera.set_controller(controller);
    camera
}

/// Owns the device, the render list and the view camera, and drives the forward pass
/// plus the shadow-map overlay once per frame.
pub struct Renderer {
    surface: WindowSurface,
    settings: ForwardSettings,
    forward: Option<ForwardRenderer>,
    debug_pass: Option<DebugTexturePass>,
    show_shadow_map: bool,
    camera: Camera,
    renderables: Vec<Renderable>,
    meshes: HashMap<MeshKind, Arc<GpuMesh>>,
    light: DirectionalLight,
}

impl Renderer {
    pub fn new(config: &AppConfig) -> Self {
        let surface = WindowSurface::new(&config.window);
        let camera = build_camera(&config.camera, surface.aspect_ratio());
        Self {
            surface,
            settings: config.forward_settings(),
            forward: None,
            debug_pass: None,
            show_shadow_map: config.renderer.show_shadow_map,
            camera,
            renderables: Vec::new(),
            meshes: HashMap::new(),
            light: DirectionalLight::default(),
        }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        self.surface.ensure_window(event_loop)?;
        self.init_passes()
    }

    /// Offscreen initialisation; frames render into a texture instead of a swapchain.
    pub async fn init_headless(&mut self) -> Result<()> {
        self.surface.init_headless().await?;
        self.init_passes()
    }

    fn init_passes(&mut self) -> Result<()> {
        if self.forward.is_some() {
            return Ok(());
        }
        let format = self.surface.surface_format()?;
        let size = self.surface.size();
        let (device, queue) = self.surface.device_and_queue()?;
        let mut forward = ForwardRenderer::new(device, queue, format, (size.width, size.height), &self.settings)?;
        forward.set_directional_light(queue, self.light)?;
        let mut debug_pass = DebugTexturePass::new(device, format);
        debug_pass.set_enabled(self.show_shadow_map);
        self.camera.set_aspect_ratio(self.surface.aspect_ratio());
        log::info!(
            "Renderer ready: {}x{}, {} shadows at {}px",
            size.width,
            size.height,
            forward.shadow_mode().label(),
            forward.shadow_settings().resolution.pixels()
        );
        self.forward = Some(forward);
        self.debug_pass = Some(debug_pass);
        Ok(())
    }

    pub fn window(&self) -> Option<&Window> {
        self.surface.window()
    }

    pub fn device(&self) -> Result<&wgpu::Device> {
        self.surface.device()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn forward(&self) -> Result<&ForwardRenderer> {
        self.forward.as_ref().context("Renderer not initialized")
    }

    pub fn renderables(&self) -> &[Renderable] {
        &self.renderables
    }

    pub fn renderable_mut(&mut self, index: usize) -> Option<&mut Renderable> {
        self.renderables.get_mut(index)
    }

    /// Uploads `geometry` once and adds an object drawing it. Returns the object's index.
    pub fn add_renderable(&mut self, name: &str, geometry: &GeometryData) -> Result<usize> {
        let mesh = Arc::new(GpuMesh::upload(self.surface.device()?, name, geometry));
        Ok(self.add_instance(name, mesh))
    }

    /// Adds an object sharing already uploaded geometry.
    pub fn add_instance(&mut self, name: &str, mesh: Arc<GpuMesh>) -> usize {
        self.renderables.push(Renderable::new(name, mesh));
        self.renderables.len() - 1
    }

    /// Adds every scene object, uploading each mesh kind once, and applies the scene light.
    pub fn load_scene(&mut self, scene: &SceneDescription) -> Result<()> {
        for object in &scene.objects {
            let mesh = match self.meshes.get(&object.mesh) {
                Some(mesh) => Arc::clone(mesh),
                None => {
                    let mesh = Arc::new(GpuMesh::upload(
                        self.surface.device()?,
                        object.mesh.label(),
                        &object.mesh.geometry(),
                    ));
                    self.meshes.insert(object.mesh, Arc::clone(&mesh));
                    mesh
                }
            };
            let index = self.add_instance(object.name, mesh);
            self.renderables[index].properties = object.properties.clone();
            self.renderables[index].properties.mark_dirty();
        }
        log::info!("Loaded {} renderables ({} meshes)", scene.objects.len(), self.meshes.len());
        self.set_directional_light(scene.light)
    }

    pub fn set_directional_light(&mut self, light: DirectionalLight) -> Result<()> {
        light.normalized_direction()?;
        if let Some(forward) = self.forward.as_mut() {
            forward.set_directional_light(self.surface.queue()?, light)?;
        }
        self.light = light;
        Ok(())
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.surface.resize(size);
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.camera.set_aspect_ratio(self.surface.aspect_ratio());
        if let (Some(forward), Ok(device)) = (self.forward.as_mut(), self.surface.device()) {
            forward.resize(device, size.width, size.height);
        }
    }

    pub fn toggle_shadow_mode(&mut self) -> Result<ShadowMode> {
        let (device, queue) = self.surface.device_and_queue()?;
        let forward = self.forward.as_mut().context("Renderer not initialized")?;
        let mode = forward.shadow_mode().toggled();
        forward.set_shadow_mode(device, queue, mode)?;
        Ok(mode)
    }

    pub fn set_shadow_mode(&mut self, mode: ShadowMode) -> Result<()> {
        let (device, queue) = self.surface.device_and_queue()?;
        let forward = self.forward.as_mut().context("Renderer not initialized")?;
        forward.set_shadow_mode(device, queue, mode)
    }

    pub fn cycle_shadow_resolution(&mut self) -> Result<ShadowResolution> {
        let device = self.surface.device()?;
        let forward = self.forward.as_mut().context("Renderer not initialized")?;
        let next = forward.shadow_settings().resolution.next();
        forward.set_shadow_map_resolution(device, next)?;
        Ok(next)
    }

    pub fn toggle_follow_camera(&mut self) -> Result<bool> {
        let forward = self.forward.as_mut().context("Renderer not initialized")?;
        let follow = !forward.shadow_provider().is_following_camera();
        forward.set_follow_camera(follow);
        log::info!("Shadow frustum {}", if follow { "follows the camera" } else { "frozen" });
        Ok(follow)
    }

    pub fn toggle_backface_culling(&mut self) -> Result<bool> {
        let device = self.surface.device()?;
        let forward = self.forward.as_mut().context("Renderer not initialized")?;
        let enabled = !forward.shadow_provider().is_culling_backfaces();
        forward.set_backface_culling(device, enabled);
        Ok(enabled)
    }

    pub fn toggle_cascade_debug(&mut self) -> Result<bool> {
        let queue = self.surface.queue()?;
        let forward = self.forward.as_mut().context("Renderer not initialized")?;
        let enabled = !forward.debug_show_cascades();
        forward.set_debug_show_cascades(queue, enabled)?;
        if forward.shadow_mode() != ShadowMode::Cascaded {
            log::info!("Cascade tint takes effect in cascaded mode");
        }
        Ok(enabled)
    }

    pub fn toggle_shadow_map_view(&mut self) -> bool {
        self.show_shadow_map = !self.show_shadow_map;
        if let Some(debug_pass) = self.debug_pass.as_mut() {
            debug_pass.set_enabled(self.show_shadow_map);
        }
        self.show_shadow_map
    }

    /// Advances the camera by `dt` seconds, records the shadow, colour and overlay passes in
    /// one command buffer, submits and presents.
    pub fn render(&mut self, dt: f32) -> Result<FrameStats> {
        self.camera.update_and_view_matrix(dt);
        let frame = self.surface.acquire_surface_frame()?;
        let size = self.surface.size();
        let (device, queue) = self.surface.device_and_queue()?;
        let forward = self.forward.as_mut().context("Renderer not initialized")?;
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Encoder") });
        let stats = forward.render(ForwardFrame {
            device,
            queue,
            encoder: &mut encoder,
            target: frame.view(),
            camera: Some(&self.camera),
            renderables: &mut self.renderables,
        })?;
        if let Some(debug_pass) = self.debug_pass.as_mut() {
            debug_pass.render(device, &mut encoder, frame.view(), (size.width, size.height), forward.shadow_map())?;
        }
        queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(stats)
    }
}
