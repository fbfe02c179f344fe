use crate::config::WindowConfig;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window};

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;

/// Colour target of one frame: a swapchain image, or a view of the offscreen texture.
#[derive(Debug)]
pub struct SurfaceFrame {
    view: wgpu::TextureView,
    swapchain: Option<wgpu::SurfaceTexture>,
}

impl SurfaceFrame {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn present(self) {
        if let Some(texture) = self.swapchain {
            texture.present();
        }
    }
}

enum Presentation {
    Window { window: Arc<Window>, surface: wgpu::Surface<'static>, config: wgpu::SurfaceConfiguration },
    Offscreen { texture: wgpu::Texture },
}

/// Device, queue and whatever frames are drawn into: a window swapchain or an offscreen texture.
pub struct WindowSurface {
    title: String,
    vsync: bool,
    fullscreen: bool,
    size: PhysicalSize<u32>,
    gpu: Option<(wgpu::Device, wgpu::Queue)>,
    presentation: Option<Presentation>,
}

impl WindowSurface {
    pub fn new(window_cfg: &WindowConfig) -> Self {
        Self {
            title: window_cfg.title.clone(),
            vsync: window_cfg.vsync,
            fullscreen: window_cfg.fullscreen,
            size: PhysicalSize::new(window_cfg.width, window_cfg.height),
            gpu: None,
            presentation: None,
        }
    }

    /// Opens the window and configures its swapchain. Does nothing once a target exists.
    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.presentation.is_some() {
            return Ok(());
        }
        let mut attrs = Window::default_attributes().with_title(self.title.clone()).with_inner_size(self.size);
        if self.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(attrs).context("Failed to create window")?);
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).context("Failed to create WGPU surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("Failed to request WGPU adapter")?;
        log::info!("Using adapter {}", adapter.get_info().name);
        let (device, queue) = pollster::block_on(request_device(&adapter, "Device"))?;

        let caps = surface.get_capabilities(&adapter);
        let inner = window.inner_size();
        if inner.width > 0 && inner.height > 0 {
            self.size = inner;
        }
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: choose_surface_format(&caps.formats).context("Surface reports no formats")?,
            width: self.size.width.max(1),
            height: self.size.height.max(1),
            present_mode: present_mode(self.vsync, &caps.present_modes),
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!("Surface {:?} at {}x{}, {:?}", config.format, config.width, config.height, config.present_mode);

        self.gpu = Some((device, queue));
        self.presentation = Some(Presentation::Window { window, surface, config });
        Ok(())
    }

    /// Creates a device without a window and an offscreen colour target.
    /// Fails when the machine exposes no adapter.
    pub async fn init_headless(&mut self) -> Result<()> {
        if self.presentation.is_some() {
            return Ok(());
        }
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request headless adapter")?;
        let (device, queue) = request_device(&adapter, "Headless Device").await?;
        let texture = create_offscreen_target(&device, self.size)?;
        self.gpu = Some((device, queue));
        self.presentation = Some(Presentation::Offscreen { texture });
        Ok(())
    }

    pub fn device_and_queue(&self) -> Result<(&wgpu::Device, &wgpu::Queue)> {
        let (device, queue) = self.gpu.as_ref().context("GPU device not initialized")?;
        Ok((device, queue))
    }

    pub fn device(&self) -> Result<&wgpu::Device> {
        Ok(self.device_and_queue()?.0)
    }

    pub fn queue(&self) -> Result<&wgpu::Queue> {
        Ok(self.device_and_queue()?.1)
    }

    pub fn surface_format(&self) -> Result<wgpu::TextureFormat> {
        match self.presentation.as_ref().context("Surface not initialized")? {
            Presentation::Window { config, .. } => Ok(config.format),
            Presentation::Offscreen { .. } => Ok(OFFSCREEN_FORMAT),
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn window(&self) -> Option<&Window> {
        match self.presentation.as_ref()? {
            Presentation::Window { window, .. } => Some(window.as_ref()),
            Presentation::Offscreen { .. } => None,
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.size.height == 0 {
            1.0
        } else {
            self.size.width as f32 / self.size.height as f32
        }
    }

    /// Records the new size and resizes the target. A zero-sized window (minimised) keeps the
    /// old target until it becomes visible again.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        let Some((device, _)) = self.gpu.as_ref() else { return };
        match self.presentation.as_mut() {
            Some(Presentation::Window { surface, config, .. }) => {
                config.width = new_size.width;
                config.height = new_size.height;
                surface.configure(device, config);
            }
            Some(Presentation::Offscreen { texture }) => match create_offscreen_target(device, new_size) {
                Ok(resized) => *texture = resized,
                Err(err) => log::error!("Offscreen target resize failed: {err:?}"),
            },
            None => {}
        }
    }

    /// Next colour target. A lost or outdated swapchain is reconfigured and reported as an
    /// error; the following call draws normally.
    pub fn acquire_surface_frame(&self) -> Result<SurfaceFrame> {
        let (device, _) = self.gpu.as_ref().context("GPU device not initialized")?;
        match self.presentation.as_ref().context("Surface not initialized")? {
            Presentation::Offscreen { texture } => Ok(SurfaceFrame {
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                swapchain: None,
            }),
            Presentation::Window { surface, config, .. } => match surface.get_current_texture() {
                Ok(texture) => Ok(SurfaceFrame {
                    view: texture.texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    swapchain: Some(texture),
                }),
                Err(err) if needs_reconfigure(&err) => {
                    surface.configure(device, config);
                    Err(anyhow!("Surface {err}; reconfigured"))
                }
                Err(err) => Err(anyhow!("Surface acquisition failed: {err}")),
            },
        }
    }
}

fn needs_reconfigure(error: &wgpu::SurfaceError) -> bool {
    matches!(error, wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)
}

fn present_mode(vsync: bool, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    available.iter().copied().find(|mode| *mode != wgpu::PresentMode::Fifo).unwrap_or(wgpu::PresentMode::Fifo)
}

fn choose_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats.iter().copied().find(|f| f.is_srgb()).or_else(|| formats.first().copied())
}

fn create_offscreen_target(device: &wgpu::Device, size: PhysicalSize<u32>) -> Result<wgpu::Texture> {
    if size.width == 0 || size.height == 0 {
        return Err(anyhow!("Offscreen target requires non-zero dimensions"));
    }
    Ok(device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Target"),
        size: wgpu::Extent3d { width: size.width, height: size.height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    }))
}

async fn request_device(adapter: &wgpu::Adapter, label: &str) -> Result<(wgpu::Device, wgpu::Queue)> {
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        })
        .await
        .context("Failed to request WGPU device")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollster::block_on;

    #[test]
    fn vsync_forces_fifo() {
        let modes = [wgpu::PresentMode::Immediate, wgpu::PresentMode::Fifo];
        assert_eq!(present_mode(false, &modes), wgpu::PresentMode::Immediate);
        assert_eq!(present_mode(true, &modes), wgpu::PresentMode::Fifo);
        assert_eq!(present_mode(false, &[wgpu::PresentMode::Fifo]), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let formats = [wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Bgra8UnormSrgb];
        assert_eq!(choose_surface_format(&formats), Some(wgpu::TextureFormat::Bgra8UnormSrgb));
        assert_eq!(choose_surface_format(&formats[..1]), Some(wgpu::TextureFormat::Bgra8Unorm));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn only_lost_and_outdated_swapchains_are_reconfigured() {
        assert!(needs_reconfigure(&wgpu::SurfaceError::Lost));
        assert!(needs_reconfigure(&wgpu::SurfaceError::Outdated));
        assert!(!needs_reconfigure(&wgpu::SurfaceError::Timeout));
        assert!(!needs_reconfigure(&wgpu::SurfaceError::OutOfMemory));
    }

    #[test]
    fn uninitialised_surface_reports_errors() {
        let mut surface = WindowSurface::new(&WindowConfig::default());
        assert!(surface.device().is_err());
        assert!(surface.surface_format().is_err());
        assert!(surface.acquire_surface_frame().is_err());
        assert!(surface.window().is_none());
        surface.resize(PhysicalSize::new(0, 0));
        assert_eq!(surface.aspect_ratio(), 1.0);
    }

    #[test]
    fn offscreen_target_follows_resize() {
        let window_config = WindowConfig { width: 64, height: 32, ..Default::default() };
        let mut surface = WindowSurface::new(&window_config);
        if let Err(err) = block_on(surface.init_headless()) {
            eprintln!("skipping headless surface test: {err:?}");
            return;
        }
        assert_eq!(surface.surface_format().expect("format"), OFFSCREEN_FORMAT);
        assert_eq!(surface.aspect_ratio(), 2.0);

        surface.resize(PhysicalSize::new(48, 48));
        match surface.presentation.as_ref() {
            Some(Presentation::Offscreen { texture }) => assert_eq!((texture.width(), texture.height()), (48, 48)),
            _ => panic!("expected an offscreen target"),
        }
        surface.acquire_surface_frame().expect("offscreen frame").present();

        surface.resize(PhysicalSize::new(0, 0));
        assert!(surface.acquire_surface_frame().is_ok(), "minimised keeps the old target");
    }
}
