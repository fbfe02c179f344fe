use crate::config::{AppConfig, AppConfigOverrides};
use crate::input::{Command, Input};
use crate::renderer::Renderer;
use crate::scene::{demo_scene, DEMO_ROWS};
use crate::time::Time;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};

pub const CONFIG_PATH: &str = "config/app.json";

pub fn run() -> Result<()> {
    run_with_overrides(AppConfigOverrides::default())
}

pub fn run_with_overrides(overrides: AppConfigOverrides) -> Result<()> {
    let mut config = AppConfig::load_or_default(CONFIG_PATH);
    if !overrides.is_empty() {
        log::info!("CLI overrides applied: {}", overrides.applied_fields().join(", "));
        config.apply_overrides(&overrides);
    }
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    app.exit_status()
}

pub struct App {
    renderer: Renderer,
    input: Input,
    time: Time,
    scene_loaded: bool,
    should_close: bool,
    fatal: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            renderer: Renderer::new(&config),
            input: Input::new(),
            time: Time::new(),
            scene_loaded: false,
            should_close: false,
            fatal: None,
        }
    }

    fn exit_status(&mut self) -> Result<()> {
        match self.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: anyhow::Error) {
        log::error!("{err:?}");
        self.fatal = Some(err);
        self.should_close = true;
    }

    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        self.renderer.ensure_window(event_loop)?;
        if !self.scene_loaded {
            let scene = demo_scene(&mut rand::thread_rng(), DEMO_ROWS);
            self.renderer.load_scene(&scene)?;
            self.scene_loaded = true;
        }
        Ok(())
    }

    fn apply_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::ToggleShadowMode => {
                self.renderer.toggle_shadow_mode()?;
            }
            Command::CycleShadowResolution => {
                self.renderer.cycle_shadow_resolution()?;
            }
            Command::ToggleFollowCamera => {
                self.renderer.toggle_follow_camera()?;
            }
            Command::ToggleCascadeDebug => {
                let enabled = self.renderer.toggle_cascade_debug()?;
                log::info!("Cascade debug tint {}", if enabled { "on" } else { "off" });
            }
            Command::ToggleShadowMapView => {
                let visible = self.renderer.toggle_shadow_map_view();
                log::info!("Shadow map overlay {}", if visible { "shown" } else { "hidden" });
            }
            Command::ToggleBackfaceCulling => {
                let enabled = self.renderer.toggle_backface_culling()?;
                log::info!("Shadow backface culling {}", if enabled { "on" } else { "off" });
            }
            Command::Quit => self.should_close = true,
        }
        Ok(())
    }

    fn redraw(&mut self) {
        for command in self.input.take_commands() {
            if let Err(err) = self.apply_command(command) {
                log::error!("{command:?} failed: {err:?}");
            }
        }
        if self.should_close {
            return;
        }
        self.time.tick();
        let camera_input = self.input.take_camera_input();
        self.renderer.camera_mut().handle_input(&camera_input);
        match self.renderer.render(self.time.delta_seconds()) {
            Ok(stats) => {
                if stats.renderable_uploads > 0 {
                    log::debug!("Frame {}: {} renderable uploads", self.time.frames(), stats.renderable_uploads);
                }
            }
            // Surface errors are recovered by reconfiguring; the next frame retries.
            Err(err) => log::warn!("Frame skipped: {err:?}"),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.initialize(event_loop) {
            self.fail(err.context("Renderer initialization failed"));
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        self.input.handle_window_event(&event);
        match event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => self.renderer.resize(size),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device: winit::event::DeviceId, event: DeviceEvent) {
        self.input.handle_device_event(&event);
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            event_loop.exit();
            return;
        }
        if let Some(window) = self.renderer.window() {
            window.request_redraw();
        }
    }
}
