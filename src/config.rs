use crate::renderer::forward_pass::{ForwardSettings, PCF_SAMPLE_OPTIONS};
use crate::renderer::shadow_settings::{
    CascadedShadowTuning, ShadowMode, ShadowResolution, ShadowSettingsSnapshot, ShadowTuningStore,
    SimpleShadowTuning,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "WindowConfig::default_title")]
    pub title: String,
    #[serde(default = "WindowConfig::default_width")]
    pub width: u32,
    #[serde(default = "WindowConfig::default_height")]
    pub height: u32,
    #[serde(default = "WindowConfig::default_vsync")]
    pub vsync: bool,
    #[serde(default)]
    pub fullscreen: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RendererConfig {
    #[serde(default = "RendererConfig::default_msaa_samples")]
    pub msaa_samples: u32,
    #[serde(default = "RendererConfig::default_pcf_samples")]
    pub pcf_samples: u32,
    #[serde(default)]
    pub shadow_mode: ShadowMode,
    #[serde(default = "RendererConfig::default_clear_color")]
    pub clear_color: [f64; 4],
    /// Overlay the active shadow map in a corner of the window.
    #[serde(default = "RendererConfig::default_show_shadow_map")]
    pub show_shadow_map: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShadowConfig {
    #[serde(default)]
    pub resolution: ShadowResolution,
    #[serde(default = "ShadowConfig::default_true")]
    pub backface_culling: bool,
    #[serde(default = "ShadowConfig::default_true")]
    pub follow_camera: bool,
    #[serde(default = "ShadowConfig::default_depth_percentage")]
    pub depth_percentage: f32,
    #[serde(default)]
    pub simple: SimpleShadowTuning,
    #[serde(default)]
    pub cascaded: CascadedShadowTuning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraControllerKind {
    Fixed,
    #[default]
    FreeFly,
    Turntable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "CameraConfig::default_fov_y_degrees")]
    pub fov_y_degrees: f32,
    #[serde(default = "CameraConfig::default_near")]
    pub near: f32,
    #[serde(default = "CameraConfig::default_far")]
    pub far: f32,
    #[serde(default)]
    pub controller: CameraControllerKind,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub shadow: ShadowConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub shadow_mode: Option<ShadowMode>,
    pub shadow_resolution: Option<ShadowResolution>,
}

impl WindowConfig {
    fn default_title() -> String {
        "Penumbra".to_string()
    }

    const fn default_width() -> u32 {
        1280
    }

    const fn default_height() -> u32 {
        720
    }

    const fn default_vsync() -> bool {
        true
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: Self::default_title(),
            width: Self::default_width(),
            height: Self::default_height(),
            vsync: Self::default_vsync(),
            fullscreen: false,
        }
    }
}

impl RendererConfig {
    const fn default_msaa_samples() -> u32 {
        4
    }

    const fn default_pcf_samples() -> u32 {
        9
    }

    const fn default_clear_color() -> [f64; 4] {
        [0.53, 0.81, 0.98, 1.0]
    }

    const fn default_show_shadow_map() -> bool {
        true
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            msaa_samples: Self::default_msaa_samples(),
            pcf_samples: Self::default_pcf_samples(),
            shadow_mode: ShadowMode::default(),
            clear_color: Self::default_clear_color(),
            show_shadow_map: Self::default_show_shadow_map(),
        }
    }
}

impl ShadowConfig {
    const fn default_true() -> bool {
        true
    }

    const fn default_depth_percentage() -> f32 {
        1.0
    }

    pub fn snapshot(&self) -> ShadowSettingsSnapshot {
        ShadowSettingsSnapshot {
            backface_culling: self.backface_culling,
            resolution: self.resolution,
            follow_camera: self.follow_camera,
            depth_percentage: self.depth_percentage.clamp(0.0, 1.0),
        }
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            resolution: ShadowResolution::default(),
            backface_culling: true,
            follow_camera: true,
            depth_percentage: Self::default_depth_percentage(),
            simple: SimpleShadowTuning::default(),
            cascaded: CascadedShadowTuning::default(),
        }
    }
}

impl CameraConfig {
    const fn default_fov_y_degrees() -> f32 {
        36.0
    }

    const fn default_near() -> f32 {
        0.5
    }

    const fn default_far() -> f32 {
        500.0
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: Self::default_fov_y_degrees(),
            near: Self::default_near(),
            far: Self::default_far(),
            controller: CameraControllerKind::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(mode) = overrides.shadow_mode {
            self.renderer.shadow_mode = mode;
        }
        if let Some(resolution) = overrides.shadow_resolution {
            self.shadow.resolution = resolution;
        }
    }

    /// Forward pass options; out-of-range values fall back to their defaults with a warning.
    pub fn forward_settings(&self) -> ForwardSettings {
        let msaa_samples = match self.renderer.msaa_samples {
            1 | 4 => self.renderer.msaa_samples,
            other => {
                log::warn!("Unsupported MSAA sample count {other}; using 4");
                4
            }
        };
        let pcf_samples = if PCF_SAMPLE_OPTIONS.contains(&self.renderer.pcf_samples) {
            self.renderer.pcf_samples
        } else {
            log::warn!("Unsupported PCF sample count {}; using 9", self.renderer.pcf_samples);
            9
        };
        ForwardSettings {
            msaa_samples,
            pcf_samples,
            clear_color: self.renderer.clear_color,
            shadow_mode: self.renderer.shadow_mode,
            shadow: self.shadow.snapshot(),
            tuning: ShadowTuningStore::new(self.shadow.simple, self.shadow.cascaded),
        }
    }
}

impl AppConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.applied_fields().is_empty()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.vsync.is_some() {
            fields.push("vsync");
        }
        if self.shadow_mode.is_some() {
            fields.push("shadow_mode");
        }
        if self.shadow_resolution.is_some() {
            fields.push("shadow_resolution");
        }
        fields
    }
}
