use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Square shadow-map sizes offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum ShadowResolution {
    R256,
    R512,
    R1024,
    #[default]
    R2048,
    R4096,
    R8192,
}

impl ShadowResolution {
    pub const ALL: [ShadowResolution; 6] = [
        ShadowResolution::R256,
        ShadowResolution::R512,
        ShadowResolution::R1024,
        ShadowResolution::R2048,
        ShadowResolution::R4096,
        ShadowResolution::R8192,
    ];

    pub fn pixels(self) -> u32 {
        match self {
            ShadowResolution::R256 => 256,
            ShadowResolution::R512 => 512,
            ShadowResolution::R1024 => 1024,
            ShadowResolution::R2048 => 2048,
            ShadowResolution::R4096 => 4096,
            ShadowResolution::R8192 => 8192,
        }
    }

    pub fn from_pixels(pixels: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|resolution| resolution.pixels() == pixels)
    }

    /// Next size up, wrapping from the largest back to the smallest.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|r| *r == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl TryFrom<u32> for ShadowResolution {
    type Error = String;

    fn try_from(pixels: u32) -> Result<Self, Self::Error> {
        Self::from_pixels(pixels)
            .ok_or_else(|| format!("unsupported shadow resolution {pixels}; expected 256..8192 power of two"))
    }
}

impl From<ShadowResolution> for u32 {
    fn from(resolution: ShadowResolution) -> Self {
        resolution.pixels()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShadowMode {
    #[default]
    Simple,
    Cascaded,
}

impl ShadowMode {
    pub fn label(self) -> &'static str {
        match self {
            ShadowMode::Simple => "simple",
            ShadowMode::Cascaded => "cascaded",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ShadowMode::Simple => ShadowMode::Cascaded,
            ShadowMode::Cascaded => ShadowMode::Simple,
        }
    }
}

/// Settings every shadow technique exposes so a replacement can start where the old one left off.
pub trait ShadowSettings {
    fn is_culling_backfaces(&self) -> bool;
    fn resolution(&self) -> ShadowResolution;
    fn is_following_camera(&self) -> bool;
    /// Fraction of the camera depth range, in `[0, 1]`, that receives shadows.
    fn shadow_depth_percentage(&self) -> f32;

    fn snapshot(&self) -> ShadowSettingsSnapshot {
        ShadowSettingsSnapshot {
            backface_culling: self.is_culling_backfaces(),
            resolution: self.resolution(),
            follow_camera: self.is_following_camera(),
            depth_percentage: self.shadow_depth_percentage(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowSettingsSnapshot {
    pub backface_culling: bool,
    pub resolution: ShadowResolution,
    pub follow_camera: bool,
    pub depth_percentage: f32,
}

impl Default for ShadowSettingsSnapshot {
    fn default() -> Self {
        Self {
            backface_culling: true,
            resolution: ShadowResolution::default(),
            follow_camera: true,
            depth_percentage: 1.0,
        }
    }
}

impl ShadowSettings for ShadowSettingsSnapshot {
    fn is_culling_backfaces(&self) -> bool {
        self.backface_culling
    }

    fn resolution(&self) -> ShadowResolution {
        self.resolution
    }

    fn is_following_camera(&self) -> bool {
        self.follow_camera
    }

    fn shadow_depth_percentage(&self) -> f32 {
        self.depth_percentage
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimpleShadowTuning {
    #[serde(default = "SimpleShadowTuning::default_min_bias")]
    pub min_bias: f32,
    #[serde(default = "SimpleShadowTuning::default_max_bias")]
    pub max_bias: f32,
    /// Light-space depth padding factor applied to the fitted box.
    #[serde(default = "SimpleShadowTuning::default_z_mult")]
    pub z_mult: f32,
}

impl SimpleShadowTuning {
    const fn default_min_bias() -> f32 {
        0.0005
    }

    const fn default_max_bias() -> f32 {
        0.001
    }

    const fn default_z_mult() -> f32 {
        3.5
    }
}

impl Default for SimpleShadowTuning {
    fn default() -> Self {
        Self {
            min_bias: Self::default_min_bias(),
            max_bias: Self::default_max_bias(),
            z_mult: Self::default_z_mult(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CascadedShadowTuning {
    #[serde(default = "CascadedShadowTuning::default_min_bias")]
    pub min_bias: f32,
    #[serde(default = "CascadedShadowTuning::default_max_bias")]
    pub max_bias: f32,
    #[serde(default = "CascadedShadowTuning::default_z_mult")]
    pub z_mult: f32,
    /// Power-law exponent of the split scheme; values above one thin out the near cascades.
    #[serde(default = "CascadedShadowTuning::default_assignment_exponent")]
    pub assignment_exponent: f32,
}

impl CascadedShadowTuning {
    const fn default_min_bias() -> f32 {
        0.0005
    }

    const fn default_max_bias() -> f32 {
        0.001
    }

    const fn default_z_mult() -> f32 {
        10.0
    }

    const fn default_assignment_exponent() -> f32 {
        2.5
    }
}

impl Default for CascadedShadowTuning {
    fn default() -> Self {
        Self {
            min_bias: Self::default_min_bias(),
            max_bias: Self::default_max_bias(),
            z_mult: Self::default_z_mult(),
            assignment_exponent: Self::default_assignment_exponent(),
        }
    }
}

/// Tuning that outlives individual shadow providers for the lifetime of the renderer.
///
/// The renderer stores a provider's tuning when it is torn down and hands it to the next
/// provider of the same kind, so toggling modes restores earlier adjustments.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShadowTuningStore {
    simple: SimpleShadowTuning,
    cascaded: CascadedShadowTuning,
}

impl ShadowTuningStore {
    pub fn new(simple: SimpleShadowTuning, cascaded: CascadedShadowTuning) -> Self {
        Self { simple, cascaded }
    }

    pub fn simple(&self) -> SimpleShadowTuning {
        self.simple
    }

    pub fn cascaded(&self) -> CascadedShadowTuning {
        self.cascaded
    }

    pub fn store_simple(&mut self, tuning: SimpleShadowTuning) {
        self.simple = tuning;
    }

    pub fn store_cascaded(&mut self, tuning: CascadedShadowTuning) {
        self.cascaded = tuning;
    }
}

/// Receives the new size after a shadow map has been recreated.
///
/// Called synchronously once the new texture and view exist. Implementations must not
/// change the resolution again from inside the callback.
pub trait ResolutionChangeListener {
    fn on_resolution_changed(&self, resolution: ShadowResolution);
}

#[derive(Default)]
pub struct ResolutionListeners {
    listeners: Vec<Arc<dyn ResolutionChangeListener>>,
}

impl ResolutionListeners {
    pub fn register(&mut self, listener: Arc<dyn ResolutionChangeListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Notifies in registration order.
    pub fn notify(&self, resolution: ShadowResolution) {
        for listener in &self.listeners {
            listener.on_resolution_changed(resolution);
        }
    }
}

impl std::fmt::Debug for ResolutionListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionListeners").field("count", &self.listeners.len()).finish()
    }
}

/// Listener that records the most recent resolution until it is taken.
#[derive(Debug, Default)]
pub struct PendingResolution {
    pixels: AtomicU32,
}

impl PendingResolution {
    pub fn take(&self) -> Option<ShadowResolution> {
        ShadowResolution::from_pixels(self.pixels.swap(0, Ordering::AcqRel))
    }

    /// Forgets a recorded change that a full rebind has already covered.
    pub fn clear(&self) {
        self.pixels.store(0, Ordering::Release);
    }
}

impl ResolutionChangeListener for PendingResolution {
    fn on_resolution_changed(&self, resolution: ShadowResolution) {
        self.pixels.store(resolution.pixels(), Ordering::Release);
    }
}
