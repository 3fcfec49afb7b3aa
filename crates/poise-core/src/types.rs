//! Core type definitions shared by the policy engine, the noise engine and
//! the rule compiler.

use serde::Serialize;

// =============================================================================
// Protection Mode
// =============================================================================

/// Protection intensity.
///
/// Controls noise amplitude on every fingerprint surface and whether active
/// payload rewriting is enabled (`moderate` and `strict`) or only passive
/// suppression (`baseline`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase", from = "serde_json::Value")]
pub enum Mode {
    Baseline,
    #[default]
    Moderate,
    Strict,
}

impl Mode {
    /// Normalize a user/legacy mode string. Unknown values map to `Moderate`.
    pub fn normalize(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" | "conservative" | "light" => Self::Baseline,
            "moderate" | "standard" | "balanced" | "aggressive" => Self::Moderate,
            "strict" | "maximum" | "max" | "active_warfare" | "warfare" => Self::Strict,
            _ => Self::Moderate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Moderate => "moderate",
            Self::Strict => "strict",
        }
    }

    /// Whether payload schemas rewrite requests in this mode.
    pub fn rewrites_payloads(self) -> bool {
        self >= Self::Moderate
    }
}

impl From<serde_json::Value> for Mode {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::normalize(&s),
            _ => Self::Moderate,
        }
    }
}

// =============================================================================
// Feature Modules
// =============================================================================

/// Independently togglable mutation surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    CanvasNoise,
    AudioNoise,
    WebglNoise,
    PerfQuantize,
    NavigatorClamp,
    StorageHygiene,
    BlockBeacons,
    StripHeadersLimited,
}

impl Module {
    pub const ALL: [Module; 8] = [
        Self::CanvasNoise,
        Self::AudioNoise,
        Self::WebglNoise,
        Self::PerfQuantize,
        Self::NavigatorClamp,
        Self::StorageHygiene,
        Self::BlockBeacons,
        Self::StripHeadersLimited,
    ];

    /// Key used in the persisted `modules` map.
    pub fn key(self) -> &'static str {
        match self {
            Self::CanvasNoise => "canvasNoise",
            Self::AudioNoise => "audioNoise",
            Self::WebglNoise => "webglNoise",
            Self::PerfQuantize => "perfQuantize",
            Self::NavigatorClamp => "navigatorClamp",
            Self::StorageHygiene => "storageHygiene",
            Self::BlockBeacons => "blockBeacons",
            Self::StripHeadersLimited => "stripHeadersLimited",
        }
    }

    pub fn flag(self) -> ModuleSet {
        match self {
            Self::CanvasNoise => ModuleSet::CANVAS_NOISE,
            Self::AudioNoise => ModuleSet::AUDIO_NOISE,
            Self::WebglNoise => ModuleSet::WEBGL_NOISE,
            Self::PerfQuantize => ModuleSet::PERF_QUANTIZE,
            Self::NavigatorClamp => ModuleSet::NAVIGATOR_CLAMP,
            Self::StorageHygiene => ModuleSet::STORAGE_HYGIENE,
            Self::BlockBeacons => ModuleSet::BLOCK_BEACONS,
            Self::StripHeadersLimited => ModuleSet::STRIP_HEADERS_LIMITED,
        }
    }
}

bitflags::bitflags! {
    /// Compact set of enabled modules, used on the mutation hot path.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModuleSet: u16 {
        const CANVAS_NOISE = 1 << 0;
        const AUDIO_NOISE = 1 << 1;
        const WEBGL_NOISE = 1 << 2;
        const PERF_QUANTIZE = 1 << 3;
        const NAVIGATOR_CLAMP = 1 << 4;
        const STORAGE_HYGIENE = 1 << 5;
        const BLOCK_BEACONS = 1 << 6;
        const STRIP_HEADERS_LIMITED = 1 << 7;

        /// Every module
        const ALL = 0xFF;
    }
}

impl ModuleSet {
    #[inline]
    pub fn has(self, module: Module) -> bool {
        self.contains(module.flag())
    }
}

// =============================================================================
// Noise Surfaces
// =============================================================================

/// Fingerprint surfaces that receive amplitude-scaled noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    /// 2D canvas read-back (`getImageData` / `toDataURL`)
    Canvas,
    /// WebGL `readPixels`
    WebGl,
    /// `AudioBuffer.getChannelData` float samples
    AudioSamples,
    /// `AnalyserNode` byte time/frequency data
    AnalyserBytes,
}

impl Surface {
    pub const ALL: [Surface; 4] = [Self::Canvas, Self::WebGl, Self::AudioSamples, Self::AnalyserBytes];

    /// Module that gates this surface.
    pub fn module(self) -> Module {
        match self {
            Self::Canvas => Module::CanvasNoise,
            Self::WebGl => Module::WebglNoise,
            Self::AudioSamples | Self::AnalyserBytes => Module::AudioNoise,
        }
    }
}

// =============================================================================
// Tabs
// =============================================================================

/// Browser tab identifier as reported by the host. Real tabs are positive;
/// `-1` marks requests that do not belong to a tab.
pub type TabId = i32;

/// Host sentinel for requests with no owning tab.
pub const TAB_ID_NONE: TabId = -1;
