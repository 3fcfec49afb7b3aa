//! Navigator, screen and connection values exposed to the page.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::Mode;
use crate::url::extract_origin;

/// One `userAgentData.brands` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Brand {
    pub brand: &'static str,
    pub version: &'static str,
}

pub const GENERIC_BRANDS: &[Brand] = &[
    Brand { brand: "Chromium", version: "124" },
    Brand { brand: "Not.A/Brand", version: "99" },
];

/// `navigator.connection` replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub effective_type: &'static str,
    pub rtt: u32,
    pub downlink: u32,
    pub save_data: bool,
}

impl ConnectionInfo {
    /// Stricter modes report a slower, data-saving link.
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Baseline => Self { effective_type: "4g", rtt: 70, downlink: 50, save_data: false },
            Mode::Moderate => Self { effective_type: "3g", rtt: 200, downlink: 5, save_data: false },
            Mode::Strict => Self { effective_type: "2g", rtt: 800, downlink: 1, save_data: true },
        }
    }
}

/// Result of `getHighEntropyValues(hints)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HighEntropyValues(pub BTreeMap<String, String>);

impl HighEntropyValues {
    /// Fixed x86-64 Windows values; any other requested hint is empty.
    pub fn for_hints<S: AsRef<str>>(hints: &[S]) -> Self {
        let mut out: BTreeMap<String, String> = [
            ("architecture", "x86"),
            ("bitness", "64"),
            ("platform", "Windows"),
            ("model", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for hint in hints {
            out.entry(hint.as_ref().to_string()).or_default();
        }
        Self(out)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Generic navigator identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatorProfile {
    pub hardware_concurrency: u32,
    pub device_memory: u32,
    pub platform: &'static str,
    pub language: &'static str,
    pub languages: &'static [&'static str],
    pub vendor: &'static str,
    /// Always empty
    pub plugins: Vec<String>,
    /// Always empty
    pub mime_types: Vec<String>,
    pub mobile: bool,
    pub brands: &'static [Brand],
    pub connection: ConnectionInfo,
}

impl NavigatorProfile {
    pub fn for_mode(mode: Mode) -> Self {
        Self {
            hardware_concurrency: 4,
            device_memory: 4,
            platform: "Win32",
            language: "en-US",
            languages: &["en-US", "en"],
            vendor: "Google Inc.",
            plugins: Vec::new(),
            mime_types: Vec::new(),
            mobile: false,
            brands: GENERIC_BRANDS,
            connection: ConnectionInfo::for_mode(mode),
        }
    }
}

// =============================================================================
// Screen
// =============================================================================

/// Screen metrics as reported to the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenMetrics {
    pub width: u32,
    pub height: u32,
    pub avail_width: u32,
    pub avail_height: u32,
    pub color_depth: u32,
    pub pixel_depth: u32,
    pub device_pixel_ratio: f64,
}

/// Pixel grid the screen dimensions are floored to.
pub fn screen_quantum(mode: Mode) -> u32 {
    if mode == Mode::Strict {
        32
    } else {
        16
    }
}

impl ScreenMetrics {
    /// Bucket dimensions and force DPR 1 and 24-bit depth.
    pub fn clamp(self, mode: Mode) -> Self {
        let q = screen_quantum(mode);
        let floor = |v: u32| v / q * q;
        Self {
            width: floor(self.width),
            height: floor(self.height),
            avail_width: floor(self.avail_width),
            avail_height: floor(self.avail_height),
            color_depth: 24,
            pixel_depth: 24,
            device_pixel_ratio: 1.0,
        }
    }
}

/// `document.referrer`: empty in strict mode, origin-only otherwise.
pub fn neutral_referrer(mode: Mode, real: &str) -> String {
    if mode == Mode::Strict || real.is_empty() {
        return String::new();
    }
    extract_origin(real).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_by_mode() {
        assert_eq!(ConnectionInfo::for_mode(Mode::Baseline).effective_type, "4g");
        let strict = ConnectionInfo::for_mode(Mode::Strict);
        assert_eq!((strict.rtt, strict.downlink, strict.save_data), (800, 1, true));
        let v = serde_json::to_value(ConnectionInfo::for_mode(Mode::Moderate)).unwrap();
        assert_eq!(v["effectiveType"], "3g");
        assert_eq!(v["saveData"], false);
    }

    #[test]
    fn test_high_entropy_values() {
        let v = HighEntropyValues::for_hints(&["platform", "uaFullVersion"]);
        assert_eq!(v.get("platform"), Some("Windows"));
        assert_eq!(v.get("architecture"), Some("x86"));
        assert_eq!(v.get("uaFullVersion"), Some(""));
        assert_eq!(v.get("wow64"), None);
    }

    #[test]
    fn test_navigator_profile_is_generic() {
        let p = NavigatorProfile::for_mode(Mode::Moderate);
        assert_eq!(p.hardware_concurrency, 4);
        assert!(p.plugins.is_empty() && p.mime_types.is_empty());
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["brands"][0]["brand"], "Chromium");
        assert_eq!(v["languages"], serde_json::json!(["en-US", "en"]));
    }

    #[test]
    fn test_screen_clamp() {
        let real = ScreenMetrics {
            width: 2561,
            height: 1439,
            avail_width: 2561,
            avail_height: 1399,
            color_depth: 30,
            pixel_depth: 30,
            device_pixel_ratio: 1.25,
        };
        let m = real.clamp(Mode::Moderate);
        assert_eq!((m.width, m.height, m.avail_height), (2560, 1424, 1392));
        assert_eq!(m.device_pixel_ratio, 1.0);
        assert_eq!(m.color_depth, 24);
        let s = real.clamp(Mode::Strict);
        assert_eq!((s.width, s.height), (2560, 1408));
    }

    #[test]
    fn test_referrer() {
        let r = "https://news.example.com/article?id=3";
        assert_eq!(neutral_referrer(Mode::Strict, r), "");
        assert_eq!(neutral_referrer(Mode::Moderate, r), "https://news.example.com");
        assert_eq!(neutral_referrer(Mode::Baseline, ""), "");
        assert_eq!(neutral_referrer(Mode::Baseline, "not a url"), "");
    }
}
