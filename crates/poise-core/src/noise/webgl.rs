//! WebGL parameter spoofing. `readPixels` output goes through
//! [`noise_pixels`](super::canvas::noise_pixels) like canvas read-back.

/// `WEBGL_debug_renderer_info.UNMASKED_VENDOR_WEBGL`
pub const UNMASKED_VENDOR_WEBGL: u32 = 0x9245;
/// `WEBGL_debug_renderer_info.UNMASKED_RENDERER_WEBGL`
pub const UNMASKED_RENDERER_WEBGL: u32 = 0x9246;

pub const GENERIC_VENDOR: &str = "Google Inc.";
pub const GENERIC_RENDERER: &str = "ANGLE (Intel, ANGLE)";

/// Fixed answer for hardware-identifying parameters, `None` for the rest.
pub fn spoof_parameter(pname: u32) -> Option<&'static str> {
    match pname {
        UNMASKED_VENDOR_WEBGL => Some(GENERIC_VENDOR),
        UNMASKED_RENDERER_WEBGL => Some(GENERIC_RENDERER),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmasked_constants() {
        assert_eq!(UNMASKED_VENDOR_WEBGL, 37445);
        assert_eq!(UNMASKED_RENDERER_WEBGL, 37446);
        assert_eq!(spoof_parameter(37445), Some("Google Inc."));
        assert_eq!(spoof_parameter(37446), Some("ANGLE (Intel, ANGLE)"));
        // GL_VERSION passes through
        assert_eq!(spoof_parameter(0x1F02), None);
    }
}
