//! String hashes used to seed the noise generators.
//!
//! Both hashes are non-cryptographic on purpose: the seed has to be a pure
//! function of the origin string, not a secret.

const FNV_OFFSET_BASIS: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

/// FNV-1a 32-bit over the UTF-16 code units of `s`.
///
/// The extension shell hashes JavaScript strings, so we walk UTF-16 units and
/// fold each one in whole. For ASCII input this is identical to hashing bytes.
#[inline]
pub fn fnv1a_32(s: &str) -> u32 {
    let mut h = FNV_OFFSET_BASIS;
    for unit in s.encode_utf16() {
        h ^= unit as u32;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// First output of the xmur3 string mixer.
///
/// Used for keyed seeds (`key::origin`), where longer inputs benefit from the
/// stronger avalanche than FNV gives.
pub fn xmur3_32(s: &str) -> u32 {
    let units: Vec<u16> = s.encode_utf16().collect();

    let mut h: u32 = 1779033703 ^ units.len() as u32;
    for unit in units {
        h = (h ^ unit as u32).wrapping_mul(3432918353);
        h = h.rotate_left(13);
    }

    h = (h ^ (h >> 16)).wrapping_mul(2246822507);
    h = (h ^ (h >> 13)).wrapping_mul(3266489909);
    h ^ (h >> 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_known_vectors() {
        assert_eq!(fnv1a_32(""), 0x811c9dc5);
        assert_eq!(fnv1a_32("a"), 0xe40c292c);
        assert_eq!(fnv1a_32("foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_fnv1a_consistent() {
        assert_eq!(fnv1a_32("example.com::privateness"), fnv1a_32("example.com::privateness"));
    }

    #[test]
    fn test_fnv1a_different_strings() {
        assert_ne!(fnv1a_32("example.com"), fnv1a_32("example.org"));
    }

    #[test]
    fn test_xmur3_consistent() {
        let h1 = xmur3_32("key::https://example.com");
        let h2 = xmur3_32("key::https://example.com");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_xmur3_different_strings() {
        assert_ne!(xmur3_32("a::https://a.test"), xmur3_32("a::https://b.test"));
    }

    #[test]
    fn test_xmur3_empty_string() {
        let h = xmur3_32("");
        assert_eq!(h, xmur3_32(""));
    }
}
