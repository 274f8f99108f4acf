//! # Name Hash
//!
//! The engine identifies field names, request verbs, and sender ids by a
//! 32-bit hash rather than by string: CRC-32 (IEEE polynomial) computed
//! over the ASCII-lowercased input. Both ends must agree byte-for-byte,
//! so the lowercasing is ASCII-only, exactly as the engine does it.

/// Hash a name the way the engine's reflection system does.
///
/// Case-insensitive for ASCII: `name_hash("Element") == name_hash("element")`.
pub fn name_hash(name: &str) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for byte in name.bytes() {
        hasher.update(&[byte.to_ascii_lowercase()]);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_check_value() {
        // The standard CRC-32 check input; digits are unaffected by
        // lowercasing so this pins the polynomial and reflection choice.
        assert_eq!(name_hash("123456789"), 0xCBF4_3926);
    }

    #[test]
    fn ascii_case_insensitive() {
        assert_eq!(name_hash("Element"), name_hash("element"));
        assert_eq!(name_hash("AttachDebugger"), name_hash("attachdebugger"));
    }

    #[test]
    fn distinct_names_distinct_hashes() {
        assert_ne!(name_hash("element"), name_hash("elements"));
        assert_ne!(name_hash("moduleName"), name_hash("line"));
    }
}
