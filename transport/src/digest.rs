//! Content digest used by `FILE` requests (§3: "`digest` MUST match `content`").

use md5::Digest;

/// Lowercase hex digest of `content`, matching the original implementation's
/// `hashlib.md5` usage (`original_source/pyremotedev/request.py`).
#[must_use]
pub fn hex_digest(content: &[u8]) -> String {
    let mut hasher = md5::Md5::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_literal_scenario_from_spec() {
        // end-to-end scenario 1: content "hi" -> digest 49f68a5c...
        assert_eq!(hex_digest(b"hi"), "49f68a5c8493ec2c0bf489821c21fc3b");
    }
}
