//! Lossless mapping between raw store keys and filesystem names.
//!
//! Keys that are already legal, printable names are shown as-is. Anything
//! else (empty keys, binary data, names containing `/`, `.` and `..`, or
//! names that would collide with the escape prefix) is shown as `@` followed
//! by the lowercase hex of the raw bytes.

use crate::common::{FsError, FsResult};

const ESCAPE: char = '@';

/// The key as a name, when it can be shown without escaping.
fn verbatim(raw: &[u8]) -> Option<&str> {
    let s = core::str::from_utf8(raw).ok()?;
    let legal = !s.is_empty()
        && s != "."
        && s != ".."
        && !s.starts_with(ESCAPE)
        && !s.chars().any(|c| c == '/' || c.is_control());
    legal.then_some(s)
}

/// Render a raw key as a filesystem name.
pub fn encode_key(raw: &[u8]) -> String {
    if let Some(name) = verbatim(raw) {
        name.to_string()
    } else {
        let mut name = String::with_capacity(1 + raw.len() * 2);
        name.push(ESCAPE);
        name.push_str(&hex::encode(raw));
        name
    }
}

/// Recover the raw key behind a filesystem name.
///
/// Only names produced by [`encode_key`] are accepted, so every raw key has
/// exactly one spelling.
pub fn decode_key(name: &str) -> FsResult<Vec<u8>> {
    if let Some(digits) = name.strip_prefix(ESCAPE) {
        if digits.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(FsError::InvalidName);
        }
        let raw = hex::decode(digits).map_err(|_| FsError::InvalidName)?;
        if verbatim(&raw).is_some() {
            return Err(FsError::InvalidName);
        }
        Ok(raw)
    } else if verbatim(name.as_bytes()).is_some() {
        Ok(name.as_bytes().to_vec())
    } else {
        Err(FsError::InvalidName)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(raw: &[u8]) {
        let name = encode_key(raw);
        assert!(!name.contains('/'), "{name:?} contains a separator");
        assert_ne!(name, ".");
        assert_ne!(name, "..");
        assert_eq!(decode_key(&name).unwrap(), raw, "via {name:?}");
    }

    #[test]
    fn round_trips() {
        round_trip(b"");
        round_trip(b"users");
        round_trip(b"a/b");
        round_trip(b"/");
        round_trip(b".");
        round_trip(b"..");
        round_trip(b"@home");
        round_trip(b"\0");
        round_trip(b"tab\there");
        round_trip(&[0xff; 16]);
        round_trip("grüße".as_bytes());
        for b in 0..=255u8 {
            round_trip(&[b]);
        }
    }

    #[test]
    fn plain_names_stay_readable() {
        assert_eq!(encode_key(b"users"), "users");
        assert_eq!(encode_key(b"a b.txt"), "a b.txt");
        assert_eq!(encode_key(b""), "@");
        assert_eq!(encode_key(b"a/b"), "@612f62");
        assert_eq!(encode_key(&[0xff, 0xfe]), "@fffe");
    }

    #[test]
    fn rejects_foreign_names() {
        for name in ["", ".", "..", "a/b", "@zz", "@6", "@FF", "@7573657273", "nul\0"] {
            assert_eq!(decode_key(name), Err(FsError::InvalidName), "{name:?}");
        }
    }
}
