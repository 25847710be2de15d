//! Content hashing used to bind an approval token to a specific work item.

/// A 32-byte blake3 content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash arbitrary bytes.
    #[must_use]
    pub fn hash(data: &[u8]) -> Self {
        ContentHash(*blake3::hash(data).as_bytes())
    }

    /// Hash a work item's id + body, the canonical binding for approval tokens.
    #[must_use]
    pub fn of_work_item(id: &str, body: &str) -> Self {
        let mut buf = Vec::with_capacity(id.len() + body.len() + 1);
        buf.extend_from_slice(id.as_bytes());
        buf.push(0);
        buf.extend_from_slice(body.as_bytes());
        Self::hash(&buf)
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(self) -> String {
        hex_encode(&self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_hash() {
        assert_eq!(ContentHash::hash(b"abc"), ContentHash::hash(b"abc"));
    }

    #[test]
    fn different_work_items_differ() {
        let a = ContentHash::of_work_item("w1", "body");
        let b = ContentHash::of_work_item("w2", "body");
        assert_ne!(a, b);
    }
}
