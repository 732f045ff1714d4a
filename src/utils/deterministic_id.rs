//! Deterministic channel id generation
//!
//! Channel ids must survive re-parsing the same document and process
//! restarts, because favorites and recently-watched lists persist them.
//! `DefaultHasher` is not stable across Rust releases, so ids are derived
//! from SHA-256 and formatted as UUIDs.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a deterministic UUID from ordered inputs
///
/// Inputs are separated by a newline before hashing, so `["ab", "c"]` and
/// `["a", "bc"]` produce different ids.
pub fn generate_deterministic_uuid(inputs: &[&str]) -> Uuid {
    let mut hasher = Sha256::new();
    for (index, input) in inputs.iter().enumerate() {
        if index > 0 {
            hasher.update(b"\n");
        }
        hasher.update(input.as_bytes());
    }
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Generate the id of a channel from its stream URL and display name
///
/// `occurrence` is the number of earlier entries in the same document with
/// the identical `(url, name)` pair. The first occurrence hashes only the
/// pair, repeats also hash their index so ids stay unique per playlist.
///
/// ```rust
/// use m3u_viewer::utils::deterministic_id::generate_channel_id;
///
/// let a = generate_channel_id("http://x/a.m3u8", "Channel A", 0);
/// let b = generate_channel_id("http://x/a.m3u8", "Channel A", 0);
/// assert_eq!(a, b);
/// ```
pub fn generate_channel_id(url: &str, name: &str, occurrence: usize) -> String {
    let uuid = if occurrence == 0 {
        generate_deterministic_uuid(&[url, name])
    } else {
        let occurrence = occurrence.to_string();
        generate_deterministic_uuid(&[url, name, &occurrence])
    };
    uuid.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_uuid_consistency() {
        let stream_url = "http://example.com/stream.m3u8";
        let channel_name = "Test Channel";

        let id1 = generate_channel_id(stream_url, channel_name, 0);
        let id2 = generate_channel_id(stream_url, channel_name, 0);

        assert_eq!(id1, id2);
        assert!(Uuid::parse_str(&id1).is_ok());
    }

    #[test]
    fn test_different_inputs_different_ids() {
        let id1 = generate_channel_id("http://example.com/stream1.m3u8", "Channel 1", 0);
        let id2 = generate_channel_id("http://example.com/stream2.m3u8", "Channel 1", 0);
        let id3 = generate_channel_id("http://example.com/stream1.m3u8", "Channel 2", 0);

        assert_ne!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_separator_prevents_concatenation_collisions() {
        assert_ne!(
            generate_deterministic_uuid(&["ab", "c"]),
            generate_deterministic_uuid(&["a", "bc"])
        );
    }

    #[test]
    fn test_repeated_entries_get_distinct_ids() {
        let first = generate_channel_id("http://x/a", "A", 0);
        let second = generate_channel_id("http://x/a", "A", 1);
        let third = generate_channel_id("http://x/a", "A", 2);

        assert_ne!(first, second);
        assert_ne!(second, third);
    }
}
