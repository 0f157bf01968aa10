//! Content-format classification.
//!
//! Encrypted content is self-identifying: envelope-format files ("catfiles")
//! carry a magic marker at offset 0. Files written under the deprecated
//! block format have no marker; they are recognized by their metadata
//! `encrypted` flag combined with the absence of the envelope magic.
//!
//! Classification never inspects more than [`PROBE_LEN`] leading bytes.

use cloakfs_core::types::FileMetadataRecord;

/// Marker the envelope codec writes at offset 0.
pub const ENVELOPE_MAGIC: &[u8] = b"CATFILE\x01";

/// Longest content prefix any classification is allowed to inspect.
pub const PROBE_LEN: usize = 64;

/// Is this content in the current envelope format?
pub fn is_envelope(head: &[u8]) -> bool {
    let bounded = &head[..head.len().min(PROBE_LEN)];
    bounded.starts_with(ENVELOPE_MAGIC)
}

/// Was this file written under the deprecated block format? True when the
/// metadata record flags it encrypted but the content lacks the envelope
/// marker.
pub fn is_legacy_encrypted_meta(record: Option<&FileMetadataRecord>, head: &[u8]) -> bool {
    match record {
        Some(record) => record.encrypted && !is_envelope(head),
        None => false,
    }
}
