//! Order-insensitive layout fingerprints.
//!
//! The fingerprint identifies the unordered set of eight labels, so the
//! two row/column orientations of the same octet collapse to one store
//! row. Labels are sorted, joined with a delimiter that cannot appear in
//! a label, and hashed; 96 bits of SHA-256 are kept, which is plenty of
//! headroom for corpus-scale layout counts.

use sha2::{Digest, Sha256};

/// Joins the sorted labels before hashing. Vertical bar is reserved and
/// never appears in label text.
pub const DELIMITER: char = '|';

/// Hex characters kept from the digest (96 bits).
const FINGERPRINT_HEX_LEN: usize = 24;

/// Fingerprint of an eight-label layout, independent of row/column order
/// and orientation.
pub fn fingerprint<S: AsRef<str>>(labels: &[S]) -> String {
    let mut sorted: Vec<&str> = labels.iter().map(|s| s.as_ref()).collect();
    sorted.sort_unstable();
    let joined = sorted.join(&DELIMITER.to_string());
    let digest = Sha256::digest(joined.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(FINGERPRINT_HEX_LEN);
    hex
}
