use crate::normalize::normalize_declaration_text;
use crate::types::Fingerprint;

/// Fingerprint of a declaration's raw text.
///
/// Hashes the normalized form, so whitespace-only edits keep the fingerprint
/// and any change to dependency lines or their order does not. File
/// modification times play no part.
pub fn fingerprint_declaration(text: &str) -> Fingerprint {
    let normalized = normalize_declaration_text(text);
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"declaration:v1\n");
    hasher.update(normalized.as_bytes());
    Fingerprint::new(hasher.finalize().to_hex().to_string())
}
