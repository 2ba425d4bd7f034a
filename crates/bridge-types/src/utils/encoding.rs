//! URL-safe base64 and fixed-width byte helpers.
//!
//! Transaction identifiers and nonces travel between the client and the
//! network as unpadded URL-safe base64.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

/// Encodes bytes as unpadded URL-safe base64.
pub fn to_url_base64(bytes: impl AsRef<[u8]>) -> String {
	URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes URL-safe base64, accepting both padded and unpadded input.
pub fn from_url_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
	if input.ends_with('=') {
		URL_SAFE.decode(input)
	} else {
		URL_SAFE_NO_PAD.decode(input)
	}
}

/// Left-pads `bytes` with zeros to 32 bytes. Longer input keeps its last 32 bytes.
pub fn left_pad_32(bytes: &[u8]) -> [u8; 32] {
	let mut out = [0u8; 32];
	if bytes.len() >= 32 {
		out.copy_from_slice(&bytes[bytes.len() - 32..]);
	} else {
		out[32 - bytes.len()..].copy_from_slice(bytes);
	}
	out
}
