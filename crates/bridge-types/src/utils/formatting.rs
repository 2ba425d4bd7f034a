//! String formatting for log output and hex handling.

/// Shortens an identifier for log output: at most 8 characters followed by "..".
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Returns the hex string with a "0x" prefix, adding one if missing.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.starts_with("0x") || hex_str.starts_with("0X") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Strips a leading "0x" or "0X".
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("abcdefgh"), "abcdefgh");
		assert_eq!(truncate_id("abcdefghi"), "abcdefgh..");
		assert_eq!(truncate_id("0xd1c2b3a4e5f6"), "0xd1c2b3..");
	}

	#[test]
	fn test_prefix_helpers() {
		assert_eq!(with_0x_prefix("deadbeef"), "0xdeadbeef");
		assert_eq!(with_0x_prefix("0xdeadbeef"), "0xdeadbeef");
		assert_eq!(without_0x_prefix("0Xdeadbeef"), "deadbeef");
		assert_eq!(without_0x_prefix("deadbeef"), "deadbeef");
	}
}
