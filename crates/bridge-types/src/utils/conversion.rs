//! Conversion between whole-unit decimal strings and smallest-unit integers.

use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
	#[error("Invalid amount '{0}'")]
	InvalidAmount(String),
	#[error("Amount '{amount}' has more than {decimals} decimal places")]
	TooPrecise { amount: String, decimals: u8 },
}

/// Parses an amount given in whole units ("1.5") into smallest units.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, ConversionError> {
	let amount = amount.trim();
	let (int_part, frac_part) = amount.split_once('.').unwrap_or((amount, ""));
	let frac_part = frac_part.trim_end_matches('0');

	if int_part.is_empty() && frac_part.is_empty() {
		return Err(ConversionError::InvalidAmount(amount.to_string()));
	}
	if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
		return Err(ConversionError::InvalidAmount(amount.to_string()));
	}
	if frac_part.len() > decimals as usize {
		return Err(ConversionError::TooPrecise {
			amount: amount.to_string(),
			decimals,
		});
	}

	let digits = format!(
		"{}{}{}",
		int_part,
		frac_part,
		"0".repeat(decimals as usize - frac_part.len())
	);
	let digits = digits.trim_start_matches('0');
	if digits.is_empty() {
		return Ok(U256::ZERO);
	}
	U256::from_str_radix(digits, 10).map_err(|_| ConversionError::InvalidAmount(amount.to_string()))
}

/// Formats a smallest-unit amount in whole units, trimming trailing zeros.
pub fn format_units(amount: U256, decimals: u8) -> String {
	let raw = amount.to_string();
	if decimals == 0 {
		return raw;
	}
	let places = decimals as usize;
	let padded = format!("{:0>width$}", raw, width = places + 1);
	let (int_part, frac_part) = padded.split_at(padded.len() - places);
	let frac_part = frac_part.trim_end_matches('0');
	if frac_part.is_empty() {
		int_part.to_string()
	} else {
		format!("{}.{}", int_part, frac_part)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_units() {
		assert_eq!(parse_units("1.5", 8).unwrap(), U256::from(150_000_000u64));
		assert_eq!(parse_units("0.00000001", 8).unwrap(), U256::from(1u64));
		assert_eq!(parse_units("42", 0).unwrap(), U256::from(42u64));
		assert_eq!(parse_units("0", 18).unwrap(), U256::ZERO);
	}

	#[test]
	fn test_parse_units_rejects_bad_input() {
		assert!(matches!(
			parse_units("0.000000001", 8),
			Err(ConversionError::TooPrecise { .. })
		));
		assert!(matches!(
			parse_units("1e5", 8),
			Err(ConversionError::InvalidAmount(_))
		));
		assert!(parse_units(".", 8).is_err());
	}

	#[test]
	fn test_format_units() {
		assert_eq!(format_units(U256::from(150_000_000u64), 8), "1.5");
		assert_eq!(format_units(U256::from(1u64), 8), "0.00000001");
		assert_eq!(format_units(U256::from(100_000u64), 0), "100000");
	}
}
