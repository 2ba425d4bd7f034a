//! Helpers for identifiers, amounts and byte encodings.

pub mod conversion;
pub mod encoding;
pub mod formatting;

pub use conversion::{format_units, parse_units, ConversionError};
pub use encoding::{from_url_base64, left_pad_32, to_url_base64};
pub use formatting::{truncate_id, with_0x_prefix, without_0x_prefix};
