//! Typed values in the custodian network's wire format.
//!
//! Every value sent to the network is a `{ t, v }` pair: a type definition and
//! a value of that type. The same pair has two encodings. The JSON form goes
//! over RPC. The binary form feeds the transaction hash. Integers are
//! big-endian, strings and dynamic bytes carry a u32 length prefix, and
//! fixed-size byte arrays are written raw.

use crate::utils::{from_url_base64, to_url_base64};
use alloy_primitives::U256;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackError {
	#[error("Unknown pack type: {0}")]
	UnknownType(String),
	#[error("Value does not match type {expected}: {found}")]
	TypeMismatch { expected: String, found: String },
	#[error("Integer {value} does not fit in {bits} bits")]
	Overflow { value: String, bits: usize },
	#[error("Expected {expected} bytes, got {found}")]
	InvalidLength { expected: usize, found: usize },
	#[error("Missing struct field '{0}'")]
	MissingField(String),
	#[error("Invalid base64 value: {0}")]
	InvalidBase64(String),
}

/// Pack type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackType {
	Nil,
	Bool,
	U8,
	U16,
	U32,
	U64,
	U128,
	U256,
	Str,
	Bytes,
	Bytes32,
	Bytes65,
	Struct(Vec<(String, PackType)>),
	List(Box<PackType>),
}

/// Pack value. Unsigned integers of every width share `Uint`; the type
/// decides how many bytes are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackValue {
	Nil,
	Bool(bool),
	Uint(U256),
	Str(String),
	Bytes(Vec<u8>),
	Struct(BTreeMap<String, PackValue>),
	List(Vec<PackValue>),
}

impl PackType {
	/// Numeric kind identifier written in front of every type encoding.
	pub fn kind_id(&self) -> u8 {
		match self {
			PackType::Nil => 0,
			PackType::Bool => 1,
			PackType::U8 => 2,
			PackType::U16 => 3,
			PackType::U32 => 4,
			PackType::U64 => 5,
			PackType::U128 => 6,
			PackType::U256 => 7,
			PackType::Str => 10,
			PackType::Bytes => 11,
			PackType::Bytes32 => 12,
			PackType::Bytes65 => 13,
			PackType::Struct(_) => 20,
			PackType::List(_) => 21,
		}
	}

	fn primitive_name(&self) -> Option<&'static str> {
		Some(match self {
			PackType::Nil => "nil",
			PackType::Bool => "bool",
			PackType::U8 => "u8",
			PackType::U16 => "u16",
			PackType::U32 => "u32",
			PackType::U64 => "u64",
			PackType::U128 => "u128",
			PackType::U256 => "u256",
			PackType::Str => "string",
			PackType::Bytes => "bytes",
			PackType::Bytes32 => "bytes32",
			PackType::Bytes65 => "bytes65",
			PackType::Struct(_) | PackType::List(_) => return None,
		})
	}

	fn uint_bits(&self) -> Option<usize> {
		match self {
			PackType::U8 => Some(8),
			PackType::U16 => Some(16),
			PackType::U32 => Some(32),
			PackType::U64 => Some(64),
			PackType::U128 => Some(128),
			PackType::U256 => Some(256),
			_ => None,
		}
	}

	/// Appends the binary encoding of this type definition.
	pub fn encode(&self, out: &mut Vec<u8>) {
		out.push(self.kind_id());
		match self {
			PackType::Struct(fields) => {
				out.extend_from_slice(&(fields.len() as u32).to_be_bytes());
				for (name, ty) in fields {
					encode_string(name, out);
					ty.encode(out);
				}
			},
			PackType::List(inner) => inner.encode(out),
			_ => {},
		}
	}

	/// JSON form of the type definition.
	pub fn to_json(&self) -> Value {
		match self {
			PackType::Struct(fields) => {
				let fields: Vec<Value> = fields
					.iter()
					.map(|(name, ty)| {
						let mut entry = Map::new();
						entry.insert(name.clone(), ty.to_json());
						Value::Object(entry)
					})
					.collect();
				json!({ "struct": fields })
			},
			PackType::List(inner) => json!({ "list": inner.to_json() }),
			primitive => Value::String(primitive.primitive_name().unwrap_or("nil").to_string()),
		}
	}

	/// Parses the JSON form of a type definition.
	pub fn from_json(value: &Value) -> Result<Self, PackError> {
		match value {
			Value::String(name) => Ok(match name.as_str() {
				"nil" => PackType::Nil,
				"bool" => PackType::Bool,
				"u8" => PackType::U8,
				"u16" => PackType::U16,
				"u32" => PackType::U32,
				"u64" => PackType::U64,
				"u128" => PackType::U128,
				"u256" => PackType::U256,
				"string" => PackType::Str,
				"bytes" => PackType::Bytes,
				"bytes32" => PackType::Bytes32,
				"bytes65" => PackType::Bytes65,
				other => return Err(PackError::UnknownType(other.to_string())),
			}),
			Value::Object(map) if map.len() == 1 => {
				if let Some(Value::Array(fields)) = map.get("struct") {
					let mut parsed = Vec::with_capacity(fields.len());
					for field in fields {
						let entry = field
							.as_object()
							.filter(|entry| entry.len() == 1)
							.ok_or_else(|| PackError::UnknownType(field.to_string()))?;
						for (name, ty) in entry {
							parsed.push((name.clone(), PackType::from_json(ty)?));
						}
					}
					Ok(PackType::Struct(parsed))
				} else if let Some(inner) = map.get("list") {
					Ok(PackType::List(Box::new(PackType::from_json(inner)?)))
				} else {
					Err(PackError::UnknownType(value.to_string()))
				}
			},
			other => Err(PackError::UnknownType(other.to_string())),
		}
	}
}

fn encode_string(value: &str, out: &mut Vec<u8>) {
	encode_with_length(value.as_bytes(), out);
}

fn encode_with_length(bytes: &[u8], out: &mut Vec<u8>) {
	out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
	out.extend_from_slice(bytes);
}

/// Length-prefixed UTF-8 string encoding.
pub fn marshal_string(value: &str) -> Vec<u8> {
	let mut out = Vec::with_capacity(4 + value.len());
	encode_string(value, &mut out);
	out
}

fn mismatch(ty: &PackType, value: &PackValue) -> PackError {
	PackError::TypeMismatch {
		expected: ty.to_json().to_string(),
		found: format!("{:?}", value),
	}
}

/// Appends the binary encoding of `value` interpreted as `ty`.
pub fn encode_value(ty: &PackType, value: &PackValue, out: &mut Vec<u8>) -> Result<(), PackError> {
	if let Some(bits) = ty.uint_bits() {
		let PackValue::Uint(n) = value else {
			return Err(mismatch(ty, value));
		};
		if n.bit_len() > bits {
			return Err(PackError::Overflow {
				value: n.to_string(),
				bits,
			});
		}
		let be = n.to_be_bytes::<32>();
		out.extend_from_slice(&be[32 - bits / 8..]);
		return Ok(());
	}

	match (ty, value) {
		(PackType::Nil, _) => {},
		(PackType::Bool, PackValue::Bool(b)) => out.push(u8::from(*b)),
		(PackType::Str, PackValue::Str(s)) => encode_string(s, out),
		(PackType::Bytes, PackValue::Bytes(b)) => encode_with_length(b, out),
		(PackType::Bytes32, PackValue::Bytes(b)) => write_fixed(b, 32, out)?,
		(PackType::Bytes65, PackValue::Bytes(b)) => write_fixed(b, 65, out)?,
		(PackType::Struct(fields), PackValue::Struct(values)) => {
			for (name, field_ty) in fields {
				let field = values
					.get(name)
					.ok_or_else(|| PackError::MissingField(name.clone()))?;
				encode_value(field_ty, field, out)?;
			}
		},
		(PackType::List(inner), PackValue::List(items)) => {
			for item in items {
				encode_value(inner, item, out)?;
			}
		},
		_ => return Err(mismatch(ty, value)),
	}
	Ok(())
}

fn write_fixed(bytes: &[u8], len: usize, out: &mut Vec<u8>) -> Result<(), PackError> {
	if bytes.len() != len {
		return Err(PackError::InvalidLength {
			expected: len,
			found: bytes.len(),
		});
	}
	out.extend_from_slice(bytes);
	Ok(())
}

/// JSON form of `value` interpreted as `ty`.
pub fn value_to_json(ty: &PackType, value: &PackValue) -> Result<Value, PackError> {
	Ok(match (ty, value) {
		(PackType::Nil, _) => Value::Null,
		(PackType::Bool, PackValue::Bool(b)) => Value::Bool(*b),
		(t, PackValue::Uint(n)) if t.uint_bits().is_some() => Value::String(n.to_string()),
		(PackType::Str, PackValue::Str(s)) => Value::String(s.clone()),
		(PackType::Bytes | PackType::Bytes32 | PackType::Bytes65, PackValue::Bytes(b)) => {
			Value::String(to_url_base64(b))
		},
		(PackType::Struct(fields), PackValue::Struct(values)) => {
			let mut map = Map::new();
			for (name, field_ty) in fields {
				let field = values
					.get(name)
					.ok_or_else(|| PackError::MissingField(name.clone()))?;
				map.insert(name.clone(), value_to_json(field_ty, field)?);
			}
			Value::Object(map)
		},
		(PackType::List(inner), PackValue::List(items)) => Value::Array(
			items
				.iter()
				.map(|item| value_to_json(inner, item))
				.collect::<Result<_, _>>()?,
		),
		_ => return Err(mismatch(ty, value)),
	})
}

/// Parses the JSON form of a value of type `ty`.
pub fn value_from_json(ty: &PackType, json: &Value) -> Result<PackValue, PackError> {
	let type_mismatch = || PackError::TypeMismatch {
		expected: ty.to_json().to_string(),
		found: json.to_string(),
	};

	if ty.uint_bits().is_some() {
		let n = match json {
			Value::String(s) => U256::from_str_radix(s, 10).map_err(|_| type_mismatch())?,
			Value::Number(n) => U256::from(n.as_u64().ok_or_else(type_mismatch)?),
			_ => return Err(type_mismatch()),
		};
		return Ok(PackValue::Uint(n));
	}

	Ok(match ty {
		PackType::Nil => PackValue::Nil,
		PackType::Bool => PackValue::Bool(json.as_bool().ok_or_else(type_mismatch)?),
		PackType::Str => PackValue::Str(json.as_str().ok_or_else(type_mismatch)?.to_string()),
		PackType::Bytes | PackType::Bytes32 | PackType::Bytes65 => {
			let encoded = json.as_str().ok_or_else(type_mismatch)?;
			PackValue::Bytes(
				from_url_base64(encoded)
					.map_err(|_| PackError::InvalidBase64(encoded.to_string()))?,
			)
		},
		PackType::Struct(fields) => {
			let object = json.as_object().ok_or_else(type_mismatch)?;
			let mut values = BTreeMap::new();
			for (name, field_ty) in fields {
				let field = object
					.get(name)
					.ok_or_else(|| PackError::MissingField(name.clone()))?;
				values.insert(name.clone(), value_from_json(field_ty, field)?);
			}
			PackValue::Struct(values)
		},
		PackType::List(inner) => PackValue::List(
			json.as_array()
				.ok_or_else(type_mismatch)?
				.iter()
				.map(|item| value_from_json(inner, item))
				.collect::<Result<_, _>>()?,
		),
		_ => return Err(type_mismatch()),
	})
}

/// A `{ t, v }` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedPackValue {
	pub t: PackType,
	pub v: PackValue,
}

impl TypedPackValue {
	pub fn new(t: PackType, v: PackValue) -> Self {
		Self { t, v }
	}

	/// Binary encoding: the type definition followed by the value.
	pub fn marshal(&self) -> Result<Vec<u8>, PackError> {
		let mut out = Vec::new();
		self.t.encode(&mut out);
		encode_value(&self.t, &self.v, &mut out)?;
		Ok(out)
	}

	pub fn to_json(&self) -> Result<Value, PackError> {
		Ok(json!({ "t": self.t.to_json(), "v": value_to_json(&self.t, &self.v)? }))
	}

	pub fn from_json(json: &Value) -> Result<Self, PackError> {
		let t = PackType::from_json(json.get("t").unwrap_or(&Value::Null))?;
		let v = value_from_json(&t, json.get("v").unwrap_or(&Value::Null))?;
		Ok(Self { t, v })
	}

	/// Looks up a field of a struct value.
	pub fn field(&self, name: &str) -> Option<&PackValue> {
		match &self.v {
			PackValue::Struct(values) => values.get(name),
			_ => None,
		}
	}
}

impl Serialize for TypedPackValue {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.to_json()
			.map_err(serde::ser::Error::custom)?
			.serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for TypedPackValue {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let json = Value::deserialize(deserializer)?;
		TypedPackValue::from_json(&json).map_err(D::Error::custom)
	}
}

impl PackValue {
	pub fn as_uint(&self) -> Option<U256> {
		match self {
			PackValue::Uint(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			PackValue::Bytes(b) => Some(b),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			PackValue::Str(s) => Some(s),
			_ => None,
		}
	}
}
