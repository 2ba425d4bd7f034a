//! Account backed by a private key held in configuration.

use crate::{AccountError, AccountInterface};
use alloy_primitives::Address;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use bridge_types::{
	with_0x_prefix, without_0x_prefix, ConfigSchema, Field, FieldType, Schema, SecretString,
	ValidationError,
};

pub struct LocalWallet {
	signer: PrivateKeySigner,
	private_key: SecretString,
}

impl LocalWallet {
	pub fn new(private_key: SecretString) -> Result<Self, AccountError> {
		let signer: PrivateKeySigner = private_key.with_exposed(|key| {
			without_0x_prefix(key)
				.parse()
				.map_err(|e| AccountError::InvalidKey(format!("{}", e)))
		})?;
		let private_key = private_key.with_exposed(|key| SecretString::new(with_0x_prefix(key)));
		Ok(Self {
			signer,
			private_key,
		})
	}
}

pub struct LocalWalletSchema;

impl LocalWalletSchema {
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		LocalWalletSchema.validate(config)
	}
}

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap_or_default();
					let hex = without_0x_prefix(key);
					if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
						return Err("private_key must be 32 bytes of hex".to_string());
					}
					Ok(())
				}),
			],
			vec![],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	fn get_private_key(&self) -> SecretString {
		self.private_key.clone()
	}
}

/// Builds a [`LocalWallet`] from its `private_key` table entry.
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema::validate_config(config)
		.map_err(|e| AccountError::InvalidKey(format!("Invalid configuration: {}", e)))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".to_string()))?;

	Ok(Box::new(LocalWallet::new(SecretString::from(private_key))?))
}

pub struct Registry;

impl bridge_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl crate::AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::AccountService;

	// Well-known development key.
	const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	#[tokio::test]
	async fn test_local_wallet_address() {
		let config: toml::Value = toml::from_str(&format!("private_key = \"{}\"", DEV_KEY)).unwrap();
		let service = AccountService::new(create_account(&config).unwrap());

		let address = service.get_address().await.unwrap();
		assert_eq!(
			address,
			"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
				.parse::<Address>()
				.unwrap()
		);
		assert_eq!(service.get_private_key().expose_secret(), DEV_KEY);
	}

	#[test]
	fn test_key_without_prefix_is_normalized() {
		let wallet = LocalWallet::new(SecretString::from(&DEV_KEY[2..])).unwrap();
		assert_eq!(wallet.get_private_key().expose_secret(), DEV_KEY);
	}

	#[test]
	fn test_invalid_key_rejected() {
		let config: toml::Value = toml::from_str("private_key = \"0x1234\"").unwrap();
		assert!(matches!(
			create_account(&config),
			Err(AccountError::InvalidKey(_))
		));
	}
}
