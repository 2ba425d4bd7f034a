//! Multi-file configuration loading.
//!
//! A file may list other files under `include`. Included files are resolved
//! relative to the directory of the top-level file, and each top-level
//! section may appear in only one of the files.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a configuration file together with its includes.
pub struct ConfigLoader {
	base_path: PathBuf,
	/// Canonical paths already read, for cycle detection.
	visited: HashSet<PathBuf>,
	/// Section name to the file that defined it.
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			visited: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Reads `config_path`, merges its includes and validates the result.
	pub async fn load_config(&mut self, config_path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let main_path = self.resolve_path(config_path)?;
		let main_content = self.read_resolved(&main_path).await?;
		let mut root: toml::Value = toml::from_str(&main_content)?;

		let includes = extract_includes(&root)?;
		if includes.is_empty() {
			return main_content.parse();
		}

		let Some(table) = root.as_table_mut() else {
			return Err(ConfigError::Parse("Configuration root must be a table".into()));
		};
		table.remove("include");
		for key in table.keys() {
			self.section_sources.insert(key.clone(), main_path.clone());
		}

		for include in includes {
			let include_path = self.resolve_path(&include)?;
			let content = self.read_resolved(&include_path).await?;
			let included: toml::Value = toml::from_str(&content)?;
			let Some(included) = included.as_table() else {
				continue;
			};
			for (key, value) in included {
				if let Some(existing) = self.section_sources.get(key) {
					return Err(ConfigError::Validation(format!(
						"Duplicate section '{}' found in {} and {}. \
						Each top-level section must be defined in one file.",
						key,
						existing.display(),
						include_path.display()
					)));
				}
				self.section_sources
					.insert(key.clone(), include_path.clone());
				table.insert(key.clone(), value.clone());
			}
		}

		let combined = toml::to_string(&root).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		combined.parse()
	}

	/// Reads a file once and substitutes environment variables.
	async fn read_resolved(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		resolve_env_vars(&content)
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};
		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

fn extract_includes(root: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match root.get("include") {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.iter()
			.map(|item| {
				item.as_str().map(PathBuf::from).ok_or_else(|| {
					ConfigError::Validation("Include array must contain only strings".into())
				})
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}
