use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};

use crate::error::DocCmdError;

fn default_max_passes() -> usize {
    3
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Upper bound on scan and execute rounds per execution pass.
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
    /// Keep the markers of finished commands (with their status written back).
    #[serde(default)]
    pub debug: bool,
    /// Surround inserted text with insert marks until the next clean-up.
    #[serde(default = "default_true")]
    pub insert_marks: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_passes: default_max_passes(),
            debug: false,
            insert_marks: true,
        }
    }
}

/// A marker to create inside an inserted fragment, offsets relative to the fragment text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentMarker {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    #[serde(default)]
    pub markers: Vec<FragmentMarker>,
}

/// Everything commands draw on when they execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Text inserted by insertContent commands.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub fragments: BTreeMap<String, Fragment>,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// Fragment id to fragment id; an empty target drops the fragment.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl DocumentConfig {
    pub fn from_toml(content: &str) -> Result<DocumentConfig, DocCmdError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, DocCmdError> {
        Ok(toml::to_string(self)?)
    }

    /// Follows the override chain for a fragment id. `None` means the fragment is dropped.
    pub fn resolve_fragment_id<'a>(&'a self, id: &'a str) -> Result<Option<&'a str>, DocCmdError> {
        let mut current = id;
        let mut hops = 0;
        while let Some(target) = self.overrides.get(current) {
            if target.is_empty() {
                return Ok(None);
            }
            hops += 1;
            if hops > self.overrides.len() {
                return Err(DocCmdError::Config(format!(
                    "override cycle involving fragment '{id}'"
                )));
            }
            current = target;
        }
        Ok(Some(current))
    }
}

pub trait ConfigProvider: Send + Sync {
    fn get_config(&self) -> Result<DocumentConfig, DocCmdError>;
    fn set_config(&self, config: &DocumentConfig) -> Result<(), DocCmdError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_config(&self) -> Result<DocumentConfig, DocCmdError> {
        tracing::debug!("Attempting to read document config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using the default config.");
            return Ok(DocumentConfig::default());
        }
        let content = read_to_string(&self.path)?;
        DocumentConfig::from_toml(&content)
    }

    fn set_config(&self, config: &DocumentConfig) -> Result<(), DocCmdError> {
        tracing::debug!("Attempting to write document config to: {:?}", &self.path);
        write(&self.path, config.to_toml()?)?;
        Ok(())
    }
}

/// Holds the config in memory.
#[derive(Debug, Default)]
pub struct StaticConfigProvider {
    config: parking_lot::RwLock<DocumentConfig>,
}

impl StaticConfigProvider {
    pub fn new(config: DocumentConfig) -> Self {
        StaticConfigProvider {
            config: parking_lot::RwLock::new(config),
        }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn get_config(&self) -> Result<DocumentConfig, DocCmdError> {
        Ok(self.config.read().clone())
    }

    fn set_config(&self, config: &DocumentConfig) -> Result<(), DocCmdError> {
        *self.config.write() = config.clone();
        Ok(())
    }
}
