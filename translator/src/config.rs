use crate::payload::PayloadFormat;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct MappingsConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./pms")
}

impl Default for MappingsConfig {
    fn default() -> Self {
        MappingsConfig {
            base_dir: default_base_dir(),
        }
    }
}

/// A mapping-driven plugin declared in configuration.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct PluginConfig {
    pub id: String,
    #[serde(default)]
    pub format: PayloadFormat,
    pub json_schema: Option<PathBuf>,
    pub xsd: Option<PathBuf>,
}
