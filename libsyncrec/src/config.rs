use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::{DEFAULT_OUT_OF_SLOT_MAX, NON_INTEGRAL_MIN_DIFF_BOUND};
use super::error::ConfigError;
use super::layout::MinDiffBound;
use super::variable::{StreamConfig, Variable};

fn default_out_of_slot_max() -> u32 {
    DEFAULT_OUT_OF_SLOT_MAX
}

fn default_non_integral_bound() -> MinDiffBound {
    NON_INTEGRAL_MIN_DIFF_BOUND
}

/// Structure representing the application configuration. Contains pathing and the stream catalog.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub sample_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default)]
    pub stats_path: Option<PathBuf>,
    #[serde(default)]
    pub hdf_path: Option<PathBuf>,
    #[serde(default = "default_out_of_slot_max")]
    pub out_of_slot_max: u32,
    #[serde(default = "default_non_integral_bound")]
    pub non_integral_bound: MinDiffBound,
    pub streams: Vec<StreamConfig>,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be invalid and the catalog empty
    fn default() -> Self {
        Self {
            sample_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            stats_path: None,
            hdf_path: None,
            out_of_slot_max: DEFAULT_OUT_OF_SLOT_MAX,
            non_integral_bound: NON_INTEGRAL_MIN_DIFF_BOUND,
            streams: vec![],
        }
    }
}

impl Config {
    /// A default Config with one example stream, as a starting point for users
    pub fn template() -> Self {
        Self {
            streams: vec![StreamConfig::new(
                100,
                10.0,
                vec![Variable::new("TTX", "degC", 1).with_long_name("Total temperature")],
            )],
            ..Default::default()
        }
    }

    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        std::fs::write(config_path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Check the values that serde cannot. Stream layouts are checked when the layout is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.out_of_slot_max == 0 {
            return Err(ConfigError::BadOutOfSlotMax(self.out_of_slot_max));
        }
        Ok(())
    }

    /// Get the path to the statistics file, next to the record file unless given
    pub fn get_stats_path(&self) -> PathBuf {
        match &self.stats_path {
            Some(path) => path.clone(),
            None => self.output_path.with_extension("stats.yaml"),
        }
    }

    pub fn has_hdf_path(&self) -> bool {
        self.hdf_path.is_some()
    }
}
