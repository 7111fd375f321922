//! Where the CLI finds its disk, partition table and partition.
//!
//! Settings come from an optional JSON file and are overridden by flags:
//!
//! ```json
//! {
//!     "disk": "emmc.img",
//!     "partitions": "0x2000@0x2000(uboot),0x200@0x4000(vnvm)",
//!     "partition": "vnvm",
//!     "grow_policy": "reject"
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use vendor_storage_core::{GrowPolicy, StoreConfig};

use crate::CliError;

/// Partition used when none is configured.
pub const DEFAULT_PARTITION: &str = "vnvm";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub disk: Option<PathBuf>,
    /// Partition table in `size@offset(name)` form. Without one the whole
    /// disk is treated as the vendor partition.
    #[serde(default)]
    pub partitions: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub grow_policy: Option<GrowPolicy>,
}

/// Fully resolved settings for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub disk: PathBuf,
    pub partitions: String,
    pub store: StoreConfig,
}

impl CliConfig {
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let json = std::fs::read_to_string(path).map_err(|err| CliError::Config {
            message: format!("failed to read {}: {}", path.display(), err),
        })?;
        serde_json::from_str(&json).map_err(|err| CliError::Config {
            message: format!("failed to parse {}: {}", path.display(), err),
        })
    }

    /// Layers `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: CliConfig) -> CliConfig {
        CliConfig {
            disk: overrides.disk.or(self.disk),
            partitions: overrides.partitions.or(self.partitions),
            partition: overrides.partition.or(self.partition),
            grow_policy: overrides.grow_policy.or(self.grow_policy),
        }
    }

    pub fn resolve(self) -> Result<Target, CliError> {
        let disk = self.disk.ok_or(CliError::MissingDisk)?;
        let partition = self
            .partition
            .unwrap_or_else(|| DEFAULT_PARTITION.to_string());
        let partitions = self
            .partitions
            .unwrap_or_else(|| format!("-@0({partition})"));
        let store = StoreConfig::new(partition)
            .with_grow_policy(self.grow_policy.unwrap_or_default());
        store.validate()?;
        Ok(Target {
            disk,
            partitions,
            store,
        })
    }
}
