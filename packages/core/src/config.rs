//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::Error;

/// What an update does when the new payload outgrows the space allocated to
/// the item when it was first written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowPolicy {
    /// Refuse the update with [`Error::InvalidArgument`].
    #[default]
    Reject,
    /// Write anyway, spilling into the bytes of the next item. Matches
    /// images produced by older firmware that never checked.
    Overwrite,
}

/// Configuration passed to [`VendorStore::initialize`](crate::VendorStore::initialize).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Name of the partition holding the redundant slots.
    pub partition: String,

    #[serde(default)]
    pub grow_policy: GrowPolicy,
}

impl StoreConfig {
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            grow_policy: GrowPolicy::default(),
        }
    }

    pub fn with_grow_policy(mut self, grow_policy: GrowPolicy) -> Self {
        self.grow_policy = grow_policy;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.partition.trim().is_empty() {
            return Err(Error::Config {
                message: "partition name must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_config() {
        let config: StoreConfig = serde_json::from_str(r#"{"partition": "vnvm"}"#).unwrap();
        assert_eq!(config, StoreConfig::new("vnvm"));
        assert_eq!(config.grow_policy, GrowPolicy::Reject);
    }

    #[test]
    fn grow_policy_is_lowercase() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"partition": "vnvm", "grow_policy": "overwrite"}"#).unwrap();
        assert_eq!(config.grow_policy, GrowPolicy::Overwrite);
        assert_eq!(
            serde_json::to_string(&GrowPolicy::Reject).unwrap(),
            r#""reject""#
        );
    }

    #[test]
    fn builder_sets_policy() {
        let config = StoreConfig::new("vnvm").with_grow_policy(GrowPolicy::Overwrite);
        assert_eq!(config.grow_policy, GrowPolicy::Overwrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reject_empty_partition() {
        let result = StoreConfig::new("  ").validate();
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
