// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planner configuration

use serde::{Deserialize, Serialize};

use crate::plan::error::{PlanningError, PlanningResult};

/// Configuration for QPP planning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Runtime capability flag: the target runtime implements BFSPruningVarExpand
    pub bfs_pruning_supported: bool,
    /// Allow the pruning var-length operators when only distinct endpoints are read
    pub enable_pruning_var_expand: bool,
    /// Allow collapsing eligible QPPs into VarExpand-family operators
    pub enable_var_expand_rewrite: bool,
    /// Offer NodeHashJoin candidates while growing a component
    pub enable_node_hash_join: bool,
    /// Consult the cancellation token every N composition steps
    pub cancellation_check_interval: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            bfs_pruning_supported: true,
            enable_pruning_var_expand: true,
            enable_var_expand_rewrite: true,
            enable_node_hash_join: true,
            cancellation_check_interval: 1,
        }
    }
}

impl PlannerConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> PlanningResult<Self> {
        let config: PlannerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PlanningResult<()> {
        if self.cancellation_check_interval == 0 {
            return Err(PlanningError::InvalidConfig(
                "cancellation_check_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PlannerConfig::from_json_str(r#"{"bfs_pruning_supported": false}"#).unwrap();
        assert!(!config.bfs_pruning_supported);
        assert!(config.enable_var_expand_rewrite);
        assert_eq!(config.cancellation_check_interval, 1);
    }

    #[test]
    fn test_invalid_json() {
        let err = PlannerConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, PlanningError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_check_interval_rejected() {
        let err =
            PlannerConfig::from_json_str(r#"{"cancellation_check_interval": 0}"#).unwrap_err();
        assert!(matches!(err, PlanningError::InvalidConfig(_)));
    }
}
