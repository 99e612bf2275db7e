// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planning error types

use thiserror::Error;

use crate::plan::attributes::PlanId;

/// Planning errors
///
/// There is no partial-success mode: any of these aborts compilation of the
/// whole query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanningError {
    /// Upstream handed over an IR that violates its contract
    #[error("Malformed pattern: {0}")]
    MalformedPattern(String),

    #[error("Predicate `{predicate}` cannot be placed, unbound variables: {missing:?}")]
    UnsolvablePredicate {
        predicate: String,
        missing: Vec<String>,
    },

    #[error("Cost estimation failed: {0}")]
    Estimation(String),

    #[error("Leaf planning failed: {0}")]
    LeafPlanning(String),

    #[error("Planning was cancelled")]
    Cancelled,

    #[error("Attribute `{attribute}` already set for plan {id}")]
    AttributeAlreadySet { attribute: &'static str, id: PlanId },

    #[error("No plan with id {0}")]
    UnknownPlanId(PlanId),

    #[error("Invalid planner configuration: {0}")]
    InvalidConfig(String),

    #[error("Plan serialization failed: {0}")]
    Serialization(String),

    #[error("Internal planner error: {0}")]
    Internal(String),
}

impl PlanningError {
    /// Errors a candidate search may skip over as long as another candidate
    /// succeeds
    pub fn is_candidate_local(&self) -> bool {
        matches!(self, PlanningError::UnsolvablePredicate { .. })
    }

    pub fn serialization(err: serde_json::Error) -> Self {
        PlanningError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for PlanningError {
    fn from(err: serde_json::Error) -> Self {
        PlanningError::InvalidConfig(err.to_string())
    }
}

pub type PlanningResult<T> = Result<T, PlanningError>;
