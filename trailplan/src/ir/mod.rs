// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planner input representation
//!
//! Produced upstream by semantic analysis and consumed read-only here.

pub mod expression;
pub mod match_graph;
pub mod pattern;

pub use expression::{Expression, Literal, Operator};
pub use match_graph::{Connection, MatchGraph, PatternNode};
pub use pattern::{
    GroupKind, NodeBinding, PatternLength, PatternRelationship, QuantifiedPathPattern,
    Repetition, SemanticDirection, UpperBound, VariableGrouping,
};
