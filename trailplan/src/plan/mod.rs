// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Physical planning of MATCH graphs with quantified path patterns
//!
//! This module turns a match graph into a physical operator tree. It covers
//! predicate classification, Trail parameter construction, operator
//! selection between Trail and the VarExpand family, join composition,
//! uniqueness analysis, cost estimation and Eager splicing.

pub mod attributes;
pub mod cancel;
pub mod composer;
pub mod config;
pub mod context;
pub mod cost;
pub mod eager;
pub mod error;
pub mod leaf;
pub mod physical;
pub mod planner;
pub mod predicates;
pub mod selector;
pub mod trace;
pub mod trail;
pub mod uniqueness;
