// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan ids and per-plan attribute tables
//!
//! Every operator created during planning, including candidates that are
//! later discarded, receives a fresh `PlanId`. Cardinality, solved
//! predicates and provided order live in side tables keyed by that id. The
//! tables are append-only and single-assignment: writing an id twice is an
//! error, never a silent overwrite.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ir::expression::Expression;
use crate::plan::error::{PlanningError, PlanningResult};

/// Identifier of a plan operator, allocated monotonically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub u32);

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Order of the rows a plan produces
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidedOrder {
    /// Ascending sort columns, most significant first
    pub columns: Vec<String>,
}

impl ProvidedOrder {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            columns: vec![column.into()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Single-assignment table keyed by plan id
#[derive(Debug, Clone)]
pub struct Attribute<T> {
    name: &'static str,
    values: BTreeMap<PlanId, T>,
}

impl<T> Attribute<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            values: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, id: PlanId, value: T) -> PlanningResult<()> {
        if self.values.contains_key(&id) {
            return Err(PlanningError::AttributeAlreadySet {
                attribute: self.name,
                id,
            });
        }
        self.values.insert(id, value);
        Ok(())
    }

    pub fn get(&self, id: PlanId) -> Option<&T> {
        self.values.get(&id)
    }

    pub fn is_set(&self, id: PlanId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Id allocator plus the attribute tables of one planning run
#[derive(Debug, Clone)]
pub struct PlanArena {
    next_id: u32,
    next_anonymous: u32,
    pub cardinalities: Attribute<f64>,
    pub solved_predicates: Attribute<Vec<Expression>>,
    pub provided_orders: Attribute<ProvidedOrder>,
}

impl PlanArena {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            next_anonymous: 0,
            cardinalities: Attribute::new("cardinality"),
            solved_predicates: Attribute::new("solved_predicates"),
            provided_orders: Attribute::new("provided_order"),
        }
    }

    /// Allocate the next plan id
    pub fn next_id(&mut self) -> PlanId {
        let id = PlanId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Number of ids handed out so far
    pub fn allocated(&self) -> usize {
        self.next_id as usize
    }

    /// Fresh variable name that cannot clash with user variables
    pub fn fresh_variable(&mut self, prefix: &str) -> String {
        let name = format!("  {}_{}", prefix, self.next_anonymous);
        self.next_anonymous += 1;
        name
    }

    pub fn cardinality(&self, id: PlanId) -> PlanningResult<f64> {
        self.cardinalities
            .get(id)
            .copied()
            .ok_or(PlanningError::UnknownPlanId(id))
    }

    pub fn solved(&self, id: PlanId) -> &[Expression] {
        self.solved_predicates
            .get(id)
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }

    pub fn provided_order(&self, id: PlanId) -> Option<&ProvidedOrder> {
        self.provided_orders.get(id)
    }
}

impl Default for PlanArena {
    fn default() -> Self {
        Self::new()
    }
}
