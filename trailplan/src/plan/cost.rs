// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cost estimation and statistics for query planning
//!
//! The planner only ever compares candidate plans through the
//! `CostEstimator` trait; `CostModel` is the default, statistics-driven
//! implementation. Estimates are pure functions of the plan and the
//! statistics snapshot, so candidates can be estimated and discarded freely.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ir::expression::{Expression, Literal, Operator as BinaryOperator};
use crate::ir::pattern::{SemanticDirection, UpperBound};
use crate::plan::error::{PlanningError, PlanningResult};
use crate::plan::physical::{ExpansionMode, Operator, PlanNode, VariablePredicate};

/// Rows beyond this are indistinguishable for plan comparison
const ROW_CEILING: f64 = 1.0e15;

/// Cost and cardinality of a (partial) plan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub cost: f64,
    pub rows: f64,
}

impl Estimate {
    pub fn new(cost: f64, rows: f64) -> Self {
        Self { cost, rows }
    }
}

/// Cost and cardinality estimation for partial plans
pub trait CostEstimator {
    fn estimate(&self, plan: &PlanNode, statistics: &Statistics) -> PlanningResult<Estimate>;
}

/// Decides between planning a QPP from one bound boundary (joining the
/// other one afterwards) and a Cartesian product of both boundary leaves
/// followed by the QPP in Into mode
pub trait ShapeComparator {
    fn prefer_cartesian(&self, single_sided: &Estimate, cartesian: &Estimate) -> bool;
}

/// Default comparator: the Cartesian shape must be strictly cheaper
#[derive(Debug, Clone, Copy, Default)]
pub struct CostComparator;

impl ShapeComparator for CostComparator {
    fn prefer_cartesian(&self, single_sided: &Estimate, cartesian: &Estimate) -> bool {
        cartesian.cost < single_sided.cost
    }
}

/// Statistics about data distribution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    /// Total number of nodes in the graph
    pub total_nodes: usize,
    /// Total number of relationships in the graph
    pub total_relationships: usize,
    /// Node count by label
    pub node_counts: HashMap<String, usize>,
    /// Relationship count by type
    pub relationship_counts: HashMap<String, usize>,
    /// Equality selectivity by property name
    pub property_selectivity: HashMap<String, f64>,
    /// Node property indexes
    pub indexes: Vec<IndexInfo>,
}

/// A node property index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub label: String,
    pub property: String,
    pub unique: bool,
}

impl Statistics {
    pub fn new(total_nodes: usize, total_relationships: usize) -> Self {
        Self {
            total_nodes,
            total_relationships,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: &str, count: usize) -> Self {
        self.node_counts.insert(label.to_string(), count);
        self
    }

    pub fn with_relationship_type(mut self, rel_type: &str, count: usize) -> Self {
        self.relationship_counts.insert(rel_type.to_string(), count);
        self
    }

    pub fn with_property_selectivity(mut self, property: &str, selectivity: f64) -> Self {
        self.property_selectivity
            .insert(property.to_string(), selectivity);
        self
    }

    pub fn with_index(mut self, label: &str, property: &str, unique: bool) -> Self {
        self.indexes.push(IndexInfo {
            label: label.to_string(),
            property: property.to_string(),
            unique,
        });
        self
    }

    pub fn find_index(&self, label: &str, property: &str) -> Option<&IndexInfo> {
        self.indexes
            .iter()
            .find(|index| index.label == label && index.property == property)
    }

    fn node_total(&self) -> f64 {
        self.total_nodes.max(1) as f64
    }

    pub fn label_count(&self, label: &str) -> f64 {
        self.node_counts.get(label).copied().unwrap_or(0) as f64
    }

    /// Relationships matching any of `types`; all relationships when untyped
    pub fn relationship_count(&self, types: &[String]) -> f64 {
        if types.is_empty() {
            return self.total_relationships as f64;
        }
        types
            .iter()
            .map(|t| self.relationship_counts.get(t).copied().unwrap_or(0) as f64)
            .sum()
    }

    /// Expected relationships per node when traversing in `direction`
    pub fn average_degree(&self, types: &[String], direction: SemanticDirection) -> f64 {
        let degree = self.relationship_count(types) / self.node_total();
        match direction {
            SemanticDirection::Both => degree * 2.0,
            _ => degree,
        }
    }
}

/// Default cost model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModel {
    /// CPU cost per row processed
    pub cpu_cost_per_row: f64,
    /// Cost per relationship traversed
    pub expand_cost_per_row: f64,
    /// Cost per row built into or probed against a hash table
    pub hash_cost_per_row: f64,
    /// Fixed cost of one index lookup
    pub index_seek_cost: f64,
    /// Hops estimated beyond the lower bound of an unbounded repetition
    pub unbounded_hop_horizon: u32,
    /// Fallback selectivity of `x.p = value`
    pub equality_selectivity: f64,
    /// Selectivity of relationship uniqueness checks
    pub uniqueness_selectivity: f64,
    /// Selectivity of anything else
    pub default_selectivity: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CostModel {
    /// Create a new cost model with default values
    pub fn new() -> Self {
        Self {
            cpu_cost_per_row: 0.001,
            expand_cost_per_row: 0.002,
            hash_cost_per_row: 0.0015,
            index_seek_cost: 0.005,
            unbounded_hop_horizon: 4,
            equality_selectivity: 0.1,
            uniqueness_selectivity: 0.99,
            default_selectivity: 0.5,
        }
    }

    fn estimate_node(&self, plan: &PlanNode, stats: &Statistics) -> PlanningResult<Estimate> {
        let estimate = match &plan.operator {
            Operator::Argument { .. } => Estimate::new(0.0, 1.0),

            Operator::AllNodesScan { .. } => {
                let rows = stats.total_nodes as f64;
                Estimate::new(rows * self.cpu_cost_per_row, rows)
            }

            Operator::NodeByLabelScan { label, .. } => {
                let rows = stats.label_count(label);
                Estimate::new(rows * self.cpu_cost_per_row, rows)
            }

            Operator::NodeIndexSeek {
                label,
                property,
                unique,
                ..
            } => {
                let count = stats.label_count(label);
                let rows = if *unique {
                    count.min(1.0)
                } else {
                    count * self.property_selectivity(property, stats)
                };
                Estimate::new(self.index_seek_cost + rows * self.cpu_cost_per_row, rows)
            }

            Operator::Expand {
                input,
                direction,
                types,
                mode,
                ..
            } => {
                let source = self.estimate_node(input, stats)?;
                let traversed = source.rows * stats.average_degree(types, *direction);
                let rows = match mode {
                    ExpansionMode::All => traversed,
                    ExpansionMode::Into => traversed / stats.node_total(),
                };
                Estimate::new(source.cost + traversed * self.expand_cost_per_row, rows)
            }

            Operator::VarLengthExpand {
                input,
                direction,
                types,
                min,
                max,
                node_predicates,
                relationship_predicates,
                mode,
                ..
            } => {
                let source = self.estimate_node(input, stats)?;
                let degree = stats.average_degree(types, *direction)
                    * self.variable_predicate_selectivity(node_predicates, stats)
                    * self.variable_predicate_selectivity(relationship_predicates, stats);
                let paths = self.path_count(degree, *min, *max);
                let explored = self.path_count(degree, (*min).max(1), *max);
                let mut rows = source.rows * paths;
                if *mode == ExpansionMode::Into {
                    rows /= stats.node_total();
                }
                Estimate::new(
                    source.cost
                        + source.rows * explored * self.expand_cost_per_row
                        + rows * self.cpu_cost_per_row,
                    rows,
                )
            }

            Operator::PruningVarExpand {
                input,
                direction,
                types,
                min,
                max,
                node_predicates,
                relationship_predicates,
                ..
            } => {
                let source = self.estimate_node(input, stats)?;
                let degree = stats.average_degree(types, *direction)
                    * self.variable_predicate_selectivity(node_predicates, stats)
                    * self.variable_predicate_selectivity(relationship_predicates, stats);
                self.pruning_estimate(source, degree, *min, UpperBound::Limited(*max), stats, 1.0)
            }

            Operator::BfsPruningVarExpand {
                input,
                direction,
                types,
                include_start,
                max,
                node_predicates,
                relationship_predicates,
                ..
            } => {
                let source = self.estimate_node(input, stats)?;
                let degree = stats.average_degree(types, *direction)
                    * self.variable_predicate_selectivity(node_predicates, stats)
                    * self.variable_predicate_selectivity(relationship_predicates, stats);
                let min = if *include_start { 0 } else { 1 };
                self.pruning_estimate(source, degree, min, *max, stats, 0.9)
            }

            Operator::Trail {
                input,
                inner,
                parameters,
            } => {
                let source = self.estimate_node(input, stats)?;
                // Inner plan is estimated per single argument row
                let iteration = self.estimate_node(inner, stats)?;
                let per_start = self.path_count(iteration.rows, parameters.min, parameters.max);
                let limit = self.hop_limit(parameters.min, parameters.max);
                let runs = if limit == 0 {
                    0.0
                } else {
                    series(iteration.rows, 0, limit - 1)
                };
                let rows = source.rows * per_start;
                Estimate::new(
                    source.cost
                        + source.rows * runs * (iteration.cost + self.cpu_cost_per_row)
                        + rows * self.cpu_cost_per_row,
                    rows,
                )
            }

            Operator::Filter { input, predicates } => {
                let source = self.estimate_node(input, stats)?;
                let selectivity: f64 = predicates
                    .iter()
                    .map(|p| self.selectivity(p, stats))
                    .product();
                Estimate::new(
                    source.cost
                        + source.rows * self.cpu_cost_per_row * predicates.len() as f64,
                    source.rows * selectivity,
                )
            }

            Operator::CartesianProduct { left, right } => {
                let lhs = self.estimate_node(left, stats)?;
                let rhs = self.estimate_node(right, stats)?;
                let rows = lhs.rows * rhs.rows;
                Estimate::new(
                    lhs.cost + lhs.rows * rhs.cost + rows * self.cpu_cost_per_row,
                    rows,
                )
            }

            Operator::NodeHashJoin { left, right, nodes } => {
                let lhs = self.estimate_node(left, stats)?;
                let rhs = self.estimate_node(right, stats)?;
                let rows = lhs.rows * rhs.rows / stats.node_total().powi(nodes.len() as i32);
                Estimate::new(
                    lhs.cost + rhs.cost + (lhs.rows + rhs.rows) * self.hash_cost_per_row,
                    rows,
                )
            }

            Operator::Eager { input, .. } => {
                let source = self.estimate_node(input, stats)?;
                Estimate::new(source.cost + source.rows * self.cpu_cost_per_row, source.rows)
            }
        };

        Ok(Estimate::new(cap(estimate.cost), cap(estimate.rows)))
    }

    fn pruning_estimate(
        &self,
        source: Estimate,
        degree: f64,
        min: u32,
        max: UpperBound,
        stats: &Statistics,
        discount: f64,
    ) -> Estimate {
        let reachable = self.path_count(degree, min, max).min(stats.node_total());
        let explored = self
            .path_count(degree, min.max(1), max)
            .min(stats.total_relationships.max(1) as f64);
        let rows = source.rows * reachable;
        Estimate::new(
            source.cost + source.rows * explored * self.expand_cost_per_row * discount,
            rows,
        )
    }

    /// Largest repetition count worth estimating
    fn hop_limit(&self, min: u32, max: UpperBound) -> u32 {
        let horizon = min.saturating_add(self.unbounded_hop_horizon);
        match max {
            UpperBound::Limited(n) => n.min(horizon),
            UpperBound::Unlimited => horizon,
        }
    }

    /// Sum of `factor^k` over the estimated repetition range
    fn path_count(&self, factor: f64, min: u32, max: UpperBound) -> f64 {
        series(factor, min, self.hop_limit(min, max))
    }

    fn variable_predicate_selectivity(
        &self,
        predicates: &[VariablePredicate],
        stats: &Statistics,
    ) -> f64 {
        predicates
            .iter()
            .map(|p| self.selectivity(&p.predicate, stats))
            .product()
    }

    fn property_selectivity(&self, property: &str, stats: &Statistics) -> f64 {
        stats
            .property_selectivity
            .get(property)
            .copied()
            .unwrap_or(self.equality_selectivity)
    }

    /// Fraction of rows a predicate keeps
    pub fn selectivity(&self, predicate: &Expression, stats: &Statistics) -> f64 {
        let selectivity = match predicate {
            Expression::HasLabels(test) => test
                .labels
                .iter()
                .map(|label| stats.label_count(label) / stats.node_total())
                .product(),
            Expression::Literal(Literal::Boolean(true)) => 1.0,
            Expression::Literal(Literal::Boolean(false)) => 0.0,
            Expression::Binary(binary) => match binary.operator {
                BinaryOperator::And => {
                    self.selectivity(&binary.left, stats) * self.selectivity(&binary.right, stats)
                }
                BinaryOperator::Or => {
                    let a = self.selectivity(&binary.left, stats);
                    let b = self.selectivity(&binary.right, stats);
                    a + b - a * b
                }
                BinaryOperator::Equal => match (binary.left.as_ref(), binary.right.as_ref()) {
                    (Expression::Variable(_), Expression::Variable(_)) => 1.0 / stats.node_total(),
                    (Expression::PropertyAccess(access), _)
                    | (_, Expression::PropertyAccess(access)) => {
                        self.property_selectivity(&access.property, stats)
                    }
                    _ => self.equality_selectivity,
                },
                BinaryOperator::NotEqual => 1.0 - self.equality_selectivity,
                _ => self.default_selectivity,
            },
            Expression::Not(inner) => match inner.as_ref() {
                Expression::Binary(binary)
                    if matches!(binary.operator, BinaryOperator::Equal | BinaryOperator::In)
                        && matches!(binary.left.as_ref(), Expression::Variable(_))
                        && matches!(binary.right.as_ref(), Expression::Variable(_)) =>
                {
                    self.uniqueness_selectivity
                }
                other => 1.0 - self.selectivity(other, stats),
            },
            Expression::FunctionCall(call)
                if call.name == "disjoint" || call.name == "isRepeatTrailUnique" =>
            {
                self.uniqueness_selectivity
            }
            _ => self.default_selectivity,
        };
        selectivity.clamp(0.0, 1.0)
    }
}

/// Clamp to the row ceiling, keeping NaN visible to validation
fn cap(value: f64) -> f64 {
    if value > ROW_CEILING {
        ROW_CEILING
    } else {
        value
    }
}

/// Sum of `factor^k` for `k` in `from..=to`, in closed form
fn series(factor: f64, from: u32, to: u32) -> f64 {
    if from > to {
        return 0.0;
    }
    let terms = f64::from(to - from) + 1.0;
    if factor == 1.0 {
        return cap(terms);
    }
    let first = factor.powf(f64::from(from));
    if first == 0.0 {
        return 0.0;
    }
    cap(first * (1.0 - factor.powf(terms)) / (1.0 - factor))
}

impl CostEstimator for CostModel {
    fn estimate(&self, plan: &PlanNode, statistics: &Statistics) -> PlanningResult<Estimate> {
        let estimate = self.estimate_node(plan, statistics)?;
        if !estimate.cost.is_finite()
            || !estimate.rows.is_finite()
            || estimate.cost < 0.0
            || estimate.rows < 0.0
        {
            return Err(PlanningError::Estimation(format!(
                "invalid estimate for plan {}: cost={} rows={}",
                plan.id, estimate.cost, estimate.rows
            )));
        }
        Ok(estimate)
    }
}
