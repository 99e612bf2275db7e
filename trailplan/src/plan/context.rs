// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Read-only collaborators shared by the planning components
//!
//! The context never changes during a planning run. Everything mutable
//! (plan ids, attributes) lives in the `PlanArena` passed alongside it.

use crate::ir::expression::Expression;
use crate::plan::attributes::{PlanArena, ProvidedOrder};
use crate::plan::cancel::CancellationToken;
use crate::plan::config::PlannerConfig;
use crate::plan::cost::{CostEstimator, Estimate, ShapeComparator, Statistics};
use crate::plan::error::PlanningResult;
use crate::plan::leaf::LeafPlanner;
use crate::plan::physical::{Operator, PlanNode};

pub struct PlanningContext<'a> {
    pub config: &'a PlannerConfig,
    pub statistics: &'a Statistics,
    pub estimator: &'a dyn CostEstimator,
    pub leaf_planner: &'a dyn LeafPlanner,
    pub comparator: &'a dyn ShapeComparator,
    pub cancellation: &'a CancellationToken,
}

impl<'a> PlanningContext<'a> {
    pub fn new(
        config: &'a PlannerConfig,
        statistics: &'a Statistics,
        estimator: &'a dyn CostEstimator,
        leaf_planner: &'a dyn LeafPlanner,
        comparator: &'a dyn ShapeComparator,
        cancellation: &'a CancellationToken,
    ) -> Self {
        Self {
            config,
            statistics,
            estimator,
            leaf_planner,
            comparator,
            cancellation,
        }
    }

    pub fn estimate(&self, plan: &PlanNode) -> PlanningResult<Estimate> {
        self.estimator.estimate(plan, self.statistics)
    }

    /// Allocate an id for `operator` and record its attributes
    pub fn finish(
        &self,
        arena: &mut PlanArena,
        operator: Operator,
        solved: Vec<Expression>,
    ) -> PlanningResult<PlanNode> {
        let node = PlanNode::new(arena.next_id(), operator);
        let estimate = self.estimate(&node)?;
        let order = provided_order(&node, arena);

        arena.cardinalities.set(node.id, estimate.rows)?;
        arena.solved_predicates.set(node.id, solved)?;
        arena.provided_orders.set(node.id, order)?;
        Ok(node)
    }

    /// Wrap `input` in a Filter; no-op for an empty predicate list
    pub fn filter(
        &self,
        arena: &mut PlanArena,
        input: PlanNode,
        predicates: Vec<Expression>,
    ) -> PlanningResult<PlanNode> {
        if predicates.is_empty() {
            return Ok(input);
        }
        self.finish(
            arena,
            Operator::Filter {
                input: Box::new(input),
                predicates: predicates.clone(),
            },
            predicates,
        )
    }
}

fn provided_order(node: &PlanNode, arena: &PlanArena) -> ProvidedOrder {
    let inherited = |child: &PlanNode| {
        arena
            .provided_order(child.id)
            .cloned()
            .unwrap_or_default()
    };
    match &node.operator {
        Operator::NodeIndexSeek {
            variable, property, ..
        } => ProvidedOrder::ascending(format!("{}.{}", variable, property)),
        Operator::Argument { .. }
        | Operator::AllNodesScan { .. }
        | Operator::NodeByLabelScan { .. } => ProvidedOrder::empty(),
        Operator::Expand { input, .. }
        | Operator::VarLengthExpand { input, .. }
        | Operator::PruningVarExpand { input, .. }
        | Operator::BfsPruningVarExpand { input, .. }
        | Operator::Trail { input, .. }
        | Operator::Filter { input, .. }
        | Operator::Eager { input, .. } => inherited(input),
        Operator::CartesianProduct { left, .. } => inherited(left),
        // Hash joins emit in probe order, which is not tracked
        Operator::NodeHashJoin { .. } => ProvidedOrder::empty(),
    }
}


#[cfg(test)]
mod tests {
    use super::fixture::ContextFixture;
    use super::*;

    #[test]
    fn test_finish_records_attributes_once() {
        let fixture = ContextFixture::new(Statistics::new(100, 0).with_index("L", "p", false));
        let ctx = fixture.context();
        let mut arena = PlanArena::new();

        let seek = ctx
            .finish(
                &mut arena,
                Operator::NodeIndexSeek {
                    variable: "n".into(),
                    label: "L".into(),
                    property: "p".into(),
                    value: Expression::integer(1),
                    unique: false,
                },
                vec![Expression::has_labels("n", &["L"])],
            )
            .unwrap();
        let filtered = ctx
            .filter(&mut arena, seek.clone(), vec![Expression::boolean(true)])
            .unwrap();

        assert_eq!(arena.solved(seek.id).len(), 1);
        assert_eq!(
            arena.provided_order(filtered.id),
            Some(&ProvidedOrder::ascending("n.p"))
        );
        assert!(arena.cardinalities.set(seek.id, 1.0).is_err());
    }

    #[test]
    fn test_empty_filter_is_identity() {
        let fixture = ContextFixture::new(Statistics::new(10, 0));
        let ctx = fixture.context();
        let mut arena = PlanArena::new();
        let scan = ctx
            .finish(
                &mut arena,
                Operator::AllNodesScan { variable: "a".into() },
                vec![],
            )
            .unwrap();
        let same = ctx.filter(&mut arena, scan.clone(), vec![]).unwrap();
        assert_eq!(same, scan);
        assert_eq!(arena.allocated(), 1);
    }
}
