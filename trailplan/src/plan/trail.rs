// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Trail parameter construction
//!
//! Derives the physical parameter record of the Trail operator from a
//! quantified path pattern, the variables bound before it and the chosen
//! iteration direction.

use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::ir::expression::Expression;
use crate::ir::pattern::{QuantifiedPathPattern, SemanticDirection, UpperBound, VariableGrouping};
use crate::plan::attributes::PlanArena;
use crate::plan::error::{PlanningError, PlanningResult};
use crate::plan::uniqueness::{types_overlap, RelationshipForm, RelationshipProducer};

/// Physical iteration direction relative to the textual pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraversalDirection {
    /// Left boundary to right boundary
    Forward,
    /// Right boundary to left boundary
    Reversed,
}

impl TraversalDirection {
    pub fn is_reversed(self) -> bool {
        self == TraversalDirection::Reversed
    }
}

/// One relationship of the repeated pattern in iteration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailStep {
    pub relationship: String,
    pub from: String,
    pub to: String,
    /// Direction as seen from `from`
    pub direction: SemanticDirection,
    pub types: Vec<String>,
}

/// Relationship steps of one repetition, in the order they are expanded
pub fn trail_steps(qpp: &QuantifiedPathPattern, direction: TraversalDirection) -> Vec<TrailStep> {
    let mut steps: Vec<TrailStep> = qpp
        .relationships()
        .iter()
        .map(|rel| TrailStep {
            relationship: rel.variable.clone(),
            from: rel.left().to_string(),
            to: rel.right().to_string(),
            direction: rel.direction,
            types: rel.types.clone(),
        })
        .collect();

    if direction.is_reversed() {
        steps.reverse();
        for step in &mut steps {
            std::mem::swap(&mut step.from, &mut step.to);
            step.direction = step.direction.reversed();
        }
    }
    steps
}

/// Parameters of the Trail operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailParameters {
    pub min: u32,
    pub max: UpperBound,
    /// Outer variable the loop starts from, bound by the input plan
    pub start: String,
    /// Outer variable bound to the last inner end node
    pub end: String,
    pub inner_start: String,
    pub inner_end: String,
    pub group_nodes: Vec<VariableGrouping>,
    pub group_relationships: Vec<VariableGrouping>,
    pub inner_relationships: Vec<String>,
    pub previously_bound_relationships: Vec<String>,
    pub previously_bound_relationship_groups: Vec<String>,
    pub reverse_group_variable_projections: bool,
}

impl fmt::Display for TrailParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max = match self.max {
            UpperBound::Unlimited => String::new(),
            UpperBound::Limited(n) => n.to_string(),
        };
        write!(
            f,
            "(({}) ({})-...-({}){{{}, {}}} ({})",
            self.start, self.inner_start, self.inner_end, self.min, max, self.end
        )?;
        let groups: Vec<&str> = self
            .group_nodes
            .iter()
            .chain(self.group_relationships.iter())
            .map(|g| g.group.as_str())
            .collect();
        if !groups.is_empty() {
            write!(f, " groups: {}", groups.join(", "))?;
        }
        if self.reverse_group_variable_projections {
            write!(f, " reversed")?;
        }
        write!(f, ")")
    }
}

/// Inputs of the builder
#[derive(Debug, Clone)]
pub struct TrailRequest<'a> {
    pub qpp: &'a QuantifiedPathPattern,
    pub direction: TraversalDirection,
    /// Variables bound by the plan the Trail is placed on
    pub bound: &'a BTreeSet<String>,
    /// Group variables that must survive dead-group elimination
    pub needed_groups: &'a BTreeSet<String>,
    /// Relationship variables of earlier sibling patterns
    pub siblings: &'a [RelationshipProducer],
}

/// Built parameters plus the join the caller must add when the far boundary
/// was already bound
#[derive(Debug, Clone, PartialEq)]
pub struct TrailBuild {
    pub parameters: TrailParameters,
    pub end_equality: Option<Expression>,
}

pub fn build_trail_parameters(
    request: &TrailRequest<'_>,
    arena: &mut PlanArena,
) -> PlanningResult<TrailBuild> {
    let qpp = request.qpp;
    let (near, far) = if request.direction.is_reversed() {
        (qpp.right_binding(), qpp.left_binding())
    } else {
        (qpp.left_binding(), qpp.right_binding())
    };

    if !request.bound.contains(&near.outer) {
        return Err(PlanningError::Internal(format!(
            "trail start {} is not bound by its input",
            near.outer
        )));
    }

    let (end, end_equality) = if request.bound.contains(&far.outer) {
        let fresh = arena.fresh_variable("trail_end");
        let equality = Expression::equals(
            Expression::variable(fresh.as_str()),
            Expression::variable(far.outer.as_str()),
        );
        (fresh, Some(equality))
    } else {
        (far.outer.clone(), None)
    };

    let group_nodes: Vec<VariableGrouping> = qpp
        .node_variable_groupings()
        .iter()
        .filter(|g| request.needed_groups.contains(&g.group))
        .cloned()
        .collect();
    let group_relationships: Vec<VariableGrouping> = qpp
        .relationship_variable_groupings()
        .iter()
        .filter(|g| request.needed_groups.contains(&g.group))
        .cloned()
        .collect();

    let qpp_types = qpp.type_set();
    let mut previously_bound_relationships = Vec::new();
    let mut previously_bound_relationship_groups = Vec::new();
    for sibling in request.siblings {
        if !request.bound.contains(&sibling.variable)
            || !types_overlap(&qpp_types, &sibling.types)
        {
            continue;
        }
        let target = match sibling.form {
            RelationshipForm::Single => &mut previously_bound_relationships,
            RelationshipForm::List => &mut previously_bound_relationship_groups,
        };
        if !target.contains(&sibling.variable) {
            target.push(sibling.variable.clone());
        }
    }

    let parameters = TrailParameters {
        min: qpp.repetition().min,
        max: qpp.repetition().max,
        start: near.outer.clone(),
        end,
        inner_start: near.inner.clone(),
        inner_end: far.inner.clone(),
        group_nodes,
        group_relationships,
        inner_relationships: qpp
            .relationship_variables()
            .iter()
            .map(|r| r.to_string())
            .collect(),
        previously_bound_relationships,
        previously_bound_relationship_groups,
        reverse_group_variable_projections: request.direction.is_reversed(),
    };

    trace!(
        "trail parameters for {} ({:?}): {}",
        qpp,
        request.direction,
        parameters
    );

    Ok(TrailBuild {
        parameters,
        end_equality,
    })
}
