// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Operator selection for quantified path patterns
//!
//! Chooses between the Trail operator and the VarExpand family, builds the
//! Trail inner plan, and picks the iteration direction by cost. A QPP can
//! collapse into a VarExpand-family operator only when it has a single
//! relationship, no per-repetition selections, no node group read later and
//! only relationship-level group predicates. Any per-repetition selection,
//! even a tautology, keeps the Trail.

use log::{debug, trace};
use std::collections::BTreeSet;

use crate::ir::expression::Expression;
use crate::ir::pattern::{QuantifiedPathPattern, UpperBound};
use crate::plan::attributes::PlanArena;
use crate::plan::context::PlanningContext;
use crate::plan::cost::Estimate;
use crate::plan::error::{PlanningError, PlanningResult};
use crate::plan::physical::{ExpansionMode, Operator, OperatorKind, PlanNode};
use crate::plan::predicates::{Classification, PredicateClassifier};
use crate::plan::trail::{
    build_trail_parameters, trail_steps, TrailRequest, TrailStep, TraversalDirection,
};
use crate::plan::uniqueness::{types_overlap, RelationshipForm, RelationshipProducer};

/// Function evaluated per step to reject a relationship already used by an
/// earlier repetition of the same Trail
pub const REPEAT_TRAIL_UNIQUE: &str = "isRepeatTrailUnique";

/// Everything the selector needs to know about one QPP occurrence
#[derive(Debug, Clone)]
pub struct QppRequest<'q> {
    pub qpp: &'q QuantifiedPathPattern,
    /// MATCH-level atoms reading a group of this QPP, textual order
    pub outer_predicates: Vec<Expression>,
    /// Variables read after the QPP is planned
    pub downstream: BTreeSet<String>,
    /// Already bound relationship producers this QPP must not overlap with
    pub siblings: Vec<RelationshipProducer>,
    /// Groups a later uniqueness check reads
    pub retained_groups: BTreeSet<String>,
    /// Downstream only reads distinct boundary nodes
    pub distinct_endpoints_only: bool,
}

impl<'q> QppRequest<'q> {
    pub fn new(qpp: &'q QuantifiedPathPattern) -> Self {
        Self {
            qpp,
            outer_predicates: Vec::new(),
            downstream: BTreeSet::new(),
            siblings: Vec::new(),
            retained_groups: BTreeSet::new(),
            distinct_endpoints_only: false,
        }
    }
}

/// The plan chosen for one QPP
#[derive(Debug, Clone)]
pub struct PlannedQpp {
    pub plan: PlanNode,
    pub estimate: Estimate,
    pub operator: OperatorKind,
    pub direction: TraversalDirection,
    /// MATCH-level atoms the chosen operator already enforces
    pub solved_outer: Vec<Expression>,
    /// Whether uniqueness against `siblings` is enforced by the operator
    pub discharged_siblings: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    VarExpand,
    Trail,
}

/// Chooses and builds the physical operator for a QPP
pub struct OperatorSelector<'c, 'a> {
    ctx: &'c PlanningContext<'a>,
}

impl<'c, 'a> OperatorSelector<'c, 'a> {
    pub fn new(ctx: &'c PlanningContext<'a>) -> Self {
        Self { ctx }
    }

    /// Plan `request.qpp` on top of `source`, which must bind at least one
    /// of its boundaries
    pub fn plan_qpp(
        &self,
        arena: &mut PlanArena,
        source: &PlanNode,
        request: &QppRequest<'_>,
    ) -> PlanningResult<PlannedQpp> {
        let qpp = request.qpp;
        let bound = source.available_variables();
        let classification =
            PredicateClassifier::new().classify(qpp, &request.outer_predicates, &bound);
        let needed = Self::needed_groups(qpp, request, &classification);

        let mut directions = Vec::new();
        if bound.contains(&qpp.left_binding().outer) {
            directions.push(TraversalDirection::Forward);
        }
        if bound.contains(&qpp.right_binding().outer) {
            directions.push(TraversalDirection::Reversed);
        }
        if directions.is_empty() {
            return Err(PlanningError::Internal(format!(
                "neither boundary of {} is bound",
                qpp
            )));
        }

        let shape = if self.var_expand_eligible(qpp, &classification, &needed) {
            Shape::VarExpand
        } else {
            Shape::Trail
        };
        debug!("{} planned as {:?}", qpp, shape);

        let mut best: Option<PlannedQpp> = None;
        let mut first_error: Option<PlanningError> = None;
        for direction in directions {
            let candidate = match shape {
                Shape::VarExpand => self.build_var_expand(
                    arena,
                    source,
                    request,
                    &classification,
                    &needed,
                    &bound,
                    direction,
                ),
                Shape::Trail => self.build_trail(
                    arena,
                    source,
                    request,
                    &classification,
                    &needed,
                    &bound,
                    direction,
                ),
            };
            match candidate {
                Ok(candidate) => {
                    debug!(
                        "{:?} {:?}: cost={:.4} rows={:.1}",
                        candidate.operator,
                        direction,
                        candidate.estimate.cost,
                        candidate.estimate.rows
                    );
                    // Strict comparison keeps the textual direction on ties
                    let better = best
                        .as_ref()
                        .map_or(true, |b| candidate.estimate.cost < b.estimate.cost);
                    if better {
                        best = Some(candidate);
                    }
                }
                Err(err) if err.is_candidate_local() => {
                    debug!("{:?} direction rejected: {}", direction, err);
                    first_error.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }

        match (best, first_error) {
            (Some(best), _) => Ok(best),
            (None, Some(err)) => Err(err),
            (None, None) => Err(PlanningError::Internal(format!(
                "no candidate plan for {}",
                qpp
            ))),
        }
    }

    /// Plan the QPP between a Cartesian product of both boundary plans
    pub fn plan_qpp_between(
        &self,
        arena: &mut PlanArena,
        left: PlanNode,
        right: PlanNode,
        request: &QppRequest<'_>,
    ) -> PlanningResult<PlannedQpp> {
        let product = self.ctx.finish(
            arena,
            Operator::CartesianProduct {
                left: Box::new(left),
                right: Box::new(right),
            },
            Vec::new(),
        )?;
        self.plan_qpp(arena, &product, request)
    }

    /// Delegates the shape decision to the configured comparator
    pub fn prefer_cartesian(&self, single_sided: &Estimate, cartesian: &Estimate) -> bool {
        self.ctx.comparator.prefer_cartesian(single_sided, cartesian)
    }

    fn needed_groups(
        qpp: &QuantifiedPathPattern,
        request: &QppRequest<'_>,
        classification: &Classification,
    ) -> BTreeSet<String> {
        let groups: BTreeSet<&str> = qpp
            .node_groups()
            .into_iter()
            .chain(qpp.relationship_groups())
            .collect();
        request
            .downstream
            .iter()
            .chain(classification.post_filter_dependencies().iter())
            .chain(request.retained_groups.iter())
            .filter(|v| groups.contains(v.as_str()))
            .cloned()
            .collect()
    }

    fn var_expand_eligible(
        &self,
        qpp: &QuantifiedPathPattern,
        classification: &Classification,
        needed: &BTreeSet<String>,
    ) -> bool {
        if !self.ctx.config.enable_var_expand_rewrite {
            return false;
        }
        if !qpp.is_single_relationship() {
            trace!("{} has more than one relationship", qpp);
            return false;
        }
        if classification.has_selections() {
            trace!("{} has per-repetition selections", qpp);
            return false;
        }
        if qpp.node_groups().iter().any(|g| needed.contains(*g)) {
            trace!("{} exposes a node group read later", qpp);
            return false;
        }
        classification.group_predicates_fit_relationships()
    }

    #[allow(clippy::too_many_arguments)]
    fn build_var_expand(
        &self,
        arena: &mut PlanArena,
        source: &PlanNode,
        request: &QppRequest<'_>,
        classification: &Classification,
        needed: &BTreeSet<String>,
        bound: &BTreeSet<String>,
        direction: TraversalDirection,
    ) -> PlanningResult<PlannedQpp> {
        let qpp = request.qpp;
        let relationship = qpp.relationships().first().ok_or_else(|| {
            PlanningError::MalformedPattern(format!("{} has no relationship", qpp))
        })?;
        let group = qpp.relationship_group(&relationship.variable).ok_or_else(|| {
            PlanningError::MalformedPattern(format!(
                "relationship {} has no variable grouping",
                relationship.variable
            ))
        })?;

        let (near, far, semantic_direction) = if direction.is_reversed() {
            (
                &qpp.right_binding().outer,
                &qpp.left_binding().outer,
                relationship.direction.reversed(),
            )
        } else {
            (
                &qpp.left_binding().outer,
                &qpp.right_binding().outer,
                relationship.direction,
            )
        };
        let far_bound = bound.contains(far);
        let repetition = qpp.repetition();

        // Node-kind group predicates and needed node groups force a Trail,
        // so only relationship predicates reach this operator
        let relationship_predicates: Vec<_> = classification
            .extracted
            .iter()
            .map(|e| e.variable_predicate.clone())
            .collect();
        let solved: Vec<Expression> = classification
            .extracted
            .iter()
            .map(|e| e.original.clone())
            .collect();

        let group_needed = needed.contains(group) || !request.siblings.is_empty();
        let pruning = self.ctx.config.enable_pruning_var_expand
            && request.distinct_endpoints_only
            && !group_needed
            && !far_bound;

        let operator = match (pruning, repetition.max) {
            (true, max) if self.ctx.config.bfs_pruning_supported && repetition.min <= 1 => {
                Operator::BfsPruningVarExpand {
                    input: Box::new(source.clone()),
                    from: near.clone(),
                    to: far.clone(),
                    direction: semantic_direction,
                    types: relationship.types.clone(),
                    include_start: repetition.min == 0,
                    max,
                    node_predicates: Vec::new(),
                    relationship_predicates,
                }
            }
            (true, UpperBound::Limited(max)) => Operator::PruningVarExpand {
                input: Box::new(source.clone()),
                from: near.clone(),
                to: far.clone(),
                direction: semantic_direction,
                types: relationship.types.clone(),
                min: repetition.min,
                max,
                node_predicates: Vec::new(),
                relationship_predicates,
            },
            _ => Operator::VarLengthExpand {
                input: Box::new(source.clone()),
                from: near.clone(),
                relationship: group.to_string(),
                to: far.clone(),
                direction: semantic_direction,
                types: relationship.types.clone(),
                min: repetition.min,
                max: repetition.max,
                node_predicates: Vec::new(),
                relationship_predicates,
                mode: if far_bound {
                    ExpansionMode::Into
                } else {
                    ExpansionMode::All
                },
            },
        };

        let kind = operator.kind();
        let plan = self.ctx.finish(arena, operator, solved.clone())?;
        let estimate = self.ctx.estimate(&plan)?;
        Ok(PlannedQpp {
            plan,
            estimate,
            operator: kind,
            direction,
            solved_outer: solved,
            discharged_siblings: false,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_trail(
        &self,
        arena: &mut PlanArena,
        source: &PlanNode,
        request: &QppRequest<'_>,
        classification: &Classification,
        needed: &BTreeSet<String>,
        bound: &BTreeSet<String>,
        direction: TraversalDirection,
    ) -> PlanningResult<PlannedQpp> {
        let qpp = request.qpp;
        let built = build_trail_parameters(
            &TrailRequest {
                qpp,
                direction,
                bound,
                needed_groups: needed,
                siblings: &request.siblings,
            },
            arena,
        )?;
        let parameters = built.parameters;
        let steps = trail_steps(qpp, direction);

        let siblings: Vec<&RelationshipProducer> = request
            .siblings
            .iter()
            .filter(|s| match s.form {
                RelationshipForm::Single => {
                    parameters.previously_bound_relationships.contains(&s.variable)
                }
                RelationshipForm::List => parameters
                    .previously_bound_relationship_groups
                    .contains(&s.variable),
            })
            .collect();

        let inner = self.build_inner_plan(
            arena,
            qpp,
            classification,
            bound,
            &parameters.inner_start,
            &steps,
            &siblings,
        )?;

        let solved: Vec<Expression> = classification
            .extracted
            .iter()
            .map(|e| e.original.clone())
            .collect();
        let trail = self.ctx.finish(
            arena,
            Operator::Trail {
                input: Box::new(source.clone()),
                inner: Box::new(inner),
                parameters,
            },
            solved.clone(),
        )?;
        let plan = match built.end_equality {
            Some(equality) => self.ctx.filter(arena, trail, vec![equality])?,
            None => trail,
        };

        let estimate = self.ctx.estimate(&plan)?;
        Ok(PlannedQpp {
            plan,
            estimate,
            operator: OperatorKind::Trail,
            direction,
            solved_outer: solved,
            discharged_siblings: true,
        })
    }

    /// Argument -> one Expand per step, each predicate as a Filter right
    /// after the step that binds its last dependency
    #[allow(clippy::too_many_arguments)]
    fn build_inner_plan(
        &self,
        arena: &mut PlanArena,
        qpp: &QuantifiedPathPattern,
        classification: &Classification,
        bound: &BTreeSet<String>,
        inner_start: &str,
        steps: &[TrailStep],
        siblings: &[&RelationshipProducer],
    ) -> PlanningResult<PlanNode> {
        let inner_variables: BTreeSet<String> = qpp
            .inner_nodes()
            .into_iter()
            .chain(qpp.relationship_variables())
            .map(|v| v.to_string())
            .collect();

        let mut pending: Vec<Expression> = classification
            .selections
            .iter()
            .map(|s| s.predicate.clone())
            .chain(classification.extracted.iter().map(|e| e.per_step_predicate()))
            .collect();

        let mut arguments: BTreeSet<String> = BTreeSet::new();
        arguments.insert(inner_start.to_string());
        for predicate in &pending {
            arguments.extend(
                predicate
                    .dependencies()
                    .into_iter()
                    .filter(|d| !inner_variables.contains(d) && bound.contains(d)),
            );
        }
        arguments.extend(siblings.iter().map(|s| s.variable.clone()));

        let mut scope = arguments.clone();
        let mut plan = self.ctx.finish(
            arena,
            Operator::Argument {
                variables: arguments.into_iter().collect(),
            },
            Vec::new(),
        )?;
        let ready = take_ready(&mut pending, &scope);
        plan = self.ctx.filter(arena, plan, ready)?;

        for (index, step) in steps.iter().enumerate() {
            let mode = if scope.contains(&step.to) {
                ExpansionMode::Into
            } else {
                ExpansionMode::All
            };
            plan = self.ctx.finish(
                arena,
                Operator::Expand {
                    input: Box::new(plan),
                    from: step.from.clone(),
                    relationship: step.relationship.clone(),
                    to: step.to.clone(),
                    direction: step.direction,
                    types: step.types.clone(),
                    mode,
                },
                Vec::new(),
            )?;
            scope.insert(step.relationship.clone());
            scope.insert(step.to.clone());

            let mut ready = take_ready(&mut pending, &scope);
            ready.extend(step_uniqueness(steps, index, siblings));
            trace!("after {}: {} inner predicates", step.relationship, ready.len());
            plan = self.ctx.filter(arena, plan, ready)?;
        }

        if let Some(unsolved) = pending.first() {
            let missing: Vec<String> = unsolved
                .dependencies()
                .into_iter()
                .filter(|d| !scope.contains(d))
                .collect();
            return Err(PlanningError::UnsolvablePredicate {
                predicate: unsolved.to_string(),
                missing,
            });
        }
        Ok(plan)
    }
}

/// Remove and return, in order, the predicates whose dependencies are bound
fn take_ready(pending: &mut Vec<Expression>, scope: &BTreeSet<String>) -> Vec<Expression> {
    let (ready, rest): (Vec<Expression>, Vec<Expression>) = pending
        .drain(..)
        .partition(|p| p.dependencies().iter().all(|d| scope.contains(d)));
    *pending = rest;
    ready
}

/// Uniqueness predicates for the relationship bound by `steps[index]`
fn step_uniqueness(
    steps: &[TrailStep],
    index: usize,
    siblings: &[&RelationshipProducer],
) -> Vec<Expression> {
    let step = &steps[index];
    let variable = || Expression::variable(step.relationship.as_str());
    let step_types = type_set(&step.types);

    let mut predicates = vec![Expression::function(REPEAT_TRAIL_UNIQUE, vec![variable()])];
    for earlier in &steps[..index] {
        if types_overlap(&step_types, &type_set(&earlier.types)) {
            predicates.push(Expression::not(Expression::equals(
                variable(),
                Expression::variable(earlier.relationship.as_str()),
            )));
        }
    }
    for sibling in siblings {
        if !types_overlap(&step_types, &sibling.types) {
            continue;
        }
        let other = Expression::variable(sibling.variable.as_str());
        predicates.push(match sibling.form {
            RelationshipForm::Single => Expression::not(Expression::equals(variable(), other)),
            RelationshipForm::List => Expression::not(Expression::in_list(variable(), other)),
        });
    }
    predicates
}

fn type_set(types: &[String]) -> Option<BTreeSet<String>> {
    if types.is_empty() {
        None
    } else {
        Some(types.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pattern::{
        NodeBinding, PatternRelationship, Repetition, SemanticDirection,
    };
    use crate::plan::context::fixture::ContextFixture;
    use crate::plan::cost::Statistics;

    fn statistics() -> Statistics {
        Statistics::new(1000, 4000).with_label("A", 10)
    }

    fn single_qpp(repetition: Repetition) -> QuantifiedPathPattern {
        QuantifiedPathPattern::builder(NodeBinding::new("a", "n"), NodeBinding::new("b", "m"))
            .relationship(PatternRelationship::new(
                "r",
                "n",
                "m",
                SemanticDirection::Outgoing,
            ))
            .repetition(repetition)
            .group_by_name()
            .build()
            .unwrap()
    }

    fn scan(ctx: &PlanningContext<'_>, arena: &mut PlanArena, variable: &str) -> PlanNode {
        ctx.finish(
            arena,
            Operator::AllNodesScan {
                variable: variable.to_string(),
            },
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_single_relationship_collapses_to_var_length_expand() {
        let fixture = ContextFixture::new(statistics());
        let ctx = fixture.context();
        let mut arena = PlanArena::new();
        let source = scan(&ctx, &mut arena, "a");
        let qpp = single_qpp(Repetition::one_or_more());

        let planned = OperatorSelector::new(&ctx)
            .plan_qpp(&mut arena, &source, &QppRequest::new(&qpp))
            .unwrap();

        assert_eq!(planned.operator, OperatorKind::VarLengthExpand);
        assert_eq!(planned.direction, TraversalDirection::Forward);
        assert_eq!(
            planned.plan.operator.describe(),
            "VarLengthExpand(All) (a)-[r*1..]->(b)"
        );
    }

    #[test]
    fn test_any_selection_forces_trail() {
        let fixture = ContextFixture::new(statistics());
        let ctx = fixture.context();
        let mut arena = PlanArena::new();
        let source = scan(&ctx, &mut arena, "a");
        let qpp = QuantifiedPathPattern::builder(
            NodeBinding::new("a", "n"),
            NodeBinding::new("b", "m"),
        )
        .relationship(PatternRelationship::new("r", "n", "m", SemanticDirection::Outgoing))
        .selection(Expression::boolean(true))
        .group_by_name()
        .build()
        .unwrap();

        let planned = OperatorSelector::new(&ctx)
            .plan_qpp(&mut arena, &source, &QppRequest::new(&qpp))
            .unwrap();
        assert_eq!(planned.operator, OperatorKind::Trail);
        assert!(!planned.plan.operators().iter().any(|k| k.is_var_expand_family()));
    }

    #[test]
    fn test_bound_far_endpoint_uses_into() {
        let fixture = ContextFixture::new(statistics());
        let ctx = fixture.context();
        let mut arena = PlanArena::new();
        let left = scan(&ctx, &mut arena, "a");
        let right = scan(&ctx, &mut arena, "b");
        let qpp = single_qpp(Repetition::one_or_more());

        let planned = OperatorSelector::new(&ctx)
            .plan_qpp_between(&mut arena, left, right, &QppRequest::new(&qpp))
            .unwrap();

        // Symmetric costs keep the textual direction
        assert_eq!(planned.direction, TraversalDirection::Forward);
        assert!(matches!(
            planned.plan.operator,
            Operator::VarLengthExpand {
                mode: ExpansionMode::Into,
                ..
            }
        ));
    }

    #[test]
    fn test_pruning_variants() {
        let mut fixture = ContextFixture::new(statistics());
        let qpp_plus = single_qpp(Repetition::one_or_more());
        let qpp_bounded = single_qpp(Repetition::new(2, UpperBound::Limited(4)).unwrap());
        let qpp_unbounded = single_qpp(Repetition::new(2, UpperBound::Unlimited).unwrap());

        let plan_kind = |fixture: &ContextFixture, qpp: &QuantifiedPathPattern| {
            let ctx = fixture.context();
            let mut arena = PlanArena::new();
            let source = scan(&ctx, &mut arena, "a");
            let mut request = QppRequest::new(qpp);
            request.distinct_endpoints_only = true;
            OperatorSelector::new(&ctx)
                .plan_qpp(&mut arena, &source, &request)
                .unwrap()
                .operator
        };

        assert_eq!(plan_kind(&fixture, &qpp_plus), OperatorKind::BfsPruningVarExpand);
        assert_eq!(plan_kind(&fixture, &qpp_bounded), OperatorKind::PruningVarExpand);
        assert_eq!(plan_kind(&fixture, &qpp_unbounded), OperatorKind::VarLengthExpand);

        fixture.config.bfs_pruning_supported = false;
        assert_eq!(plan_kind(&fixture, &qpp_plus), OperatorKind::VarLengthExpand);

        fixture.config.enable_pruning_var_expand = false;
        assert_eq!(plan_kind(&fixture, &qpp_bounded), OperatorKind::VarLengthExpand);
    }

    #[test]
    fn test_group_predicates_by_kind() {
        let fixture = ContextFixture::new(statistics());
        let ctx = fixture.context();
        let mut arena = PlanArena::new();
        let source = scan(&ctx, &mut arena, "a");
        let qpp = single_qpp(Repetition::one_or_more());
        let over_relationships = Expression::all_in(
            "x",
            Expression::variable("r"),
            Expression::equals(Expression::property("x", "w"), Expression::integer(1)),
        );
        let over_nodes = Expression::all_in(
            "x",
            Expression::variable("n"),
            Expression::has_labels("x", &["A"]),
        );

        let mut request = QppRequest::new(&qpp);
        request.outer_predicates.push(over_relationships.clone());
        let planned = OperatorSelector::new(&ctx)
            .plan_qpp(&mut arena, &source, &request)
            .unwrap();
        let Operator::VarLengthExpand {
            node_predicates,
            relationship_predicates,
            ..
        } = &planned.plan.operator
        else {
            panic!("expected VarLengthExpand, got {:?}", planned.operator);
        };
        assert!(node_predicates.is_empty());
        assert_eq!(relationship_predicates.len(), 1);
        assert_eq!(planned.solved_outer, vec![over_relationships]);

        let mut request = QppRequest::new(&qpp);
        request.outer_predicates.push(over_nodes);
        let planned = OperatorSelector::new(&ctx)
            .plan_qpp(&mut arena, &source, &request)
            .unwrap();
        assert_eq!(planned.operator, OperatorKind::Trail);
    }

    #[test]
    fn test_needed_node_group_builds_trail() {
        let fixture = ContextFixture::new(statistics());
        let ctx = fixture.context();
        let mut arena = PlanArena::new();
        let source = scan(&ctx, &mut arena, "a");
        let qpp = single_qpp(Repetition::zero_or_more());
        let mut request = QppRequest::new(&qpp);
        request.downstream.insert("n".to_string());

        let planned = OperatorSelector::new(&ctx)
            .plan_qpp(&mut arena, &source, &request)
            .unwrap();

        let Operator::Trail {
            inner, parameters, ..
        } = &planned.plan.operator
        else {
            panic!("expected Trail, got {:?}", planned.operator);
        };
        assert_eq!(parameters.group_nodes.len(), 1);
        assert!(parameters.group_relationships.is_empty());
        assert_eq!(
            inner.operators(),
            vec![
                OperatorKind::Filter,
                OperatorKind::Expand,
                OperatorKind::Argument
            ]
        );
        assert_eq!(
            inner.filter_predicates(),
            vec![Expression::function(
                REPEAT_TRAIL_UNIQUE,
                vec![Expression::variable("r")]
            )]
        );
    }

    #[test]
    fn test_two_step_trail_uniqueness_and_sibling_exclusion() {
        let fixture = ContextFixture::new(statistics());
        let ctx = fixture.context();
        let mut arena = PlanArena::new();
        let source = ctx
            .finish(
                &mut arena,
                Operator::Argument {
                    variables: vec!["a".into(), "x".into()],
                },
                vec![],
            )
            .unwrap();
        let qpp = QuantifiedPathPattern::builder(
            NodeBinding::new("a", "n"),
            NodeBinding::new("b", "o"),
        )
        .relationship(PatternRelationship::new("r", "n", "m", SemanticDirection::Outgoing))
        .relationship(PatternRelationship::new("s", "m", "o", SemanticDirection::Outgoing))
        .group_by_name()
        .build()
        .unwrap();
        let mut request = QppRequest::new(&qpp);
        request.siblings = vec![RelationshipProducer::single(0, "x", None)];

        let planned = OperatorSelector::new(&ctx)
            .plan_qpp(&mut arena, &source, &request)
            .unwrap();
        assert!(planned.discharged_siblings);

        let Operator::Trail {
            inner, parameters, ..
        } = &planned.plan.operator
        else {
            panic!("expected Trail");
        };
        assert_eq!(parameters.previously_bound_relationships, vec!["x"]);
        let rendered: Vec<String> = inner
            .filter_predicates()
            .iter()
            .map(|p| p.to_string())
            .collect();
        // Pre-order: the filter after `s` comes first
        assert_eq!(
            rendered,
            vec![
                "isRepeatTrailUnique(s)",
                "NOT s = r",
                "NOT s = x",
                "isRepeatTrailUnique(r)",
                "NOT r = x",
            ]
        );
    }

    #[test]
    fn test_unsolvable_selection_fails() {
        let fixture = ContextFixture::new(statistics());
        let ctx = fixture.context();
        let mut arena = PlanArena::new();
        let source = scan(&ctx, &mut arena, "a");
        let qpp = QuantifiedPathPattern::builder(
            NodeBinding::new("a", "n"),
            NodeBinding::new("b", "m"),
        )
        .relationship(PatternRelationship::new("r", "n", "m", SemanticDirection::Outgoing))
        .selection(Expression::equals(
            Expression::property("m", "x"),
            Expression::property("c", "x"),
        ))
        .group_by_name()
        .build()
        .unwrap();

        let err = OperatorSelector::new(&ctx)
            .plan_qpp(&mut arena, &source, &QppRequest::new(&qpp))
            .unwrap_err();
        assert_eq!(
            err,
            PlanningError::UnsolvablePredicate {
                predicate: "m.x = c.x".to_string(),
                missing: vec!["c".to_string()],
            }
        );
    }

    #[test]
    fn test_reversed_when_only_right_is_bound() {
        let fixture = ContextFixture::new(statistics());
        let ctx = fixture.context();
        let mut arena = PlanArena::new();
        let source = scan(&ctx, &mut arena, "b");
        let qpp = single_qpp(Repetition::one_or_more());
        let mut request = QppRequest::new(&qpp);
        request.downstream.insert("m".to_string());

        let planned = OperatorSelector::new(&ctx)
            .plan_qpp(&mut arena, &source, &request)
            .unwrap();
        assert_eq!(planned.direction, TraversalDirection::Reversed);
        let Operator::Trail { parameters, .. } = &planned.plan.operator else {
            panic!("expected Trail");
        };
        assert!(parameters.reverse_group_variable_projections);
        assert_eq!(parameters.start, "b");
        assert_eq!(parameters.inner_start, "m");
    }
}
