//! Planner fixture for integration tests

use trailplan::ir::{
    Expression, MatchGraph, NodeBinding, PatternRelationship, QuantifiedPathPattern,
    SemanticDirection,
};
use trailplan::plan::physical::{Operator, OperatorKind, PlanNode};
use trailplan::plan::trail::TrailParameters;
use trailplan::{PlannedQuery, PlannerConfig, PlanningResult, QppPlanner, Statistics};

/// Initialise logging once per test binary
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Statistics of a small social network used by most tests
pub fn social_network() -> Statistics {
    Statistics::new(10_000, 50_000)
        .with_label("User", 100)
        .with_label("B", 500)
        .with_relationship_type("R", 20_000)
        .with_relationship_type("T", 30_000)
        .with_index("B", "prop", false)
}

/// A planner over a statistics snapshot
pub struct PlanFixture {
    planner: QppPlanner,
}

impl PlanFixture {
    pub fn new() -> Self {
        Self::with_statistics(social_network())
    }

    pub fn with_statistics(statistics: Statistics) -> Self {
        Self::with_config(PlannerConfig::default(), statistics)
    }

    pub fn with_config(config: PlannerConfig, statistics: Statistics) -> Self {
        init_logging();
        Self {
            planner: QppPlanner::new(config, statistics),
        }
    }

    pub fn planner(&self) -> &QppPlanner {
        &self.planner
    }

    pub fn try_plan(&self, graph: &MatchGraph) -> PlanningResult<PlannedQuery> {
        self.planner.plan(graph)
    }

    /// Plan and print the EXPLAIN rendering on failure paths
    pub fn plan(&self, graph: &MatchGraph) -> PlannedQuery {
        match self.planner.plan(graph) {
            Ok(planned) => {
                log::debug!("\n{}", planned.explain());
                planned
            }
            Err(e) => panic!("planning failed: {}", e),
        }
    }
}

/// Single-relationship QPP `(left) ((inner_left)-[rel:TYPES]->(inner_right)){q} (right)`
/// with every inner variable grouped under its own name
pub fn simple_qpp(
    left: (&str, &str),
    rel: &str,
    right: (&str, &str),
    types: &[&str],
) -> QuantifiedPathPattern {
    QuantifiedPathPattern::builder(
        NodeBinding::new(left.0, left.1),
        NodeBinding::new(right.0, right.1),
    )
    .relationship(
        PatternRelationship::new(rel, left.1, right.1, SemanticDirection::Outgoing)
            .with_types(types),
    )
    .group_by_name()
    .build()
    .expect("valid QPP")
}

pub fn trails(plan: &PlanNode) -> Vec<TrailParameters> {
    let mut found = Vec::new();
    plan.visit(&mut |node| {
        if let Operator::Trail { parameters, .. } = &node.operator {
            found.push(parameters.clone());
        }
    });
    found
}

/// Inner plans of every Trail in `plan`
pub fn trail_inner_plans(plan: &PlanNode) -> Vec<PlanNode> {
    let mut found = Vec::new();
    plan.visit(&mut |node| {
        if let Operator::Trail { inner, .. } = &node.operator {
            found.push(inner.as_ref().clone());
        }
    });
    found
}

pub fn find_first(plan: &PlanNode, kind: OperatorKind) -> Option<PlanNode> {
    let mut found = None;
    plan.visit(&mut |node| {
        if found.is_none() && node.kind() == kind {
            found = Some(node.clone());
        }
    });
    found
}

pub fn count_kind(plan: &PlanNode, kind: OperatorKind) -> usize {
    plan.operators().iter().filter(|k| **k == kind).count()
}

/// Filter predicates outside of Trail inner plans
pub fn outer_filter_predicates(plan: &PlanNode) -> Vec<Expression> {
    let mut predicates = Vec::new();
    collect_outer_filters(plan, &mut predicates);
    predicates
}

fn collect_outer_filters(node: &PlanNode, predicates: &mut Vec<Expression>) {
    match &node.operator {
        Operator::Filter { input, predicates: p } => {
            predicates.extend(p.iter().cloned());
            collect_outer_filters(input, predicates);
        }
        Operator::Trail { input, .. } => collect_outer_filters(input, predicates),
        other => {
            for child in other.children() {
                collect_outer_filters(child, predicates);
            }
        }
    }
}
