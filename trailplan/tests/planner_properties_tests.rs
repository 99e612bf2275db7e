//! Planner-wide properties: operator choice, uniqueness, determinism,
//! cancellation, configuration and Eager splicing

#[path = "testutils/mod.rs"]
mod testutils;

use testutils::plan_fixture::{count_kind, find_first, simple_qpp, PlanFixture};
use trailplan::ir::{
    Expression, MatchGraph, NodeBinding, PatternRelationship, QuantifiedPathPattern, Repetition,
    SemanticDirection, UpperBound,
};
use trailplan::plan::attributes::PlanId;
use trailplan::plan::cost::Estimate;
use trailplan::plan::eager::{ConflictAnalyzer, EagerRequest};
use trailplan::plan::physical::{ExpansionMode, Operator, OperatorKind, PlanNode};
use trailplan::{
    CostEstimator, PlannerConfig, PlanningError, PlanningResult, QppPlanner, ShapeComparator,
    Statistics,
};

fn two_node_graph(qpp: QuantifiedPathPattern) -> MatchGraph {
    MatchGraph::new().node("a", &[]).node("b", &[]).quantified(qpp)
}

#[test]
fn test_any_per_repetition_predicate_forces_trail() {
    let fixture = PlanFixture::new();
    let selections = [
        Expression::boolean(true),
        Expression::equals(Expression::property("r", "w"), Expression::integer(1)),
        Expression::has_labels("m", &["User"]),
    ];

    for selection in selections {
        let qpp = QuantifiedPathPattern::builder(
            NodeBinding::new("a", "n"),
            NodeBinding::new("b", "m"),
        )
        .relationship(PatternRelationship::new(
            "r",
            "n",
            "m",
            SemanticDirection::Outgoing,
        ))
        .selection(selection.clone())
        .group_by_name()
        .build()
        .unwrap();

        let planned = fixture.plan(&two_node_graph(qpp));
        assert!(
            planned.root.contains(OperatorKind::Trail),
            "{} did not force a Trail",
            selection
        );
        assert!(!planned
            .root
            .operators()
            .iter()
            .any(|k| k.is_var_expand_family()));
    }
}

#[test]
fn test_huge_lower_bound_plans_a_trail() {
    let fixture = PlanFixture::new();
    let qpp = QuantifiedPathPattern::builder(NodeBinding::new("a", "n"), NodeBinding::new("b", "m"))
        .relationship(PatternRelationship::new(
            "r",
            "n",
            "m",
            SemanticDirection::Outgoing,
        ))
        .repetition(Repetition::new(4_000_000_000, UpperBound::Unlimited).unwrap())
        .selection(Expression::boolean(true))
        .group_by_name()
        .build()
        .unwrap();

    let planned = fixture.plan(&two_node_graph(qpp));
    let trail = find_first(&planned.root, OperatorKind::Trail).unwrap();
    let Operator::Trail { parameters, .. } = &trail.operator else {
        unreachable!();
    };
    assert_eq!(parameters.min, 4_000_000_000);
    assert_eq!(parameters.max, UpperBound::Unlimited);
}

#[test]
fn test_self_loop_never_seeds_a_cartesian_product() {
    let planner = QppPlanner::new(
        PlannerConfig::default(),
        testutils::plan_fixture::social_network(),
    )
    .with_comparator(Box::new(AlwaysCartesian));
    let graph = MatchGraph::new()
        .node("a", &["User"])
        .quantified(simple_qpp(("a", "n"), "r", ("a", "m"), &["R"]));

    let planned = planner.plan(&graph).unwrap();
    assert!(!planned.root.contains(OperatorKind::CartesianProduct));
    assert!(matches!(
        planned.root.operator,
        Operator::VarLengthExpand {
            mode: ExpansionMode::Into,
            ..
        }
    ));
}

#[test]
fn test_single_relationship_expands_from_cheaper_side() {
    let fixture = PlanFixture::new();
    let qpp = QuantifiedPathPattern::builder(NodeBinding::new("a", "n"), NodeBinding::new("b", "m"))
        .relationship(PatternRelationship::new(
            "r",
            "n",
            "m",
            SemanticDirection::Outgoing,
        ))
        .repetition(Repetition::new(2, UpperBound::Limited(5)).unwrap())
        .group_by_name()
        .build()
        .unwrap();
    let graph = MatchGraph::new()
        .node("a", &[])
        .node("b", &["User"])
        .quantified(qpp);

    let planned = fixture.plan(&graph);
    assert_eq!(
        planned.root.operator.describe(),
        "VarLengthExpand(All) (b)<-[r*2..5]-(a)"
    );
    assert_eq!(
        planned.root.operator.children()[0].kind(),
        OperatorKind::NodeByLabelScan
    );
}

#[test]
fn test_uniqueness_filter_iff_types_overlap() {
    let fixture = PlanFixture::new();
    let cases: [(&[&str], &[&str], bool); 4] = [
        (&["R"], &["R"], true),
        (&["R"], &["T"], false),
        (&["R"], &[], true),
        (&["R", "T"], &["T"], true),
    ];

    for (first, second, expected) in cases {
        let graph = MatchGraph::new()
            .node("a", &["User"])
            .node("b", &[])
            .node("c", &[])
            .relationship(
                PatternRelationship::new("r", "a", "b", SemanticDirection::Outgoing)
                    .with_types(first),
            )
            .relationship(
                PatternRelationship::new("s", "b", "c", SemanticDirection::Outgoing)
                    .with_types(second),
            );

        let planned = fixture.plan(&graph);
        let has_check = planned
            .root
            .filter_predicates()
            .iter()
            .any(|p| p.to_string() == "NOT r = s");
        assert_eq!(has_check, expected, "types {:?} vs {:?}", first, second);
    }
}

#[test]
fn test_identical_inputs_give_identical_plans() {
    let fixture = PlanFixture::new();
    let graph = MatchGraph::new()
        .node("a", &["User"])
        .node("b", &[])
        .node("c", &["B"])
        .quantified(simple_qpp(("a", "n"), "r", ("b", "m"), &["R"]))
        .quantified(simple_qpp(("b", "x"), "s", ("c", "y"), &[]))
        .selection(Expression::equals(
            Expression::property("c", "prop"),
            Expression::integer(7),
        ))
        .require("m");

    let first = fixture.plan(&graph);
    let second = fixture.plan(&graph);
    assert_eq!(first.root, second.root);
    assert_eq!(first.explain(), second.explain());
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn test_cancelled_token_aborts_planning() {
    let fixture = PlanFixture::new();
    let token = fixture.planner().cancellation_token();
    token.cancel();

    let graph = two_node_graph(simple_qpp(("a", "n"), "r", ("b", "m"), &[]));
    assert_eq!(
        fixture.try_plan(&graph).unwrap_err(),
        PlanningError::Cancelled
    );
}

#[test]
fn test_distinct_endpoints_use_pruning_operators() {
    let plan_with = |config: PlannerConfig, repetition: Repetition| {
        let fixture = PlanFixture::with_config(config, testutils::plan_fixture::social_network());
        let qpp = QuantifiedPathPattern::builder(
            NodeBinding::new("a", "n"),
            NodeBinding::new("b", "m"),
        )
        .relationship(PatternRelationship::new(
            "r",
            "n",
            "m",
            SemanticDirection::Outgoing,
        ))
        .repetition(repetition)
        .group_by_name()
        .build()
        .unwrap();
        let graph = MatchGraph::new()
            .node("a", &["User"])
            .node("b", &[])
            .quantified(qpp)
            .require("b")
            .distinct_endpoints_only();
        fixture.plan(&graph).root
    };

    let bounded = Repetition::new(1, UpperBound::Limited(3)).unwrap();
    let root = plan_with(PlannerConfig::default(), bounded);
    assert!(root.contains(OperatorKind::BfsPruningVarExpand));

    let no_bfs = PlannerConfig::from_json_str(r#"{"bfs_pruning_supported": false}"#).unwrap();
    let root = plan_with(no_bfs.clone(), bounded);
    assert!(root.contains(OperatorKind::PruningVarExpand));

    let root = plan_with(no_bfs, Repetition::one_or_more());
    assert!(root.contains(OperatorKind::VarLengthExpand));

    let no_pruning =
        PlannerConfig::from_json_str(r#"{"enable_pruning_var_expand": false}"#).unwrap();
    let root = plan_with(no_pruning, bounded);
    assert!(root.contains(OperatorKind::VarLengthExpand));

    let no_rewrite =
        PlannerConfig::from_json_str(r#"{"enable_var_expand_rewrite": false}"#).unwrap();
    let root = plan_with(no_rewrite, bounded);
    assert!(root.contains(OperatorKind::Trail));
}

struct AlwaysCartesian;

impl ShapeComparator for AlwaysCartesian {
    fn prefer_cartesian(&self, _single_sided: &Estimate, _cartesian: &Estimate) -> bool {
        true
    }
}

#[test]
fn test_comparator_hook_selects_cartesian_shape() {
    let planner = QppPlanner::new(
        PlannerConfig::default(),
        testutils::plan_fixture::social_network(),
    )
    .with_comparator(Box::new(AlwaysCartesian));
    let graph = two_node_graph(simple_qpp(("a", "n"), "r", ("b", "m"), &[]));

    let planned = planner.plan(&graph).unwrap();
    let root = &planned.root;
    assert!(matches!(
        root.operator,
        Operator::VarLengthExpand {
            mode: ExpansionMode::Into,
            ..
        }
    ));
    assert_eq!(
        root.operator.children()[0].kind(),
        OperatorKind::CartesianProduct
    );
}

struct BrokenEstimator;

impl CostEstimator for BrokenEstimator {
    fn estimate(&self, _plan: &PlanNode, _statistics: &Statistics) -> PlanningResult<Estimate> {
        Err(PlanningError::Estimation("statistics unavailable".to_string()))
    }
}

#[test]
fn test_estimator_failure_aborts_planning() {
    let planner = QppPlanner::new(PlannerConfig::default(), Statistics::new(10, 10))
        .with_estimator(Box::new(BrokenEstimator));
    let graph = MatchGraph::new().node("a", &[]);
    assert!(matches!(
        planner.plan(&graph),
        Err(PlanningError::Estimation(_))
    ));
}

/// Reports the first all-nodes scan as reading what a write at #1000 changes
struct ScanConflicts;

impl ConflictAnalyzer for ScanConflicts {
    fn conflicts(&self, plan: &PlanNode) -> PlanningResult<Vec<EagerRequest>> {
        let scan = find_first(plan, OperatorKind::AllNodesScan)
            .ok_or_else(|| PlanningError::Internal("no scan".to_string()))?;
        Ok(vec![
            EagerRequest::new(scan.id, PlanId(1000), "SET b.prop"),
            EagerRequest::new(scan.id, PlanId(1001), "DELETE r"),
        ])
    }
}

#[test]
fn test_conflicts_splice_a_single_eager() {
    let fixture = PlanFixture::new();
    let graph = two_node_graph(simple_qpp(("a", "n"), "r", ("b", "m"), &[]));

    let planned = fixture
        .planner()
        .plan_with_conflicts(&graph, &ScanConflicts)
        .unwrap();
    assert_eq!(count_kind(&planned.root, OperatorKind::Eager), 1);
    let eager = find_first(&planned.root, OperatorKind::Eager).unwrap();
    let Operator::Eager { input, reasons } = &eager.operator else {
        unreachable!();
    };
    assert_eq!(input.kind(), OperatorKind::AllNodesScan);
    assert_eq!(reasons.len(), 2);
    assert!(planned.arena.cardinality(eager.id).is_ok());
    assert!(planned
        .explain()
        .contains("Eager(SET b.prop (writer #1000); DELETE r (writer #1001))"));
}
