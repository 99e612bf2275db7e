// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Trailplan - quantified path pattern planning for graph query compilers
//!
//! Trailplan is the planner core that compiles an already analysed MATCH
//! clause into a tree of physical operators. Quantified path patterns such
//! as `(a)((n)-[r]->(m))+(b)` are planned either as the looping `Trail`
//! operator or, when nothing inside the loop is observable, as one of the
//! specialised `VarLengthExpand` operators.
//!
//! # Usage
//!
//! ```ignore
//! let graph = MatchGraph::new()
//!     .node("a", &["User"])
//!     .node("b", &[])
//!     .quantified(qpp)
//!     .require("b");
//! let planner = QppPlanner::new(PlannerConfig::default(), statistics);
//! let planned = planner.plan(&graph)?;
//! println!("{}", planned.explain());
//! ```

pub mod ir;
pub mod plan;

pub use ir::expression::Expression;
pub use ir::match_graph::{Connection, MatchGraph};
pub use ir::pattern::{
    NodeBinding, PatternLength, PatternRelationship, QuantifiedPathPattern, Repetition,
    SemanticDirection, UpperBound, VariableGrouping,
};
pub use plan::cancel::CancellationToken;
pub use plan::config::PlannerConfig;
pub use plan::cost::{CostEstimator, CostModel, Estimate, ShapeComparator, Statistics};
pub use plan::eager::{ConflictAnalyzer, EagerRequest};
pub use plan::error::{PlanningError, PlanningResult};
pub use plan::leaf::{DefaultLeafPlanner, LeafCandidate, LeafPlanner};
pub use plan::physical::{Operator, OperatorKind, PlanNode};
pub use plan::planner::{PlannedQuery, QppPlanner};
pub use plan::trail::{TrailParameters, TraversalDirection};

/// Trailplan version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
