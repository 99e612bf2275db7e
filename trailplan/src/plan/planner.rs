// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planner entry point
//!
//! `QppPlanner` owns the collaborators of a planning run (configuration,
//! statistics, cost estimator, leaf planner, shape comparator and the
//! cancellation token) and turns a `MatchGraph` into a `PlannedQuery`.

use log::{debug, info};
use serde::Serialize;

use crate::ir::match_graph::MatchGraph;
use crate::plan::attributes::PlanArena;
use crate::plan::cancel::CancellationToken;
use crate::plan::composer::Composer;
use crate::plan::config::PlannerConfig;
use crate::plan::context::PlanningContext;
use crate::plan::cost::{CostComparator, CostEstimator, CostModel, ShapeComparator, Statistics};
use crate::plan::eager::{splice_eager, ConflictAnalyzer};
use crate::plan::error::{PlanningError, PlanningResult};
use crate::plan::leaf::{DefaultLeafPlanner, LeafPlanner};
use crate::plan::physical::PlanNode;
use crate::plan::trace::{
    format_plan, PlanTrace, PlanTracer, PlanningPhase, TraceMetadata, TraceStep,
};

/// Result of planning one MATCH clause
#[derive(Debug, Clone, Serialize)]
pub struct PlannedQuery {
    pub root: PlanNode,
    #[serde(skip)]
    pub arena: PlanArena,
    pub trace: PlanTrace,
}

impl PlannedQuery {
    /// EXPLAIN-style rendering of the operator tree
    pub fn explain(&self) -> String {
        format_plan(&self.root, &self.arena)
    }

    pub fn to_json(&self) -> PlanningResult<String> {
        serde_json::to_string_pretty(&self.root).map_err(PlanningError::serialization)
    }
}

/// Plans MATCH graphs containing quantified path patterns
pub struct QppPlanner {
    config: PlannerConfig,
    statistics: Statistics,
    estimator: Box<dyn CostEstimator>,
    leaf_planner: Box<dyn LeafPlanner>,
    comparator: Box<dyn ShapeComparator>,
    cancellation: CancellationToken,
}

impl QppPlanner {
    /// Planner with the default cost model, leaf planner and comparator
    pub fn new(config: PlannerConfig, statistics: Statistics) -> Self {
        Self {
            config,
            statistics,
            estimator: Box::new(CostModel::new()),
            leaf_planner: Box::new(DefaultLeafPlanner::new()),
            comparator: Box::new(CostComparator),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_estimator(mut self, estimator: Box<dyn CostEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_leaf_planner(mut self, leaf_planner: Box<dyn LeafPlanner>) -> Self {
        self.leaf_planner = leaf_planner;
        self
    }

    pub fn with_comparator(mut self, comparator: Box<dyn ShapeComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Token callers may cancel from another thread
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    fn context(&self) -> PlanningContext<'_> {
        PlanningContext::new(
            &self.config,
            &self.statistics,
            self.estimator.as_ref(),
            self.leaf_planner.as_ref(),
            self.comparator.as_ref(),
            &self.cancellation,
        )
    }

    /// Plan one MATCH clause
    pub fn plan(&self, graph: &MatchGraph) -> PlanningResult<PlannedQuery> {
        self.config.validate()?;
        graph.validate()?;

        let ctx = self.context();
        let mut arena = PlanArena::new();
        let mut tracer = PlanTracer::new();
        let root = Composer::new(&ctx).compose(&mut arena, graph, &mut tracer)?;

        let estimate = ctx.estimate(&root)?;
        info!(
            "planned {} connections into {} operators (cost {:.3})",
            graph.connections.len(),
            root.operators().len(),
            estimate.cost
        );
        tracer.record(
            PlanningPhase::Composition,
            "final plan",
            TraceMetadata::with_operator(root.kind()).with_estimates(estimate.rows, estimate.cost),
        );
        Ok(PlannedQuery {
            root,
            arena,
            trace: tracer.finalize(),
        })
    }

    /// Plan, then splice Eager barriers for every conflict `analyzer` reports
    pub fn plan_with_conflicts(
        &self,
        graph: &MatchGraph,
        analyzer: &dyn ConflictAnalyzer,
    ) -> PlanningResult<PlannedQuery> {
        let PlannedQuery {
            mut root,
            mut arena,
            trace,
        } = self.plan(graph)?;
        let ctx = self.context();
        let mut steps = trace.steps;

        for request in analyzer.conflicts(&root)? {
            debug!("splicing Eager for reader {}", request.reader);
            root = splice_eager(&ctx, &mut arena, root, &request)?;
            steps.push(TraceStep {
                phase: PlanningPhase::EagerSplicing,
                description: format!(
                    "Eager above {}: {}",
                    request.reader, request.reason.description
                ),
                duration: Default::default(),
                metadata: TraceMetadata::empty(),
            });
        }

        Ok(PlannedQuery {
            root,
            arena,
            trace: PlanTrace {
                steps,
                total_duration: trace.total_duration,
            },
        })
    }
}
