// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan tracing and explanation
//!
//! This module records planner decisions for debugging and renders physical
//! plans as an indented operator tree for EXPLAIN-style output.

use crate::plan::attributes::PlanArena;
use crate::plan::physical::{Operator, OperatorKind, PlanNode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Trace information for one planning run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanTrace {
    pub steps: Vec<TraceStep>,
    pub total_duration: Duration,
}

/// Individual step in the planning process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub phase: PlanningPhase,
    pub description: String,
    pub duration: Duration,
    pub metadata: TraceMetadata,
}

/// Planning phases for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanningPhase {
    ComponentDiscovery,
    StartSelection,
    Expansion,
    QppSelection,
    Composition,
    EagerSplicing,
}

/// Additional metadata for trace steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMetadata {
    pub chosen_operator: Option<OperatorKind>,
    pub variables_in_scope: Vec<String>,
    pub estimated_rows: Option<f64>,
    pub estimated_cost: Option<f64>,
}

impl TraceMetadata {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_operator(operator: OperatorKind) -> Self {
        Self {
            chosen_operator: Some(operator),
            ..Self::default()
        }
    }

    pub fn with_estimates(mut self, rows: f64, cost: f64) -> Self {
        self.estimated_rows = Some(rows);
        self.estimated_cost = Some(cost);
        self
    }

    pub fn with_scope<'v>(mut self, variables: impl IntoIterator<Item = &'v String>) -> Self {
        self.variables_in_scope = variables.into_iter().cloned().collect();
        self
    }
}

/// Builder for creating plan traces
#[derive(Debug)]
pub struct PlanTracer {
    steps: Vec<TraceStep>,
    start_time: Instant,
    current_step_start: Option<Instant>,
}

impl PlanTracer {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            start_time: Instant::now(),
            current_step_start: None,
        }
    }

    /// Start timing a step
    pub fn start_step(&mut self) {
        self.current_step_start = Some(Instant::now());
    }

    /// Finish the step started last and record it
    pub fn end_step(
        &mut self,
        phase: PlanningPhase,
        description: impl Into<String>,
        metadata: TraceMetadata,
    ) {
        let duration = self
            .current_step_start
            .take()
            .map(|start| start.elapsed())
            .unwrap_or_default();
        self.steps.push(TraceStep {
            phase,
            description: description.into(),
            duration,
            metadata,
        });
    }

    /// Record an instantaneous decision
    pub fn record(
        &mut self,
        phase: PlanningPhase,
        description: impl Into<String>,
        metadata: TraceMetadata,
    ) {
        self.start_step();
        self.end_step(phase, description, metadata);
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn finalize(self) -> PlanTrace {
        PlanTrace {
            steps: self.steps,
            total_duration: self.start_time.elapsed(),
        }
    }
}

impl Default for PlanTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanTrace {
    pub fn steps_in(&self, phase: PlanningPhase) -> impl Iterator<Item = &TraceStep> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }

    /// Numbered list of planning steps
    pub fn format_trace(&self) -> String {
        let mut output = String::new();
        output.push_str("Planning Steps\n");
        output.push_str(&"-".repeat(30));
        output.push('\n');
        for (i, step) in self.steps.iter().enumerate() {
            output.push_str(&format!(
                "{}. [{:?}] {} ({:.3}ms)",
                i + 1,
                step.phase,
                step.description,
                step.duration.as_secs_f64() * 1000.0
            ));
            if let (Some(rows), Some(cost)) =
                (step.metadata.estimated_rows, step.metadata.estimated_cost)
            {
                output.push_str(&format!(" → {:.1} rows, cost: {:.3}", rows, cost));
            }
            output.push('\n');
        }
        output.push_str(&format!(
            "Total: {:.3}ms\n",
            self.total_duration.as_secs_f64() * 1000.0
        ));
        output
    }
}

/// Render `root` as an operator tree, one operator per line
///
/// Trail inner plans are rendered below the Trail, after its input.
pub fn format_plan(root: &PlanNode, arena: &PlanArena) -> String {
    let mut output = String::new();
    format_plan_node(root, arena, &mut output, "", true, true);
    output
}

fn format_plan_node(
    node: &PlanNode,
    arena: &PlanArena,
    output: &mut String,
    indent: &str,
    is_last: bool,
    is_root: bool,
) {
    let connector = if is_root {
        ""
    } else if is_last {
        "└── "
    } else {
        "├── "
    };
    let rows = match arena.cardinality(node.id) {
        Ok(rows) => format!("{:.1}", rows),
        Err(_) => "?".to_string(),
    };
    output.push_str(&format!(
        "{}{}{} {} → {} rows\n",
        indent,
        connector,
        node.id,
        node.operator.describe(),
        rows
    ));

    let child_indent = if is_root {
        String::new()
    } else if is_last {
        format!("{}    ", indent)
    } else {
        format!("{}│   ", indent)
    };
    let children = node.operator.children();
    let count = children.len();
    for (i, child) in children.into_iter().enumerate() {
        if let (Operator::Trail { .. }, 1) = (&node.operator, i) {
            output.push_str(&format!("{}{}", child_indent, "│   (per repetition)\n"));
        }
        format_plan_node(child, arena, output, &child_indent, i + 1 == count, false);
    }
}
