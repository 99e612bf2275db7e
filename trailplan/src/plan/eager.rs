// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Eager barrier splicing
//!
//! Conflict detection between reads and writes lives outside the planner.
//! It reports which plan reads data another plan writes, and this module
//! wraps the reader in an `Eager` operator so the read is fully
//! materialized before the write runs.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::plan::attributes::{PlanArena, PlanId};
use crate::plan::context::PlanningContext;
use crate::plan::error::{PlanningError, PlanningResult};
use crate::plan::physical::{EagerReason, Operator, PlanNode};

/// A read/write conflict reported against a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EagerRequest {
    pub reader: PlanId,
    pub reason: EagerReason,
}

impl EagerRequest {
    pub fn new(reader: PlanId, writer: PlanId, description: impl Into<String>) -> Self {
        Self {
            reader,
            reason: EagerReason {
                description: description.into(),
                writer,
            },
        }
    }
}

/// External read/write conflict detection
pub trait ConflictAnalyzer {
    fn conflicts(&self, plan: &PlanNode) -> PlanningResult<Vec<EagerRequest>>;
}

/// Wrap the reader of `request` in an Eager operator
///
/// A reader already below an Eager, or itself an Eager, gets the reason
/// merged into that Eager instead of a second barrier.
pub fn splice_eager(
    ctx: &PlanningContext<'_>,
    arena: &mut PlanArena,
    mut root: PlanNode,
    request: &EagerRequest,
) -> PlanningResult<PlanNode> {
    if root.find(request.reader).is_none() {
        return Err(PlanningError::UnknownPlanId(request.reader));
    }
    if let Some(merged) = merge_into_parent(&mut root, request) {
        return Ok(merged);
    }
    if root.id == request.reader {
        return wrap(ctx, arena, root, request);
    }
    if !splice_below(ctx, arena, &mut root, request)? {
        return Err(PlanningError::Internal(format!(
            "reader {} found but not reachable for splicing",
            request.reader
        )));
    }
    Ok(root)
}

/// Apply every conflict `analyzer` reports for `root`, in order
pub fn apply_conflicts(
    ctx: &PlanningContext<'_>,
    arena: &mut PlanArena,
    root: PlanNode,
    analyzer: &dyn ConflictAnalyzer,
) -> PlanningResult<PlanNode> {
    let requests = analyzer.conflicts(&root)?;
    requests
        .iter()
        .try_fold(root, |plan, request| splice_eager(ctx, arena, plan, request))
}

fn merge_into_parent(node: &mut PlanNode, request: &EagerRequest) -> Option<PlanNode> {
    if let Operator::Eager { input, reasons } = &mut node.operator {
        if input.id == request.reader {
            merge_reason(reasons, &request.reason);
            return Some(node.clone());
        }
    }
    None
}

fn splice_below(
    ctx: &PlanningContext<'_>,
    arena: &mut PlanArena,
    node: &mut PlanNode,
    request: &EagerRequest,
) -> PlanningResult<bool> {
    if let Operator::Eager { input, reasons } = &mut node.operator {
        if input.id == request.reader {
            merge_reason(reasons, &request.reason);
            return Ok(true);
        }
    }

    for child in node.operator.children_mut() {
        if child.id == request.reader {
            let placeholder = PlanNode::new(
                child.id,
                Operator::Argument {
                    variables: Vec::new(),
                },
            );
            let reader = std::mem::replace(child, placeholder);
            *child = wrap(ctx, arena, reader, request)?;
            return Ok(true);
        }
        if splice_below(ctx, arena, child, request)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn wrap(
    ctx: &PlanningContext<'_>,
    arena: &mut PlanArena,
    mut reader: PlanNode,
    request: &EagerRequest,
) -> PlanningResult<PlanNode> {
    if let Operator::Eager { reasons, .. } = &mut reader.operator {
        merge_reason(reasons, &request.reason);
        return Ok(reader);
    }
    debug!(
        "Eager above {} ({}), writer {}",
        reader.id, request.reason.description, request.reason.writer
    );
    ctx.finish(
        arena,
        Operator::Eager {
            input: Box::new(reader),
            reasons: vec![request.reason.clone()],
        },
        Vec::new(),
    )
}

fn merge_reason(reasons: &mut Vec<EagerReason>, reason: &EagerReason) {
    if !reasons.contains(reason) {
        reasons.push(reason.clone());
    }
}
