// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Physical plan representation
//!
//! The operator set is closed: every consumer (cost model, composer, plan
//! rendering) matches it exhaustively. Each node carries a `PlanId`; the
//! estimates and solved predicates of a node live in the `PlanArena` rather
//! than on the node itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ir::expression::Expression;
use crate::ir::pattern::{render_step, var_length_suffix, SemanticDirection, UpperBound};
use crate::plan::attributes::PlanId;
use crate::plan::trail::TrailParameters;

/// Whether an expansion binds its far endpoint or checks it against an
/// already bound node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpansionMode {
    All,
    Into,
}

/// Predicate evaluated for every node or relationship a var-length
/// traversal visits, bound to `variable` during evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariablePredicate {
    pub variable: String,
    pub predicate: Expression,
}

impl VariablePredicate {
    pub fn new(variable: impl Into<String>, predicate: Expression) -> Self {
        Self {
            variable: variable.into(),
            predicate,
        }
    }
}

/// Why an Eager barrier was placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EagerReason {
    pub description: String,
    /// The conflicting writer
    pub writer: PlanId,
}

/// A physical operator together with its id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanNode {
    pub id: PlanId,
    pub operator: Operator,
}

/// Physical operators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operator {
    /// Produces one row holding variables bound by the enclosing scope
    Argument { variables: Vec<String> },

    AllNodesScan { variable: String },

    NodeByLabelScan { variable: String, label: String },

    NodeIndexSeek {
        variable: String,
        label: String,
        property: String,
        value: Expression,
        unique: bool,
    },

    /// Single hop
    Expand {
        input: Box<PlanNode>,
        from: String,
        relationship: String,
        to: String,
        direction: SemanticDirection,
        types: Vec<String>,
        mode: ExpansionMode,
    },

    /// Multi hop, binds `relationship` to the list of traversed relationships
    VarLengthExpand {
        input: Box<PlanNode>,
        from: String,
        relationship: String,
        to: String,
        direction: SemanticDirection,
        types: Vec<String>,
        min: u32,
        max: UpperBound,
        node_predicates: Vec<VariablePredicate>,
        relationship_predicates: Vec<VariablePredicate>,
        mode: ExpansionMode,
    },

    /// Depth-first var-length expansion producing each reachable endpoint once
    PruningVarExpand {
        input: Box<PlanNode>,
        from: String,
        to: String,
        direction: SemanticDirection,
        types: Vec<String>,
        min: u32,
        max: u32,
        node_predicates: Vec<VariablePredicate>,
        relationship_predicates: Vec<VariablePredicate>,
    },

    /// Breadth-first variant of `PruningVarExpand`
    BfsPruningVarExpand {
        input: Box<PlanNode>,
        from: String,
        to: String,
        direction: SemanticDirection,
        types: Vec<String>,
        include_start: bool,
        max: UpperBound,
        node_predicates: Vec<VariablePredicate>,
        relationship_predicates: Vec<VariablePredicate>,
    },

    /// Runs `inner` once per repetition, threading inner end to inner start
    Trail {
        input: Box<PlanNode>,
        inner: Box<PlanNode>,
        parameters: TrailParameters,
    },

    Filter {
        input: Box<PlanNode>,
        predicates: Vec<Expression>,
    },

    CartesianProduct {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
    },

    NodeHashJoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        nodes: Vec<String>,
    },

    Eager {
        input: Box<PlanNode>,
        reasons: Vec<EagerReason>,
    },
}

/// Operator kinds, used for plan inspection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Argument,
    AllNodesScan,
    NodeByLabelScan,
    NodeIndexSeek,
    Expand,
    VarLengthExpand,
    PruningVarExpand,
    BfsPruningVarExpand,
    Trail,
    Filter,
    CartesianProduct,
    NodeHashJoin,
    Eager,
}

impl OperatorKind {
    pub fn is_var_expand_family(&self) -> bool {
        matches!(
            self,
            OperatorKind::VarLengthExpand
                | OperatorKind::PruningVarExpand
                | OperatorKind::BfsPruningVarExpand
        )
    }
}

impl Operator {
    pub fn kind(&self) -> OperatorKind {
        match self {
            Operator::Argument { .. } => OperatorKind::Argument,
            Operator::AllNodesScan { .. } => OperatorKind::AllNodesScan,
            Operator::NodeByLabelScan { .. } => OperatorKind::NodeByLabelScan,
            Operator::NodeIndexSeek { .. } => OperatorKind::NodeIndexSeek,
            Operator::Expand { .. } => OperatorKind::Expand,
            Operator::VarLengthExpand { .. } => OperatorKind::VarLengthExpand,
            Operator::PruningVarExpand { .. } => OperatorKind::PruningVarExpand,
            Operator::BfsPruningVarExpand { .. } => OperatorKind::BfsPruningVarExpand,
            Operator::Trail { .. } => OperatorKind::Trail,
            Operator::Filter { .. } => OperatorKind::Filter,
            Operator::CartesianProduct { .. } => OperatorKind::CartesianProduct,
            Operator::NodeHashJoin { .. } => OperatorKind::NodeHashJoin,
            Operator::Eager { .. } => OperatorKind::Eager,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Operator::Argument { .. }
                | Operator::AllNodesScan { .. }
                | Operator::NodeByLabelScan { .. }
                | Operator::NodeIndexSeek { .. }
        )
    }

    /// Child plans; for Trail the input comes before the inner plan
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            Operator::Argument { .. }
            | Operator::AllNodesScan { .. }
            | Operator::NodeByLabelScan { .. }
            | Operator::NodeIndexSeek { .. } => Vec::new(),
            Operator::Expand { input, .. }
            | Operator::VarLengthExpand { input, .. }
            | Operator::PruningVarExpand { input, .. }
            | Operator::BfsPruningVarExpand { input, .. }
            | Operator::Filter { input, .. }
            | Operator::Eager { input, .. } => vec![input.as_ref()],
            Operator::Trail { input, inner, .. } => vec![input.as_ref(), inner.as_ref()],
            Operator::CartesianProduct { left, right }
            | Operator::NodeHashJoin { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut PlanNode> {
        match self {
            Operator::Argument { .. }
            | Operator::AllNodesScan { .. }
            | Operator::NodeByLabelScan { .. }
            | Operator::NodeIndexSeek { .. } => Vec::new(),
            Operator::Expand { input, .. }
            | Operator::VarLengthExpand { input, .. }
            | Operator::PruningVarExpand { input, .. }
            | Operator::BfsPruningVarExpand { input, .. }
            | Operator::Filter { input, .. }
            | Operator::Eager { input, .. } => vec![input.as_mut()],
            Operator::Trail { input, inner, .. } => vec![input.as_mut(), inner.as_mut()],
            Operator::CartesianProduct { left, right }
            | Operator::NodeHashJoin { left, right, .. } => vec![left.as_mut(), right.as_mut()],
        }
    }

    /// One-line description used by plan rendering
    pub fn describe(&self) -> String {
        match self {
            Operator::Argument { variables } => format!("Argument({})", variables.join(", ")),
            Operator::AllNodesScan { variable } => format!("AllNodesScan({})", variable),
            Operator::NodeByLabelScan { variable, label } => {
                format!("NodeByLabelScan({}:{})", variable, label)
            }
            Operator::NodeIndexSeek {
                variable,
                label,
                property,
                value,
                unique,
            } => format!(
                "{}({}:{} {{{} = {}}})",
                if *unique {
                    "NodeUniqueIndexSeek"
                } else {
                    "NodeIndexSeek"
                },
                variable,
                label,
                property,
                value
            ),
            Operator::Expand {
                from,
                relationship,
                to,
                direction,
                types,
                mode,
                ..
            } => format!(
                "Expand({:?}) {}",
                mode,
                render_step(from, relationship, types, "", *direction, to)
            ),
            Operator::VarLengthExpand {
                from,
                relationship,
                to,
                direction,
                types,
                min,
                max,
                node_predicates,
                relationship_predicates,
                mode,
                ..
            } => format!(
                "VarLengthExpand({:?}) {}{}",
                mode,
                render_step(
                    from,
                    relationship,
                    types,
                    &var_length_suffix(*min, *max),
                    *direction,
                    to
                ),
                describe_variable_predicates(node_predicates, relationship_predicates)
            ),
            Operator::PruningVarExpand {
                from,
                to,
                direction,
                types,
                min,
                max,
                node_predicates,
                relationship_predicates,
                ..
            } => format!(
                "PruningVarExpand {}{}",
                render_step(
                    from,
                    "",
                    types,
                    &var_length_suffix(*min, UpperBound::Limited(*max)),
                    *direction,
                    to
                ),
                describe_variable_predicates(node_predicates, relationship_predicates)
            ),
            Operator::BfsPruningVarExpand {
                from,
                to,
                direction,
                types,
                include_start,
                max,
                node_predicates,
                relationship_predicates,
                ..
            } => format!(
                "BFSPruningVarExpand {}{}",
                render_step(
                    from,
                    "",
                    types,
                    &var_length_suffix(if *include_start { 0 } else { 1 }, *max),
                    *direction,
                    to
                ),
                describe_variable_predicates(node_predicates, relationship_predicates)
            ),
            Operator::Trail { parameters, .. } => format!("Trail{}", parameters),
            Operator::Filter { predicates, .. } => {
                let rendered: Vec<String> = predicates.iter().map(|p| p.to_string()).collect();
                format!("Filter({})", rendered.join(" AND "))
            }
            Operator::CartesianProduct { .. } => "CartesianProduct".to_string(),
            Operator::NodeHashJoin { nodes, .. } => {
                format!("NodeHashJoin({})", nodes.join(", "))
            }
            Operator::Eager { reasons, .. } => {
                let rendered: Vec<String> = reasons
                    .iter()
                    .map(|r| format!("{} (writer {})", r.description, r.writer))
                    .collect();
                format!("Eager({})", rendered.join("; "))
            }
        }
    }
}

fn describe_variable_predicates(
    node_predicates: &[VariablePredicate],
    relationship_predicates: &[VariablePredicate],
) -> String {
    let mut parts = Vec::new();
    if !node_predicates.is_empty() {
        let rendered: Vec<String> = node_predicates
            .iter()
            .map(|p| p.predicate.to_string())
            .collect();
        parts.push(format!("nodes: {}", rendered.join(", ")));
    }
    if !relationship_predicates.is_empty() {
        let rendered: Vec<String> = relationship_predicates
            .iter()
            .map(|p| p.predicate.to_string())
            .collect();
        parts.push(format!("relationships: {}", rendered.join(", ")));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE [{}]", parts.join("; "))
    }
}

impl PlanNode {
    pub fn new(id: PlanId, operator: Operator) -> Self {
        Self { id, operator }
    }

    pub fn kind(&self) -> OperatorKind {
        self.operator.kind()
    }

    /// Variables bound in every row this plan produces
    pub fn available_variables(&self) -> BTreeSet<String> {
        let mut variables = BTreeSet::new();
        self.collect_available(&mut variables);
        variables
    }

    fn collect_available(&self, variables: &mut BTreeSet<String>) {
        match &self.operator {
            Operator::Argument { variables: bound } => {
                variables.extend(bound.iter().cloned());
            }
            Operator::AllNodesScan { variable }
            | Operator::NodeByLabelScan { variable, .. }
            | Operator::NodeIndexSeek { variable, .. } => {
                variables.insert(variable.clone());
            }
            Operator::Expand {
                input,
                from,
                relationship,
                to,
                ..
            }
            | Operator::VarLengthExpand {
                input,
                from,
                relationship,
                to,
                ..
            } => {
                input.collect_available(variables);
                variables.insert(from.clone());
                variables.insert(relationship.clone());
                variables.insert(to.clone());
            }
            Operator::PruningVarExpand { input, from, to, .. }
            | Operator::BfsPruningVarExpand { input, from, to, .. } => {
                input.collect_available(variables);
                variables.insert(from.clone());
                variables.insert(to.clone());
            }
            Operator::Trail {
                input, parameters, ..
            } => {
                // The inner plan's variables stay inside the loop
                input.collect_available(variables);
                variables.insert(parameters.end.clone());
                variables.extend(parameters.group_nodes.iter().map(|g| g.group.clone()));
                variables.extend(
                    parameters
                        .group_relationships
                        .iter()
                        .map(|g| g.group.clone()),
                );
            }
            Operator::Filter { input, .. } | Operator::Eager { input, .. } => {
                input.collect_available(variables)
            }
            Operator::CartesianProduct { left, right }
            | Operator::NodeHashJoin { left, right, .. } => {
                left.collect_available(variables);
                right.collect_available(variables);
            }
        }
    }

    /// Pre-order list of operator kinds, Trail inner plans included
    pub fn operators(&self) -> Vec<OperatorKind> {
        let mut kinds = Vec::new();
        self.visit(&mut |node| kinds.push(node.kind()));
        kinds
    }

    pub fn contains(&self, kind: OperatorKind) -> bool {
        self.operators().contains(&kind)
    }

    /// Pre-order traversal
    pub fn visit<F: FnMut(&PlanNode)>(&self, visitor: &mut F) {
        visitor(self);
        for child in self.operator.children() {
            child.visit(visitor);
        }
    }

    pub fn find(&self, id: PlanId) -> Option<&PlanNode> {
        if self.id == id {
            return Some(self);
        }
        self.operator
            .children()
            .into_iter()
            .find_map(|child| child.find(id))
    }

    /// Predicates of every Filter in this subtree, pre-order
    pub fn filter_predicates(&self) -> Vec<Expression> {
        let mut predicates = Vec::new();
        self.visit(&mut |node| {
            if let Operator::Filter { predicates: p, .. } = &node.operator {
                predicates.extend(p.iter().cloned());
            }
        });
        predicates
    }
}
