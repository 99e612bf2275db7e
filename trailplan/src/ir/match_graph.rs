// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Match graph: the planner's view of one MATCH clause
//!
//! Nodes, the ordered connections between them (plain relationships and
//! quantified path patterns), the WHERE predicates, plus the scope facts the
//! surrounding query contributes: variables bound by earlier clauses and
//! variables read after this MATCH.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::ir::expression::Expression;
use crate::ir::pattern::{PatternRelationship, QuantifiedPathPattern};
use crate::plan::error::{PlanningError, PlanningResult};

/// A node of the pattern with its label constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternNode {
    pub name: String,
    pub labels: Vec<String>,
}

/// Connection between two pattern nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Connection {
    Relationship(PatternRelationship),
    Quantified(QuantifiedPathPattern),
}

impl Connection {
    /// Outer endpoints in textual order
    pub fn endpoints(&self) -> (&str, &str) {
        match self {
            Connection::Relationship(rel) => (rel.left(), rel.right()),
            Connection::Quantified(qpp) => (
                qpp.left_binding().outer.as_str(),
                qpp.right_binding().outer.as_str(),
            ),
        }
    }

    pub fn other_endpoint(&self, node: &str) -> Option<&str> {
        let (left, right) = self.endpoints();
        if node == left {
            Some(right)
        } else if node == right {
            Some(left)
        } else {
            None
        }
    }

    pub fn as_quantified(&self) -> Option<&QuantifiedPathPattern> {
        match self {
            Connection::Quantified(qpp) => Some(qpp),
            Connection::Relationship(_) => None,
        }
    }

    /// Variables visible outside the connection once it is planned
    pub fn exposed_variables(&self) -> Vec<String> {
        match self {
            Connection::Relationship(rel) => vec![rel.variable.clone()],
            Connection::Quantified(qpp) => qpp
                .node_groups()
                .into_iter()
                .chain(qpp.relationship_groups())
                .map(|g| g.to_string())
                .collect(),
        }
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connection::Relationship(rel) => write!(f, "{}", rel),
            Connection::Quantified(qpp) => write!(f, "{}", qpp),
        }
    }
}

/// One MATCH clause, ready for planning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchGraph {
    pub nodes: Vec<PatternNode>,
    pub connections: Vec<Connection>,
    /// WHERE predicates, property maps already folded in
    pub selections: Vec<Expression>,
    /// Variables bound by earlier clauses
    pub argument_ids: BTreeSet<String>,
    /// Variables read after this MATCH
    pub required_variables: BTreeSet<String>,
    /// Downstream only reads distinct boundary nodes (e.g. `RETURN DISTINCT b`)
    pub distinct_endpoints_only: bool,
}

impl MatchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, name: &str, labels: &[&str]) -> Self {
        self.nodes.push(PatternNode {
            name: name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        });
        self
    }

    pub fn relationship(mut self, relationship: PatternRelationship) -> Self {
        self.connections.push(Connection::Relationship(relationship));
        self
    }

    pub fn quantified(mut self, qpp: QuantifiedPathPattern) -> Self {
        self.connections.push(Connection::Quantified(qpp));
        self
    }

    /// Add a WHERE predicate; conjunctions are split during planning
    pub fn selection(mut self, predicate: Expression) -> Self {
        self.selections.push(predicate);
        self
    }

    pub fn argument(mut self, variable: &str) -> Self {
        self.argument_ids.insert(variable.to_string());
        self
    }

    pub fn require(mut self, variable: &str) -> Self {
        self.required_variables.insert(variable.to_string());
        self
    }

    pub fn distinct_endpoints_only(mut self) -> Self {
        self.distinct_endpoints_only = true;
        self
    }

    pub fn find_node(&self, name: &str) -> Option<&PatternNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// One `n:Label` atom per declared label, in node order
    pub fn label_predicates(&self) -> Vec<Expression> {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.labels
                    .iter()
                    .map(move |label| Expression::has_labels(node.name.as_str(), &[label]))
            })
            .collect()
    }

    /// Label atoms followed by the split WHERE atoms
    pub fn predicates_in_textual_order(&self) -> Vec<Expression> {
        let mut atoms = self.label_predicates();
        for selection in &self.selections {
            atoms.extend(selection.split_conjuncts());
        }
        atoms
    }

    pub fn validate(&self) -> PlanningResult<()> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(PlanningError::MalformedPattern(format!(
                    "node {} declared twice",
                    node.name
                )));
            }
        }

        let mut exposed = HashSet::new();
        for connection in &self.connections {
            let (left, right) = connection.endpoints();
            for endpoint in [left, right] {
                if !names.contains(endpoint) {
                    return Err(PlanningError::MalformedPattern(format!(
                        "connection {} references undeclared node {}",
                        connection, endpoint
                    )));
                }
            }
            for variable in connection.exposed_variables() {
                if names.contains(variable.as_str()) || !exposed.insert(variable.clone()) {
                    return Err(PlanningError::MalformedPattern(format!(
                        "variable {} is bound by more than one pattern element",
                        variable
                    )));
                }
            }
        }
        Ok(())
    }
}
