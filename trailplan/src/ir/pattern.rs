// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Relationship and quantified path pattern representation
//!
//! A `QuantifiedPathPattern` is built once from the parsed MATCH and is
//! immutable afterwards. The builder validates the contract the planner
//! relies on: a non-empty relationship chain forming one simple path from
//! the left inner node to the right inner node, and well formed repetition
//! bounds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::ir::expression::Expression;
use crate::plan::error::{PlanningError, PlanningResult};

/// Direction of a relationship as written in the pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticDirection {
    Outgoing, // ->
    Incoming, // <-
    Both,     // -
}

impl SemanticDirection {
    pub fn reversed(self) -> Self {
        match self {
            SemanticDirection::Outgoing => SemanticDirection::Incoming,
            SemanticDirection::Incoming => SemanticDirection::Outgoing,
            SemanticDirection::Both => SemanticDirection::Both,
        }
    }
}

/// Upper bound of a repetition or a var-length relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpperBound {
    Unlimited,
    Limited(u32),
}

impl UpperBound {
    pub fn limit(&self) -> Option<u32> {
        match self {
            UpperBound::Unlimited => None,
            UpperBound::Limited(n) => Some(*n),
        }
    }
}

/// Repetition range `{min, max}` of a quantified path pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repetition {
    pub min: u32,
    pub max: UpperBound,
}

impl Repetition {
    pub fn new(min: u32, max: UpperBound) -> PlanningResult<Self> {
        if let UpperBound::Limited(n) = max {
            if n < min {
                return Err(PlanningError::MalformedPattern(format!(
                    "repetition upper bound {} is below lower bound {}",
                    n, min
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// `+`
    pub fn one_or_more() -> Self {
        Self {
            min: 1,
            max: UpperBound::Unlimited,
        }
    }

    /// `*`
    pub fn zero_or_more() -> Self {
        Self {
            min: 0,
            max: UpperBound::Unlimited,
        }
    }
}

impl fmt::Display for Repetition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            UpperBound::Unlimited => write!(f, "{{{}, }}", self.min),
            UpperBound::Limited(n) => write!(f, "{{{}, {}}}", self.min, n),
        }
    }
}

/// Length of a plain relationship pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternLength {
    Simple,
    /// Legacy `-[r*min..max]->` syntax
    Var { min: u32, max: UpperBound },
}

/// A single relationship pattern `(left)-[variable:TYPES]->(right)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRelationship {
    pub variable: String,
    /// Node names in textual order
    pub nodes: (String, String),
    pub direction: SemanticDirection,
    pub types: Vec<String>,
    pub length: PatternLength,
}

impl PatternRelationship {
    pub fn new(
        variable: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
        direction: SemanticDirection,
    ) -> Self {
        Self {
            variable: variable.into(),
            nodes: (left.into(), right.into()),
            direction,
            types: Vec::new(),
            length: PatternLength::Simple,
        }
    }

    pub fn with_types(mut self, types: &[&str]) -> Self {
        self.types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_length(mut self, length: PatternLength) -> Self {
        self.length = length;
        self
    }

    pub fn left(&self) -> &str {
        &self.nodes.0
    }

    pub fn right(&self) -> &str {
        &self.nodes.1
    }

    /// The endpoint opposite to `node`
    pub fn other_node(&self, node: &str) -> Option<&str> {
        if node == self.left() {
            Some(self.right())
        } else if node == self.right() {
            Some(self.left())
        } else {
            None
        }
    }

    /// Direction as seen when traversing from `from` to the other endpoint
    pub fn direction_from(&self, from: &str) -> SemanticDirection {
        if from == self.left() {
            self.direction
        } else {
            self.direction.reversed()
        }
    }

    pub fn is_var_length(&self) -> bool {
        matches!(self.length, PatternLength::Var { .. })
    }
}

impl fmt::Display for PatternRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let length = match self.length {
            PatternLength::Simple => String::new(),
            PatternLength::Var { min, max } => var_length_suffix(min, max),
        };
        write!(
            f,
            "{}",
            render_step(
                self.left(),
                &self.variable,
                &self.types,
                &length,
                self.direction,
                self.right()
            )
        )
    }
}

/// `*min..max` suffix as printed in var-length patterns
pub fn var_length_suffix(min: u32, max: UpperBound) -> String {
    match max {
        UpperBound::Unlimited => format!("*{}..", min),
        UpperBound::Limited(n) if n == min => format!("*{}", n),
        UpperBound::Limited(n) => format!("*{}..{}", min, n),
    }
}

/// Render `(from)-[rel:T]->(to)` for plan descriptions
pub fn render_step(
    from: &str,
    relationship: &str,
    types: &[String],
    length: &str,
    direction: SemanticDirection,
    to: &str,
) -> String {
    let types = if types.is_empty() {
        String::new()
    } else {
        format!(":{}", types.join("|"))
    };
    let (head, tail) = match direction {
        SemanticDirection::Outgoing => ("-", "->"),
        SemanticDirection::Incoming => ("<-", "-"),
        SemanticDirection::Both => ("-", "-"),
    };
    format!(
        "({}){}[{}{}{}]{}({})",
        from, head, relationship, types, length, tail, to
    )
}

/// Pairs an outer variable with the inner variable of a QPP boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBinding {
    pub outer: String,
    pub inner: String,
}

impl NodeBinding {
    pub fn new(outer: impl Into<String>, inner: impl Into<String>) -> Self {
        Self {
            outer: outer.into(),
            inner: inner.into(),
        }
    }
}

/// Maps an inner (singleton) variable to the group variable exposed outside
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableGrouping {
    pub singleton: String,
    pub group: String,
}

impl VariableGrouping {
    pub fn new(singleton: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            singleton: singleton.into(),
            group: group.into(),
        }
    }
}

/// Kind of variable a group collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    Node,
    Relationship,
}

/// A quantified path pattern such as `(a) ((n)-[r]->(m))+ (b)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantifiedPathPattern {
    left_binding: NodeBinding,
    right_binding: NodeBinding,
    relationships: Vec<PatternRelationship>,
    repetition: Repetition,
    node_variable_groupings: Vec<VariableGrouping>,
    relationship_variable_groupings: Vec<VariableGrouping>,
    selections: Vec<Expression>,
}

impl QuantifiedPathPattern {
    pub fn builder(left_binding: NodeBinding, right_binding: NodeBinding) -> QppBuilder {
        QppBuilder {
            left_binding,
            right_binding,
            relationships: Vec::new(),
            repetition: Repetition::one_or_more(),
            node_variable_groupings: Vec::new(),
            relationship_variable_groupings: Vec::new(),
            selections: Vec::new(),
            group_by_name: false,
        }
    }

    pub fn left_binding(&self) -> &NodeBinding {
        &self.left_binding
    }

    pub fn right_binding(&self) -> &NodeBinding {
        &self.right_binding
    }

    pub fn relationships(&self) -> &[PatternRelationship] {
        &self.relationships
    }

    pub fn repetition(&self) -> Repetition {
        self.repetition
    }

    pub fn node_variable_groupings(&self) -> &[VariableGrouping] {
        &self.node_variable_groupings
    }

    pub fn relationship_variable_groupings(&self) -> &[VariableGrouping] {
        &self.relationship_variable_groupings
    }

    /// Per-repetition predicates
    pub fn selections(&self) -> &[Expression] {
        &self.selections
    }

    /// Inner node variables in path order, `left.inner` first
    pub fn inner_nodes(&self) -> Vec<&str> {
        let mut nodes = vec![self.left_binding.inner.as_str()];
        nodes.extend(self.relationships.iter().map(|r| r.right()));
        nodes
    }

    pub fn relationship_variables(&self) -> Vec<&str> {
        self.relationships
            .iter()
            .map(|r| r.variable.as_str())
            .collect()
    }

    pub fn is_single_relationship(&self) -> bool {
        self.relationships.len() == 1
    }

    /// Union of relationship types; `None` when any relationship is untyped
    pub fn type_set(&self) -> Option<BTreeSet<String>> {
        let mut types = BTreeSet::new();
        for relationship in &self.relationships {
            if relationship.types.is_empty() {
                return None;
            }
            types.extend(relationship.types.iter().cloned());
        }
        Some(types)
    }

    pub fn relationship_group(&self, singleton: &str) -> Option<&str> {
        self.relationship_variable_groupings
            .iter()
            .find(|g| g.singleton == singleton)
            .map(|g| g.group.as_str())
    }

    pub fn relationship_groups(&self) -> Vec<&str> {
        self.relationship_variable_groupings
            .iter()
            .map(|g| g.group.as_str())
            .collect()
    }

    pub fn node_groups(&self) -> Vec<&str> {
        self.node_variable_groupings
            .iter()
            .map(|g| g.group.as_str())
            .collect()
    }

    /// Resolve a group variable to its kind and singleton
    pub fn grouping_for_group(&self, group: &str) -> Option<(GroupKind, &VariableGrouping)> {
        if let Some(g) = self
            .node_variable_groupings
            .iter()
            .find(|g| g.group == group)
        {
            return Some((GroupKind::Node, g));
        }
        self.relationship_variable_groupings
            .iter()
            .find(|g| g.group == group)
            .map(|g| (GroupKind::Relationship, g))
    }

    pub fn outer_variables(&self) -> [&str; 2] {
        [&self.left_binding.outer, &self.right_binding.outer]
    }
}

impl fmt::Display for QuantifiedPathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) (", self.left_binding.outer)?;
        for (i, relationship) in self.relationships.iter().enumerate() {
            let step = render_step(
                relationship.left(),
                &relationship.variable,
                &relationship.types,
                "",
                relationship.direction,
                relationship.right(),
            );
            if i == 0 {
                write!(f, "{}", step)?;
            } else {
                // Skip the repeated left node
                let skip = relationship.left().len() + 2;
                write!(f, "{}", &step[skip..])?;
            }
        }
        write!(f, "){} ({})", self.repetition, self.right_binding.outer)
    }
}

/// Builder validating the QPP contract
#[derive(Debug, Clone)]
pub struct QppBuilder {
    left_binding: NodeBinding,
    right_binding: NodeBinding,
    relationships: Vec<PatternRelationship>,
    repetition: Repetition,
    node_variable_groupings: Vec<VariableGrouping>,
    relationship_variable_groupings: Vec<VariableGrouping>,
    selections: Vec<Expression>,
    group_by_name: bool,
}

impl QppBuilder {
    pub fn relationship(mut self, relationship: PatternRelationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn repetition(mut self, repetition: Repetition) -> Self {
        self.repetition = repetition;
        self
    }

    pub fn node_grouping(mut self, singleton: &str, group: &str) -> Self {
        self.node_variable_groupings
            .push(VariableGrouping::new(singleton, group));
        self
    }

    pub fn relationship_grouping(mut self, singleton: &str, group: &str) -> Self {
        self.relationship_variable_groupings
            .push(VariableGrouping::new(singleton, group));
        self
    }

    /// Group every inner variable without an explicit grouping under its own name
    pub fn group_by_name(mut self) -> Self {
        self.group_by_name = true;
        self
    }

    pub fn selection(mut self, predicate: Expression) -> Self {
        self.selections.push(predicate);
        self
    }

    pub fn build(mut self) -> PlanningResult<QuantifiedPathPattern> {
        if self.relationships.is_empty() {
            return Err(PlanningError::MalformedPattern(
                "quantified path pattern without relationships".to_string(),
            ));
        }

        let mut expected = self.left_binding.inner.clone();
        let mut seen_nodes: HashSet<String> = HashSet::new();
        seen_nodes.insert(expected.clone());
        let mut seen_relationships: HashSet<String> = HashSet::new();

        for relationship in &self.relationships {
            if relationship.is_var_length() {
                return Err(PlanningError::MalformedPattern(format!(
                    "var-length relationship {} inside a quantified path pattern",
                    relationship.variable
                )));
            }
            if relationship.left() != expected {
                return Err(PlanningError::MalformedPattern(format!(
                    "relationship chain is disconnected at {}: expected to start at {}",
                    relationship.variable, expected
                )));
            }
            if !seen_relationships.insert(relationship.variable.clone()) {
                return Err(PlanningError::MalformedPattern(format!(
                    "relationship {} appears twice in one repetition",
                    relationship.variable
                )));
            }
            if !seen_nodes.insert(relationship.right().to_string()) {
                return Err(PlanningError::MalformedPattern(format!(
                    "node {} repeats inside the relationship chain",
                    relationship.right()
                )));
            }
            expected = relationship.right().to_string();
        }

        if expected != self.right_binding.inner {
            return Err(PlanningError::MalformedPattern(format!(
                "relationship chain ends at {} instead of {}",
                expected, self.right_binding.inner
            )));
        }

        // Re-validate bounds, the fields may have been written directly
        Repetition::new(self.repetition.min, self.repetition.max)?;

        if self.group_by_name {
            for node in &seen_nodes_in_order(&self.left_binding, &self.relationships) {
                if !self
                    .node_variable_groupings
                    .iter()
                    .any(|g| &g.singleton == node)
                {
                    self.node_variable_groupings
                        .push(VariableGrouping::new(node.as_str(), node.as_str()));
                }
            }
            for relationship in &self.relationships {
                if !self
                    .relationship_variable_groupings
                    .iter()
                    .any(|g| g.singleton == relationship.variable)
                {
                    self.relationship_variable_groupings.push(VariableGrouping::new(
                        relationship.variable.as_str(),
                        relationship.variable.as_str(),
                    ));
                }
            }
        }

        let mut groups = HashSet::new();
        for grouping in &self.node_variable_groupings {
            if !seen_nodes.contains(&grouping.singleton) {
                return Err(PlanningError::MalformedPattern(format!(
                    "node grouping refers to unknown inner node {}",
                    grouping.singleton
                )));
            }
            if !groups.insert(grouping.group.clone()) {
                return Err(PlanningError::MalformedPattern(format!(
                    "group variable {} defined twice",
                    grouping.group
                )));
            }
        }
        for relationship in &self.relationships {
            if !self
                .relationship_variable_groupings
                .iter()
                .any(|g| g.singleton == relationship.variable)
            {
                return Err(PlanningError::MalformedPattern(format!(
                    "relationship {} has no variable grouping",
                    relationship.variable
                )));
            }
        }
        for grouping in &self.relationship_variable_groupings {
            if !seen_relationships.contains(&grouping.singleton) {
                return Err(PlanningError::MalformedPattern(format!(
                    "relationship grouping refers to unknown inner relationship {}",
                    grouping.singleton
                )));
            }
            if !groups.insert(grouping.group.clone()) {
                return Err(PlanningError::MalformedPattern(format!(
                    "group variable {} defined twice",
                    grouping.group
                )));
            }
        }

        Ok(QuantifiedPathPattern {
            left_binding: self.left_binding,
            right_binding: self.right_binding,
            relationships: self.relationships,
            repetition: self.repetition,
            node_variable_groupings: self.node_variable_groupings,
            relationship_variable_groupings: self.relationship_variable_groupings,
            selections: self.selections,
        })
    }
}

fn seen_nodes_in_order(left: &NodeBinding, relationships: &[PatternRelationship]) -> Vec<String> {
    let mut nodes = vec![left.inner.clone()];
    nodes.extend(relationships.iter().map(|r| r.right().to_string()));
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_qpp() -> QppBuilder {
        QuantifiedPathPattern::builder(NodeBinding::new("a", "n"), NodeBinding::new("b", "m"))
            .relationship(PatternRelationship::new(
                "r",
                "n",
                "m",
                SemanticDirection::Outgoing,
            ))
    }

    #[test]
    fn test_valid_qpp_with_named_groups() {
        let qpp = simple_qpp().group_by_name().build().unwrap();

        assert_eq!(qpp.inner_nodes(), vec!["n", "m"]);
        assert_eq!(qpp.relationship_group("r"), Some("r"));
        assert_eq!(qpp.node_groups(), vec!["n", "m"]);
        assert!(qpp.type_set().is_none());
        assert_eq!(qpp.to_string(), "(a) ((n)-[r]->(m)){1, } (b)");
    }

    #[test]
    fn test_disconnected_chain_is_rejected() {
        let result = QuantifiedPathPattern::builder(
            NodeBinding::new("a", "n"),
            NodeBinding::new("b", "o"),
        )
        .relationship(PatternRelationship::new("r", "n", "m", SemanticDirection::Outgoing))
        .relationship(PatternRelationship::new("s", "x", "o", SemanticDirection::Outgoing))
        .group_by_name()
        .build();

        assert!(matches!(result, Err(PlanningError::MalformedPattern(_))));
    }

    #[test]
    fn test_repeated_inner_node_is_rejected() {
        let result = QuantifiedPathPattern::builder(
            NodeBinding::new("a", "n"),
            NodeBinding::new("b", "n"),
        )
        .relationship(PatternRelationship::new("r", "n", "m", SemanticDirection::Outgoing))
        .relationship(PatternRelationship::new("s", "m", "n", SemanticDirection::Outgoing))
        .group_by_name()
        .build();

        assert!(matches!(result, Err(PlanningError::MalformedPattern(_))));
    }

    #[test]
    fn test_invalid_repetition_bounds() {
        assert!(Repetition::new(3, UpperBound::Limited(2)).is_err());
        assert!(Repetition::new(2, UpperBound::Limited(2)).is_ok());
        assert!(Repetition::new(0, UpperBound::Unlimited).is_ok());
    }

    #[test]
    fn test_missing_relationship_grouping_is_rejected() {
        let result = simple_qpp().node_grouping("n", "ns").build();
        assert!(matches!(result, Err(PlanningError::MalformedPattern(_))));
    }

    #[test]
    fn test_type_set_union() {
        let qpp = QuantifiedPathPattern::builder(
            NodeBinding::new("a", "n"),
            NodeBinding::new("b", "o"),
        )
        .relationship(
            PatternRelationship::new("r", "n", "m", SemanticDirection::Outgoing)
                .with_types(&["R"]),
        )
        .relationship(
            PatternRelationship::new("s", "m", "o", SemanticDirection::Incoming)
                .with_types(&["S", "R"]),
        )
        .group_by_name()
        .build()
        .unwrap();

        let types: Vec<String> = qpp.type_set().unwrap().into_iter().collect();
        assert_eq!(types, vec!["R".to_string(), "S".to_string()]);
        assert_eq!(qpp.to_string(), "(a) ((n)-[r:R]->(m)<-[s:S|R]-(o)){1, } (b)");
    }

    #[test]
    fn test_relationship_rendering() {
        let rel = PatternRelationship::new("r", "a", "b", SemanticDirection::Incoming)
            .with_types(&["KNOWS"])
            .with_length(PatternLength::Var {
                min: 1,
                max: UpperBound::Limited(3),
            });
        assert_eq!(rel.to_string(), "(a)<-[r:KNOWS*1..3]-(b)");
        assert_eq!(rel.direction_from("b"), SemanticDirection::Outgoing);
        assert_eq!(rel.other_node("a"), Some("b"));
    }
}
