// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Relationship uniqueness across the patterns of one MATCH
//!
//! Two pattern elements of the same MATCH may never bind the same
//! relationship. For every pair of relationship-producing connections the
//! analyzer emits an obligation, unless their relationship types make a
//! clash impossible. Untyped relationships overlap with everything.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ir::expression::Expression;
use crate::ir::match_graph::{Connection, MatchGraph};
use crate::ir::pattern::PatternLength;

/// Whether a producer binds one relationship or a list of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipForm {
    Single,
    List,
}

/// A variable through which a connection exposes relationships
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipProducer {
    /// Index of the connection in the match graph
    pub connection: usize,
    pub variable: String,
    pub form: RelationshipForm,
    /// `None` when untyped
    pub types: Option<BTreeSet<String>>,
}

impl RelationshipProducer {
    pub fn single(connection: usize, variable: &str, types: Option<&[&str]>) -> Self {
        Self::new(connection, variable, RelationshipForm::Single, types)
    }

    pub fn list(connection: usize, variable: &str, types: Option<&[&str]>) -> Self {
        Self::new(connection, variable, RelationshipForm::List, types)
    }

    fn new(
        connection: usize,
        variable: &str,
        form: RelationshipForm,
        types: Option<&[&str]>,
    ) -> Self {
        Self {
            connection,
            variable: variable.to_string(),
            form,
            types: types.map(|t| t.iter().map(|s| s.to_string()).collect()),
        }
    }
}

/// A pairwise distinctness requirement between two producers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniquenessObligation {
    /// Textually earlier producer
    pub first: RelationshipProducer,
    pub second: RelationshipProducer,
    pub predicate: Expression,
}

impl UniquenessObligation {
    pub fn involves(&self, connection: usize) -> bool {
        self.first.connection == connection || self.second.connection == connection
    }

    /// The producer on the other side of `connection`
    pub fn counterpart(&self, connection: usize) -> Option<&RelationshipProducer> {
        if self.first.connection == connection {
            Some(&self.second)
        } else if self.second.connection == connection {
            Some(&self.first)
        } else {
            None
        }
    }

    /// The producer belonging to `connection`
    pub fn own(&self, connection: usize) -> Option<&RelationshipProducer> {
        if self.first.connection == connection {
            Some(&self.first)
        } else if self.second.connection == connection {
            Some(&self.second)
        } else {
            None
        }
    }
}

/// Whether two type sets can share a relationship
pub fn types_overlap(a: &Option<BTreeSet<String>>, b: &Option<BTreeSet<String>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => !a.is_disjoint(b),
        _ => true,
    }
}

fn type_set(types: &[String]) -> Option<BTreeSet<String>> {
    if types.is_empty() {
        None
    } else {
        Some(types.iter().cloned().collect())
    }
}

/// Relationship producers of one connection
pub fn producers_of(index: usize, connection: &Connection) -> Vec<RelationshipProducer> {
    match connection {
        Connection::Relationship(rel) => {
            let form = match rel.length {
                PatternLength::Simple => RelationshipForm::Single,
                PatternLength::Var { .. } => RelationshipForm::List,
            };
            vec![RelationshipProducer {
                connection: index,
                variable: rel.variable.clone(),
                form,
                types: type_set(&rel.types),
            }]
        }
        Connection::Quantified(qpp) => qpp
            .relationships()
            .iter()
            .filter_map(|rel| {
                qpp.relationship_group(&rel.variable)
                    .map(|group| RelationshipProducer {
                        connection: index,
                        variable: group.to_string(),
                        form: RelationshipForm::List,
                        types: type_set(&rel.types),
                    })
            })
            .collect(),
    }
}

/// Distinctness predicate for a pair of producers
pub fn uniqueness_predicate(a: &RelationshipProducer, b: &RelationshipProducer) -> Expression {
    let var = |p: &RelationshipProducer| Expression::variable(p.variable.as_str());
    match (a.form, b.form) {
        (RelationshipForm::Single, RelationshipForm::Single) => {
            Expression::not(Expression::equals(var(a), var(b)))
        }
        (RelationshipForm::Single, RelationshipForm::List) => {
            Expression::not(Expression::in_list(var(a), var(b)))
        }
        (RelationshipForm::List, RelationshipForm::Single) => {
            Expression::not(Expression::in_list(var(b), var(a)))
        }
        (RelationshipForm::List, RelationshipForm::List) => {
            Expression::function("disjoint", vec![var(a), var(b)])
        }
    }
}

/// Emits uniqueness obligations for a match graph
#[derive(Debug, Default)]
pub struct UniquenessAnalyzer;

impl UniquenessAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Obligations in textual pair order
    pub fn analyze(&self, graph: &MatchGraph) -> Vec<UniquenessObligation> {
        let producers: Vec<RelationshipProducer> = graph
            .connections
            .iter()
            .enumerate()
            .flat_map(|(index, connection)| producers_of(index, connection))
            .collect();

        let mut obligations = Vec::new();
        for (i, first) in producers.iter().enumerate() {
            for second in &producers[i + 1..] {
                // Within one QPP, the Trail itself enforces uniqueness
                if first.connection == second.connection {
                    continue;
                }
                if !types_overlap(&first.types, &second.types) {
                    debug!(
                        "{} and {} have disjoint types, no uniqueness check",
                        first.variable, second.variable
                    );
                    continue;
                }
                obligations.push(UniquenessObligation {
                    first: first.clone(),
                    second: second.clone(),
                    predicate: uniqueness_predicate(first, second),
                });
            }
        }
        obligations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pattern::{
        NodeBinding, PatternRelationship, QuantifiedPathPattern, SemanticDirection, UpperBound,
    };

    fn qpp(left: &str, right: &str, rel: &str, types: &[&str]) -> QuantifiedPathPattern {
        QuantifiedPathPattern::builder(
            NodeBinding::new(left, format!("{}_n", rel)),
            NodeBinding::new(right, format!("{}_m", rel)),
        )
        .relationship(
            PatternRelationship::new(
                rel,
                format!("{}_n", rel),
                format!("{}_m", rel),
                SemanticDirection::Outgoing,
            )
            .with_types(types),
        )
        .relationship_grouping(rel, &format!("{}_group", rel))
        .build()
        .unwrap()
    }

    #[test]
    fn test_disjoint_types_emit_nothing() {
        let graph = MatchGraph::new()
            .node("a", &[])
            .node("b", &[])
            .node("c", &[])
            .quantified(qpp("a", "b", "r", &["R"]))
            .quantified(qpp("b", "c", "s", &["T"]));

        assert!(UniquenessAnalyzer::new().analyze(&graph).is_empty());
    }

    #[test]
    fn test_untyped_overlaps_everything() {
        let graph = MatchGraph::new()
            .node("a", &[])
            .node("b", &[])
            .node("c", &[])
            .quantified(qpp("a", "b", "r", &["R"]))
            .quantified(qpp("b", "c", "s", &[]));

        let obligations = UniquenessAnalyzer::new().analyze(&graph);
        assert_eq!(obligations.len(), 1);
        assert_eq!(
            obligations[0].predicate.to_string(),
            "disjoint(r_group, s_group)"
        );
    }

    #[test]
    fn test_predicate_forms() {
        let graph = MatchGraph::new()
            .node("a", &[])
            .node("b", &[])
            .node("c", &[])
            .node("d", &[])
            .relationship(PatternRelationship::new(
                "x",
                "a",
                "b",
                SemanticDirection::Outgoing,
            ))
            .quantified(qpp("b", "c", "r", &[]))
            .relationship(
                PatternRelationship::new("y", "c", "d", SemanticDirection::Both).with_length(
                    PatternLength::Var {
                        min: 1,
                        max: UpperBound::Limited(2),
                    },
                ),
            );

        let rendered: Vec<String> = UniquenessAnalyzer::new()
            .analyze(&graph)
            .iter()
            .map(|o| o.predicate.to_string())
            .collect();
        assert_eq!(
            rendered,
            vec!["NOT x IN r_group", "NOT x IN y", "disjoint(r_group, y)"]
        );
    }

    #[test]
    fn test_single_pair_and_counterparts() {
        let graph = MatchGraph::new()
            .node("a", &[])
            .node("b", &[])
            .node("c", &[])
            .relationship(
                PatternRelationship::new("x", "a", "b", SemanticDirection::Outgoing)
                    .with_types(&["R", "S"]),
            )
            .relationship(
                PatternRelationship::new("y", "b", "c", SemanticDirection::Outgoing)
                    .with_types(&["S"]),
            );

        let obligations = UniquenessAnalyzer::new().analyze(&graph);
        assert_eq!(obligations.len(), 1);
        let obligation = &obligations[0];
        assert_eq!(obligation.predicate.to_string(), "NOT x = y");
        assert!(obligation.involves(1));
        assert_eq!(obligation.counterpart(1).map(|p| p.variable.as_str()), Some("x"));
        assert_eq!(obligation.own(1).map(|p| p.variable.as_str()), Some("y"));
        assert!(obligation.counterpart(5).is_none());
    }
}
