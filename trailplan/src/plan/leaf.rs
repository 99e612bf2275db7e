// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Leaf plan alternatives for a single node variable

use log::trace;

use crate::ir::expression::{Expression, Operator as BinaryOperator};
use crate::plan::cost::Statistics;
use crate::plan::error::PlanningResult;
use crate::plan::physical::Operator;

/// A leaf operator and the predicates it makes redundant
#[derive(Debug, Clone, PartialEq)]
pub struct LeafCandidate {
    pub operator: Operator,
    pub solved: Vec<Expression>,
}

/// Supplies alternative leaf plans for a start variable
///
/// `predicates` are the pending atoms that depend on `variable` alone.
/// Implementations must be pure: the same inputs yield the same candidates
/// in the same order.
pub trait LeafPlanner {
    fn leaf_plans(
        &self,
        variable: &str,
        predicates: &[Expression],
        statistics: &Statistics,
    ) -> PlanningResult<Vec<LeafCandidate>>;
}

/// All-nodes scan, label scans and index seeks on indexes from `Statistics`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLeafPlanner;

impl DefaultLeafPlanner {
    pub fn new() -> Self {
        Self
    }

    /// `(property, value)` of `variable.property = value` with a constant value
    fn equality_lookup<'e>(
        variable: &str,
        predicate: &'e Expression,
    ) -> Option<(&'e str, &'e Expression)> {
        let Expression::Binary(binary) = predicate else {
            return None;
        };
        if binary.operator != BinaryOperator::Equal {
            return None;
        }
        let sides = [
            (binary.left.as_ref(), binary.right.as_ref()),
            (binary.right.as_ref(), binary.left.as_ref()),
        ];
        sides.into_iter().find_map(|(key, value)| match key {
            Expression::PropertyAccess(access)
                if access.object == variable && value.dependencies().is_empty() =>
            {
                Some((access.property.as_str(), value))
            }
            _ => None,
        })
    }
}

impl LeafPlanner for DefaultLeafPlanner {
    fn leaf_plans(
        &self,
        variable: &str,
        predicates: &[Expression],
        statistics: &Statistics,
    ) -> PlanningResult<Vec<LeafCandidate>> {
        let mut candidates = vec![LeafCandidate {
            operator: Operator::AllNodesScan {
                variable: variable.to_string(),
            },
            solved: Vec::new(),
        }];

        let label_atoms: Vec<(&str, &Expression)> = predicates
            .iter()
            .filter_map(|p| match p {
                Expression::HasLabels(test) if test.variable == variable => {
                    test.labels.first().map(|label| (label.as_str(), p))
                }
                _ => None,
            })
            .collect();

        for (label, atom) in &label_atoms {
            let fully_solved =
                matches!(atom, Expression::HasLabels(test) if test.labels.len() == 1);
            candidates.push(LeafCandidate {
                operator: Operator::NodeByLabelScan {
                    variable: variable.to_string(),
                    label: label.to_string(),
                },
                solved: if fully_solved {
                    vec![(*atom).clone()]
                } else {
                    Vec::new()
                },
            });
        }

        for predicate in predicates {
            let Some((property, value)) = Self::equality_lookup(variable, predicate) else {
                continue;
            };
            for (label, atom) in &label_atoms {
                let Some(index) = statistics.find_index(label, property) else {
                    continue;
                };
                let mut solved = vec![predicate.clone()];
                if matches!(atom, Expression::HasLabels(test) if test.labels.len() == 1) {
                    solved.insert(0, (*atom).clone());
                }
                candidates.push(LeafCandidate {
                    operator: Operator::NodeIndexSeek {
                        variable: variable.to_string(),
                        label: label.to_string(),
                        property: property.to_string(),
                        value: value.clone(),
                        unique: index.unique,
                    },
                    solved,
                });
            }
        }

        trace!("{} leaf candidates for {}", candidates.len(), variable);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_alternatives() {
        let stats = Statistics::new(100, 100).with_label("B", 10);
        let predicates = vec![Expression::has_labels("b", &["B"])];

        let candidates = DefaultLeafPlanner::new()
            .leaf_plans("b", &predicates, &stats)
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(matches!(candidates[0].operator, Operator::AllNodesScan { .. }));
        assert!(candidates[0].solved.is_empty());
        assert_eq!(candidates[1].solved, predicates);
    }

    #[test]
    fn test_index_seek_solves_label_and_equality() {
        let stats = Statistics::new(100, 100)
            .with_label("B", 10)
            .with_index("B", "prop", false);
        let label = Expression::has_labels("b", &["B"]);
        let equality =
            Expression::equals(Expression::integer(42), Expression::property("b", "prop"));
        let other = Expression::equals(Expression::property("b", "other"), Expression::integer(1));

        let candidates = DefaultLeafPlanner::new()
            .leaf_plans("b", &[label.clone(), equality.clone(), other], &stats)
            .unwrap();

        let seek = candidates
            .iter()
            .find(|c| matches!(c.operator, Operator::NodeIndexSeek { .. }))
            .unwrap();
        assert_eq!(seek.solved, vec![label, equality]);
        assert_eq!(seek.operator.describe(), "NodeIndexSeek(b:B {prop = 42})");
    }

    #[test]
    fn test_correlated_equality_is_not_seekable() {
        let stats = Statistics::new(100, 100)
            .with_label("B", 10)
            .with_index("B", "prop", true);
        let predicates = vec![
            Expression::has_labels("b", &["B"]),
            Expression::equals(
                Expression::property("b", "prop"),
                Expression::property("a", "prop"),
            ),
        ];

        let candidates = DefaultLeafPlanner::new()
            .leaf_plans("b", &predicates, &stats)
            .unwrap();
        assert!(candidates
            .iter()
            .all(|c| !matches!(c.operator, Operator::NodeIndexSeek { .. })));
    }
}
