// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Predicate classification for quantified path patterns
//!
//! Per-repetition selections are AND-split and sorted into relationship,
//! node and non-pushable predicates. MATCH-level predicates over group
//! variables of the form `all(x IN group WHERE p)` are rewritten into
//! per-step predicates when `p` only reads `x` and variables bound before
//! the pattern; any other predicate over a group stays a post filter.

use log::trace;
use std::collections::BTreeSet;

use crate::ir::expression::Expression;
use crate::ir::pattern::{GroupKind, QuantifiedPathPattern};
use crate::plan::physical::VariablePredicate;

/// Where a per-repetition predicate could be evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateClass {
    /// Reads exactly one inner relationship
    Relationship(String),
    /// Reads exactly one inner node
    Node(String),
    /// Reads several inner variables, none at all, or runs a subquery
    NonPushable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedPredicate {
    pub predicate: Expression,
    pub class: PredicateClass,
}

/// A group predicate rewritten to hold for every element of the group
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedGroupPredicate {
    /// The MATCH-level atom this replaces
    pub original: Expression,
    pub kind: GroupKind,
    /// Inner variable collected by the group
    pub singleton: String,
    pub variable_predicate: VariablePredicate,
}

impl ExtractedGroupPredicate {
    /// The predicate expressed over the inner variable of one repetition
    pub fn per_step_predicate(&self) -> Expression {
        self.variable_predicate
            .predicate
            .rename_variable(&self.variable_predicate.variable, &self.singleton)
    }
}

/// Output of the classifier, each list in textual order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub selections: Vec<ClassifiedPredicate>,
    pub extracted: Vec<ExtractedGroupPredicate>,
    /// MATCH-level predicates over groups that must run after the pattern
    pub post_filters: Vec<Expression>,
}

impl Classification {
    pub fn has_selections(&self) -> bool {
        !self.selections.is_empty()
    }

    /// Every extracted predicate can be evaluated per relationship
    pub fn group_predicates_fit_relationships(&self) -> bool {
        self.extracted
            .iter()
            .all(|e| e.kind == GroupKind::Relationship)
    }

    /// Variables the post filters read
    pub fn post_filter_dependencies(&self) -> BTreeSet<String> {
        self.post_filters
            .iter()
            .flat_map(|p| p.dependencies())
            .collect()
    }
}

/// Classifies per-repetition and group predicates of one QPP
#[derive(Debug, Default)]
pub struct PredicateClassifier;

impl PredicateClassifier {
    pub fn new() -> Self {
        Self
    }

    /// `outer_predicates` are the MATCH-level atoms reading any group of
    /// `qpp`; `bound` holds the variables bound before the pattern
    pub fn classify(
        &self,
        qpp: &QuantifiedPathPattern,
        outer_predicates: &[Expression],
        bound: &BTreeSet<String>,
    ) -> Classification {
        let inner_nodes: BTreeSet<&str> = qpp.inner_nodes().into_iter().collect();
        let inner_relationships: BTreeSet<&str> =
            qpp.relationship_variables().into_iter().collect();

        let mut classification = Classification::default();

        for selection in qpp.selections() {
            for atom in selection.split_conjuncts() {
                let class = Self::classify_atom(&atom, &inner_nodes, &inner_relationships);
                trace!("selection {} classified as {:?}", atom, class);
                classification.selections.push(ClassifiedPredicate {
                    predicate: atom,
                    class,
                });
            }
        }

        for atom in outer_predicates {
            match Self::extract(qpp, atom, bound) {
                Some(extracted) => {
                    trace!(
                        "group predicate {} rewritten for {}",
                        atom,
                        extracted.singleton
                    );
                    classification.extracted.push(extracted);
                }
                None => classification.post_filters.push(atom.clone()),
            }
        }

        classification
    }

    fn classify_atom(
        atom: &Expression,
        inner_nodes: &BTreeSet<&str>,
        inner_relationships: &BTreeSet<&str>,
    ) -> PredicateClass {
        if atom.depends_on_subquery() {
            return PredicateClass::NonPushable;
        }
        let inner: Vec<String> = atom
            .dependencies()
            .into_iter()
            .filter(|d| {
                inner_nodes.contains(d.as_str()) || inner_relationships.contains(d.as_str())
            })
            .collect();

        match inner.as_slice() {
            [single] if inner_relationships.contains(single.as_str()) => {
                PredicateClass::Relationship(single.clone())
            }
            [single] => PredicateClass::Node(single.clone()),
            _ => PredicateClass::NonPushable,
        }
    }

    fn extract(
        qpp: &QuantifiedPathPattern,
        atom: &Expression,
        bound: &BTreeSet<String>,
    ) -> Option<ExtractedGroupPredicate> {
        let Expression::AllIterable(iterable) = atom else {
            return None;
        };
        let Expression::Variable(group) = iterable.list.as_ref() else {
            return None;
        };
        let (kind, grouping) = qpp.grouping_for_group(group)?;

        if iterable.predicate.depends_on_subquery() {
            return None;
        }
        let reads_only_local_scope = iterable
            .predicate
            .dependencies()
            .iter()
            .all(|d| *d == iterable.variable || bound.contains(d));
        if !reads_only_local_scope {
            return None;
        }

        Some(ExtractedGroupPredicate {
            original: atom.clone(),
            kind,
            singleton: grouping.singleton.clone(),
            variable_predicate: VariablePredicate::new(
                iterable.variable.as_str(),
                (*iterable.predicate).clone(),
            ),
        })
    }
}
