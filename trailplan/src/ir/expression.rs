// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Predicate expressions attached to patterns and MATCH clauses
//!
//! The planner never evaluates expressions. It only needs to know which
//! variables an expression reads, how to split conjunctions, and how to
//! rename a variable when a group predicate is pushed into a single step.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Expression tree for predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Variable(String),
    PropertyAccess(PropertyAccess),
    Literal(Literal),
    Parameter(String),
    Binary(BinaryExpression),
    Not(Box<Expression>),
    /// `n:A:B`
    HasLabels(LabelTest),
    /// `r:A|B`
    HasTypes(TypeTest),
    FunctionCall(FunctionCall),
    /// `all(x IN list WHERE predicate)`
    AllIterable(IterablePredicate),
    /// Correlated subquery, opaque apart from the outer variables it reads
    Subquery(SubqueryExpression),
}

/// Property access: object.property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAccess {
    pub object: String,
    pub property: String,
}

/// Binary expression: left op right
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    pub left: Box<Expression>,
    pub operator: Operator,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelTest {
    pub variable: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeTest {
    pub variable: String,
    pub types: Vec<String>,
}

/// Function call: name(args...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterablePredicate {
    pub variable: String,
    pub list: Box<Expression>,
    pub predicate: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubqueryExpression {
    pub outer_variables: Vec<String>,
    pub text: String,
}

/// Operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Logical
    And,
    Or,

    // Collection
    In,

    // Arithmetic
    Plus,
    Minus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl Expression {
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn property(object: impl Into<String>, property: impl Into<String>) -> Self {
        Expression::PropertyAccess(PropertyAccess {
            object: object.into(),
            property: property.into(),
        })
    }

    pub fn integer(value: i64) -> Self {
        Expression::Literal(Literal::Integer(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Literal(Literal::Boolean(value))
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Expression::Parameter(name.into())
    }

    pub fn binary(left: Expression, operator: Operator, right: Expression) -> Self {
        Expression::Binary(BinaryExpression {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    pub fn equals(left: Expression, right: Expression) -> Self {
        Self::binary(left, Operator::Equal, right)
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::binary(left, Operator::And, right)
    }

    pub fn in_list(element: Expression, list: Expression) -> Self {
        Self::binary(element, Operator::In, list)
    }

    pub fn not(expression: Expression) -> Self {
        Expression::Not(Box::new(expression))
    }

    pub fn has_labels(variable: impl Into<String>, labels: &[&str]) -> Self {
        Expression::HasLabels(LabelTest {
            variable: variable.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        })
    }

    pub fn has_types(variable: impl Into<String>, types: &[&str]) -> Self {
        Expression::HasTypes(TypeTest {
            variable: variable.into(),
            types: types.iter().map(|t| t.to_string()).collect(),
        })
    }

    pub fn function(name: impl Into<String>, arguments: Vec<Expression>) -> Self {
        Expression::FunctionCall(FunctionCall {
            name: name.into(),
            arguments,
        })
    }

    pub fn all_in(variable: impl Into<String>, list: Expression, predicate: Expression) -> Self {
        Expression::AllIterable(IterablePredicate {
            variable: variable.into(),
            list: Box::new(list),
            predicate: Box::new(predicate),
        })
    }

    pub fn subquery(outer_variables: &[&str], text: impl Into<String>) -> Self {
        Expression::Subquery(SubqueryExpression {
            outer_variables: outer_variables.iter().map(|v| v.to_string()).collect(),
            text: text.into(),
        })
    }

    /// Free variables read by this expression
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        self.collect_dependencies(&mut deps);
        deps
    }

    fn collect_dependencies(&self, deps: &mut BTreeSet<String>) {
        match self {
            Expression::Variable(name) => {
                deps.insert(name.clone());
            }
            Expression::PropertyAccess(access) => {
                deps.insert(access.object.clone());
            }
            Expression::Literal(_) | Expression::Parameter(_) => {}
            Expression::Binary(binary) => {
                binary.left.collect_dependencies(deps);
                binary.right.collect_dependencies(deps);
            }
            Expression::Not(inner) => inner.collect_dependencies(deps),
            Expression::HasLabels(test) => {
                deps.insert(test.variable.clone());
            }
            Expression::HasTypes(test) => {
                deps.insert(test.variable.clone());
            }
            Expression::FunctionCall(call) => {
                for argument in &call.arguments {
                    argument.collect_dependencies(deps);
                }
            }
            Expression::AllIterable(iterable) => {
                iterable.list.collect_dependencies(deps);
                let mut inner = iterable.predicate.dependencies();
                inner.remove(&iterable.variable);
                deps.extend(inner);
            }
            Expression::Subquery(subquery) => {
                deps.extend(subquery.outer_variables.iter().cloned());
            }
        }
    }

    /// Split a conjunction into its atoms, left to right
    pub fn split_conjuncts(&self) -> Vec<Expression> {
        match self {
            Expression::Binary(binary) if binary.operator == Operator::And => {
                let mut atoms = binary.left.split_conjuncts();
                atoms.extend(binary.right.split_conjuncts());
                atoms
            }
            other => vec![other.clone()],
        }
    }

    /// Rebuild a left-deep conjunction; `None` for an empty list
    pub fn conjunction_of(atoms: Vec<Expression>) -> Option<Expression> {
        atoms.into_iter().reduce(Expression::and)
    }

    /// Substitute every free occurrence of `from` with the variable `to`
    pub fn rename_variable(&self, from: &str, to: &str) -> Expression {
        let rename = |name: &String| {
            if name == from {
                to.to_string()
            } else {
                name.clone()
            }
        };

        match self {
            Expression::Variable(name) => Expression::Variable(rename(name)),
            Expression::PropertyAccess(access) => Expression::PropertyAccess(PropertyAccess {
                object: rename(&access.object),
                property: access.property.clone(),
            }),
            Expression::Literal(_) | Expression::Parameter(_) => self.clone(),
            Expression::Binary(binary) => Expression::Binary(BinaryExpression {
                left: Box::new(binary.left.rename_variable(from, to)),
                operator: binary.operator,
                right: Box::new(binary.right.rename_variable(from, to)),
            }),
            Expression::Not(inner) => Expression::Not(Box::new(inner.rename_variable(from, to))),
            Expression::HasLabels(test) => Expression::HasLabels(LabelTest {
                variable: rename(&test.variable),
                labels: test.labels.clone(),
            }),
            Expression::HasTypes(test) => Expression::HasTypes(TypeTest {
                variable: rename(&test.variable),
                types: test.types.clone(),
            }),
            Expression::FunctionCall(call) => Expression::FunctionCall(FunctionCall {
                name: call.name.clone(),
                arguments: call
                    .arguments
                    .iter()
                    .map(|a| a.rename_variable(from, to))
                    .collect(),
            }),
            Expression::AllIterable(iterable) => {
                // The iteration variable shadows `from` inside the predicate
                let predicate = if iterable.variable == from {
                    (*iterable.predicate).clone()
                } else {
                    iterable.predicate.rename_variable(from, to)
                };
                Expression::AllIterable(IterablePredicate {
                    variable: iterable.variable.clone(),
                    list: Box::new(iterable.list.rename_variable(from, to)),
                    predicate: Box::new(predicate),
                })
            }
            Expression::Subquery(subquery) => Expression::Subquery(SubqueryExpression {
                outer_variables: subquery.outer_variables.iter().map(rename).collect(),
                text: subquery.text.clone(),
            }),
        }
    }

    /// Whether evaluating this expression runs a correlated subquery
    pub fn depends_on_subquery(&self) -> bool {
        match self {
            Expression::Subquery(_) => true,
            Expression::Binary(binary) => {
                binary.left.depends_on_subquery() || binary.right.depends_on_subquery()
            }
            Expression::Not(inner) => inner.depends_on_subquery(),
            Expression::FunctionCall(call) => {
                call.arguments.iter().any(|a| a.depends_on_subquery())
            }
            Expression::AllIterable(iterable) => {
                iterable.list.depends_on_subquery() || iterable.predicate.depends_on_subquery()
            }
            _ => false,
        }
    }

    fn is_logical(&self) -> bool {
        matches!(self, Expression::Binary(b) if matches!(b.operator, Operator::And | Operator::Or))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Equal => "=",
            Operator::NotEqual => "<>",
            Operator::LessThan => "<",
            Operator::LessEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterEqual => ">=",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::In => "IN",
            Operator::Plus => "+",
            Operator::Minus => "-",
        };
        write!(f, "{symbol}")
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{s}'"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Null => write!(f, "NULL"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Variable(name) => write!(f, "{name}"),
            Expression::PropertyAccess(access) => {
                write!(f, "{}.{}", access.object, access.property)
            }
            Expression::Literal(literal) => write!(f, "{literal}"),
            Expression::Parameter(name) => write!(f, "${name}"),
            Expression::Binary(binary) => {
                let nested = |e: &Expression| {
                    if binary.operator != Operator::And && e.is_logical() {
                        format!("({e})")
                    } else {
                        e.to_string()
                    }
                };
                write!(
                    f,
                    "{} {} {}",
                    nested(&binary.left),
                    binary.operator,
                    nested(&binary.right)
                )
            }
            Expression::Not(inner) => {
                if inner.is_logical() {
                    write!(f, "NOT ({inner})")
                } else {
                    write!(f, "NOT {inner}")
                }
            }
            Expression::HasLabels(test) => {
                write!(f, "{}:{}", test.variable, test.labels.join(":"))
            }
            Expression::HasTypes(test) => {
                write!(f, "{}:{}", test.variable, test.types.join("|"))
            }
            Expression::FunctionCall(call) => {
                let args: Vec<String> = call.arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", call.name, args.join(", "))
            }
            Expression::AllIterable(iterable) => write!(
                f,
                "all({} IN {} WHERE {})",
                iterable.variable, iterable.list, iterable.predicate
            ),
            Expression::Subquery(subquery) => write!(f, "EXISTS {{ {} }}", subquery.text),
        }
    }
}
