//! Evaluation of `#if` / `#elif` conditions.
//!
//! The parser only records `lhs op rhs` headers. Operands are resolved to
//! text by the caller; this module decides which branch is taken.

use std::str::FromStr;

use regex::RegexBuilder;

use crate::cst::{Element, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("Malformed condition at line {line}")]
    Malformed { line: usize },
}

/// Comparison operators of a condition header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Ie,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    IContains,
    Starts,
    IStarts,
    Ends,
    IEnds,
    Match,
    IMatch,
}

impl FromStr for Operator {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "ie" => Operator::Ie,
            "gt" => Operator::Gt,
            "lt" => Operator::Lt,
            "ge" => Operator::Ge,
            "le" => Operator::Le,
            "contains" => Operator::Contains,
            "icontains" => Operator::IContains,
            "starts" => Operator::Starts,
            "istarts" => Operator::IStarts,
            "ends" => Operator::Ends,
            "iends" => Operator::IEnds,
            "match" => Operator::Match,
            "imatch" => Operator::IMatch,
            other => return Err(ConditionError::UnknownOperator(other.to_string())),
        })
    }
}

impl Operator {
    /// Compare two resolved operands.
    ///
    /// Ordering operators compare numerically; when either side is not a
    /// number the condition is false.
    pub fn evaluate(self, lhs: &str, rhs: &str) -> Result<bool, ConditionError> {
        let folded = || (lhs.to_lowercase(), rhs.to_lowercase());

        Ok(match self {
            Operator::Eq => lhs == rhs,
            Operator::Ne => lhs != rhs,
            Operator::Ie => {
                let (l, r) = folded();
                l == r
            }
            Operator::Gt => numeric(lhs, rhs, |l, r| l > r),
            Operator::Lt => numeric(lhs, rhs, |l, r| l < r),
            Operator::Ge => numeric(lhs, rhs, |l, r| l >= r),
            Operator::Le => numeric(lhs, rhs, |l, r| l <= r),
            Operator::Contains => lhs.contains(rhs),
            Operator::Starts => lhs.starts_with(rhs),
            Operator::Ends => lhs.ends_with(rhs),
            Operator::IContains => {
                let (l, r) = folded();
                l.contains(&r)
            }
            Operator::IStarts => {
                let (l, r) = folded();
                l.starts_with(&r)
            }
            Operator::IEnds => {
                let (l, r) = folded();
                l.ends_with(&r)
            }
            Operator::Match => pattern_matches(lhs, rhs, false)?,
            Operator::IMatch => pattern_matches(lhs, rhs, true)?,
        })
    }
}

fn numeric(lhs: &str, rhs: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (lhs.trim().parse::<f64>(), rhs.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => cmp(l, r),
        _ => false,
    }
}

fn pattern_matches(text: &str, pattern: &str, case_insensitive: bool) -> Result<bool, ConditionError> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| ConditionError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
    Ok(regex.is_match(text))
}

/// Pick the branch of an `#if` element whose condition holds.
///
/// Branches are tried in order and evaluation stops at the first true
/// condition. `#else` is taken when nothing before it matched. Returns
/// `None` when no branch applies.
pub fn select_branch<'a, F>(
    if_element: &'a Element,
    mut resolve: F,
) -> Result<Option<&'a Element>, ConditionError>
where
    F: FnMut(&Element) -> Option<String>,
{
    for branch in if_element.children.iter().filter(|c| c.kind == NodeKind::Branch) {
        if branch.name() == "else" {
            return Ok(Some(branch));
        }

        let [lhs, op, rhs, ..] = branch.children.as_slice() else {
            return Err(ConditionError::Malformed {
                line: branch.first_line(),
            });
        };
        let operator: Operator = op.name().parse()?;
        let lhs = resolve(lhs).unwrap_or_default();
        let rhs = resolve(rhs).unwrap_or_default();

        if operator.evaluate(&lhs, &rhs)? {
            return Ok(Some(branch));
        }
    }
    Ok(None)
}
