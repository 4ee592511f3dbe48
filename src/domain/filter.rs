//! Single-clause attribute filters of the form `field operator 'value'`.
//!
//! The clause is parsed into a typed [`AttributeFilter`] and evaluated
//! in-process against each feature. It is never spliced into a request, so
//! the literal needs no escaping beyond what [`AttributeFilter::to_sql`]
//! does for display.

use crate::domain::errors::{ExtractError, Result};
use crate::domain::features::FieldValue;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Supported comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
}

impl FromStr for ComparisonOp {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        match normalized.as_str() {
            "=" | "==" => Ok(ComparisonOp::Eq),
            "<>" | "!=" => Ok(ComparisonOp::Ne),
            "<" => Ok(ComparisonOp::Lt),
            "<=" => Ok(ComparisonOp::Le),
            ">" => Ok(ComparisonOp::Gt),
            ">=" => Ok(ComparisonOp::Ge),
            "LIKE" => Ok(ComparisonOp::Like),
            "NOT LIKE" => Ok(ComparisonOp::NotLike),
            _ => Err(ExtractError::FilterError(format!(
                "unsupported operator '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Like => "LIKE",
            ComparisonOp::NotLike => "NOT LIKE",
        };
        f.write_str(s)
    }
}

/// `field operator 'literal'`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeFilter {
    pub field: String,
    pub op: ComparisonOp,
    pub literal: String,
}

impl AttributeFilter {
    /// Builds a filter from the three configuration columns. A blank field
    /// means "no attribute filter".
    pub fn parse(field: &str, operator: &str, literal: &str) -> Result<Option<Self>> {
        let field = field.trim();
        if field.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            field: field.to_string(),
            op: operator.parse()?,
            literal: literal.to_string(),
        }))
    }

    /// OGR-SQL rendering, e.g. `"status" = 'active'`.
    pub fn to_sql(&self) -> String {
        format!(
            "\"{}\" {} '{}'",
            self.field.replace('"', "\"\""),
            self.op,
            self.literal.replace('\'', "''")
        )
    }

    /// Evaluates the clause against one value. NULL never matches.
    pub fn matches(&self, value: &FieldValue) -> bool {
        if let ComparisonOp::Like | ComparisonOp::NotLike = self.op {
            let text = match value {
                FieldValue::Null => return false,
                FieldValue::Integer(i) => i.to_string(),
                FieldValue::Real(r) => r.to_string(),
                FieldValue::Boolean(b) => b.to_string(),
                FieldValue::String(s) | FieldValue::Date(s) | FieldValue::DateTime(s) => s.clone(),
            };
            let hit = like_match(&text.to_lowercase(), &self.literal.to_lowercase());
            return (self.op == ComparisonOp::Like) == hit;
        }

        let ordering = match value {
            FieldValue::Null => None,
            FieldValue::Integer(i) => self
                .literal
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|lit| (*i as f64).partial_cmp(&lit)),
            FieldValue::Real(r) => self
                .literal
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|lit| r.partial_cmp(&lit)),
            FieldValue::Boolean(b) => parse_bool(&self.literal).map(|lit| b.cmp(&lit)),
            FieldValue::String(s) | FieldValue::Date(s) | FieldValue::DateTime(s) => {
                Some(s.as_str().cmp(self.literal.as_str()))
            }
        };

        match ordering {
            None => false,
            Some(ord) => match self.op {
                ComparisonOp::Eq => ord == Ordering::Equal,
                ComparisonOp::Ne => ord != Ordering::Equal,
                ComparisonOp::Lt => ord == Ordering::Less,
                ComparisonOp::Le => ord != Ordering::Greater,
                ComparisonOp::Gt => ord == Ordering::Greater,
                ComparisonOp::Ge => ord != Ordering::Less,
                ComparisonOp::Like | ComparisonOp::NotLike => false,
            },
        }
    }
}

impl fmt::Display for AttributeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Some(true),
        "false" | "f" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// SQL `LIKE` with `%` (any run) and `_` (any single character).
fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    // dp[j]: pattern[..j] matches text[..i]
    let mut dp = vec![false; p.len() + 1];
    dp[0] = true;
    for j in 1..=p.len() {
        dp[j] = dp[j - 1] && p[j - 1] == '%';
    }
    for &tc in &t {
        let mut prev_diag = dp[0];
        dp[0] = false;
        for j in 1..=p.len() {
            let above = dp[j];
            dp[j] = match p[j - 1] {
                '%' => dp[j - 1] || above,
                '_' => prev_diag,
                c => prev_diag && c == tc,
            };
            prev_diag = above;
        }
    }
    dp[p.len()]
}
