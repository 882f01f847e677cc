//! Typed filter expressions for the condition field of a request.
//!
//! A condition is a conjunction of comparisons, `aid=1 and energy<50`.
//! The translator parses it once; the store evaluates it against rows.
//! Literals are typed at parse time, so evaluation cannot fail.

use crate::error::TranslationError;
use crate::store::{AgentRow, Column, FieldValue};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn eval(&self, left: FieldValue, right: FieldValue) -> bool {
        use std::cmp::Ordering;
        let Some(ordering) = left.partial_cmp(&right) else {
            return false;
        };
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }

}

#[derive(Debug, Clone, PartialEq)]
struct Predicate {
    column: Column,
    op: CmpOp,
    literal: FieldValue,
}

/// A parsed condition. Matches a row iff every predicate holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    source: String,
    predicates: Vec<Predicate>,
}

// Two-character operators must be tried before their one-character prefixes.
const OPERATORS: [(&str, CmpOp); 6] = [
    ("<=", CmpOp::Le),
    (">=", CmpOp::Ge),
    ("!=", CmpOp::Ne),
    ("<", CmpOp::Lt),
    (">", CmpOp::Gt),
    ("=", CmpOp::Eq),
];

impl Filter {
    /// Parse a condition string such as `aid=1 and energy<50`.
    pub fn parse(condition: &str) -> Result<Self, TranslationError> {
        let invalid = |reason: &str| TranslationError::InvalidFilter {
            condition: condition.to_string(),
            reason: reason.to_string(),
        };

        if condition.trim().is_empty() {
            return Err(invalid("empty condition"));
        }

        let mut predicates = Vec::new();
        for clause in condition.split(" and ") {
            let clause = clause.trim();
            let (pos, sym, op) = OPERATORS
                .iter()
                .filter_map(|&(sym, op)| clause.find(sym).map(|pos| (pos, sym, op)))
                .min_by_key(|&(pos, sym, _)| (pos, std::cmp::Reverse(sym.len())))
                .ok_or_else(|| invalid("no comparison operator"))?;

            let column_name = clause[..pos].trim();
            let literal_text = clause[pos + sym.len()..].trim();
            if literal_text.is_empty() {
                return Err(invalid("missing literal"));
            }
            let column = Column::from_name(column_name)
                .ok_or_else(|| TranslationError::UnknownColumn(column_name.to_string()))?;
            let literal = column
                .parse(literal_text)
                .map_err(|_| invalid("literal does not match column type"))?;
            predicates.push(Predicate { column, op, literal });
        }

        Ok(Self {
            source: condition.to_string(),
            predicates,
        })
    }

    pub fn matches(&self, row: &AgentRow) -> bool {
        self.predicates
            .iter()
            .all(|p| p.op.eval(row.value(p.column), p.literal))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
