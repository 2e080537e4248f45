//! Composable query conditions.
//!
//! Conditions render to a parameterized WHERE clause, values are always
//! bound, never interpolated.

use super::value::SqlValue;

/// A WHERE-clause fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Always true, renders to no WHERE clause
    All,
    Compare {
        column: &'static str,
        op: &'static str,
        value: SqlValue,
    },
    In {
        column: &'static str,
        values: Vec<SqlValue>,
    },
    Between {
        column: &'static str,
        low: SqlValue,
        high: SqlValue,
    },
    IsNull {
        column: &'static str,
        negated: bool,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    pub fn eq(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, "=", value)
    }

    pub fn ne(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, "<>", value)
    }

    pub fn lt(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, "<", value)
    }

    pub fn le(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, "<=", value)
    }

    pub fn gt(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, ">", value)
    }

    pub fn ge(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, ">=", value)
    }

    pub fn like(column: &'static str, pattern: impl Into<SqlValue>) -> Self {
        Self::compare(column, "LIKE", pattern)
    }

    fn compare(column: &'static str, op: &'static str, value: impl Into<SqlValue>) -> Self {
        Condition::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn in_(
        column: &'static str,
        values: impl IntoIterator<Item = impl Into<SqlValue>>,
    ) -> Self {
        Condition::In {
            column,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn between(
        column: &'static str,
        low: impl Into<SqlValue>,
        high: impl Into<SqlValue>,
    ) -> Self {
        Condition::Between {
            column,
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn is_null(column: &'static str) -> Self {
        Condition::IsNull {
            column,
            negated: false,
        }
    }

    pub fn is_not_null(column: &'static str) -> Self {
        Condition::IsNull {
            column,
            negated: true,
        }
    }

    pub fn and(self, other: Condition) -> Self {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Self {
        Condition::Or(Box::new(self), Box::new(other))
    }

    /// Whether this condition constrains anything at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::All => true,
            Condition::And(a, b) | Condition::Or(a, b) => a.is_empty() && b.is_empty(),
            // An empty IN set is a contradiction, not an absence
            _ => false,
        }
    }

    /// Render to a SQL fragment, pushing bound values onto `params`.
    pub fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        match self {
            Condition::All => "1".to_string(),
            Condition::Compare { column, op, value } => {
                params.push(value.clone());
                format!("{column} {op} ?")
            }
            Condition::In { column, values } => {
                if values.is_empty() {
                    return "0".to_string();
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                params.extend(values.iter().cloned());
                format!("{column} IN ({placeholders})")
            }
            Condition::Between { column, low, high } => {
                params.push(low.clone());
                params.push(high.clone());
                format!("{column} BETWEEN ? AND ?")
            }
            Condition::IsNull { column, negated } => {
                if *negated {
                    format!("{column} IS NOT NULL")
                } else {
                    format!("{column} IS NULL")
                }
            }
            Condition::And(a, b) => {
                format!("({} AND {})", a.to_sql(params), b.to_sql(params))
            }
            Condition::Or(a, b) => {
                format!("({} OR {})", a.to_sql(params), b.to_sql(params))
            }
        }
    }

    /// Full WHERE clause, empty string when unconstrained.
    pub fn to_where_clause(&self, params: &mut Vec<SqlValue>) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.to_sql(params))
        }
    }
}
