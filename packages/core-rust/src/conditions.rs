//! Declarative filter-condition grammar.
//!
//! Conditions arrive as a JSON map of `column -> condition`, where a
//! condition is either a bare primitive (shorthand for `eq`) or an
//! operator-object with exactly one operator key. All conditions across
//! columns combine with logical AND.
//!
//! Null cells never match any operator.

use chrono::DateTime;
use serde_json::Value as JsonValue;

use crate::error::EngineError;
use crate::value::{Cell, DType};

/// A single filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
}

impl FilterOp {
    /// Parses an operator key from the condition grammar.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "in" => Some(Self::In),
            "not_in" => Some(Self::NotIn),
            "contains" => Some(Self::Contains),
            "startswith" => Some(Self::StartsWith),
            "endswith" => Some(Self::EndsWith),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
        }
    }
}

/// One parsed condition against one column.
#[derive(Debug, Clone)]
pub struct FilterCondition {
    pub column: String,
    pub op: FilterOp,
    pub operand: JsonValue,
}

impl FilterCondition {
    /// Human-readable form recorded in query provenance.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} {} {}", self.column, self.op.as_str(), self.operand)
    }
}

/// Parses the `column -> condition` JSON map into condition structs.
///
/// # Errors
///
/// Returns [`EngineError::UnknownOperator`] for an unrecognized operator key
/// and [`EngineError::MalformedExpression`] for an operator-object that does
/// not have exactly one key, or a top-level array condition.
pub fn parse_conditions(
    map: &serde_json::Map<String, JsonValue>,
) -> Result<Vec<FilterCondition>, EngineError> {
    let mut conditions = Vec::with_capacity(map.len());
    for (column, condition) in map {
        match condition {
            JsonValue::Object(ops) => {
                if ops.len() != 1 {
                    return Err(EngineError::MalformedExpression {
                        message: format!(
                            "condition for column '{column}' must have exactly one operator, got {}",
                            ops.len()
                        ),
                    });
                }
                let (key, operand) = ops.iter().next().expect("len checked above");
                let op = FilterOp::from_key(key).ok_or_else(|| EngineError::UnknownOperator {
                    op: key.clone(),
                })?;
                if matches!(op, FilterOp::In | FilterOp::NotIn) && !operand.is_array() {
                    return Err(EngineError::MalformedExpression {
                        message: format!(
                            "operator '{}' on column '{column}' requires a list operand",
                            op.as_str()
                        ),
                    });
                }
                conditions.push(FilterCondition {
                    column: column.clone(),
                    op,
                    operand: operand.clone(),
                });
            }
            JsonValue::Array(_) => {
                return Err(EngineError::MalformedExpression {
                    message: format!(
                        "condition for column '{column}' is a list; use the 'in' operator"
                    ),
                });
            }
            primitive => conditions.push(FilterCondition {
                column: column.clone(),
                op: FilterOp::Eq,
                operand: primitive.clone(),
            }),
        }
    }
    Ok(conditions)
}

/// Evaluates one condition against one cell.
///
/// # Errors
///
/// Returns [`EngineError::NonNumericComparison`] when an ordering operator
/// meets an operand the column dtype cannot be ordered against.
pub fn cell_matches(
    cell: &Cell,
    cond: &FilterCondition,
    dtype: DType,
) -> Result<bool, EngineError> {
    if cell.is_null() {
        return Ok(false);
    }
    match cond.op {
        FilterOp::Eq => Ok(cell_equals_json(cell, &cond.operand)),
        FilterOp::Ne => Ok(!cell_equals_json(cell, &cond.operand)),
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let ordering = order_against(cell, &cond.operand).ok_or_else(|| {
                EngineError::NonNumericComparison {
                    column: cond.column.clone(),
                    dtype: dtype.tag().to_string(),
                    operand: cond.operand.to_string(),
                }
            })?;
            Ok(match cond.op {
                FilterOp::Gt => ordering.is_gt(),
                FilterOp::Gte => ordering.is_ge(),
                FilterOp::Lt => ordering.is_lt(),
                FilterOp::Lte => ordering.is_le(),
                _ => unreachable!(),
            })
        }
        FilterOp::In | FilterOp::NotIn => {
            let members = cond.operand.as_array().ok_or_else(|| {
                EngineError::MalformedExpression {
                    message: format!(
                        "operator '{}' on column '{}' requires a list operand",
                        cond.op.as_str(),
                        cond.column
                    ),
                }
            })?;
            let found = members.iter().any(|m| cell_equals_json(cell, m));
            Ok(if cond.op == FilterOp::In { found } else { !found })
        }
        FilterOp::Contains | FilterOp::StartsWith | FilterOp::EndsWith => {
            let needle = json_as_display(&cond.operand);
            let haystack = cell.display_string();
            Ok(match cond.op {
                FilterOp::Contains => haystack.contains(&needle),
                FilterOp::StartsWith => haystack.starts_with(&needle),
                FilterOp::EndsWith => haystack.ends_with(&needle),
                _ => unreachable!(),
            })
        }
    }
}

/// Equality between a cell and a JSON operand. Type mismatch is not an error,
/// just inequality.
fn cell_equals_json(cell: &Cell, operand: &JsonValue) -> bool {
    match (cell, operand) {
        (Cell::Bool(c), JsonValue::Bool(o)) => c == o,
        (Cell::Int(c), JsonValue::Number(o)) => {
            o.as_i64().map_or_else(|| o.as_f64() == cell.as_f64(), |v| *c == v)
        }
        (Cell::Float(c), JsonValue::Number(o)) => o.as_f64() == Some(*c),
        (Cell::Str(c), JsonValue::String(o)) => c == o,
        (Cell::Timestamp(c), JsonValue::Number(o)) => o.as_i64() == Some(*c),
        (Cell::Timestamp(c), JsonValue::String(o)) => parse_timestamp(o) == Some(*c),
        _ => false,
    }
}

/// Ordering between a cell and a JSON operand, when one is defined.
fn order_against(cell: &Cell, operand: &JsonValue) -> Option<std::cmp::Ordering> {
    match (cell, operand) {
        (Cell::Int(_) | Cell::Float(_), JsonValue::Number(o)) => {
            cell.as_f64().and_then(|c| c.partial_cmp(&o.as_f64()?))
        }
        (Cell::Str(c), JsonValue::String(o)) => Some(c.as_str().cmp(o.as_str())),
        (Cell::Timestamp(c), JsonValue::Number(o)) => Some(c.cmp(&o.as_i64()?)),
        (Cell::Timestamp(c), JsonValue::String(o)) => Some(c.cmp(&parse_timestamp(o)?)),
        _ => None,
    }
}

/// Operand coercion for substring operators, matching cell display rendering.
fn json_as_display(operand: &JsonValue) -> String {
    match operand {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_timestamp(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(column: &str, op: FilterOp, operand: JsonValue) -> FilterCondition {
        FilterCondition {
            column: column.to_string(),
            op,
            operand,
        }
    }

    #[test]
    fn bare_primitive_parses_as_eq() {
        let map = json!({"age": 30, "name": "alice"});
        let conditions = parse_conditions(map.as_object().unwrap()).unwrap();
        assert_eq!(conditions.len(), 2);
        assert!(conditions.iter().all(|c| c.op == FilterOp::Eq));
    }

    #[test]
    fn operator_object_parses() {
        let map = json!({"age": {"gt": 50}});
        let conditions = parse_conditions(map.as_object().unwrap()).unwrap();
        assert_eq!(conditions[0].op, FilterOp::Gt);
        assert_eq!(conditions[0].operand, json!(50));
    }

    #[test]
    fn unknown_operator_rejected() {
        let map = json!({"age": {"above": 50}});
        let err = parse_conditions(map.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::UnknownOperator { op } if op == "above"));
    }

    #[test]
    fn multiple_operator_keys_rejected() {
        let map = json!({"age": {"gt": 10, "lt": 20}});
        let err = parse_conditions(map.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedExpression { .. }));
    }

    #[test]
    fn top_level_array_rejected() {
        let map = json!({"status": ["active", "idle"]});
        let err = parse_conditions(map.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedExpression { .. }));
    }

    #[test]
    fn in_requires_list() {
        let map = json!({"status": {"in": "active"}});
        let err = parse_conditions(map.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedExpression { .. }));
    }

    #[test]
    fn numeric_ordering() {
        let c = cond("age", FilterOp::Gt, json!(50));
        assert!(cell_matches(&Cell::Int(51), &c, DType::Int64).unwrap());
        assert!(!cell_matches(&Cell::Int(50), &c, DType::Int64).unwrap());
        assert!(cell_matches(&Cell::Float(50.5), &c, DType::Float64).unwrap());
    }

    #[test]
    fn string_ordering_is_lexicographic() {
        let c = cond("name", FilterOp::Lt, json!("m"));
        assert!(cell_matches(&Cell::Str("alice".into()), &c, DType::Str).unwrap());
        assert!(!cell_matches(&Cell::Str("zed".into()), &c, DType::Str).unwrap());
    }

    #[test]
    fn ordering_type_mismatch_is_an_error() {
        let c = cond("name", FilterOp::Gt, json!(10));
        let err = cell_matches(&Cell::Str("alice".into()), &c, DType::Str).unwrap_err();
        assert!(matches!(err, EngineError::NonNumericComparison { .. }));
    }

    #[test]
    fn null_cells_never_match() {
        for op in [FilterOp::Eq, FilterOp::Ne, FilterOp::Gt, FilterOp::Contains] {
            let c = cond("x", op, json!("a"));
            assert!(!cell_matches(&Cell::Null, &c, DType::Str).unwrap());
        }
    }

    #[test]
    fn membership() {
        let c = cond("status", FilterOp::In, json!(["active", "idle"]));
        assert!(cell_matches(&Cell::Str("active".into()), &c, DType::Str).unwrap());
        assert!(!cell_matches(&Cell::Str("gone".into()), &c, DType::Str).unwrap());

        let c = cond("status", FilterOp::NotIn, json!(["active"]));
        assert!(cell_matches(&Cell::Str("gone".into()), &c, DType::Str).unwrap());
    }

    #[test]
    fn substring_operators() {
        let c = cond("name", FilterOp::Contains, json!("lic"));
        assert!(cell_matches(&Cell::Str("alice".into()), &c, DType::Str).unwrap());

        let c = cond("name", FilterOp::StartsWith, json!("al"));
        assert!(cell_matches(&Cell::Str("alice".into()), &c, DType::Str).unwrap());
        assert!(!cell_matches(&Cell::Str("bob".into()), &c, DType::Str).unwrap());

        let c = cond("name", FilterOp::EndsWith, json!("ce"));
        assert!(cell_matches(&Cell::Str("alice".into()), &c, DType::Str).unwrap());
    }

    #[test]
    fn substring_coerces_non_string_cells() {
        let c = cond("id", FilterOp::Contains, json!("23"));
        assert!(cell_matches(&Cell::Int(1234), &c, DType::Int64).unwrap());
    }

    #[test]
    fn eq_type_mismatch_is_inequality() {
        let c = cond("age", FilterOp::Eq, json!("thirty"));
        assert!(!cell_matches(&Cell::Int(30), &c, DType::Int64).unwrap());
        let c = cond("age", FilterOp::Ne, json!("thirty"));
        assert!(cell_matches(&Cell::Int(30), &c, DType::Int64).unwrap());
    }

    #[test]
    fn timestamp_comparisons() {
        let c = cond("ts", FilterOp::Gte, json!(1_000));
        assert!(cell_matches(&Cell::Timestamp(2_000), &c, DType::Timestamp).unwrap());

        let c = cond("ts", FilterOp::Lt, json!("1970-01-01T00:00:10Z"));
        assert!(cell_matches(&Cell::Timestamp(5_000), &c, DType::Timestamp).unwrap());
        assert!(!cell_matches(&Cell::Timestamp(15_000), &c, DType::Timestamp).unwrap());
    }
}
