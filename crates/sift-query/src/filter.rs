use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Numerical,
    Array,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Numerical => "numerical",
            Self::Array => "array",
        }
    }
}

/// A row the filter engine can evaluate. Column types are a property of the
/// row type, so a filter is checked against them once before any row is seen.
pub trait Filterable {
    fn column_type(field: &str) -> Option<ColumnType>;

    fn string_value(&self, field: &str) -> Option<&str>;

    fn numerical_value(&self, field: &str) -> Option<f64>;

    fn array_value(&self, field: &str) -> Option<&[String]>;
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("{field}: unknown field or field type")]
    UnknownField { field: String },
    #[error("unknown {column} field operator '{operator}' for {field}")]
    UnsupportedOperator {
        field: String,
        operator: String,
        column: &'static str,
    },
    #[error("{field}: '{value}' is not a number")]
    InvalidNumber { field: String, value: String },
    #[error("{field}: row has no {column} value")]
    MissingValue { field: String, column: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkOperator {
    #[default]
    And,
    Or,
}

/// One `(field, operator, value)` clause as sent by the data-table frontend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FilterItem {
    pub column_field: String,
    pub operator_value: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl FilterItem {
    pub fn new(field: &str, operator: &str, value: &str) -> Self {
        Self {
            column_field: field.to_owned(),
            operator_value: operator.to_owned(),
            value: Some(value.to_owned()),
        }
    }

    fn value(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// A flat clause list joined by a single link operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub items: Vec<FilterItem>,
    #[serde(default)]
    pub link_operator: LinkOperator,
}

impl Filter {
    pub fn from_json(raw: &str) -> Result<Self, FilterError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn and(items: Vec<FilterItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn or(items: Vec<FilterItem>) -> Self {
        Self {
            items,
            link_operator: LinkOperator::Or,
            ..Self::default()
        }
    }

    pub fn compile<R: Filterable>(&self) -> Result<CompiledFilter, FilterError> {
        let clauses = self
            .items
            .iter()
            .map(compile_clause::<R>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledFilter {
            clauses,
            link_operator: self.link_operator,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringOperator {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    IsEmpty,
    IsNotEmpty,
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    String {
        field: String,
        operator: StringOperator,
        value: String,
    },
    /// `None` for comparisons with an empty value, which match every row.
    Numeric {
        field: String,
        operator: NumericOperator,
        value: Option<f64>,
    },
    Array {
        field: String,
        needle: String,
    },
}

/// Accepts both the spaced spellings ("starts with") and hyphenated ones.
fn operator_key(operator: &str) -> String {
    operator.trim().to_ascii_lowercase().replace('-', " ")
}

fn unsupported(item: &FilterItem, column: ColumnType) -> FilterError {
    FilterError::UnsupportedOperator {
        field: item.column_field.clone(),
        operator: item.operator_value.clone(),
        column: column.as_str(),
    }
}

fn compile_clause<R: Filterable>(item: &FilterItem) -> Result<Clause, FilterError> {
    let field = item.column_field.clone();
    let column = R::column_type(&field).ok_or_else(|| FilterError::UnknownField {
        field: field.clone(),
    })?;

    match column {
        ColumnType::String => {
            let operator = match operator_key(&item.operator_value).as_str() {
                "contains" => StringOperator::Contains,
                "equals" => StringOperator::Equals,
                "starts with" => StringOperator::StartsWith,
                "ends with" => StringOperator::EndsWith,
                "is empty" => StringOperator::IsEmpty,
                "is not empty" => StringOperator::IsNotEmpty,
                _ => return Err(unsupported(item, column)),
            };
            Ok(Clause::String {
                field,
                operator,
                value: item.value().to_owned(),
            })
        }
        ColumnType::Numerical => {
            let operator = match operator_key(&item.operator_value).as_str() {
                "=" => NumericOperator::Eq,
                "!=" => NumericOperator::Ne,
                ">" => NumericOperator::Gt,
                "<" => NumericOperator::Lt,
                ">=" => NumericOperator::Ge,
                "<=" => NumericOperator::Le,
                "is empty" => NumericOperator::IsEmpty,
                "is not empty" => NumericOperator::IsNotEmpty,
                _ => return Err(unsupported(item, column)),
            };
            let raw = item.value().trim();
            let value = if raw.is_empty() {
                None
            } else {
                Some(
                    raw.parse::<f64>()
                        .map_err(|_| FilterError::InvalidNumber {
                            field: field.clone(),
                            value: raw.to_owned(),
                        })?,
                )
            };
            Ok(Clause::Numeric {
                field,
                operator,
                value,
            })
        }
        ColumnType::Array => match operator_key(&item.operator_value).as_str() {
            "contains" => Ok(Clause::Array {
                field,
                needle: item.value().to_owned(),
            }),
            _ => Err(unsupported(item, column)),
        },
    }
}

impl Clause {
    fn matches<R: Filterable>(&self, row: &R) -> Result<bool, FilterError> {
        match self {
            Self::String {
                field,
                operator,
                value,
            } => {
                let actual = row
                    .string_value(field)
                    .ok_or_else(|| FilterError::MissingValue {
                        field: field.clone(),
                        column: ColumnType::String.as_str(),
                    })?;
                Ok(match operator {
                    StringOperator::Contains => actual.contains(value.as_str()),
                    StringOperator::Equals => actual == value,
                    StringOperator::StartsWith => actual.starts_with(value.as_str()),
                    StringOperator::EndsWith => actual.ends_with(value.as_str()),
                    StringOperator::IsEmpty => actual.is_empty(),
                    StringOperator::IsNotEmpty => !actual.is_empty(),
                })
            }
            Self::Numeric {
                field,
                operator,
                value,
            } => {
                let actual =
                    row.numerical_value(field)
                        .ok_or_else(|| FilterError::MissingValue {
                            field: field.clone(),
                            column: ColumnType::Numerical.as_str(),
                        })?;
                Ok(match (operator, value) {
                    (NumericOperator::IsEmpty, _) => actual == 0.0,
                    (NumericOperator::IsNotEmpty, _) => actual != 0.0,
                    (_, None) => true,
                    (NumericOperator::Eq, Some(value)) => actual == *value,
                    (NumericOperator::Ne, Some(value)) => actual != *value,
                    (NumericOperator::Gt, Some(value)) => actual > *value,
                    (NumericOperator::Lt, Some(value)) => actual < *value,
                    (NumericOperator::Ge, Some(value)) => actual >= *value,
                    (NumericOperator::Le, Some(value)) => actual <= *value,
                })
            }
            Self::Array { field, needle } => {
                let values = row
                    .array_value(field)
                    .ok_or_else(|| FilterError::MissingValue {
                        field: field.clone(),
                        column: ColumnType::Array.as_str(),
                    })?;
                Ok(values.iter().any(|value| value.contains(needle.as_str())))
            }
        }
    }
}

/// A filter whose clauses have been checked against one row type.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    clauses: Vec<Clause>,
    link_operator: LinkOperator,
}

impl CompiledFilter {
    /// An empty clause list matches every row under either link operator.
    pub fn matches<R: Filterable>(&self, row: &R) -> Result<bool, FilterError> {
        if self.clauses.is_empty() {
            return Ok(true);
        }
        match self.link_operator {
            LinkOperator::And => {
                for clause in &self.clauses {
                    if !clause.matches(row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            LinkOperator::Or => {
                for clause in &self.clauses {
                    if clause.matches(row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Keeps the rows matching `filter`, preserving order. Any clause error
/// fails the whole call rather than dropping rows.
pub fn filter_rows<R: Filterable>(rows: Vec<R>, filter: &Filter) -> Result<Vec<R>, FilterError> {
    let compiled = filter.compile::<R>()?;
    let total = rows.len();
    let mut kept = Vec::with_capacity(total);
    for row in rows {
        if compiled.matches(&row)? {
            kept.push(row);
        }
    }
    tracing::debug!(
        clauses = filter.items.len(),
        total,
        kept = kept.len(),
        "applied row filter"
    );
    Ok(kept)
}
