use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::{ColumnType, Filter, FilterError, Filterable, filter_rows};

const NET_IMPROVEMENT_FIELD: &str = "net_improvement";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),
    #[error("cannot sort by '{field}'")]
    UnsortableField { field: String },
    #[error("{0}")]
    InvalidParameter(String),
}

/// Shortcut orderings on `net_improvement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Regression,
    Improvement,
}

impl SortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regression => "regression",
            Self::Improvement => "improvement",
        }
    }
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "regression" => Ok(Self::Regression),
            "improvement" => Ok(Self::Improvement),
            other => Err(format!(
                "invalid sortBy '{other}', expected one of: regression, improvement"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("invalid sort '{other}', expected one of: asc, desc")),
        }
    }
}

/// Which pair of windows a view compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Current window against the previous one.
    #[default]
    Default,
    /// The last two days against the current window.
    TwoDay,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::TwoDay => "twoDay",
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" | "default" => Ok(Self::Default),
            "twoDay" | "two_day" => Ok(Self::TwoDay),
            other => Err(format!(
                "invalid period '{other}', expected one of: default, twoDay"
            )),
        }
    }
}

/// Filter, order and truncate a row list the way the table views ask for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowQuery {
    pub filter: Option<Filter>,
    pub sort_by: Option<SortBy>,
    pub sort_field: Option<String>,
    pub direction: SortDirection,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn apply<R: Filterable>(&self, rows: Vec<R>) -> Result<Vec<R>, QueryError> {
        let mut rows = match &self.filter {
            Some(filter) => filter_rows(rows, filter)?,
            None => rows,
        };

        if let Some(sort_by) = self.sort_by {
            sort_numerically(&mut rows, NET_IMPROVEMENT_FIELD, match sort_by {
                SortBy::Regression => SortDirection::Asc,
                SortBy::Improvement => SortDirection::Desc,
            });
        } else if let Some(field) = self.sort_field.as_deref() {
            match R::column_type(field) {
                Some(ColumnType::Numerical) => sort_numerically(&mut rows, field, self.direction),
                Some(ColumnType::String) => sort_lexically(&mut rows, field, self.direction),
                _ => {
                    return Err(QueryError::UnsortableField {
                        field: field.to_owned(),
                    });
                }
            }
        }

        if let Some(limit) = self.limit.filter(|limit| *limit > 0) {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn sort_numerically<R: Filterable>(rows: &mut [R], field: &str, direction: SortDirection) {
    rows.sort_by(|left, right| {
        let left = left.numerical_value(field).unwrap_or(0.0);
        let right = right.numerical_value(field).unwrap_or(0.0);
        directed(
            left.partial_cmp(&right).unwrap_or(Ordering::Equal),
            direction,
        )
    });
}

fn sort_lexically<R: Filterable>(rows: &mut [R], field: &str, direction: SortDirection) {
    rows.sort_by(|left, right| {
        directed(
            left.string_value(field)
                .unwrap_or("")
                .cmp(right.string_value(field).unwrap_or("")),
            direction,
        )
    });
}

#[cfg(test)]
mod tests {
    use sift_core::JobResult;

    use super::*;
    use crate::filter::FilterItem;
    use crate::rows::{JobRow, job_rows};

    fn rows() -> Vec<JobRow> {
        let job = |name: &str, pass: f64| JobResult {
            name: name.to_owned(),
            pass_percentage: pass,
            successes: 1,
            ..JobResult::default()
        };
        let current = vec![job("c-upgrade", 50.0), job("a", 90.0), job("b", 70.0)];
        let previous = vec![job("c-upgrade", 80.0), job("a", 60.0), job("b", 70.0)];
        job_rows(&current, &previous)
    }

    fn names(rows: &[JobRow]) -> Vec<&str> {
        rows.iter().map(|row| row.name.as_str()).collect()
    }

    #[test]
    fn regression_and_improvement_order_by_net_improvement() {
        let query = RowQuery {
            sort_by: Some(SortBy::Regression),
            ..RowQuery::default()
        };
        assert_eq!(names(&query.apply(rows()).expect("query")), vec!["c-upgrade", "b", "a"]);

        let query = RowQuery {
            sort_by: Some(SortBy::Improvement),
            limit: Some(1),
            ..RowQuery::default()
        };
        assert_eq!(names(&query.apply(rows()).expect("query")), vec!["a"]);
    }

    #[test]
    fn sort_field_and_direction() {
        let query = RowQuery {
            sort_field: Some("name".to_owned()),
            direction: SortDirection::Desc,
            ..RowQuery::default()
        };
        assert_eq!(names(&query.apply(rows()).expect("query")), vec!["c-upgrade", "b", "a"]);

        let query = RowQuery {
            sort_field: Some("current_pass_percentage".to_owned()),
            ..RowQuery::default()
        };
        assert_eq!(names(&query.apply(rows()).expect("query")), vec!["c-upgrade", "b", "a"]);

        let query = RowQuery {
            sort_field: Some("tags".to_owned()),
            ..RowQuery::default()
        };
        assert!(matches!(
            query.apply(rows()),
            Err(QueryError::UnsortableField { .. })
        ));
    }

    #[test]
    fn filter_runs_before_sort_and_limit() {
        let query = RowQuery {
            filter: Some(Filter::and(vec![FilterItem::new("tags", "contains", "upgrade")])),
            limit: Some(0),
            ..RowQuery::default()
        };
        assert_eq!(names(&query.apply(rows()).expect("query")), vec!["c-upgrade"]);
    }

    #[test]
    fn parameters_parse() {
        assert_eq!("twoDay".parse::<Period>(), Ok(Period::TwoDay));
        assert_eq!("".parse::<Period>(), Ok(Period::Default));
        assert_eq!("DESC".parse::<SortDirection>(), Ok(SortDirection::Desc));
        assert!("sideways".parse::<SortBy>().is_err());
    }
}
