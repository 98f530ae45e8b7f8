//! Parser for the ad-hoc selection-string grammar.
//!
//! Callers route and filter queries with a constrained, SQL-like selection
//! string over five recognized columns:
//!
//! ```text
//! column := "sensor_name" | "sensor_description" | "timestamp"
//!         | "transmit_state" | "device_uuid"
//! op     := "=" | "!=" | "<" | "<=" | ">" | ">="
//! clause := column op value
//! selection := clause (" AND " clause)*
//! ```
//!
//! Values are quoted for string columns and bare integers otherwise.
//! `AND` is the only combinator; a `?` placeholder value is rejected
//! because parameterized predicates are not supported. Clauses combining
//! multiple conditions on the same column are rejected, except for the one
//! recognized pair of a lower and an upper timestamp bound.

use std::collections::BTreeSet;

use rusqlite::ToSql;
use thiserror::Error;

use sensetier_types::{DataPoint, TransmitState};

/// Errors raised while parsing a selection string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    /// The column name is not one of the five recognized columns.
    #[error("unrecognized column `{0}`")]
    UnknownColumn(String),

    /// The operator is not supported for this column.
    #[error("operator `{op}` is not supported for column `{column}`")]
    UnsupportedOperator { column: String, op: String },

    /// The value was the `?` placeholder. Parameterized predicates are a
    /// deliberate, documented restriction of this parser.
    #[error("parameterized predicates are not supported")]
    Placeholder,

    /// More than one clause on the same column, beyond the recognized
    /// timestamp range pair.
    #[error("multiple clauses on column `{0}` are not supported")]
    DuplicateColumn(String),

    /// The value could not be interpreted for this column.
    #[error("invalid value for column `{column}`: `{value}`")]
    InvalidValue { column: String, value: String },

    /// The clause did not have the shape `column op value`, or used an
    /// unsupported combinator such as `OR`.
    #[error("cannot parse clause `{0}`")]
    MalformedClause(String),

    /// A remote query needs the predicate to select exactly one sensor.
    #[error("predicate must select exactly one sensor, got {0}")]
    SensorCount(usize),
}

/// Equality or inequality filter on a text column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFilter {
    /// Equality. For sensor names this matches by prefix.
    Is(String),
    /// Inequality, excluding the exact value.
    IsNot(String),
}

/// Inclusive timestamp range in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub min: i64,
    pub max: i64,
}

impl TimeRange {
    /// The range matching every timestamp.
    pub const UNBOUNDED: TimeRange = TimeRange {
        min: i64::MIN,
        max: i64::MAX,
    };

    /// Whether a timestamp falls inside the range.
    #[must_use]
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.min && timestamp <= self.max
    }

    /// Whether either bound is set.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        *self != TimeRange::UNBOUNDED
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        TimeRange::UNBOUNDED
    }
}

/// The structured result of parsing a selection string.
///
/// All filters are optional; an empty predicate matches every data point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    /// Filter on `sensor_name`. Equality matches by prefix, inequality
    /// excludes the exact name.
    pub sensor_name: Option<TextFilter>,
    /// Filter on `sensor_description`. Equality matches sensors named
    /// either exactly `desc` or ending with `(desc)`.
    pub sensor_description: Option<TextFilter>,
    /// Inclusive timestamp range.
    pub time_range: TimeRange,
    /// Required transmit state.
    pub transmit_state: Option<TransmitState>,
    /// Required device UUID.
    pub device_uuid: Option<String>,
}

/// Which timestamp clauses have been consumed so far, to reject
/// unsupported same-column combinations.
#[derive(Default)]
struct TimestampClauses {
    exact: bool,
    lower: bool,
    upper: bool,
}

impl TimestampClauses {
    fn any(&self) -> bool {
        self.exact || self.lower || self.upper
    }
}

impl Predicate {
    /// The predicate matching every data point.
    #[must_use]
    pub fn match_all() -> Self {
        Predicate::default()
    }

    /// Parse a selection string plus its positional-arguments array.
    ///
    /// The arguments array is part of the caller contract but is not
    /// supported: any `?` placeholder in the selection raises
    /// [`PredicateError::Placeholder`].
    pub fn parse(selection: Option<&str>, _args: &[String]) -> Result<Self, PredicateError> {
        let selection = match selection {
            Some(s) if !s.trim().is_empty() => s,
            _ => return Ok(Predicate::match_all()),
        };

        let mut predicate = Predicate::match_all();
        let mut timestamp_clauses = TimestampClauses::default();

        for clause in selection.split(" AND ") {
            let clause = clause.trim();
            if clause.is_empty() {
                return Err(PredicateError::MalformedClause(selection.to_string()));
            }
            predicate.apply_clause(clause, &mut timestamp_clauses)?;
        }

        Ok(predicate)
    }

    fn apply_clause(
        &mut self,
        clause: &str,
        timestamps: &mut TimestampClauses,
    ) -> Result<(), PredicateError> {
        let (column, op, value) = split_clause(clause)?;

        match column {
            "sensor_name" => {
                if self.sensor_name.is_some() {
                    return Err(PredicateError::DuplicateColumn(column.to_string()));
                }
                self.sensor_name = Some(text_filter(column, op, value)?);
            }
            "sensor_description" => {
                if self.sensor_description.is_some() {
                    return Err(PredicateError::DuplicateColumn(column.to_string()));
                }
                self.sensor_description = Some(text_filter(column, op, value)?);
            }
            "device_uuid" => {
                if self.device_uuid.is_some() {
                    return Err(PredicateError::DuplicateColumn(column.to_string()));
                }
                match op {
                    "=" => self.device_uuid = Some(quoted_value(column, value)?),
                    _ => {
                        return Err(PredicateError::UnsupportedOperator {
                            column: column.to_string(),
                            op: op.to_string(),
                        });
                    }
                }
            }
            "transmit_state" => {
                if self.transmit_state.is_some() {
                    return Err(PredicateError::DuplicateColumn(column.to_string()));
                }
                let code = integer_value(column, value)?;
                self.transmit_state = Some(match op {
                    "=" => TransmitState::from_code(code),
                    // `!= 1` means not sent; `!=` anything else means sent
                    "!=" => {
                        if code == 1 {
                            TransmitState::NotSent
                        } else {
                            TransmitState::Sent
                        }
                    }
                    _ => {
                        return Err(PredicateError::UnsupportedOperator {
                            column: column.to_string(),
                            op: op.to_string(),
                        });
                    }
                });
            }
            "timestamp" => {
                let ts = integer_value(column, value)?;
                self.apply_timestamp_clause(op, ts, timestamps)?;
            }
            other => return Err(PredicateError::UnknownColumn(other.to_string())),
        }

        Ok(())
    }

    fn apply_timestamp_clause(
        &mut self,
        op: &str,
        value: i64,
        clauses: &mut TimestampClauses,
    ) -> Result<(), PredicateError> {
        let duplicate = || PredicateError::DuplicateColumn("timestamp".to_string());

        match op {
            "=" => {
                if clauses.any() {
                    return Err(duplicate());
                }
                clauses.exact = true;
                self.time_range = TimeRange {
                    min: value,
                    max: value,
                };
            }
            // `!=` on the timestamp leaves the range unbounded; preserved
            // from the original selection semantics.
            "!=" => {
                if clauses.any() {
                    return Err(duplicate());
                }
                clauses.exact = true;
            }
            ">" | ">=" => {
                if clauses.exact || clauses.lower {
                    return Err(duplicate());
                }
                clauses.lower = true;
                self.time_range.min = if op == ">" {
                    value.saturating_add(1)
                } else {
                    value
                };
            }
            "<" | "<=" => {
                if clauses.exact || clauses.upper {
                    return Err(duplicate());
                }
                clauses.upper = true;
                self.time_range.max = if op == "<" {
                    value.saturating_sub(1)
                } else {
                    value
                };
            }
            other => {
                return Err(PredicateError::UnsupportedOperator {
                    column: "timestamp".to_string(),
                    op: other.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Evaluate the predicate against a data point in memory.
    #[must_use]
    pub fn matches(&self, point: &DataPoint) -> bool {
        if let Some(filter) = &self.sensor_name {
            let ok = match filter {
                TextFilter::Is(prefix) => point.sensor_name.starts_with(prefix.as_str()),
                TextFilter::IsNot(name) => point.sensor_name != *name,
            };
            if !ok {
                return false;
            }
        }

        if let Some(filter) = &self.sensor_description {
            let (description, negated) = match filter {
                TextFilter::Is(d) => (d, false),
                TextFilter::IsNot(d) => (d, true),
            };
            let matched = description_matches(&point.sensor_name, description);
            if matched == negated {
                return false;
            }
        }

        if !self.time_range.contains(point.timestamp) {
            return false;
        }

        if let Some(state) = self.transmit_state
            && point.transmit_state != state
        {
            return false;
        }

        if let Some(uuid) = &self.device_uuid
            && point.device_uuid.as_deref() != Some(uuid.as_str())
        {
            return false;
        }

        true
    }

    /// Build the SQL WHERE clause (including the `WHERE` keyword, or empty
    /// for a match-all predicate) and its bound parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(filter) = &self.sensor_name {
            match filter {
                TextFilter::Is(prefix) => {
                    conditions.push("sensor_name LIKE ? ESCAPE '\\'".to_string());
                    params.push(Box::new(format!("{}%", escape_like(prefix))));
                }
                TextFilter::IsNot(name) => {
                    conditions.push("sensor_name != ?".to_string());
                    params.push(Box::new(name.clone()));
                }
            }
        }

        if let Some(filter) = &self.sensor_description {
            let (description, negated) = match filter {
                TextFilter::Is(d) => (d, false),
                TextFilter::IsNot(d) => (d, true),
            };
            let test = "(sensor_name LIKE ? ESCAPE '\\' OR sensor_name = ?)";
            if negated {
                conditions.push(format!("NOT {test}"));
            } else {
                conditions.push(test.to_string());
            }
            params.push(Box::new(format!("%({})", escape_like(description))));
            params.push(Box::new(description.clone()));
        }

        if self.time_range.min > i64::MIN {
            conditions.push("timestamp >= ?".to_string());
            params.push(Box::new(self.time_range.min));
        }
        if self.time_range.max < i64::MAX {
            conditions.push("timestamp <= ?".to_string());
            params.push(Box::new(self.time_range.max));
        }

        if let Some(state) = self.transmit_state {
            conditions.push("transmit_state = ?".to_string());
            params.push(Box::new(state.code()));
        }

        if let Some(uuid) = &self.device_uuid {
            conditions.push("device_uuid = ?".to_string());
            params.push(Box::new(uuid.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Resolve the sensor names this predicate selects, given the set of
    /// names currently present in storage.
    ///
    /// An exact match wins; prefix matches are used only when no exact
    /// match exists. A name absent from storage is still returned, because
    /// the remote archive may hold sensors the local tiers have never seen.
    #[must_use]
    pub fn resolve_sensor_names(&self, known: &BTreeSet<String>) -> Vec<String> {
        let mut candidates: Vec<String> = match &self.sensor_name {
            Some(TextFilter::Is(name)) => {
                if known.contains(name) {
                    vec![name.clone()]
                } else {
                    let prefixed: Vec<String> = known
                        .iter()
                        .filter(|k| k.starts_with(name.as_str()))
                        .cloned()
                        .collect();
                    if prefixed.is_empty() {
                        vec![name.clone()]
                    } else {
                        prefixed
                    }
                }
            }
            Some(TextFilter::IsNot(name)) => {
                known.iter().filter(|k| *k != name).cloned().collect()
            }
            None => known.iter().cloned().collect(),
        };

        if let Some(filter) = &self.sensor_description {
            let (description, negated) = match filter {
                TextFilter::Is(d) => (d, false),
                TextFilter::IsNot(d) => (d, true),
            };
            candidates.retain(|name| description_matches(name, description) != negated);
        }

        candidates
    }
}

/// Whether a sensor name matches a description filter: sensors are keyed
/// either exactly `description` or as `name (description)`.
fn description_matches(sensor_name: &str, description: &str) -> bool {
    sensor_name == description || sensor_name.ends_with(&format!("({description})"))
}

/// Escape LIKE wildcards in user-supplied text.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Split one clause into `(column, op, value)`, normalizing whitespace
/// around the operator and rejecting trailing tokens (e.g. `OR ...`).
fn split_clause(clause: &str) -> Result<(&str, &str, &str), PredicateError> {
    let malformed = || PredicateError::MalformedClause(clause.to_string());

    let op_start = clause
        .find(['=', '!', '<', '>'])
        .ok_or_else(malformed)?;
    let rest = &clause[op_start..];

    let op = if rest.starts_with("!=") || rest.starts_with("<=") || rest.starts_with(">=") {
        &rest[..2]
    } else if rest.starts_with(['=', '<', '>']) {
        &rest[..1]
    } else {
        return Err(malformed());
    };

    let column = clause[..op_start].trim_end();
    if column.is_empty() || !column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(malformed());
    }

    let value = rest[op.len()..].trim_start();
    if value.is_empty() {
        return Err(malformed());
    }

    let value = if let Some(quoted) = value.strip_prefix('\'') {
        let end = quoted.find('\'').ok_or_else(malformed)?;
        if !quoted[end + 1..].trim().is_empty() {
            return Err(malformed());
        }
        // keep the quotes so the column handlers can tell quoted from bare
        &value[..end + 2]
    } else {
        match value.find(char::is_whitespace) {
            // a trailing token inside a clause means an unsupported combinator
            Some(_) => return Err(malformed()),
            None => value,
        }
    };

    Ok((column, op, value))
}

/// Require a quoted value for a string column and strip the quotes.
fn quoted_value(column: &str, raw: &str) -> Result<String, PredicateError> {
    let inner = raw
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .ok_or_else(|| PredicateError::InvalidValue {
            column: column.to_string(),
            value: raw.to_string(),
        })?;

    if inner == "?" {
        return Err(PredicateError::Placeholder);
    }

    Ok(inner.to_string())
}

/// Require a bare integer value for a numeric column.
fn integer_value(column: &str, raw: &str) -> Result<i64, PredicateError> {
    if raw == "?" {
        return Err(PredicateError::Placeholder);
    }

    raw.parse::<i64>()
        .map_err(|_| PredicateError::InvalidValue {
            column: column.to_string(),
            value: raw.to_string(),
        })
}

fn text_filter(column: &str, op: &str, value: &str) -> Result<TextFilter, PredicateError> {
    let inner = quoted_value(column, value)?;
    match op {
        "=" => Ok(TextFilter::Is(inner)),
        "!=" => Ok(TextFilter::IsNot(inner)),
        other => Err(PredicateError::UnsupportedOperator {
            column: column.to_string(),
            op: other.to_string(),
        }),
    }
}
