//! Backend-agnostic structured query.
//!
//! Produced by the query builder from a `ResolvedQuery` and handed to a query
//! executor. `to_dsl` renders it as an Elasticsearch/OpenSearch request body
//! using the schema's backend field paths.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::schema::{fields, SchemaRegistry};
use crate::types::{Severity, SlotValue, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Match,
    In,
    Between,
    Gte,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Eq => "eq",
            Self::Match => "match",
            Self::In => "in",
            Self::Between => "between",
            Self::Gte => "gte",
        };
        f.write_str(name)
    }
}

/// One `field <operator> value` constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub operator: Operator,
    pub value: SlotValue,
}

/// Full-text clause over free keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMatch {
    pub field: String,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn newest_first() -> Self {
        Self {
            field: fields::TIMESTAMP.to_string(),
            order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub filters: Vec<FieldFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextMatch>,
    pub time_range: TimeRange,
    pub size: usize,
    pub sort: Sort,
}

impl StructuredQuery {
    pub fn filter(&self, field: &str) -> Option<&FieldFilter> {
        self.filters.iter().find(|f| f.field == field)
    }

    /// Renders the query as an Elasticsearch DSL request body.
    pub fn to_dsl(&self, schema: &SchemaRegistry) -> Value {
        let mut filter_clauses: Vec<Value> = Vec::new();

        if !self.time_range.all_time {
            filter_clauses.push(json!({
                "range": {
                    schema.backend_path(fields::TIMESTAMP): {
                        "gte": self.time_range.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                        "lte": self.time_range.end.to_rfc3339_opts(SecondsFormat::Secs, true),
                    }
                }
            }));
        }

        for filter in &self.filters {
            filter_clauses.push(filter_clause(schema.backend_path(&filter.field), filter));
        }

        let mut bool_query = json!({ "filter": filter_clauses });
        if let Some(text) = &self.text {
            bool_query["must"] = json!([{
                "match": {
                    schema.backend_path(&text.field): {
                        "query": text.terms.join(" "),
                        "operator": "or",
                    }
                }
            }]);
        }

        json!({
            "size": self.size,
            "track_total_hits": true,
            "sort": [{
                schema.backend_path(&self.sort.field): {
                    "order": match self.sort.order {
                        SortOrder::Asc => "asc",
                        SortOrder::Desc => "desc",
                    }
                }
            }],
            "query": { "bool": bool_query },
        })
    }
}

fn filter_clause(path: &str, filter: &FieldFilter) -> Value {
    match (&filter.value, filter.operator) {
        (SlotValue::Severity(severity), Operator::Gte) => {
            json!({ "range": { path: { "gte": severity.min_rule_level() } } })
        }
        (SlotValue::Severity(severity), _) => {
            let mut bounds = json!({ "gte": severity.min_rule_level() });
            if let Some(next) = next_severity(*severity) {
                bounds["lt"] = json!(next.min_rule_level());
            }
            json!({ "range": { path: bounds } })
        }
        (SlotValue::TextSet(values), _) => json!({ "terms": { path: values } }),
        (SlotValue::TimeRange(range), _) => json!({
            "range": {
                path: {
                    "gte": range.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                    "lte": range.end.to_rfc3339_opts(SecondsFormat::Secs, true),
                }
            }
        }),
        (value, Operator::Match) => json!({ "match": { path: value.to_string() } }),
        (value, _) => json!({ "term": { path: value.to_string() } }),
    }
}

fn next_severity(severity: Severity) -> Option<Severity> {
    match severity {
        Severity::Low => Some(Severity::Medium),
        Severity::Medium => Some(Severity::High),
        Severity::High => Some(Severity::Critical),
        Severity::Critical => None,
    }
}
