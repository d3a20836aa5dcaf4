//! Query building module.
//!
//! Turns a [`ResolvedQuery`] into a backend-agnostic [`StructuredQuery`].

use siemq_core::{
    fields, FieldFilter, FieldType, Operator, ResolvedQuery, SchemaError, SchemaRegistry, Sort,
    StructuredQuery, TextMatch,
};
use std::sync::Arc;
use tracing::debug;

/// Pure builder from resolved queries to structured queries.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    schema: Arc<SchemaRegistry>,
}

impl QueryBuilder {
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Operator used for a field of the given type.
    pub fn operator_for(field_type: FieldType) -> Operator {
        match field_type {
            FieldType::String | FieldType::Ip => Operator::Eq,
            FieldType::StringSet => Operator::In,
            FieldType::TimeRange => Operator::Between,
            FieldType::Severity => Operator::Gte,
        }
    }

    /// Builds the structured query.
    ///
    /// Fails with a [`SchemaError`] on an unregistered field or an operator the
    /// field's type does not accept.
    pub fn build(&self, resolved: &ResolvedQuery) -> Result<StructuredQuery, SchemaError> {
        self.schema
            .check_operator(fields::TIMESTAMP, Operator::Between)?;

        let mut filters = Vec::with_capacity(resolved.slots.len());
        for (field, value) in &resolved.slots {
            let operator = Self::operator_for(self.schema.field_type(field)?);
            self.schema.check_operator(field, operator)?;
            filters.push(FieldFilter {
                field: field.clone(),
                operator,
                value: value.clone(),
            });
        }

        let text = if resolved.keywords.is_empty() {
            None
        } else {
            self.schema.check_operator(fields::MESSAGE, Operator::Match)?;
            Some(TextMatch {
                field: fields::MESSAGE.to_string(),
                terms: resolved.keywords.clone(),
            })
        };

        debug!(
            filters = filters.len(),
            keywords = resolved.keywords.len(),
            size = resolved.size,
            "Built structured query"
        );

        Ok(StructuredQuery {
            filters,
            text,
            time_range: resolved.time_range,
            size: resolved.size,
            sort: Sort::newest_first(),
        })
    }
}
