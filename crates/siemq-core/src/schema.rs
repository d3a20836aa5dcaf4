//! Schema registry.
//!
//! Static description of the searchable event fields, their value types and
//! the operators each type accepts. The registry is built once at startup and
//! shared read-only (`Arc<SchemaRegistry>`) by the extractor, merger and
//! query builder.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{SchemaError, SlotError, ValidationError};
use crate::query::Operator;
use crate::types::SlotValue;

/// Canonical field names of the standard event schema.
pub mod fields {
    pub const TIMESTAMP: &str = "timestamp";
    pub const EVENT_TYPE: &str = "event_type";
    pub const SOURCE_IP: &str = "source_ip";
    pub const DESTINATION_IP: &str = "destination_ip";
    pub const USER: &str = "user";
    pub const SEVERITY: &str = "severity";
    pub const HOST: &str = "host";
    pub const FILE_PATH: &str = "file_path";
    pub const MESSAGE: &str = "message";
}

/// Declared value type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    StringSet,
    TimeRange,
    Ip,
    Severity,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::StringSet => "string_set",
            Self::TimeRange => "time_range",
            Self::Ip => "ip",
            Self::Severity => "severity",
        };
        f.write_str(name)
    }
}

/// A single searchable field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    /// Path of the field in the search backend's documents
    pub backend_path: String,
}

impl FieldSpec {
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        backend_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            backend_path: backend_path.into(),
        }
    }
}

/// Read-only registry of event fields.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    fields: BTreeMap<String, FieldSpec>,
}

impl SchemaRegistry {
    pub fn new(specs: impl IntoIterator<Item = FieldSpec>) -> Self {
        Self {
            fields: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    /// The Wazuh-shaped schema the engine ships with.
    pub fn standard() -> Self {
        Self::new([
            FieldSpec::new(fields::TIMESTAMP, FieldType::TimeRange, "@timestamp"),
            FieldSpec::new(fields::EVENT_TYPE, FieldType::StringSet, "rule.groups"),
            FieldSpec::new(fields::SOURCE_IP, FieldType::Ip, "data.srcip"),
            FieldSpec::new(fields::DESTINATION_IP, FieldType::Ip, "data.dstip"),
            FieldSpec::new(fields::USER, FieldType::String, "data.user"),
            FieldSpec::new(fields::SEVERITY, FieldType::Severity, "rule.level"),
            FieldSpec::new(fields::HOST, FieldType::String, "agent.name"),
            FieldSpec::new(fields::FILE_PATH, FieldType::String, "syscheck.path"),
            FieldSpec::new(fields::MESSAGE, FieldType::String, "rule.description"),
        ])
    }

    /// Field name to declared type.
    pub fn fields(&self) -> BTreeMap<&str, FieldType> {
        self.fields
            .iter()
            .map(|(name, spec)| (name.as_str(), spec.field_type))
            .collect()
    }

    pub fn field(&self, name: &str) -> Result<&FieldSpec, SchemaError> {
        self.fields
            .get(name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))
    }

    pub fn field_type(&self, name: &str) -> Result<FieldType, SchemaError> {
        self.field(name).map(|spec| spec.field_type)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Backend document path, or the field name itself when unregistered.
    pub fn backend_path<'a>(&'a self, name: &'a str) -> &'a str {
        self.fields
            .get(name)
            .map(|spec| spec.backend_path.as_str())
            .unwrap_or(name)
    }

    /// Operators a value of the given type can be filtered with.
    pub fn operators_for(field_type: FieldType) -> &'static [Operator] {
        match field_type {
            FieldType::String => &[Operator::Eq, Operator::Match],
            FieldType::StringSet => &[Operator::In],
            FieldType::TimeRange => &[Operator::Between],
            FieldType::Ip => &[Operator::Eq],
            FieldType::Severity => &[Operator::Eq, Operator::Gte],
        }
    }

    /// Fails unless `field` exists and accepts `operator`.
    pub fn check_operator(&self, field: &str, operator: Operator) -> Result<FieldType, SchemaError> {
        let field_type = self.field_type(field)?;
        if Self::operators_for(field_type).contains(&operator) {
            Ok(field_type)
        } else {
            Err(SchemaError::UnsupportedOperator {
                field: field.to_string(),
                operator,
                field_type,
            })
        }
    }

    /// Checks that a slot value agrees with the field's declared type.
    pub fn validate_slot(&self, field: &str, value: &SlotValue) -> Result<(), SlotError> {
        let expected = self.field_type(field)?;
        let actual = value.field_type();
        if expected != actual {
            return Err(ValidationError::TypeMismatch {
                field: field.to_string(),
                expected,
                actual,
            }
            .into());
        }

        if let SlotValue::Text(text) = value {
            if text.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: field.to_string(),
                    reason: "empty value".to_string(),
                }
                .into());
            }
        }
        if let SlotValue::TextSet(values) = value {
            if values.is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: field.to_string(),
                    reason: "empty value set".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
