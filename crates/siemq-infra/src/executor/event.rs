//! Normalised security event and the Wazuh alert mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use siemq_core::{fields, Severity};

use super::ExecutionError;

/// One alert as returned to API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Rule groups, e.g. `["authentication_failed", "sshd"]`
    pub event_type: Vec<String>,
    pub source_ip: Option<String>,
    pub destination_ip: Option<String>,
    pub user: Option<String>,
    pub severity: Option<Severity>,
    pub rule_level: u64,
    pub rule_id: Option<String>,
    pub host: Option<String>,
    pub file_path: Option<String>,
    pub description: String,
    pub details: String,
}

impl SecurityEvent {
    /// Maps a Wazuh alert document (`_source`) into an event.
    ///
    /// `fallback_id` is used when the document carries no id of its own.
    pub fn from_wazuh(source: &Value, fallback_id: &str) -> Result<Self, ExecutionError> {
        let raw_time = str_at(source, &["@timestamp"])
            .or_else(|| str_at(source, &["timestamp"]))
            .ok_or_else(|| ExecutionError::bad_response(format!("event {} has no timestamp", fallback_id)))?;
        let timestamp = parse_timestamp(&raw_time)?;

        let rule_level = source
            .pointer("/rule/level")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0);

        let event_type = source
            .pointer("/rule/groups")
            .and_then(Value::as_array)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let description = str_at(source, &["rule", "description"])
            .unwrap_or_else(|| "No description available".to_string());

        let id = str_at(source, &["id"])
            .or_else(|| str_at(source, &["event_id"]))
            .unwrap_or_else(|| fallback_id.to_string());

        let mut event = Self {
            id,
            timestamp,
            event_type,
            source_ip: str_at(source, &["data", "srcip"]).or_else(|| str_at(source, &["data", "src_ip"])),
            destination_ip: str_at(source, &["data", "dstip"])
                .or_else(|| str_at(source, &["data", "dst_ip"])),
            user: str_at(source, &["data", "user"])
                .or_else(|| str_at(source, &["data", "srcuser"]))
                .or_else(|| str_at(source, &["data", "username"])),
            severity: Severity::from_rule_level(rule_level),
            rule_level,
            rule_id: source.pointer("/rule/id").and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            host: str_at(source, &["agent", "name"]),
            file_path: str_at(source, &["syscheck", "path"]),
            description,
            details: String::new(),
        };
        event.details = event.render_details(str_at(source, &["data", "protocol"]));
        Ok(event)
    }

    /// Values of a logical schema field, as strings.
    pub fn values(&self, field: &str) -> Vec<String> {
        let single = |v: &Option<String>| v.iter().cloned().collect::<Vec<_>>();
        match field {
            fields::EVENT_TYPE => self.event_type.clone(),
            fields::SOURCE_IP => single(&self.source_ip),
            fields::DESTINATION_IP => single(&self.destination_ip),
            fields::USER => single(&self.user),
            fields::HOST => single(&self.host),
            fields::FILE_PATH => single(&self.file_path),
            fields::SEVERITY => self.severity.iter().map(|s| s.to_string()).collect(),
            fields::MESSAGE => vec![self.description.clone()],
            fields::TIMESTAMP => vec![self.timestamp.to_rfc3339()],
            _ => Vec::new(),
        }
    }

    fn render_details(&self, protocol: Option<String>) -> String {
        let mut details = self.description.clone();
        if let Some(ip) = &self.source_ip {
            details.push_str(&format!(" | Source IP: {}", ip));
        }
        if let Some(user) = &self.user {
            details.push_str(&format!(" | User: {}", user));
        }
        if let Some(protocol) = protocol {
            details.push_str(&format!(" | Protocol: {}", protocol));
        }
        details
    }
}

fn str_at(source: &Value, path: &[&str]) -> Option<String> {
    let mut current = source;
    for key in path {
        current = current.get(key)?;
    }
    match current {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Accepts RFC 3339 and the `+0000` offset form Wazuh writes.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ExecutionError> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ExecutionError::bad_response(format!("invalid timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_from_wazuh_alert() {
        let source = json!({
            "@timestamp": "2024-03-10T11:58:00.000+0000",
            "rule": {
                "id": 5710,
                "level": 10,
                "description": "sshd: Attempt to login using a non-existent user",
                "groups": ["syslog", "sshd", "authentication_failed"]
            },
            "agent": { "name": "web01" },
            "data": { "srcip": "203.0.113.15", "srcuser": "admin", "protocol": "ssh" }
        });

        let event = SecurityEvent::from_wazuh(&source, "hit-1").unwrap();
        assert_eq!(event.id, "hit-1");
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 10, 11, 58, 0).unwrap()
        );
        assert_eq!(event.severity, Some(Severity::Critical));
        assert_eq!(event.rule_id.as_deref(), Some("5710"));
        assert_eq!(event.source_ip.as_deref(), Some("203.0.113.15"));
        assert_eq!(event.user.as_deref(), Some("admin"));
        assert_eq!(event.host.as_deref(), Some("web01"));
        assert_eq!(
            event.details,
            "sshd: Attempt to login using a non-existent user | Source IP: 203.0.113.15 | User: admin | Protocol: ssh"
        );
    }

    #[test]
    fn test_level_zero_has_no_severity() {
        let source = json!({ "timestamp": "2024-03-10T12:00:00Z", "rule": { "level": 0 } });
        let event = SecurityEvent::from_wazuh(&source, "x").unwrap();
        assert_eq!(event.severity, None);
        assert_eq!(event.description, "No description available");
    }

    #[test]
    fn test_missing_timestamp_is_rejected() {
        let source = json!({ "rule": { "level": 3 } });
        let err = SecurityEvent::from_wazuh(&source, "x").unwrap_err();
        assert!(matches!(err, ExecutionError::BadResponse(_)));
    }

    #[test]
    fn test_values_by_field() {
        let source = json!({
            "timestamp": "2024-03-10T12:00:00Z",
            "rule": { "level": 6, "groups": ["malware"] },
            "syscheck": { "path": "/etc/passwd" }
        });
        let event = SecurityEvent::from_wazuh(&source, "x").unwrap();
        assert_eq!(event.values(fields::EVENT_TYPE), vec!["malware".to_string()]);
        assert_eq!(event.values(fields::SEVERITY), vec!["medium".to_string()]);
        assert_eq!(event.values(fields::FILE_PATH), vec!["/etc/passwd".to_string()]);
        assert!(event.values(fields::USER).is_empty());
        assert!(event.values("nope").is_empty());
    }
}
