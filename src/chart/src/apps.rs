//! Application state model and kubectl JSON parsing.

use serde::{Deserialize, Serialize};

/// Sync state reported by the GitOps controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Synced,
    OutOfSync,
    Unknown,
}

impl SyncState {
    fn parse(s: &str) -> Self {
        match s {
            "Synced" => SyncState::Synced,
            "OutOfSync" => SyncState::OutOfSync,
            _ => SyncState::Unknown,
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncState::Synced => "Synced",
            SyncState::OutOfSync => "OutOfSync",
            SyncState::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Health state reported by the GitOps controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Progressing,
    Degraded,
    Missing,
    Suspended,
    Unknown,
}

impl HealthState {
    fn parse(s: &str) -> Self {
        match s {
            "Healthy" => HealthState::Healthy,
            "Progressing" => HealthState::Progressing,
            "Degraded" => HealthState::Degraded,
            "Missing" => HealthState::Missing,
            "Suspended" => HealthState::Suspended,
            _ => HealthState::Unknown,
        }
    }

    /// States that indicate the application will not recover on its own.
    pub fn is_terminal_bad(self) -> bool {
        matches!(self, HealthState::Degraded | HealthState::Missing)
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthState::Healthy => "Healthy",
            HealthState::Progressing => "Progressing",
            HealthState::Degraded => "Degraded",
            HealthState::Missing => "Missing",
            HealthState::Suspended => "Suspended",
            HealthState::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

const MESSAGE_LIMIT: usize = 120;

/// Last observed state of one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStatus {
    pub name: String,
    pub sync: SyncState,
    pub health: HealthState,
    pub message: String,
}

impl AppStatus {
    pub fn unknown(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sync: SyncState::Unknown,
            health: HealthState::Unknown,
            message: message.into(),
        }
    }

    pub fn converged(&self) -> bool {
        self.sync == SyncState::Synced && self.health == HealthState::Healthy
    }
}

/// Last-observed states of every known application, sorted by name.
pub type Snapshot = Vec<AppStatus>;

/// Parse one Application object as printed by the Kubernetes client.
pub fn parse_application(value: &serde_json::Value) -> Option<AppStatus> {
    let name = value.get("metadata")?.get("name")?.as_str()?.to_string();
    let status = value.get("status");
    let sync = status
        .and_then(|s| s.get("sync"))
        .and_then(|s| s.get("status"))
        .and_then(|s| s.as_str())
        .map(SyncState::parse)
        .unwrap_or(SyncState::Unknown);
    let health = status
        .and_then(|s| s.get("health"))
        .and_then(|h| h.get("status"))
        .and_then(|h| h.as_str())
        .map(HealthState::parse)
        .unwrap_or(HealthState::Unknown);
    let message = extract_message(status).unwrap_or_default();
    Some(AppStatus {
        name,
        sync,
        health,
        message,
    })
}

/// Names of child Application resources referenced by this application.
pub fn child_application_names(value: &serde_json::Value) -> Vec<String> {
    value
        .get("status")
        .and_then(|s| s.get("resources"))
        .and_then(|r| r.as_array())
        .map(|resources| {
            resources
                .iter()
                .filter(|r| r.get("kind").and_then(|k| k.as_str()) == Some("Application"))
                .filter_map(|r| r.get("name").and_then(|n| n.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Names from an Application list document.
pub fn parse_application_names(bytes: &[u8]) -> Option<Vec<String>> {
    let parsed: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    let items = parsed.get("items")?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| item.get("metadata")?.get("name")?.as_str().map(str::to_string))
            .collect(),
    )
}

/// Full statuses from an Application list document, sorted by name.
pub fn parse_application_list(bytes: &[u8]) -> Snapshot {
    let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return Vec::new();
    };
    let mut snapshot: Snapshot = parsed
        .get("items")
        .and_then(|i| i.as_array())
        .map(|items| items.iter().filter_map(parse_application).collect())
        .unwrap_or_default();
    snapshot.sort_by(|a, b| a.name.cmp(&b.name));
    snapshot
}

/// Condensed one-line message: health message first, then the first
/// condition, then the sync operation message.
fn extract_message(status: Option<&serde_json::Value>) -> Option<String> {
    let status = status?;
    let raw = status
        .get("health")
        .and_then(|h| h.get("message"))
        .and_then(|m| m.as_str())
        .or_else(|| {
            status
                .get("conditions")
                .and_then(|c| c.as_array())
                .and_then(|c| c.first())
                .and_then(|c| c.get("message"))
                .and_then(|m| m.as_str())
        })
        .or_else(|| {
            status
                .get("operationState")
                .and_then(|o| o.get("message"))
                .and_then(|m| m.as_str())
        })?;
    let line = raw.lines().next().unwrap_or(raw);
    if line.chars().count() > MESSAGE_LIMIT {
        Some(format!(
            "{}…",
            line.chars().take(MESSAGE_LIMIT).collect::<String>()
        ))
    } else {
        Some(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_json(name: &str, sync: &str, health: &str) -> serde_json::Value {
        serde_json::json!({
            "metadata": { "name": name },
            "status": {
                "sync": { "status": sync },
                "health": { "status": health },
            }
        })
    }

    #[test]
    fn parses_states_with_unknown_fallback() {
        let app = parse_application(&app_json("infra", "Synced", "Healthy")).unwrap();
        assert!(app.converged());

        let odd = parse_application(&app_json("x", "Weird", "Stranger")).unwrap();
        assert_eq!(odd.sync, SyncState::Unknown);
        assert_eq!(odd.health, HealthState::Unknown);
        assert!(!odd.converged());
    }

    #[test]
    fn missing_status_means_unknown() {
        let app =
            parse_application(&serde_json::json!({ "metadata": { "name": "bare" } })).unwrap();
        assert_eq!(app.sync, SyncState::Unknown);
        assert_eq!(app.health, HealthState::Unknown);
    }

    #[test]
    fn child_applications_extracted_from_resources() {
        let value = serde_json::json!({
            "metadata": { "name": "root" },
            "status": {
                "resources": [
                    { "kind": "Application", "name": "infra" },
                    { "kind": "ConfigMap", "name": "noise" },
                    { "kind": "Application", "name": "workloads" },
                ]
            }
        });
        assert_eq!(child_application_names(&value), vec!["infra", "workloads"]);
    }

    #[test]
    fn message_is_condensed_to_one_line() {
        let value = serde_json::json!({
            "metadata": { "name": "x" },
            "status": {
                "health": { "status": "Degraded", "message": "first line\nsecond line" }
            }
        });
        let app = parse_application(&value).unwrap();
        assert_eq!(app.message, "first line");
    }
}
