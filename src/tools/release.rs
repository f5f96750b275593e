//! Release assessment tools
//!
//! Read release records from a JSON file keyed by release id and file risk
//! reports. Problems with the data come back as `{"error": ...}` values so the
//! model can react to them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::fs;
use tracing::info;

use crate::tools::registry::{required_str, ToolDefinition, ToolRegistry};

/// Risk severity levels for release assessments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskSeverity {
    High,
    Medium,
    Low,
}

impl RiskSeverity {
    pub const ALL: [RiskSeverity; 3] = [RiskSeverity::High, RiskSeverity::Medium, RiskSeverity::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskSeverity::High => "high",
            RiskSeverity::Medium => "medium",
            RiskSeverity::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|sev| sev.as_str() == s)
    }
}

/// Load the release file as an id → record map
pub async fn load_releases(path: &Path) -> Result<Map<String, Value>, String> {
    let content = fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            format!("Releases file not found: {}", path.display())
        } else {
            format!("Error reading releases file: {}", e)
        }
    })?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("Invalid releases file: expected an object keyed by release id".to_string()),
        Err(e) => Err(format!("Invalid JSON in releases file: {}", e)),
    }
}

/// Record for one release, or an error value listing what exists
pub async fn get_release_summary(args: &Map<String, Value>, releases_path: &Path) -> Value {
    let release_id = match required_str(args, "release_id") {
        Ok(id) => id,
        Err(e) => return json!({ "error": e.to_string() }),
    };

    let releases = match load_releases(releases_path).await {
        Ok(releases) => releases,
        Err(e) => return json!({ "error": e }),
    };

    match releases.get(release_id) {
        Some(record) => record.clone(),
        None => json!({
            "error": format!("Release {} not found", release_id),
            "available_releases": releases.keys().collect::<Vec<_>>(),
        }),
    }
}

/// Ids of every known release
pub async fn list_releases(releases_path: &Path) -> Value {
    match load_releases(releases_path).await {
        Ok(releases) => json!({
            "releases": releases.keys().collect::<Vec<_>>(),
            "count": releases.len(),
        }),
        Err(e) => json!({ "error": e }),
    }
}

/// Validate and file a risk report, writing it to `reports_dir` when given
pub async fn file_risk_report(args: &Map<String, Value>, reports_dir: Option<&Path>) -> anyhow::Result<Value> {
    let release_id = match required_str(args, "release_id") {
        Ok(id) => id,
        Err(e) => return Ok(json!({ "error": e.to_string() })),
    };
    let severity_raw = match required_str(args, "severity") {
        Ok(s) => s,
        Err(e) => return Ok(json!({ "error": e.to_string() })),
    };
    let Some(severity) = RiskSeverity::parse(severity_raw) else {
        let valid: Vec<&str> = RiskSeverity::ALL.iter().map(RiskSeverity::as_str).collect();
        return Ok(json!({
            "error": format!("Invalid severity: {}. Must be one of: {}", severity_raw, valid.join(", "))
        }));
    };
    let findings = args.get("findings").cloned().unwrap_or_else(|| json!([]));

    let filed_at = Utc::now();
    let report = json!({
        "release_id": release_id,
        "severity": severity.as_str(),
        "findings": findings,
        "filed_at": filed_at.to_rfc3339(),
    });

    let Some(dir) = reports_dir else {
        return Ok(json!({
            "status": "filed",
            "report_id": format!("report_{}_{}", release_id, filed_at.to_rfc3339()),
            "severity": severity.as_str(),
            "message": format!("Risk report filed for {} with severity: {}", release_id, severity.as_str()),
        }));
    };

    fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "risk_report_{}_{}.json",
        sanitize(release_id),
        filed_at.format("%Y-%m-%d")
    ));
    fs::write(&path, serde_json::to_string_pretty(&report)?).await?;
    info!(release = release_id, severity = severity.as_str(), path = %path.display(), "risk report filed");

    Ok(json!({
        "status": "filed",
        "report_id": path.display().to_string(),
        "severity": severity.as_str(),
        "message": format!("Risk report filed. Please review the report at: {}", path.display()),
    }))
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Register the three release tools
pub fn register_release_tools(
    registry: &mut ToolRegistry,
    releases_path: impl Into<PathBuf>,
    reports_dir: Option<PathBuf>,
) {
    let releases_path = Arc::new(releases_path.into());
    let reports_dir = Arc::new(reports_dir);

    let path = releases_path.clone();
    registry.register(ToolDefinition::new(
        "get_release_summary",
        "Get the summary of a release: changes, test results and deployment metrics",
        json!({
            "type": "object",
            "properties": {
                "release_id": {
                    "type": "string",
                    "description": "The release identifier, e.g. v1.0"
                }
            },
            "required": ["release_id"]
        }),
        move |args| {
            let path = path.clone();
            async move { Ok(get_release_summary(&args, &path).await) }
        },
    ));

    let path = releases_path;
    registry.register(ToolDefinition::new(
        "list_releases",
        "List the ids of all releases available for assessment",
        json!({ "type": "object", "properties": {} }),
        move |_args| {
            let path = path.clone();
            async move { Ok(list_releases(&path).await) }
        },
    ));

    registry.register(ToolDefinition::new(
        "file_risk_report",
        "File a risk assessment report for a release",
        json!({
            "type": "object",
            "properties": {
                "release_id": { "type": "string", "description": "The release being assessed" },
                "severity": {
                    "type": "string",
                    "enum": ["high", "medium", "low"],
                    "description": "Overall risk severity"
                },
                "findings": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Key findings supporting the severity"
                }
            },
            "required": ["release_id", "severity", "findings"]
        }),
        move |args| {
            let dir = reports_dir.clone();
            async move { file_risk_report(&args, dir.as_deref()).await }
        },
    ));
}
