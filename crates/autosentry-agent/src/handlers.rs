//! Built-in worker handlers.
//!
//! These are the rule tables the default backend runs for each task kind.
//! Alternate backends reuse them as their fallback path, so every backend can
//! still produce kind-appropriate output when its own runtime is missing.

use async_trait::async_trait;
use autosentry_core::{AutosentryError, AutosentryResult, Payload, Task, TaskKind};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

/// Executes one task kind inside the built-in backend.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Produce the output map for `task`.
    async fn handle(&self, task: &Task) -> AutosentryResult<Payload>;
}

/// The built-in rule table for a task kind, as a [`TaskHandler`].
pub struct RuleHandler;

#[async_trait]
impl TaskHandler for RuleHandler {
    async fn handle(&self, task: &Task) -> AutosentryResult<Payload> {
        builtin_output(task)
    }
}

/// Run the built-in rule table for the task's kind.
pub fn builtin_output(task: &Task) -> AutosentryResult<Payload> {
    match task.kind {
        TaskKind::Analyze => analyze(task),
        TaskKind::Diagnose => diagnose(task),
        TaskKind::Predict => Ok(predict()),
        TaskKind::Schedule => schedule(task),
        TaskKind::Engage => engage(task),
        TaskKind::Feedback => feedback(task),
        TaskKind::RcaCapa => rca_capa(task),
        TaskKind::Generic => Ok(generic(task)),
    }
}

/// Short upper-case identifier such as `APT-1A2B3C4D`.
pub fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", hex[..8].to_uppercase())
}

/// Chained workflow outputs that can stand in for a missing input key.
fn chained_key(key: &str) -> Option<&'static str> {
    match key {
        "analysis" => Some("analyze_result"),
        "diagnosis" => Some("diagnose_result"),
        _ => None,
    }
}

fn require<'a>(task: &'a Task, key: &str) -> AutosentryResult<&'a Value> {
    let found = task
        .input
        .get(key)
        .or_else(|| chained_key(key).and_then(|alias| task.input.get(alias)));
    found.ok_or_else(|| {
        AutosentryError::Validation(format!(
            "task {} ({}) is missing required input '{key}'",
            task.id, task.kind
        ))
    })
}

fn require_object(task: &Task, key: &str) -> AutosentryResult<Payload> {
    match require(task, key)? {
        Value::Object(map) => Ok(map.clone()),
        other => Err(AutosentryError::Validation(format!(
            "input '{key}' of task {} must be an object, got {other}",
            task.id
        ))),
    }
}

fn number(map: &Payload, key: &str, default: f64) -> f64 {
    map.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn text<'a>(map: &'a Payload, key: &str, default: &'a str) -> &'a str {
    map.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn health(ok: bool) -> &'static str {
    if ok {
        "good"
    } else {
        "warning"
    }
}

fn analyze(task: &Task) -> AutosentryResult<Payload> {
    let telemetry = require_object(task, "telemetry")?;

    let indicators = [
        ("engine", number(&telemetry, "engine_temp", 90.0) < 100.0),
        ("oil", number(&telemetry, "oil_pressure", 40.0) > 30.0),
        ("battery", number(&telemetry, "battery_voltage", 12.0) > 11.5),
        ("brakes", number(&telemetry, "brake_pad_wear_avg", 0.5) > 0.2),
    ];

    let mut health_indicators = Payload::new();
    for (system, ok) in indicators {
        health_indicators.insert(system.into(), json!(health(ok)));
    }
    let warnings: Vec<&str> = indicators
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(system, _)| *system)
        .collect();

    let (status, recommendations): (&str, Vec<String>) = if warnings.is_empty() {
        ("healthy", Vec::new())
    } else {
        (
            "needs_attention",
            warnings.iter().map(|w| format!("Check {w} system")).collect(),
        )
    };

    let mut out = Payload::new();
    out.insert("vehicle_id".into(), json!(text(&telemetry, "vehicle_id", "unknown")));
    out.insert("health_indicators".into(), Value::Object(health_indicators));
    out.insert("overall_status".into(), json!(status));
    out.insert("recommendations".into(), json!(recommendations));
    Ok(out)
}

struct Rule {
    indicator: &'static str,
    finding: &'static str,
    root_cause: &'static str,
    action: &'static str,
    severity: &'static str,
}

const DIAGNOSIS_RULES: [Rule; 4] = [
    Rule {
        indicator: "engine",
        finding: "Engine temperature elevated",
        root_cause: "Possible cooling system issue",
        action: "Inspect coolant levels and thermostat",
        severity: "high",
    },
    Rule {
        indicator: "oil",
        finding: "Oil pressure below threshold",
        root_cause: "Oil leak or pump degradation",
        action: "Check oil level and inspect for leaks",
        severity: "high",
    },
    Rule {
        indicator: "battery",
        finding: "Battery voltage low",
        root_cause: "Battery aging or charging system issue",
        action: "Test battery and alternator",
        severity: "medium",
    },
    Rule {
        indicator: "brakes",
        finding: "Brake pads worn",
        root_cause: "Normal wear",
        action: "Replace brake pads",
        severity: "high",
    },
];

fn diagnose(task: &Task) -> AutosentryResult<Payload> {
    let analysis = require_object(task, "analysis")?;
    let indicators = analysis
        .get("health_indicators")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut findings = Vec::new();
    let mut root_causes = Vec::new();
    let mut actions = Vec::new();
    // Last matching rule wins.
    let mut severity = "low";
    for rule in &DIAGNOSIS_RULES {
        if text(&indicators, rule.indicator, "good") == "warning" {
            findings.push(rule.finding);
            root_causes.push(rule.root_cause);
            actions.push(rule.action);
            severity = rule.severity;
        }
    }
    if findings.is_empty() {
        findings.push("No issues detected");
    }

    let mut out = Payload::new();
    out.insert("vehicle_id".into(), json!(text(&analysis, "vehicle_id", "unknown")));
    out.insert("diagnosis_code".into(), json!(short_id("DX")));
    out.insert("findings".into(), json!(findings));
    out.insert("root_causes".into(), json!(root_causes));
    out.insert("severity".into(), json!(severity));
    out.insert("recommended_actions".into(), json!(actions));
    Ok(out)
}

fn predict() -> Payload {
    let mut out = Payload::new();
    out.insert("prediction_id".into(), json!(short_id("PRED")));
    out.insert("status".into(), json!("generated"));
    out.insert(
        "note".into(),
        json!("Failure probability is served by the prediction service"),
    );
    out
}

fn schedule(task: &Task) -> AutosentryResult<Payload> {
    let diagnosis = require_object(task, "diagnosis")?;
    let customer = task.input_object("customer");

    let actions = diagnosis
        .get("recommended_actions")
        .map(|v| v.to_string().to_lowercase())
        .unwrap_or_default();
    let findings = diagnosis
        .get("findings")
        .map(|v| v.to_string().to_lowercase())
        .unwrap_or_default();
    let service_type = if actions.contains("brake") {
        "Brake Service"
    } else if findings.contains("engine") {
        "Engine Diagnostics"
    } else if findings.contains("battery") {
        "Electrical Service"
    } else {
        "Diagnostic Service"
    };

    let vehicle_id = diagnosis
        .get("vehicle_id")
        .and_then(Value::as_str)
        .or_else(|| task.input.get("vehicle_id").and_then(Value::as_str))
        .unwrap_or("unknown");

    let mut out = Payload::new();
    out.insert("appointment_id".into(), json!(short_id("APT")));
    out.insert("vehicle_id".into(), json!(vehicle_id));
    out.insert("customer_name".into(), json!(text(&customer, "name", "Unknown")));
    out.insert("service_type".into(), json!(service_type));
    out.insert("priority".into(), json!(text(&diagnosis, "severity", "low")));
    out.insert("status".into(), json!("pending"));
    out.insert("estimated_duration_hours".into(), json!(2));
    Ok(out)
}

fn engage(task: &Task) -> AutosentryResult<Payload> {
    let customer = require_object(task, "customer")?;
    let appointment = task.input_object("appointment");
    let diagnosis = task.input_object("diagnosis");

    let name = text(&customer, "name", "Valued Customer");
    let service_type = text(&appointment, "service_type", "Service");
    let priority = appointment
        .get("priority")
        .or_else(|| diagnosis.get("severity"))
        .and_then(Value::as_str)
        .unwrap_or("low");
    let urgency = if matches!(priority, "high" | "critical") {
        "We recommend scheduling as soon as possible."
    } else {
        "Please schedule at your earliest convenience."
    };

    let chat = format!(
        "Hello {name},\n\nOur predictive maintenance system has detected that your vehicle may need attention.\n\n\
         Service Recommended: {service_type}\nPriority: {priority}\n\n{urgency}\n\n\
         Reply 'BOOK' to schedule a service appointment."
    );
    let voice = format!(
        "Hello, this is AutoSentry calling about your vehicle. Our system has detected that your vehicle \
         may need {}. This is marked as {priority} priority. {urgency} To schedule an appointment, press 1.",
        service_type.to_lowercase()
    );

    let mut out = Payload::new();
    out.insert("engagement_id".into(), json!(short_id("ENG")));
    out.insert("customer_id".into(), json!(text(&customer, "id", "unknown")));
    out.insert("channel".into(), json!("multi"));
    out.insert("chat_message".into(), json!(chat));
    out.insert("voice_script".into(), json!(voice));
    out.insert(
        "sms_message".into(),
        json!(format!("AutoSentry Alert: Your vehicle needs {service_type}. Reply BOOK to schedule.")),
    );
    out.insert("status".into(), json!("prepared"));
    Ok(out)
}

fn feedback(task: &Task) -> AutosentryResult<Payload> {
    let appointment_id = require(task, "appointment_id")?.clone();
    let mut out = Payload::new();
    out.insert("feedback_id".into(), json!(short_id("FB")));
    out.insert("appointment_id".into(), appointment_id);
    out.insert(
        "questions".into(),
        json!([
            {"id": 1, "text": "How satisfied were you with the service?", "type": "rating"},
            {"id": 2, "text": "Was the issue resolved?", "type": "yes_no"},
            {"id": 3, "text": "How likely are you to recommend us?", "type": "nps"},
            {"id": 4, "text": "Any additional comments?", "type": "text"}
        ]),
    );
    out.insert("status".into(), json!("sent"));
    Ok(out)
}

fn rca_capa(task: &Task) -> AutosentryResult<Payload> {
    let diagnosis = require_object(task, "diagnosis")?;
    let vehicle = task.input_object("vehicle_data");

    let first = |key: &str, default: &str| -> String {
        diagnosis
            .get(key)
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };

    let mut out = Payload::new();
    out.insert("rca_id".into(), json!(short_id("RCA")));
    out.insert("capa_id".into(), json!(short_id("CAPA")));
    out.insert("component".into(), json!(first("findings", "Unknown")));
    out.insert("root_cause".into(), json!(first("root_causes", "Under investigation")));
    out.insert(
        "affected_vehicles".into(),
        json!([text(&vehicle, "vehicle_id", "unknown")]),
    );
    out.insert("corrective_action".into(), json!("Service and repair affected component"));
    out.insert("preventive_action".into(), json!("Implement predictive monitoring threshold"));
    out.insert("status".into(), json!("draft"));
    out.insert("created_at".into(), json!(Utc::now().to_rfc3339()));
    Ok(out)
}

fn generic(task: &Task) -> Payload {
    let mut out = Payload::new();
    out.insert("task_executed".into(), json!(true));
    out.insert("input_received".into(), json!(task.input.keys().collect::<Vec<_>>()));
    out.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn task(kind: TaskKind, input: Value) -> Task {
        let Value::Object(map) = input else {
            panic!("test input must be an object")
        };
        Task::new("t-1", kind, "test").with_input(map)
    }

    #[test]
    fn analyze_healthy_vehicle() {
        let out = builtin_output(&task(
            TaskKind::Analyze,
            json!({"telemetry": {"vehicle_id": "VH001", "engine_temp": 92.0, "oil_pressure": 45.0,
                   "battery_voltage": 12.6, "brake_pad_wear_avg": 0.6}}),
        ))
        .unwrap();
        assert_eq!(out["overall_status"], "healthy");
        assert_eq!(out["vehicle_id"], "VH001");
        assert!(out["recommendations"].as_array().unwrap().is_empty());
    }

    #[test]
    fn analyze_flags_every_warning() {
        let out = builtin_output(&task(
            TaskKind::Analyze,
            json!({"telemetry": {"engine_temp": 118.5, "oil_pressure": 26.2,
                   "battery_voltage": 10.5, "brake_pad_wear_avg": 0.08}}),
        ))
        .unwrap();
        assert_eq!(out["overall_status"], "needs_attention");
        assert_eq!(out["recommendations"].as_array().unwrap().len(), 4);
        assert_eq!(out["health_indicators"]["brakes"], "warning");
    }

    #[test]
    fn analyze_requires_telemetry() {
        let err = builtin_output(&task(TaskKind::Analyze, json!({}))).unwrap_err();
        assert!(matches!(err, AutosentryError::Validation(_)));
    }

    #[test]
    fn diagnose_battery_only_is_medium() {
        let out = builtin_output(&task(
            TaskKind::Diagnose,
            json!({"analysis": {"health_indicators": {"engine": "good", "battery": "warning"}}}),
        ))
        .unwrap();
        assert_eq!(out["severity"], "medium");
        assert_eq!(out["findings"][0], "Battery voltage low");
        assert!(out["diagnosis_code"].as_str().unwrap().starts_with("DX-"));
    }

    #[test]
    fn diagnose_without_warnings_is_low() {
        let out = builtin_output(&task(TaskKind::Diagnose, json!({"analysis": {}}))).unwrap();
        assert_eq!(out["severity"], "low");
        assert_eq!(out["findings"][0], "No issues detected");
    }

    #[test]
    fn schedule_picks_brake_service() {
        let out = builtin_output(&task(
            TaskKind::Schedule,
            json!({"diagnosis": {"severity": "high", "recommended_actions": ["Replace brake pads"]},
                   "vehicle_id": "VH007"}),
        ))
        .unwrap();
        assert_eq!(out["service_type"], "Brake Service");
        assert_eq!(out["priority"], "high");
        assert_eq!(out["vehicle_id"], "VH007");
        assert!(out["appointment_id"].as_str().unwrap().starts_with("APT-"));
    }

    #[test]
    fn engage_requires_customer() {
        let err = builtin_output(&task(TaskKind::Engage, json!({"appointment": {}}))).unwrap_err();
        assert!(err.to_string().contains("customer"));
    }

    #[test]
    fn rca_capa_uses_first_finding() {
        let out = builtin_output(&task(
            TaskKind::RcaCapa,
            json!({"diagnosis": {"findings": ["Brake pads worn"], "root_causes": ["Normal wear"]},
                   "vehicle_data": {"vehicle_id": "VH007"}}),
        ))
        .unwrap();
        assert_eq!(out["component"], "Brake pads worn");
        assert_eq!(out["affected_vehicles"][0], "VH007");
    }

    #[test]
    fn generic_echoes_input_keys() {
        let out = builtin_output(&task(TaskKind::Generic, json!({"a": 1, "b": 2}))).unwrap();
        assert_eq!(out["input_received"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn short_id_shape() {
        let id = short_id("ENG");
        assert_eq!(id.len(), 12);
        assert!(id.starts_with("ENG-"));
    }
}
