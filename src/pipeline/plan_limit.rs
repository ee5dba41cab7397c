use serde::Deserialize;
use serde_json::Value;

const DEFAULT_DETAIL: &str = "Plan limit exceeded";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlanLimitBody {
    detail: Option<Value>,
    message: Option<String>,
    upgrade_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlanLimit {
    pub detail: String,
    pub upgrade_url: Option<String>,
}

/// Reads a 402 body. `detail` may be a plain string or an object carrying
/// `message` and `upgrade_url`; anything unparseable falls back to a generic detail.
pub(crate) fn parse_plan_limit(body: &[u8]) -> PlanLimit {
    let parsed: PlanLimitBody = serde_json::from_slice(body).unwrap_or_default();
    let mut upgrade_url = parsed.upgrade_url.filter(|u| !u.is_empty());
    let detail = match parsed.detail {
        Some(Value::String(detail)) => Some(detail),
        Some(Value::Object(map)) => {
            if upgrade_url.is_none() {
                upgrade_url = map
                    .get("upgrade_url")
                    .and_then(Value::as_str)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string);
            }
            map.get("message")
                .or_else(|| map.get("detail"))
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        _ => None,
    };
    PlanLimit {
        detail: detail
            .or(parsed.message)
            .unwrap_or_else(|| DEFAULT_DETAIL.to_string()),
        upgrade_url,
    }
}
