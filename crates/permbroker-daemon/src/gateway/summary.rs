//! Human-readable summary of a permission request.

use serde_json::Value;

use permbroker_core::Inputs;
use permbroker_core::config::PromptConfig;

/// Input fields most relevant to judging a request, shown first.
const PRIORITY_KEYS: [&str; 6] = ["file_path", "path", "command", "content", "text", "message"];

/// Size limits for a prompt summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLimits {
    /// Other fields are only added while the summary has fewer than this.
    pub max_fields: usize,
    pub max_value_chars: usize,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self::from(&PromptConfig::default())
    }
}

impl From<&PromptConfig> for SummaryLimits {
    fn from(config: &PromptConfig) -> Self {
        Self {
            max_fields: config.max_summary_fields,
            max_value_chars: config.max_value_chars,
        }
    }
}

/// What a prompt shows: the tool and its most telling parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSummary {
    pub tool_name: String,
    pub fields: Vec<(String, String)>,
}

impl PromptSummary {
    /// Priority fields are always included; remaining fields follow in
    /// input order until `max_fields` is reached.
    pub fn build(tool_name: &str, inputs: &Inputs, limits: &SummaryLimits) -> Self {
        let mut fields = Vec::new();

        for key in PRIORITY_KEYS {
            if let Some(value) = inputs.get(key) {
                fields.push((key.to_string(), format_value(value, limits.max_value_chars)));
            }
        }

        for (key, value) in inputs {
            if fields.len() >= limits.max_fields {
                break;
            }
            if PRIORITY_KEYS.contains(&key.as_str()) {
                continue;
            }
            fields.push((key.clone(), format_value(value, limits.max_value_chars)));
        }

        Self {
            tool_name: tool_name.to_string(),
            fields,
        }
    }

    /// Multi-line text for a terminal prompt.
    pub fn render(&self) -> String {
        let mut text = format!("Permission requested for tool `{}`", self.tool_name);
        for (key, value) in &self.fields {
            text.push_str("\n  ");
            text.push_str(key);
            text.push_str(": ");
            text.push_str(&value.replace('\n', "\n    "));
        }
        text
    }
}

fn format_value(value: &Value, max_chars: usize) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    };
    truncate(text, max_chars)
}

fn truncate(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text,
    }
}
