//! The probe battery.
//!
//! Every probe is one independent request. A failed request becomes a
//! recorded [`ProbeResult`] and the battery moves on.

use std::sync::OnceLock;

use regex::Regex;
use tokio::time::Instant;

use super::types::{DiscoveredCapabilities, ProbeCapability, ProbeResult};
use crate::models::ThinkingFormat;
use crate::provider::{GenerateRequest, LlmProvider};

pub const TOOL_CALL_ATTEMPTS: u32 = 3;
pub const THINK_TAG_VARIANTS: [&str; 4] = ["thinking", "thoughts", "reasoning", "think"];
pub const MAX_STORED_RESPONSE_CHARS: usize = 500;
const PROBE_MAX_TOKENS: u32 = 512;
const CHARS_PER_TOKEN: u64 = 4;

const TOOL_CALL_PROMPT: &str = r#"You can call a tool named "calculator" that evaluates arithmetic.
To call it, reply only with: {"tool": "calculator", "arguments": {"expression": "<expr>"}}
What is 1847 * 29?"#;

const REASONING_FIELD_PROMPT: &str = r#"Reply with a JSON object of the form {"reasoning": "<your reasoning>", "answer": "<answer>"}.
Which is heavier, a kilogram of feathers or a kilogram of iron?"#;

const JSON_MODE_PROMPT: &str = r#"Respond with only a JSON object with keys "name" (string) and "population" (integer) describing a small village."#;

fn think_tag_prompt(tag: &str) -> String {
    format!(
        "Before answering, reason step by step inside <{tag}></{tag}> tags, then give the answer.\n\
         What is the capital of Australia?"
    )
}

fn tool_use_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(tool|tool_calls?|function_call|calculator)\b")
            .expect("valid tool use regex")
    })
}

fn reasoning_field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""reasoning"\s*:"#).expect("valid reasoning field regex"))
}

pub fn indicates_tool_use(text: &str) -> bool {
    tool_use_regex().is_match(text)
}

pub fn has_think_tags(text: &str, tag: &str) -> bool {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    text.find(&open)
        .is_some_and(|start| text[start + open.len()..].contains(&close))
}

pub fn has_reasoning_field(text: &str) -> bool {
    reasoning_field_regex().is_match(text)
}

/// Parses `text` as JSON, falling back to the outermost `{...}` or `[...]`
/// span when the model wrapped the payload in prose or code fences.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    [('{', '}'), ('[', ']')].into_iter().find_map(|(open, close)| {
        let start = trimmed.find(open)?;
        let end = trimmed.rfind(close)?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&trimmed[start..=end]).ok()
    })
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_STORED_RESPONSE_CHARS).collect()
}

struct ProbeRun<'a> {
    provider: &'a dyn LlmProvider,
    results: Vec<ProbeResult>,
    longest_response: usize,
}

impl<'a> ProbeRun<'a> {
    fn new(provider: &'a dyn LlmProvider) -> Self {
        Self {
            provider,
            results: Vec::new(),
            longest_response: 0,
        }
    }

    /// Sends one probe and records it. `check` decides success from the
    /// response text.
    async fn probe(
        &mut self,
        capability: ProbeCapability,
        variant: Option<String>,
        prompt: &str,
        check: impl FnOnce(&str) -> bool,
    ) -> bool {
        let request = GenerateRequest::new(prompt)
            .with_temperature(0.0)
            .with_max_tokens(PROBE_MAX_TOKENS);
        let started = Instant::now();
        let outcome = self.provider.generate(&request).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(response) => {
                self.longest_response = self.longest_response.max(response.text.chars().count());
                ProbeResult {
                    capability,
                    variant,
                    success: check(&response.text),
                    response: Some(truncate(&response.text)),
                    error: None,
                    latency_ms,
                }
            }
            Err(e) => {
                tracing::debug!(?capability, error = %e, "probe failed");
                ProbeResult {
                    capability,
                    variant,
                    success: false,
                    response: None,
                    error: Some(e.to_string()),
                    latency_ms,
                }
            }
        };
        let success = result.success;
        self.results.push(result);
        success
    }
}

/// Runs every probe against `provider` and folds the outcomes.
pub async fn run_battery(provider: &dyn LlmProvider, model_id: &str) -> DiscoveredCapabilities {
    let mut caps = DiscoveredCapabilities::unknown(model_id, provider.provider_id());
    let mut run = ProbeRun::new(provider);

    let mut tool_successes = 0u32;
    for attempt in 1..=TOOL_CALL_ATTEMPTS {
        if run
            .probe(
                ProbeCapability::ToolCalling,
                Some(attempt.to_string()),
                TOOL_CALL_PROMPT,
                indicates_tool_use,
            )
            .await
        {
            tool_successes += 1;
        }
    }
    caps.supports_tool_calling = tool_successes > 0;
    caps.tool_calling_reliability = f64::from(tool_successes) / f64::from(TOOL_CALL_ATTEMPTS);

    for tag in THINK_TAG_VARIANTS {
        let prompt = think_tag_prompt(tag);
        if run
            .probe(
                ProbeCapability::ThinkTags,
                Some(tag.to_string()),
                &prompt,
                |text| has_think_tags(text, tag),
            )
            .await
        {
            caps.thinking_format = ThinkingFormat::ThinkTags;
            caps.thinking_tag_name = Some(tag.to_string());
            break;
        }
    }

    if run
        .probe(
            ProbeCapability::ReasoningField,
            None,
            REASONING_FIELD_PROMPT,
            has_reasoning_field,
        )
        .await
    {
        caps.thinking_format = ThinkingFormat::ReasoningField;
        caps.thinking_tag_name = None;
    }

    caps.supports_json_mode = run
        .probe(ProbeCapability::JsonMode, None, JSON_MODE_PROMPT, |text| {
            extract_json(text).is_some()
        })
        .await;

    caps.max_observed_tokens = run.longest_response as u64 / CHARS_PER_TOKEN;
    caps.probe_results = run.results;
    caps
}
