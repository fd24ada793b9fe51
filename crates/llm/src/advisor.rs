//! Advisory operations: utterance generation and overlap repair.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use intent_core::{AppError, AppResult};
use intent_prompt::{render, DEFAULT_REPAIR_PROMPT, DEFAULT_UTTERANCE_PROMPT};

use crate::client::{ChatClient, ChatRequest};

/// Route fields the advisor needs as context. Decoupled from the engine's
/// route type so this crate stays independent of it.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub utterances: Vec<String>,
}

/// A repair proposal for one route. Advisory only: the engine neither
/// validates nor applies it — the operator chooses what to accept.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepairAdvice {
    #[serde(default)]
    pub rationalization: String,
    #[serde(default)]
    pub new_utterances: Vec<String>,
    #[serde(default)]
    pub negative_samples: Vec<String>,
    #[serde(default)]
    pub conflicting_utterances: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UtteranceList {
    #[serde(default)]
    utterances: Vec<String>,
}

/// At most this many of the source route's utterances are quoted in a
/// repair prompt.
const MAX_PROMPT_UTTERANCES: usize = 10;

pub struct Advisor {
    client: Arc<dyn ChatClient>,
    generation_template: String,
    repair_template: String,
}

impl Advisor {
    /// Build an advisor around a chat client. `None` templates fall back
    /// to the built-ins.
    pub fn new(
        client: Arc<dyn ChatClient>,
        generation_template: Option<String>,
        repair_template: Option<String>,
    ) -> Self {
        Self {
            client,
            generation_template: generation_template
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_UTTERANCE_PROMPT.to_string()),
            repair_template: repair_template
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REPAIR_PROMPT.to_string()),
        }
    }

    /// Generate up to `count` new utterances for a route.
    ///
    /// Replies are deduplicated against `reference` (the route's existing
    /// utterances) and capped at `count`.
    pub async fn generate_utterances(
        &self,
        ctx: &RouteContext,
        count: usize,
        reference: &[String],
    ) -> AppResult<Vec<String>> {
        let reference_block = if reference.is_empty() {
            String::new()
        } else {
            let lines: Vec<String> = reference.iter().map(|u| format!("- {}", u)).collect();
            format!(
                "- Reference examples (match their style and scope, never repeat them):\n{}",
                lines.join("\n")
            )
        };

        let mut variables = HashMap::new();
        variables.insert("name".to_string(), ctx.name.clone());
        variables.insert("description".to_string(), ctx.description.clone());
        variables.insert("count".to_string(), count.to_string());
        variables.insert("reference_utterances".to_string(), reference_block);
        variables.insert(
            "format_instructions".to_string(),
            "Respond with a single JSON object: {\"utterances\": [\"...\"]}".to_string(),
        );

        let prompt = render(&self.generation_template, &variables)?;
        let response = self.client.complete(&ChatRequest::new(prompt)).await?;

        let parsed: UtteranceList = parse_json_reply(&response.content)?;
        let reference_set: HashSet<&str> = reference.iter().map(|s| s.as_str()).collect();

        let mut seen = HashSet::new();
        let fresh: Vec<String> = parsed
            .utterances
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .filter(|u| !reference_set.contains(u.as_str()))
            .filter(|u| seen.insert(u.clone()))
            .take(count)
            .collect();

        tracing::info!(
            "Generated {} new utterance(s) for route '{}' (requested {})",
            fresh.len(),
            ctx.name,
            count
        );
        Ok(fresh)
    }

    /// Suggest how to disentangle `source` from `target`, given rendered
    /// conflict descriptions from the diagnostics engine.
    pub async fn suggest_repair(
        &self,
        source: &RouteContext,
        target: &RouteContext,
        conflicts: &[String],
    ) -> AppResult<RepairAdvice> {
        let utterances_block: Vec<String> = source
            .utterances
            .iter()
            .take(MAX_PROMPT_UTTERANCES)
            .map(|u| format!("- {}", u))
            .collect();
        let conflicts_block: Vec<String> =
            conflicts.iter().map(|c| format!("- {}", c)).collect();

        let mut variables = HashMap::new();
        variables.insert("name_a".to_string(), source.name.clone());
        variables.insert("desc_a".to_string(), source.description.clone());
        variables.insert("utterances_a".to_string(), utterances_block.join("\n"));
        variables.insert("name_b".to_string(), target.name.clone());
        variables.insert("desc_b".to_string(), target.description.clone());
        variables.insert("conflicts".to_string(), conflicts_block.join("\n"));
        variables.insert(
            "format_instructions".to_string(),
            "Respond with a single JSON object: {\"rationalization\": \"...\", \
             \"new_utterances\": [\"...\"], \"negative_samples\": [\"...\"], \
             \"conflicting_utterances\": [\"...\"]}"
                .to_string(),
        );

        let prompt = render(&self.repair_template, &variables)?;
        let response = self.client.complete(&ChatRequest::new(prompt)).await?;

        let advice: RepairAdvice = parse_json_reply(&response.content)?;
        tracing::info!(
            "Repair advice for '{}' vs '{}': drop {}, add {}",
            source.name,
            target.name,
            advice.conflicting_utterances.len(),
            advice.new_utterances.len()
        );
        Ok(advice)
    }
}

/// Parse a JSON value out of a chat reply, tolerating markdown code
/// fences and prose around the object.
fn parse_json_reply<T: serde::de::DeserializeOwned>(reply: &str) -> AppResult<T> {
    let candidate = extract_json(reply);
    serde_json::from_str(candidate)
        .map_err(|e| AppError::Llm(format!("Unparseable model reply: {} ({})", e, candidate)))
}

fn extract_json(reply: &str) -> &str {
    let trimmed = reply.trim();

    // Prefer a fenced block if present.
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }

    // Otherwise take the outermost braces.
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(open), Some(close)) if close > open => &trimmed[open..=close],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatResponse;

    /// Test double returning a canned reply.
    struct CannedClient {
        reply: String,
    }

    #[async_trait::async_trait]
    impl ChatClient for CannedClient {
        fn provider_name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _request: &ChatRequest) -> AppResult<ChatResponse> {
            Ok(ChatResponse {
                content: self.reply.clone(),
                model: "canned".to_string(),
            })
        }
    }

    fn advisor(reply: &str) -> Advisor {
        Advisor::new(
            Arc::new(CannedClient {
                reply: reply.to_string(),
            }),
            None,
            None,
        )
    }

    fn ctx() -> RouteContext {
        RouteContext {
            id: 1,
            name: "weather".to_string(),
            description: "weather questions".to_string(),
            utterances: vec!["how is the weather".to_string()],
        }
    }

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_json_fenced() {
        let reply = "Sure!\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_with_prose() {
        let reply = "Here you go: {\"a\": 1} — anything else?";
        assert_eq!(extract_json(reply), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn test_generate_dedupes_and_caps() {
        let advisor = advisor(
            r#"{"utterances": ["how is the weather", "rain today?", "rain today?", "snow tomorrow?", "is it windy"]}"#,
        );

        let reference = vec!["how is the weather".to_string()];
        let fresh = advisor
            .generate_utterances(&ctx(), 2, &reference)
            .await
            .unwrap();

        assert_eq!(fresh, vec!["rain today?".to_string(), "snow tomorrow?".to_string()]);
    }

    #[tokio::test]
    async fn test_generate_rejects_garbage_reply() {
        let advisor = advisor("I cannot help with that.");
        let err = advisor
            .generate_utterances(&ctx(), 3, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
    }

    #[tokio::test]
    async fn test_suggest_repair_parses_fenced_reply() {
        let advisor = advisor(
            "```json\n{\"rationalization\": \"too close\", \"new_utterances\": [\"weather outlook\"], \"negative_samples\": [\"book a flight\"], \"conflicting_utterances\": [\"book a ticket\"]}\n```",
        );

        let target = RouteContext {
            id: 2,
            name: "flights".to_string(),
            description: "flight booking".to_string(),
            utterances: vec!["book a flight".to_string()],
        };

        let advice = advisor
            .suggest_repair(&ctx(), &target, &["conflict line".to_string()])
            .await
            .unwrap();

        assert_eq!(advice.rationalization, "too close");
        assert_eq!(advice.new_utterances, vec!["weather outlook".to_string()]);
        assert_eq!(advice.conflicting_utterances, vec!["book a ticket".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_fields_default_empty() {
        let advisor = advisor(r#"{"rationalization": "minimal"}"#);
        let target = ctx();
        let advice = advisor
            .suggest_repair(&ctx(), &target, &[])
            .await
            .unwrap();
        assert!(advice.new_utterances.is_empty());
        assert!(advice.conflicting_utterances.is_empty());
    }
}
