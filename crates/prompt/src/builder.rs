//! Handlebars rendering for advisor prompts.

use handlebars::Handlebars;
use std::collections::HashMap;

use intent_core::{AppError, AppResult};

/// Render a template with the given variables.
///
/// HTML escaping is disabled: prompts are plain text. Unknown variables
/// render as empty strings, which lets operators drop placeholders from
/// overridden templates without breaking rendering.
pub fn render(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Llm(format!("Invalid prompt template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Llm(format!("Failed to render prompt: {}", e)))?;

    tracing::debug!("Rendered prompt ({} chars)", rendered.len());
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{DEFAULT_REPAIR_PROMPT, DEFAULT_UTTERANCE_PROMPT};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_variables() {
        let out = render("Hello {{who}}", &vars(&[("who", "world")])).unwrap();
        assert_eq!(out, "Hello world");
    }

    #[test]
    fn test_render_leaves_no_html_escaping() {
        let out = render("{{text}}", &vars(&[("text", "a < b && c")])).unwrap();
        assert_eq!(out, "a < b && c");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let out = render("a{{gone}}b", &vars(&[])).unwrap();
        assert_eq!(out, "ab");
    }

    #[test]
    fn test_default_utterance_template_renders() {
        let out = render(
            DEFAULT_UTTERANCE_PROMPT,
            &vars(&[
                ("name", "weather"),
                ("description", "weather questions"),
                ("count", "5"),
                ("reference_utterances", "- how is the weather"),
                ("format_instructions", "Respond with JSON."),
            ]),
        )
        .unwrap();

        assert!(out.contains("weather questions"));
        assert!(out.contains("exactly 5 NEW"));
        assert!(out.contains("Respond with JSON."));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_default_repair_template_renders() {
        let out = render(
            DEFAULT_REPAIR_PROMPT,
            &vars(&[
                ("name_a", "flight_booking"),
                ("desc_a", "flights"),
                ("utterances_a", "- book a flight"),
                ("name_b", "train_booking"),
                ("desc_b", "trains"),
                ("conflicts", "- 'book a ticket' vs 'book a ticket' (1.00)"),
                ("format_instructions", "Respond with JSON."),
            ]),
        )
        .unwrap();

        assert!(out.contains("flight_booking"));
        assert!(out.contains("train_booking"));
        assert!(!out.contains("{{"));
    }
}
