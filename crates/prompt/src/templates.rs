//! Built-in prompt templates.
//!
//! Variables use Handlebars syntax. Both templates end with a
//! `format_instructions` slot that the advisor fills with the JSON shape
//! it expects back.

/// Template for generating new example utterances for a route.
///
/// Variables: `name`, `description`, `count`, `reference_utterances`,
/// `format_instructions`.
pub const DEFAULT_UTTERANCE_PROMPT: &str = "\
You are a senior analyst of user intents. Your task is to produce a \
high-quality set of example utterances for a specific assistant so an \
intent router can be trained to recognize it.

### Assistant
- Name: {{name}}
- Description: {{description}}
{{reference_utterances}}

### Requirements
Generate exactly {{count}} NEW utterances (never repeat a reference \
example). Follow these rules:

1. Mix of forms: roughly 30% bare keywords or short phrases (\"check \
weather\", \"translate this\"), 40% direct imperative requests, 30% \
casual spoken phrasings with filler words.
2. Coverage: combine the core verbs and nouns of the description, and \
include synonym variations of the main action.
3. Discriminative power: every utterance must clearly belong to this \
assistant; avoid generic phrasings that could route anywhere.
4. Output only the utterances, no commentary.

{{format_instructions}}";

/// Template for suggesting how to disentangle two overlapping routes.
///
/// Variables: `name_a`, `desc_a`, `utterances_a`, `name_b`, `desc_b`,
/// `conflicts`, `format_instructions`.
pub const DEFAULT_REPAIR_PROMPT: &str = "\
You are an intent-routing engineer. Two routes overlap in embedding \
space and queries meant for one are being captured by the other.

### Route under repair
- Name: {{name_a}}
- Description: {{desc_a}}
- Current utterances:
{{utterances_a}}

### Conflicting route
- Name: {{name_b}}
- Description: {{desc_b}}

### Observed conflicts
{{conflicts}}

Propose a repair for the route under repair only:
1. `conflicting_utterances`: utterances of {{name_a}} that straddle the \
boundary with {{name_b}} and should be removed.
2. `new_utterances`: replacement utterances that are unambiguously \
{{name_a}}.
3. `negative_samples`: counter-examples that look like {{name_b}} and \
should veto {{name_a}}.
4. `rationalization`: a short explanation of the change.

{{format_instructions}}";
