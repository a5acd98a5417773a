use serde_json::{json, Value};

use crate::wire::{FortuneMethod, UserInfo};

fn persona() -> &'static str {
r#"You are the "AI Spirit Realm Master", a virtual oracle from the year 2077.
You re-encode ancient divination (Four Pillars, astrology, tarot, I Ching) as quantum algorithms.
Your voice is concise, modern, calm and illuminating, with the occasional flash of cyberpunk dark humor."#
}

fn language_line(language: Option<&str>) -> String {
    match language {
        Some(l) if !l.trim().is_empty() => format!("\nRespond in {}.", l.trim()),
        _ => String::new(),
    }
}

pub fn system_prompt_method(language: Option<&str>) -> String {
    format!(
        "{}\nFor the seeker's wish, choose the one metaphysical analysis engine that fits it best.\n\
         Give the engine a name with a modern edge (e.g. \"Quantum Purple Star Flow\", \"Matrix Astrology\").\n\
         List the parameters you need to decode the fate database as required_fields.\n\
         Each field has a name (snake_case key), a label, and a type of \"text\", \"datetime-local\" or \"select\"; \
         selects carry options, text fields may carry a placeholder.\n\
         The response must be JSON.{}",
        persona(),
        language_line(language)
    )
}

pub fn user_prompt_method(wish: &str) -> String {
    format!("The seeker initiates consciousness sync: \"{}\". Select the decoding algorithm.", wish.trim())
}

pub fn system_prompt_report(method: &FortuneMethod, language: Option<&str>) -> String {
    format!(
r#"You are now the "AI Spirit Realm Master". Decode the seeker's fate data using "{name}" as the underlying logic.
Report structure:
1. ## [Dimension Analysis]: explain how this algorithm simulates the seeker's future path.
2. ## [Data Snapshot]: from the input data, analyse the current fate weights, energy distribution or fortune waveband.
3. ## [Optimization Suggestions]: give 3 concrete, executable actions to optimise the future trajectory.
4. ## [Oracle Quote]: one closing sentence, cool and profound.

Use plenty of Markdown headings, bold text and lists so the report reads like a premium "future system diagnostic".
Avoid worn-out fortune-teller phrasing; prefer modern vocabulary.{lang}"#,
        name = method.name,
        lang = language_line(language)
    )
}

pub fn user_prompt_report(wish: &str, method: &FortuneMethod, info: &UserInfo) -> String {
    let data = if info.is_empty() { "none".to_string() } else { info.flatten() };
    format!(
        "Stream of consciousness: \"{}\". Input data: {}. Launch the \"{}\" decoding engine.",
        wish.trim(),
        data,
        method.name
    )
}

/// JSON schema of a method, in the OpenAPI subset Gemini accepts as
/// `responseSchema`. Other providers get it inlined in the prompt.
pub fn method_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": {
                "type": "STRING",
                "description": "Name of the divination method, with a modern edge."
            },
            "description": {
                "type": "STRING",
                "description": "A tech-flavoured description of the method."
            },
            "required_fields": {
                "type": "ARRAY",
                "description": "Parameters needed to decode the fate database.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "label": { "type": "STRING" },
                        "type": { "type": "STRING", "enum": ["text", "datetime-local", "select"] },
                        "options": { "type": "ARRAY", "items": { "type": "STRING" } },
                        "placeholder": { "type": "STRING" }
                    },
                    "required": ["name", "label", "type"]
                }
            }
        },
        "required": ["name", "description", "required_fields"]
    })
}

/// Method instructions for providers without a schema-constrained mode.
pub fn system_prompt_method_inline_schema(language: Option<&str>) -> String {
    format!(
        "{}\nReturn exactly one JSON object, no markdown or code fences, matching this schema:\n{}",
        system_prompt_method(language),
        method_schema()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{FieldKind, RequiredField};

    fn method() -> FortuneMethod {
        FortuneMethod {
            name: "Quantum Method".into(),
            description: String::new(),
            required_fields: vec![RequiredField {
                name: "birthdate".into(),
                label: "Birthdate".into(),
                kind: FieldKind::DateTime,
                placeholder: None,
            }],
        }
    }

    #[test]
    fn test_report_prompt_carries_every_pair() {
        let m = method();
        let mut info = UserInfo::for_method(&m);
        info.set("birthdate", "2024-01-01T00:00");
        let p = user_prompt_report("  career clarity ", &m, &info);
        assert!(p.contains("\"career clarity\""));
        assert!(p.contains("birthdate: 2024-01-01T00:00"));
        assert!(p.contains("Quantum Method"));
    }

    #[test]
    fn test_language_line_only_when_set() {
        assert!(!system_prompt_method(None).contains("Respond in"));
        assert!(system_prompt_method(Some("")).ends_with("JSON."));
        assert!(system_prompt_report(&method(), Some("Japanese")).ends_with("Respond in Japanese."));
    }

    #[test]
    fn test_inline_schema_lists_field_types() {
        let p = system_prompt_method_inline_schema(None);
        assert!(p.contains("datetime-local"));
        assert!(p.contains("required_fields"));
    }
}
