use serde::{Deserialize, Serialize};

/// ========================================
/// Fortune method data model
/// ========================================

/// Input control a method asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    FreeText,
    DateTime,
    SingleChoice { options: Vec<String> },
}

/// One input the selected method needs before a report can be generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawField", into = "RawField")]
pub struct RequiredField {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub placeholder: Option<String>,
}

/// Shape of a field as providers send it: a string `type` plus an
/// `options` list that only matters for selects.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawField {
    name: String,
    label: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    placeholder: Option<String>,
}

impl From<RawField> for RequiredField {
    fn from(raw: RawField) -> Self {
        let kind = match raw.kind.trim() {
            "select" => FieldKind::SingleChoice { options: raw.options.unwrap_or_default() },
            "datetime-local" => FieldKind::DateTime,
            // anything unrecognised is rendered as plain text
            _ => FieldKind::FreeText,
        };
        let placeholder = raw.placeholder.filter(|p| !p.trim().is_empty());
        RequiredField { name: raw.name, label: raw.label, kind, placeholder }
    }
}

impl From<RequiredField> for RawField {
    fn from(field: RequiredField) -> Self {
        let (kind, options) = match field.kind {
            FieldKind::FreeText => ("text", None),
            FieldKind::DateTime => ("datetime-local", None),
            FieldKind::SingleChoice { options } => ("select", Some(options)),
        };
        RawField {
            name: field.name,
            label: field.label,
            kind: kind.to_string(),
            options,
            placeholder: field.placeholder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FortuneMethod {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_fields: Vec<RequiredField>,
}

/// Answers to a method's required fields, kept in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    entries: Vec<(String, String)>,
}

impl UserInfo {
    /// Every field of `method` mapped to an empty string. Repeated names
    /// keep their first position.
    pub fn for_method(method: &FortuneMethod) -> Self {
        let mut entries: Vec<(String, String)> = Vec::with_capacity(method.required_fields.len());
        for field in &method.required_fields {
            if !entries.iter().any(|(k, _)| k == &field.name) {
                entries.push((field.name.clone(), String::new()));
            }
        }
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Overwrites an existing key. Returns false when `name` is not a key.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => {
                *v = value.into();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `key: value` pairs joined with `; `, the form sent to providers.
    pub fn flatten(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
