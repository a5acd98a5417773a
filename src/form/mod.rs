use chrono::NaiveDateTime;
use thiserror::Error;

use crate::wire::{FieldKind, FortuneMethod, RequiredField, UserInfo};

/// Native `datetime-local` text forms.
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// A concrete input control for one field, carrying the current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Widget {
    Select {
        name: String,
        label: String,
        /// Shown for the empty, unselected entry.
        prompt: String,
        options: Vec<String>,
        value: String,
    },
    DateTime {
        name: String,
        label: String,
        value: String,
    },
    Text {
        name: String,
        label: String,
        placeholder: String,
        value: String,
    },
}

/// A validated edit for one UserInfo key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub name: String,
    pub value: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FieldError {
    #[error("{label} is required")]
    Required { label: String },
    #[error("{value:?} is not one of the options for {label}")]
    NotAnOption { label: String, value: String },
    #[error("{value:?} is not a date and time (expected YYYY-MM-DDTHH:MM)")]
    BadDateTime { value: String },
}

pub fn render(field: &RequiredField, value: &str) -> Widget {
    match &field.kind {
        FieldKind::SingleChoice { options } => Widget::Select {
            name: field.name.clone(),
            label: field.label.clone(),
            prompt: format!("Select {}", field.label),
            options: options.clone(),
            value: value.to_string(),
        },
        FieldKind::DateTime => Widget::DateTime {
            name: field.name.clone(),
            label: field.label.clone(),
            value: value.to_string(),
        },
        FieldKind::FreeText => Widget::Text {
            name: field.name.clone(),
            label: field.label.clone(),
            placeholder: field
                .placeholder
                .clone()
                .unwrap_or_else(|| format!("Enter your {}", field.label)),
            value: value.to_string(),
        },
    }
}

impl Widget {
    pub fn name(&self) -> &str {
        match self {
            Widget::Select { name, .. } | Widget::DateTime { name, .. } | Widget::Text { name, .. } => name,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Widget::Select { value, .. } | Widget::DateTime { value, .. } | Widget::Text { value, .. } => value,
        }
    }

    /// Selects may be left unselected; the other controls are mandatory.
    pub fn is_required(&self) -> bool {
        !matches!(self, Widget::Select { .. })
    }

    /// Validates raw input for this control and turns it into a change event.
    pub fn change(&self, raw: &str) -> Result<FieldChange, FieldError> {
        let value = match self {
            Widget::Select { label, options, .. } => {
                if !raw.is_empty() && !options.iter().any(|o| o == raw) {
                    return Err(FieldError::NotAnOption { label: label.clone(), value: raw.to_string() });
                }
                raw.to_string()
            }
            Widget::DateTime { label, .. } => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(FieldError::Required { label: label.clone() });
                }
                if !DATETIME_FORMATS
                    .iter()
                    .any(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).is_ok())
                {
                    return Err(FieldError::BadDateTime { value: trimmed.to_string() });
                }
                trimmed.to_string()
            }
            Widget::Text { label, .. } => {
                if raw.trim().is_empty() {
                    return Err(FieldError::Required { label: label.clone() });
                }
                raw.to_string()
            }
        };
        Ok(FieldChange { name: self.name().to_string(), value })
    }
}

/// Names of mandatory fields that still hold an empty value.
pub fn missing_fields<'a>(method: &'a FortuneMethod, info: &UserInfo) -> Vec<&'a str> {
    method
        .required_fields
        .iter()
        .filter(|f| render(f, "").is_required())
        .filter(|f| info.get(&f.name).map(|v| v.trim().is_empty()).unwrap_or(true))
        .map(|f| f.name.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, kind: FieldKind, placeholder: Option<&str>) -> RequiredField {
        RequiredField {
            name: name.into(),
            label: name.to_uppercase(),
            kind,
            placeholder: placeholder.map(str::to_string),
        }
    }

    #[test]
    fn test_render_dispatches_on_kind() {
        let select = render(
            &field("element", FieldKind::SingleChoice { options: vec!["Fire".into(), "Water".into()] }, None),
            "",
        );
        assert_eq!(
            select,
            Widget::Select {
                name: "element".into(),
                label: "ELEMENT".into(),
                prompt: "Select ELEMENT".into(),
                options: vec!["Fire".into(), "Water".into()],
                value: "".into(),
            }
        );

        let dt = render(&field("birthdate", FieldKind::DateTime, None), "2024-01-01T00:00");
        assert!(matches!(dt, Widget::DateTime { ref value, .. } if value == "2024-01-01T00:00"));
        assert!(dt.is_required());
    }

    #[test]
    fn test_text_placeholder_falls_back_to_label() {
        let own = render(&field("nick", FieldKind::FreeText, Some("e.g. Neo")), "");
        let generated = render(&field("city", FieldKind::FreeText, None), "");
        match (own, generated) {
            (Widget::Text { placeholder: a, .. }, Widget::Text { placeholder: b, .. }) => {
                assert_eq!(a, "e.g. Neo");
                assert_eq!(b, "Enter your CITY");
            }
            other => panic!("expected text widgets, got {:?}", other),
        }
    }

    #[test]
    fn test_select_accepts_option_or_empty() {
        let w = render(&field("element", FieldKind::SingleChoice { options: vec!["Fire".into()] }, None), "");
        assert_eq!(w.change("Fire").unwrap(), FieldChange { name: "element".into(), value: "Fire".into() });
        assert_eq!(w.change("").unwrap().value, "");
        assert_eq!(
            w.change("Earth"),
            Err(FieldError::NotAnOption { label: "ELEMENT".into(), value: "Earth".into() })
        );
    }

    #[test]
    fn test_datetime_is_mandatory_and_parsed() {
        let w = render(&field("birthdate", FieldKind::DateTime, None), "");
        assert_eq!(w.change("  "), Err(FieldError::Required { label: "BIRTHDATE".into() }));
        assert!(matches!(w.change("yesterday"), Err(FieldError::BadDateTime { .. })));
        assert_eq!(w.change("2024-01-01T00:00").unwrap().value, "2024-01-01T00:00");
        assert_eq!(w.change("1999-12-31T23:59:59").unwrap().value, "1999-12-31T23:59:59");
    }

    #[test]
    fn test_text_is_mandatory_and_kept_verbatim() {
        let w = render(&field("nick", FieldKind::FreeText, None), "");
        assert!(w.change("").is_err());
        assert_eq!(w.change(" Trinity ").unwrap().value, " Trinity ");
    }

    #[test]
    fn test_missing_fields_skips_optional_selects() {
        let method = FortuneMethod {
            name: "m".into(),
            description: String::new(),
            required_fields: vec![
                field("birthdate", FieldKind::DateTime, None),
                field("element", FieldKind::SingleChoice { options: vec!["Fire".into()] }, None),
                field("nick", FieldKind::FreeText, None),
            ],
        };
        let mut info = UserInfo::for_method(&method);
        assert_eq!(missing_fields(&method, &info), vec!["birthdate", "nick"]);
        info.set("nick", "Neo");
        assert_eq!(missing_fields(&method, &info), vec!["birthdate"]);
    }
}
