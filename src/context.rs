//! The template context: what the document template gets to see.
//!
//! A [`TemplateContext`] is a flat map from placeholder name to JSON value
//! plus an ordered list of [`LineContext`] rows. Scalar values are kept as
//! [`serde_json::Value`] rather than forced to strings so that e.g. `lp: 1`
//! stays a number in `/preview-context`; [`display_text`] decides how a value
//! reads once it lands in the document.

use crate::pipeline::image::InlineImage;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Context key under which line items are exposed.
pub const ITEMS_KEY: &str = "items";

/// Line-item key of the resolved image.
pub const IMAGE_KEY: &str = "IMAGE";

/// Placeholder values for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateContext {
    /// Placeholder name → value. Lists of strings are `Value::Array`.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,

    /// Line items, in input order.
    pub items: Vec<LineContext>,
}

impl TemplateContext {
    /// Look up a top-level placeholder.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Number of line items carrying a resolved image.
    pub fn image_count(&self) -> usize {
        self.items.iter().filter(|i| i.image.is_some()).count()
    }
}

/// One row of the itemised table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineContext {
    /// Line field name → value (`lp`, `NAZWA_RYSUNEK`, …).
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,

    /// Resolved picture; the key is left out entirely when there is none.
    #[serde(rename = "IMAGE", skip_serializing_if = "Option::is_none")]
    pub image: Option<InlineImage>,

    /// Raw data-URI the image was (or will be) resolved from.
    #[serde(skip)]
    pub image_source: String,
}

impl LineContext {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Truthiness of a JSON value.
///
/// `null`, `false`, zero, `""`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// How a context value reads inside the document.
///
/// Strings verbatim, numbers in their JSON form, booleans as `True`/`False`,
/// `null` as nothing. Anything structured becomes compact JSON.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Short name of a JSON value's type, for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_of_each_json_type() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!(-0.5), json!(" "), json!([0]), json!({"a": null})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn display_text_forms() {
        assert_eq!(display_text(&json!("Poz. 1")), "Poz. 1");
        assert_eq!(display_text(&json!(1)), "1");
        assert_eq!(display_text(&json!(2.5)), "2.5");
        assert_eq!(display_text(&json!(true)), "True");
        assert_eq!(display_text(&json!(null)), "");
        assert_eq!(display_text(&json!(["a", 1])), r#"["a",1]"#);
    }

    #[test]
    fn line_without_image_omits_key() {
        let mut line = LineContext::default();
        line.fields.insert("lp".into(), json!(1));
        line.image_source = "data:image/png;base64,AAAA".into();
        let v = serde_json::to_value(&line).unwrap();
        assert_eq!(v, json!({"lp": 1}));
    }

    #[test]
    fn context_flattens_fields_next_to_items() {
        let mut ctx = TemplateContext::default();
        ctx.fields.insert("KOLOR".into(), json!("RAL 7016"));
        let v = serde_json::to_value(&ctx).unwrap();
        assert_eq!(v, json!({"KOLOR": "RAL 7016", "items": []}));
    }
}
