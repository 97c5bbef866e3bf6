//! Field normalisation: loosely-typed offer record → [`TemplateContext`].
//!
//! Offers arrive from a front-end that has changed its mind about key
//! spelling more than once (`lp`, `LP`, `position`). Every logical line-item
//! field therefore has an ordered alias table, evaluated first-match-wins.
//! Everything here is a pure function of its input: no I/O, no errors, no
//! clock. Missing data becomes `""`, never a failure.

use crate::config::{AliasPolicy, ContextLayout, GeneratorConfig};
use crate::context::{is_truthy, LineContext, TemplateContext, ITEMS_KEY};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Input key → placeholder names it fills.
const SCALARS: &[(&str, &[&str])] = &[
    ("data", &["data", "DATA"]),
    ("miasto", &["MIASTO"]),
    ("numer_oferty", &["NUMER_OFERTY"]),
    ("kolor", &["KOLOR"]),
    ("kwota_netto", &["KWOTA_NETTO"]),
    ("klient_imie", &["KLIENT_IMIE"]),
    ("klient_email", &["KLIENT_EMAIL"]),
    ("klient_tel", &["KLIENT_TEL"]),
    ("lokalizacja_obiektu", &["LOKALIZACJA_OBIEKTU"]),
    ("handlowiec_imie", &["HANDLOWIEC_IMIE"]),
    ("handlowiec_tel", &["HANDLOWIEC_TEL"]),
    ("handlowiec_mail", &["HANDLOWIEC_MAIL"]),
];

const SYSTEMS_KEY: &str = "systemy";

/// Number of `SYSTEMn` slots in the positional layout.
pub const SYSTEM_SLOTS: usize = 5;

/// Placeholder holding the variable-length systems list.
pub const SYSTEMS_LIST_KEY: &str = "SYSTEMY";

/// One logical line-item field: where to look, where to write.
struct LineField {
    lower: &'static str,
    upper: &'static str,
    english: &'static str,
}

const LINE_FIELDS: &[LineField] = &[
    LineField { lower: "lp", upper: "LP", english: "position" },
    LineField { lower: "nazwa_rysunek", upper: "NAZWA_RYSUNEK", english: "name" },
    LineField { lower: "ilosc", upper: "ILOSC", english: "quantity" },
    LineField { lower: "opis", upper: "OPIS", english: "description" },
];

const IMAGE_ALIASES: &[&str] = &["image", "IMAGE"];

impl LineField {
    fn aliases(&self, layout: ContextLayout) -> Vec<&'static str> {
        match layout {
            ContextLayout::Positional => vec![self.lower, self.upper],
            ContextLayout::List => vec![self.lower, self.upper, self.english],
        }
    }

    fn outputs(&self, layout: ContextLayout) -> Vec<&'static str> {
        match layout {
            ContextLayout::Positional => vec![self.lower, self.upper],
            ContextLayout::List => vec![self.upper],
        }
    }
}

/// Build the template context for one offer record.
///
/// A non-object `record` is treated as an empty one. Image sources are
/// captured on each line but not decoded; that is
/// [`crate::pipeline::image::attach_images`]'s job.
pub fn normalize(record: &Value, config: &GeneratorConfig) -> TemplateContext {
    let empty = Map::new();
    let record = record.as_object().unwrap_or(&empty);

    let mut fields = BTreeMap::new();

    for (key, placeholders) in SCALARS {
        let value = scalar(record, key);
        for name in *placeholders {
            fields.insert((*name).to_string(), value.clone());
        }
    }

    let systems = record.get(SYSTEMS_KEY);
    match config.layout {
        ContextLayout::Positional => {
            for (i, value) in system_slots(systems).into_iter().enumerate() {
                fields.insert(format!("SYSTEM{}", i + 1), value);
            }
        }
        ContextLayout::List => {
            let list = system_list(systems).into_iter().map(Value::String).collect();
            fields.insert(SYSTEMS_LIST_KEY.to_string(), Value::Array(list));
        }
    }

    let items: Vec<LineContext> = match record.get(ITEMS_KEY) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| normalize_line(item, config.layout, config.alias_policy))
            .collect(),
        _ => Vec::new(),
    };

    debug!(
        "Normalised offer: {} placeholders, {} line items",
        fields.len(),
        items.len()
    );

    TemplateContext { fields, items }
}

/// Canonical scalar lookup: present and non-null wins, else `""`.
fn scalar(record: &Map<String, Value>, key: &str) -> Value {
    match record.get(key) {
        None | Some(Value::Null) => Value::String(String::new()),
        Some(v) => v.clone(),
    }
}

/// Exactly [`SYSTEM_SLOTS`] values: first entries kept raw, padded with `""`.
fn system_slots(systems: Option<&Value>) -> Vec<Value> {
    let given: &[Value] = match systems {
        Some(Value::Array(a)) => a,
        _ => &[],
    };
    (0..SYSTEM_SLOTS)
        .map(|i| match given.get(i) {
            None | Some(Value::Null) => Value::String(String::new()),
            Some(v) => v.clone(),
        })
        .collect()
}

/// Every non-null entry, string-coerced and trimmed; blanks dropped.
fn system_list(systems: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(given)) = systems else {
        return Vec::new();
    };
    given
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| match v {
            Value::String(s) => s.trim().to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            other => other.to_string().trim().to_string(),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn normalize_line(item: &Value, layout: ContextLayout, policy: AliasPolicy) -> LineContext {
    let empty = Map::new();
    let item = item.as_object().unwrap_or(&empty);

    let mut fields = BTreeMap::new();
    for field in LINE_FIELDS {
        let value = first_alias(item, &field.aliases(layout), policy);
        for name in field.outputs(layout) {
            fields.insert(name.to_string(), value.clone());
        }
    }

    let image_source = match first_alias(item, IMAGE_ALIASES, policy) {
        Value::String(s) => s,
        _ => String::new(),
    };

    LineContext {
        fields,
        image: None,
        image_source,
    }
}

/// First alias whose value the policy accepts, else `""`.
fn first_alias(item: &Map<String, Value>, aliases: &[&str], policy: AliasPolicy) -> Value {
    aliases
        .iter()
        .filter_map(|key| item.get(*key))
        .find(|v| accepts(policy, v))
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()))
}

fn accepts(policy: AliasPolicy, value: &Value) -> bool {
    match policy {
        AliasPolicy::Truthy => is_truthy(value),
        AliasPolicy::Present => !value.is_null(),
    }
}
