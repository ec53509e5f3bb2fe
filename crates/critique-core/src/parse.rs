//! Tolerant parsing of model replies.
//!
//! Models are asked for JSON but regularly wrap it in code fences, return
//! lists where maps were requested, or reply in prose. [`parse_object`]
//! yields either a JSON object or [`Parsed::Unparseable`]; the `normalize_*`
//! functions then coerce one field shape each. Nothing here fails.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Result of tolerant parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Structured(T),
    Unparseable,
}

impl<T> Parsed<T> {
    pub fn is_structured(&self) -> bool {
        matches!(self, Parsed::Structured(_))
    }

    pub fn structured(self) -> Option<T> {
        match self {
            Parsed::Structured(v) => Some(v),
            Parsed::Unparseable => None,
        }
    }
}

/// Remove a leading ```` ``` ```` / ```` ```json ```` fence and everything after the closing one.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = rest.split("```").next().unwrap_or_default().trim();
    match inner.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => inner[4..].trim(),
        _ => inner,
    }
}

/// Parse a reply that should be a JSON object.
///
/// When the reply is not an object on its own, the first complete object
/// embedded in surrounding prose is used.
pub fn parse_object(text: &str) -> Parsed<Map<String, Value>> {
    let body = strip_code_fence(text);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        return Parsed::Structured(map);
    }
    match embedded_object(text) {
        Some(map) => Parsed::Structured(map),
        None => Parsed::Unparseable,
    }
}

/// First `{...}` in `text` that parses as a JSON object, ignoring what follows it.
fn embedded_object(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(map))) => Some(map),
            _ => None,
        }
    })
}

/// Numbers and numeric strings as `f64`.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn non_empty_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Metric scores given either as `{metric: score}` or as
/// `[{metric|name: .., score|value: ..}]`. Non-numeric entries are dropped.
pub fn normalize_scores(value: Option<&Value>) -> BTreeMap<String, f64> {
    let mut scores = BTreeMap::new();
    match value {
        Some(Value::Object(map)) => {
            for (metric, raw) in map {
                if let Some(score) = as_f64(raw) {
                    scores.insert(metric.clone(), score);
                }
            }
        }
        Some(Value::Array(entries)) => {
            for entry in entries {
                let Value::Object(obj) = entry else { continue };
                let name = non_empty_str(obj, &["metric", "name"]);
                let score = ["score", "value"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(as_f64));
                if let (Some(name), Some(score)) = (name, score) {
                    scores.insert(name, score);
                }
            }
        }
        _ => {}
    }
    scores
}

/// References given as one `{title|name, url|link}` object or a list of them.
/// Entries missing either half are dropped.
pub fn normalize_references(value: Option<&Value>) -> BTreeMap<String, String> {
    let items: &[Value] = match value {
        Some(Value::Array(items)) => items,
        Some(v @ Value::Object(_)) => std::slice::from_ref(v),
        _ => &[],
    };

    let mut refs = BTreeMap::new();
    for item in items {
        let Value::Object(obj) = item else { continue };
        let title = non_empty_str(obj, &["title", "name"]);
        let url = non_empty_str(obj, &["url", "link"]);
        if let (Some(title), Some(url)) = (title, url) {
            refs.insert(title, url);
        }
    }
    refs
}

/// A string becomes a one-element list; list items are stringified and
/// blank ones dropped; anything else scalar becomes its string form.
pub fn normalize_string_list(value: Option<&Value>) -> Vec<String> {
    fn scalar(v: &Value) -> Option<String> {
        let s = match v {
            Value::Null => return None,
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        (!s.is_empty()).then_some(s)
    }

    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
        Some(Value::Bool(false)) => Vec::new(),
        Some(other) => scalar(other).into_iter().collect(),
    }
}

fn bullet_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"^(?:[-*]\s+|•\s*|\d{1,2}[.)]\s+)").expect("bullet marker pattern is valid")
    })
}

/// One entry per non-blank line with any bullet or numbering marker removed.
pub fn parse_bullet_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| bullet_marker().replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_json_fence() {
        let text = "```json\n{\"a\": 1}\n```\ntrailing prose";
        assert_eq!(strip_code_fence(text), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"b\":2} "), "{\"b\":2}");
    }

    #[test]
    fn parse_object_rejects_non_objects() {
        assert!(parse_object("{\"x\": 1}").is_structured());
        assert_eq!(parse_object("[1, 2]"), Parsed::Unparseable);
        assert_eq!(parse_object("I think the rebuttal is fine."), Parsed::Unparseable);
        assert_eq!(parse_object(""), Parsed::Unparseable);
    }

    #[test]
    fn object_inside_prose_is_found() {
        let reply = "Here is my assessment:\n{\"total_score\": 88, \"feedback\": \"use {braces} carefully\"}\nHope this helps.";
        let obj = parse_object(reply).structured().unwrap();
        assert_eq!(obj["total_score"], 88);
        assert_eq!(obj["feedback"], "use {braces} carefully");

        let fenced = "Sure.\n```json\n{\"queries\": [\"a\"]}\n```";
        assert!(parse_object(fenced).is_structured());

        assert_eq!(
            parse_object("Scores {not json} and {\"a\": 1"),
            Parsed::Unparseable
        );
    }

    #[test]
    fn scores_from_map_and_list() {
        let map = json!({"civility": 20, "actionability": "18.5", "bogus": "n/a"});
        let scores = normalize_scores(Some(&map));
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["actionability"], 18.5);

        let list = json!([
            {"metric": "civility", "score": 22},
            {"name": "evidence_quality", "value": "19"},
            {"metric": "no_score"},
            "junk"
        ]);
        let scores = normalize_scores(Some(&list));
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["evidence_quality"], 19.0);

        assert!(normalize_scores(Some(&json!(42))).is_empty());
        assert!(normalize_scores(None).is_empty());
    }

    #[test]
    fn references_accept_aliases_and_single_object() {
        let single = json!({"name": "WHO", "link": "https://who.int"});
        let refs = normalize_references(Some(&single));
        assert_eq!(refs["WHO"], "https://who.int");

        let list = json!([
            {"title": "CDC", "url": "https://cdc.gov"},
            {"title": "missing url"},
            {"url": "https://orphan.example"},
            7
        ]);
        let refs = normalize_references(Some(&list));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs["CDC"], "https://cdc.gov");

        assert!(normalize_references(Some(&json!("https://x"))).is_empty());
    }

    #[test]
    fn string_lists() {
        assert_eq!(normalize_string_list(Some(&json!("one"))), vec!["one"]);
        assert_eq!(
            normalize_string_list(Some(&json!(["a", " ", 3, null]))),
            vec!["a", "3"]
        );
        assert!(normalize_string_list(Some(&json!(""))).is_empty());
        assert!(normalize_string_list(None).is_empty());
    }

    #[test]
    fn bullet_markers_removed() {
        let text = "- first point\n• second point\n\n3. third point\n* fourth\nplain line\n-5% is not a bullet";
        assert_eq!(
            parse_bullet_list(text),
            vec![
                "first point",
                "second point",
                "third point",
                "fourth",
                "plain line",
                "-5% is not a bullet"
            ]
        );
    }
}
