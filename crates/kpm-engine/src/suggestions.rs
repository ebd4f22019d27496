//! Fuzzy matching for error suggestions
//!
//! Uses Levenshtein distance to propose the closest known variable or
//! filter name when a template references something that does not exist.

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Filters registered in the expression renderer
pub const AVAILABLE_FILTERS: &[&str] = &[
    "toyaml",
    "tojson",
    "b64encode",
    "b64decode",
    "quote",
    "squote",
    "nindent",
    "indent",
    "required",
    "sha256",
    "trunc",
    "trimprefix",
    "trimsuffix",
    // Built-in MiniJinja filters
    "default",
    "upper",
    "lower",
    "title",
    "replace",
    "trim",
    "join",
    "first",
    "last",
    "length",
    "map",
    "select",
    "items",
    "int",
    "float",
    "string",
    "list",
    "urlencode",
];

/// Top-level names visible to expression templates
pub const CONTEXT_VARIABLES: &[&str] = &["params"];

#[derive(Debug, Clone)]
pub struct Suggestion {
    pub text: String,
    /// Levenshtein distance (lower = better match)
    pub distance: usize,
    pub category: SuggestionCategory,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuggestionCategory {
    Variable,
    Filter,
    Property,
}

/// Find closest matches from a list of candidates, best first
pub fn find_closest_matches(
    input: &str,
    candidates: &[&str],
    max_results: usize,
    category: SuggestionCategory,
) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = strsim::levenshtein(input, candidate);
            (distance > 0 && distance <= MAX_SUGGESTION_DISTANCE).then(|| Suggestion {
                text: candidate.to_string(),
                distance,
                category,
            })
        })
        .collect();

    suggestions.sort_by(|a, b| a.distance.cmp(&b.distance).then(a.text.cmp(&b.text)));
    suggestions.truncate(max_results);
    suggestions
}

/// Suggest the expression context root when the first segment is a typo
pub fn suggest_context_root(expression: &str) -> Option<String> {
    let root = expression.split('.').next().unwrap_or(expression);
    find_closest_matches(root, CONTEXT_VARIABLES, 1, SuggestionCategory::Variable)
        .first()
        .map(|m| format!("Did you mean `{}`?", m.text))
}

/// Suggest corrections for an undefined variable
///
/// Dotted names are compared whole against dotted candidates.
pub fn suggest_undefined_variable(variable_name: &str, available: &[String]) -> Option<String> {
    let candidates: Vec<&str> = available.iter().map(String::as_str).collect();
    let matches = find_closest_matches(variable_name, &candidates, 3, SuggestionCategory::Variable);
    if matches.is_empty() {
        return None;
    }
    let names: Vec<String> = matches.iter().map(|s| format!("`{}`", s.text)).collect();
    Some(format!("Did you mean {}?", names.join(" or ")))
}

/// Suggest corrections for an unknown filter
pub fn suggest_unknown_filter(filter_name: &str) -> Option<String> {
    let matches = find_closest_matches(filter_name, AVAILABLE_FILTERS, 3, SuggestionCategory::Filter);
    if matches.is_empty() {
        return Some(format!(
            "Unknown filter `{}`. Common filters: toyaml, tojson, b64encode, quote, default, nindent",
            filter_name
        ));
    }
    let names: Vec<String> = matches.iter().map(|s| format!("`{}`", s.text)).collect();
    Some(format!("Did you mean {}?", names.join(" or ")))
}

/// Dotted paths of every leaf and object in a variable tree
pub fn variable_paths(value: &serde_json::Value) -> Vec<String> {
    fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<String>) {
        if let serde_json::Value::Object(map) = value {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                out.push(path.clone());
                walk(&path, child, out);
            }
        }
    }
    let mut out = Vec::new();
    walk("", value, &mut out);
    out
}

/// Extract a quoted name from an error message
pub fn extract_variable_name(msg: &str) -> Option<String> {
    for quote in ["`", "'", "\""] {
        if let Some(start) = msg.find(quote) {
            let rest = &msg[start + quote.len()..];
            if let Some(end) = rest.find(quote) {
                return Some(rest[..end].to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_closest_matches() {
        let matches =
            find_closest_matches("toyml", AVAILABLE_FILTERS, 3, SuggestionCategory::Filter);
        assert_eq!(matches[0].text, "toyaml");
        assert_eq!(matches[0].distance, 1);
    }

    #[test]
    fn test_exact_match_is_not_a_suggestion() {
        assert!(find_closest_matches("quote", &["quote"], 3, SuggestionCategory::Filter).is_empty());
    }

    #[test]
    fn test_suggest_undefined_variable() {
        let available = vec!["image".to_string(), "replicas".to_string()];
        let help = suggest_undefined_variable("imgae", &available).unwrap();
        assert_eq!(help, "Did you mean `image`?");
        assert!(suggest_undefined_variable("zzzzzzzz", &available).is_none());
    }

    #[test]
    fn test_suggest_context_root() {
        let help = suggest_context_root("param.variables.x").unwrap();
        assert!(help.contains("`params`"));
        assert!(suggest_context_root("params.variables.x").is_none());
    }

    #[test]
    fn test_variable_paths() {
        let paths = variable_paths(&json!({"image": {"tag": "1"}, "replicas": 2}));
        assert_eq!(paths, vec!["image", "image.tag", "replicas"]);
    }

    #[test]
    fn test_extract_variable_name() {
        assert_eq!(
            extract_variable_name("unknown filter `toyml`"),
            Some("toyml".to_string())
        );
        assert_eq!(extract_variable_name("no quotes"), None);
    }
}
