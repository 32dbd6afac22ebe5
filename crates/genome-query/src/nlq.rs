//! Natural-language query routing
//!
//! A deterministic keyword table maps free text onto the closed filter
//! surface ({type, language, file-pattern}). No model inference; the same
//! text always yields the same predicate.

use serde_json::{json, Value};

use genome_core::{GenomeError, Result};

const TYPE_KEYWORDS: &[(&str, &str)] = &[
    ("function", "function"),
    ("functions", "function"),
    ("method", "function"),
    ("methods", "function"),
    ("class", "class"),
    ("classes", "class"),
    ("test", "test"),
    ("tests", "test"),
    ("config", "config"),
    ("configs", "config"),
    ("configuration", "config"),
    ("file", "file"),
    ("files", "file"),
    ("module", "module"),
    ("modules", "module"),
    ("route", "resource"),
    ("routes", "resource"),
    ("endpoint", "resource"),
    ("endpoints", "resource"),
];

const LANGUAGE_KEYWORDS: &[(&str, &str)] = &[
    ("python", "Python"),
    ("rust", "Rust"),
    ("typescript", "TypeScript"),
    ("javascript", "JavaScript"),
    ("go", "Go"),
    ("golang", "Go"),
    ("java", "Java"),
];

/// Translate free text into a structured predicate. Unknown words are
/// dropped; text with no recognizable keyword is `InvalidInput`.
pub fn translate(text: &str) -> Result<Value> {
    let mut clauses = Vec::new();
    let mut terms: Vec<String> = Vec::new();

    for raw in text.split_whitespace() {
        let word = raw
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '*' && c != '/')
            .to_ascii_lowercase();
        if word.is_empty() {
            continue;
        }
        if let Some((_, ty)) = TYPE_KEYWORDS.iter().find(|(k, _)| *k == word) {
            clauses.push(json!({"type": ty}));
            continue;
        }
        if let Some((_, lang)) = LANGUAGE_KEYWORDS.iter().find(|(k, _)| *k == word) {
            clauses.push(json!({"language": lang}));
            continue;
        }
        // `*.py` / `src/` spellings become file-pattern filters.
        if word.contains('*') || word.contains('/') || word.contains('.') {
            let pattern = regex::escape(&word).replace("\\*", ".*");
            clauses.push(json!({"field": "file", "regex": pattern}));
            continue;
        }
        terms.push(word);
    }

    // Leftover words match against ids.
    for term in &terms {
        clauses.push(json!({"field": "id", "regex": regex::escape(term)}));
    }

    if clauses.is_empty() {
        return Err(GenomeError::invalid_input(
            "no recognizable filter keywords in query",
        ));
    }
    Ok(json!({ "and": clauses }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_and_languages_map_to_filters() {
        let predicate = translate("python functions").unwrap();
        let clauses = predicate["and"].as_array().unwrap();
        assert!(clauses.contains(&json!({"language": "Python"})));
        assert!(clauses.contains(&json!({"type": "function"})));
    }

    #[test]
    fn file_patterns_become_regex() {
        let predicate = translate("tests in src/").unwrap();
        let clauses = predicate["and"].as_array().unwrap();
        assert!(clauses.iter().any(|c| c["field"] == "file"));
    }

    #[test]
    fn translation_is_deterministic() {
        let a = translate("python classes auth").unwrap();
        let b = translate("python classes auth").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_translation_is_invalid_input() {
        assert!(matches!(
            translate("???"),
            Err(GenomeError::InvalidInput { .. })
        ));
    }
}
