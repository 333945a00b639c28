//! Module-loader configuration: parse the development `System.config(...)` block,
//! apply the distribution overrides and serialize it back to compact JSON.
//!
//! The development config is a JavaScript object literal, not JSON. Bare keys
//! are quoted by a single-pass tokenizer rather than repeated regex rewrites, so
//! keys that are substrings of one another cannot shift each other's offsets.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::core::errors::ExtractError;
use crate::core::page;

static CONFIG_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"System\.config\(([\s\S]*?)\);").expect("valid pattern")
});

/// Module path the distribution build maps `app` to.
pub const DIST_APP_PATH: &str = "./dist/app";

/// Parsed loader configuration with key order preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    entries: Map<String, Value>,
}

/// Outputs of the distribution transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionArtifacts {
    /// Standalone loader bootstrap script (`System.config({...});`).
    pub config_script: String,
    /// Development page rewritten for deployment.
    pub page: String,
}

impl LoaderConfig {
    /// Extract and parse the `System.config(...)` block from a development config script.
    pub fn from_script(source: &str) -> Result<Self, ExtractError> {
        let block = CONFIG_CALL
            .captures(source)
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| ExtractError::MalformedConfig {
                reason: "no System.config(...) call found".to_string(),
            })?;
        Self::parse(block.as_str())
    }

    /// Parse a loosely-JSON object literal (bare keys, single quotes, comments,
    /// trailing commas, line breaks).
    pub fn parse(literal: &str) -> Result<Self, ExtractError> {
        let normalized = normalize_literal(literal)?;
        let value: Value =
            serde_json::from_str(&normalized).map_err(|err| ExtractError::ConfigParse {
                reason: err.to_string(),
            })?;
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            other => Err(ExtractError::ConfigParse {
                reason: format!("expected an object, found {}", kind_of(&other)),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Merge the fixed distribution overrides. Overridden keys are last-write-wins,
    /// everything else is kept verbatim.
    pub fn apply_distribution_overrides(&mut self) -> Result<(), ExtractError> {
        object_entry(&mut self.entries, "map")?
            .insert("app".to_string(), Value::String(DIST_APP_PATH.to_string()));
        self.entries
            .insert("defaultJSExtensions".to_string(), Value::Bool(true));
        object_entry(&mut self.entries, "packages")?.insert(
            "app".to_string(),
            json!({ "defaultExtension": "js", "main": "./main.js" }),
        );
        Ok(())
    }

    /// Compact single-line JSON.
    pub fn to_compact_json(&self) -> String {
        Value::Object(self.entries.clone()).to_string()
    }

    /// `System.config({...});` script text.
    pub fn to_script(&self) -> String {
        format!("System.config({});", self.to_compact_json())
    }
}

/// Transform a development config script and page into their distribution forms.
///
/// The config must parse; the page rewrite tolerates missing markers.
pub fn to_distribution(
    dev_config_source: &str,
    dev_page_source: &str,
) -> Result<DistributionArtifacts, ExtractError> {
    let mut config = LoaderConfig::from_script(dev_config_source)?;
    config.apply_distribution_overrides()?;
    let config_json = config.to_compact_json();
    let page = page::rewrite_for_distribution(dev_page_source, &config_json);
    Ok(DistributionArtifacts {
        config_script: config.to_script(),
        page,
    })
}

fn object_entry<'a>(
    entries: &'a mut Map<String, Value>,
    key: &str,
) -> Result<&'a mut Map<String, Value>, ExtractError> {
    let slot = entries
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match slot {
        Value::Object(map) => Ok(map),
        other => Err(ExtractError::MalformedConfig {
            reason: format!("`{key}` must be an object, found {}", kind_of(other)),
        }),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Rewrite a JavaScript object literal into single-line strict JSON.
fn normalize_literal(literal: &str) -> Result<String, ExtractError> {
    let chars: Vec<char> = literal.chars().collect();
    let mut out = String::with_capacity(literal.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\r' | '\n' => i += 1,
            '"' | '\'' => {
                i = copy_string(&chars, i, &mut out)?;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ExtractError::ConfigParse {
                        reason: "unterminated block comment".to_string(),
                    });
                }
                i += 2;
            }
            '}' | ']' => {
                let trimmed = out.trim_end().len();
                out.truncate(trimmed);
                if out.ends_with(',') {
                    out.pop();
                }
                out.push(c);
                i += 1;
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_continue(chars[i]) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if chars.get(j) == Some(&':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(out)
}

/// Copy a quoted string starting at `start` as a JSON double-quoted string.
/// Returns the index just past the closing quote.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> Result<usize, ExtractError> {
    let quote = chars[start];
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let next = chars.get(i + 1).copied().ok_or_else(|| ExtractError::ConfigParse {
                    reason: "dangling escape in string".to_string(),
                })?;
                if next == '\'' {
                    out.push('\'');
                } else {
                    out.push('\\');
                    out.push(next);
                }
                i += 2;
            }
            '\r' | '\n' => i += 1,
            c if c == quote => {
                out.push('"');
                return Ok(i + 1);
            }
            '"' => {
                out.push_str("\\\"");
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ExtractError::ConfigParse {
        reason: "unterminated string".to_string(),
    })
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV_CONFIG: &str = r#"System.config({
  defaultJSExtensions: false,
  transpiler: false,
  paths: {
    "npm:": "jspm_packages/npm/"
  },
  a: 1,
  b: 'two',
  map: {
    "@angular/core": "npm:@angular/core@2.4.0",
    mapping: "./mapping"
  },
  packages: {
    "rxjs": { "defaultExtension": "js" }
  }
});
"#;

    #[test]
    fn parses_bare_keys_and_single_quotes() {
        let config = LoaderConfig::from_script(DEV_CONFIG).expect("parse");
        assert_eq!(config.get("a"), Some(&json!(1)));
        assert_eq!(config.get("b"), Some(&json!("two")));
        assert_eq!(
            config.get("paths"),
            Some(&json!({ "npm:": "jspm_packages/npm/" }))
        );
    }

    #[test]
    fn keys_that_are_substrings_of_each_other_are_quoted_once() {
        let config = LoaderConfig::parse("{ map: 1, mapping: 2, maps: { map: 3 } }").expect("parse");
        assert_eq!(config.to_compact_json(), r#"{"map":1,"mapping":2,"maps":{"map":3}}"#);
    }

    #[test]
    fn tolerates_comments_and_trailing_commas() {
        let literal = "{\n  // comment: ignored\n  a: [1, 2,],\n  /* b: 1 */\n  c: true,\n}";
        let config = LoaderConfig::parse(literal).expect("parse");
        assert_eq!(config.to_compact_json(), r#"{"a":[1,2],"c":true}"#);
    }

    #[test]
    fn url_values_are_not_treated_as_comments() {
        let config = LoaderConfig::parse("{ base: 'http://localhost:3000/' }").expect("parse");
        assert_eq!(config.get("base"), Some(&json!("http://localhost:3000/")));
    }

    #[test]
    fn missing_config_call_is_malformed() {
        let err = LoaderConfig::from_script("var x = 1;").unwrap_err();
        assert!(matches!(err, ExtractError::MalformedConfig { .. }));
    }

    #[test]
    fn unparseable_block_is_config_parse_error() {
        let err = LoaderConfig::from_script("System.config({ a: });").unwrap_err();
        assert!(matches!(err, ExtractError::ConfigParse { .. }));
    }

    #[test]
    fn distribution_overrides_keep_other_keys() {
        let mut config = LoaderConfig::from_script(DEV_CONFIG).expect("parse");
        config.apply_distribution_overrides().expect("overrides");

        assert_eq!(config.get("defaultJSExtensions"), Some(&json!(true)));
        assert_eq!(config.get("a"), Some(&json!(1)));
        assert_eq!(config.get("b"), Some(&json!("two")));
        let map = config.get("map").expect("map");
        assert_eq!(map["app"], json!("./dist/app"));
        assert_eq!(map["mapping"], json!("./mapping"));
        let packages = config.get("packages").expect("packages");
        assert_eq!(
            packages["app"],
            json!({ "defaultExtension": "js", "main": "./main.js" })
        );
        assert_eq!(packages["rxjs"], json!({ "defaultExtension": "js" }));
    }

    #[test]
    fn overrides_create_missing_tables() {
        let mut config = LoaderConfig::parse("{ a: 1, b: 2 }").expect("parse");
        config.apply_distribution_overrides().expect("overrides");
        let reparsed: Value = serde_json::from_str(&config.to_compact_json()).expect("json");
        assert_eq!(reparsed["a"], json!(1));
        assert_eq!(reparsed["b"], json!(2));
        assert_eq!(reparsed["map"]["app"], json!("./dist/app"));
        assert_eq!(reparsed["packages"]["app"]["main"], json!("./main.js"));
    }

    #[test]
    fn non_object_map_is_rejected() {
        let mut config = LoaderConfig::parse("{ map: 'nope' }").expect("parse");
        let err = config.apply_distribution_overrides().unwrap_err();
        assert!(err.to_string().contains("`map` must be an object"));
    }

    #[test]
    fn to_distribution_emits_script_and_page() {
        let page = "<script src=\"config.js\"></script>\n<p>body</p>";
        let artifacts = to_distribution(DEV_CONFIG, page).expect("distribution");
        assert!(artifacts.config_script.starts_with("System.config({"));
        assert!(artifacts.config_script.ends_with("});"));
        assert!(!artifacts.config_script.contains('\n'));
        assert!(artifacts.page.contains("<script>System.config({"));
        assert!(artifacts.page.contains("<p>body</p>"));
    }
}
