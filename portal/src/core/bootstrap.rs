//! Capture of the portal bootstrap object from CLI output and its injection into
//! the entry page.
//!
//! A bootstrap is only recognized when all five fields are present inside one
//! object literal on a single line. Partial objects (any field missing) are
//! reported as not found; there is no partial-success mode.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::ExtractError;
use crate::core::page::{self, Region};

/// Field names in extraction order.
pub const BOOTSTRAP_FIELDS: [&str; 5] = [
    "identityPoolId",
    "projectConfigBucketId",
    "userPoolId",
    "region",
    "clientId",
];

static FIELD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    BOOTSTRAP_FIELDS
        .iter()
        .map(|field| {
            Regex::new(&format!(r#""{field}":\s*"([^"\s]*)""#)).expect("valid field pattern")
        })
        .collect()
});

/// Identifiers of a bound cloud environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapRecord {
    pub identity_pool_id: String,
    pub project_config_bucket_id: String,
    pub user_pool_id: String,
    pub region: String,
    pub client_id: String,
    /// The object literal exactly as it appeared in the source text.
    #[serde(skip)]
    pub raw: String,
}

/// Find the first single-line object literal carrying all five bootstrap fields.
pub fn capture_bootstrap(text: &str) -> Option<BootstrapRecord> {
    text.lines().find_map(capture_in_line)
}

fn capture_in_line(line: &str) -> Option<BootstrapRecord> {
    let close = line.rfind('}')?;
    line.match_indices('{')
        .map(|(open, _)| open)
        .take_while(|open| *open < close)
        .find_map(|open| record_from_literal(&line[open..=close]))
}

fn record_from_literal(literal: &str) -> Option<BootstrapRecord> {
    let mut values = FIELD_PATTERNS.iter().map(|pattern| {
        pattern
            .captures(literal)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    });
    Some(BootstrapRecord {
        identity_pool_id: values.next()??,
        project_config_bucket_id: values.next()??,
        user_pool_id: values.next()??,
        region: values.next()??,
        client_id: values.next()??,
        raw: literal.to_string(),
    })
}

/// Replace the page's single `var bootstrap = {...}` statement with the captured literal.
///
/// Applying the same record twice yields the same page as applying it once.
pub fn inject_bootstrap(page_source: &str, record: &BootstrapRecord) -> Result<String, ExtractError> {
    let range = page::locate(page_source, Region::BootstrapStatement)?;
    let mut out = String::with_capacity(page_source.len() + record.raw.len());
    out.push_str(&page_source[..range.start]);
    out.push_str("var bootstrap = ");
    out.push_str(&record.raw);
    out.push_str(&page_source[range.end..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_X: &str = r#"{"identityPoolId": "x", "projectConfigBucketId": "x", "userPoolId": "x", "region": "x", "clientId": "x"}"#;

    #[test]
    fn captures_record_from_cli_noise() {
        let output = format!("Loading project...\nBootstrap configuration:\n{ALL_X}\nDone.\n");
        let record = capture_bootstrap(&output).expect("record");
        assert_eq!(record.identity_pool_id, "x");
        assert_eq!(record.client_id, "x");
        assert_eq!(record.raw, ALL_X);
    }

    #[test]
    fn captures_distinct_field_values() {
        let output = r#"{"clientId": "c1", "region": "us-west-2", "userPoolId": "up", "projectConfigBucketId": "bucket", "identityPoolId": "us-west-2:abc"}"#;
        let record = capture_bootstrap(output).expect("record");
        assert_eq!(record.region, "us-west-2");
        assert_eq!(record.identity_pool_id, "us-west-2:abc");
        assert_eq!(record.project_config_bucket_id, "bucket");
        assert_eq!(record.user_pool_id, "up");
        assert_eq!(record.client_id, "c1");
    }

    #[test]
    fn four_of_five_fields_is_not_found() {
        for missing in BOOTSTRAP_FIELDS {
            let partial = ALL_X.replace(&format!("\"{missing}\""), "\"other\"");
            assert_eq!(capture_bootstrap(&partial), None, "missing {missing}");
        }
    }

    #[test]
    fn fields_split_across_lines_are_not_found() {
        let split = ALL_X.replace(", \"region\"", ",\n\"region\"");
        assert_eq!(capture_bootstrap(&split), None);
    }

    #[test]
    fn inject_into_empty_bootstrap() {
        let page = "<script>\nvar bootstrap = {}\n</script>\n<p>keep</p>\n";
        let record = capture_bootstrap(ALL_X).expect("record");
        let out = inject_bootstrap(page, &record).expect("inject");
        assert_eq!(
            out,
            format!("<script>\nvar bootstrap = {ALL_X}\n</script>\n<p>keep</p>\n")
        );
    }

    #[test]
    fn inject_is_idempotent() {
        let page = "var bootstrap = {\"old\": true}\nvar other = 1\n";
        let record = capture_bootstrap(ALL_X).expect("record");
        let once = inject_bootstrap(page, &record).expect("once");
        let twice = inject_bootstrap(&once, &record).expect("twice");
        assert_eq!(once, twice);
    }

    #[test]
    fn inject_requires_bootstrap_statement() {
        let record = capture_bootstrap(ALL_X).expect("record");
        let err = inject_bootstrap("<html></html>", &record).unwrap_err();
        assert!(matches!(err, ExtractError::RegionMissing { .. }));
    }

    #[test]
    fn page_with_injected_record_is_recognized() {
        let page = format!("<script>var bootstrap = {ALL_X}</script>");
        assert!(capture_bootstrap(&page).is_some());
        assert!(capture_bootstrap("<script>var bootstrap = {}</script>").is_none());
    }
}
