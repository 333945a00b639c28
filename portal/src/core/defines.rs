//! Compile-time defines written into the application environment file.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::rewrite::replace_or_append;

static IS_PROD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"export const isProd: boolean = (true|false)").expect("valid pattern")
});
static IS_TEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"export const isTest: boolean = (true|false)").expect("valid pattern")
});
static WHITELISTED_GEMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"export const metricWhiteListedCloudGem = \[.*\]").expect("valid pattern")
});
static WHITELISTED_FEATURES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"export const metricWhiteListedFeature = \[.*\]").expect("valid pattern")
});
static ADMIN_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"export const metricAdminIndex = 3").expect("valid pattern"));

/// Features whose usage metrics are always reported.
pub const WHITELISTED_FEATURES_LIST: [&str; 5] =
    ["Cloud Gems", "Support", "Analytics", "Admin", "User Administration"];

/// A mode flag toggled by the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Define {
    Prod(bool),
    Test(bool),
}

impl fmt::Display for Define {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Define::Prod(true) => f.write_str("prod"),
            Define::Prod(false) => f.write_str("dev"),
            Define::Test(true) => f.write_str("test-on"),
            Define::Test(false) => f.write_str("test-off"),
        }
    }
}

/// Apply the global defines and then `define` to the environment file content.
///
/// Every rule goes through `replace_or_append`, so missing lines are added and
/// existing ones are rewritten in place.
pub fn apply_define(content: &str, define: Define, whitelisted_gems: &[String]) -> String {
    let mut out = apply_global_defines(content, whitelisted_gems);
    let (pattern, replacement) = match define {
        Define::Prod(on) => (&*IS_PROD, format!("export const isProd: boolean = {on}")),
        Define::Test(on) => (&*IS_TEST, format!("export const isTest: boolean = {on}")),
    };
    out = replace_or_append(&out, pattern, &replacement);
    out
}

fn apply_global_defines(content: &str, whitelisted_gems: &[String]) -> String {
    let gems = whitelisted_gems
        .iter()
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(",");
    let features = WHITELISTED_FEATURES_LIST
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(", ");

    let rules = [
        (
            &*WHITELISTED_GEMS,
            format!("export const metricWhiteListedCloudGem = [{gems}]"),
        ),
        (
            &*WHITELISTED_FEATURES,
            format!("export const metricWhiteListedFeature = [{features}]"),
        ),
        (&*ADMIN_INDEX, "export const metricAdminIndex = 3".to_string()),
    ];
    rules
        .iter()
        .fold(content.to_string(), |acc, (pattern, replacement)| {
            replace_or_append(&acc, pattern, replacement)
        })
}

/// Folder names that count as cloud gems for the metric whitelist.
pub fn cloud_gem_names<I, S>(folders: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = folders
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .filter(|name| name.to_lowercase().starts_with("cloudgem"))
        .collect();
    names.sort();
    names
}
