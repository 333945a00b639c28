//! Interpretation of cloud CLI output.
//!
//! The CLI contract is English text. Everything that pattern-matches that text
//! lives here so the orchestration layer only sees typed results.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::ExtractError;

/// Prefix of generated project stack names.
pub const PROJECT_STACK_PREFIX: &str = "CGPProjStk";

/// Logical name of the portal's bucket in the project stack.
pub const PORTAL_RESOURCE: &str = "CloudGemPortal";
/// Resource type of the portal's bucket.
pub const PORTAL_RESOURCE_TYPE: &str = "AWS::S3::Bucket";

static PORTAL_BUCKET_FALLBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)CloudGemPortal\s*AWS::S3::Bucket\s*(CREATE_COMPLETE|UPDATE_COMPLETE)")
        .expect("valid pattern")
});
static STACK_COMPLETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)Stack\s'{PROJECT_STACK_PREFIX}\S*'\supdate\scomplete"
    ))
    .expect("valid pattern")
});
static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Username:\s(\S*)").expect("valid pattern"));
static PASSWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Password:\s(\S*)").expect("valid pattern"));
static SETTINGS_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Local Project Settings\s*(\S*)").expect("valid pattern"));

/// Generate a project stack name from epoch milliseconds.
///
/// The leading five digits are dropped so the name stays short while remaining
/// unique across runs.
pub fn project_stack_name(epoch_millis: i64) -> String {
    let digits = epoch_millis.to_string();
    let suffix = digits.get(5..).filter(|s| !s.is_empty()).unwrap_or(&digits);
    format!("{PROJECT_STACK_PREFIX}{suffix}")
}

/// One row of `project list-resources` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRow {
    pub name: String,
    pub resource_type: String,
    pub status: String,
}

/// Whether the project stack hosting the portal exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackPresence {
    /// The portal bucket is in a completed create/update state.
    Present { status: String },
    /// The portal bucket is mid-transition (e.g. `UPDATE_IN_PROGRESS`).
    Transitional { status: String },
    /// No usable portal bucket.
    Absent,
}

impl StackPresence {
    pub fn is_present(&self) -> bool {
        matches!(self, StackPresence::Present { .. })
    }
}

/// Parse resource rows (`name type status ...`) out of a listing table.
pub fn parse_resource_table(text: &str) -> Vec<ResourceRow> {
    text.lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let name = cols.next()?;
            let resource_type = cols.next()?;
            let status = cols.next()?;
            let is_status = status
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_');
            if !resource_type.contains("::") || !is_status {
                return None;
            }
            Some(ResourceRow {
                name: name.to_string(),
                resource_type: resource_type.to_string(),
                status: status.to_string(),
            })
        })
        .collect()
}

/// Classify the portal bucket from resource listing output.
///
/// Parses the table first; output without any recognizable row falls back to a
/// plain text match for a completed bucket.
pub fn classify_portal_stack(listing: &str) -> StackPresence {
    let rows = parse_resource_table(listing);
    if rows.is_empty() {
        return match PORTAL_BUCKET_FALLBACK.captures(listing) {
            Some(caps) => StackPresence::Present {
                status: caps[1].to_ascii_uppercase(),
            },
            None => StackPresence::Absent,
        };
    }

    let Some(row) = rows.iter().find(|row| {
        row.name.eq_ignore_ascii_case(PORTAL_RESOURCE)
            && row.resource_type.eq_ignore_ascii_case(PORTAL_RESOURCE_TYPE)
    }) else {
        return StackPresence::Absent;
    };
    let status = row.status.clone();
    match status.as_str() {
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" => StackPresence::Present { status },
        s if s.ends_with("_IN_PROGRESS") && !s.starts_with("DELETE") => {
            StackPresence::Transitional { status }
        }
        _ => StackPresence::Absent,
    }
}

/// True when stack creation output reports the generated project stack as complete.
pub fn stack_creation_completed(output: &str) -> bool {
    STACK_COMPLETE.is_match(output)
}

/// Administrator account reported by project stack creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

/// Scrape administrator credentials from stack creation output.
pub fn scrape_credentials(output: &str) -> Option<AdminCredentials> {
    let username = USERNAME.captures(output)?.get(1)?.as_str();
    let password = PASSWORD.captures(output)?.get(1)?.as_str();
    if username.is_empty() {
        return None;
    }
    Some(AdminCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Extract the local project settings path from `cloud-gem-framework paths` output.
pub fn settings_path_from_output(output: &str) -> Result<String, ExtractError> {
    SETTINGS_PATH
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|path| !path.is_empty())
        .ok_or(ExtractError::SettingsPathNotFound)
}

/// Generic remediation guidance shown when provisioning fails.
///
/// These are static hints; they are not derived from the CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationHint {
    /// The cloud gem framework is not enabled or the engine root is wrong.
    EngineNotFound,
    /// No default cloud credentials are configured.
    CredentialsMissing,
    /// Account resource limits (e.g. table count) are exhausted.
    QuotaExceeded,
}

impl RemediationHint {
    pub const ALL: [RemediationHint; 3] = [
        RemediationHint::EngineNotFound,
        RemediationHint::CredentialsMissing,
        RemediationHint::QuotaExceeded,
    ];

    pub fn message(self, engine_root: &Path) -> String {
        match self {
            RemediationHint::EngineNotFound => format!(
                "Verify you have the Cloud Gem Framework enabled for your project.\n\tRun the Project Configurator from {}",
                engine_root.display()
            ),
            RemediationHint::CredentialsMissing => format!(
                "Verify you have default AWS credentials set with command:\n\tcd {}\n\tlmbr_aws profile list",
                engine_root.display()
            ),
            RemediationHint::QuotaExceeded => {
                "Verify you have sufficient AWS resource capacity, e.g. you can create more DynamoDB tables.".to_string()
            }
        }
    }
}

/// Step of environment provisioning that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    CreateStack,
    WriteBootstrap,
}

/// Diagnostic bundle for a failed provisioning attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionFailure {
    pub stage: ProvisionStage,
    /// One-line summary of what went wrong.
    pub summary: String,
    /// Raw CLI stdout of the failing call.
    pub stdout: String,
    /// Raw CLI stderr of the failing call.
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub hints: Vec<RemediationHint>,
}

impl ProvisionFailure {
    pub fn create_stack(stdout: String, stderr: String, exit_code: Option<i32>) -> Self {
        Self {
            stage: ProvisionStage::CreateStack,
            summary: "The attempt to automatically create a Cloud Gem Portal development project stack failed."
                .to_string(),
            stdout,
            stderr,
            exit_code,
            hints: RemediationHint::ALL.to_vec(),
        }
    }

    pub fn bootstrap_missing(stdout: String, stderr: String, exit_code: Option<i32>) -> Self {
        Self {
            stage: ProvisionStage::WriteBootstrap,
            summary: "The attempt to automatically write the Cloud Gem Portal development bootstrap failed."
                .to_string(),
            stdout,
            stderr,
            exit_code,
            hints: vec![RemediationHint::EngineNotFound, RemediationHint::CredentialsMissing],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Name                 Type              Status              Timestamp
-------------------- ----------------- ------------------- -------------------
CloudGemPortal       AWS::S3::Bucket   CREATE_COMPLETE     2019-01-01 10:00:00
Configuration        AWS::S3::Bucket   CREATE_COMPLETE     2019-01-01 10:00:00
";

    #[test]
    fn stack_name_drops_leading_digits() {
        assert_eq!(project_stack_name(1_546_300_800_123), "CGPProjStk00800123");
    }

    #[test]
    fn stack_name_keeps_short_values() {
        assert_eq!(project_stack_name(42), "CGPProjStk42");
    }

    #[test]
    fn parses_resource_rows() {
        let rows = parse_resource_table(LISTING);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "CloudGemPortal");
        assert_eq!(rows[0].status, "CREATE_COMPLETE");
    }

    #[test]
    fn classifies_completed_bucket_as_present() {
        assert!(classify_portal_stack(LISTING).is_present());
    }

    #[test]
    fn classifies_in_progress_bucket_as_transitional() {
        let listing = LISTING.replace(
            "CloudGemPortal       AWS::S3::Bucket   CREATE_COMPLETE",
            "CloudGemPortal       AWS::S3::Bucket   UPDATE_IN_PROGRESS",
        );
        assert_eq!(
            classify_portal_stack(&listing),
            StackPresence::Transitional {
                status: "UPDATE_IN_PROGRESS".to_string()
            }
        );
    }

    #[test]
    fn classifies_missing_bucket_as_absent() {
        let listing = "Name Type Status\nConfiguration AWS::S3::Bucket CREATE_COMPLETE\n";
        assert_eq!(classify_portal_stack(listing), StackPresence::Absent);
        assert_eq!(classify_portal_stack("no project stack"), StackPresence::Absent);
    }

    #[test]
    fn falls_back_to_text_match_without_table_rows() {
        let listing = "resources: CloudGemPortal AWS::S3::Bucket update_complete";
        assert!(parse_resource_table(listing).is_empty());
        assert_eq!(
            classify_portal_stack(listing),
            StackPresence::Present {
                status: "UPDATE_COMPLETE".to_string()
            }
        );
    }

    #[test]
    fn detects_stack_completion() {
        assert!(stack_creation_completed(
            "Stack 'CGPProjStk00800123' update complete"
        ));
        assert!(!stack_creation_completed("Stack 'Other' update complete"));
        assert!(!stack_creation_completed("Stack 'CGPProjStk1' update failed"));
    }

    #[test]
    fn scrapes_credentials() {
        let out = "Created admin.\nUsername: administrator\nPassword: s3cr3t!\n";
        assert_eq!(
            scrape_credentials(out),
            Some(AdminCredentials {
                username: "administrator".to_string(),
                password: "s3cr3t!".to_string(),
            })
        );
        assert_eq!(scrape_credentials("Stack created"), None);
    }

    #[test]
    fn extracts_settings_path() {
        let out = "Game Directory   C:/dev/Game\nLocal Project Settings   C:/dev/Game/AWS/local-project-settings.json\n";
        assert_eq!(
            settings_path_from_output(out).expect("path"),
            "C:/dev/Game/AWS/local-project-settings.json"
        );
        assert_eq!(
            settings_path_from_output("nothing").unwrap_err(),
            ExtractError::SettingsPathNotFound
        );
    }

    #[test]
    fn failure_bundle_carries_all_hints() {
        let failure = ProvisionFailure::create_stack("out".into(), "err".into(), Some(1));
        assert_eq!(failure.hints.len(), 3);
        assert!(
            RemediationHint::CredentialsMissing
                .message(Path::new("/engine"))
                .contains("/engine")
        );
    }
}
