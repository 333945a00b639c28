//! View over the local project settings file.
//!
//! The file is keyed by region name. Only the fields this tool reads or writes
//! are typed; everything else round-trips untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::ExtractError;

/// Per-region entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionSettings {
    #[serde(rename = "ProjectStackId", default, skip_serializing_if = "Option::is_none")]
    pub project_stack_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Page the region's e2e run is pointed at (e.g. `us-east-1_index.html`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegionSettings {
    /// Region embedded in the project stack id (`arn:aws:cloudformation:<region>:...`).
    pub fn stack_region(&self) -> Option<&str> {
        self.project_stack_id
            .as_deref()
            .and_then(|id| id.split(':').nth(3))
            .filter(|region| !region.is_empty())
    }
}

/// Local project settings document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectSettingsRecord {
    entries: Map<String, Value>,
}

impl ProjectSettingsRecord {
    pub fn parse(text: &str) -> Result<Self, ExtractError> {
        let value: Value = serde_json::from_str(text).map_err(|err| ExtractError::SettingsParse {
            reason: err.to_string(),
        })?;
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            _ => Err(ExtractError::SettingsParse {
                reason: "top level is not an object".to_string(),
            }),
        }
    }

    /// Typed entry for `region`; `None` when absent or not an object.
    pub fn region(&self, region: &str) -> Option<RegionSettings> {
        match self.entries.get(region) {
            Some(value @ Value::Object(_)) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    pub fn set_region(
        &mut self,
        region: &str,
        settings: &RegionSettings,
    ) -> Result<(), ExtractError> {
        let value = serde_json::to_value(settings).map_err(|err| ExtractError::SettingsEncode {
            reason: err.to_string(),
        })?;
        self.entries.insert(region.to_string(), value);
        Ok(())
    }

    /// True when the region's project stack id names the same region.
    ///
    /// An entry for another region (for example one copied between keys) does
    /// not count.
    pub fn is_provisioned(&self, region: &str) -> bool {
        self.region(region)
            .is_some_and(|settings| settings.stack_region() == Some(region))
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_pretty_json(&self) -> Result<String, ExtractError> {
        let mut out = serde_json::to_string_pretty(&self.entries).map_err(|err| {
            ExtractError::SettingsEncode {
                reason: err.to_string(),
            }
        })?;
        out.push('\n');
        Ok(out)
    }
}
