//! Local project settings on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::core::settings::ProjectSettingsRecord;
use crate::io::files::{FileSnapshot, read_required, write_file};

/// Suffix of the backup copy written before any mutation.
pub const BACKUP_SUFFIX: &str = "_bak";

/// Settings loaded for mutation, with the original content held for restore.
pub struct SettingsStore {
    snapshot: FileSnapshot,
    pub record: ProjectSettingsRecord,
}

impl SettingsStore {
    /// Load settings, write the `_bak` copy and keep a snapshot for restore.
    pub fn open(path: &Path) -> Result<Self> {
        let text = read_required(path)?;
        let record = ProjectSettingsRecord::parse(&text)
            .with_context(|| format!("parse {}", path.display()))?;
        let snapshot = FileSnapshot::capture(path)?;
        info!(settings = %text, "current local project settings");
        let backup = snapshot.write_backup(BACKUP_SUFFIX)?;
        info!(backup = %backup.display(), "saved local project settings backup");
        Ok(Self { snapshot, record })
    }

    pub fn path(&self) -> &Path {
        self.snapshot.path()
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path().as_os_str().to_os_string();
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    /// Persist the in-memory record.
    pub fn save(&self) -> Result<()> {
        let text = self
            .record
            .to_pretty_json()
            .with_context(|| format!("encode {}", self.path().display()))?;
        write_file(self.path(), &text)
    }

    /// Put the original settings back.
    pub fn restore(self) -> Result<()> {
        self.snapshot.restore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::RegionSettings;

    #[test]
    fn open_writes_backup_and_restore_reverts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("local-project-settings.json");
        let original = "{\n  \"us-east-1\": {}\n}";
        std::fs::write(&path, original).expect("write");

        let mut store = SettingsStore::open(&path).expect("open");
        assert_eq!(std::fs::read_to_string(store.backup_path()).expect("backup"), original);

        store
            .record
            .set_region(
                "us-east-1",
                &RegionSettings {
                    url: Some("us-east-1_index.html".to_string()),
                    ..RegionSettings::default()
                },
            )
            .expect("set region");
        store.save().expect("save");
        assert!(std::fs::read_to_string(&path).expect("read").contains("us-east-1_index.html"));

        store.restore().expect("restore");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), original);
    }

    #[test]
    fn open_rejects_invalid_settings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(SettingsStore::open(&path).is_err());
    }
}
