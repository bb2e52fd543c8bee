//! Local record of the last image each target verified healthy on.
//!
//! Optional: without a ledger file the known-good reference of a
//! target only lives for one invocation.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::DeployResult;
use crate::target::ImageRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub image: ImageRef,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    services: BTreeMap<String, LedgerEntry>,
}

#[derive(Debug, Default)]
pub struct KnownGoodLedger {
    path: Option<PathBuf>,
    entries: BTreeMap<String, LedgerEntry>,
}

impl KnownGoodLedger {
    /// A ledger that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the ledger at `path`. A missing file is an empty ledger.
    pub fn load(path: &Path) -> DeployResult<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<LedgerFile>(&content)?.services
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries,
        })
    }

    #[must_use]
    pub fn get(&self, target: &str) -> Option<&ImageRef> {
        self.entries.get(target).map(|e| &e.image)
    }

    #[must_use]
    pub fn entry(&self, target: &str) -> Option<&LedgerEntry> {
        self.entries.get(target)
    }

    /// Record `image` as verified for `target` and persist.
    pub fn record(&mut self, target: &str, image: ImageRef) -> DeployResult<()> {
        self.entries.insert(
            target.to_string(),
            LedgerEntry {
                image,
                verified_at: Utc::now(),
            },
        );
        self.save()
    }

    fn save(&self) -> DeployResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                parent
            }
            None => Path::new("."),
        };

        let file = LedgerFile {
            services: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        // Write to a uniquely named sibling, then rename over the
        // ledger so a crash never leaves a torn file.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
