use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use chrono_tz::Tz;
use makeup_core::{MemoryWaitlistStore, StaticCalendar, WaitlistEntry};

/// One org's snapshot: timezone, calendar facts, and the waitlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgFixture {
    pub org_id: String,
    pub timezone: String,
    #[serde(default)]
    pub calendar: StaticCalendar,
    #[serde(default)]
    pub entries: Vec<WaitlistEntry>,
}

impl OrgFixture {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid timezone: {}", self.timezone))
    }

    pub fn store(&self) -> MemoryWaitlistStore {
        MemoryWaitlistStore::with_entries(self.entries.clone())
    }
}

pub fn load_fixture(path: &Path) -> Result<OrgFixture> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(serde_json::from_str(&s)?)
}

pub fn write_fixture(path: &Path, fixture: &OrgFixture) -> Result<()> {
    let json = serde_json::to_string_pretty(fixture)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
