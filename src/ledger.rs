//! Durable single-slot record of funds that left the old pool but have not
//! reached the new one yet.

use crate::amount::{parse_amount, Amount};
use crate::error::{AppError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Well-known key of the slot; the value is the decimal string of the amount.
pub const MIGRATED_AMOUNT_KEY: &str = "___sw_migrated_amount";

/// Single slot, not a log: `set` overwrites. Absence is distinct from zero.
/// Writers are serialized by the workflow, implementations do no locking.
pub trait MigrationLedger: Send + Sync {
    fn set(&self, amount: Amount) -> Result<()>;
    fn get(&self) -> Result<Option<Amount>>;
    fn clear(&self) -> Result<()>;
}

/// Decode a stored slot value. Anything but a decimal string is corruption.
pub fn decode_slot(value: &Value) -> Result<Amount> {
    match value {
        Value::String(s) => parse_amount(s),
        other => Err(AppError::InvalidAmount(format!(
            "{MIGRATED_AMOUNT_KEY} holds {other}, expected a decimal string"
        ))),
    }
}

pub(crate) fn ensure_recordable(amount: Amount) -> Result<()> {
    if amount == 0 {
        return Err(AppError::InvalidAmount(
            "refusing to record a zero pending migration".into(),
        ));
    }
    Ok(())
}

/// JSON key-value file, e.g. `~/.local/share/sefi-migration/state.json`.
/// Writes go to a sibling temp file that is renamed over the original.
pub struct FileMigrationLedger {
    path: PathBuf,
}

impl FileMigrationLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the platform data directory
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::data_dir()
            .ok_or_else(|| AppError::Internal("No data dir".into()))?
            .join("sefi-migration")
            .join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(map)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl MigrationLedger for FileMigrationLedger {
    fn set(&self, amount: Amount) -> Result<()> {
        ensure_recordable(amount)?;
        let mut map = self.read_map()?;
        map.insert(
            MIGRATED_AMOUNT_KEY.to_string(),
            Value::String(amount.to_string()),
        );
        self.write_map(&map)?;
        tracing::info!("Recorded pending migration of {amount} in {}", self.path.display());
        Ok(())
    }

    fn get(&self) -> Result<Option<Amount>> {
        self.read_map()?
            .get(MIGRATED_AMOUNT_KEY)
            .map(decode_slot)
            .transpose()
    }

    fn clear(&self) -> Result<()> {
        let mut map = self.read_map()?;
        if map.remove(MIGRATED_AMOUNT_KEY).is_some() {
            self.write_map(&map)?;
            tracing::info!("Cleared pending migration in {}", self.path.display());
        }
        Ok(())
    }
}
