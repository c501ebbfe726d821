use crate::amount::Amount;
use crate::error::{AppError, Result};
use crate::ledger::{decode_slot, ensure_recordable, MigrationLedger, MIGRATED_AMOUNT_KEY};
use std::sync::Arc;
use tauri::{AppHandle, Runtime};
use tauri_plugin_store::{Store, StoreExt};

const STORE_FILE: &str = "migration.json";

/// Migration slot kept in the app's tauri-plugin-store file, saved to disk
/// after every write.
pub struct StoreMigrationLedger<R: Runtime> {
    store: Arc<Store<R>>,
}

impl<R: Runtime> StoreMigrationLedger<R> {
    pub fn open(app: &AppHandle<R>) -> Result<Self> {
        let store = app
            .store(STORE_FILE)
            .map_err(|e| AppError::Internal(format!("Failed to open {STORE_FILE}: {e}")))?;
        Ok(Self { store })
    }

    fn save(&self) -> Result<()> {
        self.store
            .save()
            .map_err(|e| AppError::Internal(format!("Failed to save {STORE_FILE}: {e}")))
    }
}

impl<R: Runtime> MigrationLedger for StoreMigrationLedger<R> {
    fn set(&self, amount: Amount) -> Result<()> {
        ensure_recordable(amount)?;
        self.store.set(MIGRATED_AMOUNT_KEY, amount.to_string());
        self.save()
    }

    fn get(&self) -> Result<Option<Amount>> {
        self.store
            .get(MIGRATED_AMOUNT_KEY)
            .map(|value| decode_slot(&value))
            .transpose()
    }

    fn clear(&self) -> Result<()> {
        if self.store.delete(MIGRATED_AMOUNT_KEY) {
            self.save()?;
        }
        Ok(())
    }
}
