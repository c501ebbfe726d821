use super::MigrationState;
use crate::client::ContractAddress;
use crate::error::AppError;
use crate::workflow::events::MigrationView;
use crate::workflow::TransitionOutcome;
use tauri::State;

/// Last published view, without touching the chain
#[tauri::command]
pub async fn migration_status(state: State<'_, MigrationState>) -> Result<MigrationView, AppError> {
    Ok(state.workflow()?.view())
}

/// Re-read the ledger and both balances
#[tauri::command]
pub async fn migration_refresh(
    state: State<'_, MigrationState>,
) -> Result<MigrationView, AppError> {
    state.workflow()?.refresh().await
}

#[tauri::command]
pub async fn migration_withdraw(
    state: State<'_, MigrationState>,
) -> Result<TransitionOutcome, AppError> {
    Ok(state.workflow()?.withdraw().await)
}

#[tauri::command]
pub async fn migration_deposit(
    state: State<'_, MigrationState>,
) -> Result<TransitionOutcome, AppError> {
    Ok(state.workflow()?.deposit().await)
}

/// Claim rewards from either pool
#[tauri::command]
pub async fn migration_claim(
    contract: ContractAddress,
    state: State<'_, MigrationState>,
) -> Result<TransitionOutcome, AppError> {
    Ok(state.workflow()?.claim(&contract).await)
}

/// Create a viewing key for `contract` through the wallet
#[tauri::command]
pub async fn migration_unlock(
    contract: ContractAddress,
    state: State<'_, MigrationState>,
) -> Result<MigrationView, AppError> {
    state.workflow()?.unlock(&contract).await
}

/// Active governance proposal count, `None` when the frontend could not fetch it
#[tauri::command]
pub fn migration_set_active_proposals(
    count: Option<u64>,
    state: State<'_, MigrationState>,
) -> Result<(), AppError> {
    state.set_active_proposals(count);
    Ok(())
}
