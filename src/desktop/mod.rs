//! Tauri plugin exposing the migration workflow to the webview.
//!
//! Register it next to the store plugin:
//!
//! ```ignore
//! tauri::Builder::default()
//!     .plugin(tauri_plugin_store::Builder::new().build())
//!     .plugin(sefi_migration_lib::desktop::init())
//! ```

pub mod commands;
mod store;

use crate::client::WalletClient;
use crate::config::MigrationConfig;
use crate::error::AppError;
use crate::fee::FeeTracker;
use crate::gateway::GatewayClient;
use crate::ledger::{FileMigrationLedger, MigrationLedger};
use crate::registry::{spawn_registry_polling, HttpPoolRegistry, PoolRegistry};
use crate::workflow::events::MigrationEvent;
use crate::workflow::{MigrationDeps, MigrationWorkflow};
use std::sync::Arc;
use store::StoreMigrationLedger;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter, Manager, Runtime};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, OnceCell};

pub const STATE_EVENT: &str = "migration://state";
pub const NOTIFICATION_EVENT: &str = "migration://notification";

/// Managed plugin state. The workflow appears once the background bootstrap
/// has looked up the account.
pub struct MigrationState {
    config: MigrationConfig,
    workflow: OnceCell<Arc<MigrationWorkflow>>,
    proposals: watch::Sender<Option<u64>>,
}

impl MigrationState {
    fn new(config: MigrationConfig) -> Self {
        let (proposals, _) = watch::channel(None);
        Self {
            config,
            workflow: OnceCell::new(),
            proposals,
        }
    }

    pub fn workflow(&self) -> Result<Arc<MigrationWorkflow>, AppError> {
        self.workflow
            .get()
            .cloned()
            .ok_or_else(|| AppError::DependencyNotReady("migration is still starting".into()))
    }

    pub fn set_active_proposals(&self, count: Option<u64>) {
        self.proposals.send_replace(count);
    }
}

pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("migration")
        .invoke_handler(tauri::generate_handler![
            commands::migration_status,
            commands::migration_refresh,
            commands::migration_withdraw,
            commands::migration_deposit,
            commands::migration_claim,
            commands::migration_unlock,
            commands::migration_set_active_proposals,
        ])
        .setup(|app, _api| {
            crate::init_tracing();
            let config = MigrationConfig::from_env()?;
            app.manage(MigrationState::new(config));

            let handle = app.clone();
            tauri::async_runtime::spawn(async move {
                if let Err(e) = bootstrap(handle).await {
                    tracing::error!("Migration bootstrap failed: {e}");
                }
            });
            Ok(())
        })
        .build()
}

async fn bootstrap<R: Runtime>(app: AppHandle<R>) -> Result<(), AppError> {
    let state = app.state::<MigrationState>();
    let config = state.config.clone();

    let gateway = Arc::new(GatewayClient::new(&config.gateway_url));
    let registry: Arc<dyn PoolRegistry> =
        Arc::new(HttpPoolRegistry::new(config.rewards_api_url.clone()));
    let ledger: Arc<dyn MigrationLedger> = match &config.ledger_path {
        Some(path) => Arc::new(FileMigrationLedger::new(path.clone())),
        None => Arc::new(StoreMigrationLedger::open(&app)?),
    };
    let fees = Arc::new(FeeTracker::new(config.fee_estimator()));
    fees.clone().track(state.proposals.subscribe());

    let account = gateway.account(&config.chain_id).await?;
    tracing::info!("Migration account: {account}");

    let workflow = Arc::new(MigrationWorkflow::new(
        MigrationDeps {
            registry: registry.clone(),
            ledger,
            client: gateway.clone(),
            wallet: gateway,
            fees,
        },
        config.clone(),
        account,
    ));
    forward_events(app.clone(), workflow.subscribe());
    state
        .workflow
        .set(workflow.clone())
        .map_err(|_| AppError::Internal("migration workflow initialized twice".into()))?;

    if let Err(e) = workflow.mount().await {
        tracing::warn!("Initial migration refresh failed: {e}");
    }
    spawn_registry_polling(registry, config.registry_poll_interval());
    Ok(())
}

fn forward_events<R: Runtime>(app: AppHandle<R>, mut events: broadcast::Receiver<MigrationEvent>) {
    tauri::async_runtime::spawn(async move {
        loop {
            let emitted = match events.recv().await {
                Ok(MigrationEvent::StateChanged(view)) => app.emit(STATE_EVENT, &view),
                Ok(MigrationEvent::Notification(notification)) => {
                    app.emit(NOTIFICATION_EVENT, &notification)
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {skipped} migration events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if let Err(e) = emitted {
                tracing::error!("Failed to emit migration event: {e}");
            }
        }
    });
}
