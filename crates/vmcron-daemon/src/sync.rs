use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};
use vmcron_core::types::NewResource;
use vmcron_proxmox::ProxmoxClient;
use vmcron_scheduler::{SqliteStore, UpsertOutcome};

/// Counters from one inventory pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub total: usize,
    pub added: usize,
    pub updated: usize,
    pub errors: usize,
}

/// Pull every guest from the cluster into the local `vms` cache.
///
/// Guests are matched by vmid. Entries that disappeared from the cluster are
/// left in place so schedules and group memberships referring to them survive.
pub async fn sync_inventory(client: &ProxmoxClient, store: &SqliteStore) -> anyhow::Result<SyncStats> {
    info!("starting inventory sync");
    let guests = client.list_resources().await?;
    let stats = apply_inventory(store, &guests);
    info!(
        total = stats.total,
        added = stats.added,
        updated = stats.updated,
        errors = stats.errors,
        "inventory sync complete"
    );
    Ok(stats)
}

/// Upsert `guests` one by one; a failing row is counted and skipped.
pub fn apply_inventory(store: &SqliteStore, guests: &[NewResource]) -> SyncStats {
    let mut stats = SyncStats {
        total: guests.len(),
        ..Default::default()
    };
    for guest in guests {
        match store.upsert_resource(guest) {
            Ok(UpsertOutcome::Added(_)) => stats.added += 1,
            Ok(UpsertOutcome::Updated(_)) => stats.updated += 1,
            Err(e) => {
                error!(vmid = guest.vmid, error = %e, "failed to sync guest");
                stats.errors += 1;
            }
        }
    }
    stats
}

/// Background refresh every `interval` until `shutdown` flips to true.
pub async fn run_sync_loop(
    client: Arc<ProxmoxClient>,
    store: Arc<SqliteStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "inventory sync loop started");
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sync_inventory(&client, &store).await {
                    error!(error = %e, "inventory sync failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("inventory sync loop shutting down");
                    break;
                }
            }
        }
    }
}
