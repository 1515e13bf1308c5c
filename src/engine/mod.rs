mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{free_windows, merge_overlapping, subtract_windows};
pub use conflict::{find_conflict, overlaps};
pub use error::EngineError;
pub use store::{apply_event, BookingLedger, InMemoryStore, ResourceCatalog, Store};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::policy::{self, Action};
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush what we have before handling the non-append command.
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for batch of {}: {e}", batch.len());
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine: sole writer of the booking ledger.
///
/// Mutations touching one resource run inside that resource's write scope,
/// so the conflict check and the ledger write see the same state. Reads go
/// straight to the store and never wait on writers.
pub struct Engine {
    store: Arc<dyn Store>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Resource id → mutex serializing mutations of that resource.
    write_scopes: DashMap<Ulid, Arc<Mutex<()>>>,
    /// Held shared by every commit, exclusively by compaction.
    commit_gate: RwLock<()>,
    /// Serializes resource creation so the catalog cap holds.
    catalog_scope: Mutex<()>,
    max_resources: usize,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        Self::with_store(wal_path, Arc::new(InMemoryStore::new()))
    }

    /// Replay the WAL at `wal_path` into `store` and start the WAL writer.
    /// Must be called inside a tokio runtime.
    pub fn with_store(wal_path: PathBuf, store: Arc<dyn Store>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        for event in &events {
            apply_event(store.as_ref(), event);
        }
        info!("replayed {} WAL events from {}", events.len(), wal_path.display());

        Ok(Self {
            store,
            wal_tx,
            write_scopes: DashMap::new(),
            commit_gate: RwLock::new(()),
            catalog_scope: Mutex::new(()),
            max_resources: crate::limits::MAX_RESOURCES,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_max_resources(mut self, max: usize) -> Self {
        self.max_resources = max;
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append, then apply to the store. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(&self, event: &Event) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        self.wal_append(event).await?;
        apply_event(self.store.as_ref(), event);
        Ok(())
    }

    /// The mutex serializing mutations of `resource_id`.
    pub(super) fn write_scope(&self, resource_id: Ulid) -> Arc<Mutex<()>> {
        self.write_scopes
            .entry(resource_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(super) fn drop_write_scope(&self, resource_id: &Ulid) {
        self.write_scopes.remove(resource_id);
    }

    /// Access-policy gate in front of every mutation.
    pub(super) fn authorize(
        &self,
        principal: &Principal,
        action: Action,
        is_owner: bool,
    ) -> Result<(), EngineError> {
        if policy::can_perform(principal.role, action, is_owner) {
            return Ok(());
        }
        metrics::counter!(
            crate::observability::POLICY_DENIALS_TOTAL,
            "action" => action.as_str()
        )
        .increment(1);
        tracing::debug!("denied {action} to {} ({})", principal.id, principal.role);
        Err(EngineError::Forbidden {
            role: principal.role,
            action,
        })
    }
}

/// Whether `principal` may see `booking` at all.
pub(crate) fn visible_to(principal: &Principal, booking: &Booking) -> bool {
    policy::can_perform(principal.role, Action::ViewAllBookings, false)
        || policy::can_perform(
            principal.role,
            Action::ViewOwnBookings,
            booking.requester_id == principal.id,
        )
}
