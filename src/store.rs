use crate::{
    error::LotteryError,
    port::LedgerPort,
    provider::Eip1193Provider,
    snapshot::{
        self,
        StateSnapshot,
    },
};
use std::sync::{
    Mutex,
    MutexGuard,
    PoisonError,
    atomic::{
        AtomicBool,
        AtomicU64,
        Ordering,
    },
};
use tokio::sync::watch;
use tracing::{
    debug,
    error,
    info,
};

pub const MAX_ERRORS: usize = 50;

/// Status line plus the most recent errors, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notices {
    pub status: String,
    pub errors: Vec<String>,
}

impl Notices {
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.errors.clear();
    }

    pub fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }
}

/// Holds the current snapshot for the whole session.
///
/// Readers get clones or a `watch` subscription; only the crate mutates the snapshot, and
/// `refresh()` is the only way chain data gets in.
pub struct SessionStore<P> {
    port: Option<LedgerPort<P>>,
    state: watch::Sender<StateSnapshot>,
    dirty: AtomicBool,
    /// Generation handed to the most recently started refresh.
    started: AtomicU64,
    /// Generation of the refresh whose outcome is currently shown.
    committed: AtomicU64,
    notices: Mutex<Notices>,
}

impl<P> SessionStore<P> {
    pub fn new(port: Option<LedgerPort<P>>) -> Self {
        let (state, _) = watch::channel(StateSnapshot::default());
        Self {
            port,
            state,
            // nothing has been read yet
            dirty: AtomicBool::new(true),
            started: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            notices: Mutex::new(Notices {
                status: String::from("Ready"),
                errors: Vec::new(),
            }),
        }
    }

    pub fn port(&self) -> Option<&LedgerPort<P>> {
        self.port.as_ref()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.state.subscribe()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn notices(&self) -> Notices {
        self.lock_notices().clone()
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        info!(%status, "status");
        self.lock_notices().set_status(status);
    }

    pub fn report_error(&self, err: &LotteryError) {
        self.lock_notices().push_errors(vec![err.to_string()]);
    }

    /// The single mutation entry point. Subscribers observe the result as one value.
    pub(crate) fn update(&self, f: impl FnOnce(&mut StateSnapshot)) {
        self.state.send_modify(f);
    }

    fn lock_notices(&self) -> MutexGuard<'_, Notices> {
        self.notices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: Eip1193Provider> SessionStore<P> {
    /// Rebuilds the snapshot from the ledger and replaces it wholesale. Only the busy flag and
    /// load message survive, they belong to the orchestrator.
    ///
    /// Overlapping refreshes commit in start order: an outcome that finishes after a newer
    /// refresh already committed is dropped, errors included.
    pub async fn refresh(&self) {
        self.dirty.store(false, Ordering::SeqCst);
        let generation = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = snapshot::build(self.port.as_ref()).await;
        let newest = self.committed.fetch_max(generation, Ordering::SeqCst);
        if newest > generation {
            debug!(generation, newest, "dropping stale refresh");
            return;
        }
        let mut fresh = outcome.snapshot;
        self.update(|current| {
            fresh.busy = current.busy;
            fresh.load_message = std::mem::take(&mut current.load_message);
            *current = fresh;
        });
        let errors: Vec<String> = outcome.errors.iter().map(ToString::to_string).collect();
        self.lock_notices().push_errors(errors);
    }

    /// Returns whether a refresh happened.
    pub async fn refresh_if_dirty(&self) -> bool {
        if !self.is_dirty() {
            return false;
        }
        self.refresh().await;
        true
    }
}
