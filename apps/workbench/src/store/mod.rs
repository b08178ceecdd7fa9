//! Global reactive store.
//!
//! One in-memory [`StoreState`] document shared by every component through a
//! [`StoreHandle`]. Reads hand out immutable `Rc` snapshots; writes go through
//! [`GlobalStore::set_state`] (or a mutator built on it), which replaces the
//! root copy-on-write, snapshots persistent keys to storage and notifies
//! subscribers.
//!
//! The store is single-threaded (`!Send`). Subscribers may call back into the
//! store while being notified: such updates commit immediately and their
//! notifications are queued behind the one in flight.

pub mod activity;
mod mutators;
pub mod persistence;
pub mod state;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::models::{Job, Settings};
use persistence::{KeyValuePersistence, StorageError};
pub use state::{StateKey, StatePatch, StateValidation, StoreState, UiState};

pub type StoreHandle = Rc<GlobalStore>;

/// Source tag of the commit that loads snapshots into a fresh store.
pub const SOURCE_INITIALIZATION: &str = "initialization";
/// Source tag of a forced reload from storage.
pub const SOURCE_STORAGE_LOAD: &str = "storage-load";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not initialized")]
    NotReady,

    #[error("could not write snapshot '{key}': {source}")]
    Storage {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("could not serialize snapshot '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Activity log entries kept before the oldest are evicted.
    pub max_logs: usize,
    /// Nested notification depth beyond which queued notifications are dropped.
    pub max_dispatch_depth: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_logs: 100,
            max_dispatch_depth: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Delivered to subscribers once per committed update.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub source: String,
    pub state: Rc<StoreState>,
    /// `None` for the initialization commit.
    pub previous: Option<Rc<StoreState>>,
    pub changed: Vec<StateKey>,
    pub timestamp: DateTime<Utc>,
}

impl StateChange {
    pub fn touches(&self, key: StateKey) -> bool {
        self.changed.contains(&key)
    }
}

type Callback = Box<dyn Fn(&StateChange)>;
type Filter = Box<dyn Fn(&StateChange) -> bool>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
    filter: Option<Filter>,
}

impl Subscriber {
    fn notify(&self, change: &StateChange) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let wanted = self.filter.as_ref().map_or(true, |filter| filter(change));
            if wanted {
                (self.callback)(change);
            }
        }));
        if outcome.is_err() {
            error!(
                subscription = self.id.0,
                source = %change.source,
                "State subscriber panicked; remaining subscribers still notified"
            );
        }
    }
}

pub struct GlobalStore {
    state: RefCell<Option<Rc<StoreState>>>,
    storage: Option<Rc<dyn KeyValuePersistence>>,
    options: StoreOptions,
    subscribers: RefCell<Vec<Rc<Subscriber>>>,
    next_subscription: Cell<u64>,
    pending: RefCell<VecDeque<(StateChange, usize)>>,
    dispatching: Cell<bool>,
    depth: Cell<usize>,
    in_flight: Cell<usize>,
}

impl GlobalStore {
    /// A store with no snapshot storage. Unready until [`initialize`](Self::initialize).
    pub fn new(options: StoreOptions) -> Self {
        Self {
            state: RefCell::new(None),
            storage: None,
            options,
            subscribers: RefCell::new(Vec::new()),
            next_subscription: Cell::new(1),
            pending: RefCell::new(VecDeque::new()),
            dispatching: Cell::new(false),
            depth: Cell::new(0),
            in_flight: Cell::new(0),
        }
    }

    pub fn with_storage(options: StoreOptions, storage: Rc<dyn KeyValuePersistence>) -> Self {
        Self {
            storage: Some(storage),
            ..Self::new(options)
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_some()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ────────────────────────────────────────────────────────────────────────

    /// Loads snapshots over the default state and commits the result.
    /// Unreadable snapshots are skipped with a warning. Calling it on a ready
    /// store does nothing.
    pub fn initialize(&self) {
        if self.is_ready() {
            debug!("Store already initialized");
            return;
        }
        let mut state = StoreState::default();
        self.load_snapshots(&mut state);
        info!(
            jobs = state.jobs.len(),
            resumes = state.resumes.len(),
            cover_letters = state.cover_letters.len(),
            logs = state.logs.len(),
            "Store initialized"
        );
        self.commit(state, SOURCE_INITIALIZATION, StateKey::ALL.to_vec());
    }

    /// Re-reads every snapshot, keeping the current pointers and UI state.
    pub fn reload_from_storage(&self) {
        let Some(current) = self.get_state() else {
            self.initialize();
            return;
        };
        let mut next = StoreState {
            current_job: current.current_job.clone(),
            current_resume: current.current_resume.clone(),
            ui: current.ui.clone(),
            ..StoreState::default()
        };
        self.load_snapshots(&mut next);
        let changed = StateKey::ALL
            .into_iter()
            .filter(|k| k.snapshot_key().is_some())
            .collect();
        self.commit(next, SOURCE_STORAGE_LOAD, changed);
    }

    fn load_snapshots(&self, state: &mut StoreState) {
        let Some(storage) = self.storage.as_deref() else {
            return;
        };

        if let Some(jobs) = read_snapshot::<JobsSnapshot>(storage, StateKey::Jobs) {
            state.jobs = jobs.into_map();
        }
        if let Some(resumes) = read_snapshot(storage, StateKey::Resumes) {
            state.resumes = resumes;
        }
        if let Some(letters) = read_snapshot(storage, StateKey::CoverLetters) {
            state.cover_letters = letters;
        }
        if let Some(logs) = read_snapshot(storage, StateKey::Logs) {
            state.logs = logs;
            self.enforce_log_cap(state);
        }
        if let Some(settings) = read_snapshot(storage, StateKey::Settings) {
            state.settings = settings;
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Reads
    // ────────────────────────────────────────────────────────────────────────

    /// The whole tree, or `None` before initialization.
    pub fn get_state(&self) -> Option<Rc<StoreState>> {
        self.state.borrow().clone()
    }

    /// Value at a top-level key, optionally followed by dotted segments into
    /// the serialized value (`"settings.preferences.theme"`, `"resumes.0.id"`).
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let state = self.get_state()?;
        let mut segments = path.split('.');
        let key = StateKey::from_path_segment(segments.next()?)?;
        let root = match key {
            StateKey::Jobs => serde_json::to_value(&state.jobs),
            StateKey::Resumes => serde_json::to_value(&state.resumes),
            StateKey::CurrentJob => serde_json::to_value(&state.current_job),
            StateKey::CurrentResume => serde_json::to_value(&state.current_resume),
            StateKey::CoverLetters => serde_json::to_value(&state.cover_letters),
            StateKey::Logs => serde_json::to_value(&state.logs),
            StateKey::Settings => serde_json::to_value(&state.settings),
            StateKey::Ui => serde_json::to_value(&state.ui),
        }
        .ok()?;

        segments.try_fold(root, |value, segment| match value {
            Value::Object(mut map) => map.remove(segment),
            Value::Array(mut items) => segment
                .parse::<usize>()
                .ok()
                .filter(|i| *i < items.len())
                .map(|i| items.swap_remove(i)),
            _ => None,
        })
    }

    pub fn validate_state(&self) -> Option<StateValidation> {
        self.get_state()
            .map(|state| state.validate(self.options.max_logs))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Writes
    // ────────────────────────────────────────────────────────────────────────

    /// Shallow-merges `patch` into the current state under `source`.
    ///
    /// Persistent keys are snapshotted before the new state is committed; a
    /// failed write returns the error and leaves the previous state in place.
    /// On an unready store the update is dropped with a warning.
    pub fn set_state(&self, patch: StatePatch, source: &str) -> Result<(), StoreError> {
        let Some(current) = self.get_state() else {
            warn!(source, "Store not initialized; update ignored");
            return Ok(());
        };
        let changed = patch.changed_keys();
        if changed.is_empty() {
            debug!(source, "Empty state patch ignored");
            return Ok(());
        }

        let mut next = (*current).clone();
        patch.apply_to(&mut next);
        self.enforce_log_cap(&mut next);

        if source != SOURCE_INITIALIZATION && source != SOURCE_STORAGE_LOAD {
            self.write_snapshots(&next, &changed)?;
        }

        debug!(source, changed = ?changed, "State updated");
        self.commit(next, source, changed);
        Ok(())
    }

    fn enforce_log_cap(&self, state: &mut StoreState) {
        let excess = state.logs.len().saturating_sub(self.options.max_logs);
        if excess > 0 {
            state.logs.drain(..excess);
        }
    }

    fn write_snapshots(&self, next: &StoreState, changed: &[StateKey]) -> Result<(), StoreError> {
        let Some(storage) = self.storage.as_deref() else {
            return Ok(());
        };

        for key in changed {
            let Some(storage_key) = key.snapshot_key() else {
                continue;
            };
            if *key == StateKey::Settings
                && next.settings.is_blank()
                && persisted_settings_configured(storage)
            {
                warn!("Refusing to overwrite configured settings with blank settings");
                continue;
            }

            let json = match key {
                StateKey::Jobs => serde_json::to_string(&next.jobs),
                StateKey::Resumes => serde_json::to_string(&next.resumes),
                StateKey::CoverLetters => serde_json::to_string(&next.cover_letters),
                StateKey::Logs => serde_json::to_string(&next.logs),
                StateKey::Settings => serde_json::to_string(&next.settings),
                _ => continue,
            }
            .map_err(|source| StoreError::Serialize {
                key: storage_key.to_string(),
                source,
            })?;

            storage
                .set_item(storage_key, &json)
                .map_err(|source| StoreError::Storage {
                    key: storage_key.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    fn commit(&self, next: StoreState, source: &str, changed: Vec<StateKey>) {
        let next = Rc::new(next);
        let previous = self.state.replace(Some(Rc::clone(&next)));
        self.dispatch(StateChange {
            source: source.to_string(),
            state: next,
            previous,
            changed,
            timestamp: Utc::now(),
        });
    }

    // ────────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ────────────────────────────────────────────────────────────────────────

    pub fn subscribe(&self, callback: impl Fn(&StateChange) + 'static) -> SubscriptionId {
        self.add_subscriber(Box::new(callback), None)
    }

    /// Like [`subscribe`](Self::subscribe), but `callback` only runs for
    /// changes `filter` accepts.
    pub fn subscribe_filtered(
        &self,
        callback: impl Fn(&StateChange) + 'static,
        filter: impl Fn(&StateChange) -> bool + 'static,
    ) -> SubscriptionId {
        self.add_subscriber(Box::new(callback), Some(Box::new(filter)))
    }

    fn add_subscriber(&self, callback: Callback, filter: Option<Filter>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        self.subscribers.borrow_mut().push(Rc::new(Subscriber {
            id,
            callback,
            filter,
        }));
        id
    }

    /// Removes a subscription. Unknown or already-removed ids are ignored.
    /// Returns whether anything was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    fn dispatch(&self, change: StateChange) {
        let depth = if self.dispatching.get() {
            self.depth.get() + 1
        } else {
            0
        };
        if depth > self.options.max_dispatch_depth {
            warn!(
                source = %change.source,
                depth,
                "Notification depth limit reached; dropping notification"
            );
            return;
        }

        self.pending.borrow_mut().push_back((change, depth));
        if self.dispatching.get() {
            return;
        }

        self.dispatching.set(true);
        while let Some((change, depth)) = self.next_pending() {
            self.depth.set(depth);
            let subscribers: Vec<Rc<Subscriber>> = self.subscribers.borrow().clone();
            for subscriber in &subscribers {
                subscriber.notify(&change);
            }
        }
        self.depth.set(0);
        self.dispatching.set(false);
    }

    fn next_pending(&self) -> Option<(StateChange, usize)> {
        self.pending.borrow_mut().pop_front()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshot decoding
// ────────────────────────────────────────────────────────────────────────────

/// Jobs were stored as an id map; older snapshots hold a plain list.
#[derive(Deserialize)]
#[serde(untagged)]
enum JobsSnapshot {
    Map(BTreeMap<String, Job>),
    List(Vec<Job>),
}

impl JobsSnapshot {
    fn into_map(self) -> BTreeMap<String, Job> {
        match self {
            JobsSnapshot::Map(map) => map,
            JobsSnapshot::List(jobs) => jobs.into_iter().map(|j| (j.id.clone(), j)).collect(),
        }
    }
}

fn read_snapshot<T: DeserializeOwned>(storage: &dyn KeyValuePersistence, key: StateKey) -> Option<T> {
    let storage_key = key.snapshot_key()?;
    match storage.get_item(storage_key) {
        Ok(Some(text)) => match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = storage_key, "Ignoring unreadable snapshot: {}", e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(key = storage_key, "Could not read snapshot: {}", e);
            None
        }
    }
}

fn persisted_settings_configured(storage: &dyn KeyValuePersistence) -> bool {
    read_snapshot::<Settings>(storage, StateKey::Settings).is_some_and(|s| !s.is_blank())
}
