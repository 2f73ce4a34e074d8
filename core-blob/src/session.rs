//! # File Sessions
//!
//! A session is a named, ordered list of file paths. Downloads tagged with a
//! session name add their stored file to it, and disposing the session
//! deletes every file in one go.
//!
//! Sessions live in a process-scoped [`SessionRegistry`]. Handles opened
//! under the same name share a single list, so a path added through one
//! handle is visible through every other.

use crate::error::{BlobError, Result};
use bridge_traits::FileSystemAccess;
use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, info, warn};

type SharedList = Arc<Mutex<Vec<PathBuf>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Named session lists. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SharedList>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> SessionRegistry {
        static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SessionRegistry::new).clone()
    }

    /// Snapshot of a registered session's paths.
    pub fn get_session(&self, name: &str) -> Option<Vec<PathBuf>> {
        lock(&self.sessions)
            .get(name)
            .map(|list| lock(list).clone())
    }

    /// Replace the paths of a session, registering it if needed.
    ///
    /// Existing handles observe the new contents.
    pub fn set_session(&self, name: &str, paths: Vec<PathBuf>) {
        let mut sessions = lock(&self.sessions);
        match sessions.get(name) {
            Some(list) => *lock(list) = paths,
            None => {
                sessions.insert(name.to_string(), Arc::new(Mutex::new(paths)));
            }
        }
    }

    pub fn remove_session(&self, name: &str) {
        if lock(&self.sessions).remove(name).is_some() {
            debug!(session = name, "Removed session");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.sessions).contains_key(name)
    }

    /// Open a session, registering `initial` only if the name is new.
    pub fn open(&self, name: impl Into<String>, initial: Vec<PathBuf>) -> Session {
        let name = name.into();
        let list = lock(&self.sessions)
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(initial)))
            .clone();

        Session {
            name,
            list,
            registry: self.clone(),
            events: None,
        }
    }

    /// Open a session, starting empty when the name is new.
    pub fn session(&self, name: impl Into<String>) -> Session {
        self.open(name, Vec::new())
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sessions = lock(&self.sessions);
        let mut names: Vec<_> = sessions.keys().collect();
        names.sort();
        f.debug_struct("SessionRegistry")
            .field("sessions", &names)
            .finish()
    }
}

/// Handle to a named session list.
#[derive(Clone)]
pub struct Session {
    name: String,
    list: SharedList,
    registry: SessionRegistry,
    events: Option<EventBus>,
}

impl Session {
    /// Open `name` in the global registry.
    pub fn new(name: impl Into<String>, initial: Vec<PathBuf>) -> Self {
        SessionRegistry::global().open(name, initial)
    }

    /// Publish a `SessionEvent::Disposed` on `events` when disposed.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, path: impl Into<PathBuf>) -> &Self {
        let path = path.into();
        debug!(session = %self.name, path = ?path, "Added path to session");
        lock(&self.list).push(path);
        self
    }

    /// Remove the first occurrence of `path`.
    pub fn remove(&self, path: impl AsRef<Path>) -> &Self {
        let path = path.as_ref();
        let mut list = lock(&self.list);
        if let Some(index) = list.iter().position(|p| p == path) {
            list.remove(index);
        }
        self
    }

    pub fn list(&self) -> Vec<PathBuf> {
        lock(&self.list).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.list).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.list).is_empty()
    }

    /// Delete every file in the session and unregister it.
    ///
    /// Files that are already gone are skipped. The session is unregistered
    /// even when some deletions fail; the first failure is returned.
    pub async fn dispose(&self, fs: &dyn FileSystemAccess) -> Result<usize> {
        let paths = std::mem::take(&mut *lock(&self.list));
        let mut removed = 0;
        let mut failures = Vec::new();

        for path in &paths {
            match fs.delete_file(path).await {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {
                    debug!(session = %self.name, path = ?path, "Session file already gone");
                }
                Err(e) => {
                    warn!(session = %self.name, path = ?path, error = %e, "Failed to delete session file");
                    failures.push((path.clone(), e));
                }
            }
        }

        self.registry.remove_session(&self.name);
        info!(
            session = %self.name,
            removed,
            failed = failures.len(),
            "Disposed session"
        );

        if let Some(events) = &self.events {
            events
                .emit(CoreEvent::Session(SessionEvent::Disposed {
                    name: self.name.clone(),
                    removed,
                    failed: failures.len(),
                }))
                .ok();
        }

        match failures.into_iter().next() {
            None => Ok(removed),
            Some((path, e)) => Err(BlobError::Runtime(format!(
                "Failed to dispose session '{}': {} ({})",
                self.name,
                path.display(),
                e
            ))),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("paths", &self.list())
            .finish()
    }
}
