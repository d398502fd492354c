//! Process-wide table of commands contributed by host scopes while they are active.

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
};

use shared::{ActionId, ScopeId};
use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::lock::lock_or_recover;

pub type ActionFn = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// A titled command. Identity is the id assigned at construction; clones share it.
#[derive(Clone)]
pub struct ActionDescriptor {
    id: ActionId,
    title: String,
    description: Option<String>,
    action: ActionFn,
}

impl ActionDescriptor {
    pub fn new<F>(title: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            id: ActionId::new(),
            title: title.into(),
            description: None,
            action: Arc::new(action),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Runs the action. Returned errors and panics both come back as `ActionFailure`.
    pub fn invoke(&self) -> Result<(), ActionFailure> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.action)())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(ActionFailure::Failed {
                title: self.title.clone(),
                message: format!("{error:#}"),
            }),
            Err(payload) => Err(ActionFailure::Panicked {
                title: self.title.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ActionDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActionDescriptor {}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug, Error)]
pub enum ActionFailure {
    #[error("action '{title}' failed: {message}")]
    Failed { title: String, message: String },
    #[error("action '{title}' panicked: {message}")]
    Panicked { title: String, message: String },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("scope '{0}' is terminated")]
    ScopeTerminated(ScopeId),
    #[error("no active action with id {0}")]
    UnknownAction(ActionId),
    #[error(transparent)]
    Action(#[from] ActionFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeState {
    Inactive,
    Active,
    Terminated,
}

#[derive(Default)]
struct ScopeEntry {
    terminated: bool,
    active: bool,
    contributed: Vec<ActionId>,
}

impl ScopeEntry {
    fn state(&self) -> ScopeState {
        if self.terminated {
            ScopeState::Terminated
        } else if self.active {
            ScopeState::Active
        } else {
            ScopeState::Inactive
        }
    }
}

#[derive(Default)]
struct RegistryState {
    active: Vec<ActionDescriptor>,
    scopes: HashMap<ScopeId, ScopeEntry>,
}

impl RegistryState {
    fn held_elsewhere(&self, id: ActionId, scope: &ScopeId) -> bool {
        self.scopes
            .iter()
            .any(|(other, entry)| other != scope && entry.active && entry.contributed.contains(&id))
    }

    fn withdraw(&mut self, scope: &ScopeId, ids: &[ActionId]) -> usize {
        let orphaned: Vec<ActionId> = ids
            .iter()
            .copied()
            .filter(|id| !self.held_elsewhere(*id, scope))
            .collect();
        let before = self.active.len();
        self.active
            .retain(|descriptor| !orphaned.contains(&descriptor.id));
        before - self.active.len()
    }
}

/// Union of the actions contributed by every currently active scope.
///
/// Scopes move `Inactive -> Active -> Inactive` any number of times and end in
/// `Terminated`. Removing something that is not present is a no-op, so cleanup paths may
/// race explicit deactivation freely. Lifecycle transitions for one scope are expected to
/// be serialized by the caller; different scopes may call in concurrently.
pub struct ScopedActionRegistry {
    state: Mutex<RegistryState>,
    published: watch::Sender<Vec<ActionDescriptor>>,
}

impl Default for ScopedActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopedActionRegistry {
    pub fn new() -> Self {
        let (published, _) = watch::channel(Vec::new());
        Self {
            state: Mutex::new(RegistryState::default()),
            published,
        }
    }

    /// Makes `descriptors` the scope's contribution. Activating an already active scope
    /// replaces its previous set without duplicating anything.
    pub fn activate(
        &self,
        scope: &ScopeId,
        descriptors: impl IntoIterator<Item = ActionDescriptor>,
    ) -> Result<(), RegistryError> {
        let mut incoming: Vec<ActionDescriptor> = Vec::new();
        for descriptor in descriptors {
            if !incoming.iter().any(|existing| existing.id == descriptor.id) {
                incoming.push(descriptor);
            }
        }

        let mut state = lock_or_recover(&self.state, "action registry activate");
        let previous = match state.scopes.get(scope) {
            Some(entry) if entry.terminated => {
                return Err(RegistryError::ScopeTerminated(scope.clone()));
            }
            Some(entry) if entry.active => entry.contributed.clone(),
            _ => Vec::new(),
        };

        let ids: Vec<ActionId> = incoming.iter().map(ActionDescriptor::id).collect();
        let dropped: Vec<ActionId> = previous
            .into_iter()
            .filter(|id| !ids.contains(id))
            .collect();
        state.withdraw(scope, &dropped);

        for descriptor in incoming {
            if !state.active.iter().any(|existing| existing.id == descriptor.id) {
                state.active.push(descriptor);
            }
        }
        let entry = state.scopes.entry(scope.clone()).or_default();
        entry.active = true;
        entry.contributed = ids;
        debug!(%scope, actions = entry.contributed.len(), "scope activated");

        self.publish(&state);
        Ok(())
    }

    /// Withdraws the scope's contribution. Unknown, inactive or terminated scopes are left
    /// as they are.
    pub fn deactivate(&self, scope: &ScopeId) {
        let mut state = lock_or_recover(&self.state, "action registry deactivate");
        let contributed = match state.scopes.get_mut(scope) {
            Some(entry) if entry.active => {
                entry.active = false;
                std::mem::take(&mut entry.contributed)
            }
            _ => return,
        };
        let removed = state.withdraw(scope, &contributed);
        debug!(%scope, removed, "scope deactivated");
        self.publish(&state);
    }

    /// Withdraws the scope's contribution, if any, and marks the scope terminated so it
    /// can never contribute again. The marker lives as long as the registry; scopes with a
    /// per-instance id should use [`release`](Self::release) instead.
    pub fn terminate(&self, scope: &ScopeId) {
        let mut state = lock_or_recover(&self.state, "action registry terminate");
        let entry = state.scopes.entry(scope.clone()).or_default();
        if entry.terminated {
            return;
        }
        let was_active = entry.active;
        entry.terminated = true;
        entry.active = false;
        let contributed = std::mem::take(&mut entry.contributed);
        let removed = state.withdraw(scope, &contributed);
        debug!(%scope, removed, "scope terminated");
        if was_active {
            self.publish(&state);
        }
    }

    /// Withdraws the scope's contribution and forgets the scope entirely. Only the owner of
    /// a unique scope id may call this, since nothing stops the id from activating again.
    pub fn release(&self, scope: &ScopeId) {
        let mut state = lock_or_recover(&self.state, "action registry release");
        let Some(entry) = state.scopes.remove(scope) else {
            return;
        };
        let removed = state.withdraw(scope, &entry.contributed);
        debug!(%scope, removed, "scope released");
        if entry.active {
            self.publish(&state);
        }
    }

    /// Drops every dynamic action. Scopes that were active become inactive.
    pub fn clear(&self) {
        let mut state = lock_or_recover(&self.state, "action registry clear");
        state.active.clear();
        for entry in state.scopes.values_mut() {
            entry.active = false;
            entry.contributed.clear();
        }
        self.publish(&state);
    }

    pub fn scope_state(&self, scope: &ScopeId) -> ScopeState {
        lock_or_recover(&self.state, "action registry scope state")
            .scopes
            .get(scope)
            .map_or(ScopeState::Inactive, ScopeEntry::state)
    }

    /// Active actions in first-contribution order.
    pub fn list_active(&self) -> Vec<ActionDescriptor> {
        lock_or_recover(&self.state, "action registry list")
            .active
            .clone()
    }

    /// Number of scopes the registry holds bookkeeping for, terminated markers included.
    pub fn tracked_scopes(&self) -> usize {
        lock_or_recover(&self.state, "action registry tracked scopes")
            .scopes
            .len()
    }

    pub fn subscribe_active(&self) -> watch::Receiver<Vec<ActionDescriptor>> {
        self.published.subscribe()
    }

    /// The current list followed by every later change.
    pub fn watch_active(&self) -> WatchStream<Vec<ActionDescriptor>> {
        WatchStream::new(self.published.subscribe())
    }

    /// Runs an active action outside the registry lock, so the action may itself
    /// activate or deactivate scopes.
    pub fn invoke(&self, id: ActionId) -> Result<(), RegistryError> {
        let descriptor = lock_or_recover(&self.state, "action registry invoke")
            .active
            .iter()
            .find(|descriptor| descriptor.id == id)
            .cloned()
            .ok_or(RegistryError::UnknownAction(id))?;

        descriptor.invoke().map_err(|failure| {
            warn!(action = %descriptor.title, error = %failure, "debug action failed");
            RegistryError::from(failure)
        })
    }

    fn publish(&self, state: &RegistryState) {
        self.published.send_replace(state.active.clone());
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
