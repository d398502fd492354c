use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::{Stream, StreamExt};
use shared::ScopeId;
use tracing::warn;

use crate::registry::{ActionDescriptor, RegistryError, ScopeState, ScopedActionRegistry};

/// Transitions a host scope reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleSignal {
    Resume,
    Pause,
    Destroy,
}

/// Ties a fixed set of actions to one scope instance: resume contributes them, pause
/// withdraws them, destroy withdraws them for good. Dropping the binding terminates the
/// scope, so a missed destroy signal cannot leave actions behind.
///
/// Every binding gets its own [`ScopeId::unique`] id, so a screen recreated under the same
/// label starts fresh. Termination is tracked here and the registry entry is released.
pub struct ScopeBinding {
    registry: Arc<ScopedActionRegistry>,
    scope: ScopeId,
    actions: Vec<ActionDescriptor>,
    terminated: AtomicBool,
}

impl ScopeBinding {
    pub fn new(
        registry: Arc<ScopedActionRegistry>,
        label: &str,
        actions: impl IntoIterator<Item = ActionDescriptor>,
    ) -> Self {
        Self {
            registry,
            scope: ScopeId::unique(label),
            actions: actions.into_iter().collect(),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    pub fn actions(&self) -> &[ActionDescriptor] {
        &self.actions
    }

    pub fn state(&self) -> ScopeState {
        if self.terminated.load(Ordering::Acquire) {
            ScopeState::Terminated
        } else {
            self.registry.scope_state(&self.scope)
        }
    }

    pub fn handle(&self, signal: LifecycleSignal) -> Result<(), RegistryError> {
        if self.terminated.load(Ordering::Acquire) {
            return match signal {
                LifecycleSignal::Resume => Err(RegistryError::ScopeTerminated(self.scope.clone())),
                LifecycleSignal::Pause | LifecycleSignal::Destroy => Ok(()),
            };
        }
        match signal {
            LifecycleSignal::Resume => self
                .registry
                .activate(&self.scope, self.actions.iter().cloned()),
            LifecycleSignal::Pause => {
                self.registry.deactivate(&self.scope);
                Ok(())
            }
            LifecycleSignal::Destroy => {
                self.terminated.store(true, Ordering::Release);
                self.registry.release(&self.scope);
                Ok(())
            }
        }
    }

    /// Applies signals until `Destroy` arrives or the source ends, then terminates.
    pub async fn follow<S>(self, signals: S)
    where
        S: Stream<Item = LifecycleSignal>,
    {
        let mut signals = std::pin::pin!(signals);
        while let Some(signal) = signals.next().await {
            if let Err(error) = self.handle(signal) {
                warn!(scope = %self.scope, ?signal, %error, "ignored lifecycle signal");
            }
            if signal == LifecycleSignal::Destroy {
                break;
            }
        }
    }

    pub fn terminate(self) {
        drop(self);
    }
}

impl Drop for ScopeBinding {
    fn drop(&mut self) {
        self.registry.release(&self.scope);
    }
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
