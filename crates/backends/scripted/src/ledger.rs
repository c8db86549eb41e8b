use std::sync::{Arc, Mutex};

/// Lifecycle events for scripted resources, in the order they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    ModelLoaded(u32),
    ContextCreated(u32),
    ContextReleased(u32),
    ModelReleased(u32),
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    events: Arc<Mutex<Vec<ResourceEvent>>>,
}

impl Ledger {
    pub fn record(&self, event: ResourceEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<ResourceEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Resources acquired and not yet released.
    pub fn live(&self) -> usize {
        self.events().iter().fold(0usize, |n, e| match e {
            ResourceEvent::ModelLoaded(_) | ResourceEvent::ContextCreated(_) => n + 1,
            ResourceEvent::ContextReleased(_) | ResourceEvent::ModelReleased(_) => {
                n.saturating_sub(1)
            }
        })
    }
}
