//! Begin/finish notifications for version-scoped plans.
//!
//! Listeners observe migrations (for progress reporting and the like) but
//! cannot veto or alter them.

use std::fmt;
use std::sync::Arc;

use schema_tick_core::Version;

/// A migration lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionEvent {
    UpgradeBegin(Version),
    UpgradeFinish(Version),
    DowngradeBegin(Version),
    DowngradeFinish(Version),
}

impl VersionEvent {
    /// The version the event concerns.
    pub fn version(&self) -> &Version {
        match self {
            Self::UpgradeBegin(v)
            | Self::UpgradeFinish(v)
            | Self::DowngradeBegin(v)
            | Self::DowngradeFinish(v) => v,
        }
    }
}

type Listener = Arc<dyn Fn(&VersionEvent) + Send + Sync>;

/// Fan-out of [`VersionEvent`]s to subscribed listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. Listeners run synchronously, in subscription order.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&VersionEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    pub fn emit(&self, event: VersionEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_listeners_receive_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = Arc::clone(&seen);
        bus.subscribe(move |e| sink.lock().push(e.clone()));

        let v = Version::root("VersionOrigin");
        bus.emit(VersionEvent::UpgradeBegin(v.clone()));
        bus.emit(VersionEvent::UpgradeFinish(v.clone()));

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![VersionEvent::UpgradeBegin(v.clone()), VersionEvent::UpgradeFinish(v)]
        );
        assert_eq!(seen[0].version().name(), "VersionOrigin");
    }
}
