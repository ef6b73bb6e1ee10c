//! Typed notification channels for source and manager events
//!
//! The manager exposes its notification surface through [`ManagerEvents`],
//! a plain struct of broadcast channels held as a field. Subscribers pick
//! the event kind they care about; slow subscribers miss events rather
//! than block the emitting side.

use tokio::sync::broadcast;

use super::source::SourceDescription;

/// Default depth for every notification channel
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Change events emitted by a single vault source
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// The source transitioned to locked
    Locked(SourceDescription),
    /// The source transitioned to unlocked
    Unlocked(SourceDescription),
    /// The source's colour metadata changed
    ColourUpdated(SourceDescription),
}

/// Notification surface exposed by the source collection manager
///
/// `sources_updated` fires after every mutating operation with the
/// full description list in display order. The three pass-through
/// channels re-emit the originating source's own events.
#[derive(Debug)]
pub struct ManagerEvents {
    sources_updated: broadcast::Sender<Vec<SourceDescription>>,
    source_locked: broadcast::Sender<SourceDescription>,
    source_unlocked: broadcast::Sender<SourceDescription>,
    source_colour_updated: broadcast::Sender<SourceDescription>,
}

impl ManagerEvents {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        // broadcast channels reject a zero capacity
        let capacity = capacity.max(1);
        let (sources_updated, _) = broadcast::channel(capacity);
        let (source_locked, _) = broadcast::channel(capacity);
        let (source_unlocked, _) = broadcast::channel(capacity);
        let (source_colour_updated, _) = broadcast::channel(capacity);
        Self {
            sources_updated,
            source_locked,
            source_unlocked,
            source_colour_updated,
        }
    }

    /// Subscribe to collection-updated notifications
    pub fn subscribe_sources_updated(&self) -> broadcast::Receiver<Vec<SourceDescription>> {
        self.sources_updated.subscribe()
    }

    /// Subscribe to re-emitted lock events
    pub fn subscribe_source_locked(&self) -> broadcast::Receiver<SourceDescription> {
        self.source_locked.subscribe()
    }

    /// Subscribe to re-emitted unlock events
    pub fn subscribe_source_unlocked(&self) -> broadcast::Receiver<SourceDescription> {
        self.source_unlocked.subscribe()
    }

    /// Subscribe to re-emitted colour updates
    pub fn subscribe_source_colour_updated(&self) -> broadcast::Receiver<SourceDescription> {
        self.source_colour_updated.subscribe()
    }

    pub(crate) fn emit_sources_updated(&self, descriptions: Vec<SourceDescription>) {
        // Send only fails when nobody is subscribed
        let _ = self.sources_updated.send(descriptions);
    }

    /// Re-emit a source's own event on the matching manager channel
    pub(crate) fn forward(&self, event: SourceEvent) {
        match event {
            SourceEvent::Locked(details) => {
                let _ = self.source_locked.send(details);
            }
            SourceEvent::Unlocked(details) => {
                let _ = self.source_unlocked.send(details);
            }
            SourceEvent::ColourUpdated(details) => {
                let _ = self.source_colour_updated.send(details);
            }
        }
    }
}

impl Default for ManagerEvents {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}
