//! Vault source entity
//!
//! A [`VaultSource`] is the registration of a single credential vault:
//! its identity, display metadata, lock status and rank in the display
//! order. The vault's actual contents and the machinery that encrypts
//! them live elsewhere; this entity only carries the public state the
//! registry coordinates, and notifies subscribers when that state
//! changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::events::{SourceEvent, DEFAULT_EVENT_CAPACITY};
use super::SourceError;

/// Colour assigned to sources registered without explicit metadata
pub const DEFAULT_COLOUR: &str = "#000000";

/// Rank of a source not yet placed by a manager; sorts after every
/// ranked source.
const UNRANKED: usize = usize::MAX;

/// Lock state of a vault source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Contents encrypted and inaccessible
    Locked,
    /// Contents decrypted and readable
    Unlocked,
}

/// Display metadata snapshot for a vault source
///
/// Carried by every notification and returned by the manager's list
/// views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescription {
    pub id: Uuid,
    pub name: String,
    pub colour: String,
    pub status: SourceStatus,
    pub order: usize,
}

/// Serialized form of a source, as written to storage
#[derive(Debug, Serialize, Deserialize)]
struct DehydratedSource {
    id: Uuid,
    name: String,
    colour: String,
    status: SourceStatus,
    order: usize,
    created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct SourceState {
    name: String,
    colour: String,
    status: SourceStatus,
    order: usize,
    created_at: DateTime<Utc>,
}

/// A registered vault source
///
/// Cloning yields another handle to the same source: state and the
/// notification channel are shared, so every holder observes the same
/// lock status and rank. Membership in a collection is owned by the
/// manager alone.
#[derive(Debug, Clone)]
pub struct VaultSource {
    id: Uuid,
    state: Arc<RwLock<SourceState>>,
    events: broadcast::Sender<SourceEvent>,
}

impl VaultSource {
    /// Create a new locked source with the given display name
    pub fn new(name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            id: Uuid::new_v4(),
            state: Arc::new(RwLock::new(SourceState {
                name: name.into(),
                colour: DEFAULT_COLOUR.to_string(),
                status: SourceStatus::Locked,
                order: UNRANKED,
                created_at: Utc::now(),
            })),
            events,
        }
    }

    /// Unique identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lock status
    pub async fn status(&self) -> SourceStatus {
        self.state.read().await.status
    }

    /// Current rank in the display order
    pub async fn order(&self) -> usize {
        self.state.read().await.order
    }

    pub(crate) async fn set_order(&self, order: usize) {
        self.state.write().await.order = order;
    }

    /// Display metadata snapshot
    pub async fn description(&self) -> SourceDescription {
        let state = self.state.read().await;
        self.snapshot(&state)
    }

    /// Subscribe to this source's change events
    pub fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.events.subscribe()
    }

    /// Mark the source locked, notifying subscribers
    ///
    /// No-op when already locked. Discarding the decrypted contents is
    /// the vault implementation's job, not the registry's.
    pub async fn lock(&self) {
        let details = {
            let mut state = self.state.write().await;
            if state.status == SourceStatus::Locked {
                return;
            }
            state.status = SourceStatus::Locked;
            self.snapshot(&state)
        };
        let _ = self.events.send(SourceEvent::Locked(details));
    }

    /// Mark the source unlocked, notifying subscribers
    ///
    /// No-op when already unlocked.
    pub async fn unlock(&self) {
        let details = {
            let mut state = self.state.write().await;
            if state.status == SourceStatus::Unlocked {
                return;
            }
            state.status = SourceStatus::Unlocked;
            self.snapshot(&state)
        };
        let _ = self.events.send(SourceEvent::Unlocked(details));
    }

    /// Update the source's display colour, notifying subscribers
    ///
    /// No-op when the colour is unchanged.
    pub async fn update_colour(&self, colour: impl Into<String>) {
        let colour = colour.into();
        let details = {
            let mut state = self.state.write().await;
            if state.colour == colour {
                return;
            }
            state.colour = colour;
            self.snapshot(&state)
        };
        let _ = self.events.send(SourceEvent::ColourUpdated(details));
    }

    /// Serialize the source to its storable representation
    pub async fn dehydrate(&self) -> Result<String, SourceError> {
        let state = self.state.read().await;
        let record = DehydratedSource {
            id: self.id,
            name: state.name.clone(),
            colour: state.colour.clone(),
            status: state.status,
            order: state.order,
            created_at: state.created_at,
        };
        serde_json::to_string(&record).map_err(SourceError::Serialize)
    }

    /// Reconstruct a source from a stored representation
    ///
    /// The restored source gets a fresh notification channel;
    /// subscriptions do not survive the round trip.
    pub async fn rehydrate(serialized: &str) -> Result<Self, SourceError> {
        let record: DehydratedSource =
            serde_json::from_str(serialized).map_err(SourceError::Deserialize)?;
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Ok(Self {
            id: record.id,
            state: Arc::new(RwLock::new(SourceState {
                name: record.name,
                colour: record.colour,
                status: record.status,
                order: record.order,
                created_at: record.created_at,
            })),
            events,
        })
    }

    fn snapshot(&self, state: &SourceState) -> SourceDescription {
        SourceDescription {
            id: self.id,
            name: state.name.clone(),
            colour: state.colour.clone(),
            status: state.status,
            order: state.order,
        }
    }
}
