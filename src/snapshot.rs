// src/snapshot.rs - Published copy of remote state

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::types::DashboardData;

/// Everything the client currently believes about the backend.
///
/// A published state is never mutated; the store swaps in a new one.
#[derive(Debug, Clone)]
pub struct ClientState {
    pub data: Arc<DashboardData>,
    pub system_online: bool,
    pub last_seen: Instant,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Ticket of the refresh that produced this state, 0 before the first one.
    pub revision: u64,
}

impl ClientState {
    fn initial(now: Instant) -> Self {
        Self {
            data: Arc::new(DashboardData::default()),
            system_online: false,
            last_seen: now,
            last_synced_at: None,
            revision: 0,
        }
    }

    /// Disconnected when the last refresh failed or nothing succeeded for longer than `threshold`.
    pub fn is_stale_at(&self, now: Instant, threshold: Duration) -> bool {
        !self.system_online || now.saturating_duration_since(self.last_seen) > threshold
    }
}

/// Handed out before a request is issued; orders responses by issue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

impl RefreshTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Published,
    /// A response to a later request was already applied.
    Superseded,
}

pub struct SnapshotStore {
    current: RwLock<Arc<ClientState>>,
    next_ticket: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            current: RwLock::new(Arc::new(ClientState::initial(now))),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn begin(&self) -> RefreshTicket {
        RefreshTicket(self.next_ticket.fetch_add(1, Ordering::Relaxed))
    }

    pub fn current(&self) -> Arc<ClientState> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the whole snapshot with `data` fetched under `ticket`.
    pub fn apply_success(&self, ticket: RefreshTicket, data: DashboardData, now: Instant) -> Applied {
        self.publish(ticket, |_| ClientState {
            data: Arc::new(data),
            system_online: true,
            last_seen: now,
            last_synced_at: Some(Utc::now()),
            revision: ticket.0,
        })
    }

    /// Keep the data of the current snapshot but mark the backend offline.
    pub fn apply_failure(&self, ticket: RefreshTicket) -> Applied {
        self.publish(ticket, |previous| ClientState {
            system_online: false,
            revision: ticket.0,
            ..previous.clone()
        })
    }

    fn publish(&self, ticket: RefreshTicket, build: impl FnOnce(&ClientState) -> ClientState) -> Applied {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if ticket.0 < guard.revision {
            return Applied::Superseded;
        }

        let next = build(&guard);
        *guard = Arc::new(next);
        Applied::Published
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InboundConfig, SystemSnapshot};

    const STALE_AFTER: Duration = Duration::from_millis(5000);

    fn data_with_port(port: u16) -> DashboardData {
        DashboardData {
            inbounds: vec![InboundConfig {
                port,
                path: "/ws".to_string(),
                uuid: format!("uuid-{}", port),
                stats: Vec::new(),
                online: Some(true),
            }],
            logs: Vec::new(),
            sys: SystemSnapshot::default(),
        }
    }

    #[test]
    fn test_initial_state_is_stale() {
        let start = Instant::now();
        let store = SnapshotStore::starting_at(start);
        let state = store.current();
        assert!(!state.system_online);
        assert!(state.is_stale_at(start, STALE_AFTER));
        assert!(state.data.inbounds.is_empty());
    }

    #[test]
    fn test_success_replaces_snapshot_wholesale() {
        let start = Instant::now();
        let store = SnapshotStore::starting_at(start);

        let first = store.begin();
        store.apply_success(first, data_with_port(8080), start);

        let completed = start + Duration::from_millis(1500);
        let second = store.begin();
        let applied = store.apply_success(second, data_with_port(9090), completed);

        let state = store.current();
        assert_eq!(applied, Applied::Published);
        assert_eq!(*state.data, data_with_port(9090));
        assert!(state.data.inbound(8080).is_none());
        assert_eq!(state.last_seen, completed);
        assert!(state.system_online);
        assert!(state.last_synced_at.is_some());
    }

    #[test]
    fn test_failure_keeps_data_and_flags_offline() {
        let start = Instant::now();
        let store = SnapshotStore::starting_at(start);

        let ok = store.begin();
        store.apply_success(ok, data_with_port(8080), start);
        let before = store.current();

        let failed = store.begin();
        store.apply_failure(failed);

        let after = store.current();
        assert!(!after.system_online);
        assert!(Arc::ptr_eq(&before.data, &after.data));
        assert_eq!(after.last_seen, before.last_seen);
        assert!(after.is_stale_at(start, STALE_AFTER));
    }

    #[test]
    fn test_published_states_are_not_mutated() {
        let start = Instant::now();
        let store = SnapshotStore::starting_at(start);

        let held = store.current();
        let ticket = store.begin();
        store.apply_success(ticket, data_with_port(8080), start);

        assert!(held.data.inbounds.is_empty());
        assert!(!held.system_online);
    }

    #[test]
    fn test_stale_boundary_is_strict() {
        let start = Instant::now();
        let store = SnapshotStore::starting_at(start);
        let ticket = store.begin();
        store.apply_success(ticket, DashboardData::default(), start);
        let state = store.current();

        assert!(!state.is_stale_at(start, STALE_AFTER));
        assert!(!state.is_stale_at(start + Duration::from_millis(5000), STALE_AFTER));
        assert!(state.is_stale_at(start + Duration::from_millis(5001), STALE_AFTER));
    }

    #[test]
    fn test_older_response_is_discarded() {
        let start = Instant::now();
        let store = SnapshotStore::starting_at(start);

        let periodic = store.begin();
        let on_demand = store.begin();
        assert!(periodic < on_demand);

        // The later request answers first.
        assert_eq!(
            store.apply_success(on_demand, data_with_port(9090), start),
            Applied::Published
        );
        assert_eq!(
            store.apply_success(periodic, data_with_port(8080), start),
            Applied::Superseded
        );
        assert_eq!(store.apply_failure(periodic), Applied::Superseded);

        let state = store.current();
        assert!(state.system_online);
        assert_eq!(state.revision, on_demand.id());
        assert!(state.data.inbound(9090).is_some());
    }
}
