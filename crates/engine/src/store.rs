//! In-memory transactional store.
//!
//! The engine never talks to storage through a global singleton: a [`Store`]
//! is constructed once at process start and handed into the engine. Reads
//! are unlocked point-in-time snapshots; all writes travel as a
//! [`WriteBatch`] applied under a single write lock, so a zone transition
//! and its reward cascade become visible together or not at all.

use crate::error::{Error, Result};
use crate::model::{
    ActivityEntry, Mission, MissionStatus, MissionType, Notification, User, UserId, Zone,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use turf_grid::CellId;
use uuid::Uuid;

/// A single staged write. Batches are applied in order.
#[derive(Debug, Clone)]
pub enum Write {
    PutUser(User),
    PutZone(Zone),
    DeleteZone(CellId),
    PutMission(Mission),
    PushNotification(Notification),
    PushActivity(ActivityEntry),
}

/// Ordered set of writes committed atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_user(&mut self, user: User) {
        self.writes.push(Write::PutUser(user));
    }

    pub fn put_zone(&mut self, zone: Zone) {
        self.writes.push(Write::PutZone(zone));
    }

    pub fn delete_zone(&mut self, id: CellId) {
        self.writes.push(Write::DeleteZone(id));
    }

    pub fn put_mission(&mut self, mission: Mission) {
        self.writes.push(Write::PutMission(mission));
    }

    pub fn push_notification(&mut self, notification: Notification) {
        self.writes.push(Write::PushNotification(notification));
    }

    pub fn push_activity(&mut self, entry: ActivityEntry) {
        self.writes.push(Write::PushActivity(entry));
    }

    pub fn extend(&mut self, other: WriteBatch) {
        self.writes.extend(other.writes);
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }
}

#[derive(Default)]
struct StoreInner {
    users: HashMap<UserId, User>,
    zones: HashMap<CellId, Zone>,
    missions: HashMap<Uuid, Mission>,
    notifications: Vec<Notification>,
    activity: Vec<ActivityEntry>,
}

/// Cheaply cloneable handle to the shared state.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<StoreInner>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every write in the batch under one write lock.
    pub fn commit(&self, batch: WriteBatch) {
        if batch.is_empty() {
            return;
        }
        debug!("Committing batch of {} writes", batch.len());
        let mut inner = self.inner.write();
        for write in batch.writes {
            match write {
                Write::PutUser(user) => {
                    inner.users.insert(user.id, user);
                }
                Write::PutZone(zone) => {
                    inner.zones.insert(zone.id, zone);
                }
                Write::DeleteZone(id) => {
                    inner.zones.remove(&id);
                }
                Write::PutMission(mission) => {
                    inner.missions.insert(mission.id, mission);
                }
                Write::PushNotification(notification) => {
                    inner.notifications.push(notification);
                }
                Write::PushActivity(entry) => {
                    inner.activity.push(entry);
                }
            }
        }
    }

    /// Insert a fresh user and their starter missions in one atomic step,
    /// enforcing username uniqueness under the same write lock.
    pub fn create_user(&self, user: User, missions: Vec<Mission>) -> Result<()> {
        let mut inner = self.inner.write();
        if inner
            .users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(Error::UsernameTaken(user.username));
        }
        for mission in missions {
            inner.missions.insert(mission.id, mission);
        }
        inner.users.insert(user.id, user);
        Ok(())
    }

    pub fn user(&self, id: &UserId) -> Option<User> {
        self.inner.read().users.get(id).cloned()
    }

    pub fn zone(&self, id: &CellId) -> Option<Zone> {
        self.inner.read().zones.get(id).cloned()
    }

    pub fn zones_owned_by(&self, user_id: &UserId) -> Vec<Zone> {
        self.inner
            .read()
            .zones
            .values()
            .filter(|z| z.owner == Some(*user_id))
            .cloned()
            .collect()
    }

    /// Active missions of one type for a user.
    pub fn active_missions(&self, user_id: &UserId, mission_type: MissionType) -> Vec<Mission> {
        self.inner
            .read()
            .missions
            .values()
            .filter(|m| {
                m.user_id == *user_id
                    && m.mission_type == mission_type
                    && m.status == MissionStatus::Active
            })
            .cloned()
            .collect()
    }

    /// Every active mission for a user, regardless of type.
    pub fn all_active_missions(&self, user_id: &UserId) -> Vec<Mission> {
        self.inner
            .read()
            .missions
            .values()
            .filter(|m| m.user_id == *user_id && m.status == MissionStatus::Active)
            .cloned()
            .collect()
    }

    pub fn missions_for(&self, user_id: &UserId) -> Vec<Mission> {
        self.inner
            .read()
            .missions
            .values()
            .filter(|m| m.user_id == *user_id)
            .cloned()
            .collect()
    }

    pub fn notifications_for(&self, user_id: &UserId) -> Vec<Notification> {
        self.inner
            .read()
            .notifications
            .iter()
            .filter(|n| n.user_id == *user_id)
            .cloned()
            .collect()
    }

    pub fn activity_for(&self, user_id: &UserId) -> Vec<ActivityEntry> {
        self.inner
            .read()
            .activity
            .iter()
            .filter(|a| a.user_id == *user_id)
            .cloned()
            .collect()
    }

    /// Top `n` users by total EP.
    pub fn leaderboard(&self, n: usize) -> Vec<User> {
        let inner = self.inner.read();
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by(|a, b| b.total_ep.cmp(&a.total_ep).then(a.username.cmp(&b.username)));
        users.truncate(n);
        users
    }

    /// Users holding at least one active mission whose deadline passed.
    /// Mission rows themselves are only ever flipped under the owning
    /// user's ledger lock; this is the unlocked snapshot the expiry sweep
    /// starts from.
    pub fn users_with_overdue_missions(&self, now: DateTime<Utc>) -> Vec<UserId> {
        let inner = self.inner.read();
        let mut users: Vec<UserId> = inner
            .missions
            .values()
            .filter(|m| m.status == MissionStatus::Active && m.expires_at <= now)
            .map(|m| m.user_id)
            .collect();
        users.sort_unstable();
        users.dedup();
        users
    }
}
