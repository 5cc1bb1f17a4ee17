//! Progression ledger: EP accounting, respect levels, mission progress,
//! notifications, and the activity log.
//!
//! All effects for one user run inside a [`LedgerTxn`], opened under the
//! user's lock and staged into a [`WriteBatch`]. Nothing becomes visible
//! until the whole batch commits, and the lock is held across the commit,
//! so concurrent awards to one user can never lose an increment and a
//! cascade can never half-apply.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::DomainEvent;
use crate::locks::{UserLockGuard, UserLocks};
use crate::model::{
    respect_level_for, ActivityEntry, ActivityKind, Mission, MissionStatus, MissionType,
    Notification, NotificationKind, User, UserId,
};
use crate::store::{Store, WriteBatch};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};
use turf_grid::CellId;
use uuid::Uuid;

/// Outcome of a single EP award.
#[derive(Debug, Clone, Copy)]
pub struct EpAward {
    pub new_total_ep: u64,
    pub new_respect_level: u8,
    pub old_respect_level: u8,
    pub leveled_up: bool,
}

#[derive(Clone)]
pub struct Ledger {
    store: Store,
    user_locks: UserLocks,
    config: EngineConfig,
}

impl Ledger {
    pub fn new(store: Store, user_locks: UserLocks, config: EngineConfig) -> Self {
        Self {
            store,
            user_locks,
            config,
        }
    }

    /// Open a transaction for one user's reward cascade. Acquires the user
    /// lock (bounded wait) and snapshots the user plus their active
    /// missions.
    pub async fn begin(&self, user_id: &UserId) -> Result<LedgerTxn> {
        let guard = self.user_locks.acquire(user_id).await?;
        let user = self.store.user(user_id).ok_or(Error::NotFound("user"))?;
        let missions = self.store.all_active_missions(user_id);
        Ok(LedgerTxn {
            guard,
            user,
            missions,
            touched_missions: HashSet::new(),
            batch: WriteBatch::new(),
            events: Vec::new(),
            now: Utc::now(),
        })
    }

    /// Standalone EP award, committed on its own.
    pub async fn award_ep(
        &self,
        user_id: &UserId,
        amount: u64,
        reason: &str,
        zone_id: Option<CellId>,
    ) -> Result<(EpAward, Vec<DomainEvent>)> {
        let mut txn = self.begin(user_id).await?;
        let award = txn.award_ep(amount, reason, zone_id)?;
        let (batch, events, _guard) = txn.finish();
        self.store.commit(batch);
        Ok((award, events))
    }

    /// Standalone mission progress update, committed on its own.
    pub async fn update_mission_progress(
        &self,
        user_id: &UserId,
        mission_type: MissionType,
        increment: u32,
    ) -> Result<Vec<DomainEvent>> {
        let mut txn = self.begin(user_id).await?;
        txn.advance_missions(mission_type, increment);
        let (batch, events, _guard) = txn.finish();
        self.store.commit(batch);
        Ok(events)
    }

    /// Flip active missions whose deadline passed to `Expired`, one user
    /// at a time under that user's lock so the sweep never races an
    /// in-flight reward cascade. Users whose ledger is busy are skipped;
    /// a later sweep catches them. Completed missions are never touched.
    /// Returns how many missions were expired.
    pub async fn expire_overdue_missions(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut expired = 0;
        for user_id in self.store.users_with_overdue_missions(now) {
            let guard = match self.user_locks.acquire(&user_id).await {
                Ok(guard) => guard,
                Err(Error::Busy) => {
                    debug!("Skipping mission expiry for busy user {}", user_id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            // Re-read under the lock: the cascade that held it may have
            // completed or already advanced these missions
            let mut batch = WriteBatch::new();
            for mut mission in self.store.all_active_missions(&user_id) {
                if mission.expires_at <= now {
                    mission.status = MissionStatus::Expired;
                    batch.put_mission(mission);
                    expired += 1;
                }
            }
            self.store.commit(batch);
            drop(guard);
        }
        if expired > 0 {
            info!("Expired {} overdue missions", expired);
        }
        Ok(expired)
    }

    /// Create a user and their starter mission set in one atomic step.
    pub fn register_user(
        &self,
        username: &str,
        color_hex: &str,
    ) -> Result<(User, Vec<DomainEvent>)> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::InvalidParameter("username must not be empty".into()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            color_hex: color_hex.to_string(),
            total_ep: 0,
            respect_level: 1,
            last_seen: None,
            created_at: now,
        };
        let missions = starter_missions(user.id, now, self.config.mission_expiry);

        self.store.create_user(user.clone(), missions)?;
        info!("Registered user {} ({})", user.username, user.id);

        let events = vec![DomainEvent::UserRegistered {
            user_id: user.id,
            username: user.username.clone(),
        }];
        Ok((user, events))
    }
}

/// Fixed starter mission set every new player receives.
fn starter_missions(
    user_id: UserId,
    now: DateTime<Utc>,
    expiry: chrono::Duration,
) -> Vec<Mission> {
    let defaults = [
        (MissionType::CaptureZones, 5, 50),
        (MissionType::EarnEp, 100, 25),
        (MissionType::DefendZones, 3, 30),
    ];
    defaults
        .into_iter()
        .map(|(mission_type, target, reward_ep)| Mission {
            id: Uuid::new_v4(),
            user_id,
            mission_type,
            target,
            current: 0,
            reward_ep,
            status: MissionStatus::Active,
            expires_at: now + expiry,
            completed_at: None,
        })
        .collect()
}

/// One user's reward cascade: a working copy of the user and their active
/// missions, mutated in memory and staged for a single commit. The user
/// lock is held for the transaction's whole lifetime.
pub struct LedgerTxn {
    guard: UserLockGuard,
    user: User,
    missions: Vec<Mission>,
    touched_missions: HashSet<Uuid>,
    batch: WriteBatch,
    events: Vec<DomainEvent>,
    now: DateTime<Utc>,
}

impl LedgerTxn {
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Award EP and cascade: recompute respect level, log the earn, emit
    /// level-up effects if the level rose, and advance `earn_ep` missions
    /// by the awarded amount.
    pub fn award_ep(
        &mut self,
        amount: u64,
        reason: &str,
        zone_id: Option<CellId>,
    ) -> Result<EpAward> {
        if amount == 0 {
            return Err(Error::InvalidParameter("EP amount must be positive".into()));
        }
        let award = self.grant(amount, reason, zone_id);
        self.advance_missions(MissionType::EarnEp, clamp_to_u32(amount));
        Ok(award)
    }

    /// Raw EP grant: user mutation, activity entry, level-up effects.
    /// Mission progress is the caller's concern.
    fn grant(&mut self, amount: u64, reason: &str, zone_id: Option<CellId>) -> EpAward {
        let old_level = self.user.respect_level;
        self.user.total_ep = self.user.total_ep.saturating_add(amount);
        let new_level = respect_level_for(self.user.total_ep);
        self.user.respect_level = new_level;
        let leveled_up = new_level > old_level;

        debug!(
            "User {} earned {} EP ({}) -> total {} level {}",
            self.user.id, amount, reason, self.user.total_ep, new_level
        );

        self.push_activity(
            ActivityKind::EpEarned,
            zone_id,
            amount as i64,
            i32::from(new_level) - i32::from(old_level),
            reason.to_string(),
        );
        self.events.push(DomainEvent::EpEarned {
            user_id: self.user.id,
            amount,
            total_ep: self.user.total_ep,
        });

        if leveled_up {
            self.push_activity(
                ActivityKind::RespectGained,
                None,
                0,
                i32::from(new_level) - i32::from(old_level),
                format!("reached respect level {new_level}"),
            );
            self.notify(
                NotificationKind::LevelUp,
                "Level up!",
                &format!("You reached respect level {new_level}"),
                json!({ "old_level": old_level, "new_level": new_level }),
            );
            self.events.push(DomainEvent::LevelUp {
                user_id: self.user.id,
                old_level,
                new_level,
            });
        }

        EpAward {
            new_total_ep: self.user.total_ep,
            new_respect_level: new_level,
            old_respect_level: old_level,
            leveled_up,
        }
    }

    /// Advance every active mission of a type, clamped to its target.
    /// Missions that reach their target complete exactly once: the reward
    /// is granted, a notification and activity entry are staged, and the
    /// reward itself advances `earn_ep` missions.
    pub fn advance_missions(&mut self, mission_type: MissionType, increment: u32) {
        if increment == 0 {
            return;
        }

        let mut completions = Vec::new();
        for mission in &mut self.missions {
            if mission.mission_type != mission_type || mission.status != MissionStatus::Active {
                continue;
            }
            mission.current = mission.current.saturating_add(increment).min(mission.target);
            self.touched_missions.insert(mission.id);
            if mission.current >= mission.target {
                mission.status = MissionStatus::Completed;
                mission.completed_at = Some(self.now);
                completions.push((mission.id, mission.mission_type, mission.reward_ep));
            }
        }

        for (mission_id, completed_type, reward_ep) in completions {
            info!(
                "User {} completed mission {:?} for {} EP",
                self.user.id, completed_type, reward_ep
            );
            if reward_ep > 0 {
                self.grant(reward_ep, "mission reward", None);
            }
            self.push_activity(
                ActivityKind::MissionCompleted,
                None,
                reward_ep as i64,
                0,
                format!("completed {completed_type:?} mission"),
            );
            self.notify(
                NotificationKind::MissionCompleted,
                "Mission complete",
                &format!("Mission complete! You earned {reward_ep} EP"),
                json!({ "mission_id": mission_id, "reward_ep": reward_ep }),
            );
            self.events.push(DomainEvent::MissionCompleted {
                user_id: self.user.id,
                mission_id,
                mission_type: completed_type,
                reward_ep,
            });
            if reward_ep > 0 {
                // The reward counts toward earn_ep missions too
                self.advance_missions(MissionType::EarnEp, clamp_to_u32(reward_ep));
            }
        }
    }

    /// Stage a notification for the transaction's user.
    pub fn notify(
        &mut self,
        kind: NotificationKind,
        title: &str,
        message: &str,
        payload: serde_json::Value,
    ) {
        self.batch.push_notification(Notification {
            id: Uuid::new_v4(),
            user_id: self.user.id,
            kind,
            title: title.to_string(),
            message: message.to_string(),
            payload,
            read: false,
            created_at: self.now,
        });
    }

    pub fn push_event(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    fn push_activity(
        &mut self,
        kind: ActivityKind,
        zone_id: Option<CellId>,
        ep_change: i64,
        respect_change: i32,
        details: String,
    ) {
        self.batch.push_activity(ActivityEntry {
            id: Uuid::new_v4(),
            user_id: self.user.id,
            kind,
            zone_id,
            ep_change,
            respect_change,
            details,
            created_at: self.now,
        });
    }

    /// Stage the final user row and every touched mission, then hand the
    /// batch back. The returned guard must outlive the commit so the
    /// user's critical section covers it.
    pub fn finish(mut self) -> (WriteBatch, Vec<DomainEvent>, UserLockGuard) {
        self.batch.put_user(self.user);
        for mission in self.missions {
            if self.touched_missions.contains(&mission.id) {
                self.batch.put_mission(mission);
            }
        }
        (self.batch, self.events, self.guard)
    }
}

fn clamp_to_u32(amount: u64) -> u32 {
    amount.min(u64::from(u32::MAX)) as u32
}
