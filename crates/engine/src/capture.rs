//! Zone capture engine: the per-zone ownership state machine.
//!
//! Every mutating operation follows the same critical section: try-acquire
//! the zone lock (fail fast with `Locked` on contention), read the zone,
//! compute the transition, run the ledger cascade for the acting user (the
//! user lock is taken inside), then commit one batch and drop the guards.
//! The zone lock spans the whole cascade so no reader ever observes a zone
//! whose defense changed without its paired reward.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::DomainEvent;
use crate::locks::{UserLocks, ZoneLocks};
use crate::model::{
    ActivityEntry, ActivityKind, MissionType, Notification, NotificationKind, User, UserId, Zone,
    ZoneStatus,
};
use crate::progression::Ledger;
use crate::store::{Store, WriteBatch};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};
use turf_grid::{cell_bounds, cell_id, haversine_distance_m, CellId, Rect};
use uuid::Uuid;

pub const MIN_ATTACK_POWER: u8 = 1;
pub const MAX_ATTACK_POWER: u8 = 50;
pub const DEFAULT_ATTACK_POWER: u8 = 10;
pub const MIN_DEFENSE_BOOST: u8 = 1;
pub const MAX_DEFENSE_BOOST: u8 = 30;
pub const DEFAULT_DEFENSE_BOOST: u8 = 10;
pub const MAX_DEFENSE: u8 = 100;

/// How a capture call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Neutral ground claimed by the caller.
    Captured,
    /// Caller already owned the cell; defense boosted, no reward.
    Reinforced,
    /// Another player owns the cell; it is now contested.
    ContestStarted,
}

#[derive(Debug)]
pub struct CaptureResult {
    pub outcome: CaptureOutcome,
    pub zone: Zone,
    pub events: Vec<DomainEvent>,
}

#[derive(Debug)]
pub struct AttackResult {
    pub zone: Zone,
    /// True when the hit dropped defense to zero and ownership transferred.
    pub captured: bool,
    pub events: Vec<DomainEvent>,
}

#[derive(Debug)]
pub struct DefendResult {
    pub zone: Zone,
    pub events: Vec<DomainEvent>,
}

pub struct Engine {
    store: Store,
    zone_locks: ZoneLocks,
    ledger: Ledger,
    config: EngineConfig,
}

impl Engine {
    pub fn new(store: Store, config: EngineConfig) -> Self {
        let user_locks = UserLocks::new(config.user_lock_timeout);
        let ledger = Ledger::new(store.clone(), user_locks, config.clone());
        Self {
            store,
            zone_locks: ZoneLocks::new(),
            ledger,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Create a user and their starter missions.
    pub fn register_user(&self, username: &str, color_hex: &str) -> Result<(User, Vec<DomainEvent>)> {
        self.ledger.register_user(username, color_hex)
    }

    /// Claim, reinforce, or contest the cell containing `(lat, lon)`.
    pub async fn capture_zone(&self, lat: f64, lon: f64, user_id: UserId) -> Result<CaptureResult> {
        let cell = cell_id(lat, lon)?;
        let _zone_guard = self.zone_locks.try_acquire(&cell).ok_or(Error::Locked)?;
        let now = Utc::now();

        match self.store.zone(&cell) {
            Some(mut zone) => match zone.owner {
                Some(owner) if owner == user_id => {
                    // Re-capturing your own zone boosts defense; no reward.
                    zone.defense = zone
                        .defense
                        .saturating_add(self.config.reinforce_boost)
                        .min(MAX_DEFENSE);
                    let mut batch = WriteBatch::new();
                    batch.put_zone(zone.clone());
                    self.store.commit(batch);
                    debug!("User {} reinforced zone {} to {}", user_id, cell, zone.defense);
                    let events = vec![DomainEvent::ZoneReinforced {
                        zone_id: cell,
                        owner_id: user_id,
                        defense: zone.defense,
                    }];
                    Ok(CaptureResult {
                        outcome: CaptureOutcome::Reinforced,
                        zone,
                        events,
                    })
                }
                Some(owner) => {
                    // Someone else's zone: contesting it, no reward yet.
                    if self.store.user(&user_id).is_none() {
                        return Err(Error::NotFound("user"));
                    }
                    zone.status = ZoneStatus::UnderAttack;
                    zone.last_attack_at = Some(now);
                    let mut batch = WriteBatch::new();
                    batch.put_zone(zone.clone());
                    batch.push_notification(notification_for(
                        owner,
                        NotificationKind::ZoneUnderAttack,
                        "Zone under attack",
                        &format!("Your zone {cell} is under attack"),
                        json!({ "zone_id": cell.to_string(), "attacker_id": user_id }),
                        now,
                    ));
                    self.store.commit(batch);
                    info!("User {} is contesting zone {} owned by {}", user_id, cell, owner);
                    let events = vec![DomainEvent::ZoneUnderAttack {
                        zone_id: cell,
                        owner_id: owner,
                        attacker_id: user_id,
                    }];
                    Ok(CaptureResult {
                        outcome: CaptureOutcome::ContestStarted,
                        zone,
                        events,
                    })
                }
                // An unowned row is neutral ground; claiming it is a fresh
                // capture that keeps the materialized geometry.
                None => self.claim(cell, zone.bounds, user_id, now).await,
            },
            None => {
                let bounds = cell_bounds(lat, lon)?;
                self.claim(cell, bounds, user_id, now).await
            }
        }
    }

    /// Claim neutral ground: create the zone and run the capture cascade.
    async fn claim(
        &self,
        cell: CellId,
        bounds: Rect,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<CaptureResult> {
        let zone = Zone {
            id: cell,
            bounds,
            owner: Some(user_id),
            defense: self.config.initial_defense,
            status: ZoneStatus::Safe,
            captured_at: Some(now),
            last_attack_at: None,
        };
        let mut batch = WriteBatch::new();
        batch.put_zone(zone.clone());

        let mut txn = self.ledger.begin(&user_id).await?;
        txn.push_event(DomainEvent::ZoneCaptured {
            zone_id: cell,
            user_id,
            defense: zone.defense,
        });
        txn.award_ep(self.config.capture_ep, "zone captured", Some(cell))?;
        txn.advance_missions(MissionType::CaptureZones, 1);
        txn.notify(
            NotificationKind::ZoneCaptured,
            "Zone captured",
            &format!("You captured zone {cell}"),
            json!({ "zone_id": cell.to_string() }),
        );
        let (ledger_batch, events, _user_guard) = txn.finish();
        batch.extend(ledger_batch);
        self.store.commit(batch);

        info!("User {} captured zone {}", user_id, cell);
        Ok(CaptureResult {
            outcome: CaptureOutcome::Captured,
            zone,
            events,
        })
    }

    /// Attack a zone owned by another player.
    pub async fn attack_zone(
        &self,
        zone_id: CellId,
        attacker_id: UserId,
        attack_power: Option<u8>,
    ) -> Result<AttackResult> {
        let power = attack_power.unwrap_or(DEFAULT_ATTACK_POWER);
        if !(MIN_ATTACK_POWER..=MAX_ATTACK_POWER).contains(&power) {
            return Err(Error::InvalidParameter(format!(
                "attack power must be within [{MIN_ATTACK_POWER}, {MAX_ATTACK_POWER}], got {power}"
            )));
        }

        let _zone_guard = self.zone_locks.try_acquire(&zone_id).ok_or(Error::Locked)?;
        let mut zone = self.store.zone(&zone_id).ok_or(Error::NotFound("zone"))?;
        // Unowned ground is neutral: there is nothing to attack.
        let owner = zone.owner.ok_or(Error::NotFound("zone"))?;
        if owner == attacker_id {
            return Err(Error::SelfAttack);
        }

        let now = Utc::now();
        let new_defense = zone.defense.saturating_sub(power);
        let mut batch = WriteBatch::new();

        if new_defense == 0 {
            // Lethal hit: ownership transfers, defense resets.
            zone.owner = Some(attacker_id);
            zone.defense = self.config.initial_defense;
            zone.status = ZoneStatus::Safe;
            zone.captured_at = Some(now);
            zone.last_attack_at = Some(now);
            batch.put_zone(zone.clone());
            batch.push_notification(notification_for(
                owner,
                NotificationKind::ZoneLost,
                "Zone lost",
                &format!("Your zone {zone_id} was captured by another player"),
                json!({ "zone_id": zone_id.to_string(), "new_owner": attacker_id }),
                now,
            ));

            let mut txn = self.ledger.begin(&attacker_id).await?;
            txn.push_event(DomainEvent::ZoneLost {
                zone_id,
                previous_owner: owner,
                new_owner: attacker_id,
            });
            txn.push_event(DomainEvent::ZoneCaptured {
                zone_id,
                user_id: attacker_id,
                defense: zone.defense,
            });
            txn.award_ep(self.config.takeover_ep, "zone takeover", Some(zone_id))?;
            txn.advance_missions(MissionType::CaptureZones, 1);
            txn.advance_missions(MissionType::WinBattles, 1);
            txn.notify(
                NotificationKind::ZoneCaptured,
                "Zone captured",
                &format!("You captured zone {zone_id}"),
                json!({ "zone_id": zone_id.to_string() }),
            );
            let (ledger_batch, events, _user_guard) = txn.finish();
            batch.extend(ledger_batch);
            self.store.commit(batch);

            info!(
                "User {} captured zone {} from {} with a {} power hit",
                attacker_id, zone_id, owner, power
            );
            Ok(AttackResult {
                zone,
                captured: true,
                events,
            })
        } else {
            // Partial damage: zone stays with its owner, now contested.
            // The owner is not notified of partial hits.
            zone.defense = new_defense;
            zone.status = ZoneStatus::UnderAttack;
            zone.last_attack_at = Some(now);
            batch.put_zone(zone.clone());

            let mut txn = self.ledger.begin(&attacker_id).await?;
            txn.push_event(DomainEvent::ZoneDamaged {
                zone_id,
                attacker_id,
                defense: new_defense,
            });
            txn.award_ep(self.config.attack_hit_ep, "zone attacked", Some(zone_id))?;
            let (ledger_batch, events, _user_guard) = txn.finish();
            batch.extend(ledger_batch);
            self.store.commit(batch);

            debug!(
                "User {} hit zone {} for {}, defense now {}",
                attacker_id, zone_id, power, new_defense
            );
            Ok(AttackResult {
                zone,
                captured: false,
                events,
            })
        }
    }

    /// Boost the defense of a zone the caller owns.
    pub async fn defend_zone(
        &self,
        zone_id: CellId,
        defender_id: UserId,
        defense_boost: Option<u8>,
    ) -> Result<DefendResult> {
        let boost = defense_boost.unwrap_or(DEFAULT_DEFENSE_BOOST);
        if !(MIN_DEFENSE_BOOST..=MAX_DEFENSE_BOOST).contains(&boost) {
            return Err(Error::InvalidParameter(format!(
                "defense boost must be within [{MIN_DEFENSE_BOOST}, {MAX_DEFENSE_BOOST}], got {boost}"
            )));
        }

        let _zone_guard = self.zone_locks.try_acquire(&zone_id).ok_or(Error::Locked)?;
        let mut zone = self.store.zone(&zone_id).ok_or(Error::NotFound("zone"))?;
        if zone.owner != Some(defender_id) {
            return Err(Error::NotOwner);
        }

        zone.defense = zone.defense.saturating_add(boost).min(MAX_DEFENSE);
        if zone.defense >= self.config.safe_defense_threshold {
            zone.status = ZoneStatus::Safe;
        }
        let mut batch = WriteBatch::new();
        batch.put_zone(zone.clone());

        let mut txn = self.ledger.begin(&defender_id).await?;
        txn.push_event(DomainEvent::ZoneDefended {
            zone_id,
            owner_id: defender_id,
            defense: zone.defense,
        });
        txn.award_ep(self.config.defend_ep, "zone defended", Some(zone_id))?;
        txn.advance_missions(MissionType::DefendZones, 1);
        let (ledger_batch, events, _user_guard) = txn.finish();
        batch.extend(ledger_batch);
        self.store.commit(batch);

        debug!(
            "User {} defended zone {}, defense now {}",
            defender_id, zone_id, zone.defense
        );
        Ok(DefendResult { zone, events })
    }

    /// Give up a safe zone. The cell reverts to neutral ground.
    pub async fn abandon_zone(&self, zone_id: CellId, user_id: UserId) -> Result<Vec<DomainEvent>> {
        let _zone_guard = self.zone_locks.try_acquire(&zone_id).ok_or(Error::Locked)?;
        let zone = self.store.zone(&zone_id).ok_or(Error::NotFound("zone"))?;
        if zone.owner != Some(user_id) {
            return Err(Error::NotOwner);
        }
        if zone.status != ZoneStatus::Safe {
            return Err(Error::InvalidParameter(
                "cannot abandon a contested zone".into(),
            ));
        }

        let now = Utc::now();
        let mut batch = WriteBatch::new();
        batch.delete_zone(zone_id);
        batch.push_activity(ActivityEntry {
            id: Uuid::new_v4(),
            user_id,
            kind: ActivityKind::ZoneAbandoned,
            zone_id: Some(zone_id),
            ep_change: 0,
            respect_change: 0,
            details: "zone abandoned".to_string(),
            created_at: now,
        });
        self.store.commit(batch);

        info!("User {} abandoned zone {}", user_id, zone_id);
        Ok(vec![DomainEvent::ZoneAbandoned {
            zone_id,
            previous_owner: user_id,
        }])
    }

    /// Whether `(lat, lon)` is close enough to the zone's centroid to
    /// engage it. Pure read: no lock, no state change.
    pub fn is_in_attack_range(&self, zone_id: CellId, lat: f64, lon: f64) -> Result<bool> {
        // Validates the coordinate the same way quantization does
        cell_id(lat, lon)?;
        let zone = self.store.zone(&zone_id).ok_or(Error::NotFound("zone"))?;
        let distance = haversine_distance_m(zone.centroid(), (lat, lon));
        Ok(distance <= self.config.attack_range_m)
    }

    // Unlocked snapshot reads for the API layer.

    pub fn zone(&self, zone_id: &CellId) -> Option<Zone> {
        self.store.zone(zone_id)
    }

    pub fn user(&self, user_id: &UserId) -> Option<User> {
        self.store.user(user_id)
    }

    pub fn zones_owned_by(&self, user_id: &UserId) -> Vec<Zone> {
        self.store.zones_owned_by(user_id)
    }

    pub fn leaderboard(&self, n: usize) -> Vec<User> {
        self.store.leaderboard(n)
    }
}

fn notification_for(
    user_id: UserId,
    kind: NotificationKind,
    title: &str,
    message: &str,
    payload: serde_json::Value,
    now: DateTime<Utc>,
) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        user_id,
        kind,
        title: title.to_string(),
        message: message.to_string(),
        payload,
        read: false,
        created_at: now,
    }
}
