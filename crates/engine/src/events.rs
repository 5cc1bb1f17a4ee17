//! Domain events emitted by mutating operations.
//!
//! The engine has no transport of its own: each operation returns the events
//! it emitted, in emission order, and the delivery layer fans them out to
//! connected clients. Notification rows persist the player-facing subset.

use crate::model::{MissionType, UserId};
use serde::Serialize;
use turf_grid::CellId;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    UserRegistered {
        user_id: UserId,
        username: String,
    },
    ZoneCaptured {
        zone_id: CellId,
        user_id: UserId,
        defense: u8,
    },
    ZoneReinforced {
        zone_id: CellId,
        owner_id: UserId,
        defense: u8,
    },
    ZoneUnderAttack {
        zone_id: CellId,
        owner_id: UserId,
        attacker_id: UserId,
    },
    ZoneDamaged {
        zone_id: CellId,
        attacker_id: UserId,
        defense: u8,
    },
    ZoneDefended {
        zone_id: CellId,
        owner_id: UserId,
        defense: u8,
    },
    ZoneLost {
        zone_id: CellId,
        previous_owner: UserId,
        new_owner: UserId,
    },
    ZoneAbandoned {
        zone_id: CellId,
        previous_owner: UserId,
    },
    EpEarned {
        user_id: UserId,
        amount: u64,
        total_ep: u64,
    },
    LevelUp {
        user_id: UserId,
        old_level: u8,
        new_level: u8,
    },
    MissionCompleted {
        user_id: UserId,
        mission_id: Uuid,
        mission_type: MissionType,
        reward_ep: u64,
    },
}
