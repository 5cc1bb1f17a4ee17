//! Domain entities. Plain data; all mutation goes through the engine and
//! the progression ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turf_grid::{CellId, Rect};
use uuid::Uuid;

pub type UserId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub color_hex: String,
    pub total_ep: u64,
    pub respect_level: u8,
    /// Last reported location, maintained by the location-ping API, not
    /// the engine.
    pub last_seen: Option<(f64, f64)>,
    pub created_at: DateTime<Utc>,
}

/// Derived respect level for a running EP total.
///
/// `clamp(1, 100, 1 + floor(sqrt(total_ep / 100)))`: level 2 at 100 EP,
/// level 3 at 400 EP, capped at 100.
pub fn respect_level_for(total_ep: u64) -> u8 {
    let gained = (total_ep as f64 / 100.0).sqrt().floor();
    (1.0 + gained).clamp(1.0, 100.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    Neutral,
    Safe,
    UnderAttack,
    /// Reserved by the schema; no operation currently produces it.
    War,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: CellId,
    pub bounds: Rect,
    pub owner: Option<UserId>,
    /// Health of the zone, always within `[0, 100]`.
    pub defense: u8,
    pub status: ZoneStatus,
    pub captured_at: Option<DateTime<Utc>>,
    pub last_attack_at: Option<DateTime<Utc>>,
}

impl Zone {
    pub fn centroid(&self) -> (f64, f64) {
        self.bounds.centroid()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    CaptureZones,
    DefendZones,
    /// Reserved by the schema; never advanced by the engine.
    WalkDistance,
    EarnEp,
    WinBattles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Active,
    Completed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: Uuid,
    pub user_id: UserId,
    pub mission_type: MissionType,
    pub target: u32,
    /// Monotonically non-decreasing while active, never exceeds `target`.
    pub current: u32,
    pub reward_ep: u64,
    pub status: MissionStatus,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ZoneCaptured,
    ZoneUnderAttack,
    ZoneLost,
    LevelUp,
    MissionCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
    /// Created unread; flipped by the notification API, never by the engine.
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    EpEarned,
    RespectGained,
    MissionCompleted,
    ZoneAbandoned,
}

/// Append-only audit record of everything the ledger did to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: ActivityKind,
    pub zone_id: Option<CellId>,
    pub ep_change: i64,
    pub respect_change: i32,
    pub details: String,
    pub created_at: DateTime<Utc>,
}
