use chrono::Utc;
use turf_engine::model::{Mission, MissionStatus, MissionType, NotificationKind, ZoneStatus};
use turf_engine::store::WriteBatch;
use turf_engine::{DomainEvent, Engine, EngineConfig, Error, Store};
use turf_grid::CellId;
use uuid::Uuid;

const LAT: f64 = 12.9716;
const LON: f64 = 77.5946;

fn engine() -> Engine {
    Engine::new(Store::new(), EngineConfig::default())
}

async fn owned_zone(engine: &Engine, owner: Uuid) -> CellId {
    engine.capture_zone(LAT, LON, owner).await.unwrap();
    turf_grid::cell_id(LAT, LON).unwrap()
}

/// Give a user a mission the starter set does not include.
fn grant_mission(engine: &Engine, user_id: Uuid, mission_type: MissionType, target: u32) {
    let mut batch = WriteBatch::new();
    batch.put_mission(Mission {
        id: Uuid::new_v4(),
        user_id,
        mission_type,
        target,
        current: 0,
        reward_ep: 40,
        status: MissionStatus::Active,
        expires_at: Utc::now() + chrono::Duration::days(7),
        completed_at: None,
    });
    engine.store().commit(batch);
}

#[tokio::test]
async fn test_lethal_attack_transfers_ownership() {
    let engine = engine();
    let (alice, _) = engine.register_user("alice", "#ff0000").unwrap();
    let (bob, _) = engine.register_user("bob", "#0000ff").unwrap();
    let cell = owned_zone(&engine, alice.id).await;
    grant_mission(&engine, bob.id, MissionType::WinBattles, 3);

    let result = engine.attack_zone(cell, bob.id, Some(50)).await.unwrap();
    assert!(result.captured);
    assert_eq!(result.zone.owner, Some(bob.id));
    assert_eq!(result.zone.defense, 50);
    assert_eq!(result.zone.status, ZoneStatus::Safe);

    // Attacker rewarded, both sides notified
    assert_eq!(engine.user(&bob.id).unwrap().total_ep, 25);
    assert!(engine
        .store()
        .notifications_for(&alice.id)
        .iter()
        .any(|n| n.kind == NotificationKind::ZoneLost));
    assert!(engine
        .store()
        .notifications_for(&bob.id)
        .iter()
        .any(|n| n.kind == NotificationKind::ZoneCaptured));

    // Attacker's capture_zones and win_battles missions both advance
    let missions = engine.store().missions_for(&bob.id);
    let by_type = |t| {
        missions
            .iter()
            .find(|m| m.mission_type == t)
            .unwrap()
            .current
    };
    assert_eq!(by_type(MissionType::CaptureZones), 1);
    assert_eq!(by_type(MissionType::WinBattles), 1);

    assert!(result
        .events
        .iter()
        .any(|e| matches!(e, DomainEvent::ZoneLost { .. })));
}

#[tokio::test]
async fn test_partial_attack_damages_without_notifying_owner() {
    let engine = engine();
    let (alice, _) = engine.register_user("alice", "#ff0000").unwrap();
    let (bob, _) = engine.register_user("bob", "#0000ff").unwrap();
    let cell = owned_zone(&engine, alice.id).await;
    let owner_notifications_before = engine.store().notifications_for(&alice.id).len();

    let result = engine.attack_zone(cell, bob.id, Some(10)).await.unwrap();
    assert!(!result.captured);
    assert_eq!(result.zone.owner, Some(alice.id));
    assert_eq!(result.zone.defense, 40);
    assert_eq!(result.zone.status, ZoneStatus::UnderAttack);
    assert!(result.zone.last_attack_at.is_some());

    // Attacker gets the small hit reward and an activity entry; the owner
    // hears nothing about partial damage
    assert_eq!(engine.user(&bob.id).unwrap().total_ep, 2);
    assert_eq!(engine.store().activity_for(&bob.id).len(), 1);
    assert_eq!(
        engine.store().notifications_for(&alice.id).len(),
        owner_notifications_before
    );
}

#[tokio::test]
async fn test_attack_uses_default_power() {
    let engine = engine();
    let (alice, _) = engine.register_user("alice", "#ff0000").unwrap();
    let (bob, _) = engine.register_user("bob", "#0000ff").unwrap();
    let cell = owned_zone(&engine, alice.id).await;

    let result = engine.attack_zone(cell, bob.id, None).await.unwrap();
    assert_eq!(result.zone.defense, 40);
}

#[tokio::test]
async fn test_attack_validation() {
    let engine = engine();
    let (alice, _) = engine.register_user("alice", "#ff0000").unwrap();
    let (bob, _) = engine.register_user("bob", "#0000ff").unwrap();
    let cell = owned_zone(&engine, alice.id).await;

    // Power bounds
    for power in [0u8, 51, 200] {
        assert!(matches!(
            engine.attack_zone(cell, bob.id, Some(power)).await.unwrap_err(),
            Error::InvalidParameter(_)
        ));
    }

    // Own zone
    assert!(matches!(
        engine.attack_zone(cell, alice.id, Some(10)).await.unwrap_err(),
        Error::SelfAttack
    ));

    // Absent zone
    let nowhere = turf_grid::cell_id(48.8566, 2.3522).unwrap();
    assert!(matches!(
        engine.attack_zone(nowhere, bob.id, Some(10)).await.unwrap_err(),
        Error::NotFound("zone")
    ));

    // Nothing above changed state
    assert_eq!(engine.zone(&cell).unwrap().defense, 50);
    assert_eq!(engine.user(&bob.id).unwrap().total_ep, 0);
}

#[tokio::test]
async fn test_defend_requires_ownership() {
    let engine = engine();
    let (alice, _) = engine.register_user("alice", "#ff0000").unwrap();
    let (carol, _) = engine.register_user("carol", "#00ff00").unwrap();
    let cell = owned_zone(&engine, alice.id).await;

    let err = engine.defend_zone(cell, carol.id, Some(10)).await.unwrap_err();
    assert!(matches!(err, Error::NotOwner));

    // No state change at all
    assert_eq!(engine.zone(&cell).unwrap().defense, 50);
    assert_eq!(engine.user(&carol.id).unwrap().total_ep, 0);
    assert!(engine.store().activity_for(&carol.id).is_empty());
}

#[tokio::test]
async fn test_defend_boosts_and_rescues_contested_zone() {
    let engine = engine();
    let (alice, _) = engine.register_user("alice", "#ff0000").unwrap();
    let (bob, _) = engine.register_user("bob", "#0000ff").unwrap();
    let cell = owned_zone(&engine, alice.id).await;

    // Two hits: defense 50 -> 30, contested
    engine.attack_zone(cell, bob.id, Some(10)).await.unwrap();
    engine.attack_zone(cell, bob.id, Some(10)).await.unwrap();
    assert_eq!(engine.zone(&cell).unwrap().status, ZoneStatus::UnderAttack);

    // +30 -> 60, still below the safe threshold
    let result = engine.defend_zone(cell, alice.id, Some(30)).await.unwrap();
    assert_eq!(result.zone.defense, 60);
    assert_eq!(result.zone.status, ZoneStatus::UnderAttack);

    // +10 -> 70 settles the zone
    let result = engine.defend_zone(cell, alice.id, Some(10)).await.unwrap();
    assert_eq!(result.zone.defense, 70);
    assert_eq!(result.zone.status, ZoneStatus::Safe);

    // Defender rewarded per defend, mission advanced
    assert_eq!(engine.user(&alice.id).unwrap().total_ep, 10 + 5 + 5);
    let missions = engine.store().missions_for(&alice.id);
    let defends = missions
        .iter()
        .find(|m| m.mission_type == MissionType::DefendZones)
        .unwrap();
    assert_eq!(defends.current, 2);
}

#[tokio::test]
async fn test_defend_validation_and_clamp() {
    let engine = engine();
    let (alice, _) = engine.register_user("alice", "#ff0000").unwrap();
    let cell = owned_zone(&engine, alice.id).await;

    for boost in [0u8, 31, 255] {
        assert!(matches!(
            engine.defend_zone(cell, alice.id, Some(boost)).await.unwrap_err(),
            Error::InvalidParameter(_)
        ));
    }

    // Defense never exceeds 100
    for _ in 0..5 {
        engine.defend_zone(cell, alice.id, Some(30)).await.unwrap();
    }
    assert_eq!(engine.zone(&cell).unwrap().defense, 100);
}

#[tokio::test]
async fn test_defense_stays_bounded_under_random_battles() {
    let engine = engine();
    let (alice, _) = engine.register_user("alice", "#ff0000").unwrap();
    let (bob, _) = engine.register_user("bob", "#0000ff").unwrap();
    let cell = owned_zone(&engine, alice.id).await;

    let mut last_ep = (0u64, 0u64);
    for round in 0..200 {
        if round % 3 == 0 {
            let zone = engine.zone(&cell).unwrap();
            let owner = zone.owner.unwrap();
            // The current owner shores the zone up
            let _ = engine.defend_zone(cell, owner, Some(1 + (round % 30) as u8)).await;
        } else {
            let zone = engine.zone(&cell).unwrap();
            let attacker = if zone.owner == Some(alice.id) { bob.id } else { alice.id };
            let _ = engine
                .attack_zone(cell, attacker, Some(1 + (round % 50) as u8))
                .await;
        }

        let zone = engine.zone(&cell).unwrap();
        assert!(zone.defense <= 100, "defense out of range: {}", zone.defense);
        assert!(zone.owner.is_some());

        // EP only ever grows
        let ep = (
            engine.user(&alice.id).unwrap().total_ep,
            engine.user(&bob.id).unwrap().total_ep,
        );
        assert!(ep.0 >= last_ep.0 && ep.1 >= last_ep.1);
        last_ep = ep;
    }
}

#[tokio::test]
async fn test_attack_range_check_is_pure_and_idempotent() {
    let engine = engine();
    let (alice, _) = engine.register_user("alice", "#ff0000").unwrap();
    let cell = owned_zone(&engine, alice.id).await;
    let zone_before = engine.zone(&cell).unwrap();

    // Standing inside the cell is within range of its centroid
    for _ in 0..3 {
        assert!(engine.is_in_attack_range(cell, LAT, LON).unwrap());
    }
    // A kilometer away is not
    assert!(!engine.is_in_attack_range(cell, LAT + 0.01, LON).unwrap());

    assert!(matches!(
        engine.is_in_attack_range(cell, 91.0, 0.0).unwrap_err(),
        Error::InvalidCoordinate(_)
    ));
    let missing = turf_grid::cell_id(0.0, 0.0).unwrap();
    assert!(matches!(
        engine.is_in_attack_range(missing, 0.0, 0.0).unwrap_err(),
        Error::NotFound("zone")
    ));

    // Nothing moved
    let zone_after = engine.zone(&cell).unwrap();
    assert_eq!(zone_after.defense, zone_before.defense);
    assert_eq!(zone_after.status, zone_before.status);
}
