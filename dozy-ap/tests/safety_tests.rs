//! Safe volume service tests
//!
//! Session timing uses tokio's paused clock: `tokio::time::advance` moves the
//! service's notion of "now" without sleeping.

mod helpers;

use dozy_ap::safety::service::{KEY_CEILING, KEY_ENABLED, KEY_LIFETIME_SECS};
use dozy_ap::safety::{SafetyConfig, MAX_CEILING, MIN_CEILING};
use dozy_ap::{EventBus, SafeVolumeService};
use dozy_common::settings::get_setting;
use dozy_common::{DozyEvent, MemorySettingsStore, SettingsStore, TomlSettingsStore};
use helpers::TestRig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::time::advance;

fn service() -> (SafeVolumeService, Arc<MemorySettingsStore>, Receiver<DozyEvent>) {
    let store = Arc::new(MemorySettingsStore::new());
    let events = EventBus::default();
    let rx = events.subscribe();
    let settings: Arc<dyn SettingsStore> = store.clone();
    (
        SafeVolumeService::new(SafetyConfig::default(), settings, events),
        store,
        rx,
    )
}

fn drain(rx: &mut Receiver<DozyEvent>) -> Vec<DozyEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_clamp_never_exceeds_ceiling() {
    let (svc, _, _) = service();
    for ceiling in [0.0, 0.1, 0.45, 0.7, 1.0] {
        let stored = svc.set_ceiling(ceiling);
        for i in -10..=30 {
            let g = i as f32 / 10.0;
            let clamped = svc.clamp(g);
            assert!(clamped <= stored, "{} > {}", clamped, stored);
            assert!(clamped <= 1.0);
            assert!(clamped >= 0.0);
        }
    }
}

#[test]
fn test_ceiling_is_clamped_into_range() {
    let (svc, store, _) = service();
    assert_eq!(svc.set_ceiling(0.05), MIN_CEILING);
    assert_eq!(svc.set_ceiling(0.95), MAX_CEILING);
    assert_eq!(svc.set_ceiling(0.5), 0.5);
    assert_eq!(svc.set_ceiling(svc.ceiling()), 0.5);

    let persisted: f32 = get_setting(store.as_ref(), KEY_CEILING).unwrap().unwrap();
    assert_eq!(persisted, 0.5);
}

#[test]
fn test_enabled_flag_persists() {
    let (svc, store, mut rx) = service();
    svc.set_enabled(false);
    assert_eq!(
        get_setting::<bool>(store.as_ref(), KEY_ENABLED).unwrap(),
        Some(false)
    );
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [DozyEvent::SafetySettingsChanged { enabled: false, .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_session_duration_while_active_and_after_end() {
    let (svc, store, _) = service();
    svc.start_session();

    advance(Duration::from_secs(5)).await;
    let first = svc.session_duration();
    advance(Duration::from_secs(5)).await;
    let second = svc.session_duration();
    assert!(second > first);
    assert_eq!(second, Duration::from_secs(10));

    svc.end_session();
    assert_eq!(svc.session_duration(), Duration::ZERO);
    assert_eq!(svc.lifetime(), Duration::from_secs(10));
    assert_eq!(
        get_setting::<u64>(store.as_ref(), KEY_LIFETIME_SECS).unwrap(),
        Some(10)
    );
}

#[tokio::test(start_paused = true)]
async fn test_restarting_a_session_ends_the_previous_one() {
    let (svc, _, mut rx) = service();
    svc.start_session();
    advance(Duration::from_secs(30)).await;
    svc.start_session();

    assert_eq!(svc.lifetime(), Duration::from_secs(30));
    assert_eq!(svc.session_duration(), Duration::ZERO);

    let events = drain(&mut rx);
    assert!(matches!(
        events.as_slice(),
        [
            DozyEvent::SessionStarted { .. },
            DozyEvent::SessionEnded { session_secs: 30, lifetime_secs: 30, .. },
            DozyEvent::SessionStarted { .. },
        ]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_break_and_max_listening_events() {
    let (svc, _, mut rx) = service();
    svc.start_session();
    drain(&mut rx);

    advance(Duration::from_secs(44 * 60)).await;
    svc.tick();
    assert!(drain(&mut rx).is_empty());

    advance(Duration::from_secs(60)).await;
    svc.tick();
    svc.tick();
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], DozyEvent::BreakReminder { session_secs: 2700, .. }));

    advance(Duration::from_secs(15 * 60)).await;
    svc.tick();
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(events[0].is_safety_alert());
    assert!(matches!(events[0], DozyEvent::MaxListeningReached { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_volume_warning_respects_cooldown() {
    let store: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new());
    let events = EventBus::default();
    let mut rx = events.subscribe();
    let svc = SafeVolumeService::new(
        SafetyConfig {
            enabled: false,
            ..SafetyConfig::default()
        },
        store,
        events,
    );

    svc.clamp(0.65);
    svc.clamp(0.1);
    svc.clamp(0.9);
    let warnings = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, DozyEvent::VolumeWarning { .. }))
        .count();
    assert_eq!(warnings, 1);

    advance(Duration::from_secs(30 * 60)).await;
    svc.clamp(0.1);
    svc.clamp(0.9);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, DozyEvent::VolumeWarning { gain, .. } if *gain == 0.9)));
}

#[test]
fn test_settings_survive_restart_with_toml_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");

    {
        let store: Arc<dyn SettingsStore> = Arc::new(TomlSettingsStore::open(&path).unwrap());
        let svc = SafeVolumeService::new(SafetyConfig::default(), store, EventBus::default());
        svc.set_ceiling(0.35);
        svc.set_enabled(false);
    }

    let store: Arc<dyn SettingsStore> = Arc::new(TomlSettingsStore::open(&path).unwrap());
    let svc = SafeVolumeService::new(SafetyConfig::default(), store, EventBus::default());
    assert_eq!(svc.ceiling(), 0.35);
    assert!(!svc.is_enabled());
}

#[tokio::test(start_paused = true)]
async fn test_engine_tick_drives_session_alerts() {
    let rig = TestRig::new();
    rig.engine.start().await.unwrap();
    rig.engine.play_sound("rain", 0.3, true).await.unwrap();
    let mut rx = rig.events.subscribe();

    advance(Duration::from_secs(45 * 60)).await;
    rig.engine.tick(Duration::from_secs(1));

    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, DozyEvent::BreakReminder { .. })));

    rig.engine.stop().await.unwrap();
    let lifetime: u64 = get_setting(rig.store.as_ref(), KEY_LIFETIME_SECS)
        .unwrap()
        .unwrap();
    assert!(lifetime >= 45 * 60);
}
