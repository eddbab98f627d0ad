//! Mixer engine integration tests
//!
//! Every test runs a real engine over WAV fixtures with the null output, so
//! the render core is exercised on its own thread exactly as with a device.

mod helpers;

use dozy_ap::playback::EngineConfig;
use dozy_ap::safety::SafetyConfig;
use dozy_ap::Error;
use dozy_common::{DozyEvent, SafetyLevel, SoundDescriptor};
use helpers::TestRig;
use std::time::Duration;

fn drain(rx: &mut tokio::sync::broadcast::Receiver<DozyEvent>) -> Vec<DozyEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_rain_scenario_applies_ceiling() {
    let rig = TestRig::started().await;
    assert_eq!(rig.safety.set_ceiling(0.7), 0.7);

    rig.engine.play_sound("rain", 1.0, true).await.unwrap();

    assert_eq!(rig.engine.voice_gain("rain"), Some(0.7));
    assert!(rig.safety.current_warning_level() >= SafetyLevel::Caution);

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_sound_leaves_voices_unchanged() {
    let rig = TestRig::started().await;
    rig.engine.play_sound("rain", 0.3, true).await.unwrap();
    let before = rig.engine.active_voices();

    let result = rig.engine.play_sound("missing_sound", 0.3, true).await;
    assert!(matches!(result, Err(Error::AssetNotFound(ref id)) if id == "missing_sound"));

    let after = rig.engine.active_voices();
    assert_eq!(after.len(), before.len());
    assert_eq!(after[0].instance_id, before[0].instance_id);

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_undecodable_asset_is_decode_failure() {
    let rig = TestRig::started().await;
    std::fs::write(rig.assets.path().join("broken.wav"), b"not a wav file").unwrap();

    let result = rig.engine.play_sound("broken", 0.3, true).await;
    assert!(matches!(result, Err(Error::DecodeFailed { .. })));
    assert_eq!(rig.engine.voice_count(), 0);

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_same_identifier_has_one_voice() {
    let rig = TestRig::started().await;

    let first = rig.engine.play_sound("rain", 0.3, true).await.unwrap();
    assert_eq!(rig.engine.voice_count(), 1);
    let second = rig.engine.play_sound("rain", 0.5, false).await.unwrap();
    assert_eq!(rig.engine.voice_count(), 1);

    assert_ne!(first, second);
    let voice = &rig.engine.active_voices()[0];
    assert_eq!(voice.instance_id, second);
    assert_eq!(voice.gain, 0.5);
    assert!(!voice.looping);

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_voice_limit_rejects_new_identifiers() {
    let rig = TestRig::with_max_voices(2);
    rig.engine.start().await.unwrap();

    rig.engine.play_sound("rain", 0.3, true).await.unwrap();
    rig.engine.play_sound("fan", 0.3, true).await.unwrap();
    let before: Vec<_> = rig.engine.active_voices().into_iter().map(|v| v.instance_id).collect();

    let result = rig.engine.play_sound("waves", 0.3, true).await;
    assert!(matches!(result, Err(Error::TooManyVoices { max: 2 })));

    let after: Vec<_> = rig.engine.active_voices().into_iter().map(|v| v.instance_id).collect();
    assert_eq!(before, after);

    // Replacing an existing identifier is still allowed at the limit
    rig.engine.play_sound("rain", 0.4, true).await.unwrap();
    assert_eq!(rig.engine.voice_count(), 2);

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_unknown_sound_is_noop() {
    let rig = TestRig::new();
    rig.engine.stop_sound("rain").unwrap();

    rig.engine.start().await.unwrap();
    rig.engine.play_sound("fan", 0.3, true).await.unwrap();
    rig.engine.stop_sound("rain").unwrap();
    assert_eq!(rig.engine.voice_count(), 1);

    rig.engine.stop_sound("fan").unwrap();
    rig.engine.stop_sound("fan").unwrap();
    assert_eq!(rig.engine.voice_count(), 0);

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_play_requires_started_engine() {
    let rig = TestRig::new();
    let result = rig.engine.play_sound("rain", 0.3, true).await;
    assert!(matches!(result, Err(Error::EngineNotRunning)));

    rig.engine.start().await.unwrap();
    rig.engine.play_sound("rain", 0.3, true).await.unwrap();
    rig.engine.stop().await.unwrap();

    let result = rig.engine.play_sound("rain", 0.3, true).await;
    assert!(matches!(result, Err(Error::EngineNotRunning)));
}

#[tokio::test]
async fn test_set_volume_unknown_is_voice_not_found() {
    let rig = TestRig::started().await;
    assert!(matches!(
        rig.engine.set_volume("rain", 0.3),
        Err(Error::VoiceNotFound(_))
    ));
    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_every_request_is_clamped() {
    let rig = TestRig::started().await;
    rig.engine.play_sound("rain", 0.1, true).await.unwrap();

    for requested in [-2.0, 0.0, 0.35, 0.6, 0.9, 1.0, 7.5, f32::NAN] {
        let applied = rig.engine.set_volume("rain", requested).unwrap();
        assert!(applied <= rig.safety.ceiling());
        assert!((0.0..=1.0).contains(&applied));
    }

    rig.safety.set_enabled(false);
    assert_eq!(rig.engine.set_volume("rain", 7.5).unwrap(), 1.0);

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_linear_fade_reaches_exact_target() {
    let rig = TestRig::with_config(
        EngineConfig::default(),
        SafetyConfig {
            enabled: false,
            ..SafetyConfig::default()
        },
    );
    rig.engine.start().await.unwrap();
    let mut rx = rig.events.subscribe();

    rig.engine.play_sound("rain", 0.3, true).await.unwrap();
    rig.engine.fade("rain", 0.8, Duration::from_secs(1)).unwrap();
    assert_eq!(rig.engine.voice_gain("rain"), Some(0.3));

    let mut previous = 0.3;
    for _ in 0..20 {
        rig.engine.tick(Duration::from_millis(50));
        let gain = rig.engine.voice_gain("rain").unwrap();
        assert!(gain >= previous, "fade went backwards: {} < {}", gain, previous);
        previous = gain;
    }

    assert_eq!(rig.engine.voice_gain("rain"), Some(0.8));
    assert!(!rig.engine.is_fading("rain"));
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, DozyEvent::FadeCompleted { gain, .. } if *gain == 0.8)));

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_replacing_a_voice_cancels_its_fade() {
    let rig = TestRig::started().await;
    rig.engine.play_sound("rain", 0.1, true).await.unwrap();
    rig.engine.fade("rain", 0.5, Duration::from_secs(2)).unwrap();
    rig.engine.tick(Duration::from_millis(50));

    rig.engine.play_sound("rain", 0.2, true).await.unwrap();
    assert!(!rig.engine.is_fading("rain"));
    rig.engine.tick(Duration::from_secs(3));
    assert_eq!(rig.engine.voice_gain("rain"), Some(0.2));

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_fade_out_and_stop() {
    let rig = TestRig::started().await;
    rig.engine.play_sound("rain", 0.5, true).await.unwrap();
    rig.engine.play_sound("fan", 0.5, true).await.unwrap();

    rig.engine
        .fade_out_and_stop("rain", Duration::from_millis(100))
        .unwrap();
    rig.engine.tick(Duration::from_millis(50));
    assert_eq!(rig.engine.voice_count(), 2);
    rig.engine.tick(Duration::from_millis(50));

    assert_eq!(rig.engine.voice_count(), 1);
    assert!(rig.engine.voice_gain("rain").is_none());
    assert!(rig.safety.is_session_active());

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_one_shot_voice_finishes() {
    let rig = TestRig::started().await;
    let mut rx = rig.events.subscribe();

    // Fixtures are 200 ms long
    rig.engine.play_sound("heartbeat", 0.3, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    rig.engine.tick(Duration::from_millis(50));

    assert_eq!(rig.engine.voice_count(), 0);
    assert!(!rig.safety.is_session_active());
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, DozyEvent::VoiceFinished { sound_id, .. } if sound_id == "heartbeat")));

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_render_output_respects_lowered_ceiling() {
    let rig = TestRig::started().await;
    rig.engine.play_sound("rain", 0.6, true).await.unwrap();
    rig.engine.play_sound("fan", 0.6, true).await.unwrap();

    // Lowering the ceiling takes effect in the render core and in the
    // reported gain without a new request
    rig.safety.set_ceiling(0.1);
    assert_eq!(rig.engine.voice_gain("rain"), Some(0.1));
    assert!(rig.engine.active_voices().iter().all(|v| v.gain <= 0.1));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let meter = rig.engine.output_meter().unwrap();
    assert!(meter.blocks_rendered() > 0);
    // Two voices at level 0.5, each limited to 0.1
    assert!(meter.last_peak() <= 0.1 + 1e-3, "peak {}", meter.last_peak());
    assert!(meter.last_peak() > 0.0);

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_descriptor_default_gain_is_applied() {
    let rig = TestRig::started().await;
    let descriptor = SoundDescriptor {
        default_gain_db: -6.0,
        ..SoundDescriptor::new("storm", "rain.wav")
    };

    rig.engine.play_descriptor(&descriptor, 0.5).await.unwrap();
    let gain = rig.engine.voice_gain("storm").unwrap();
    assert!((gain - 0.5 * descriptor.default_gain_linear()).abs() < 1e-6);
    assert!(rig.engine.active_voices()[0].looping);

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_session_follows_voice_count() {
    let rig = TestRig::started().await;
    assert!(!rig.safety.is_session_active());

    rig.engine.play_sound("rain", 0.3, true).await.unwrap();
    assert!(rig.safety.is_session_active());
    rig.engine.play_sound("fan", 0.3, true).await.unwrap();

    rig.engine.stop_sound("rain").unwrap();
    assert!(rig.safety.is_session_active());
    rig.engine.stop_sound("fan").unwrap();
    assert!(!rig.safety.is_session_active());
    assert_eq!(rig.safety.session_duration(), Duration::ZERO);

    rig.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_clears_everything() {
    let rig = TestRig::started().await;
    let mut rx = rig.events.subscribe();

    rig.engine.play_sound("rain", 0.3, true).await.unwrap();
    rig.engine.play_sound("fan", 0.3, true).await.unwrap();
    rig.engine.fade("fan", 0.0, Duration::from_secs(5)).unwrap();

    rig.engine.stop().await.unwrap();
    assert!(!rig.engine.is_running());
    assert_eq!(rig.engine.voice_count(), 0);
    assert!(!rig.engine.is_fading("fan"));
    assert!(!rig.safety.is_session_active());
    assert!(rig.engine.output_meter().is_none());

    let events = drain(&mut rx);
    let stopped = events
        .iter()
        .filter(|e| matches!(e, DozyEvent::VoiceStopped { .. }))
        .count();
    assert_eq!(stopped, 2);
    assert!(matches!(
        events.last(),
        Some(DozyEvent::EngineStateChanged { running: false, .. })
    ));

    // Restart works after a stop
    rig.engine.start().await.unwrap();
    rig.engine.play_sound("rain", 0.3, true).await.unwrap();
    rig.engine.stop().await.unwrap();
}
