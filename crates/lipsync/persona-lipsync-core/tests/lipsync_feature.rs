use std::cell::RefCell;
use std::rc::Rc;

use persona_animation_core::{AnimationFeature, Clip, LayerOptions, PlayOptions};
use persona_host_core::{DeferredState, HostEntity, HostError, Outcome};
use persona_lipsync_core::{
    parse_polly_marks, AudioClock, LipsyncFeature, LipsyncOutcome, ManualClock, PlaybackPhase,
    SpeechMark, VisemeMap, LIPSYNC_ERROR_EVENT, LIPSYNC_FEATURE_NAME, LIPSYNC_FINISHED_EVENT,
    LIPSYNC_STOP_EVENT, LIPSYNC_VISEME_EVENT, SPEECH_STOP_EVENT,
};
use persona_test_fixtures::{speech_marks, viseme_maps};
use serde_json::Value;

fn host_with_lipsync() -> HostEntity {
    let mut host = HostEntity::new("ava");
    host.add_feature(LipsyncFeature::new()).expect("install lipsync");
    host
}

fn lipsync(host: &mut HostEntity) -> &mut LipsyncFeature {
    host.feature_mut::<LipsyncFeature>(LIPSYNC_FEATURE_NAME)
        .expect("lipsync feature")
}

fn count(host: &HostEntity, event: &'static str) -> Rc<RefCell<Vec<Value>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    host.bus().subscribe(event, move |ev| {
        s.borrow_mut().push(ev.payload.clone());
        Ok(())
    });
    seen
}

fn two_marks() -> Vec<SpeechMark> {
    vec![SpeechMark::new(0.0, "AA"), SpeechMark::new(1000.0, "PP")]
}

#[test]
fn polly_fixture_plays_to_completion() {
    let mut host = host_with_lipsync();
    let visemes = count(&host, LIPSYNC_VISEME_EVENT);
    let finished = count(&host, LIPSYNC_FINISHED_EVENT);

    let marks = parse_polly_marks(&speech_marks::text("hello").expect("fixture")).expect("parse");
    assert_eq!(marks.len(), 8);
    let audio_ms = speech_marks::audio_ms("hello").expect("entry").expect("audio length");

    let clock = ManualClock::new();
    let done = lipsync(&mut host)
        .play_marks(&marks, clock.clone())
        .expect("play");
    assert_eq!(lipsync(&mut host).phase(), PlaybackPhase::Scheduled);

    host.update(0.016);
    assert_eq!(lipsync(&mut host).phase(), PlaybackPhase::Playing);
    for _ in 0..4 {
        clock.advance_ms(16.0);
        host.update(0.016);
    }
    assert!(host.pose().weight("viseme_KK") > 0.5);

    while clock.current_time_ms() < audio_ms && done.is_pending() {
        clock.advance_ms(16.0);
        host.update(0.016);
    }
    assert_eq!(done.outcome(), Some(Outcome::Resolved(LipsyncOutcome::Finished)));
    assert_eq!(visemes.borrow().len(), 8);
    assert_eq!(visemes.borrow()[0]["viseme"], "KK");
    assert_eq!(visemes.borrow()[0]["mark"]["value"], "k");
    assert_eq!(finished.borrow().len(), 1);

    for _ in 0..20 {
        host.update(0.016);
    }
    assert!(lipsync(&mut host).scheduler().is_at_rest());
    assert!(host.pose().iter().all(|(_, w)| w == 0.0));
    assert_eq!(host.pose().get("viseme_KK"), Some(0.0));
    assert_eq!(host.pose().get("viseme_OU"), Some(0.0));
}

#[test]
fn stop_eases_to_neutral_and_resolves_stopped() {
    let mut host = host_with_lipsync();
    let stops = count(&host, LIPSYNC_STOP_EVENT);
    let clock = ManualClock::new();
    let done = lipsync(&mut host).play_marks(&two_marks(), clock.clone()).unwrap();
    for _ in 0..3 {
        host.update(0.05);
        clock.advance_ms(50.0);
    }
    assert_eq!(host.pose().weight("viseme_AA"), 1.0);

    assert!(lipsync(&mut host).stop().unwrap());
    assert!(!lipsync(&mut host).stop().unwrap());
    assert_eq!(done.outcome(), Some(Outcome::Resolved(LipsyncOutcome::Stopped)));
    assert_eq!(stops.borrow().len(), 1);
    assert_eq!(lipsync(&mut host).phase(), PlaybackPhase::Finished);

    host.update(0.05);
    let mid = host.pose().weight("viseme_AA");
    assert!(mid > 0.0 && mid < 1.0, "AA={mid}");
    for _ in 0..3 {
        host.update(0.05);
        assert!(host.pose().get("viseme_AA").is_some());
    }
    assert_eq!(host.pose().get("viseme_AA"), Some(0.0));
    assert_eq!(host.pose().get("viseme_PP"), Some(0.0));
}

#[test]
fn speech_stop_event_stops_on_next_update() {
    let mut host = host_with_lipsync();
    let clock = ManualClock::new();
    let done = lipsync(&mut host).play_marks(&two_marks(), clock.clone()).unwrap();
    host.update(0.016);

    host.bus().emit("TextToSpeechFeature", SPEECH_STOP_EVENT, Value::Null);
    assert!(done.is_pending());
    host.update(0.016);
    assert_eq!(done.outcome(), Some(Outcome::Resolved(LipsyncOutcome::Stopped)));
}

#[test]
fn audio_failure_rejects_playback() {
    let mut host = host_with_lipsync();
    let errors = count(&host, LIPSYNC_ERROR_EVENT);
    let clock = ManualClock::new();
    let done = lipsync(&mut host).play_marks(&two_marks(), clock.clone()).unwrap();
    host.update(0.016);
    clock.fail("decoder error");
    host.update(0.016);

    assert_eq!(
        done.outcome(),
        Some(Outcome::Rejected(HostError::upstream("decoder error")))
    );
    assert_eq!(errors.borrow().len(), 1);
    assert_eq!(lipsync(&mut host).phase(), PlaybackPhase::Finished);
}

#[test]
fn invalid_marks_leave_playback_untouched() {
    let mut host = host_with_lipsync();
    let clock = ManualClock::new();
    let done = lipsync(&mut host).play_marks(&two_marks(), clock.clone()).unwrap();
    host.update(0.016);

    let err = lipsync(&mut host)
        .play_marks(&[SpeechMark::new(0.0, "zz")], ManualClock::new())
        .unwrap_err();
    assert!(matches!(err, HostError::NotFound { ref kind, .. } if kind == "viseme"));
    let err = lipsync(&mut host)
        .play_marks(&[SpeechMark::new(-5.0, "AA")], ManualClock::new())
        .unwrap_err();
    assert_eq!(err.category(), "parse");

    assert!(done.is_pending());
    assert_eq!(lipsync(&mut host).phase(), PlaybackPhase::Playing);
}

#[test]
fn replacing_playback_cancels_previous_deferred() {
    let mut host = host_with_lipsync();
    let first = lipsync(&mut host).play_marks(&two_marks(), ManualClock::new()).unwrap();
    host.update(0.016);
    let second = lipsync(&mut host)
        .play_marks(&[SpeechMark::new(0.0, "E")], ManualClock::new())
        .unwrap();
    assert_eq!(first.state(), DeferredState::Cancelled);
    assert!(second.is_pending());
    assert_eq!(lipsync(&mut host).phase(), PlaybackPhase::Scheduled);
}

#[test]
fn viseme_map_swaps_only_when_idle() {
    let arkit: VisemeMap = viseme_maps::load("arkit").expect("map fixture");
    let mut host = host_with_lipsync();
    let clock = ManualClock::new();
    let done = lipsync(&mut host).play_marks(&two_marks(), clock.clone()).unwrap();

    let err = lipsync(&mut host).set_viseme_map(arkit.clone()).unwrap_err();
    assert_eq!(err.category(), "invalid_state");

    clock.complete();
    host.update(0.016);
    assert_eq!(done.outcome(), Some(Outcome::Resolved(LipsyncOutcome::Finished)));

    let clock = ManualClock::new();
    lipsync(&mut host)
        .play_marks_with_map(&[SpeechMark::new(0.0, "o")], clock.clone(), arkit)
        .expect("play with arkit map");
    for _ in 0..6 {
        host.update(0.016);
        clock.advance_ms(16.0);
    }
    assert!((host.pose().weight("mouthFunnel") - 0.6).abs() < 1e-4);
    assert!((host.pose().weight("jawOpen") - 0.5).abs() < 1e-4);
    assert_eq!(host.pose().get("viseme_OH"), None);
}

#[test]
fn play_requires_installation() {
    let mut feature = LipsyncFeature::new();
    let err = feature
        .play_marks(&two_marks(), ManualClock::new())
        .unwrap_err();
    assert_eq!(err.category(), "invalid_state");
}

#[test]
fn discard_cancels_playback() {
    let mut host = host_with_lipsync();
    let done = lipsync(&mut host).play_marks(&two_marks(), ManualClock::new()).unwrap();
    let mut removed = host.remove_feature(LIPSYNC_FEATURE_NAME).expect("remove");
    assert_eq!(done.state(), DeferredState::Cancelled);
    assert!(removed.update(0.016).is_err());
    assert_eq!(host.bus().listener_count(SPEECH_STOP_EVENT), 0);
}

#[test]
fn lipsync_layers_over_body_animation() {
    let mut body = AnimationFeature::new();
    body.add_layer("base", LayerOptions::default()).unwrap();
    let idle = Clip::new("idle", 1.0).with_track("headNod", &[(0.0, 0.1), (1.0, 0.1)]);
    body.add_state("base", "idle", idle, true).unwrap();
    body.play_animation("base", "idle", PlayOptions::new().with_transition(0.0))
        .unwrap();

    let mut host = HostEntity::new("ava");
    host.add_feature(body).unwrap();
    host.add_feature(LipsyncFeature::new()).unwrap();
    assert_eq!(
        host.feature_names().collect::<Vec<_>>(),
        ["AnimationFeature", "LipsyncFeature"]
    );

    let clock = ManualClock::new();
    lipsync(&mut host).play_marks(&two_marks(), clock.clone()).unwrap();
    for _ in 0..3 {
        host.update(0.05);
        clock.advance_ms(50.0);
    }
    assert!((host.pose().weight("headNod") - 0.1).abs() < 1e-6);
    assert_eq!(host.pose().weight("viseme_AA"), 1.0);
}
