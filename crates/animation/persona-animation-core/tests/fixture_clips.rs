use persona_animation_core::{AnimationFeature, Clip, LayerOptions, PlayOptions};
use persona_host_core::Feature;
use persona_test_fixtures::clips;

fn approx(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps
}

#[test]
fn fixture_clips_parse_and_validate() {
    for name in clips::keys() {
        let clip: Clip = clips::load(&name).expect("clip fixture");
        clip.validate().expect("fixture clip should validate");
        assert!(clip.duration > 0.0, "{name} should have a duration");
    }
}

#[test]
fn idle_fixture_samples_between_keys() {
    let idle: Clip = clips::load("idle").expect("idle");
    let pose = idle.sample(1.0);
    assert!(approx(pose.weight("browInnerUp"), 0.075, 1e-6));
    assert!(approx(idle.sample(3.9).weight("eyeBlinkLeft"), 1.0, 1e-6));
}

#[test]
fn talk_over_idle_shares_channels() {
    let idle: Clip = clips::load("idle").expect("idle");
    let talk: Clip = clips::load("talk").expect("talk");
    let mut anim = AnimationFeature::new();
    anim.add_layer("base", LayerOptions::default()).unwrap();
    anim.add_state("base", "idle", idle, true).unwrap();
    anim.add_state("base", "talk", talk, true).unwrap();

    anim.play_animation("base", "talk", PlayOptions::new().with_transition(0.0))
        .unwrap();
    Feature::updated(&mut anim, 0.0).unwrap();
    assert!(approx(anim.pose().weight("browInnerUp"), 0.3, 1e-6));
    assert_eq!(anim.pose().get("eyeBlinkLeft"), None);
}
