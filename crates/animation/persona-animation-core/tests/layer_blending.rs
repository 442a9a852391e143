use persona_animation_core::{AnimationFeature, BlendMode, Clip, LayerOptions, PlayOptions};
use persona_host_core::{Feature, Pose};

fn approx(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps
}

fn pose(items: &[(&str, f32)]) -> Pose {
    let mut p = Pose::new();
    for (channel, value) in items {
        p.set(*channel, *value);
    }
    p
}

fn constant(name: &str, items: &[(&str, f32)]) -> Clip {
    Clip::constant(name, &pose(items))
}

#[test]
fn override_weights_are_normalised() {
    let mut anim = AnimationFeature::new();
    anim.add_layer("base", LayerOptions::default()).unwrap();
    anim.add_state("base", "a", constant("a", &[("jaw", 0.0)]), true).unwrap();
    anim.add_state("base", "b", constant("b", &[("jaw", 1.0)]), true).unwrap();
    anim.set_state_weight("base", "a", 1.0).unwrap();
    anim.set_state_weight("base", "b", 1.0).unwrap();
    anim.set_state_weight("base", "a", 3.0).unwrap();
    assert_eq!(anim.state_weight("base", "a").unwrap(), 1.0);

    let layer = anim.layer("base").unwrap();
    let weights = layer.contribution_weights();
    let total: f32 = weights.iter().map(|(_, w)| w).sum();
    assert!(approx(total, 1.0, 1e-6));

    step(&mut anim);
    assert!(approx(anim.pose().weight("jaw"), 0.5, 1e-6));
}

#[test]
fn additive_layer_adds_onto_override_result() {
    let mut anim = AnimationFeature::new();
    anim.add_layer("base", LayerOptions::default()).unwrap();
    let viseme = anim.add_layer("viseme", LayerOptions::additive()).unwrap();
    assert_eq!(anim.layer("viseme").unwrap().blend_mode(), BlendMode::Additive);

    anim.add_state("base", "rest", constant("rest", &[("jaw", 0.2)]), true).unwrap();
    anim.add_state(&viseme, "AA", constant("AA", &[("jaw", 0.5), ("lips", 1.0)]), false)
        .unwrap();
    anim.set_state_weight("base", "rest", 1.0).unwrap();
    anim.set_state_weight(&viseme, "AA", 0.5).unwrap();

    step(&mut anim);
    assert!(approx(anim.pose().weight("jaw"), 0.45, 1e-6));
    assert!(approx(anim.pose().weight("lips"), 0.5, 1e-6));
}

#[test]
fn layers_compose_in_registration_order() {
    let build = |additive_first: bool| {
        let mut anim = AnimationFeature::new();
        let order: [(&str, LayerOptions); 2] = if additive_first {
            [("add", LayerOptions::additive()), ("over", LayerOptions::default())]
        } else {
            [("over", LayerOptions::default()), ("add", LayerOptions::additive())]
        };
        for (name, options) in order {
            anim.add_layer(name, options).unwrap();
        }
        anim.add_state("over", "s", constant("s", &[("jaw", 0.2)]), true).unwrap();
        anim.add_state("add", "d", constant("d", &[("jaw", 0.5)]), true).unwrap();
        anim.set_state_weight("over", "s", 1.0).unwrap();
        anim.set_state_weight("add", "d", 1.0).unwrap();
        step(&mut anim);
        anim.pose().weight("jaw")
    };
    assert!(approx(build(false), 0.7, 1e-6));
    assert!(approx(build(true), 0.2, 1e-6));
}

#[test]
fn layer_weight_scales_override() {
    let mut anim = AnimationFeature::new();
    anim.add_layer("base", LayerOptions::default()).unwrap();
    anim.add_layer("top", LayerOptions::default().with_weight(0.5)).unwrap();
    anim.add_state("base", "open", constant("open", &[("jaw", 1.0)]), true).unwrap();
    anim.add_state("top", "closed", constant("closed", &[("jaw", 0.0)]), true).unwrap();
    anim.set_state_weight("base", "open", 1.0).unwrap();
    anim.set_state_weight("top", "closed", 1.0).unwrap();

    step(&mut anim);
    assert!(approx(anim.pose().weight("jaw"), 0.5, 1e-6));

    anim.set_layer_weight("top", 0.0).unwrap();
    step(&mut anim);
    assert!(approx(anim.pose().weight("jaw"), 1.0, 1e-6));
}

#[test]
fn additive_weights_respect_layer_range() {
    let mut anim = AnimationFeature::new();
    anim.add_layer("viseme", LayerOptions::additive().with_additive_range(0.0, 0.5))
        .unwrap();
    anim.add_state("viseme", "PP", constant("PP", &[("lips", 1.0)]), false).unwrap();
    anim.set_state_weight("viseme", "PP", 2.0).unwrap();
    assert_eq!(anim.state_weight("viseme", "PP").unwrap(), 0.5);
    step(&mut anim);
    assert!(approx(anim.pose().weight("lips"), 0.5, 1e-6));
}

#[test]
fn additive_reference_is_subtracted() {
    let mut anim = AnimationFeature::new();
    anim.add_layer("breath", LayerOptions::additive()).unwrap();
    let clip = Clip::new("breath", 2.0)
        .with_track("chest", &[(0.0, 1.0), (2.0, 1.0)])
        .with_reference(pose(&[("chest", 0.75)]));
    anim.add_state("breath", "breath", clip, true).unwrap();
    anim.play_animation("breath", "breath", PlayOptions::new().with_transition(0.0))
        .unwrap();
    step(&mut anim);
    assert!(approx(anim.pose().weight("chest"), 0.25, 1e-6));
}

#[test]
fn duplicate_state_names_are_suffixed_and_removable() {
    let mut anim = AnimationFeature::new();
    anim.add_layer("base", LayerOptions::default()).unwrap();
    let first = anim.add_state("base", "idle", constant("idle", &[]), true).unwrap();
    let second = anim.add_state("base", "idle", constant("idle", &[]), true).unwrap();
    assert_eq!((first.as_str(), second.as_str()), ("idle", "idle_1"));
    anim.remove_state("base", "idle_1").unwrap();
    assert!(anim.remove_state("base", "idle_1").is_err());
    anim.remove_layer("base").unwrap();
    assert_eq!(anim.layer_names().count(), 0);
}

fn step(anim: &mut AnimationFeature) {
    // Not installed on a host, so drive the hook directly.
    Feature::updated(anim, 0.016).expect("tick");
}

#[test]
fn idle_additive_states_report_zero_channels() {
    let mut anim = AnimationFeature::new();
    anim.add_layer("viseme", LayerOptions::additive()).unwrap();
    anim.add_state("viseme", "AA", constant("AA", &[("jawOpen", 0.7)]), false).unwrap();
    anim.add_state("viseme", "PP", constant("PP", &[("mouthClose", 1.0)]), false).unwrap();

    anim.set_state_weight("viseme", "AA", 1.0).unwrap();
    step(&mut anim);
    assert!(approx(anim.pose().weight("jawOpen"), 0.7, 1e-6));
    assert_eq!(anim.pose().get("mouthClose"), Some(0.0));

    anim.set_state_weight("viseme", "AA", 0.0).unwrap();
    step(&mut anim);
    assert_eq!(anim.pose().get("jawOpen"), Some(0.0));
    assert_eq!(anim.pose().get("mouthClose"), Some(0.0));
}
