use std::time::Duration;

use sensor_integration::{ChannelMotionSensor, MotionSample, UnavailableMotionSensor};
use shared::ScopeId;

use super::*;

fn controller(modules: Vec<OverlayModule>, options: OverlayOptions) -> OverlayController {
    OverlayController::new(modules, options, Arc::new(ScopedActionRegistry::new()))
        .expect("controller")
}

fn all_modules() -> Vec<OverlayModule> {
    vec![
        OverlayModule::Logs,
        OverlayModule::Network,
        OverlayModule::Analytics,
        OverlayModule::actions("Actions", Vec::new()),
        OverlayModule::preferences("Preferences"),
    ]
}

#[test]
fn zero_modules_is_rejected() {
    let outcome = OverlayController::new(
        Vec::new(),
        OverlayOptions::default(),
        Arc::new(ScopedActionRegistry::new()),
    );
    assert!(matches!(outcome, Err(OverlayError::NoModules)));
}

#[test]
fn tabs_only_show_for_several_modules() {
    assert!(!controller(vec![OverlayModule::Logs], OverlayOptions::default()).shows_tabs());
    assert!(controller(all_modules(), OverlayOptions::default()).shows_tabs());
}

#[test]
fn selection_is_bounds_checked() {
    let overlay = controller(all_modules(), OverlayOptions::default());
    assert_eq!(overlay.selected().title(), "Logs");
    assert_eq!(overlay.select(3).expect("select").title(), "Actions");
    assert_eq!(overlay.selected_index(), 3);
    assert!(matches!(
        overlay.select(9),
        Err(OverlayError::ModuleIndex { index: 9, count: 5 })
    ));
    assert_eq!(overlay.selected_index(), 3);
}

#[test]
fn visibility_toggles_and_notifies() {
    let overlay = controller(all_modules(), OverlayOptions::default());
    let mut visibility = overlay.subscribe_visibility();
    assert!(!overlay.is_visible());

    assert!(overlay.press_fab());
    assert!(visibility.has_changed().expect("sender alive"));
    assert!(*visibility.borrow_and_update());

    overlay.show();
    assert!(!visibility.has_changed().expect("sender alive"));

    assert!(!overlay.toggle());
    overlay.hide();
    assert!(!overlay.is_visible());
}

#[test]
fn fab_press_is_ignored_when_the_button_is_off() {
    let options = OverlayOptions {
        show_fab: false,
        ..OverlayOptions::default()
    };
    let overlay = controller(all_modules(), options);
    assert!(!overlay.shows_fab());
    assert!(!overlay.press_fab());
    assert!(!overlay.is_visible());
}

#[test]
fn actions_module_lists_globals_then_scope_actions() {
    let registry = Arc::new(ScopedActionRegistry::new());
    let global = ActionDescriptor::new("Crash app", || anyhow::bail!("requested crash"));
    let overlay = OverlayController::new(
        vec![OverlayModule::actions("Actions", vec![global.clone()])],
        OverlayOptions::default(),
        Arc::clone(&registry),
    )
    .expect("controller");

    let screen = ScopeId::new("Basket");
    registry
        .activate(&screen, [ActionDescriptor::new("Fill basket", || Ok(()))])
        .expect("activate");

    let titles: Vec<String> = overlay
        .actions_for(overlay.selected())
        .iter()
        .map(|action| action.title().to_string())
        .collect();
    assert_eq!(titles, vec!["Crash app", "Fill basket"]);
    assert!(overlay.actions_for(&OverlayModule::Logs).is_empty());

    registry.deactivate(&screen);
    assert_eq!(overlay.actions_for(overlay.selected()), vec![global]);
}

#[tokio::test]
async fn shake_toggles_visibility_when_enabled() {
    let options = OverlayOptions {
        enable_shake: true,
        ..OverlayOptions::default()
    };
    let overlay = controller(all_modules(), options);
    let sensor = Arc::new(ChannelMotionSensor::new("accelerometer"));
    assert!(overlay.enable_shake(sensor.clone()).expect("enable"));
    assert!(overlay.shake_running());

    let mut visibility = overlay.subscribe_visibility();
    sensor.push(MotionSample::new(0.0, 40.0, 0.0), 1_000);
    tokio::time::timeout(Duration::from_secs(2), visibility.changed())
        .await
        .expect("shake toggled")
        .expect("sender alive");
    assert!(overlay.is_visible());

    overlay.shutdown();
    assert!(!overlay.shake_running());
    assert!(!overlay.is_visible());
}

#[tokio::test]
async fn shake_stays_off_unless_enabled() {
    let overlay = controller(all_modules(), OverlayOptions::default());
    let sensor = Arc::new(ChannelMotionSensor::new("accelerometer"));
    assert!(!overlay.enable_shake(sensor.clone()).expect("enable"));
    assert_eq!(sensor.subscriber_count(), 0);
}

#[tokio::test]
async fn missing_sensor_surfaces_as_error() {
    let options = OverlayOptions {
        enable_shake: true,
        ..OverlayOptions::default()
    };
    let overlay = controller(all_modules(), options);
    assert!(matches!(
        overlay.enable_shake(Arc::new(UnavailableMotionSensor)),
        Err(OverlayError::Shake(ShakeError::SensorUnavailable(_)))
    ));
    assert!(!overlay.shake_running());
}

#[test]
fn options_follow_settings() {
    let settings = OverlaySettings {
        show_fab: false,
        enable_shake: true,
        shake_threshold: 9.0,
        shake_cooldown_ms: 300,
        ..OverlaySettings::default()
    };
    let options = OverlayOptions::from(&settings);
    assert!(!options.show_fab);
    assert!(options.enable_shake);
    assert_eq!(options.shake.threshold, 9.0);
    assert_eq!(options.shake.cooldown, Duration::from_millis(300));
}
