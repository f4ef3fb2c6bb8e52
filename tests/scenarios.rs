//! End-to-end scenarios on the simulated body.
//!
//! Everything runs on a `ManualClock`, so the minute-long cooldown and the
//! sampling schedule cost no real time.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use posture_coach::capture::{self, CaptureWriter};
use posture_coach::classifier::{self, Classifier, ModelPackage};
use posture_coach::config::CoachConfig;
use posture_coach::controller::{Board, MenuCursor, ModeController, ModeState};
use posture_coach::drivers::buzzer::Buzzer;
use posture_coach::features;
use posture_coach::hal::Clock;
use posture_coach::mock::{
    ManualClock, MockBody, MockBuzzerPin, MockDisplay, ScriptedButton, ScriptedClassifier,
};
use posture_coach::screen::Screen;
use posture_coach::segment::Segment;
use posture_coach::sensor_bus::SensorBus;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn model_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/model_package.json")
}

struct Device {
    clock: Rc<ManualClock>,
    body: Rc<RefCell<MockBody>>,
    nav: ScriptedButton,
    sel: ScriptedButton,
    buzzer: MockBuzzerPin,
    display: MockDisplay,
    controller: ModeController,
}

impl Device {
    fn boot(body: MockBody, classifier: Box<dyn Classifier>) -> Self {
        let clock = Rc::new(ManualClock::new());
        let shared: Rc<dyn Clock> = clock.clone();
        let body = Rc::new(RefCell::new(body));
        let nav = ScriptedButton::new(shared.clone());
        let sel = ScriptedButton::new(shared.clone());
        let buzzer = MockBuzzerPin::shared(shared.clone());
        let display = MockDisplay::new();
        let config = CoachConfig::default();

        let board = Board {
            sensors: SensorBus::new(body.clone(), shared.clone(), config.read_timeout()),
            screen: Screen::new(Box::new(display.clone())),
            buzzer: Buzzer::new(Box::new(buzzer.clone())),
            nav_button: Box::new(nav.clone()),
            sel_button: Box::new(sel.clone()),
            clock: shared,
        };
        let mut controller = ModeController::new(board, classifier, &config);
        controller.start();

        Self { clock, body, nav, sel, buzzer, display, controller }
    }

    fn run_until(&mut self, until: Duration) {
        while self.clock.now() < until {
            self.controller.step();
        }
    }

    /// Step until the controller reaches `state`, giving up after `limit`.
    fn run_to_state(&mut self, state: ModeState, limit: Duration) {
        while self.controller.state() != state {
            assert!(self.clock.now() < limit, "never reached {:?}", state);
            self.controller.step();
        }
    }
}

#[test]
fn check_now_with_good_posture_beeps_twice_and_returns_to_menu() {
    let model = ModelPackage::load(model_path()).unwrap();
    let mut device = Device::boot(MockBody::upright(), Box::new(model));
    assert_eq!(device.display.line(0), "> A: Check Now");

    device.sel.press_at(ms(100), ms(60));
    device.run_to_state(ModeState::CheckingOnce, ms(1000));
    device.controller.step();

    assert_eq!(device.controller.state(), ModeState::MenuBrowsing(MenuCursor::CheckNow));
    assert_eq!(device.buzzer.pulse_count(), 2);
    assert!(device.display.showed("sitting_good"));
    assert!(device.display.showed("Good!"));
    assert_eq!(device.display.line(0), "> A: Check Now");
}

#[test]
fn check_now_with_slouch_beeps_once() {
    let model = ModelPackage::load(model_path()).unwrap();
    let mut device = Device::boot(MockBody::slouched(), Box::new(model));

    device.sel.press_at(ms(100), ms(60));
    device.run_to_state(ModeState::CheckingOnce, ms(1000));
    device.controller.step();

    assert_eq!(device.buzzer.pulse_count(), 1);
    assert!(device.display.showed("sitting_bad"));
    assert!(device.display.showed("Fix posture"));
}

#[test]
fn sustained_bad_posture_alerts_once_per_cooldown() {
    let classifier = ScriptedClassifier::new(["sitting_bad", "sitting_bad", "sitting_bad"], "sitting_good");
    let calls = classifier.call_counter();
    let mut device = Device::boot(MockBody::upright(), Box::new(classifier));

    device.nav.press_at(ms(100), ms(60));
    device.sel.press_at(ms(500), ms(60));
    device.run_to_state(ModeState::Monitoring, ms(1000));
    // Cycles at 0.5 s, 1.5 s and 2.5 s.
    device.run_until(ms(3000));

    assert_eq!(calls.get(), 3);
    assert_eq!(device.buzzer.pulse_count(), 1);
    assert!(device.display.showed("Monitoring..."));
}

#[test]
fn select_during_monitoring_stops_at_next_cycle() {
    let classifier = ScriptedClassifier::new(Vec::<String>::new(), "standing_good");
    let mut device = Device::boot(MockBody::upright(), Box::new(classifier));

    device.nav.press_at(ms(100), ms(60));
    device.sel.press_at(ms(500), ms(60));
    device.sel.press_at(ms(1800), ms(60));
    device.run_to_state(ModeState::Monitoring, ms(1000));
    device.run_to_state(ModeState::MenuBrowsing(MenuCursor::CheckNow), ms(4000));

    assert!(device.clock.now() <= ms(2600));
    assert!(device.display.showed("Stopped"));
    assert_eq!(device.buzzer.pulse_count(), 0);
}

#[test]
fn one_dead_sensor_costs_only_its_own_slot() {
    let clock = Rc::new(ManualClock::new());
    let mut body = MockBody::upright();
    body.fail(Segment::RightThigh);
    let body = Rc::new(RefCell::new(body));
    let mut sensors = SensorBus::new(body.clone(), clock, ms(50));

    let snapshot = sensors.read_all_segments();
    assert_eq!(snapshot.missing(), vec![Segment::RightThigh]);
    assert_eq!(snapshot.iter().filter(|(_, r)| r.is_some()).count(), 9);
    // Every channel was closed again, including the failing one.
    assert_eq!(body.borrow().mux_mask(), 0);

    let partial = features::to_partial_vector(&snapshot);
    assert_eq!(partial.values().iter().filter(|v| v.is_none()).count(), 2);
    assert!(features::to_complete_vector(&snapshot).is_err());
}

#[test]
fn demo_model_separates_upright_from_slouched() {
    let model = ModelPackage::load(model_path()).unwrap();
    let clock = Rc::new(ManualClock::new());

    for (body, expected) in [
        (MockBody::upright(), "sitting_good"),
        (MockBody::slouched(), "sitting_bad"),
    ] {
        let body = Rc::new(RefCell::new(body));
        let mut sensors = SensorBus::new(body, clock.clone(), ms(50));
        let vector = features::to_complete_vector(&sensors.read_all_segments()).unwrap();
        let result = classifier::classify(&model, &vector).unwrap();
        assert_eq!(result.label, expected);
    }
}

#[test]
fn sensor_recovers_after_reconnect() {
    let classifier = ScriptedClassifier::new(Vec::<String>::new(), "sitting_good");
    let mut device = Device::boot(MockBody::upright(), Box::new(classifier));
    device.body.borrow_mut().fail(Segment::LowerBack);

    device.sel.press_at(ms(100), ms(60));
    device.run_to_state(ModeState::CheckingOnce, ms(1000));
    device.controller.step();
    assert_eq!(device.buzzer.pulse_count(), 3);

    device.body.borrow_mut().restore(Segment::LowerBack);
    device.buzzer.clear();
    let start = device.clock.now();
    device.sel.press_at(start + ms(100), ms(60));
    device.run_to_state(ModeState::CheckingOnce, start + ms(1000));
    device.controller.step();
    assert_eq!(device.buzzer.pulse_count(), 2);
}

#[test]
fn capture_session_appends_rows_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posture_data.csv");
    let clock = Rc::new(ManualClock::new());
    let body = Rc::new(RefCell::new(MockBody::slouched()));
    let mut sensors = SensorBus::new(body, clock.clone(), ms(50));

    for _ in 0..2 {
        let mut writer = CaptureWriter::open_append(&path).unwrap();
        let written = capture::capture_session(
            &mut sensors,
            &mut writer,
            clock.as_ref(),
            "standing_bad",
            Duration::from_secs(3),
            ms(100),
        )
        .unwrap();
        assert_eq!(written, 30);
    }

    assert_eq!(capture::count_rows(&path).unwrap(), 60);
    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(capture::header().as_str()));
    assert!(lines.all(|l| l.split(',').nth(1) == Some("standing_bad")));
}
