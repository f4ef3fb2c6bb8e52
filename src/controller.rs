// Posture Coach — Mode Controller
//
// Top-level state machine.  Owns every hardware handle (through `Board`) and
// runs single-threaded: sampling, classification, alerting and button polling
// all happen one after another inside `step()`.
//
//   MenuBrowsing(cursor) --nav--> MenuBrowsing(other cursor)
//   MenuBrowsing(A)      --sel--> CheckingOnce --done--> MenuBrowsing(A)
//   MenuBrowsing(B)      --sel--> Monitoring   --sel---> MenuBrowsing(A)

use std::rc::Rc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use crate::alert::{AlertEngine, AlertPatterns, CheckOutcome};
use crate::classifier::{self, Classifier, ClassificationResult};
use crate::config::CoachConfig;
use crate::drivers::buzzer::Buzzer;
use crate::error::Error;
use crate::events::{Button, ButtonEvent, EVENT_QUEUE_DEPTH};
use crate::features;
use crate::hal::{Clock, InputLine};
use crate::input::InputManager;
use crate::screen::Screen;
use crate::sensor_bus::SensorBus;

/// Menu entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCursor {
    /// A: one-shot check
    CheckNow,
    /// B: continuous monitoring
    Continuous,
}

impl MenuCursor {
    pub fn toggle(self) -> Self {
        match self {
            Self::CheckNow => Self::Continuous,
            Self::Continuous => Self::CheckNow,
        }
    }

    pub fn row(self) -> usize {
        match self {
            Self::CheckNow => 0,
            Self::Continuous => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeState {
    MenuBrowsing(MenuCursor),
    CheckingOnce,
    Monitoring,
}

/// Every hardware handle the controller drives, passed in explicitly.
pub struct Board {
    pub sensors: SensorBus,
    pub screen: Screen,
    pub buzzer: Buzzer,
    pub nav_button: Box<dyn InputLine>,
    pub sel_button: Box<dyn InputLine>,
    pub clock: Rc<dyn Clock>,
}

pub struct ModeController {
    sensors: SensorBus,
    screen: Screen,
    buzzer: Buzzer,
    input: InputManager,
    events: Receiver<ButtonEvent>,
    clock: Rc<dyn Clock>,
    classifier: Box<dyn Classifier>,
    alerts: AlertEngine,
    patterns: AlertPatterns,
    state: ModeState,
    next_sample: Duration,
    sample_interval: Duration,
    input_poll: Duration,
    result_hold: Duration,
}

impl ModeController {
    pub fn new(board: Board, classifier: Box<dyn Classifier>, config: &CoachConfig) -> Self {
        let (event_tx, events) = mpsc::sync_channel(EVENT_QUEUE_DEPTH);
        let input = InputManager::new(
            board.nav_button,
            board.sel_button,
            Duration::from_millis(config.nav_settle_ms),
            Duration::from_millis(config.sel_settle_ms),
            event_tx,
        );

        Self {
            sensors: board.sensors,
            screen: board.screen,
            buzzer: board.buzzer,
            input,
            events,
            clock: board.clock,
            classifier,
            alerts: AlertEngine::new(config.cooldown()),
            patterns: AlertPatterns::from_config(config),
            state: ModeState::MenuBrowsing(MenuCursor::CheckNow),
            next_sample: Duration::ZERO,
            sample_interval: config.sample_interval(),
            input_poll: config.input_poll(),
            result_hold: config.result_hold(),
        }
    }

    pub fn state(&self) -> ModeState {
        self.state
    }

    /// Draw the initial menu. Call once before stepping.
    pub fn start(&mut self) {
        self.enter_menu();
    }

    /// Never returns: the device has no terminal state.
    pub fn run(&mut self) -> ! {
        self.start();
        loop {
            self.step();
        }
    }

    /// Advance the state machine by one unit of work: one button poll in the
    /// menu, one full check, or one monitoring cycle (including the wait
    /// until the next sample is due).
    pub fn step(&mut self) {
        match self.state {
            ModeState::MenuBrowsing(cursor) => self.browse(cursor),
            ModeState::CheckingOnce => {
                self.check_once();
                self.enter_menu();
            }
            ModeState::Monitoring => self.monitor_cycle(),
        }
    }

    // -----------------------------------------------------------------------
    // MenuBrowsing
    // -----------------------------------------------------------------------

    fn enter_menu(&mut self) {
        self.state = ModeState::MenuBrowsing(MenuCursor::CheckNow);
        self.screen.show_menu(MenuCursor::CheckNow);
    }

    fn browse(&mut self, mut cursor: MenuCursor) {
        self.input.update(self.clock.now());

        while let Ok(event) = self.events.try_recv() {
            match event.button {
                Button::Navigate => {
                    cursor = cursor.toggle();
                    self.state = ModeState::MenuBrowsing(cursor);
                    self.screen.show_menu(cursor);
                }
                Button::Select => {
                    self.screen.leave_menu();
                    match cursor {
                        MenuCursor::CheckNow => {
                            log::info!("Mode: check now");
                            self.state = ModeState::CheckingOnce;
                        }
                        MenuCursor::Continuous => self.enter_monitoring(),
                    }
                    // Presses queued behind the select belong to the old screen.
                    self.drain_events();
                    return;
                }
            }
        }

        self.clock.sleep(self.input_poll);
    }

    // -----------------------------------------------------------------------
    // CheckingOnce
    // -----------------------------------------------------------------------

    /// Take one snapshot, classify it, signal and show the outcome, and keep
    /// it on screen for the hold time.
    pub fn check_once(&mut self) -> CheckOutcome {
        self.screen.show_checking();

        let snapshot = self.sensors.read_all_segments();
        let outcome = match features::to_complete_vector(&snapshot)
            .and_then(|v| classifier::classify(self.classifier.as_ref(), &v))
        {
            Ok(result) => {
                log::info!("Detected: {}", result.label);
                self.screen.show_check_result(&result);
                CheckOutcome::Posture(result)
            }
            Err(e @ Error::IncompleteFeatureVector { .. }) => {
                log::warn!("Sensor read failed: {}", e);
                self.screen.show_sensor_error();
                CheckOutcome::SensorFailure
            }
            Err(e) => {
                log::error!("Check failed: {}", e);
                self.screen.show("Model error", "Try again");
                CheckOutcome::ClassifierFailure
            }
        };

        self.buzzer.play(self.patterns.for_check(&outcome), self.clock.as_ref());
        self.clock.sleep(self.result_hold);
        outcome
    }

    // -----------------------------------------------------------------------
    // Monitoring
    // -----------------------------------------------------------------------

    fn enter_monitoring(&mut self) {
        log::info!("Mode: continuous monitoring");
        self.state = ModeState::Monitoring;
        self.alerts.reset();
        self.next_sample = self.clock.now();
        self.screen.show_monitoring();
    }

    fn monitor_cycle(&mut self) {
        let now = self.clock.now();
        self.input.update(now);
        if self.select_pressed() {
            log::info!("Stopped continuous mode");
            self.screen.show_stopped();
            self.enter_menu();
            return;
        }

        if let Some(result) = self.sample() {
            self.screen.show_live_result(&result);
            if self.alerts.maybe_alert(&result, now) {
                log::info!("Bad posture ({}), alerting", result.label);
                self.buzzer.play(self.patterns.bad_posture(), self.clock.as_ref());
            }
        }

        // Fixed-rate schedule; an overrun starts the next cycle immediately.
        self.next_sample += self.sample_interval;
        self.wait_until(self.next_sample);
        if self.next_sample < self.clock.now() {
            self.next_sample = self.clock.now();
        }
    }

    /// One classification, or `None` when this cycle has to be skipped.
    fn sample(&mut self) -> Option<ClassificationResult> {
        let snapshot = self.sensors.read_all_segments();
        let vector = match features::to_complete_vector(&snapshot) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Skipping sample: {}", e);
                self.screen.show_skipped();
                return None;
            }
        };
        match classifier::classify(self.classifier.as_ref(), &vector) {
            Ok(result) => {
                log::info!("Posture: {}", result.label);
                Some(result)
            }
            Err(e) => {
                log::warn!("Skipping sample: {}", e);
                None
            }
        }
    }

    /// Sleep until `deadline`, polling the buttons every poll period so a
    /// press between samples is not lost.
    fn wait_until(&mut self, deadline: Duration) {
        loop {
            let now = self.clock.now();
            if now >= deadline {
                return;
            }
            self.input.update(now);
            self.clock.sleep(self.input_poll.min(deadline - now));
        }
    }

    fn select_pressed(&mut self) -> bool {
        let mut pressed = false;
        while let Ok(event) = self.events.try_recv() {
            pressed |= event.button == Button::Select;
        }
        pressed
    }

    fn drain_events(&mut self) {
        while self.events.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{
        FailingClassifier, ManualClock, MockBody, MockBuzzerPin, MockDisplay, ScriptedButton, ScriptedClassifier,
    };
    use crate::segment::Segment;
    use std::cell::RefCell;

    struct Rig {
        clock: Rc<ManualClock>,
        body: Rc<RefCell<MockBody>>,
        nav: ScriptedButton,
        sel: ScriptedButton,
        buzzer: MockBuzzerPin,
        display: MockDisplay,
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn rig(classifier: impl Classifier + 'static) -> (Rig, ModeController) {
        let clock = Rc::new(ManualClock::new());
        let shared: Rc<dyn Clock> = clock.clone();
        let body = Rc::new(RefCell::new(MockBody::upright()));
        let nav = ScriptedButton::new(shared.clone());
        let sel = ScriptedButton::new(shared.clone());
        let buzzer = MockBuzzerPin::shared(shared.clone());
        let display = MockDisplay::new();

        let board = Board {
            sensors: SensorBus::new(body.clone(), shared.clone(), ms(50)),
            screen: Screen::new(Box::new(display.clone())),
            buzzer: Buzzer::new(Box::new(buzzer.clone())),
            nav_button: Box::new(nav.clone()),
            sel_button: Box::new(sel.clone()),
            clock: shared,
        };
        let mut controller = ModeController::new(board, Box::new(classifier), &CoachConfig::default());
        controller.start();
        (Rig { clock, body, nav, sel, buzzer, display }, controller)
    }

    fn step_until(controller: &mut ModeController, clock: &ManualClock, until: Duration) {
        while clock.now() < until {
            controller.step();
        }
    }

    #[test]
    fn starts_on_menu_a() {
        let (rig, controller) = rig(ScriptedClassifier::new(Vec::<String>::new(), "sitting_good"));
        assert_eq!(controller.state(), ModeState::MenuBrowsing(MenuCursor::CheckNow));
        assert_eq!(rig.display.line(0), "> A: Check Now");
        assert!(rig.display.state().blink);
    }

    #[test]
    fn navigate_toggles_cursor() {
        let (rig, mut controller) = rig(ScriptedClassifier::new(Vec::<String>::new(), "sitting_good"));
        rig.nav.press_at(ms(100), ms(60));
        rig.nav.press_at(ms(800), ms(60));

        step_until(&mut controller, &rig.clock, ms(500));
        assert_eq!(controller.state(), ModeState::MenuBrowsing(MenuCursor::Continuous));
        assert_eq!(rig.display.line(1), "> B: Continuous");
        assert_eq!(rig.display.state().cursor_row, 1);

        step_until(&mut controller, &rig.clock, ms(1200));
        assert_eq!(controller.state(), ModeState::MenuBrowsing(MenuCursor::CheckNow));
    }

    #[test]
    fn bad_check_beeps_once() {
        let (rig, mut controller) = rig(ScriptedClassifier::new(["sitting_bad"], "sitting_bad"));
        let outcome = controller.check_once();
        assert_eq!(outcome, CheckOutcome::Posture(ClassificationResult::new("sitting_bad")));
        assert_eq!(rig.buzzer.pulse_count(), 1);
        assert!(rig.display.showed("Fix posture"));
    }

    #[test]
    fn check_with_dead_sensor_signals_failure() {
        let classifier = ScriptedClassifier::new(Vec::<String>::new(), "sitting_good");
        let calls = classifier.call_counter();
        let (rig, mut controller) = rig(classifier);
        rig.body.borrow_mut().fail(Segment::LeftShoulder);

        assert_eq!(controller.check_once(), CheckOutcome::SensorFailure);
        assert_eq!(calls.get(), 0);
        assert_eq!(rig.buzzer.pulse_count(), 3);
        assert_eq!(rig.display.line(0), "Sensor error");
    }

    #[test]
    fn classifier_error_signals_failure() {
        let (rig, mut controller) = rig(FailingClassifier);
        assert_eq!(controller.check_once(), CheckOutcome::ClassifierFailure);
        assert_eq!(rig.buzzer.pulse_count(), 3);
        assert_eq!(rig.display.line(0), "Model error");
    }

    #[test]
    fn monitoring_rides_out_classifier_errors() {
        let (rig, mut controller) = rig(FailingClassifier);

        rig.nav.press_at(ms(100), ms(60));
        rig.sel.press_at(ms(500), ms(60));
        step_until(&mut controller, &rig.clock, ms(3000));

        // Every cycle is dropped: no alert, no result and no error screen.
        assert_eq!(controller.state(), ModeState::Monitoring);
        assert_eq!(rig.buzzer.pulse_count(), 0);
        assert_eq!(rig.display.line(0), "Monitoring...");
        assert!(!rig.display.showed("Fix posture"));
        assert!(!rig.display.showed("Model error"));

        // The loop is still alive and answers the stop button.
        rig.sel.press_at(ms(3100), ms(60));
        step_until(&mut controller, &rig.clock, ms(5000));
        assert_eq!(controller.state(), ModeState::MenuBrowsing(MenuCursor::CheckNow));
        assert!(rig.display.showed("Stopped"));
    }

    #[test]
    fn monitoring_skips_incomplete_cycles_without_alerting() {
        let classifier = ScriptedClassifier::new(Vec::<String>::new(), "sitting_bad");
        let calls = classifier.call_counter();
        let (rig, mut controller) = rig(classifier);
        rig.body.borrow_mut().fail(Segment::UpperBack);

        rig.nav.press_at(ms(100), ms(60));
        rig.sel.press_at(ms(500), ms(60));
        step_until(&mut controller, &rig.clock, ms(4000));

        assert_eq!(controller.state(), ModeState::Monitoring);
        assert_eq!(calls.get(), 0);
        assert_eq!(rig.buzzer.pulse_count(), 0);
        assert!(rig.display.showed("Skipping"));

        // Sensor comes back: the next cycle classifies and alerts.
        rig.body.borrow_mut().restore(Segment::UpperBack);
        step_until(&mut controller, &rig.clock, ms(5000));
        assert!(calls.get() >= 1);
        assert_eq!(rig.buzzer.pulse_count(), 1);
    }

    #[test]
    fn re_entering_monitoring_resets_cooldown() {
        let (rig, mut controller) = rig(ScriptedClassifier::new(Vec::<String>::new(), "sitting_bad"));

        // First session: enter at 0.5 s, leave around 2.5 s.
        rig.nav.press_at(ms(100), ms(60));
        rig.sel.press_at(ms(500), ms(60));
        rig.sel.press_at(ms(2000), ms(60));
        step_until(&mut controller, &rig.clock, ms(3000));
        assert_eq!(controller.state(), ModeState::MenuBrowsing(MenuCursor::CheckNow));
        assert_eq!(rig.buzzer.pulse_count(), 1);

        // Second session well inside the 60 s cooldown still alerts at once.
        rig.nav.press_at(ms(3100), ms(60));
        rig.sel.press_at(ms(3500), ms(60));
        step_until(&mut controller, &rig.clock, ms(4000));
        assert_eq!(controller.state(), ModeState::Monitoring);
        assert_eq!(rig.buzzer.pulse_count(), 2);
    }
}
