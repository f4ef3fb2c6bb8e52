// Posture Coach — Button Input Manager
//
// Polled edge detector for the navigate and select buttons.  A press is
// reported once, then the button is ignored for a settle window and must be
// seen released before it can fire again, so contact bounce and long holds
// both yield a single event.  Designed to be polled every few tens of ms.

use std::sync::mpsc::{SyncSender, TrySendError};
use std::time::Duration;

use crate::events::{Button, ButtonEvent};
use crate::hal::InputLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Armed,
    Settling { until: Duration },
    AwaitRelease,
}

/// Debounce state for one button. Pure: fed the pressed level and the time.
#[derive(Debug, Clone)]
pub struct Debouncer {
    settle: Duration,
    phase: Phase,
}

impl Debouncer {
    /// Starts waiting for a release, so a button held through boot does not
    /// count as a press.
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            phase: Phase::AwaitRelease,
        }
    }

    /// Feed one sample. Returns true exactly when a new press is recognised.
    pub fn update(&mut self, pressed: bool, now: Duration) -> bool {
        match self.phase {
            Phase::Armed => {
                if pressed {
                    self.phase = Phase::Settling { until: now + self.settle };
                    return true;
                }
            }
            Phase::Settling { until } => {
                if now >= until {
                    self.phase = if pressed { Phase::AwaitRelease } else { Phase::Armed };
                }
            }
            Phase::AwaitRelease => {
                if !pressed {
                    self.phase = Phase::Armed;
                }
            }
        }
        false
    }
}

pub struct InputManager {
    nav_pin: Box<dyn InputLine>,
    sel_pin: Box<dyn InputLine>,
    nav: Debouncer,
    sel: Debouncer,
    event_tx: SyncSender<ButtonEvent>,
}

impl InputManager {
    pub fn new(
        nav_pin: Box<dyn InputLine>,
        sel_pin: Box<dyn InputLine>,
        nav_settle: Duration,
        sel_settle: Duration,
        event_tx: SyncSender<ButtonEvent>,
    ) -> Self {
        Self {
            nav_pin,
            sel_pin,
            nav: Debouncer::new(nav_settle),
            sel: Debouncer::new(sel_settle),
            event_tx,
        }
    }

    /// Sample both buttons once and queue any new presses.
    pub fn update(&mut self, now: Duration) {
        // Active LOW with pull-up.
        if self.nav.update(self.nav_pin.is_low(), now) {
            self.emit(ButtonEvent::navigate());
        }
        if self.sel.update(self.sel_pin.is_low(), now) {
            self.emit(ButtonEvent::select());
        }
    }

    fn emit(&self, event: ButtonEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => log::debug!("{:?} pressed", event.button),
            Err(TrySendError::Full(_)) => log::warn!("Input queue full, dropping {:?}", event.button),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl std::fmt::Display for Button {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Button::Navigate => "navigate",
            Button::Select => "select",
        })
    }
}
