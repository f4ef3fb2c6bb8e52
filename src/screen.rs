// Posture Coach — Screens
//
// Every text the wearer sees, rendered onto the two-line display.

use crate::classifier::ClassificationResult;
use crate::controller::MenuCursor;
use crate::hal::TextDisplay;

pub struct Screen {
    display: Box<dyn TextDisplay>,
}

impl Screen {
    pub fn new(display: Box<dyn TextDisplay>) -> Self {
        Self { display }
    }

    /// Clear and write both lines.
    pub fn show(&mut self, line0: &str, line1: &str) {
        self.display.clear();
        self.display.write_line(0, line0);
        self.display.write_line(1, line1);
    }

    pub fn show_splash(&mut self) {
        self.show("Posture Coach", "Starting...");
    }

    /// Two-option menu. The `>` marker and the blinking cursor both sit on
    /// the selected row.
    pub fn show_menu(&mut self, cursor: MenuCursor) {
        let (line0, line1) = match cursor {
            MenuCursor::CheckNow => ("> A: Check Now", "  B: Continuous"),
            MenuCursor::Continuous => ("  A: Check Now", "> B: Continuous"),
        };
        self.display.clear();
        self.display.set_blink(true);
        self.display.write_line(0, line0);
        self.display.write_line(1, line1);
        self.display.set_cursor_row(cursor.row());
    }

    pub fn leave_menu(&mut self) {
        self.display.set_blink(false);
    }

    pub fn show_checking(&mut self) {
        self.show("Checking...", "Hold still");
    }

    pub fn show_check_result(&mut self, result: &ClassificationResult) {
        let verdict = if result.is_good { "Good!" } else { "Fix posture" };
        self.show(&result.label, verdict);
    }

    pub fn show_sensor_error(&mut self) {
        self.show("Sensor error", "Try again");
    }

    pub fn show_monitoring(&mut self) {
        self.show("Monitoring...", "SEL to stop");
    }

    pub fn show_live_result(&mut self, result: &ClassificationResult) {
        let verdict = if result.is_good { "OK" } else { "Fix posture" };
        self.show(&result.label, verdict);
    }

    pub fn show_skipped(&mut self) {
        self.show("Sensor error", "Skipping");
    }

    pub fn show_stopped(&mut self) {
        self.show("Stopped", "");
    }
}
