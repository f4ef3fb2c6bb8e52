// Posture Coach — 16x2 Character LCD Driver
//
// HD44780 controller behind a PCF8574 I2C backpack, driven in 4-bit mode.
// Backpack bit layout: P0=RS P1=RW P2=EN P3=backlight P4..P7=D4..D7.

use std::thread;
use std::time::Duration;

use crate::config::{I2C_ADDR_LCD, LCD_COLS, LCD_ROWS};
use crate::error::{Error, Result, SensorError};
use crate::hal::{SharedBus, TextDisplay};

const RS: u8 = 0x01;
const EN: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE: u8 = 0x06; // Increment, no shift
const CMD_DISPLAY_ON: u8 = 0x0C;
const CMD_DISPLAY_ON_BLINK: u8 = 0x0D;
const CMD_FUNCTION_SET: u8 = 0x28; // 4-bit, 2 lines, 5x8 font
const CMD_SET_DDRAM: u8 = 0x80;

const ROW_OFFSETS: [u8; LCD_ROWS] = [0x00, 0x40];

pub struct Lcd1602 {
    bus: SharedBus,
    addr: u8,
    blink: bool,
}

impl Lcd1602 {
    pub fn new(bus: SharedBus) -> Self {
        Self {
            bus,
            addr: I2C_ADDR_LCD,
            blink: false,
        }
    }

    /// Run the HD44780 4-bit initialisation sequence and switch the backlight
    /// on.  Failing here means the display is absent, which is fatal at boot.
    pub fn init(&mut self) -> Result<()> {
        let init = |lcd: &mut Self| -> std::result::Result<(), SensorError> {
            thread::sleep(Duration::from_millis(50));
            // Force 8-bit mode three times, then drop to 4-bit.
            for _ in 0..3 {
                lcd.write_nibble(0x30)?;
                thread::sleep(Duration::from_millis(5));
            }
            lcd.write_nibble(0x20)?;

            lcd.command(CMD_FUNCTION_SET)?;
            lcd.command(CMD_DISPLAY_ON)?;
            lcd.command(CMD_CLEAR)?;
            thread::sleep(Duration::from_millis(2));
            lcd.command(CMD_ENTRY_MODE)
        };
        init(self).map_err(|e| Error::HardwareInit(format!("LCD: {}", e)))?;
        log::info!("LCD initialised ({}x{} @ {:#04x})", LCD_COLS, LCD_ROWS, self.addr);
        Ok(())
    }

    fn expander_write(&mut self, byte: u8) -> std::result::Result<(), SensorError> {
        self.bus.borrow_mut().write(self.addr, &[byte | BACKLIGHT])
    }

    fn write_nibble(&mut self, nibble: u8) -> std::result::Result<(), SensorError> {
        self.expander_write(nibble)?;
        self.expander_write(nibble | EN)?;
        self.expander_write(nibble & !EN)?;
        thread::sleep(Duration::from_micros(50));
        Ok(())
    }

    fn send(&mut self, value: u8, mode: u8) -> std::result::Result<(), SensorError> {
        self.write_nibble((value & 0xF0) | mode)?;
        self.write_nibble(((value << 4) & 0xF0) | mode)
    }

    fn command(&mut self, cmd: u8) -> std::result::Result<(), SensorError> {
        self.send(cmd, 0)
    }

    fn set_position(&mut self, row: usize, col: usize) -> std::result::Result<(), SensorError> {
        let row = row.min(LCD_ROWS - 1);
        self.command(CMD_SET_DDRAM | (ROW_OFFSETS[row] + col as u8))
    }

    fn log_error(result: std::result::Result<(), SensorError>) {
        if let Err(e) = result {
            log::warn!("LCD write failed: {}", e);
        }
    }
}

impl TextDisplay for Lcd1602 {
    fn clear(&mut self) {
        let result = self.command(CMD_CLEAR);
        thread::sleep(Duration::from_millis(2));
        Self::log_error(result);
    }

    fn write_line(&mut self, row: usize, text: &str) {
        let result = self.set_position(row, 0).and_then(|_| {
            // Pad so a shorter line fully replaces the previous one.
            for ch in text.chars().chain(std::iter::repeat(' ')).take(LCD_COLS) {
                let byte = if ch.is_ascii() { ch as u8 } else { b'?' };
                self.send(byte, RS)?;
            }
            Ok(())
        });
        Self::log_error(result);
    }

    fn set_blink(&mut self, on: bool) {
        self.blink = on;
        let cmd = if on { CMD_DISPLAY_ON_BLINK } else { CMD_DISPLAY_ON };
        Self::log_error(self.command(cmd));
    }

    fn set_cursor_row(&mut self, row: usize) {
        Self::log_error(self.set_position(row, 0));
    }
}
