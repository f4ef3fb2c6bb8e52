// Posture Coach — Entry Point
//
// On the ESP32-C3 this is the firmware:
//   1. Bring up logging, GPIO and the shared I2C bus.
//   2. Initialise the display and show the splash screen.
//   3. Probe the multiplexer and the ten sensors.
//   4. Mount SPIFFS and load the model artifact.
//   5. Hand everything to the mode controller, which never returns.
// Any failure in steps 2-4 is fatal: it is logged and the program ends
// before the control loop starts.
//
// On a desktop host the same controller, check and capture paths run against
// a simulated body, driven from the command line.

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::run()
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    simulator::run()
}

// ---------------------------------------------------------------------------
// Firmware
// ---------------------------------------------------------------------------
#[cfg(target_os = "espidf")]
mod firmware {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use esp_idf_hal::gpio::{InputPin, OutputPin, PinDriver};
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::prelude::*;

    use posture_coach::classifier::{Classifier, ModelPackage};
    use posture_coach::config::*;
    use posture_coach::controller::{Board, ModeController};
    use posture_coach::drivers::buzzer::Buzzer;
    use posture_coach::drivers::esp::{self, EspBuzzerPin, EspButton, EspI2c};
    use posture_coach::drivers::lcd::Lcd1602;
    use posture_coach::hal::{Clock, SharedBus, SystemClock};
    use posture_coach::screen::Screen;
    use posture_coach::sensor_bus::SensorBus;

    pub fn run() -> anyhow::Result<()> {
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
        log::info!("Posture Coach firmware starting…");

        let config = CoachConfig::default();
        let clock: Rc<dyn Clock> = Rc::new(SystemClock::new());

        // ---- Peripherals --------------------------------------------------
        let peripherals = Peripherals::take()?;

        let nav = PinDriver::input(peripherals.pins.gpio3.downgrade_input())?;
        esp::configure_pullup(PIN_NAV_BUTTON);
        let sel = PinDriver::input(peripherals.pins.gpio5.downgrade_input())?;
        esp::configure_pullup(PIN_SEL_BUTTON);
        let buzzer_pin = PinDriver::output(peripherals.pins.gpio4.downgrade_output())?;

        // ---- I2C bus (mux, sensors and LCD) --------------------------------
        let i2c_config = I2cConfig::new().baudrate(I2C_BAUDRATE_KHZ.kHz().into());
        let i2c = I2cDriver::new(
            peripherals.i2c0,
            peripherals.pins.gpio6, // SDA
            peripherals.pins.gpio7, // SCL
            &i2c_config,
        )?;
        let bus: SharedBus = Rc::new(RefCell::new(EspI2c::new(i2c, config.read_timeout_ms)));

        // ---- Display --------------------------------------------------------
        let mut lcd = Lcd1602::new(bus.clone());
        if let Err(e) = lcd.init() {
            log::error!("{}", e);
            return Err(e.into());
        }
        let mut screen = Screen::new(Box::new(lcd));
        screen.show_splash();

        // ---- Sensors --------------------------------------------------------
        let mut sensors = SensorBus::new(bus, clock.clone(), config.read_timeout());
        match sensors.probe() {
            Ok(missing) if missing.is_empty() => log::info!("All sensors responding"),
            Ok(missing) => log::warn!("{} sensor(s) not responding at boot", missing.len()),
            Err(e) => {
                log::error!("{}", e);
                screen.show("Mux error", "Check wiring");
                return Err(e.into());
            }
        }

        // ---- Model ----------------------------------------------------------
        let model = esp::mount_spiffs()
            .and_then(|_| ModelPackage::load(format!("{}/{}", SPIFFS_BASE_PATH, MODEL_FILE)));
        let model = match model {
            Ok(m) => m,
            Err(e) => {
                log::error!("{}", e);
                screen.show("Model error", "Reflash model");
                return Err(e.into());
            }
        };
        log::info!("Model ready, labels: {:?}", model.labels());

        clock.sleep(Duration::from_millis(SPLASH_DISPLAY_MS));

        let board = Board {
            sensors,
            screen,
            buzzer: Buzzer::new(Box::new(EspBuzzerPin(buzzer_pin))),
            nav_button: Box::new(EspButton(nav)),
            sel_button: Box::new(EspButton(sel)),
            clock,
        };
        log::info!("Boot complete, entering menu");
        ModeController::new(board, Box::new(model), &config).run()
    }
}

// ---------------------------------------------------------------------------
// Host simulator
// ---------------------------------------------------------------------------
#[cfg(not(target_os = "espidf"))]
mod simulator {
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;
    use std::time::Duration;

    use clap::{Parser, Subcommand, ValueEnum};

    use posture_coach::alert::CheckOutcome;
    use posture_coach::capture::{self, CaptureWriter};
    use posture_coach::classifier::ModelPackage;
    use posture_coach::config::{seconds_setting, CoachConfig, LCD_COLS};
    use posture_coach::controller::{Board, ModeController, ModeState};
    use posture_coach::drivers::buzzer::Buzzer;
    use posture_coach::hal::{Clock, SystemClock, TextDisplay};
    use posture_coach::mock::{ManualClock, MockBody, MockBuzzerPin, Posture, ScriptedButton};
    use posture_coach::screen::Screen;
    use posture_coach::segment::Segment;
    use posture_coach::sensor_bus::SensorBus;

    /// Posture Coach simulator: runs the device logic against a simulated body
    #[derive(Parser, Debug)]
    #[command(author, version, about, long_about = None)]
    struct Args {
        /// TOML file overriding the default tunables
        #[arg(short, long, global = true)]
        config: Option<PathBuf>,

        /// Model artifact (defaults to the config's model_path)
        #[arg(short, long, global = true)]
        model: Option<PathBuf>,

        /// Posture the simulated wearer holds
        #[arg(long, value_enum, default_value = "good", global = true)]
        posture: PostureArg,

        /// Segment whose sensor stops answering (repeatable)
        #[arg(long, value_parser = parse_segment, global = true)]
        fail: Vec<Segment>,

        /// Run on virtual time instead of waiting in real time
        #[arg(long, global = true)]
        fast: bool,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand, Debug)]
    enum Command {
        /// One-shot posture check
        Check,
        /// Continuous monitoring, stopped by a select press after N seconds
        Monitor {
            #[arg(long, default_value = "10", value_parser = parse_seconds)]
            seconds: Duration,
        },
        /// Record labelled training samples
        Capture {
            #[arg(long)]
            label: String,
            /// Session length (defaults to the config's capture_session_secs)
            #[arg(long, value_parser = parse_seconds)]
            seconds: Option<Duration>,
            #[arg(long, default_value = "posture_data.csv")]
            out: PathBuf,
        },
        /// Print every segment's angles once (wiring check)
        Read {
            /// Keep printing, one snapshot per sample interval
            #[arg(long)]
            stream: bool,
            /// Stop streaming after this many snapshots
            #[arg(long)]
            samples: Option<usize>,
        },
    }

    #[derive(Clone, Copy, Debug, ValueEnum)]
    enum PostureArg {
        Good,
        Bad,
    }

    fn parse_segment(s: &str) -> Result<Segment, String> {
        Segment::from_name(s).ok_or_else(|| {
            let names: Vec<&str> = Segment::ALL.iter().map(|s| s.name()).collect();
            format!("unknown segment '{}' (expected one of {})", s, names.join(", "))
        })
    }

    fn parse_seconds(s: &str) -> Result<Duration, String> {
        let secs: f64 = s.parse().map_err(|e| format!("{}", e))?;
        seconds_setting("--seconds", secs).map_err(|e| e.to_string())
    }

    /// Prints every screen to stdout as `[line0 | line1]`.
    #[derive(Default)]
    struct ConsoleDisplay {
        lines: [String; 2],
    }

    impl TextDisplay for ConsoleDisplay {
        fn clear(&mut self) {
            self.lines = Default::default();
        }

        fn write_line(&mut self, row: usize, text: &str) {
            let row = row.min(1);
            self.lines[row] = text.chars().take(LCD_COLS).collect();
            if row == 1 {
                println!("[{:<16} | {:<16}]", self.lines[0], self.lines[1]);
            }
        }

        fn set_blink(&mut self, _on: bool) {}

        fn set_cursor_row(&mut self, _row: usize) {}
    }

    struct Sim {
        clock: Rc<dyn Clock>,
        body: Rc<RefCell<MockBody>>,
        config: CoachConfig,
    }

    impl Sim {
        fn sensors(&self) -> SensorBus {
            SensorBus::new(self.body.clone(), self.clock.clone(), self.config.read_timeout())
        }
    }

    pub fn run() -> anyhow::Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        let args = Args::parse();

        let config = match &args.config {
            Some(path) => CoachConfig::from_file(path)?,
            None => CoachConfig::default(),
        };

        let posture = match args.posture {
            PostureArg::Good => Posture::Upright,
            PostureArg::Bad => Posture::Slouched,
        };
        let mut body = MockBody::with_posture(posture);
        for segment in &args.fail {
            log::info!("Injecting failure on {}", segment);
            body.fail(*segment);
        }

        let clock: Rc<dyn Clock> = if args.fast {
            Rc::new(ManualClock::new())
        } else {
            Rc::new(SystemClock::new())
        };
        let sim = Sim {
            clock,
            body: Rc::new(RefCell::new(body)),
            config,
        };

        let model_path = args
            .model
            .clone()
            .unwrap_or_else(|| PathBuf::from(&sim.config.model_path));

        match args.command {
            Command::Check => check(&sim, &model_path),
            Command::Monitor { seconds } => monitor(&sim, &model_path, seconds),
            Command::Capture { label, seconds, out } => {
                let session = seconds.unwrap_or_else(|| sim.config.capture_session());
                capture(&sim, &label, session, &out)
            }
            Command::Read { stream, samples } => read(&sim, stream, samples),
        }
    }

    fn controller(
        sim: &Sim,
        model_path: &Path,
        nav: &ScriptedButton,
        sel: &ScriptedButton,
        buzzer: &MockBuzzerPin,
    ) -> anyhow::Result<ModeController> {
        let model = ModelPackage::load(model_path)?;
        let mut sensors = sim.sensors();
        sensors.probe()?;

        let board = Board {
            sensors,
            screen: Screen::new(Box::new(ConsoleDisplay::default())),
            buzzer: Buzzer::new(Box::new(buzzer.clone())),
            nav_button: Box::new(nav.clone()),
            sel_button: Box::new(sel.clone()),
            clock: sim.clock.clone(),
        };
        Ok(ModeController::new(board, Box::new(model), &sim.config))
    }

    fn check(sim: &Sim, model_path: &Path) -> anyhow::Result<()> {
        let nav = ScriptedButton::new(sim.clock.clone());
        let sel = ScriptedButton::new(sim.clock.clone());
        let buzzer = MockBuzzerPin::shared(sim.clock.clone());
        let mut controller = controller(sim, model_path, &nav, &sel, &buzzer)?;

        match controller.check_once() {
            CheckOutcome::Posture(result) => println!(
                "{} ({}): {} beep(s)",
                result.label,
                if result.is_good { "good" } else { "bad" },
                buzzer.pulse_count()
            ),
            other => println!("{:?}: {} beep(s)", other, buzzer.pulse_count()),
        }
        Ok(())
    }

    fn monitor(sim: &Sim, model_path: &Path, seconds: Duration) -> anyhow::Result<()> {
        let press = Duration::from_millis(60);
        let enter_at = sim.clock.now() + Duration::from_millis(500);
        let stop_at = enter_at + seconds;

        // Navigate to B, select it, then select again to stop.
        let nav = ScriptedButton::new(sim.clock.clone());
        let sel = ScriptedButton::new(sim.clock.clone());
        nav.press_at(sim.clock.now() + Duration::from_millis(100), press);
        sel.press_at(enter_at, press);
        sel.press_at(stop_at, press);

        let buzzer = MockBuzzerPin::shared(sim.clock.clone());
        let mut controller = controller(sim, model_path, &nav, &sel, &buzzer)?;
        controller.start();

        let mut entered = false;
        loop {
            controller.step();
            match controller.state() {
                ModeState::Monitoring => entered = true,
                ModeState::MenuBrowsing(_) if entered => break,
                _ => {}
            }
        }

        println!(
            "Monitored for {:.1} s: {} alert(s)",
            seconds.as_secs_f64(),
            buzzer.pulse_count()
        );
        Ok(())
    }

    fn capture(sim: &Sim, label: &str, session: Duration, out: &Path) -> anyhow::Result<()> {
        let mut sensors = sim.sensors();
        sensors.probe()?;
        let mut writer = CaptureWriter::open_append(out)?;

        println!("Recording '{}' for {:.1} s…", label, session.as_secs_f64());
        let written = capture::capture_session(
            &mut sensors,
            &mut writer,
            sim.clock.as_ref(),
            label,
            session,
            sim.config.capture_interval(),
        )?;
        println!(
            "Saved {} rows; {} total in {}",
            written,
            capture::count_rows(out)?,
            out.display()
        );
        Ok(())
    }

    fn read(sim: &Sim, stream: bool, samples: Option<usize>) -> anyhow::Result<()> {
        let mut sensors = sim.sensors();
        let missing = sensors.probe()?;
        if !missing.is_empty() {
            log::warn!("{} sensor(s) not responding", missing.len());
        }

        let passes = if stream { samples } else { Some(1) };
        let interval = sim.config.sample_interval();
        let mut next = sim.clock.now();
        let mut taken = 0;
        while passes.map_or(true, |n| taken < n) {
            if taken > 0 {
                println!();
            }
            println!("{}", sensors.read_all_segments());
            taken += 1;

            next += interval;
            let now = sim.clock.now();
            if stream && next > now {
                sim.clock.sleep(next - now);
            }
        }
        Ok(())
    }
}
