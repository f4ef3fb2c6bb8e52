// Posture Coach — Data Capture
//
// Records labelled snapshots for offline training.  One CSV row per sample:
// timestamp, label, then the 20 feature slots in classifier order.  Missing
// segments are written as empty fields and cleaned offline, so capture never
// drops a sample for a gap.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::LABELS;
use crate::error::{Error, Result};
use crate::features::{feature_columns, to_partial_vector, PartialVector};
use crate::hal::Clock;
use crate::sensor_bus::SensorBus;

/// `timestamp,label,left_thigh_pitch,…,lower_back_roll`
pub fn header() -> String {
    let mut cols = vec!["timestamp".to_string(), "label".to_string()];
    cols.extend(feature_columns());
    cols.join(",")
}

pub struct CaptureWriter<W: Write> {
    out: W,
}

impl CaptureWriter<File> {
    /// Append to `path`, writing the header first if the file is new or empty.
    pub fn open_append<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = Self { out: file };
        if is_new {
            writer.write_header()?;
        }
        Ok(writer)
    }
}

impl<W: Write> CaptureWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_header(&mut self) -> Result<()> {
        writeln!(self.out, "{}", header())?;
        Ok(())
    }

    pub fn write_record(&mut self, timestamp: f64, label: &str, vector: &PartialVector) -> Result<()> {
        let mut line = format!("{},{}", round4(timestamp), label);
        for slot in vector.values() {
            line.push(',');
            if let Some(v) = slot {
                line.push_str(&v.to_string());
            }
        }
        writeln!(self.out, "{}", line)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Sample every `interval` for `session`, one row per pass. Returns the
/// number of rows written.
pub fn capture_session<W: Write>(
    sensors: &mut SensorBus,
    writer: &mut CaptureWriter<W>,
    clock: &dyn Clock,
    label: &str,
    session: Duration,
    interval: Duration,
) -> Result<usize> {
    if !LABELS.contains(&label) {
        return Err(Error::Config(format!(
            "unknown label '{}' (expected one of {:?})",
            label, LABELS
        )));
    }
    // The loop only ends once sleeping has advanced the clock.
    if interval.is_zero() {
        return Err(Error::Config("capture interval must be non-zero".into()));
    }

    let start = clock.now();
    let mut next = start;
    let mut count = 0;

    while clock.now().saturating_sub(start) < session {
        let snapshot = sensors.read_all_segments();
        writer.write_record(unix_seconds(), label, &to_partial_vector(&snapshot))?;
        count += 1;

        next += interval;
        let now = clock.now();
        if next > now {
            clock.sleep(next - now);
        }
    }

    writer.flush()?;
    log::info!("Captured {} '{}' samples", count, label);
    Ok(count)
}

/// Data rows in a capture file, header excluded. A missing file has none.
pub fn count_rows<P: AsRef<Path>>(path: P) -> Result<usize> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let lines = BufReader::new(file).lines().count();
    Ok(lines.saturating_sub(1))
}
