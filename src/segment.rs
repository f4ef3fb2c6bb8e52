// Posture Coach — Body Segments & Orientation Readings

use crate::config::{I2C_ADDR_MPU6050, I2C_ADDR_MPU6050_ALT};

// ---------------------------------------------------------------------------
// Segment — the ten instrumented body locations
// ---------------------------------------------------------------------------

/// One instrumented body location.
///
/// Declaration order is the feature order the classifier was trained with.
/// Everything that lays out per-segment data (snapshots, feature vectors,
/// capture columns) derives its order from [`Segment::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    LeftThigh,
    LeftCalf,
    RightThigh,
    RightCalf,
    UpperMidBack,
    UpperBack,
    RightShoulder,
    LeftShoulder,
    LowerMidBack,
    LowerBack,
}

pub const SEGMENT_COUNT: usize = 10;

/// Where a segment's sensor lives on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorPort {
    /// Behind the multiplexer, at the shared sensor address.
    Multiplexed { channel: u8 },
    /// Directly on the bus at its own address.
    Direct { addr: u8 },
}

impl Segment {
    pub const ALL: [Segment; SEGMENT_COUNT] = [
        Segment::LeftThigh,
        Segment::LeftCalf,
        Segment::RightThigh,
        Segment::RightCalf,
        Segment::UpperMidBack,
        Segment::UpperBack,
        Segment::RightShoulder,
        Segment::LeftShoulder,
        Segment::LowerMidBack,
        Segment::LowerBack,
    ];

    /// Bus read order: multiplexed sensors by channel index, then the direct
    /// sensors by address.
    pub const READ_ORDER: [Segment; SEGMENT_COUNT] = [
        Segment::LeftThigh,     // ch 0
        Segment::LeftCalf,      // ch 1
        Segment::RightCalf,     // ch 2
        Segment::RightThigh,    // ch 3
        Segment::UpperMidBack,  // ch 4
        Segment::UpperBack,     // ch 5
        Segment::RightShoulder, // ch 6
        Segment::LeftShoulder,  // ch 7
        Segment::LowerMidBack,  // 0x68
        Segment::LowerBack,     // 0x69
    ];

    /// Position in [`Segment::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::LeftThigh     => "left_thigh",
            Self::LeftCalf      => "left_calf",
            Self::RightThigh    => "right_thigh",
            Self::RightCalf     => "right_calf",
            Self::UpperMidBack  => "upper_mid_back",
            Self::UpperBack     => "upper_back",
            Self::RightShoulder => "right_shoulder",
            Self::LeftShoulder  => "left_shoulder",
            Self::LowerMidBack  => "lower_mid_back",
            Self::LowerBack     => "lower_back",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn port(self) -> SensorPort {
        match self {
            Self::LeftThigh     => SensorPort::Multiplexed { channel: 0 },
            Self::LeftCalf      => SensorPort::Multiplexed { channel: 1 },
            Self::RightCalf     => SensorPort::Multiplexed { channel: 2 },
            Self::RightThigh    => SensorPort::Multiplexed { channel: 3 },
            Self::UpperMidBack  => SensorPort::Multiplexed { channel: 4 },
            Self::UpperBack     => SensorPort::Multiplexed { channel: 5 },
            Self::RightShoulder => SensorPort::Multiplexed { channel: 6 },
            Self::LeftShoulder  => SensorPort::Multiplexed { channel: 7 },
            Self::LowerMidBack  => SensorPort::Direct { addr: I2C_ADDR_MPU6050 },
            Self::LowerBack     => SensorPort::Direct { addr: I2C_ADDR_MPU6050_ALT },
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Angles — one sensor's tilt, degrees
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Angles {
    pub pitch: f64,
    pub roll: f64,
}

impl Angles {
    /// Tilt from a gravity-dominated acceleration vector. Units cancel, so raw
    /// counts, g and m/s² all give the same result. Rapid motion adds linear
    /// acceleration to the vector and skews both angles.
    pub fn from_accel(ax: f64, ay: f64, az: f64) -> Self {
        let pitch = (-ax).atan2((ay * ay + az * az).sqrt()).to_degrees();
        let roll = ay.atan2(az).to_degrees();
        Self {
            pitch: round3(pitch),
            roll: round3(roll),
        }
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

// ---------------------------------------------------------------------------
// Snapshot — every segment at one instant
// ---------------------------------------------------------------------------

/// One sampling pass. `None` marks a segment whose sensor was unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Snapshot {
    readings: [Option<Angles>; SEGMENT_COUNT],
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, segment: Segment, reading: Option<Angles>) {
        self.readings[segment.index()] = reading;
    }

    pub fn get(&self, segment: Segment) -> Option<Angles> {
        self.readings[segment.index()]
    }

    /// Readings in [`Segment::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Segment, Option<Angles>)> + '_ {
        Segment::ALL.into_iter().map(move |s| (s, self.get(s)))
    }

    pub fn missing(&self) -> Vec<Segment> {
        self.iter()
            .filter(|(_, r)| r.is_none())
            .map(|(s, _)| s)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.readings.iter().all(Option::is_some)
    }
}

/// One line per segment in bus read order, e.g.
/// `upper_back      pitch   28.000  roll    0.000` or `left_calf       unavailable`.
impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in Segment::READ_ORDER.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match self.get(*segment) {
                Some(a) => write!(f, "{:<15} pitch {:>8.3}  roll {:>8.3}", segment.name(), a.pitch, a.roll)?,
                None => write!(f, "{:<15} unavailable", segment.name())?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_sensor_reads_zero() {
        let a = Angles::from_accel(0.0, 0.0, 1.0);
        assert_eq!(a, Angles { pitch: 0.0, roll: 0.0 });
    }

    #[test]
    fn forward_tilt_is_negative_x() {
        // 45° about the left-right axis: gravity split between -x and z.
        let a = Angles::from_accel(-0.5, 0.0, 0.5);
        assert_eq!(a.pitch, 45.0);
        assert_eq!(a.roll, 0.0);
    }

    #[test]
    fn angles_round_to_three_decimals() {
        let a = Angles::from_accel(0.1, 0.2, 0.97);
        assert_eq!(a.pitch, -5.766);
        assert_eq!(a.roll, 11.65);
    }

    #[test]
    fn read_order_covers_every_segment_once() {
        let mut seen = Segment::READ_ORDER.to_vec();
        seen.sort();
        assert_eq!(seen, Segment::ALL.to_vec());

        // Multiplexed first, by channel index.
        for (i, seg) in Segment::READ_ORDER[..8].iter().enumerate() {
            assert_eq!(seg.port(), SensorPort::Multiplexed { channel: i as u8 });
        }
        assert!(matches!(Segment::READ_ORDER[8].port(), SensorPort::Direct { addr: 0x68 }));
        assert!(matches!(Segment::READ_ORDER[9].port(), SensorPort::Direct { addr: 0x69 }));
    }

    #[test]
    fn names_round_trip() {
        for seg in Segment::ALL {
            assert_eq!(Segment::from_name(seg.name()), Some(seg));
        }
        assert_eq!(Segment::from_name("left_ear"), None);
    }

    #[test]
    fn snapshot_tracks_missing_segments() {
        let mut snap = Snapshot::new();
        for seg in Segment::ALL {
            snap.set(seg, Some(Angles { pitch: 1.0, roll: 2.0 }));
        }
        assert!(snap.is_complete());

        snap.set(Segment::UpperBack, None);
        assert!(!snap.is_complete());
        assert_eq!(snap.missing(), vec![Segment::UpperBack]);
    }

    #[test]
    fn snapshot_prints_one_line_per_segment() {
        let mut snap = Snapshot::new();
        for seg in Segment::ALL {
            snap.set(seg, Some(Angles { pitch: 0.0, roll: 0.0 }));
        }
        snap.set(Segment::UpperBack, Some(Angles { pitch: 28.0, roll: -1.5 }));
        snap.set(Segment::LeftCalf, None);

        let text = snap.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), SEGMENT_COUNT);
        assert!(lines[0].starts_with("left_thigh "));
        assert_eq!(lines[1], "left_calf       unavailable");
        assert_eq!(lines[5], "upper_back      pitch   28.000  roll   -1.500");
        assert!(lines[9].starts_with("lower_back "));
    }
}
