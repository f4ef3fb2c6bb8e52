// Posture Coach — Feature Assembler
//
// Flattens a snapshot into the 20-slot layout the classifier was trained on:
// `Segment::ALL` × [pitch, roll].  Capture tolerates gaps (partial vectors),
// inference does not (complete vectors).

use crate::error::{Error, Result};
use crate::segment::{Segment, Snapshot, SEGMENT_COUNT};

pub const FEATURE_COUNT: usize = SEGMENT_COUNT * 2;
pub const ANGLE_NAMES: [&str; 2] = ["pitch", "roll"];

/// Column names in slot order, e.g. `left_thigh_pitch`, `left_thigh_roll`, …
pub fn feature_columns() -> Vec<String> {
    Segment::ALL
        .iter()
        .flat_map(|s| ANGLE_NAMES.iter().map(move |a| format!("{}_{}", s.name(), a)))
        .collect()
}

/// Slot of a segment's angle (0 = pitch, 1 = roll).
pub fn slot(segment: Segment, angle: usize) -> usize {
    segment.index() * 2 + angle
}

/// Feature vector that may have holes. Used for data capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialVector(pub [Option<f64>; FEATURE_COUNT]);

/// Feature vector with every slot filled. The only input the classifier takes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompleteVector(pub [f64; FEATURE_COUNT]);

impl PartialVector {
    pub fn values(&self) -> &[Option<f64>; FEATURE_COUNT] {
        &self.0
    }
}

impl CompleteVector {
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }
}

pub fn to_partial_vector(snapshot: &Snapshot) -> PartialVector {
    let mut slots = [None; FEATURE_COUNT];
    for (segment, reading) in snapshot.iter() {
        if let Some(a) = reading {
            slots[slot(segment, 0)] = Some(a.pitch);
            slots[slot(segment, 1)] = Some(a.roll);
        }
    }
    PartialVector(slots)
}

/// Fails, producing nothing, if any segment is unavailable.
pub fn to_complete_vector(snapshot: &Snapshot) -> Result<CompleteVector> {
    if !snapshot.is_complete() {
        return Err(Error::IncompleteFeatureVector {
            missing: snapshot.missing(),
        });
    }

    let mut slots = [0.0; FEATURE_COUNT];
    for (segment, reading) in snapshot.iter() {
        if let Some(a) = reading {
            slots[slot(segment, 0)] = a.pitch;
            slots[slot(segment, 1)] = a.roll;
        }
    }
    Ok(CompleteVector(slots))
}
