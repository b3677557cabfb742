//! Face observation model produced by template preprocessing.
//!
//! Observations are created once, during preprocessing, and never mutated.
//! The `index` field is the detection-order position and is the addressing
//! key used by mapping rules.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Gender
// ---------------------------------------------------------------------------

/// Gender classification reported by the face-analysis engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

// ---------------------------------------------------------------------------
// BoundingBox
// ---------------------------------------------------------------------------

/// Axis-aligned face bounding box in pixel coordinates, `[x1, y1, x2, y2]`
/// with an exclusive bottom-right corner. Detector output may extend past
/// the image edges; use [`BoundingBox::clamped`] before touching pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Clamp the box to an image of `width` x `height` pixels.
    ///
    /// The result is always inside the image; a box entirely outside the
    /// image collapses to an empty region on the nearest edge.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let w = width as i32;
        let h = height as i32;
        let x1 = self.x1.clamp(0, w);
        let x2 = self.x2.clamp(0, w);
        let y1 = self.y1.clamp(0, h);
        let y2 = self.y2.clamp(0, h);
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).max(0) as u32
    }

    /// True when the box covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

// ---------------------------------------------------------------------------
// FaceObservation
// ---------------------------------------------------------------------------

/// One detected face. Produced by preprocessing, persisted on the template
/// as an ordered sequence, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceObservation {
    /// Position in detection order; stable addressing key for mappings.
    pub index: u32,
    pub bbox: BoundingBox,
    pub gender: Gender,
    pub confidence: f32,
}

/// Partition face indices by gender, preserving detection order.
///
/// Returns `(male_indices, female_indices)`. `Unknown` faces belong to
/// neither group.
pub fn partition_by_gender(faces: &[FaceObservation]) -> (Vec<u32>, Vec<u32>) {
    let mut male = Vec::new();
    let mut female = Vec::new();
    for face in faces {
        match face.gender {
            Gender::Male => male.push(face.index),
            Gender::Female => female.push(face.index),
            Gender::Unknown => {}
        }
    }
    (male, female)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn face(index: u32, gender: Gender) -> FaceObservation {
        FaceObservation {
            index,
            bbox: BoundingBox::new(0, 0, 10, 10),
            gender,
            confidence: 0.9,
        }
    }

    // -- BoundingBox ----------------------------------------------------------

    #[test]
    fn clamp_inside_is_identity() {
        let b = BoundingBox::new(10, 20, 30, 40);
        assert_eq!(b.clamped(100, 100), b);
    }

    #[test]
    fn clamp_truncates_overflow() {
        let b = BoundingBox::new(-5, -5, 150, 80);
        let c = b.clamped(100, 60);
        assert_eq!(c, BoundingBox::new(0, 0, 100, 60));
    }

    #[test]
    fn clamp_fully_outside_collapses_to_empty() {
        let b = BoundingBox::new(200, 200, 300, 300);
        let c = b.clamped(100, 100);
        assert!(c.is_empty());
    }

    #[test]
    fn width_height_of_degenerate_box_is_zero() {
        let b = BoundingBox::new(50, 50, 50, 50);
        assert_eq!(b.width(), 0);
        assert_eq!(b.height(), 0);
        assert!(b.is_empty());
    }

    // -- partition_by_gender --------------------------------------------------

    #[test]
    fn partition_keeps_detection_order() {
        let faces = vec![
            face(0, Gender::Female),
            face(1, Gender::Male),
            face(2, Gender::Female),
            face(3, Gender::Male),
        ];
        let (male, female) = partition_by_gender(&faces);
        assert_eq!(male, vec![1, 3]);
        assert_eq!(female, vec![0, 2]);
    }

    #[test]
    fn partition_skips_unknown() {
        let faces = vec![face(0, Gender::Unknown), face(1, Gender::Male)];
        let (male, female) = partition_by_gender(&faces);
        assert_eq!(male, vec![1]);
        assert!(female.is_empty());
    }

    // -- serde ----------------------------------------------------------------

    #[test]
    fn gender_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Gender::Male).unwrap(), "\"male\"");
        assert_eq!(
            serde_json::to_string(&Gender::Unknown).unwrap(),
            "\"unknown\""
        );
    }

    #[test]
    fn face_observation_round_trips() {
        let f = face(2, Gender::Female);
        let json = serde_json::to_string(&f).unwrap();
        let back: FaceObservation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.index, 2);
        assert_eq!(back.gender, Gender::Female);
    }
}
