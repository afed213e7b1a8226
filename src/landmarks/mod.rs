//! Anatomical landmark domain types.
//!
//! A [`LandmarkSet`] always holds exactly one pixel position for each of the
//! eight named points; partial sets cannot be constructed and therefore never
//! reach the validator or the marker mapper.

pub mod acquire;
pub mod validate;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::VisionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LandmarkName {
    #[serde(rename = "chin")]
    Chin,
    #[serde(rename = "left-wrist")]
    LeftWrist,
    #[serde(rename = "right-wrist")]
    RightWrist,
    #[serde(rename = "left-elbow")]
    LeftElbow,
    #[serde(rename = "right-elbow")]
    RightElbow,
    #[serde(rename = "left-knee")]
    LeftKnee,
    #[serde(rename = "right-knee")]
    RightKnee,
    #[serde(rename = "groin")]
    Groin,
}

impl LandmarkName {
    /// The eight landmarks in their canonical placement order.
    pub const ALL: [LandmarkName; 8] = [
        LandmarkName::Chin,
        LandmarkName::LeftWrist,
        LandmarkName::RightWrist,
        LandmarkName::LeftElbow,
        LandmarkName::RightElbow,
        LandmarkName::LeftKnee,
        LandmarkName::RightKnee,
        LandmarkName::Groin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LandmarkName::Chin => "chin",
            LandmarkName::LeftWrist => "left-wrist",
            LandmarkName::RightWrist => "right-wrist",
            LandmarkName::LeftElbow => "left-elbow",
            LandmarkName::RightElbow => "right-elbow",
            LandmarkName::LeftKnee => "left-knee",
            LandmarkName::RightKnee => "right-knee",
            LandmarkName::Groin => "groin",
        }
    }

    pub fn parse(s: &str) -> Option<LandmarkName> {
        LandmarkName::ALL.into_iter().find(|n| n.as_str() == s)
    }
}

impl std::fmt::Display for LandmarkName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One landmark position, in pixels relative to the capture it was detected
/// on (top-left origin, y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: u32,
    pub y: u32,
}

impl Landmark {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Confidence label the vision model attaches to its own answer. Recorded in
/// diagnostics and logs; acceptance is gated on geometry alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        };
        f.write_str(s)
    }
}

/// A complete mapping of all eight landmark names to one position each.
#[derive(Debug, Clone, Serialize)]
pub struct LandmarkSet {
    points: IndexMap<LandmarkName, Landmark>,
}

impl LandmarkSet {
    /// Builds a set from (name, landmark) pairs. Every one of the eight names
    /// must appear exactly once; anything else is a parse-level failure.
    pub fn from_points(
        pairs: impl IntoIterator<Item = (LandmarkName, Landmark)>,
    ) -> Result<Self, VisionError> {
        let mut collected = IndexMap::with_capacity(LandmarkName::ALL.len());
        for (name, landmark) in pairs {
            if collected.insert(name, landmark).is_some() {
                return Err(VisionError::Parse(format!("duplicate landmark '{name}'")));
            }
        }
        // Canonical iteration order regardless of input order.
        let mut points = IndexMap::with_capacity(LandmarkName::ALL.len());
        for name in LandmarkName::ALL {
            match collected.swap_remove(&name) {
                Some(landmark) => {
                    points.insert(name, landmark);
                }
                None => return Err(VisionError::Parse(format!("missing landmark '{name}'"))),
            }
        }
        Ok(Self { points })
    }

    pub fn get(&self, name: LandmarkName) -> Landmark {
        // Complete by construction.
        self.points[&name]
    }

    pub fn iter(&self) -> impl Iterator<Item = (LandmarkName, Landmark)> + '_ {
        self.points.iter().map(|(n, l)| (*n, *l))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_pairs() -> Vec<(LandmarkName, Landmark)> {
        LandmarkName::ALL
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, Landmark::new(i as u32 * 10, i as u32 * 20)))
            .collect()
    }

    #[test]
    fn complete_set_is_accepted_in_canonical_order() {
        let mut pairs = full_pairs();
        pairs.reverse();
        let set = LandmarkSet::from_points(pairs).unwrap();
        let names: Vec<_> = set.iter().map(|(n, _)| n).collect();
        assert_eq!(names, LandmarkName::ALL);
    }

    #[test]
    fn missing_landmark_is_rejected() {
        let mut pairs = full_pairs();
        pairs.pop();
        let err = LandmarkSet::from_points(pairs).unwrap_err();
        assert!(err.to_string().contains("missing landmark 'groin'"));
    }

    #[test]
    fn duplicate_landmark_is_rejected() {
        let mut pairs = full_pairs();
        pairs.push((LandmarkName::Chin, Landmark::new(1, 1)));
        let err = LandmarkSet::from_points(pairs).unwrap_err();
        assert!(err.to_string().contains("duplicate landmark 'chin'"));
    }

    #[test]
    fn name_round_trips_through_parse() {
        for name in LandmarkName::ALL {
            assert_eq!(LandmarkName::parse(name.as_str()), Some(name));
        }
        assert_eq!(LandmarkName::parse("left-ankle"), None);
    }
}
