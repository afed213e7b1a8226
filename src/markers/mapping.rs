//! Pairs each source marker with its landmark destination, translating the
//! landmark out of the capture's crop space into surface coordinates.

use serde::Serialize;

use crate::capture::ViewportCapture;
use crate::common::Point;
use crate::landmarks::{LandmarkName, LandmarkSet};
use crate::markers::MarkerInventory;

#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub name: LandmarkName,
    pub source: Point,
    pub destination: Point,
}

/// The eight drag gestures, in the canonical landmark order.
#[derive(Debug, Clone, Serialize)]
pub struct PlacementPlan {
    placements: Vec<Placement>,
}

impl PlacementPlan {
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }
}

pub fn map_markers(
    inventory: &MarkerInventory,
    landmarks: &LandmarkSet,
    capture: &ViewportCapture,
) -> PlacementPlan {
    let source_for = |name: LandmarkName| -> Point {
        match name {
            LandmarkName::Chin => inventory.chin.position,
            LandmarkName::Groin => inventory.groin.position,
            // Pairs are stored [body-right, body-left].
            LandmarkName::RightWrist => inventory.wrists[0].position,
            LandmarkName::LeftWrist => inventory.wrists[1].position,
            LandmarkName::RightElbow => inventory.elbows[0].position,
            LandmarkName::LeftElbow => inventory.elbows[1].position,
            LandmarkName::RightKnee => inventory.knees[0].position,
            LandmarkName::LeftKnee => inventory.knees[1].position,
        }
    };

    let placements = LandmarkName::ALL
        .into_iter()
        .map(|name| Placement {
            name,
            source: source_for(name),
            destination: capture.to_surface(landmarks.get(name)),
        })
        .collect();

    PlacementPlan { placements }
}
