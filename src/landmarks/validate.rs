//! Geometric consistency checks for a detected landmark set.
//!
//! Pure function over the set and the capture dimensions. All checks run and
//! all violations are collected; a set is accepted only when the returned
//! list is empty.

use serde::Deserialize;

use super::{LandmarkName, LandmarkSet};

/// Symmetry tolerances, as fractions of the capture dimensions.
///
/// These were calibrated against observed rigger behavior rather than any
/// documented contract, so they are configuration, not constants.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    pub wrist_y_tolerance: f64,
    pub knee_x_tolerance: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            wrist_y_tolerance: 0.15,
            knee_x_tolerance: 0.15,
        }
    }
}

pub fn validate(set: &LandmarkSet, width: u32, height: u32, tol: &Tolerances) -> Vec<String> {
    let mut violations = Vec::new();

    check_bounds(set, width, height, &mut violations);
    check_vertical_order(set, &mut violations);
    check_symmetry(set, width, height, tol, &mut violations);
    check_mirrored_sides(set, &mut violations);

    violations
}

fn check_bounds(set: &LandmarkSet, width: u32, height: u32, violations: &mut Vec<String>) {
    for (name, lm) in set.iter() {
        if lm.x >= width || lm.y >= height {
            violations.push(format!(
                "{name} at ({}, {}) is outside the {width}x{height} capture",
                lm.x, lm.y
            ));
        }
    }
}

/// Top-left origin: y grows downward, so "above" means a smaller y.
fn check_vertical_order(set: &LandmarkSet, violations: &mut Vec<String>) {
    let chin = set.get(LandmarkName::Chin);
    let groin = set.get(LandmarkName::Groin);

    if chin.y >= groin.y {
        violations.push(format!(
            "chin (y={}) must be above the groin (y={})",
            chin.y, groin.y
        ));
    }
    for knee in [LandmarkName::LeftKnee, LandmarkName::RightKnee] {
        let k = set.get(knee);
        if groin.y >= k.y {
            violations.push(format!(
                "groin (y={}) must be above {knee} (y={})",
                groin.y, k.y
            ));
        }
    }
}

fn check_symmetry(
    set: &LandmarkSet,
    width: u32,
    height: u32,
    tol: &Tolerances,
    violations: &mut Vec<String>,
) {
    let lw = set.get(LandmarkName::LeftWrist);
    let rw = set.get(LandmarkName::RightWrist);
    let wrist_dy = (lw.y as f64 - rw.y as f64).abs();
    let max_dy = tol.wrist_y_tolerance * height as f64;
    if wrist_dy > max_dy {
        violations.push(format!(
            "wrists differ by {wrist_dy:.0}px in height, more than {max_dy:.0}px allowed"
        ));
    }

    let groin = set.get(LandmarkName::Groin);
    let lk = set.get(LandmarkName::LeftKnee);
    let rk = set.get(LandmarkName::RightKnee);
    let left_reach = (lk.x as f64 - groin.x as f64).abs();
    let right_reach = (rk.x as f64 - groin.x as f64).abs();
    let knee_skew = (left_reach - right_reach).abs();
    let max_skew = tol.knee_x_tolerance * width as f64;
    if knee_skew > max_skew {
        violations.push(format!(
            "knee distances from the groin differ by {knee_skew:.0}px, more than {max_skew:.0}px allowed"
        ));
    }
}

/// The character faces the viewer, so its left arm must sit entirely on one
/// horizontal side of the chin and the right arm on the other, with each
/// wrist further out than its elbow.
fn check_mirrored_sides(set: &LandmarkSet, violations: &mut Vec<String>) {
    let chin_x = set.get(LandmarkName::Chin).x as i64;

    let side = |name: LandmarkName| -> i64 { set.get(name).x as i64 - chin_x };

    let lw = side(LandmarkName::LeftWrist);
    let le = side(LandmarkName::LeftElbow);
    let rw = side(LandmarkName::RightWrist);
    let re = side(LandmarkName::RightElbow);

    if lw == 0 || le == 0 || rw == 0 || re == 0 {
        violations.push("an arm landmark sits exactly on the chin's vertical axis".to_string());
        return;
    }

    if lw.signum() != le.signum() {
        violations
            .push("left wrist and left elbow are on opposite sides of the chin".to_string());
    }
    if rw.signum() != re.signum() {
        violations
            .push("right wrist and right elbow are on opposite sides of the chin".to_string());
    }
    if lw.signum() == rw.signum() {
        violations.push("left and right arms are on the same side of the chin".to_string());
    }

    if lw.abs() <= le.abs() {
        violations.push("left wrist must be further from the chin than the left elbow".to_string());
    }
    if rw.abs() <= re.abs() {
        violations
            .push("right wrist must be further from the chin than the right elbow".to_string());
    }
}
