//! Parsing of the model's landmark answer.
//!
//! Anything short of exactly eight named coordinate pairs plus a confidence
//! label is a parse failure; the caller treats that the same as a geometric
//! validation failure.

use serde_json::Value;

use crate::error::VisionError;
use crate::landmarks::{Confidence, Landmark, LandmarkName, LandmarkSet};

pub fn parse_landmark_response(raw: &str) -> Result<(LandmarkSet, Confidence), VisionError> {
    let json = extract_json_object(raw)?;
    let object = json
        .as_object()
        .ok_or_else(|| VisionError::Parse("response is not a JSON object".to_string()))?;

    let mut pairs = Vec::with_capacity(LandmarkName::ALL.len());
    for name in LandmarkName::ALL {
        let entry = object
            .get(name.as_str())
            .ok_or_else(|| VisionError::Parse(format!("missing landmark '{name}'")))?;
        pairs.push((name, parse_point(name, entry)?));
    }

    let confidence = match object.get("confidence").and_then(Value::as_str) {
        Some("high") => Confidence::High,
        Some("medium") => Confidence::Medium,
        Some("low") => Confidence::Low,
        Some(other) => {
            return Err(VisionError::Parse(format!(
                "unrecognized confidence label '{other}'"
            )))
        }
        None => return Err(VisionError::Parse("missing confidence label".to_string())),
    };

    Ok((LandmarkSet::from_points(pairs)?, confidence))
}

fn parse_point(name: LandmarkName, entry: &Value) -> Result<Landmark, VisionError> {
    let coord = |axis: &str| -> Result<u32, VisionError> {
        let value = entry
            .get(axis)
            .ok_or_else(|| VisionError::Parse(format!("landmark '{name}' missing {axis}")))?;
        let number = value.as_i64().or_else(|| {
            // Models occasionally answer with non-integral pixels.
            value.as_f64().map(|f| f.round() as i64)
        });
        match number {
            Some(n) if n >= 0 => Ok(n as u32),
            Some(n) => Err(VisionError::Parse(format!(
                "landmark '{name}' has negative {axis} {n}"
            ))),
            None => Err(VisionError::Parse(format!(
                "landmark '{name}' has non-numeric {axis}"
            ))),
        }
    };
    Ok(Landmark::new(coord("x")?, coord("y")?))
}

/// Pulls the first JSON object out of the answer, tolerating code fences and
/// surrounding prose.
fn extract_json_object(raw: &str) -> Result<Value, VisionError> {
    let trimmed = raw.trim();
    let start = trimmed
        .find('{')
        .ok_or_else(|| VisionError::Parse("no JSON object in response".to_string()))?;
    let end = trimmed
        .rfind('}')
        .ok_or_else(|| VisionError::Parse("no JSON object in response".to_string()))?;
    if end < start {
        return Err(VisionError::Parse("no JSON object in response".to_string()));
    }
    serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| VisionError::Parse(format!("invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"{
        "chin": {"x": 400, "y": 80},
        "left-wrist": {"x": 650, "y": 150},
        "right-wrist": {"x": 150, "y": 150},
        "left-elbow": {"x": 560, "y": 150},
        "right-elbow": {"x": 240, "y": 150},
        "left-knee": {"x": 440, "y": 420},
        "right-knee": {"x": 360, "y": 420},
        "groin": {"x": 400, "y": 300},
        "confidence": "high"
    }"#;

    #[test]
    fn well_formed_response_parses() {
        let (set, confidence) = parse_landmark_response(GOOD).unwrap();
        assert_eq!(confidence, Confidence::High);
        assert_eq!(set.get(LandmarkName::Chin), Landmark::new(400, 80));
        assert_eq!(set.get(LandmarkName::LeftWrist), Landmark::new(650, 150));
    }

    #[test]
    fn code_fences_and_prose_are_tolerated() {
        let wrapped = format!("Here are the landmarks:\n```json\n{GOOD}\n```\n");
        let (set, _) = parse_landmark_response(&wrapped).unwrap();
        assert_eq!(set.get(LandmarkName::Groin), Landmark::new(400, 300));
    }

    #[test]
    fn fractional_pixels_are_rounded() {
        let raw = GOOD.replace("\"x\": 400, \"y\": 80", "\"x\": 399.6, \"y\": 80.2");
        let (set, _) = parse_landmark_response(&raw).unwrap();
        assert_eq!(set.get(LandmarkName::Chin), Landmark::new(400, 80));
    }

    #[test]
    fn missing_landmark_is_a_parse_failure() {
        let raw = GOOD.replace("\"groin\": {\"x\": 400, \"y\": 300},", "");
        let err = parse_landmark_response(&raw).unwrap_err();
        assert!(matches!(err, VisionError::Parse(_)));
        assert!(err.to_string().contains("groin"));
    }

    #[test]
    fn missing_confidence_is_a_parse_failure() {
        let raw = GOOD.replace(",\n        \"confidence\": \"high\"", "");
        let err = parse_landmark_response(&raw).unwrap_err();
        assert!(err.to_string().contains("confidence"));
    }

    #[test]
    fn negative_coordinate_is_a_parse_failure() {
        let raw = GOOD.replace("\"x\": 150", "\"x\": -3");
        let err = parse_landmark_response(&raw).unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn prose_without_json_is_a_parse_failure() {
        let err = parse_landmark_response("I cannot identify the landmarks.").unwrap_err();
        assert!(matches!(err, VisionError::Parse(_)));
    }
}
