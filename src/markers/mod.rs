//! Source control tokens on the rigging surface: classification of their
//! visual class into roles and strict grouping before any placement.

pub mod mapping;

use serde::Serialize;

use crate::browser::MarkerToken;
use crate::common::Point;
use crate::error::MarkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerRole {
    Chin,
    Wrist,
    Elbow,
    Knee,
    Groin,
}

impl MarkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerRole::Chin => "chin",
            MarkerRole::Wrist => "wrist",
            MarkerRole::Elbow => "elbow",
            MarkerRole::Knee => "knee",
            MarkerRole::Groin => "groin",
        }
    }

    /// Bilateral roles occur in pairs, chin and groin singly.
    pub fn expected_count(&self) -> usize {
        match self {
            MarkerRole::Chin | MarkerRole::Groin => 1,
            MarkerRole::Wrist | MarkerRole::Elbow | MarkerRole::Knee => 2,
        }
    }
}

/// One draggable control token, classified.
#[derive(Debug, Clone, Serialize)]
pub struct MarkerCircle {
    pub role: MarkerRole,
    pub discriminator: String,
    pub position: Point,
}

/// Maps a token's visual class string onto its role.
///
/// The rigger names some of its marker sprites by body part and some only by
/// tint; both vocabularies observed on the live surface are covered here, in
/// one place, so recalibration after a markup change is a single edit.
pub fn classify_discriminator(discriminator: &str) -> Option<MarkerRole> {
    const TABLE: &[(&str, MarkerRole)] = &[
        ("chin", MarkerRole::Chin),
        ("wrist", MarkerRole::Wrist),
        ("hand", MarkerRole::Wrist),
        ("elbow", MarkerRole::Elbow),
        ("knee", MarkerRole::Knee),
        ("groin", MarkerRole::Groin),
        ("pelvis", MarkerRole::Groin),
        ("yellow", MarkerRole::Chin),
        ("magenta", MarkerRole::Wrist),
        ("pink", MarkerRole::Wrist),
        ("green", MarkerRole::Elbow),
        ("blue", MarkerRole::Knee),
        ("orange", MarkerRole::Groin),
    ];

    let d = discriminator.to_ascii_lowercase();
    TABLE
        .iter()
        .find(|(token, _)| d.contains(token))
        .map(|(_, role)| *role)
}

/// The full complement of eight markers, grouped by role. Bilateral pairs
/// are stored `[body-right, body-left]`: on a front-facing character the
/// smaller on-screen x is the character's right side.
#[derive(Debug, Clone, Serialize)]
pub struct MarkerInventory {
    pub chin: MarkerCircle,
    pub groin: MarkerCircle,
    pub wrists: [MarkerCircle; 2],
    pub elbows: [MarkerCircle; 2],
    pub knees: [MarkerCircle; 2],
}

pub fn group_markers(tokens: &[MarkerToken]) -> Result<MarkerInventory, MarkerError> {
    if tokens.len() != 8 {
        return Err(MarkerError::WrongCount {
            found: tokens.len(),
        });
    }

    let mut chins = Vec::new();
    let mut groins = Vec::new();
    let mut wrists = Vec::new();
    let mut elbows = Vec::new();
    let mut knees = Vec::new();

    for token in tokens {
        let role = classify_discriminator(&token.class)
            .ok_or_else(|| MarkerError::UnknownDiscriminator(token.class.clone()))?;
        let circle = MarkerCircle {
            role,
            discriminator: token.class.clone(),
            position: Point::new(token.x, token.y),
        };
        match role {
            MarkerRole::Chin => chins.push(circle),
            MarkerRole::Groin => groins.push(circle),
            MarkerRole::Wrist => wrists.push(circle),
            MarkerRole::Elbow => elbows.push(circle),
            MarkerRole::Knee => knees.push(circle),
        }
    }

    let single = |mut bucket: Vec<MarkerCircle>, role: MarkerRole| {
        if bucket.len() != 1 {
            return Err(MarkerError::WrongCardinality {
                role: role.as_str(),
                expected: 1,
                found: bucket.len(),
            });
        }
        Ok(bucket.remove(0))
    };
    let pair = |mut bucket: Vec<MarkerCircle>, role: MarkerRole| {
        if bucket.len() != 2 {
            return Err(MarkerError::WrongCardinality {
                role: role.as_str(),
                expected: 2,
                found: bucket.len(),
            });
        }
        // Smaller x first: the character's right side.
        bucket.sort_by(|a, b| a.position.x.total_cmp(&b.position.x));
        let left = bucket.remove(1);
        let right = bucket.remove(0);
        Ok([right, left])
    };

    Ok(MarkerInventory {
        chin: single(chins, MarkerRole::Chin)?,
        groin: single(groins, MarkerRole::Groin)?,
        wrists: pair(wrists, MarkerRole::Wrist)?,
        elbows: pair(elbows, MarkerRole::Elbow)?,
        knees: pair(knees, MarkerRole::Knee)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(class: &str, x: f64, y: f64) -> MarkerToken {
        MarkerToken {
            class: class.to_string(),
            x,
            y,
        }
    }

    fn full_set() -> Vec<MarkerToken> {
        vec![
            token("marker circle-chin", 400.0, 100.0),
            token("marker circle-wrist", 100.0, 200.0),
            token("marker circle-wrist", 700.0, 200.0),
            token("marker circle-elbow", 200.0, 200.0),
            token("marker circle-elbow", 600.0, 200.0),
            token("marker circle-knee", 350.0, 500.0),
            token("marker circle-knee", 450.0, 500.0),
            token("marker circle-groin", 400.0, 350.0),
        ]
    }

    #[test]
    fn known_discriminator_samples_classify() {
        assert_eq!(
            classify_discriminator("marker circle-chin"),
            Some(MarkerRole::Chin)
        );
        assert_eq!(
            classify_discriminator("marker sprite-magenta"),
            Some(MarkerRole::Wrist)
        );
        assert_eq!(
            classify_discriminator("MARKER CIRCLE-GREEN"),
            Some(MarkerRole::Elbow)
        );
        assert_eq!(classify_discriminator("marker circle-teal"), None);
    }

    #[test]
    fn full_token_set_groups_cleanly() {
        let inventory = group_markers(&full_set()).unwrap();
        assert_eq!(inventory.chin.position.x, 400.0);
        // Pairs are [right, left] by on-screen x.
        assert_eq!(inventory.wrists[0].position.x, 100.0);
        assert_eq!(inventory.wrists[1].position.x, 700.0);
        assert_eq!(inventory.knees[0].position.x, 350.0);
        assert_eq!(inventory.knees[1].position.x, 450.0);
    }

    #[test]
    fn seven_tokens_are_fatal() {
        let mut tokens = full_set();
        tokens.pop();
        let err = group_markers(&tokens).unwrap_err();
        assert!(matches!(err, MarkerError::WrongCount { found: 7 }));
    }

    #[test]
    fn nine_tokens_are_fatal() {
        let mut tokens = full_set();
        tokens.push(token("marker circle-knee", 500.0, 500.0));
        let err = group_markers(&tokens).unwrap_err();
        assert!(matches!(err, MarkerError::WrongCount { found: 9 }));
    }

    #[test]
    fn wrong_role_cardinality_is_fatal() {
        // Eight tokens, but three wrists and one elbow.
        let tokens = vec![
            token("marker circle-chin", 400.0, 100.0),
            token("marker circle-wrist", 100.0, 200.0),
            token("marker circle-wrist", 700.0, 200.0),
            token("marker circle-wrist", 650.0, 220.0),
            token("marker circle-elbow", 200.0, 200.0),
            token("marker circle-knee", 350.0, 500.0),
            token("marker circle-knee", 450.0, 500.0),
            token("marker circle-groin", 400.0, 350.0),
        ];
        let err = group_markers(&tokens).unwrap_err();
        match err {
            MarkerError::WrongCardinality {
                role,
                expected,
                found,
            } => {
                assert_eq!(role, "wrist");
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_discriminator_is_fatal() {
        let mut tokens = full_set();
        tokens[3].class = "marker circle-crimson".to_string();
        let err = group_markers(&tokens).unwrap_err();
        assert!(matches!(err, MarkerError::UnknownDiscriminator(_)));
    }
}
