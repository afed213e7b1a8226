//! Prompt construction for the landmark request.

use crate::landmarks::LandmarkName;

/// Builds the landmark request for one capture.
///
/// The prompt pins down the two conventions the model most often gets wrong:
/// pixel coordinates are relative to the supplied image's own top-left
/// origin, and body-relative left/right are mirrored because the character
/// faces the viewer. From the second attempt on it also restates the three
/// invariants that rejected sets violate most.
pub fn build_landmark_prompt(width: u32, height: u32, attempt: u32) -> String {
    let names = LandmarkName::ALL
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = format!(
        "This image shows a 3D humanoid character rendered front-facing, {width} pixels wide \
         and {height} pixels tall.\n\
         Identify the pixel position of these eight anatomical landmarks: {names}.\n\
         \n\
         Coordinate conventions:\n\
         - Coordinates are pixels in THIS image, origin at the top-left corner, \
         x growing right, y growing down. Every x must be below {width} and every y below {height}.\n\
         - The character faces you, so body-relative sides are mirrored: the character's \
         LEFT wrist, elbow and knee appear on the RIGHT side of the image, and the \
         character's RIGHT limbs appear on the LEFT side of the image.\n\
         \n\
         Answer with only a JSON object: one key per landmark name mapping to \
         {{\"x\": <int>, \"y\": <int>}}, plus a \"confidence\" key with \"high\", \
         \"medium\" or \"low\". No prose, no code fences."
    );

    if attempt > 0 {
        prompt.push_str(
            "\n\nA previous answer failed geometric validation. The most common mistakes, \
             in order:\n\
             1. Vertical order: the chin must be above the groin, and the groin above both \
             knees (smaller y is higher on screen).\n\
             2. Wrist symmetry: in a rig pose both wrists sit at roughly the same height; \
             their y values must be close.\n\
             3. Mirrored sides: left-wrist and left-elbow go on one side of the chin, \
             right-wrist and right-elbow strictly on the other, with each wrist further \
             from the chin than its elbow.",
        );
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_states_dimensions_and_mirroring() {
        let prompt = build_landmark_prompt(800, 600, 0);
        assert!(prompt.contains("800 pixels wide"));
        assert!(prompt.contains("600 pixels tall"));
        assert!(prompt.contains("mirrored"));
        assert!(prompt.contains("\"left-wrist\""));
        assert!(!prompt.contains("previous answer"));
    }

    #[test]
    fn retry_attempts_restate_the_violated_invariants() {
        let prompt = build_landmark_prompt(800, 600, 1);
        assert!(prompt.contains("previous answer failed"));
        assert!(prompt.contains("Vertical order"));
        assert!(prompt.contains("Wrist symmetry"));
        assert!(prompt.contains("Mirrored sides"));
    }
}
