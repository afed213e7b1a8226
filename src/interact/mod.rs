//! Simulated drag gestures that move each source marker onto its landmark.
//!
//! The rigging surface only recognizes gradual drags, so every gesture is a
//! press followed by interpolated intermediate moves, never a pointer
//! teleport. Order is the fixed canonical landmark order; a missing marker
//! was already fatal at mapping time, so nothing here is skipped.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, info};

use crate::artifacts::DiagnosticSink;
use crate::browser::Surface;
use crate::common::{Clock, Point};
use crate::error::BrowserError;
use crate::markers::mapping::PlacementPlan;

#[derive(Debug, Clone, Copy)]
pub struct DragOptions {
    /// Intermediate pointer moves between press and release.
    pub steps: u32,
    /// Random wobble applied to intermediate positions, in pixels.
    pub jitter_px: f64,
    /// Wait after release for the surface to acknowledge the placement.
    pub settle: Duration,
}

impl Default for DragOptions {
    fn default() -> Self {
        Self {
            steps: 12,
            jitter_px: 1.5,
            settle: Duration::from_millis(400),
        }
    }
}

pub async fn place_markers(
    surface: &mut dyn Surface,
    plan: &PlacementPlan,
    options: &DragOptions,
    clock: &dyn Clock,
    diagnostics: &DiagnosticSink,
) -> Result<(), BrowserError> {
    for placement in plan.placements() {
        info!(
            name = %placement.name,
            from = ?placement.source,
            to = ?placement.destination,
            "placing marker"
        );
        drag(surface, placement.source, placement.destination, options, clock).await?;

        clock.sleep(options.settle).await;
        match surface.screenshot().await {
            Ok(image) => {
                if let Ok(path) =
                    diagnostics.save_capture(&format!("placed-{}", placement.name), &image)
                {
                    debug!(path = %path.display(), "verification capture");
                }
            }
            Err(e) => debug!(error = %e, "verification capture failed"),
        }
    }
    Ok(())
}

async fn drag(
    surface: &mut dyn Surface,
    source: Point,
    destination: Point,
    options: &DragOptions,
    clock: &dyn Clock,
) -> Result<(), BrowserError> {
    surface.mouse_move(source).await?;
    surface.mouse_press(source).await?;

    let steps = options.steps.max(2);
    for step in 1..steps {
        let t = step as f64 / steps as f64;
        let mut position = source.lerp(destination, t);
        if options.jitter_px > 0.0 {
            let mut rng = rand::rng();
            position.x += rng.random_range(-options.jitter_px..=options.jitter_px);
            position.y += rng.random_range(-options.jitter_px..=options.jitter_px);
        }
        surface.mouse_move(position).await?;
        clock.sleep(Duration::from_millis(15)).await;
    }

    surface.mouse_move(destination).await?;
    surface.mouse_release(destination).await?;
    Ok(())
}
