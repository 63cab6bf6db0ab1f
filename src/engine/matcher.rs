//! Visual target detection via normalized cross-correlation.
//!
//! Correlation runs on luminance planes (ITU-R BT.601 luma) of the captured
//! region and the reference image. The reference is zero-meaned once; each
//! candidate window then needs a single pass for its dot product and
//! variance. Scores land in [-1, 1]; reported confidence is clamped to
//! [0, 1].

use image::RgbaImage;

use crate::scenario::model::Point;

/// Minimum correlation score for a match to be accepted.
pub const MATCH_THRESHOLD: f32 = 0.80;

/// Best-match location and strength for one detection attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchHit {
    /// Top-left pixel of the best match, in absolute screen coordinates.
    pub location: Point,
    /// Correlation score in [0, 1].
    pub confidence: f32,
}

/// Detection seam between the execution engine and the correlation math.
pub trait TargetMatcher {
    /// Searches `screen` for `reference`. `region_origin` is the screen
    /// position of the captured buffer's top-left pixel; the returned
    /// location is absolute.
    fn find(&self, screen: &RgbaImage, reference: &RgbaImage, region_origin: Point)
        -> Option<MatchHit>;
}

/// Production matcher: exhaustive zero-mean normalized cross-correlation.
pub struct NccMatcher;

impl TargetMatcher for NccMatcher {
    fn find(
        &self,
        screen: &RgbaImage,
        reference: &RgbaImage,
        region_origin: Point,
    ) -> Option<MatchHit> {
        let (x, y, score) = best_correlation(screen, reference)?;
        if score < MATCH_THRESHOLD {
            return None;
        }
        Some(MatchHit {
            location: Point::new(region_origin.x + x as i32, region_origin.y + y as i32),
            confidence: score.clamp(0.0, 1.0),
        })
    }
}

fn luminance_plane(img: &RgbaImage) -> Vec<f32> {
    img.pixels()
        .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
        .collect()
}

/// Global maximum of the correlation surface, as (x, y, score) local to
/// `screen`. `None` when the reference does not fit inside the screen
/// buffer or has zero variance.
fn best_correlation(screen: &RgbaImage, reference: &RgbaImage) -> Option<(u32, u32, f32)> {
    let (sw, sh) = (screen.width() as usize, screen.height() as usize);
    let (rw, rh) = (reference.width() as usize, reference.height() as usize);
    if rw == 0 || rh == 0 || rw > sw || rh > sh {
        return None;
    }

    let screen_px = luminance_plane(screen);
    let ref_px = luminance_plane(reference);

    let n = (rw * rh) as f32;
    let ref_mean = ref_px.iter().sum::<f32>() / n;
    let ref_delta: Vec<f32> = ref_px.iter().map(|v| v - ref_mean).collect();
    let ref_norm = ref_delta.iter().map(|v| v * v).sum::<f32>().sqrt();
    if ref_norm == 0.0 {
        return None;
    }

    let mut best: Option<(u32, u32, f32)> = None;
    for oy in 0..=(sh - rh) {
        for ox in 0..=(sw - rw) {
            let mut dot = 0.0f32;
            let mut sum = 0.0f32;
            let mut sum_sq = 0.0f32;
            for ty in 0..rh {
                let screen_row = (oy + ty) * sw + ox;
                let ref_row = ty * rw;
                for tx in 0..rw {
                    let v = screen_px[screen_row + tx];
                    dot += v * ref_delta[ref_row + tx];
                    sum += v;
                    sum_sq += v * v;
                }
            }
            // Σ (I - meanI)(T - meanT) reduces to Σ I·T' because T' sums
            // to zero.
            let window_var = sum_sq - sum * sum / n;
            if window_var <= 0.0 {
                continue;
            }
            let score = dot / (ref_norm * window_var.sqrt());
            if best.map_or(true, |(_, _, s)| score > s) {
                best = Some((ox as u32, oy as u32, score));
            }
        }
    }
    best
}
