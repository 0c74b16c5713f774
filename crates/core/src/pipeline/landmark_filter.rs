use std::collections::HashSet;

use crate::detection::domain::landmark::{LandmarkSet, PixelLandmark};

/// Resolves a face's landmarks to pixels of a `width × height` frame.
///
/// - If `landmark_ids` is Some: keep only landmarks whose index is in the set.
/// - Else: keep all landmarks.
///
/// Output follows landmark index order. Coordinates are truncated, not
/// clamped, so a landmark at exactly 1.0 maps one past the last pixel.
pub fn select_landmarks(
    landmarks: &LandmarkSet,
    width: u32,
    height: u32,
    landmark_ids: Option<&HashSet<usize>>,
) -> Vec<PixelLandmark> {
    landmarks
        .iter()
        .filter(|(id, _)| landmark_ids.map_or(true, |ids| ids.contains(id)))
        .map(|(id, lm)| {
            let (x, y) = lm.to_pixel(width, height);
            PixelLandmark { id, x, y }
        })
        .collect()
}
