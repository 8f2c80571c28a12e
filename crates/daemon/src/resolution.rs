//! Downscale policy driven by the probed source height.

/// Sources taller than this many lines are downscaled.
pub const DOWNSCALE_THRESHOLD: u32 = 540;

/// Output height used when downscaling.
pub const TARGET_HEIGHT: u32 = 480;

/// Result of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleDecision {
    pub downscale: bool,
    /// Set only when `downscale` is true.
    pub target_height: Option<u32>,
}

impl ScaleDecision {
    /// Keep the source resolution.
    pub const fn keep() -> Self {
        Self {
            downscale: false,
            target_height: None,
        }
    }
}

/// Decide whether to downscale given the probed height.
///
/// The threshold is strict: exactly 540 lines is kept. An unknown height
/// (probe failed or unparsable) takes the downscale branch.
pub fn decide(height: Option<u32>) -> ScaleDecision {
    match height {
        Some(h) if h <= DOWNSCALE_THRESHOLD => ScaleDecision::keep(),
        _ => ScaleDecision {
            downscale: true,
            target_height: Some(TARGET_HEIGHT),
        },
    }
}
