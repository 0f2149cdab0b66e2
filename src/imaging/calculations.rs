//! Pure calculation functions for resize candidates.
//!
//! All functions here are pure and testable without any I/O or images.

use super::backend::Dimensions;

/// Seed linear scale factor for a byte-size reduction.
///
/// Encoded size grows roughly with pixel count, so a linear scale of
/// `sqrt(target / original)` is the first guess. The result is clamped to
/// `[min_scale, max_scale]`.
///
/// # Examples
/// ```
/// # use imgfit::imaging::calculations::seed_scale;
/// // A quarter of the bytes → half the linear size
/// assert_eq!(seed_scale(250, 1000, 0.2, 1.0), 0.5);
///
/// // Never upscale
/// assert_eq!(seed_scale(2000, 1000, 0.2, 1.0), 1.0);
///
/// // Never below the floor
/// assert_eq!(seed_scale(1, 1000, 0.2, 1.0), 0.2);
/// ```
pub fn seed_scale(target: u64, original: u64, min_scale: f64, max_scale: f64) -> f64 {
    if original == 0 {
        return max_scale;
    }
    let ratio = target as f64 / original as f64;
    ratio.sqrt().clamp(min_scale, max_scale)
}

/// Candidate scale factors: `seed + variation` for each variation, in the
/// given order, each clamped to `[min_scale, max_scale]`.
pub fn scale_candidates(seed: f64, variations: &[f64], min_scale: f64, max_scale: f64) -> Vec<f64> {
    variations
        .iter()
        .map(|variation| (seed + variation).clamp(min_scale, max_scale))
        .collect()
}

/// Integer dimensions at `scale`, truncated, never below 1px.
///
/// # Examples
/// ```
/// # use imgfit::imaging::Dimensions;
/// # use imgfit::imaging::calculations::scaled_dimensions;
/// assert_eq!(
///     scaled_dimensions(Dimensions::new(1000, 750), 0.55),
///     Dimensions::new(550, 412)
/// );
/// ```
pub fn scaled_dimensions(source: Dimensions, scale: f64) -> Dimensions {
    let scale_edge = |edge: u32| ((edge as f64 * scale).floor() as u32).max(1);
    Dimensions::new(scale_edge(source.width), scale_edge(source.height))
}

/// Resize plan: distinct scaled dimensions in candidate order, dropping any
/// with a side below `min_dimension`.
///
/// Clamping often maps several variations onto the same scale; each distinct
/// output size appears once.
pub fn resize_plan(
    source: Dimensions,
    candidates: &[f64],
    min_dimension: u32,
) -> Vec<(f64, Dimensions)> {
    let mut plan: Vec<(f64, Dimensions)> = Vec::new();
    for &scale in candidates {
        let dims = scaled_dimensions(source, scale);
        if dims.width < min_dimension || dims.height < min_dimension {
            continue;
        }
        if plan.iter().any(|(_, seen)| *seen == dims) {
            continue;
        }
        plan.push((scale, dims));
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARIATIONS: [f64; 8] = [-0.1, 0.0, 0.05, 0.1, 0.15, 0.2, -0.05, -0.15];

    // =========================================================================
    // seed_scale tests
    // =========================================================================

    #[test]
    fn seed_is_square_root_of_ratio() {
        assert!((seed_scale(160, 1000, 0.2, 1.0) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn seed_clamps_both_ends() {
        assert_eq!(seed_scale(10, 1000, 0.2, 1.0), 0.2);
        assert_eq!(seed_scale(1000, 1000, 0.2, 1.0), 1.0);
    }

    #[test]
    fn seed_with_empty_original_does_not_divide_by_zero() {
        assert_eq!(seed_scale(100, 0, 0.2, 1.0), 1.0);
    }

    // =========================================================================
    // scale_candidates tests
    // =========================================================================

    #[test]
    fn candidates_keep_variation_order() {
        let candidates = scale_candidates(0.5, &VARIATIONS, 0.2, 1.0);
        let expected = [0.4, 0.5, 0.55, 0.6, 0.65, 0.7, 0.45, 0.35];
        assert_eq!(candidates.len(), expected.len());
        for (got, want) in candidates.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
    }

    #[test]
    fn candidates_clamp_near_full_scale() {
        let candidates = scale_candidates(0.97, &VARIATIONS, 0.2, 1.0);
        assert!(candidates.iter().all(|&s| s <= 1.0));
        assert_eq!(candidates.iter().filter(|&&s| s == 1.0).count(), 4);
    }

    // =========================================================================
    // scaled_dimensions / resize_plan tests
    // =========================================================================

    #[test]
    fn scaled_dimensions_truncate() {
        assert_eq!(
            scaled_dimensions(Dimensions::new(999, 333), 0.5),
            Dimensions::new(499, 166)
        );
    }

    #[test]
    fn scaled_dimensions_never_zero() {
        assert_eq!(
            scaled_dimensions(Dimensions::new(3, 3), 0.2),
            Dimensions::new(1, 1)
        );
    }

    #[test]
    fn plan_drops_duplicate_dimensions() {
        let candidates = scale_candidates(0.97, &VARIATIONS, 0.2, 1.0);
        let plan = resize_plan(Dimensions::new(1000, 1000), &candidates, 100);
        let dims: Vec<Dimensions> = plan.iter().map(|(_, d)| *d).collect();
        for (i, d) in dims.iter().enumerate() {
            assert!(!dims[i + 1..].contains(d), "{d:?} repeated");
        }
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn plan_rejects_candidates_below_floor() {
        // 400x300 at 0.3 → 120x90: height under 100px
        let plan = resize_plan(Dimensions::new(400, 300), &[0.3, 0.5], 100);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].1, Dimensions::new(200, 150));
    }

    #[test]
    fn plan_is_empty_for_tiny_sources() {
        let plan = resize_plan(Dimensions::new(120, 80), &[0.5, 0.8, 1.0], 100);
        assert!(plan.is_empty());
    }
}
