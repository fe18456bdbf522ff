//! Progress apportioning across the enabled stages.

/// Percentage after `completed` of `total` stages, rounded half up.
///
/// The last stage always yields 100 and the sequence never decreases.
///
/// ```
/// use meetflow::pipeline::stage_progress;
///
/// let five: Vec<u8> = (1..=5).map(|k| stage_progress(k, 5)).collect();
/// assert_eq!(five, vec![20, 40, 60, 80, 100]);
/// ```
#[must_use]
pub fn stage_progress(completed: usize, total: usize) -> u8 {
    if total == 0 || completed >= total {
        return 100;
    }
    let percent = (200 * completed + total) / (2 * total);
    u8::try_from(percent.min(100)).unwrap_or(100)
}

/// Progress range covered by the stage at `index` (zero-based) of `total`.
///
/// Starts at the value reached before the stage and ends at the value the
/// stage completes with.
#[must_use]
pub fn stage_window(index: usize, total: usize) -> (u8, u8) {
    (stage_progress(index, total), stage_progress(index + 1, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_windows_tile_the_range() {
        assert_eq!(stage_window(0, 5), (0, 20));
        assert_eq!(stage_window(3, 5), (60, 80));
        assert_eq!(stage_window(4, 5), (80, 100));
        assert_eq!(stage_window(2, 4), (50, 75));
    }

    #[test]
    fn test_four_stages() {
        let four: Vec<u8> = (1..=4).map(|k| stage_progress(k, 4)).collect();
        assert_eq!(four, vec![25, 50, 75, 100]);
    }

    #[test]
    fn test_uneven_split_rounds_half_up() {
        assert_eq!(stage_progress(1, 3), 33);
        assert_eq!(stage_progress(2, 3), 67);
        assert_eq!(stage_progress(1, 8), 13);
        assert_eq!(stage_progress(3, 3), 100);
    }

    #[test]
    fn test_monotonic_for_any_stage_count() {
        for total in 1..=12 {
            let values: Vec<u8> = (0..=total).map(|k| stage_progress(k, total)).collect();
            assert_eq!(values[0], 0);
            assert!(values.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(*values.last().unwrap(), 100);
        }
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(stage_progress(0, 0), 100);
        assert_eq!(stage_progress(7, 5), 100);
    }
}
