/// Signed completion test shared by cycles and loops
///
/// `end` is inclusive in both directions: a counter moving up is exhausted once
/// the next index passes above `end`, a counter moving down once it passes
/// below. A zero step never exhausts, so such a loop ends only through its
/// condition.

/// Whether moving to `next` leaves the `start..=end` range in the direction of `step`
pub fn exhausted(next: i64, end: i64, step: i64) -> bool {
    match step.signum() {
        1 => next > end,
        -1 => next < end,
        _ => false,
    }
}

/// Index after one step, saturating at the integer bounds
pub fn next_index(index: i64, step: i64) -> i64 {
    index.saturating_add(step)
}

/// Whether the iteration at `index` is the last one
pub fn is_last(index: i64, end: i64, step: i64) -> bool {
    exhausted(next_index(index, step), end, step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascending_end_is_inclusive() {
        assert!(!exhausted(10, 10, 1));
        assert!(exhausted(11, 10, 1));
        assert!(is_last(10, 10, 1));
        assert!(!is_last(9, 10, 1));
    }

    #[test]
    fn descending_mirrors_ascending() {
        assert!(!exhausted(0, 0, -1));
        assert!(exhausted(-1, 0, -1));
        assert!(is_last(0, 0, -1));
        assert!(!is_last(1, 0, -1));
    }

    #[test]
    fn larger_steps_overshoot() {
        assert!(is_last(8, 10, 3));
        assert!(!is_last(7, 10, 3));
        assert!(is_last(-8, -10, -3));
    }

    #[test]
    fn zero_step_never_exhausts() {
        for index in [-5, 0, 5, i64::MAX] {
            assert!(!exhausted(index, 0, 0));
        }
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        assert_eq!(next_index(i64::MAX, 1), i64::MAX);
        assert!(is_last(i64::MAX - 1, i64::MAX - 1, 5));
    }
}
