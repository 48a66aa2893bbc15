//! Splitting a trial count across workers

/// Per-worker trial counts for `total` trials over `workers` workers
///
/// Every share is `total / workers` or one more; the first
/// `total % workers` workers get the extra trial. Zero workers get nothing.
pub fn split(total: usize, workers: usize) -> Vec<usize> {
    if workers == 0 {
        return Vec::new();
    }

    let base = total / workers;
    let extra = total % workers;
    (0..workers)
        .map(|worker| if worker < extra { base + 1 } else { base })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remainder_goes_to_first_workers() {
        assert_eq!(split(7, 3), vec![3, 2, 2]);
        assert_eq!(split(10, 4), vec![3, 3, 2, 2]);
    }

    #[test]
    fn test_even_split() {
        assert_eq!(split(9, 3), vec![3, 3, 3]);
    }

    #[test]
    fn test_fewer_trials_than_workers() {
        assert_eq!(split(2, 5), vec![1, 1, 0, 0, 0]);
        assert_eq!(split(0, 3), vec![0, 0, 0]);
    }

    #[test]
    fn test_no_workers() {
        assert!(split(5, 0).is_empty());
    }
}
