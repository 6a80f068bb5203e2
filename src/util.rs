pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Population standard deviation. `None` on empty input.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    let variance = data
        .iter()
        .map(|value| {
            let diff = m - *value;
            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;
    Some(variance.sqrt())
}

/// Accuracy as a percentage, 0.0 when nothing was pressed.
pub fn accuracy_pct(correct: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    }
}

/// Keystrokes per second, 0.0 for a zero-length window.
pub fn speed_per_sec(presses: u64, total_time_ms: u64) -> f64 {
    if total_time_ms == 0 {
        0.0
    } else {
        presses as f64 / (total_time_ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[10., 20., 30., 15., 22.]), Some(19.4));
        assert_eq!(mean(&[42.0]), Some(42.0));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_std_dev() {
        assert_eq!(
            std_dev(&[100., 120., 90., 102., 94.]),
            Some(10.322790320451151)
        );
        assert_eq!(std_dev(&[5.0, 5.0, 5.0, 5.0]), Some(0.0));
        assert_eq!(std_dev(&[42.0]), Some(0.0));
        assert_eq!(std_dev(&[]), None);
    }

    #[test]
    fn accuracy_guards_zero_presses() {
        assert_eq!(accuracy_pct(0, 0), 0.0);
        assert_eq!(accuracy_pct(3, 4), 75.0);
        assert_eq!(accuracy_pct(4, 4), 100.0);
    }

    #[test]
    fn speed_guards_zero_window() {
        assert_eq!(speed_per_sec(10, 0), 0.0);
        assert_eq!(speed_per_sec(30, 15_000), 2.0);
    }
}
