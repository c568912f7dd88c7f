/// Receives integer completion percentages from long-running phases.
///
/// Implementations must tolerate repeated values; producers only guarantee
/// the sequence is non-decreasing and ends at 100 on success.
pub trait ProgressSink {
    fn report(&self, percent: u8);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8) {}
}

impl<P: ProgressSink + ?Sized> ProgressSink for &P {
    fn report(&self, percent: u8) {
        (**self).report(percent);
    }
}

/// `done * 100 / total`, clamped to 100. A zero total counts as complete.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.saturating_mul(100) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_down() {
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(3, 3), 100);
        assert_eq!(percent_of(0, 0), 100);
        assert_eq!(percent_of(7, 5), 100);
    }
}
