/// Progress reporting for a batch of fetches.
/// The CLI implements this to print status; tests record the calls.
pub trait Progress {
    /// Called once before the first fetch with the number of roll numbers.
    fn begin(&mut self, _total: usize) {}

    /// Called after every roll number, successful or not. `fraction` is
    /// `processed / total` and never decreases.
    fn item_done(&mut self, _roll: u64, _fraction: f64) {}

    /// A roll number was skipped because its fetch or parse failed.
    fn item_failed(&mut self, _roll: u64, _reason: &str) {}

    /// Called once when the batch completes.
    fn finish(&mut self) {}
}

/// A no-op progress sink.
pub struct NullProgress;
impl Progress for NullProgress {}
