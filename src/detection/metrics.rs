/// Counters collected over one Running period of the detection loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub ticks: u64,
    /// Ticks dropped because the previous inference was still outstanding.
    pub skipped_busy: u64,
    pub skipped_no_frame: u64,
    pub inferences: u64,
    pub failures: u64,
    pub emotion_changes: u64,
}

impl DetectionStats {
    pub fn record_tick(&mut self) {
        self.ticks += 1;
    }

    pub fn record_busy_skip(&mut self) {
        self.skipped_busy += 1;
    }

    pub fn record_missing_frame(&mut self) {
        self.skipped_no_frame += 1;
    }

    pub fn record_inference(&mut self, succeeded: bool) {
        if succeeded {
            self.inferences += 1;
        } else {
            self.failures += 1;
        }
    }

    pub fn record_emotion_change(&mut self) {
        self.emotion_changes += 1;
    }
}
