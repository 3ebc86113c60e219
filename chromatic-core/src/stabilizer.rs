//! # Pitch Stabilizer
//!
//! Turns bursts of noisy pitch candidates into one value per burst using a
//! mode-seeking bucket pass: candidates within a fixed tolerance of a bucket's
//! first member are grouped, and the mean of the largest group wins.

/// Candidates collected before each stabilization pass.
pub const HISTORY_LEN: usize = 4;

/// Maximum distance in Hz from a bucket's key for a candidate to join it.
pub const BUCKET_TOLERANCE_HZ: f32 = 2.0;

/// One stabilization pass over a window of candidates.
///
/// Returns 0 for an empty window. Candidates are bucketed in arrival order
/// against each bucket's key (its first member); the largest bucket wins and
/// earlier buckets win ties. The result is the mean of the winning bucket.
pub fn stabilize(candidates: &[f32]) -> f32 {
    if candidates.is_empty() {
        return 0.0;
    }

    // (key, members); at most HISTORY_LEN buckets in practice.
    let mut buckets: Vec<(f32, Vec<f32>)> = Vec::with_capacity(candidates.len());
    for &pitch in candidates {
        match buckets
            .iter_mut()
            .find(|(key, _)| (pitch - key).abs() <= BUCKET_TOLERANCE_HZ)
        {
            Some((_, members)) => members.push(pitch),
            None => buckets.push((pitch, vec![pitch])),
        }
    }

    let mut winner: &[f32] = &[];
    for (_, members) in &buckets {
        if members.len() > winner.len() {
            winner = members;
        }
    }

    winner.iter().sum::<f32>() / winner.len() as f32
}

/// Collects candidates into fixed windows and stabilizes each full window.
#[derive(Debug, Default)]
pub struct PitchStabilizer {
    history: Vec<f32>,
    current_pitch: f32,
    last_emitted: Option<f32>,
    trace: Vec<f32>,
}

/// Outcome of one stabilization pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stabilized {
    /// Mean of the winning bucket, 0 when silent.
    pub pitch: f32,
    /// False when this non-zero mean equals the previous non-zero mean.
    pub is_new: bool,
}

impl PitchStabilizer {
    pub fn new() -> Self {
        Self {
            history: Vec::with_capacity(HISTORY_LEN),
            ..Self::default()
        }
    }

    /// Adds one candidate; returns the pass result once the window is full.
    ///
    /// NaN candidates are recorded as 0 (no pitch).
    pub fn push(&mut self, candidate: f32) -> Option<Stabilized> {
        self.history.push(if candidate.is_nan() { 0.0 } else { candidate });
        if self.history.len() < HISTORY_LEN {
            return None;
        }

        let pitch = stabilize(&self.history);
        self.history.clear();
        self.current_pitch = pitch;

        let mut is_new = true;
        if pitch > 0.0 {
            if self.last_emitted == Some(pitch) {
                is_new = false;
            } else {
                self.last_emitted = Some(pitch);
                self.trace.push(pitch);
            }
        }

        Some(Stabilized { pitch, is_new })
    }

    /// Latest stabilized pitch, updated on every pass including duplicates.
    pub fn current_pitch(&self) -> f32 {
        self.current_pitch
    }

    /// Candidates waiting for the current window to fill.
    pub fn pending(&self) -> &[f32] {
        &self.history
    }

    /// Distinct non-zero means recorded since the last take.
    pub fn take_trace(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.trace)
    }

    /// Forgets pending candidates and the current pitch. The trace is kept.
    pub fn clear(&mut self) {
        self.history.clear();
        self.current_pitch = 0.0;
        self.last_emitted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn identical_candidates_are_returned_unchanged() {
        assert_eq!(stabilize(&[261.63; 4]), 261.63);
    }

    #[test]
    fn silence_stays_silent() {
        assert_eq!(stabilize(&[0.0, 0.0, 0.0, 0.0]), 0.0);
        assert_eq!(stabilize(&[]), 0.0);
    }

    #[test]
    fn outlier_is_dropped() {
        assert_abs_diff_eq!(stabilize(&[440.0, 441.0, 442.0, 500.0]), 441.0);
    }

    #[test]
    fn tolerance_is_measured_from_the_bucket_key() {
        // 442.5 is within 2 Hz of 441 but not of the key 440.
        let pitch = stabilize(&[440.0, 441.0, 442.5, 443.0]);
        assert_abs_diff_eq!(pitch, 440.5);
    }

    #[test]
    fn tolerance_boundary_is_inclusive() {
        assert_abs_diff_eq!(stabilize(&[440.0, 442.0, 300.0, 600.0]), 441.0);
    }

    #[test]
    fn earlier_bucket_wins_ties() {
        assert_abs_diff_eq!(stabilize(&[220.0, 440.0, 221.0, 441.0]), 220.5);
        assert_abs_diff_eq!(stabilize(&[0.0, 440.0, 0.0, 440.0]), 0.0);
    }

    #[test]
    fn octave_jitter_is_suppressed() {
        assert_abs_diff_eq!(stabilize(&[880.0, 440.0, 440.5, 439.5]), 440.0);
    }

    #[test]
    fn push_waits_for_a_full_window() {
        let mut stabilizer = PitchStabilizer::new();
        assert!(stabilizer.push(440.0).is_none());
        assert!(stabilizer.push(440.0).is_none());
        assert!(stabilizer.push(440.0).is_none());
        assert_eq!(stabilizer.pending().len(), 3);

        let out = stabilizer.push(440.0).unwrap();
        assert_eq!(out, Stabilized { pitch: 440.0, is_new: true });
        assert!(stabilizer.pending().is_empty());
        assert_eq!(stabilizer.current_pitch(), 440.0);
    }

    #[test]
    fn repeated_means_are_deduplicated_but_current_pitch_updates() {
        fn feed(s: &mut PitchStabilizer, p: f32) -> Stabilized {
            (0..HISTORY_LEN).filter_map(|_| s.push(p)).last().unwrap()
        }

        let mut stabilizer = PitchStabilizer::new();

        assert!(feed(&mut stabilizer, 440.0).is_new);
        assert!(!feed(&mut stabilizer, 440.0).is_new);

        let silent = feed(&mut stabilizer, 0.0);
        assert_eq!(silent.pitch, 0.0);
        assert_eq!(stabilizer.current_pitch(), 0.0);

        // Silence does not reset deduplication against the last non-zero mean.
        assert!(!feed(&mut stabilizer, 440.0).is_new);
        assert_eq!(stabilizer.current_pitch(), 440.0);

        assert!(feed(&mut stabilizer, 445.0).is_new);
        assert_eq!(stabilizer.take_trace(), vec![440.0, 445.0]);
        assert!(stabilizer.take_trace().is_empty());
    }

    #[test]
    fn nan_candidates_count_as_silence() {
        let mut stabilizer = PitchStabilizer::new();
        for _ in 0..HISTORY_LEN - 1 {
            stabilizer.push(f32::NAN);
        }
        let out = stabilizer.push(440.0).unwrap();
        assert_eq!(out.pitch, 0.0);
        assert!(stabilizer.take_trace().is_empty());
    }

    #[test]
    fn clear_drops_pending_candidates() {
        let mut stabilizer = PitchStabilizer::new();
        stabilizer.push(440.0);
        stabilizer.push(441.0);
        stabilizer.clear();
        assert!(stabilizer.pending().is_empty());
        assert_eq!(stabilizer.current_pitch(), 0.0);
    }
}
