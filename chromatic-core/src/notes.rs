//! # Note Table and Note Mapper
//!
//! This module holds the static chromatic note table (A0 to B8, 99 keys) and
//! the mapper that turns a stabilized frequency into the nearest note name and
//! a cents deviation.
//!
//! ## Features
//! - 99-key chromatic table with base frequencies tabulated at A4 = 440 Hz
//! - Live reference rescaling (`frequency_at_440 * reference / 440`)
//! - Nearest-note lookup with deterministic tie-breaking (lower key wins)
//! - Cent deviation calculations

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Reference frequency assumed by the tabulated base frequencies.
pub const BASE_REFERENCE_HZ: f32 = 440.0;

/// A single entry of the static note table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEntry {
    /// Note name (e.g., "A4", "C#3/Db3")
    pub name: &'static str,
    /// Frequency in Hz when A4 = 440 Hz
    pub frequency_at_440: f32,
    /// Linear key index, 1 for A0 up to 99 for B8
    pub key_index: u8,
}

const fn note(name: &'static str, frequency_at_440: f32, key_index: u8) -> NoteEntry {
    NoteEntry { name, frequency_at_440, key_index }
}

/// The chromatic note table, ordered by ascending key index.
pub static NOTE_TABLE: [NoteEntry; 99] = [
    note("A0", 27.5, 1), note("A#0/Bb0", 29.14, 2), note("B0", 30.87, 3),
    note("C1", 32.7, 4), note("C#1/Db1", 34.65, 5), note("D1", 36.71, 6),
    note("D#1/Eb1", 38.89, 7), note("E1", 41.2, 8), note("F1", 43.65, 9),
    note("F#1/Gb1", 46.25, 10), note("G1", 49.0, 11), note("G#1/Ab1", 51.91, 12),
    note("A1", 55.0, 13), note("A#1/Bb1", 58.27, 14), note("B1", 61.74, 15),
    note("C2", 65.41, 16), note("C#2/Db2", 69.3, 17), note("D2", 73.42, 18),
    note("D#2/Eb2", 77.78, 19), note("E2", 82.41, 20), note("F2", 87.31, 21),
    note("F#2/Gb2", 92.5, 22), note("G2", 98.0, 23), note("G#2/Ab2", 103.83, 24),
    note("A2", 110.0, 25), note("A#2/Bb2", 116.54, 26), note("B2", 123.47, 27),
    note("C3", 130.81, 28), note("C#3/Db3", 138.59, 29), note("D3", 146.83, 30),
    note("D#3/Eb3", 155.56, 31), note("E3", 164.81, 32), note("F3", 174.61, 33),
    note("F#3/Gb3", 185.0, 34), note("G3", 196.0, 35), note("G#3/Ab3", 207.65, 36),
    note("A3", 220.0, 37), note("A#3/Bb3", 233.08, 38), note("B3", 246.94, 39),
    note("C4", 261.63, 40), note("C#4/Db4", 277.18, 41), note("D4", 293.66, 42),
    note("D#4/Eb4", 311.13, 43), note("E4", 329.63, 44), note("F4", 349.23, 45),
    note("F#4/Gb4", 369.99, 46), note("G4", 392.0, 47), note("G#4/Ab4", 415.3, 48),
    note("A4", 440.0, 49), note("A#4/Bb4", 466.16, 50), note("B4", 493.88, 51),
    note("C5", 523.25, 52), note("C#5/Db5", 554.37, 53), note("D5", 587.33, 54),
    note("D#5/Eb5", 622.25, 55), note("E5", 659.25, 56), note("F5", 698.46, 57),
    note("F#5/Gb5", 739.99, 58), note("G5", 783.99, 59), note("G#5/Ab5", 830.61, 60),
    note("A5", 880.0, 61), note("A#5/Bb5", 932.33, 62), note("B5", 987.77, 63),
    note("C6", 1046.5, 64), note("C#6/Db6", 1108.73, 65), note("D6", 1174.66, 66),
    note("D#6/Eb6", 1244.51, 67), note("E6", 1318.51, 68), note("F6", 1396.91, 69),
    note("F#6/Gb6", 1479.98, 70), note("G6", 1567.98, 71), note("G#6/Ab6", 1661.22, 72),
    note("A6", 1760.0, 73), note("A#6/Bb6", 1864.66, 74), note("B6", 1975.53, 75),
    note("C7", 2093.0, 76), note("C#7/Db7", 2217.46, 77), note("D7", 2349.32, 78),
    note("D#7/Eb7", 2489.02, 79), note("E7", 2637.02, 80), note("F7", 2793.83, 81),
    note("F#7/Gb7", 2959.96, 82), note("G7", 3135.96, 83), note("G#7/Ab7", 3322.44, 84),
    note("A7", 3520.0, 85), note("A#7/Bb7", 3729.31, 86), note("B7", 3951.07, 87),
    note("C8", 4186.01, 88), note("C#8/Db8", 4434.92, 89), note("D8", 4698.63, 90),
    note("D#8/Eb8", 4978.03, 91), note("E8", 5274.04, 92), note("F8", 5587.65, 93),
    note("F#8/Gb8", 5919.91, 94), note("G8", 6271.93, 95), note("G#8/Ab8", 6644.88, 96),
    note("A8", 7040.0, 97), note("A#8/Bb8", 7458.62, 98), note("B8", 7902.13, 99),
];

/// Static map for quick note name to table position lookups.
static NOTE_MAP: Lazy<BTreeMap<&'static str, usize>> = Lazy::new(|| {
    NOTE_TABLE
        .iter()
        .enumerate()
        .map(|(i, note)| (note.name, i))
        .collect()
});

/// Finds a table entry by its note name.
pub fn find_note(name: &str) -> Option<&'static NoteEntry> {
    NOTE_MAP.get(name).map(|&i| &NOTE_TABLE[i])
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values indicate sharpness, negative values flatness.
pub fn cents_between(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Nearest note and cents deviation for one stabilized pitch.
///
/// An empty `note_name` means nothing was detected; `cents` is then 0 and
/// carries no meaning.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NoteReading {
    pub note_name: String,
    pub cents: f32,
}

impl NoteReading {
    /// The "nothing detected" reading.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn is_silent(&self) -> bool {
        self.note_name.is_empty()
    }
}

/// Maps stabilized frequencies onto the note table for a given reference.
///
/// The effective frequency of every entry is recomputed whenever the
/// reference changes, so no stale frequency survives a reference update.
#[derive(Debug, Clone)]
pub struct NoteMapper {
    reference_hz: f32,
    effective: Vec<f32>,
}

impl Default for NoteMapper {
    fn default() -> Self {
        Self::new(BASE_REFERENCE_HZ)
    }
}

impl NoteMapper {
    pub fn new(reference_hz: f32) -> Self {
        let mut mapper = Self {
            reference_hz,
            effective: Vec::with_capacity(NOTE_TABLE.len()),
        };
        mapper.update_reference(reference_hz);
        mapper
    }

    /// Rescales every note's effective frequency to the new A4 reference.
    pub fn update_reference(&mut self, reference_hz: f32) {
        self.reference_hz = reference_hz;
        self.effective.clear();
        self.effective.extend(
            NOTE_TABLE
                .iter()
                .map(|note| note.frequency_at_440 * reference_hz / BASE_REFERENCE_HZ),
        );
    }

    pub fn reference_hz(&self) -> f32 {
        self.reference_hz
    }

    /// Effective frequency of a note under the current reference.
    pub fn effective_frequency(&self, name: &str) -> Option<f32> {
        NOTE_MAP.get(name).map(|&i| self.effective[i])
    }

    /// Finds the nearest note to `pitch_hz` and the deviation from it in cents.
    ///
    /// A pitch of zero, a negative pitch or NaN yields the silent reading.
    pub fn map(&self, pitch_hz: f32) -> NoteReading {
        if pitch_hz.is_nan() || pitch_hz <= 0.0 {
            return NoteReading::silent();
        }

        // Strict less-than keeps the lower key on exact ties.
        let mut best = 0;
        let mut best_err = f32::INFINITY;
        for (i, &freq) in self.effective.iter().enumerate() {
            let err = (freq - pitch_hz).abs();
            if err < best_err {
                best = i;
                best_err = err;
            }
        }

        NoteReading {
            note_name: NOTE_TABLE[best].name.to_string(),
            cents: cents_between(pitch_hz, self.effective[best]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn table_is_ordered_by_key_and_frequency() {
        assert_eq!(NOTE_TABLE.len(), 99);
        assert_eq!(NOTE_TABLE[0].name, "A0");
        assert_eq!(NOTE_TABLE[98].name, "B8");
        for pair in NOTE_TABLE.windows(2) {
            assert_eq!(pair[1].key_index, pair[0].key_index + 1);
            assert!(pair[1].frequency_at_440 > pair[0].frequency_at_440);
        }
    }

    #[test]
    fn a4_maps_to_itself_with_zero_cents() {
        let mapper = NoteMapper::default();
        let reading = mapper.map(440.0);
        assert_eq!(reading.note_name, "A4");
        assert_abs_diff_eq!(reading.cents, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn silence_and_negative_pitches_map_to_no_note() {
        let mapper = NoteMapper::default();
        assert_eq!(mapper.map(0.0), NoteReading::silent());
        assert!(mapper.map(-5.0).is_silent());
        assert!(mapper.map(f32::NAN).is_silent());
    }

    #[test]
    fn sharp_pitch_gives_positive_cents() {
        let mapper = NoteMapper::default();
        let reading = mapper.map(445.0);
        assert_eq!(reading.note_name, "A4");
        assert_abs_diff_eq!(reading.cents, 19.56, epsilon = 0.01);
    }

    #[test]
    fn flat_pitch_gives_negative_cents() {
        let mapper = NoteMapper::default();
        let reading = mapper.map(435.0);
        assert_eq!(reading.note_name, "A4");
        assert!(reading.cents < 0.0);
    }

    #[test]
    fn exact_midpoint_prefers_lower_key() {
        let mapper = NoteMapper::default();
        // Exactly halfway between F#3/Gb3 (185) and G3 (196).
        let reading = mapper.map(190.5);
        assert_eq!(reading.note_name, "F#3/Gb3");
    }

    #[test]
    fn nearest_note_is_never_beaten_by_another_entry() {
        let mapper = NoteMapper::new(437.0);
        let mut pitch = 20.0_f32;
        while pitch < 9000.0 {
            let reading = mapper.map(pitch);
            let chosen = mapper.effective_frequency(&reading.note_name).unwrap();
            let chosen_err = (chosen - pitch).abs();
            for note in NOTE_TABLE.iter() {
                let other = mapper.effective_frequency(note.name).unwrap();
                assert!(chosen_err <= (other - pitch).abs());
            }
            pitch *= 1.013;
        }
    }

    #[test]
    fn cents_round_trip_to_pitch() {
        let mapper = NoteMapper::new(442.0);
        for &pitch in &[31.0_f32, 147.3, 233.9, 441.0, 1000.0, 7900.0] {
            let reading = mapper.map(pitch);
            let freq = mapper.effective_frequency(&reading.note_name).unwrap();
            let back = freq * 2.0_f32.powf(reading.cents / 1200.0);
            assert_abs_diff_eq!(back, pitch, epsilon = pitch * 1e-4);
        }
    }

    #[test]
    fn reference_change_rescales_every_note() {
        let mut mapper = NoteMapper::default();
        let before: Vec<f32> = NOTE_TABLE
            .iter()
            .map(|n| mapper.effective_frequency(n.name).unwrap())
            .collect();

        mapper.update_reference(445.0);
        for (note, old) in NOTE_TABLE.iter().zip(before) {
            let new = mapper.effective_frequency(note.name).unwrap();
            assert_abs_diff_eq!(new / old, 445.0 / 440.0, epsilon = 1e-5);
        }

        let reading = mapper.map(445.0);
        assert_eq!(reading.note_name, "A4");
        assert_abs_diff_eq!(reading.cents, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn find_note_by_name() {
        assert_eq!(find_note("A4").map(|n| n.key_index), Some(49));
        assert!(find_note("H4").is_none());
    }
}
