//! # Feedback Mapper
//!
//! Turns a cents deviation into the two primitives a tuning display needs:
//! a needle rotation and a mood indicator. Pure functions, no state.

use serde::{Deserialize, Serialize};

/// Lower end of the needle range in cents.
pub const MIN_CENTS: f32 = -40.0;
/// Upper end of the needle range in cents.
pub const MAX_CENTS: f32 = 40.0;

/// Three-state tuning indicator, plus `None` for "nothing to show".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mood {
    #[default]
    None,
    Happy,
    Confused,
    Unhappy,
}

impl Mood {
    /// Classifies a cents deviation.
    ///
    /// Exactly 0 cents is `None`, which is also what the silent reading
    /// carries. The band edges at ±10 and ±30 belong to the inner band.
    pub fn from_cents(cents: f32) -> Self {
        if cents == 0.0 {
            Mood::None
        } else if (-10.0..=10.0).contains(&cents) {
            Mood::Happy
        } else if (cents > 10.0 && cents <= 30.0) || (cents < -10.0 && cents >= -30.0) {
            Mood::Confused
        } else if cents > 30.0 || cents < -30.0 {
            Mood::Unhappy
        } else {
            // NaN
            Mood::None
        }
    }
}

/// Needle angle in degrees; ±40 cents maps to ±90°.
pub fn needle_angle(cents: f32) -> f32 {
    let clamped = cents.clamp(MIN_CENTS, MAX_CENTS);
    9.0 * clamped / 4.0
}

/// What the display renders for one reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedbackState {
    pub angle_degrees: f32,
    pub mood: Mood,
}

impl FeedbackState {
    pub fn from_cents(cents: f32) -> Self {
        Self {
            angle_degrees: needle_angle(cents),
            mood: Mood::from_cents(cents),
        }
    }

    /// Needle centred, no mood. Shown while idle or silent.
    pub fn rest() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn mood_bands() {
        assert_eq!(Mood::from_cents(0.0), Mood::None);
        assert_eq!(Mood::from_cents(0.5), Mood::Happy);
        assert_eq!(Mood::from_cents(-10.0), Mood::Happy);
        assert_eq!(Mood::from_cents(10.0), Mood::Happy);
        assert_eq!(Mood::from_cents(10.01), Mood::Confused);
        assert_eq!(Mood::from_cents(10.0001), Mood::Confused);
        assert_eq!(Mood::from_cents(-10.01), Mood::Confused);
        assert_eq!(Mood::from_cents(30.0), Mood::Confused);
        assert_eq!(Mood::from_cents(-30.0), Mood::Confused);
        assert_eq!(Mood::from_cents(30.01), Mood::Unhappy);
        assert_eq!(Mood::from_cents(-250.0), Mood::Unhappy);
    }

    #[test]
    fn nan_cents_has_no_mood() {
        assert_eq!(Mood::from_cents(f32::NAN), Mood::None);
    }

    #[test]
    fn angle_is_linear_and_clamped() {
        assert_abs_diff_eq!(needle_angle(0.0), 0.0);
        assert_abs_diff_eq!(needle_angle(20.0), 45.0);
        assert_abs_diff_eq!(needle_angle(-20.0), -45.0);
        assert_abs_diff_eq!(needle_angle(40.01), needle_angle(40.0));
        assert_abs_diff_eq!(needle_angle(-40.01), needle_angle(-40.0));
        assert_abs_diff_eq!(needle_angle(1200.0), 90.0);
        assert_abs_diff_eq!(needle_angle(-1200.0), -90.0);
    }

    #[test]
    fn state_from_cents() {
        let state = FeedbackState::from_cents(19.55);
        assert_eq!(state.mood, Mood::Confused);
        assert_abs_diff_eq!(state.angle_degrees, 43.9875, epsilon = 1e-3);
        assert_eq!(FeedbackState::rest(), FeedbackState::from_cents(0.0));
    }
}
