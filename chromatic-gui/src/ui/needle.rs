//! # Needle Meter Widget
//!
//! Dial with a rotating needle showing how far the current pitch is from the
//! nearest note. The needle angle and its colour come straight from the
//! core's `FeedbackState`; this widget only draws.

use chromatic_core::feedback::{MAX_CENTS, MIN_CENTS, needle_angle};
use chromatic_core::{FeedbackState, Mood};
use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::widget::container;
use iced::{mouse, Color, Element, Point, Rectangle, Renderer, Theme, Vector};

/// Cent positions marked on the dial.
const TICKS: [f32; 7] = [MIN_CENTS, -30.0, -10.0, 0.0, 10.0, 30.0, MAX_CENTS];

pub struct NeedleMeter {
    feedback: FeedbackState,
}

impl NeedleMeter {
    pub fn new(feedback: FeedbackState) -> Self {
        Self { feedback }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fixed(180.0)),
        )
        .into()
    }
}

/// Colour of the needle for a mood.
pub fn mood_color(mood: Mood) -> Color {
    match mood {
        Mood::Happy => Color::from_rgb8(0x34, 0xDB, 0x98),
        Mood::Confused => Color::from_rgb8(0xFF, 0xC3, 0x00),
        Mood::Unhappy => Color::from_rgb8(0xFF, 0x33, 0x33),
        Mood::None => Color::from_rgb8(0x90, 0x90, 0x90),
    }
}

/// Offset from the pivot for a needle of `length` rotated by `degrees`.
/// 0° points straight up; positive angles lean right (sharp).
fn polar(degrees: f32, length: f32) -> Vector {
    let radians = degrees.to_radians();
    Vector::new(length * radians.sin(), -length * radians.cos())
}

impl<Message> canvas::Program<Message> for NeedleMeter {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        let background = Path::rectangle(Point::ORIGIN, bounds.size());
        frame.fill(&background, Color::from_rgb8(0x40, 0x40, 0x40));

        let pivot = Point::new(bounds.width / 2.0, bounds.height - 12.0);
        let radius = (bounds.height - 24.0).min(bounds.width / 2.0 - 12.0).max(10.0);

        for cents in TICKS {
            let angle = needle_angle(cents);
            let outer = pivot + polar(angle, radius);
            let inner = pivot + polar(angle, radius * if cents == 0.0 { 0.8 } else { 0.88 });
            frame.stroke(
                &Path::line(inner, outer),
                Stroke::default()
                    .with_width(if cents == 0.0 { 3.0 } else { 1.5 })
                    .with_color(Color::WHITE),
            );
        }

        let tip = pivot + polar(self.feedback.angle_degrees, radius * 0.95);
        let color = mood_color(self.feedback.mood);
        frame.stroke(
            &Path::line(pivot, tip),
            Stroke::default().with_width(4.0).with_color(color),
        );
        frame.fill(&Path::circle(pivot, 6.0), color);

        vec![frame.into_geometry()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centred_needle_points_up() {
        let v = polar(0.0, 100.0);
        assert!(v.x.abs() < 1e-4);
        assert!((v.y + 100.0).abs() < 1e-4);
    }

    #[test]
    fn full_sharp_needle_lies_flat_to_the_right() {
        let v = polar(needle_angle(MAX_CENTS), 50.0);
        assert!((v.x - 50.0).abs() < 1e-3);
        assert!(v.y.abs() < 1e-3);
    }
}
