//! # Main Display Module
//!
//! Layout of the tuner window: note readout and needle on the left, controls
//! in a sidebar on the right.

use chromatic_core::config::REFERENCE_RANGE;
use chromatic_core::{Algorithm, Mood};
use iced::widget::{button, column, container, pick_list, row, slider, text, Space};
use iced::{Alignment, Element, Length};

use super::needle::{mood_color, NeedleMeter};
use crate::{AppDisplayData, Message};

fn mood_label(mood: Mood) -> &'static str {
    match mood {
        Mood::Happy => "In tune",
        Mood::Confused => "Close",
        Mood::Unhappy => "Out of tune",
        Mood::None => "",
    }
}

/// Creates the complete main application view
pub fn create_main_view(data: &AppDisplayData) -> Element<'static, Message> {
    let title = text("Chromatic Tuner").size(28);

    let main_content = row![
        column![
            title,
            Space::with_height(20),
            create_readout_panel(data),
            create_status_line(data),
        ]
        .width(Length::Fill)
        .spacing(10),
        Space::with_width(10),
        create_sidebar(data),
    ]
    .align_y(Alignment::Start)
    .padding(20);

    container(main_content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

fn create_readout_panel(data: &AppDisplayData) -> Element<'static, Message> {
    let update = &data.last_update;
    let note_text = if update.reading.is_silent() {
        "--".to_string()
    } else {
        update.reading.note_name.clone()
    };
    let cents_text = if update.reading.is_silent() {
        String::new()
    } else {
        format!("{:+.1} cents", update.reading.cents)
    };
    let mood = update.feedback.mood;

    let readout = column![
        row![
            text(note_text).size(48),
            Space::with_width(20),
            column![
                text(format!("{:.2} Hz", data.current_pitch)).size(20),
                text(cents_text).size(16),
            ],
        ]
        .align_y(Alignment::Center),
        text(mood_label(mood)).size(18).color(mood_color(mood)),
        Space::with_height(10),
        NeedleMeter::new(update.feedback).view(),
    ]
    .spacing(5);

    container(readout.padding(15)).width(Length::Fill).into()
}

fn create_status_line(data: &AppDisplayData) -> Element<'static, Message> {
    let status = match (&data.status, data.running) {
        (Some(message), _) => message.clone(),
        (None, true) => "Listening...".to_string(),
        (None, false) if !data.last_trace.is_empty() => {
            format!("Stopped. Last run heard {} distinct pitches.", data.last_trace.len())
        }
        (None, false) => "Stopped.".to_string(),
    };
    text(status).size(14).into()
}

fn create_sidebar(data: &AppDisplayData) -> Element<'static, Message> {
    let toggle_label = if data.running { "Stop" } else { "Start" };

    // Changing the algorithm needs a fresh engine, so only offer it while stopped.
    let algorithm_picker = pick_list(
        Algorithm::ALL,
        Some(data.algorithm),
        Message::AlgorithmSelected,
    );
    let algorithm_row: Element<'static, Message> = if data.running {
        text(format!("Algorithm: {}", data.algorithm)).size(14).into()
    } else {
        algorithm_picker.into()
    };

    let sidebar = column![
        text("Detection").size(16),
        button(text(toggle_label))
            .on_press(Message::ToggleDetection)
            .width(Length::Fill),
        algorithm_row,
        Space::with_height(20),
        text("Reference").size(16),
        text(format!("A4 = {} Hz", data.reference_hz)).size(14),
        slider(
            REFERENCE_RANGE,
            data.reference_hz,
            Message::ReferenceChanged,
        ),
        button(text("Reset to 440 Hz"))
            .on_press(Message::ResetReference)
            .width(Length::Fill),
    ]
    .spacing(8)
    .width(Length::Fixed(200.0));

    container(sidebar).padding(15).into()
}
