//! # UI Module
//!
//! This module contains all UI components for the chromatic tuner.

pub mod main_display;
pub mod needle;
