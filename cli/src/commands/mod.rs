// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the SectorFlow CLI

pub mod allocate;
pub mod config;
pub mod feedback;
pub mod learn;
pub mod sentiment;

pub use self::allocate::AllocateCommand;
pub use self::config::ConfigCommand;
pub use self::feedback::FeedbackCommand;
pub use self::learn::LearnCommand;
pub use self::sentiment::SentimentCommand;

use colored::{ColoredString, Colorize};

/// Signed score, green when positive and red when negative.
pub(crate) fn signed(value: f64) -> ColoredString {
    let text = format!("{:+.3}", value);
    if value > 0.0 {
        text.green()
    } else if value < 0.0 {
        text.red()
    } else {
        text.normal()
    }
}
