// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Use-case services composed from domain rules and ports.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates sentiment, learning, allocation and feedback

pub mod response_parser;
pub mod sentiment_service;
pub mod learning_service;
pub mod allocation_engine;
pub mod profile_service;
pub mod refinement_engine;
pub mod feedback_learner;
pub mod two_phase;

pub use two_phase::TwoPhasePipeline;
