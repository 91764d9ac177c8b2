// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Sector, sentiment, learning, allocation, refinement and feedback types plus
//! the ports the pipeline depends on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types, rules and port traits

pub mod sector;
pub mod sentiment;
pub mod learning;
pub mod scenario;
pub mod allocation;
pub mod refinement;
pub mod feedback;
pub mod llm;
pub mod market;
pub mod news;
pub mod repository;
pub mod schedule;
pub mod prompt_feedback;
pub mod config;
