// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure
//!
//! Adapters behind the domain ports: generation backends, scorers, file-backed
//! stores, market data and news.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Concrete implementations of domain ports

pub mod catalog;
pub mod llm;
pub mod news;
pub mod prices;
pub mod profiles;
pub mod prompt_feedback;
pub mod repositories;
pub mod scoring;
