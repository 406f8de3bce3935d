// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Dashforge CLI

pub mod config;
pub mod keygen;
pub mod parse;

pub use self::config::ConfigCommand;
