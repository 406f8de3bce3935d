// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `dashforge keygen`

use anyhow::Result;
use colored::Colorize;

use dashforge_core::infrastructure::vault::CredentialVault;

pub fn execute() -> Result<()> {
    let key = CredentialVault::generate_key();
    println!("{}", key);
    eprintln!(
        "{}",
        "Store this as ENCRYPTION_KEY. Rotating it makes saved connections unreadable.".dimmed()
    );
    Ok(())
}
