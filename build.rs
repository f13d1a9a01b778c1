//! Build script for corertos

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

/// AVR parts with more than 128 KiB of flash need a 3-byte program counter;
/// everything else in the ATmega family uses 2 bytes. This mirrors the
/// `#ifdef __AVR_ATmega2560__` branch in the original C implementation's
/// `prepareTaskStack`, which hard-coded the 3-byte case for the ATmega2560.
const WIDE_PC_MCUS: &[&str] = &["atmega2560", "atmega2561", "atmega1280", "atmega1281"];

/// Entry point to the build script
fn main() {
    println!("cargo::rustc-check-cfg=cfg(pc24)");

    // Either `CARGO_CFG_TARGET_CPU` (set via `-C target-cpu=...`, the normal
    // way `ravedude`/`cargo-avr`-style builds select an AVR part) or a suffix
    // of the target triple carries the MCU name. We accept either so the
    // crate builds the same way whichever convention the board support
    // crate uses.
    let mcu = std::env::var("CARGO_CFG_TARGET_CPU")
        .ok()
        .or_else(|| std::env::var("TARGET").ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if WIDE_PC_MCUS.iter().any(|part| mcu.contains(part)) {
        println!("cargo::rustc-cfg=pc24");
    }

    println!("cargo::rerun-if-env-changed=CARGO_CFG_TARGET_CPU");
    println!("cargo::rerun-if-env-changed=TARGET");
}

// End of File
