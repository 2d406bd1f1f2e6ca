//! Utility module
//!
//! This module provides common utilities and helper functions used
//! throughout the library.

use std::fmt::Write;

use rand::RngCore;

use crate::core::{Error, Result};

/// Length of generated pairing keys
pub const KEY_LEN: usize = 8;

/// Normalizes a MAC address to `AA:BB:CC:DD:EE:FF`.
///
/// Colons, dashes and spaces are ignored; anything but 12 hex digits is a
/// configuration error.
pub fn normalize_mac(address: &str) -> Result<String> {
    let digits: String = address
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | ' '))
        .collect();
    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::config(format!("invalid MAC address: {address:?}")));
    }

    let digits = digits.to_ascii_uppercase();
    let pairs: Vec<&str> = (0..12).step_by(2).map(|i| &digits[i..i + 2]).collect();
    Ok(pairs.join(":"))
}

/// Generates a random pairing key
pub fn generate_key() -> Vec<u8> {
    let mut key = vec![0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Formats bytes as space separated hex for logs
pub fn hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, b) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
    out
}
