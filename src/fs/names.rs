//! Filename validation applied before any create or rename reaches the gateway.

use crate::error::{Result, TreeError};

pub const MAX_NAME_LEN: usize = 255;

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Reject names that are empty, `.` or `..`, too long, contain a forbidden
/// character, or equal a reserved device name (case-insensitive).
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TreeError::invalid_name(name, "name cannot be empty"));
    }
    if name == "." || name == ".." {
        return Err(TreeError::invalid_name(name, "name cannot be '.' or '..'"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(TreeError::invalid_name(
            name,
            format!("name is longer than {} characters", MAX_NAME_LEN),
        ));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(TreeError::invalid_name(
            name,
            format!("name cannot contain '{}'", c),
        ));
    }
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return Err(TreeError::invalid_name(name, "reserved device name"));
    }
    Ok(())
}
