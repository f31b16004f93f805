//! Global configuration for gfftk runtime behavior.
//!
//! This module provides thread-safe global configuration that affects
//! GFF3 parsing without threading a settings struct through every reader.

use std::sync::atomic::{AtomicBool, Ordering};

/// Global flag for strict GFF3 parsing.
///
/// In lenient mode (the default) a feature line with non-numeric
/// coordinates, an unrecognized strand or a broken attribute entry is kept
/// and a warning is logged. In strict mode the same line is a parse error.
///
/// This is set once at startup and read during parsing.
static STRICT: AtomicBool = AtomicBool::new(false);

/// Enable or disable strict parsing.
///
/// # Example
///
/// ```
/// use gfftk::config;
///
/// // Enable at startup before any parsing
/// config::set_strict(true);
/// assert!(config::is_strict());
/// config::set_strict(false);
/// ```
#[inline]
pub fn set_strict(enabled: bool) {
    STRICT.store(enabled, Ordering::Release);
}

/// Check if strict parsing is enabled.
#[inline]
pub fn is_strict() -> bool {
    STRICT.load(Ordering::Acquire)
}
