//! Embedded static web assets for the docview serve mode.
//!
//! The stylesheet is compiled into the binary via `include_str!` so the
//! binary is fully self-contained; no external asset files need to be
//! distributed.

/// Stylesheet for the serve-mode docs page.
///
/// Loaded from `src/assets/docview.css` at compile time.
pub const CSS: &str = include_str!("assets/docview.css");
