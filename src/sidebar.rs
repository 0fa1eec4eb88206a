//! Off-canvas sidebar controller.
//!
//! The sidebar and its backdrop overlay always change together, and opening
//! locks page scrolling by setting the body overflow to a locked value.
//! Closing restores the overflow to the empty string — never to whatever
//! inline value it held before — so an externally-set overflow style is
//! lost on the first close. Known simplification, kept as-is.

/// Viewport width at or below which a nav-link click closes the sidebar.
pub const MOBILE_BREAKPOINT_PX: f64 = 1024.0;
/// Body overflow value while the sidebar is open.
pub const LOCKED_OVERFLOW: &str = "hidden";

/// Open/closed state of the off-canvas navigation panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidebar {
    pub is_open: bool,
    pub overlay_visible: bool,
    /// Stand-in for `document.body.style.overflow`.
    pub body_overflow: String,
}

impl Sidebar {
    pub fn new() -> Self {
        Self {
            is_open: false,
            overlay_visible: false,
            body_overflow: String::new(),
        }
    }

    /// Open unconditionally: panel and overlay on, scrolling locked.
    pub fn open(&mut self) {
        self.is_open = true;
        self.overlay_visible = true;
        self.body_overflow = LOCKED_OVERFLOW.to_owned();
    }

    /// Close unconditionally: panel and overlay off, overflow restored to
    /// the default empty value.
    pub fn close(&mut self) {
        self.is_open = false;
        self.overlay_visible = false;
        self.body_overflow.clear();
    }

    /// Whether page scrolling is currently locked.
    pub fn scroll_locked(&self) -> bool {
        self.body_overflow == LOCKED_OVERFLOW
    }

    /// Escape key: closes only while open. Returns whether it closed.
    pub fn handle_escape(&mut self) -> bool {
        if self.is_open {
            self.close();
            true
        } else {
            false
        }
    }

    /// A navigation link inside the sidebar was activated. Closes only on
    /// viewports at or below the mobile breakpoint; desktop clicks leave the
    /// sidebar open. Returns whether it closed.
    pub fn handle_nav_link_click(&mut self, viewport_width_px: f64) -> bool {
        if viewport_width_px <= MOBILE_BREAKPOINT_PX {
            self.close();
            true
        } else {
            false
        }
    }
}

impl Default for Sidebar {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_sets_panel_overlay_and_lock_together() {
        let mut sb = Sidebar::new();
        sb.open();
        assert!(sb.is_open);
        assert!(sb.overlay_visible);
        assert_eq!(sb.body_overflow, LOCKED_OVERFLOW);
        assert!(sb.scroll_locked());
    }

    #[test]
    fn close_clears_all_three_markers() {
        let mut sb = Sidebar::new();
        sb.open();
        sb.close();
        assert!(!sb.is_open);
        assert!(!sb.overlay_visible);
        assert_eq!(sb.body_overflow, "");
        assert!(!sb.scroll_locked());
    }

    #[test]
    fn operations_set_rather_than_toggle() {
        let mut sb = Sidebar::new();
        sb.open();
        sb.open();
        assert!(sb.is_open);
        sb.close();
        sb.close();
        assert!(!sb.is_open);
    }

    #[test]
    fn close_loses_externally_set_overflow() {
        let mut sb = Sidebar::new();
        sb.body_overflow = "scroll".to_owned();
        sb.open();
        sb.close();
        // Restored to the default empty value, not to "scroll".
        assert_eq!(sb.body_overflow, "");
    }

    #[test]
    fn escape_closes_only_while_open() {
        let mut sb = Sidebar::new();
        assert!(!sb.handle_escape());
        assert!(!sb.is_open);

        sb.open();
        assert!(sb.handle_escape());
        assert!(!sb.is_open);
    }

    #[test]
    fn nav_link_click_closes_only_at_mobile_widths() {
        let mut sb = Sidebar::new();

        sb.open();
        assert!(!sb.handle_nav_link_click(1025.0));
        assert!(sb.is_open, "desktop click leaves the sidebar open");

        assert!(sb.handle_nav_link_click(1024.0));
        assert!(!sb.is_open, "breakpoint width is inclusive");

        sb.open();
        assert!(sb.handle_nav_link_click(480.0));
        assert!(!sb.is_open);
    }

    #[test]
    fn panel_and_overlay_never_diverge() {
        let mut sb = Sidebar::new();
        for _ in 0..3 {
            sb.open();
            assert_eq!(sb.is_open, sb.overlay_visible);
            sb.close();
            assert_eq!(sb.is_open, sb.overlay_visible);
        }
    }
}
