//! Reading progress and section spy.
//!
//! Tracks a vertical scroll offset against the page's section geometry.
//! Two effects hang off it: a progress bar whose width follows the scroll
//! percentage, and a table-of-contents highlight that follows whichever
//! section currently sits in the trigger band near the top of the viewport.
//!
//! Intersection changes are reported as batches of deltas (enter and leave
//! entries), mirroring how a visibility observer delivers them; the active
//! link invariant must hold for any batch order, so every entering entry
//! clears all links before marking its own.

/// Top edge of the trigger band, as a fraction of viewport height.
pub const BAND_TOP_FRACTION: f64 = 0.20;
/// Bottom edge of the trigger band, as a fraction of viewport height.
pub const BAND_BOTTOM_FRACTION: f64 = 0.40;

/// Compute the scroll progress percentage, clamped to `[0, 100]`.
///
/// When the page is no taller than the viewport the divisor is zero and the
/// raw value is non-finite; that case reads as 0.
pub fn progress_percent(scroll_top: f64, scroll_height: f64, client_height: f64) -> f64 {
    let raw = scroll_top / (scroll_height - client_height) * 100.0;
    if raw.is_finite() {
        raw.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// The progress bar element: its width mirrors the scroll percentage.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProgressBar {
    pub width_percent: f64,
}

impl ProgressBar {
    pub fn update(&mut self, scroll_top: f64, scroll_height: f64, client_height: f64) {
        self.width_percent = progress_percent(scroll_top, scroll_height, client_height);
    }
}

/// A watched section: its id and vertical extent in document coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionTarget {
    pub id: String,
    pub top: f64,
    pub bottom: f64,
}

/// A table-of-contents link targeting `#<fragment>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocLink {
    pub fragment: String,
    pub active: bool,
}

impl TocLink {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            active: false,
        }
    }
}

/// One entry in an intersection batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intersection {
    pub section_id: String,
    pub is_intersecting: bool,
}

/// Watches section targets against the trigger band and keeps at most one
/// TOC link marked active.
#[derive(Debug)]
pub struct Scrollspy {
    sections: Vec<SectionTarget>,
    in_band: Vec<bool>,
    pub links: Vec<TocLink>,
}

impl Scrollspy {
    pub fn new(sections: Vec<SectionTarget>, links: Vec<TocLink>) -> Self {
        let in_band = vec![false; sections.len()];
        Self {
            sections,
            in_band,
            links,
        }
    }

    /// Replace the watched geometry (sections move when the page reflows).
    /// Intersection state is re-derived on the next observe pass.
    pub fn set_sections(&mut self, sections: Vec<SectionTarget>) {
        self.in_band = vec![false; sections.len()];
        self.sections = sections;
    }

    /// Run an observation pass for the given scroll position, returning the
    /// batch of sections whose band-intersection state changed.
    pub fn observe(&mut self, scroll_top: f64, client_height: f64) -> Vec<Intersection> {
        let band_top = scroll_top + client_height * BAND_TOP_FRACTION;
        let band_bottom = scroll_top + client_height * BAND_BOTTOM_FRACTION;

        let mut batch = Vec::new();
        for (i, section) in self.sections.iter().enumerate() {
            let intersecting = section.top < band_bottom && section.bottom > band_top;
            if intersecting != self.in_band[i] {
                self.in_band[i] = intersecting;
                batch.push(Intersection {
                    section_id: section.id.clone(),
                    is_intersecting: intersecting,
                });
            }
        }
        batch
    }

    /// Apply an intersection batch to the TOC links.
    ///
    /// For every entry reported as newly intersecting: clear the active
    /// marker from all links, then set it on the link whose fragment equals
    /// the section id. A section with no matching link still clears the
    /// previous highlight. Leave entries are ignored.
    pub fn apply(&mut self, batch: &[Intersection]) {
        for entry in batch {
            if !entry.is_intersecting {
                continue;
            }
            for link in &mut self.links {
                link.active = false;
            }
            if let Some(link) = self
                .links
                .iter_mut()
                .find(|l| l.fragment == entry.section_id)
            {
                link.active = true;
            }
        }
    }

    /// Observe and apply in one step; the per-scroll-event entry point.
    pub fn on_scroll(&mut self, scroll_top: f64, client_height: f64) {
        let batch = self.observe(scroll_top, client_height);
        self.apply(&batch);
    }

    /// Fragment of the currently active link, if any.
    pub fn active_fragment(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.active)
            .map(|l| l.fragment.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn spy(sections: &[(&str, f64, f64)], links: &[&str]) -> Scrollspy {
        Scrollspy::new(
            sections
                .iter()
                .map(|(id, top, bottom)| SectionTarget {
                    id: (*id).to_owned(),
                    top: *top,
                    bottom: *bottom,
                })
                .collect(),
            links.iter().map(|f| TocLink::new(*f)).collect(),
        )
    }

    // --- progress_percent ---

    #[test]
    fn progress_zero_at_top() {
        assert_eq!(progress_percent(0.0, 2000.0, 800.0), 0.0);
    }

    #[test]
    fn progress_hundred_at_bottom() {
        assert_eq!(progress_percent(1200.0, 2000.0, 800.0), 100.0);
    }

    #[test]
    fn progress_midpoint() {
        assert_eq!(progress_percent(600.0, 2000.0, 800.0), 50.0);
    }

    #[test]
    fn progress_clamped_above_hundred() {
        // Overscroll (rubber banding) must not exceed 100.
        assert_eq!(progress_percent(1500.0, 2000.0, 800.0), 100.0);
    }

    #[test]
    fn progress_clamped_below_zero() {
        assert_eq!(progress_percent(-50.0, 2000.0, 800.0), 0.0);
    }

    #[test]
    fn progress_short_page_reads_zero() {
        // scrollHeight == clientHeight → divisor 0 → non-finite → 0.
        assert_eq!(progress_percent(0.0, 800.0, 800.0), 0.0);
        assert_eq!(progress_percent(10.0, 800.0, 800.0), 0.0);
    }

    #[test]
    fn progress_bar_update() {
        let mut bar = ProgressBar::default();
        bar.update(600.0, 2000.0, 800.0);
        assert_eq!(bar.width_percent, 50.0);
    }

    // --- trigger band ---

    #[test]
    fn section_in_band_is_reported() {
        let mut s = spy(&[("intro", 0.0, 300.0)], &["intro"]);
        // Viewport 1000 tall at offset 0: band is [200, 400].
        let batch = s.observe(0.0, 1000.0);
        assert_eq!(batch.len(), 1);
        assert!(batch[0].is_intersecting);
        assert_eq!(batch[0].section_id, "intro");
    }

    #[test]
    fn section_below_band_not_reported() {
        let mut s = spy(&[("deep", 500.0, 900.0)], &["deep"]);
        // Band [200, 400] — section starts at 500.
        assert!(s.observe(0.0, 1000.0).is_empty());
    }

    #[test]
    fn no_delta_means_empty_batch() {
        let mut s = spy(&[("intro", 0.0, 300.0)], &["intro"]);
        assert_eq!(s.observe(0.0, 1000.0).len(), 1);
        // Same position again: state unchanged, nothing reported.
        assert!(s.observe(0.0, 1000.0).is_empty());
    }

    #[test]
    fn leaving_the_band_reports_a_leave_entry() {
        let mut s = spy(&[("intro", 0.0, 300.0)], &["intro"]);
        s.on_scroll(0.0, 1000.0);
        assert_eq!(s.active_fragment(), Some("intro"));

        // Scroll far enough that the section is above the band.
        let batch = s.observe(600.0, 1000.0);
        assert_eq!(batch.len(), 1);
        assert!(!batch[0].is_intersecting);

        // Leave entries do not clear the highlight by themselves.
        s.apply(&batch);
        assert_eq!(s.active_fragment(), Some("intro"));
    }

    // --- active link invariant ---

    #[test]
    fn at_most_one_active_for_any_batch_order() {
        let mut s = spy(
            &[("a", 0.0, 100.0), ("b", 100.0, 200.0), ("c", 200.0, 300.0)],
            &["a", "b", "c"],
        );
        // Adversarial hand-built batch: several enters in indeterminate order.
        let batch = vec![
            Intersection {
                section_id: "c".into(),
                is_intersecting: true,
            },
            Intersection {
                section_id: "a".into(),
                is_intersecting: true,
            },
            Intersection {
                section_id: "b".into(),
                is_intersecting: true,
            },
        ];
        s.apply(&batch);
        let active: Vec<&TocLink> = s.links.iter().filter(|l| l.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].fragment, "b");
    }

    #[test]
    fn unmatched_section_clears_without_setting() {
        let mut s = spy(&[("a", 0.0, 100.0)], &["a"]);
        s.apply(&[Intersection {
            section_id: "a".into(),
            is_intersecting: true,
        }]);
        assert_eq!(s.active_fragment(), Some("a"));

        // A section with no corresponding link clears the old highlight.
        s.apply(&[Intersection {
            section_id: "unlinked".into(),
            is_intersecting: true,
        }]);
        assert_eq!(s.active_fragment(), None);
    }

    #[test]
    fn scrolling_through_sections_moves_the_highlight() {
        let mut s = spy(
            &[("a", 0.0, 400.0), ("b", 400.0, 800.0), ("c", 800.0, 1200.0)],
            &["a", "b", "c"],
        );
        s.on_scroll(0.0, 1000.0);
        assert_eq!(s.active_fragment(), Some("a"));

        s.on_scroll(350.0, 1000.0);
        // Band [550, 750] — section b.
        assert_eq!(s.active_fragment(), Some("b"));

        s.on_scroll(700.0, 1000.0);
        // Band [900, 1100] — section c.
        assert_eq!(s.active_fragment(), Some("c"));
    }

    #[test]
    fn set_sections_resets_intersection_state() {
        let mut s = spy(&[("a", 0.0, 300.0)], &["a"]);
        s.on_scroll(0.0, 1000.0);
        s.set_sections(vec![SectionTarget {
            id: "a".into(),
            top: 0.0,
            bottom: 300.0,
        }]);
        // Fresh state: the section is reported as entering again.
        let batch = s.observe(0.0, 1000.0);
        assert_eq!(batch.len(), 1);
        assert!(batch[0].is_intersecting);
    }
}
