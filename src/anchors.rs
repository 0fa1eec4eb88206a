//! Heading anchor injection.
//!
//! A single pass over the level-2 and level-3 headings of every section, in
//! document order, prepending a same-page anchor link to any heading that
//! lacks one. Headings that already carry an anchor are skipped, so the
//! pass is idempotent.
//!
//! Id resolution priority: the heading's own id; else the enclosing
//! section's id; else — level-3 headings only — a slug derived from the
//! heading text, which is also memoized as the heading's id. When nothing
//! resolves (including an empty slug) the heading is skipped silently.

use crate::page::Section;

/// Text content of the anchor link.
pub const ANCHOR_GLYPH: &str = "#";
/// Accessible name for the anchor link.
pub const ANCHOR_ARIA_LABEL: &str = "Direct link to this section";

/// A same-page anchor link prepended to a heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorLink {
    /// Fragment href, e.g. `#getting-started`.
    pub href: String,
}

impl AnchorLink {
    pub fn to_fragment(id: &str) -> Self {
        Self {
            href: format!("#{id}"),
        }
    }
}

/// Convert heading text to a URL-safe slug.
///
/// Lowercases the text, collapses every run of non-alphanumeric characters
/// to a single hyphen, and trims leading/trailing hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_owned()
}

/// Run the anchor injection pass over every section.
///
/// Returns the number of anchors inserted (zero on a second run).
pub fn inject_anchors(sections: &mut [Section]) -> usize {
    let mut inserted = 0;

    for section in sections.iter_mut() {
        let section_id = section.id.clone();
        for heading in section
            .headings
            .iter_mut()
            .filter(|h| h.level == 2 || h.level == 3)
        {
            if heading.anchor.is_some() {
                continue;
            }

            let resolved = heading
                .id
                .clone()
                .or_else(|| section_id.clone())
                .or_else(|| {
                    if heading.level != 3 {
                        return None;
                    }
                    let slug = slugify(&heading.text);
                    if slug.is_empty() {
                        return None;
                    }
                    // Memoize onto the heading so a later pass resolves
                    // via rule (a) instead of re-deriving.
                    heading.id = Some(slug.clone());
                    Some(slug)
                });

            if let Some(id) = resolved {
                heading.anchor = Some(AnchorLink::to_fragment(&id));
                inserted += 1;
            }
        }
    }

    inserted
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::SectionHeading;

    fn heading(level: u8, text: &str, id: Option<&str>) -> SectionHeading {
        SectionHeading {
            level,
            text: text.to_owned(),
            id: id.map(str::to_owned),
            line: 1,
            anchor: None,
        }
    }

    fn section(id: Option<&str>, headings: Vec<SectionHeading>) -> Section {
        Section {
            id: id.map(str::to_owned),
            title: "t".to_owned(),
            blocks: Vec::new(),
            headings,
        }
    }

    // --- slugify ---

    #[test]
    fn slug_from_punctuated_text() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
    }

    #[test]
    fn slug_collapses_nonalnum_runs() {
        assert_eq!(slugify("a...b"), "a-b");
        assert_eq!(slugify("C++ API"), "c-api");
    }

    #[test]
    fn slug_trims_edge_hyphens() {
        assert_eq!(slugify("--edge case--"), "edge-case");
        assert_eq!(slugify("!leading"), "leading");
    }

    #[test]
    fn slug_of_pure_punctuation_is_empty() {
        assert_eq!(slugify("?!?"), "");
    }

    #[test]
    fn slug_keeps_digits() {
        assert_eq!(slugify("Version 2.0"), "version-2-0");
    }

    // --- injection ---

    #[test]
    fn own_id_wins_over_section_id() {
        let mut sections = vec![section(
            Some("sect"),
            vec![heading(3, "Sub", Some("own"))],
        )];
        assert_eq!(inject_anchors(&mut sections), 1);
        assert_eq!(
            sections[0].headings[0].anchor.as_ref().unwrap().href,
            "#own"
        );
    }

    #[test]
    fn section_id_used_when_heading_has_none() {
        let mut sections = vec![section(Some("sect"), vec![heading(2, "Title", None)])];
        inject_anchors(&mut sections);
        assert_eq!(
            sections[0].headings[0].anchor.as_ref().unwrap().href,
            "#sect"
        );
    }

    #[test]
    fn h3_without_any_id_gets_derived_slug() {
        let mut sections = vec![section(None, vec![heading(3, "Hello, World!", None)])];
        inject_anchors(&mut sections);
        let h = &sections[0].headings[0];
        assert_eq!(h.anchor.as_ref().unwrap().href, "#hello-world");
        // Memoized back onto the heading.
        assert_eq!(h.id.as_deref(), Some("hello-world"));
    }

    #[test]
    fn h2_without_any_id_is_skipped() {
        // Slug derivation is a level-3 rule only.
        let mut sections = vec![section(None, vec![heading(2, "Orphan", None)])];
        assert_eq!(inject_anchors(&mut sections), 0);
        assert!(sections[0].headings[0].anchor.is_none());
    }

    #[test]
    fn unsluggable_h3_is_skipped() {
        let mut sections = vec![section(None, vec![heading(3, "!!!", None)])];
        assert_eq!(inject_anchors(&mut sections), 0);
        assert!(sections[0].headings[0].anchor.is_none());
        assert!(sections[0].headings[0].id.is_none());
    }

    #[test]
    fn second_run_inserts_nothing() {
        let mut sections = vec![section(
            Some("sect"),
            vec![heading(2, "Title", None), heading(3, "Sub", None)],
        )];
        assert_eq!(inject_anchors(&mut sections), 2);
        assert_eq!(inject_anchors(&mut sections), 0);

        // Still exactly one anchor per heading.
        for h in &sections[0].headings {
            assert!(h.anchor.is_some());
        }
    }

    #[test]
    fn other_levels_untouched() {
        let mut sections = vec![section(Some("sect"), vec![heading(4, "Deep", None)])];
        assert_eq!(inject_anchors(&mut sections), 0);
        assert!(sections[0].headings[0].anchor.is_none());
    }
}
