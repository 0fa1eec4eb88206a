//! Documentation page model.
//!
//! A [`Page`] is the explicit environment the interactive behaviors act on:
//! sections split at level-2 headings, their headings (for anchor
//! injection), table-of-contents entries, and the optional CLI demo window.
//! Front ends (TUI, HTML) render the same model.

use crate::anchors::{self, AnchorLink};
use crate::parse::{BlockKind, ContentBlock, Heading, ParsedDocument};

/// A level-2 or level-3 heading inside a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeading {
    pub level: u8,
    pub text: String,
    /// Explicit or injector-assigned id.
    pub id: Option<String>,
    /// 1-based source line.
    pub line: usize,
    /// Same-page anchor link, present once the injector has run.
    pub anchor: Option<AnchorLink>,
}

/// A documentation section: one level-2 heading and everything up to the
/// next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section id: the heading's explicit id, else a slug of its title.
    pub id: Option<String>,
    pub title: String,
    pub blocks: Vec<ContentBlock>,
    pub headings: Vec<SectionHeading>,
}

/// One table-of-contents entry (`href="#<fragment>"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub fragment: String,
    pub label: String,
}

/// The CLI demo window: a `demo` fence supplies the typed command, an
/// immediately following `output` fence supplies the hidden output panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoWindow {
    pub command: String,
    pub output: Option<String>,
}

/// The loaded documentation page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Frontmatter title, else the first level-1 heading.
    pub title: Option<String>,
    pub description: Option<String>,
    /// Blocks before the first level-2 heading (page intro).
    pub lead: Vec<ContentBlock>,
    pub sections: Vec<Section>,
    pub demo: Option<DemoWindow>,
}

impl Page {
    /// Build the page model from a parsed document.
    pub fn from_document(doc: &ParsedDocument) -> Self {
        let title = doc
            .frontmatter
            .as_ref()
            .and_then(|fm| fm.title.clone())
            .or_else(|| {
                doc.headings
                    .iter()
                    .find(|h| h.level == 1)
                    .map(|h| h.text.clone())
            });
        let description = doc.frontmatter.as_ref().and_then(|fm| fm.description.clone());

        let mut lead: Vec<ContentBlock> = Vec::new();
        let mut sections: Vec<Section> = Vec::new();

        for block in &doc.blocks {
            match &block.kind {
                BlockKind::Heading(2) => {
                    let heading = heading_at(doc, block.line_start, 2);
                    let heading_title = heading
                        .map(|h| h.text.clone())
                        .unwrap_or_else(|| block.content.clone());
                    let explicit_id = heading.and_then(|h| h.id.clone());
                    let id = explicit_id.clone().or_else(|| {
                        let slug = anchors::slugify(&heading_title);
                        (!slug.is_empty()).then_some(slug)
                    });
                    let mut section = Section {
                        id,
                        title: heading_title.clone(),
                        blocks: vec![block.clone()],
                        headings: Vec::new(),
                    };
                    section.headings.push(SectionHeading {
                        level: 2,
                        text: heading_title,
                        id: explicit_id,
                        line: block.line_start,
                        anchor: None,
                    });
                    sections.push(section);
                }
                kind => {
                    if let Some(section) = sections.last_mut() {
                        if let BlockKind::Heading(3) = kind {
                            let heading = heading_at(doc, block.line_start, 3);
                            section.headings.push(SectionHeading {
                                level: 3,
                                text: heading
                                    .map(|h| h.text.clone())
                                    .unwrap_or_else(|| block.content.clone()),
                                id: heading.and_then(|h| h.id.clone()),
                                line: block.line_start,
                                anchor: None,
                            });
                        }
                        section.blocks.push(block.clone());
                    } else {
                        lead.push(block.clone());
                    }
                }
            }
        }

        let demo = find_demo(&doc.blocks);

        Self {
            title,
            description,
            lead,
            sections,
            demo,
        }
    }

    /// TOC entries for every section that has an id.
    pub fn toc(&self) -> Vec<TocEntry> {
        self.sections
            .iter()
            .filter_map(|s| {
                s.id.as_ref().map(|id| TocEntry {
                    fragment: id.clone(),
                    label: s.title.clone(),
                })
            })
            .collect()
    }
}

/// Find the parsed heading record at a given source line and level.
fn heading_at(doc: &ParsedDocument, line: usize, level: u8) -> Option<&Heading> {
    doc.headings
        .iter()
        .find(|h| h.line == line && h.level == level)
}

/// Locate the first `demo` fence and its optional trailing `output` fence.
fn find_demo(blocks: &[ContentBlock]) -> Option<DemoWindow> {
    let demo_idx = blocks.iter().position(|b| {
        matches!(&b.kind, BlockKind::CodeBlock { info: Some(info) } if info == "demo")
    })?;

    let command = blocks[demo_idx].content.trim_end_matches('\n').to_owned();
    let output = blocks.get(demo_idx + 1).and_then(|b| match &b.kind {
        BlockKind::CodeBlock { info: Some(info) } if info == "output" => {
            Some(b.content.clone())
        }
        _ => None,
    });

    Some(DemoWindow { command, output })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
