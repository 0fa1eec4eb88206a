//! Markdown parsing module.
//!
//! Parses markdown text into a structured representation containing:
//! - Optional YAML frontmatter (title, description)
//! - A flat list of content blocks with their line ranges
//! - A heading list with level, text, optional explicit id, and position
//!
//! Explicit heading ids use the `{#custom-id}` attribute syntax; fenced
//! code blocks keep the first token of their info string so the page model
//! can recognize `demo` and `output` fences.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The kind of a top-level content block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    /// Fenced or indented code; `info` is the first token of the fence info
    /// string (`rust`, `demo`, `output`, …), `None` for indented blocks or
    /// bare fences.
    CodeBlock {
        info: Option<String>,
    },
    List,
    BlockQuote,
    ThematicBreak,
    HtmlBlock,
    Table,
}

/// A top-level content block in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub kind: BlockKind,
    /// 1-based starting line number in the original source.
    pub line_start: usize,
    /// 1-based ending line number (inclusive).
    pub line_end: usize,
    /// Flattened text content of the block.
    pub content: String,
}

/// A heading extracted from the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// Heading level (1–6).
    pub level: u8,
    /// Flattened text content of the heading.
    pub text: String,
    /// Explicit id from a `{#...}` attribute, when present.
    pub id: Option<String>,
    /// 1-based line number where the heading appears.
    pub line: usize,
}

/// Page metadata from the YAML frontmatter fence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// The fully parsed representation of a markdown document.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub frontmatter: Option<Frontmatter>,
    pub blocks: Vec<ContentBlock>,
    pub headings: Vec<Heading>,
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Maps byte offsets into a source string to 1-based line numbers.
struct LineIndex {
    /// Byte offsets of each `\n` character in the source.
    newline_offsets: Vec<usize>,
    /// Added to every reported line number (frontmatter displacement).
    line_offset: usize,
}

impl LineIndex {
    fn new(source: &str, line_offset: usize) -> Self {
        let newline_offsets = source
            .bytes()
            .enumerate()
            .filter_map(|(i, b)| if b == b'\n' { Some(i) } else { None })
            .collect();
        Self {
            newline_offsets,
            line_offset,
        }
    }

    /// Convert a byte offset to a 1-based line number in the original file.
    fn line_at(&self, offset: usize) -> usize {
        let line = match self.newline_offsets.binary_search(&offset) {
            Ok(idx) | Err(idx) => idx + 1,
        };
        line + self.line_offset
    }
}

fn heading_level_to_u8(level: &HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Returns `true` for block-level tags (as opposed to inline spans).
fn is_block_level(tag: &Tag) -> bool {
    !matches!(
        tag,
        Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link { .. } | Tag::Image { .. }
    )
}

fn is_block_level_end(tag: &TagEnd) -> bool {
    !matches!(
        tag,
        TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link | TagEnd::Image
    )
}

/// First whitespace-delimited token of a fence info string, if any.
fn fence_info_token(info: &str) -> Option<String> {
    info.split_whitespace().next().map(str::to_owned)
}

/// Map a *top-level* block tag to its [`BlockKind`].
///
/// Returns `None` for block tags that only appear nested (e.g. `Item`,
/// `TableRow`) and for types we intentionally skip (e.g. metadata blocks).
fn tag_to_block_kind(tag: &Tag) -> Option<BlockKind> {
    match tag {
        Tag::Paragraph => Some(BlockKind::Paragraph),
        Tag::Heading { level, .. } => Some(BlockKind::Heading(heading_level_to_u8(level))),
        Tag::CodeBlock(kind) => Some(BlockKind::CodeBlock {
            info: match kind {
                CodeBlockKind::Fenced(info) => fence_info_token(info),
                CodeBlockKind::Indented => None,
            },
        }),
        Tag::BlockQuote(..) => Some(BlockKind::BlockQuote),
        Tag::List(_) => Some(BlockKind::List),
        Tag::Table(_) => Some(BlockKind::Table),
        _ => None,
    }
}

/// Split an optional leading YAML frontmatter fence from the source.
///
/// Returns `(frontmatter_yaml, body, body_line_offset)`. The fence must
/// start at the very first line (`---`) and end at the next `---` line.
fn split_frontmatter(source: &str) -> (Option<&str>, &str, usize) {
    let Some(rest) = source
        .strip_prefix("---\n")
        .or_else(|| source.strip_prefix("---\r\n"))
    else {
        return (None, source, 0);
    };

    let mut line_start = 0;
    while line_start <= rest.len() {
        let line_end = rest[line_start..]
            .find('\n')
            .map(|p| line_start + p)
            .unwrap_or(rest.len());
        let candidate = rest[line_start..line_end].trim_end_matches('\r');
        if candidate == "---" {
            let yaml = &rest[..line_start];
            let body = if line_end < rest.len() {
                &rest[line_end + 1..]
            } else {
                ""
            };
            // 1 for the opening fence + yaml lines + 1 for the closing fence.
            let offset = 2 + yaml.lines().count();
            return (Some(yaml), body, offset);
        }
        if line_end == rest.len() {
            break;
        }
        line_start = line_end + 1;
    }
    (None, source, 0)
}

/// Parse the YAML frontmatter payload into [`Frontmatter`].
///
/// Malformed YAML is tolerated: the page simply has no metadata.
fn parse_frontmatter(yaml: &str) -> Option<Frontmatter> {
    let value: serde_yml::Value = serde_yml::from_str(yaml).ok()?;
    let field = |name: &str| {
        value
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
    };
    Some(Frontmatter {
        title: field("title"),
        description: field("description"),
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a markdown source string into a [`ParsedDocument`].
pub fn parse(source: &str) -> ParsedDocument {
    let (yaml, body, line_offset) = split_frontmatter(source);
    let frontmatter = yaml.and_then(parse_frontmatter);

    let line_index = LineIndex::new(body, line_offset);

    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES;
    let parser = Parser::new_ext(body, options);

    let mut blocks: Vec<ContentBlock> = Vec::new();
    let mut headings: Vec<Heading> = Vec::new();

    // Block tracking
    let mut block_depth: usize = 0;
    let mut current_block: Option<(BlockKind, usize)> = None; // (kind, start_offset)
    let mut text_buf = String::new();

    // Heading tracking
    let mut in_heading: Option<(u8, Option<String>)> = None; // (level, explicit id)
    let mut heading_line: usize = 0;
    let mut heading_text_buf = String::new();

    for (event, range) in parser.into_offset_iter() {
        match &event {
            Event::Start(tag) => {
                if is_block_level(tag) {
                    if block_depth == 0 {
                        if let Some(kind) = tag_to_block_kind(tag) {
                            current_block = Some((kind, range.start));
                            text_buf.clear();
                        }
                    }
                    // Insert newlines between list items / table rows for
                    // cleaner flattened content.
                    if block_depth >= 1
                        && matches!(tag, Tag::Item | Tag::TableRow)
                        && !text_buf.is_empty()
                        && !text_buf.ends_with('\n')
                    {
                        text_buf.push('\n');
                    }
                    block_depth += 1;
                }

                if let Tag::Heading { level, id, .. } = tag {
                    in_heading = Some((
                        heading_level_to_u8(level),
                        id.as_ref().map(|s| s.to_string()),
                    ));
                    heading_line = line_index.line_at(range.start);
                    heading_text_buf.clear();
                }
            }

            Event::End(tag_end) => {
                if is_block_level_end(tag_end) {
                    block_depth = block_depth.saturating_sub(1);
                    if block_depth == 0 {
                        if let Some((kind, start_offset)) = current_block.take() {
                            let start_line = line_index.line_at(start_offset);
                            let end_line = line_index
                                .line_at(range.end.saturating_sub(1).max(start_offset));
                            blocks.push(ContentBlock {
                                kind,
                                line_start: start_line,
                                line_end: end_line,
                                content: text_buf.clone(),
                            });
                        }
                        text_buf.clear();
                    }
                }

                if let TagEnd::Heading(_) = tag_end {
                    if let Some((level, id)) = in_heading.take() {
                        headings.push(Heading {
                            level,
                            text: heading_text_buf.clone(),
                            id,
                            line: heading_line,
                        });
                        heading_text_buf.clear();
                    }
                }
            }

            Event::Text(text) => {
                text_buf.push_str(text);
                if in_heading.is_some() {
                    heading_text_buf.push_str(text);
                }
            }

            Event::Code(code) => {
                text_buf.push_str(code);
                if in_heading.is_some() {
                    heading_text_buf.push_str(code);
                }
            }

            Event::SoftBreak | Event::HardBreak => {
                text_buf.push('\n');
                if in_heading.is_some() {
                    heading_text_buf.push('\n');
                }
            }

            Event::Html(html) => {
                if block_depth == 0 {
                    blocks.push(ContentBlock {
                        kind: BlockKind::HtmlBlock,
                        line_start: line_index.line_at(range.start),
                        line_end: line_index
                            .line_at(range.end.saturating_sub(1).max(range.start)),
                        content: html.to_string(),
                    });
                } else {
                    text_buf.push_str(html);
                }
            }

            Event::InlineHtml(html) => {
                text_buf.push_str(html);
            }

            Event::Rule => {
                let line = line_index.line_at(range.start);
                blocks.push(ContentBlock {
                    kind: BlockKind::ThematicBreak,
                    line_start: line,
                    line_end: line,
                    content: String::new(),
                });
            }

            _ => {}
        }
    }

    ParsedDocument {
        frontmatter,
        blocks,
        headings,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document() {
        let doc = parse("");
        assert!(doc.frontmatter.is_none());
        assert!(doc.blocks.is_empty());
        assert!(doc.headings.is_empty());
    }

    #[test]
    fn single_paragraph() {
        let doc = parse("Hello world.\n");
        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(doc.blocks[0].kind, BlockKind::Paragraph);
        assert_eq!(doc.blocks[0].content, "Hello world.");
        assert_eq!(doc.blocks[0].line_start, 1);
    }

    #[test]
    fn headings_extracted() {
        let src = "# Title\n\nBody\n\n## Section\n\nMore\n\n### Sub\n";
        let doc = parse(src);

        assert_eq!(doc.headings.len(), 3);

        assert_eq!(doc.headings[0].level, 1);
        assert_eq!(doc.headings[0].text, "Title");
        assert_eq!(doc.headings[0].line, 1);

        assert_eq!(doc.headings[1].level, 2);
        assert_eq!(doc.headings[1].text, "Section");
        assert_eq!(doc.headings[1].line, 5);

        assert_eq!(doc.headings[2].level, 3);
        assert_eq!(doc.headings[2].text, "Sub");
        assert_eq!(doc.headings[2].line, 9);
    }

    #[test]
    fn explicit_heading_id_captured() {
        let doc = parse("## Install Guide {#install}\n");
        assert_eq!(doc.headings.len(), 1);
        assert_eq!(doc.headings[0].text, "Install Guide");
        assert_eq!(doc.headings[0].id.as_deref(), Some("install"));
    }

    #[test]
    fn heading_without_attribute_has_no_id() {
        let doc = parse("## Install Guide\n");
        assert_eq!(doc.headings[0].id, None);
    }

    #[test]
    fn fenced_code_keeps_info_token() {
        let src = "```rust ignore\nfn main() {}\n```\n";
        let doc = parse(src);
        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(
            doc.blocks[0].kind,
            BlockKind::CodeBlock {
                info: Some("rust".to_owned())
            }
        );
        assert_eq!(doc.blocks[0].content, "fn main() {}\n");
    }

    #[test]
    fn bare_fence_has_no_info() {
        let doc = parse("```\nhello\n```\n");
        assert_eq!(doc.blocks[0].kind, BlockKind::CodeBlock { info: None });
    }

    #[test]
    fn frontmatter_parsed_and_stripped() {
        let src = "---\ntitle: Guide\ndescription: How to use it\n---\n# Heading\n";
        let doc = parse(src);

        let fm = doc.frontmatter.expect("frontmatter present");
        assert_eq!(fm.title.as_deref(), Some("Guide"));
        assert_eq!(fm.description.as_deref(), Some("How to use it"));

        assert_eq!(doc.headings.len(), 1);
        assert_eq!(doc.headings[0].text, "Heading");
        // The heading sits on line 5 of the original file.
        assert_eq!(doc.headings[0].line, 5);
    }

    #[test]
    fn unterminated_frontmatter_is_body() {
        let src = "---\ntitle: Guide\n# Heading\n";
        let doc = parse(src);
        assert!(doc.frontmatter.is_none());
    }

    #[test]
    fn malformed_frontmatter_yaml_tolerated() {
        let src = "---\n{not yaml\n---\nBody\n";
        let doc = parse(src);
        assert!(doc.frontmatter.is_none());
        assert_eq!(doc.blocks.len(), 1);
    }

    #[test]
    fn unordered_list_flattened() {
        let src = "- alpha\n- beta\n- gamma\n";
        let doc = parse(src);

        let lists: Vec<&ContentBlock> = doc
            .blocks
            .iter()
            .filter(|b| b.kind == BlockKind::List)
            .collect();
        assert_eq!(lists.len(), 1);
        assert!(lists[0].content.contains("alpha"));
        assert!(lists[0].content.contains("gamma"));
    }

    #[test]
    fn thematic_break() {
        let src = "above\n\n***\n\nbelow\n";
        let doc = parse(src);

        let breaks = doc
            .blocks
            .iter()
            .filter(|b| b.kind == BlockKind::ThematicBreak)
            .count();
        assert_eq!(breaks, 1);
    }

    #[test]
    fn line_ranges_increase() {
        let src = "# A\n\nPara 1\n\n## B\n\nPara 2\n";
        let doc = parse(src);

        for window in doc.blocks.windows(2) {
            assert!(
                window[0].line_start <= window[1].line_start,
                "blocks should appear in source order"
            );
        }
    }

    #[test]
    fn mixed_document() {
        let src = "\
# Introduction

Welcome.

## Features

- Fast rendering
- Keyboard navigation

```bash
docview README.md
```

> Note: still in development.
";
        let doc = parse(src);

        assert_eq!(doc.headings.len(), 2);
        assert_eq!(doc.headings[0].text, "Introduction");
        assert_eq!(doc.headings[1].text, "Features");

        let kinds: Vec<&BlockKind> = doc.blocks.iter().map(|b| &b.kind).collect();
        assert!(kinds.contains(&&BlockKind::Heading(1)));
        assert!(kinds.contains(&&BlockKind::Heading(2)));
        assert!(kinds.contains(&&BlockKind::Paragraph));
        assert!(kinds.contains(&&BlockKind::List));
        assert!(kinds.contains(&&BlockKind::BlockQuote));
        assert!(kinds
            .iter()
            .any(|k| matches!(k, BlockKind::CodeBlock { .. })));
    }
}
