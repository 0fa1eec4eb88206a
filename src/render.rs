//! Markdown rendering module.
//!
//! Converts a [`Page`] into styled ratatui [`Text`] for display in the
//! terminal viewport, and records the geometry the interactive behaviors
//! need: each section's rendered line range (for the section spy), each
//! code block's range and text (for the copy button), and the demo
//! window's position (for the typing animation's visibility watch).
//!
//! Fenced code with a recognized language is highlighted through syntect;
//! everything else falls back to a flat style.

use std::sync::OnceLock;

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};
use syntect::{
    easy::HighlightLines,
    highlighting::{Theme, ThemeSet},
    parsing::SyntaxSet,
};

use crate::page::{Page, Section};
use crate::parse::{BlockKind, ContentBlock};
use crate::typing::{Phase, Typist};

/// Rendered line range of one section, half-open `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSpan {
    pub id: Option<String>,
    pub start: usize,
    pub end: usize,
}

/// Rendered line range of one copyable code block, with its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Rendered line range of the CLI demo window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoSpan {
    pub start: usize,
    pub end: usize,
}

/// The fully rendered page plus behavior geometry.
#[derive(Debug)]
pub struct RenderedPage {
    pub text: Text<'static>,
    pub sections: Vec<SectionSpan>,
    pub code_blocks: Vec<CodeBlockSpan>,
    pub demo: Option<DemoSpan>,
}

/// Render the page. When a [`Typist`] is supplied, the demo window shows
/// its typed prefix and the output panel only once revealed; without one
/// the demo renders as a plain code block.
pub fn render_page(page: &Page, typist: Option<&Typist>) -> RenderedPage {
    let mut out = Output::default();

    for (i, block) in page.lead.iter().enumerate() {
        if i > 0 {
            out.blank();
        }
        out.block(block, typist);
    }

    for section in &page.sections {
        if !out.lines.is_empty() {
            out.blank();
        }
        let start = out.lines.len();
        render_section(section, typist, &mut out);
        out.sections.push(SectionSpan {
            id: section.id.clone(),
            start,
            end: out.lines.len(),
        });
    }

    RenderedPage {
        text: Text::from(out.lines),
        sections: out.sections,
        code_blocks: out.code_blocks,
        demo: out.demo,
    }
}

#[derive(Default)]
struct Output {
    lines: Vec<Line<'static>>,
    sections: Vec<SectionSpan>,
    code_blocks: Vec<CodeBlockSpan>,
    demo: Option<DemoSpan>,
}

impl Output {
    fn blank(&mut self) {
        self.lines.push(Line::default());
    }

    fn block(&mut self, block: &ContentBlock, typist: Option<&Typist>) {
        match &block.kind {
            BlockKind::Heading(level) => render_heading(*level, &block.content, &mut self.lines),
            BlockKind::Paragraph => render_paragraph(&block.content, &mut self.lines),
            BlockKind::CodeBlock { info } => self.code_block(block, info.as_deref(), typist),
            BlockKind::List => render_list(&block.content, &mut self.lines),
            BlockKind::BlockQuote => render_block_quote(&block.content, &mut self.lines),
            BlockKind::ThematicBreak => render_thematic_break(&mut self.lines),
            BlockKind::HtmlBlock => render_paragraph(&block.content, &mut self.lines),
            BlockKind::Table => render_table(&block.content, &mut self.lines),
        }
    }

    fn code_block(&mut self, block: &ContentBlock, info: Option<&str>, typist: Option<&Typist>) {
        match info {
            Some("demo") => {
                let start = self.lines.len();
                render_demo_window(typist, &block.content, &mut self.lines);
                self.demo = Some(DemoSpan {
                    start,
                    end: self.lines.len(),
                });
            }
            Some("output") => {
                // The output panel stays hidden until the typist reveals it.
                let revealed = typist.map_or(true, |t| t.output_revealed);
                if revealed {
                    let start = self.lines.len();
                    for text_line in block.content.lines() {
                        self.lines.push(Line::from(Span::styled(
                            format!("  {text_line}"),
                            Style::default().fg(Color::DarkGray),
                        )));
                    }
                    if let Some(demo) = &mut self.demo {
                        if demo.end == start {
                            demo.end = self.lines.len();
                        }
                    }
                }
            }
            _ => {
                let start = self.lines.len();
                render_code_block(&block.content, info, &mut self.lines);
                self.code_blocks.push(CodeBlockSpan {
                    text: block.content.clone(),
                    start,
                    end: self.lines.len(),
                });
            }
        }
    }
}

fn render_section(section: &Section, typist: Option<&Typist>, out: &mut Output) {
    for (i, block) in section.blocks.iter().enumerate() {
        if i > 0 {
            out.blank();
        }
        if let BlockKind::Heading(level) = &block.kind {
            // Heading lines carry their anchor fragment when one was
            // injected, rendered as a dim trailing span.
            let anchor = section
                .headings
                .iter()
                .find(|h| h.line == block.line_start)
                .and_then(|h| h.anchor.as_ref());
            render_anchored_heading(*level, &block.content, anchor.map(|a| a.href.as_str()), out);
        } else {
            out.block(block, typist);
        }
    }
}

fn heading_style(level: u8) -> Style {
    let base = Style::default().add_modifier(Modifier::BOLD);
    match level {
        1 => base.fg(Color::Magenta),
        2 => base.fg(Color::Cyan),
        3 => base.fg(Color::Green),
        4 => base.fg(Color::Yellow),
        _ => base.fg(Color::White),
    }
}

fn heading_prefix(level: u8) -> &'static str {
    match level {
        1 => "# ",
        2 => "## ",
        3 => "### ",
        4 => "#### ",
        5 => "##### ",
        6 => "###### ",
        _ => "# ",
    }
}

fn render_heading(level: u8, content: &str, lines: &mut Vec<Line<'static>>) {
    let style = heading_style(level);
    let prefix = heading_prefix(level);
    for text_line in content.lines() {
        lines.push(Line::from(Span::styled(
            format!("{prefix}{text_line}"),
            style,
        )));
    }
}

fn render_anchored_heading(level: u8, content: &str, anchor: Option<&str>, out: &mut Output) {
    let style = heading_style(level);
    let prefix = heading_prefix(level);
    let mut first = true;
    for text_line in content.lines() {
        let mut spans = vec![Span::styled(format!("{prefix}{text_line}"), style)];
        if first {
            if let Some(href) = anchor {
                spans.push(Span::styled(
                    format!(" {href}"),
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                ));
            }
            first = false;
        }
        out.lines.push(Line::from(spans));
    }
}

fn render_paragraph(content: &str, lines: &mut Vec<Line<'static>>) {
    for text_line in content.lines() {
        lines.push(Line::from(Span::raw(text_line.to_owned())));
    }
}

fn render_list(content: &str, lines: &mut Vec<Line<'static>>) {
    for text_line in content.lines() {
        lines.push(Line::from(Span::raw(format!("  \u{2022} {text_line}"))));
    }
}

fn render_block_quote(content: &str, lines: &mut Vec<Line<'static>>) {
    let style = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::ITALIC);
    for text_line in content.lines() {
        lines.push(Line::from(Span::styled(
            format!("\u{258e} {text_line}"),
            style,
        )));
    }
}

fn render_thematic_break(lines: &mut Vec<Line<'static>>) {
    lines.push(Line::from(Span::styled(
        "\u{2500}".repeat(40),
        Style::default().fg(Color::DarkGray),
    )));
}

fn render_table(content: &str, lines: &mut Vec<Line<'static>>) {
    for text_line in content.lines() {
        lines.push(Line::from(Span::raw(format!("  {text_line}"))));
    }
}

// ---------------------------------------------------------------------------
// Code highlighting
// ---------------------------------------------------------------------------

fn highlighter() -> &'static (SyntaxSet, Theme) {
    static SETS: OnceLock<(SyntaxSet, Theme)> = OnceLock::new();
    SETS.get_or_init(|| {
        let syntaxes = SyntaxSet::load_defaults_newlines();
        let mut themes = ThemeSet::load_defaults();
        let theme = themes
            .themes
            .remove("base16-ocean.dark")
            .unwrap_or_default();
        (syntaxes, theme)
    })
}

fn render_code_block(content: &str, info: Option<&str>, lines: &mut Vec<Line<'static>>) {
    let (syntaxes, theme) = highlighter();
    let syntax = info.and_then(|token| syntaxes.find_syntax_by_token(token));

    match syntax {
        Some(syntax) => {
            let mut hl = HighlightLines::new(syntax, theme);
            for text_line in content.lines() {
                let spans: Vec<Span<'static>> = match hl.highlight_line(text_line, syntaxes) {
                    Ok(regions) => regions
                        .into_iter()
                        .map(|(style, fragment)| {
                            let fg = style.foreground;
                            Span::styled(
                                fragment.to_owned(),
                                Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b)),
                            )
                        })
                        .collect(),
                    Err(_) => vec![Span::styled(
                        text_line.to_owned(),
                        Style::default().fg(Color::Yellow),
                    )],
                };
                let mut indented = vec![Span::raw("  ")];
                indented.extend(spans);
                lines.push(Line::from(indented));
            }
        }
        None => {
            let style = Style::default().fg(Color::Yellow);
            for text_line in content.lines() {
                lines.push(Line::from(Span::styled(format!("  {text_line}"), style)));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Demo window
// ---------------------------------------------------------------------------

fn render_demo_window(typist: Option<&Typist>, source: &str, lines: &mut Vec<Line<'static>>) {
    let prompt = Span::styled(
        "\u{276f} ",
        Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD),
    );
    match typist {
        Some(typist) => {
            let mut spans = vec![prompt, Span::raw(typist.text().to_owned())];
            if typist.phase() == Phase::Typing {
                spans.push(Span::styled(
                    "\u{258c}",
                    Style::default().fg(Color::White),
                ));
            }
            lines.push(Line::from(spans));
        }
        None => {
            lines.push(Line::from(vec![
                prompt,
                Span::raw(source.trim_end_matches('\n').to_owned()),
            ]));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;
    use crate::parse;
    use crate::timer::Timers;

    fn page(src: &str) -> Page {
        Page::from_document(&parse::parse(src))
    }

    fn line_text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn section_spans_cover_rendered_lines() {
        let p = page("## One\n\ntext\n\n## Two\n\nmore text\n");
        let rendered = render_page(&p, None);

        assert_eq!(rendered.sections.len(), 2);
        let s0 = &rendered.sections[0];
        let s1 = &rendered.sections[1];
        assert_eq!(s0.id.as_deref(), Some("one"));
        assert!(s0.start < s0.end);
        assert!(s0.end <= s1.start);
        assert!(s1.end <= rendered.text.lines.len());
    }

    #[test]
    fn code_blocks_recorded_with_text() {
        let p = page("## Code\n\n```python\nprint(1)\n```\n");
        let rendered = render_page(&p, None);

        assert_eq!(rendered.code_blocks.len(), 1);
        assert_eq!(rendered.code_blocks[0].text, "print(1)\n");
        assert!(rendered.code_blocks[0].start < rendered.code_blocks[0].end);
    }

    #[test]
    fn demo_window_shows_typed_prefix_only() {
        let p = page("## Try\n\n```demo\ndocview build\n```\n\n```output\ndone\n```\n");
        let mut typist = Typist::new("docview build");
        let mut timers: Timers<u8> = Timers::new();
        typist.on_visible(&mut timers, 0);

        let rendered = render_page(&p, Some(&typist));
        let demo = rendered.demo.expect("demo span");
        let line = line_text(&rendered.text.lines[demo.start]);
        // Nothing typed yet: prompt and cursor only.
        assert!(!line.contains("docview"));
        // Hidden output panel is not rendered at all.
        let all: String = rendered.text.lines.iter().map(line_text).collect();
        assert!(!all.contains("done"));
    }

    #[test]
    fn revealed_output_is_rendered() {
        let p = page("```demo\nx\n```\n\n```output\ndone\n```\n");
        let mut typist = Typist::new("x");
        typist.on_reveal();

        let rendered = render_page(&p, Some(&typist));
        let all: String = rendered.text.lines.iter().map(line_text).collect();
        assert!(all.contains("done"));
    }

    #[test]
    fn without_typist_demo_renders_full_command() {
        let p = page("```demo\ndocview build\n```\n");
        let rendered = render_page(&p, None);
        let demo = rendered.demo.expect("demo span");
        assert!(line_text(&rendered.text.lines[demo.start]).contains("docview build"));
    }

    #[test]
    fn demo_and_output_fences_are_not_copy_targets() {
        let p = page("```demo\nx\n```\n\n```output\ny\n```\n\n```bash\nls\n```\n");
        let rendered = render_page(&p, None);
        assert_eq!(rendered.code_blocks.len(), 1);
        assert_eq!(rendered.code_blocks[0].text, "ls\n");
    }

    #[test]
    fn anchored_heading_carries_fragment_hint() {
        let mut p = page("## Install\n\n### Steps\n");
        crate::anchors::inject_anchors(&mut p.sections);
        let rendered = render_page(&p, None);

        let all: String = rendered
            .text
            .lines
            .iter()
            .map(|l| line_text(l) + "\n")
            .collect();
        assert!(all.contains("#install"));
    }
}
