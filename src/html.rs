//! HTML rendering module for serve mode.
//!
//! Converts a parsed [`Page`] to HTML using comrak with GFM extensions.
//! Each h2 section is rendered separately and wrapped in a
//! `<section class="docs-section">` with its id, so the served markup
//! carries the same structure the TUI behaviors work from: anchored
//! headings, copy-button code blocks, and the CLI demo window.
//!
//! The TUI parse/render path (`parse.rs`, `render.rs`) is not touched here.

use comrak::Options;

use crate::anchors::{ANCHOR_ARIA_LABEL, ANCHOR_GLYPH};
use crate::page::{Page, Section, SectionHeading};

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Build comrak render options with GFM extensions and secure defaults.
///
/// Raw HTML from input is stripped (`render.unsafe_ = false`, the default)
/// and replaced with `<!-- raw HTML omitted -->`.
fn make_options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.render.unsafe_ = false;
    options
}

fn render_markdown_fragment(markdown: &str) -> String {
    comrak::markdown_to_html(markdown, &make_options())
}

/// Minimal HTML entity escaping for text content and attribute values.
fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reassemble the markdown source of a block run. `first`/`last` are
/// 1-based inclusive line numbers into the full source. Heading lines
/// lose any trailing `{#id}` attribute, which comrak would otherwise
/// render literally.
fn slice_markdown(lines: &[&str], first: usize, last: usize) -> String {
    let mut out = String::new();
    for line in lines
        .iter()
        .take(last.min(lines.len()))
        .skip(first.saturating_sub(1))
    {
        out.push_str(strip_heading_attr(line));
        out.push('\n');
    }
    out
}

fn strip_heading_attr(line: &str) -> &str {
    if !line.trim_start().starts_with('#') {
        return line;
    }
    match line.rfind("{#") {
        Some(pos) if line[pos..].trim_end().ends_with('}') => line[..pos].trim_end(),
        _ => line,
    }
}

fn line_span(blocks: &[crate::parse::ContentBlock]) -> Option<(usize, usize)> {
    let first = blocks.first()?.line_start;
    let last = blocks.last()?.line_end;
    Some((first, last))
}

fn anchor_html(fragment_href: &str) -> String {
    format!(
        "<a class=\"anchor-link\" href=\"{}\" aria-label=\"{}\">{}</a>",
        html_escape(fragment_href),
        ANCHOR_ARIA_LABEL,
        ANCHOR_GLYPH
    )
}

/// Walk the rendered fragment left to right, matching each section heading
/// to its `<hN>` element in order: h3 headings get an `id` attribute (the
/// h2's id lives on the wrapping `<section>`), and any heading with an
/// anchor gets the anchor link appended before its closing tag.
fn inject_heading_markup(html: &str, headings: &[SectionHeading]) -> String {
    let mut result = String::new();
    let mut rest = html;
    for heading in headings {
        let open = format!("<h{}>", heading.level);
        let close = format!("</h{}>", heading.level);
        let Some(start) = rest.find(&open) else {
            continue;
        };
        result.push_str(&rest[..start]);
        match &heading.id {
            Some(id) if heading.level >= 3 => {
                result.push_str(&format!("<h{} id=\"{}\">", heading.level, html_escape(id)));
            }
            _ => result.push_str(&open),
        }
        rest = &rest[start + open.len()..];

        let end = rest.find(&close).unwrap_or(rest.len());
        result.push_str(&rest[..end]);
        if let Some(anchor) = &heading.anchor {
            result.push_str(&anchor_html(&anchor.href));
        }
        rest = &rest[end..];
    }
    result.push_str(rest);
    result
}

/// Rewrite `<pre><code>` blocks in the rendered fragment:
/// - `language-demo` fences become the CLI demo window, with the command
///   in a `data-text` attribute and an empty typed-text span. A directly
///   following `language-output` fence is pulled inside as the hidden
///   output panel.
/// - every other code block is wrapped in `.docs-code-block` with a copy
///   button carrying both icon spans.
fn decorate_code_blocks(html: &str) -> String {
    const PRE_OPEN: &str = "<pre><code";
    const PRE_CLOSE: &str = "</code></pre>";

    let mut result = String::new();
    let mut rest = html;
    while let Some(start) = rest.find(PRE_OPEN) {
        result.push_str(&rest[..start]);
        let block = &rest[start..];
        let Some(end) = block.find(PRE_CLOSE) else {
            result.push_str(block);
            return result;
        };
        let pre = &block[..end + PRE_CLOSE.len()];
        rest = &block[end + PRE_CLOSE.len()..];

        if pre.contains("class=\"language-demo\"") {
            let command = code_inner_text(pre).trim_end_matches('\n').to_owned();
            result.push_str(&format!(
                "<div class=\"docs-cli-window\" data-text=\"{}\">\n\
                 <div class=\"cli-line\"><span class=\"cli-prompt\">\u{276f}</span> \
                 <span class=\"cli-typed\"></span><span class=\"cli-cursor\">\u{258c}</span></div>\n",
                attr_escape(&command)
            ));
            // Pull an adjacent output fence inside the window.
            let after = rest.trim_start_matches('\n');
            if let Some(output_block) = after.strip_prefix(PRE_OPEN) {
                if output_block.starts_with(" class=\"language-output\"") {
                    if let Some(out_end) = after.find(PRE_CLOSE) {
                        let output_pre = &after[..out_end + PRE_CLOSE.len()];
                        result.push_str(&format!(
                            "<pre class=\"cli-output\">{}</pre>\n",
                            code_inner_text(output_pre).trim_end_matches('\n')
                        ));
                        rest = &after[out_end + PRE_CLOSE.len()..];
                    }
                }
            }
            result.push_str("</div>\n");
        } else if pre.contains("class=\"language-output\"") {
            // Orphan output fence: hidden panel without a window.
            result.push_str(&format!(
                "<pre class=\"cli-output\">{}</pre>\n",
                code_inner_text(pre).trim_end_matches('\n')
            ));
        } else {
            result.push_str(&format!(
                "<div class=\"docs-code-block\">\n\
                 <button class=\"copy-btn\" type=\"button\" aria-label=\"Copy code\">\
                 <span class=\"copy-icon\">\u{29c9}</span>\
                 <span class=\"check-icon\">\u{2713}</span></button>\n\
                 {pre}\n\
                 </div>\n"
            ));
        }
    }
    result.push_str(rest);
    result
}

/// Inner (already-escaped) text of a `<pre><code ...>...</code></pre>` slice.
fn code_inner_text(pre: &str) -> &str {
    let start = pre.find('>').map(|p| p + 1).unwrap_or(0);
    let start = pre[start..].find('>').map(|p| start + p + 1).unwrap_or(start);
    let end = pre.rfind("</code>").unwrap_or(pre.len());
    &pre[start..end.max(start)]
}

/// Escape an already-HTML-escaped string for use in a double-quoted attribute.
fn attr_escape(s: &str) -> String {
    s.replace('"', "&quot;").replace('\n', "&#10;")
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Render the page body: lead content followed by each section wrapped in
/// `<section class="docs-section" id="...">`, with heading anchors and
/// decorated code blocks.
pub fn render_page_html(source: &str, page: &Page) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = String::new();

    if let Some((first, last)) = line_span(&page.lead) {
        let fragment = render_markdown_fragment(&slice_markdown(&lines, first, last));
        out.push_str(&decorate_code_blocks(&fragment));
    }

    for section in &page.sections {
        out.push_str(&render_section_html(&lines, section));
    }

    eprintln!(
        "[render] sections={} anchors={}",
        page.sections.len(),
        page.sections
            .iter()
            .flat_map(|s| &s.headings)
            .filter(|h| h.anchor.is_some())
            .count()
    );

    out
}

fn render_section_html(lines: &[&str], section: &Section) -> String {
    let Some((first, last)) = line_span(&section.blocks) else {
        return String::new();
    };
    let fragment = render_markdown_fragment(&slice_markdown(lines, first, last));
    let fragment = inject_heading_markup(&fragment, &section.headings);
    let fragment = decorate_code_blocks(&fragment);

    match &section.id {
        Some(id) => format!(
            "<section class=\"docs-section\" id=\"{}\">\n{}</section>\n",
            html_escape(id),
            fragment
        ),
        None => format!("<section class=\"docs-section\">\n{fragment}</section>\n"),
    }
}

/// Build the full HTML page shell: reading progress bar, header with the
/// mobile nav toggle, off-canvas sidebar with the TOC list, overlay, and
/// the rendered content area.
pub fn build_page_shell(page: &Page, content_html: &str) -> String {
    let title_raw = page
        .title
        .as_deref()
        .or_else(|| page.sections.first().map(|s| s.title.as_str()))
        .unwrap_or("Documentation");
    let title = html_escape(title_raw);

    let description_meta = match &page.description {
        Some(desc) => format!(
            "<meta name=\"description\" content=\"{}\">\n",
            html_escape(desc)
        ),
        None => String::new(),
    };

    let mut toc_html = String::from("<ul class=\"docs-toc-list\">\n");
    for entry in page.toc() {
        toc_html.push_str(&format!(
            "<li><a href=\"#{}\">{}</a></li>\n",
            html_escape(&entry.fragment),
            html_escape(&entry.label)
        ));
    }
    toc_html.push_str("</ul>\n");

    format!(
        "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head>\n\
<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
<title>{title} · docview</title>\n\
{description_meta}\
<link rel=\"stylesheet\" href=\"/assets/docview.css\">\n\
</head>\n\
<body>\n\
<div class=\"reading-progress\"><div class=\"reading-progress-bar\"></div></div>\n\
<header class=\"docs-header\">\n\
<button class=\"docs-mobile-toc-toggle\" type=\"button\" aria-label=\"Open navigation\">\u{2630}</button>\n\
<span class=\"docs-title\">{title}</span>\n\
</header>\n\
<div class=\"docs-layout\">\n\
<aside class=\"docs-sidebar\">\n\
<button class=\"docs-sidebar-close\" type=\"button\" aria-label=\"Close navigation\">\u{00d7}</button>\n\
<nav aria-label=\"Sections\">\n\
{toc_html}</nav>\n\
</aside>\n\
<div class=\"docs-mobile-overlay\"></div>\n\
<main class=\"docs-content\">\n\
{content_html}</main>\n\
</div>\n\
</body>\n\
</html>\n"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
