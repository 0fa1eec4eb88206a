mod anchors;
mod copy;
mod html;
mod page;
mod parse;
mod render;
mod serve;
mod sidebar;
mod spy;
mod timer;
mod typing;
mod web_assets;

use std::{
    fs, io,
    path::Path,
    process,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Clear, Paragraph},
    DefaultTerminal, Frame,
};

use copy::{CopyButton, Osc52Clipboard};
use page::{Page, TocEntry};
use render::RenderedPage;
use sidebar::Sidebar;
use spy::{ProgressBar, Scrollspy, SectionTarget, TocLink};
use timer::Timers;
use typing::{JitterDelay, Typist};

/// Logical pixels represented by one terminal column, used to map the
/// terminal width onto the mobile navigation breakpoint.
const PX_PER_COLUMN: f64 = 8.0;

/// Explicit subcommands.
#[derive(Subcommand)]
enum Commands {
    /// View a markdown docs page in TUI mode (equivalent to legacy positional form)
    View {
        /// Path to the markdown file
        file: String,
    },
    /// Serve a markdown docs page over HTTP
    Serve {
        /// Path to the markdown file
        file: String,
        /// Interface address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Starting port number for the HTTP server
        #[arg(long, default_value = "3333")]
        port: u16,
    },
}

/// Full CLI with explicit subcommands.
#[derive(Parser)]
#[command(
    name = "docview",
    version,
    about = "An interactive documentation page viewer for markdown",
    after_help = "INVOCATION FORMS:\n  docview <file>                      View file in TUI mode (legacy)\n  docview view <file>                 View file in TUI mode\n  docview serve [OPTIONS] <file>      Serve file over HTTP"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Legacy positional form: docview <file>
#[derive(Parser)]
#[command(
    name = "docview",
    version,
    about = "An interactive documentation page viewer for markdown"
)]
struct LegacyCli {
    /// Path to a markdown file to view
    file: String,
}

/// Resolved dispatch mode after CLI argument parsing.
enum DispatchMode {
    Legacy {
        file: String,
    },
    View {
        file: String,
    },
    Serve {
        file: String,
        bind: String,
        port: u16,
    },
}

fn resolve_dispatch_mode() -> DispatchMode {
    match Cli::try_parse() {
        Ok(cli) => match cli.command {
            Commands::View { file } => DispatchMode::View { file },
            Commands::Serve { file, bind, port } => DispatchMode::Serve { file, bind, port },
        },
        Err(clap_err) => {
            // Pass --help and --version through to the full Cli handler.
            use clap::error::ErrorKind;
            if matches!(
                clap_err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                clap_err.exit();
            }
            // Fall back to legacy positional parse: docview <file>
            match LegacyCli::try_parse() {
                Ok(legacy) => DispatchMode::Legacy { file: legacy.file },
                Err(legacy_err) => legacy_err.exit(),
            }
        }
    }
}

fn main() -> io::Result<()> {
    match resolve_dispatch_mode() {
        DispatchMode::Legacy { file } => {
            eprintln!("[legacy] TUI viewer dispatched for: {file}");
            run_tui_file(&file)
        }
        DispatchMode::View { file } => {
            eprintln!("[view] TUI viewer dispatched for: {file}");
            run_tui_file(&file)
        }
        DispatchMode::Serve { file, bind, port } => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(io::Error::other)?;
            rt.block_on(serve::run_serve(file, bind, port))
        }
    }
}

fn run_tui_file(file_arg: &str) -> io::Result<()> {
    let path = Path::new(file_arg);

    // Check the file extension before attempting to read.
    match path.extension().and_then(|e| e.to_str()) {
        Some("md" | "markdown" | "mdx" | "mdown" | "mkd" | "mkdn") => {}
        Some(ext) => {
            eprintln!("Error: '{ext}' is not a recognized markdown extension.");
            eprintln!("Expected a markdown file (.md, .markdown, .mdx, .mdown, .mkd, .mkdn).");
            process::exit(1);
        }
        None => {
            eprintln!("Error: '{file_arg}' has no file extension.");
            eprintln!("Expected a markdown file (.md, .markdown, .mdx, .mdown, .mkd, .mkdn).");
            process::exit(1);
        }
    }

    let source = fs::read_to_string(path).unwrap_or_else(|e| {
        match e.kind() {
            io::ErrorKind::NotFound => {
                eprintln!("Error: file not found: {file_arg}");
            }
            io::ErrorKind::PermissionDenied => {
                eprintln!("Error: permission denied: {file_arg}");
            }
            _ => {
                eprintln!("Error reading '{file_arg}': {e}");
            }
        }
        process::exit(1);
    });

    let doc = parse::parse(&source);
    let mut page = Page::from_document(&doc);
    let anchored = anchors::inject_anchors(&mut page.sections);
    eprintln!(
        "[page] sections={} anchors={} demo={}",
        page.sections.len(),
        anchored,
        page.demo.is_some()
    );

    ratatui::run(|terminal| run(terminal, page))
}

// ---------------------------------------------------------------------------
// TUI application
// ---------------------------------------------------------------------------

/// Deferred work delivered by the timer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheduled {
    /// Revert one copy button's feedback back to idle.
    CopyRevert(usize),
    /// Type the next character of the demo command.
    TypingTick,
    /// Show the demo output panel.
    TypingReveal,
}

struct App {
    page: Page,
    toc: Vec<TocEntry>,
    rendered: RenderedPage,
    scroll: usize,
    progress: ProgressBar,
    scrollspy: Scrollspy,
    sidebar: Sidebar,
    /// Index into `toc` of the highlighted entry while the sidebar is open.
    sidebar_selected: usize,
    copy_buttons: Vec<CopyButton>,
    clipboard: Osc52Clipboard,
    typist: Option<Typist>,
    timers: Timers<Scheduled>,
    delays: JitterDelay,
}

impl App {
    fn new(page: Page) -> Self {
        let typist = page.demo.as_ref().map(|demo| Typist::new(&demo.command));
        let rendered = render::render_page(&page, typist.as_ref());
        let toc = page.toc();
        let links = toc
            .iter()
            .map(|entry| TocLink::new(entry.fragment.clone()))
            .collect();
        let scrollspy = Scrollspy::new(section_targets(&rendered), links);
        let copy_buttons = rendered.code_blocks.iter().map(|_| CopyButton::new()).collect();
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);

        Self {
            page,
            toc,
            rendered,
            scroll: 0,
            progress: ProgressBar::default(),
            scrollspy,
            sidebar: Sidebar::new(),
            sidebar_selected: 0,
            copy_buttons,
            clipboard: Osc52Clipboard,
            typist,
            timers: Timers::new(),
            delays: JitterDelay::seeded(seed),
        }
    }

    fn total_lines(&self) -> usize {
        self.rendered.text.lines.len()
    }

    fn max_scroll(&self, viewport_height: usize) -> usize {
        self.total_lines().saturating_sub(viewport_height)
    }

    /// Deliver due timer events and re-render when the demo window changed.
    fn tick(&mut self, elapsed_ms: u64) {
        let mut demo_changed = false;
        for scheduled in self.timers.advance(elapsed_ms) {
            match scheduled {
                Scheduled::CopyRevert(index) => {
                    if let Some(button) = self.copy_buttons.get_mut(index) {
                        button.revert();
                    }
                }
                Scheduled::TypingTick => {
                    if let Some(typist) = self.typist.as_mut() {
                        typist.on_tick(
                            &mut self.timers,
                            Scheduled::TypingTick,
                            Scheduled::TypingReveal,
                            &mut self.delays,
                        );
                        demo_changed = true;
                    }
                }
                Scheduled::TypingReveal => {
                    if let Some(typist) = self.typist.as_mut() {
                        typist.on_reveal();
                        demo_changed = true;
                    }
                }
            }
        }
        if demo_changed {
            self.rerender();
        }
    }

    fn rerender(&mut self) {
        self.rendered = render::render_page(&self.page, self.typist.as_ref());
        self.scrollspy.set_sections(section_targets(&self.rendered));
    }

    /// Re-run the scroll-derived state: clamp, progress, section spy, and
    /// the demo visibility watch.
    fn sync_scroll(&mut self, viewport_height: usize) {
        self.scroll = self.scroll.min(self.max_scroll(viewport_height));
        self.progress.update(
            self.scroll as f64,
            self.total_lines() as f64,
            viewport_height as f64,
        );
        self.scrollspy
            .on_scroll(self.scroll as f64, viewport_height as f64);

        if let (Some(typist), Some(demo)) = (self.typist.as_mut(), self.rendered.demo) {
            let visible = demo.start < self.scroll + viewport_height && demo.end > self.scroll;
            if visible {
                typist.on_visible(&mut self.timers, Scheduled::TypingTick);
            }
        }
    }

    /// Handle a key press. Returns `true` when the app should quit.
    fn handle_key(
        &mut self,
        code: KeyCode,
        modifiers: KeyModifiers,
        viewport_width: u16,
        viewport_height: usize,
    ) -> bool {
        if self.sidebar.is_open {
            self.handle_sidebar_key(code, viewport_width, viewport_height);
            return false;
        }

        let max_scroll = self.max_scroll(viewport_height);
        match code {
            KeyCode::Char('q') => return true,

            // Open the navigation sidebar.
            KeyCode::Char('t') => {
                self.sidebar.open();
                self.sidebar_selected = self.nearest_toc_entry();
            }

            // Copy the topmost visible code block.
            KeyCode::Char('c') => {
                self.copy_visible_block(viewport_height);
            }

            KeyCode::Char('j') | KeyCode::Down if !self.sidebar.scroll_locked() => {
                self.scroll = (self.scroll + 1).min(max_scroll);
            }
            KeyCode::Char('k') | KeyCode::Up if !self.sidebar.scroll_locked() => {
                self.scroll = self.scroll.saturating_sub(1);
            }
            KeyCode::Char('d') if modifiers.contains(KeyModifiers::CONTROL) => {
                if !self.sidebar.scroll_locked() {
                    self.scroll = (self.scroll + viewport_height / 2).min(max_scroll);
                }
            }
            KeyCode::PageDown if !self.sidebar.scroll_locked() => {
                self.scroll = (self.scroll + viewport_height / 2).min(max_scroll);
            }
            KeyCode::Char('u') if modifiers.contains(KeyModifiers::CONTROL) => {
                if !self.sidebar.scroll_locked() {
                    self.scroll = self.scroll.saturating_sub(viewport_height / 2);
                }
            }
            KeyCode::PageUp if !self.sidebar.scroll_locked() => {
                self.scroll = self.scroll.saturating_sub(viewport_height / 2);
            }
            KeyCode::Char('g') | KeyCode::Home if !self.sidebar.scroll_locked() => {
                self.scroll = 0;
            }
            KeyCode::Char('G') | KeyCode::End if !self.sidebar.scroll_locked() => {
                self.scroll = max_scroll;
            }

            _ => {}
        }
        false
    }

    fn handle_sidebar_key(
        &mut self,
        code: KeyCode,
        viewport_width: u16,
        viewport_height: usize,
    ) {
        match code {
            KeyCode::Esc => {
                self.sidebar.handle_escape();
            }
            KeyCode::Char('t') | KeyCode::Char('q') => {
                self.sidebar.close();
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if !self.toc.is_empty() {
                    self.sidebar_selected = (self.sidebar_selected + 1).min(self.toc.len() - 1);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.sidebar_selected = self.sidebar_selected.saturating_sub(1);
            }
            KeyCode::Enter => {
                if let Some(entry) = self.toc.get(self.sidebar_selected) {
                    let fragment = entry.fragment.clone();
                    self.jump_to_fragment(&fragment, viewport_height);
                    // A nav link was followed: on a narrow viewport the
                    // sidebar closes, on a wide one it stays open.
                    self.sidebar
                        .handle_nav_link_click(f64::from(viewport_width) * PX_PER_COLUMN);
                }
            }
            _ => {}
        }
    }

    fn jump_to_fragment(&mut self, fragment: &str, viewport_height: usize) {
        let target = self
            .rendered
            .sections
            .iter()
            .find(|s| s.id.as_deref() == Some(fragment));
        if let Some(span) = target {
            self.scroll = span.start.min(self.max_scroll(viewport_height));
        }
    }

    /// The TOC entry for the section closest above the current scroll.
    fn nearest_toc_entry(&self) -> usize {
        let current = self
            .rendered
            .sections
            .iter()
            .rev()
            .find(|s| s.start <= self.scroll)
            .and_then(|s| s.id.as_deref());
        match current {
            Some(id) => self
                .toc
                .iter()
                .position(|entry| entry.fragment == id)
                .unwrap_or(0),
            None => 0,
        }
    }

    fn copy_visible_block(&mut self, viewport_height: usize) {
        let visible = self
            .rendered
            .code_blocks
            .iter()
            .position(|b| b.end > self.scroll && b.start < self.scroll + viewport_height);
        if let Some(index) = visible {
            let text = self.rendered.code_blocks[index].text.clone();
            if let Some(button) = self.copy_buttons.get_mut(index) {
                button.press(
                    &text,
                    &mut self.clipboard,
                    &mut self.timers,
                    Scheduled::CopyRevert(index),
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    fn ui(&self, frame: &mut Frame) {
        let area = frame.area();

        const MIN_WIDTH: u16 = 20;
        const MIN_HEIGHT: u16 = 5;
        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            let msg = "Terminal too small";
            let msg_len = msg.len() as u16;
            let x = area.x + area.width.saturating_sub(msg_len) / 2;
            let y = area.y + area.height / 2;
            let w = msg_len.min(area.width);
            if w > 0 && area.height > 0 {
                frame.render_widget(
                    Paragraph::new(Span::styled(
                        msg,
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    )),
                    Rect::new(x, y, w, 1),
                );
            }
            return;
        }

        let chunks = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

        self.draw_progress(frame, chunks[0]);

        let content = Paragraph::new(self.rendered.text.clone()).scroll((self.scroll as u16, 0));
        frame.render_widget(content, chunks[1]);

        if self.sidebar.is_open {
            self.draw_sidebar(frame, chunks[1]);
        }

        self.draw_status(frame, chunks[2], chunks[1].height as usize);
    }

    fn draw_progress(&self, frame: &mut Frame, area: Rect) {
        let width = area.width as usize;
        let filled = ((self.progress.width_percent / 100.0) * width as f64).round() as usize;
        let filled = filled.min(width);
        let line = Line::from(vec![
            Span::styled(
                "\u{2501}".repeat(filled),
                Style::default().fg(Color::Cyan),
            ),
            Span::styled(
                "\u{2501}".repeat(width - filled),
                Style::default().fg(Color::DarkGray),
            ),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_sidebar(&self, frame: &mut Frame, viewport_area: Rect) {
        let width = viewport_area.width.min(32);
        let panel = Rect::new(
            viewport_area.x,
            viewport_area.y,
            width,
            viewport_area.height,
        );
        frame.render_widget(Clear, panel);

        let active = self.scrollspy.active_fragment();
        let lines: Vec<Line<'static>> = self
            .toc
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let is_active = active == Some(entry.fragment.as_str());
                let is_selected = i == self.sidebar_selected;
                let marker = if is_active { "\u{258e}" } else { " " };
                let mut style = if is_active {
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Gray)
                };
                if is_selected {
                    style = style.bg(Color::Blue).fg(Color::White);
                }
                Line::from(Span::styled(format!("{marker} {}", entry.label), style))
            })
            .collect();

        let block = Block::bordered()
            .title(" Contents ")
            .style(Style::default().fg(Color::White));
        frame.render_widget(Paragraph::new(lines).block(block), panel);
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect, viewport_height: usize) {
        let total = self.total_lines();
        let position = if total == 0 {
            "Empty".to_owned()
        } else if total <= viewport_height {
            "All".to_owned()
        } else {
            format!("{:.0}%", self.progress.width_percent)
        };

        let section_ctx = self
            .scrollspy
            .active_fragment()
            .and_then(|fragment| self.toc.iter().find(|e| e.fragment == fragment))
            .map(|entry| format!(" \u{00a7} {}", entry.label))
            .unwrap_or_default();

        let copied = if self.copy_buttons.iter().any(|b| b.copied) {
            "  \u{2713} copied"
        } else {
            ""
        };

        let hint = if self.sidebar.is_open {
            "  t/Esc close \u{00b7} Enter jump"
        } else {
            "  t contents \u{00b7} c copy \u{00b7} q quit"
        };

        let status = format!(" {position}{section_ctx}{copied}{hint}");
        let status_bar = Paragraph::new(Span::styled(
            status,
            Style::default().fg(Color::Black).bg(Color::White),
        ))
        .style(Style::default().bg(Color::White));
        frame.render_widget(status_bar, area);
    }
}

fn section_targets(rendered: &RenderedPage) -> Vec<SectionTarget> {
    rendered
        .sections
        .iter()
        .filter_map(|span| {
            span.id.as_ref().map(|id| SectionTarget {
                id: id.clone(),
                top: span.start as f64,
                bottom: span.end as f64,
            })
        })
        .collect()
}

fn run(terminal: &mut DefaultTerminal, page: Page) -> io::Result<()> {
    let mut app = App::new(page);
    let mut last_tick = Instant::now();

    loop {
        let size = terminal.size()?;
        // One line each for the progress bar and the status bar.
        let viewport_height = size.height.saturating_sub(2) as usize;

        app.sync_scroll(viewport_height);

        terminal.draw(|frame| app.ui(frame))?;

        // Sleep until the next timer is due, or idle-poll for input.
        let timeout = app
            .timers
            .next_due_in_ms()
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(250));
        let has_input = event::poll(timeout)?;

        let elapsed = last_tick.elapsed().as_millis() as u64;
        last_tick = Instant::now();
        app.tick(elapsed);

        if has_input {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && app.handle_key(key.code, key.modifiers, size.width, viewport_height)
                {
                    return Ok(());
                }
            }
        }
    }
}
