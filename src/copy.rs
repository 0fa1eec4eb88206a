//! Copy-to-clipboard button.
//!
//! A copy button lives inside a code block and writes the block's text to
//! the clipboard when pressed. Success shows transient feedback: the copy
//! icon swaps for a check icon and the button carries a `copied` marker
//! until a 2000 ms revert timer fires. A rejected write is silent — the
//! feedback branch never runs and the button stays idle.
//!
//! The clipboard itself is behind a trait so the state machine is testable
//! without a terminal; the production backend emits an OSC 52 escape
//! sequence, which works across SSH and most modern terminal emulators.

use std::fmt;
use std::io::{self, Write};

use crate::timer::{TimerId, Timers};

/// How long the copied feedback stays up before reverting.
pub const REVERT_DELAY_MS: u64 = 2000;

/// Failure to write to the clipboard (unsupported terminal, closed stdout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardError {
    pub message: String,
}

impl ClipboardError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clipboard write failed: {}", self.message)
    }
}

impl std::error::Error for ClipboardError {}

/// Destination for copied text.
pub trait Clipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

// ---------------------------------------------------------------------------
// OSC 52 backend
// ---------------------------------------------------------------------------

/// Clipboard backend that emits an OSC 52 sequence on stdout.
#[derive(Debug, Default)]
pub struct Osc52Clipboard;

impl Clipboard for Osc52Clipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        let payload = base64_encode(text.as_bytes());
        let mut stdout = io::stdout();
        stdout
            .write_all(format!("\x1b]52;c;{payload}\x07").as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(|e| ClipboardError::new(e.to_string()))
    }
}

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Standard base64 with padding (RFC 4648 §4), enough for OSC 52 payloads.
fn base64_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;

        out.push(BASE64_ALPHABET[(triple >> 18) as usize & 0x3f] as char);
        out.push(BASE64_ALPHABET[(triple >> 12) as usize & 0x3f] as char);
        out.push(if chunk.len() > 1 {
            BASE64_ALPHABET[(triple >> 6) as usize & 0x3f] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            BASE64_ALPHABET[triple as usize & 0x3f] as char
        } else {
            '='
        });
    }
    out
}

// ---------------------------------------------------------------------------
// Button state machine
// ---------------------------------------------------------------------------

/// A copy button: two states (idle, copied) and one timed transition back.
///
/// The revert is held as a named timer handle; pressing while already in
/// the copied state cancels the old handle and schedules a fresh 2000 ms
/// window, so the revert delivered is always the latest one.
#[derive(Debug)]
pub struct CopyButton {
    pub copied: bool,
    pub copy_icon_visible: bool,
    pub check_icon_visible: bool,
    revert_timer: Option<TimerId>,
}

impl CopyButton {
    pub fn new() -> Self {
        Self {
            copied: false,
            copy_icon_visible: true,
            check_icon_visible: false,
            revert_timer: None,
        }
    }

    /// Press the button: write `code` to the clipboard and, on success, show
    /// the copied feedback and schedule its revert.
    ///
    /// Returns `true` when feedback was shown. A rejected clipboard write
    /// leaves the button untouched and returns `false`.
    pub fn press<E>(
        &mut self,
        code: &str,
        clipboard: &mut dyn Clipboard,
        timers: &mut Timers<E>,
        revert_event: E,
    ) -> bool {
        if clipboard.write_text(code).is_err() {
            // Failed writes are not surfaced and leave no pending revert.
            return false;
        }

        self.copied = true;
        self.copy_icon_visible = false;
        self.check_icon_visible = true;

        if let Some(old) = self.revert_timer.take() {
            timers.cancel(old);
        }
        self.revert_timer = Some(timers.schedule(REVERT_DELAY_MS, revert_event));
        true
    }

    /// Handle the revert timer: restore the idle appearance.
    pub fn revert(&mut self) {
        self.copied = false;
        self.copy_icon_visible = true;
        self.check_icon_visible = false;
        self.revert_timer = None;
    }
}

impl Default for CopyButton {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
