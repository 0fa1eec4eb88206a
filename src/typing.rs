//! Typed-text animation for the CLI demo window.
//!
//! Reveals a fixed source string one character at a time once the window
//! first scrolls into view, then shows a sibling output panel. The cadence
//! is deliberately irregular: every inter-character delay is drawn fresh
//! from [50, 100) ms, which reads as human typing where a fixed interval
//! reads as a teletype.
//!
//! The visibility watch is one-shot — it detaches itself after the first
//! qualifying event, so scrolling the window out and back never restarts
//! the animation, and the cursor only ever moves forward.

use crate::timer::Timers;

/// Delay between the window entering view and the first character.
pub const START_DELAY_MS: u64 = 500;
/// Delay between the end of typing and the output panel reveal.
pub const REVEAL_DELAY_MS: u64 = 400;
/// Inclusive lower bound of the per-character delay.
pub const CHAR_DELAY_MIN_MS: u64 = 50;
/// Exclusive upper bound of the per-character delay.
pub const CHAR_DELAY_MAX_MS: u64 = 100;

/// Source of per-character delays, injected so tests are deterministic.
///
/// Implementations must return values in
/// [`CHAR_DELAY_MIN_MS`, `CHAR_DELAY_MAX_MS`).
pub trait DelaySource {
    fn next_char_delay_ms(&mut self) -> u64;
}

/// Production delay source: a seeded xorshift64 mapped into [50, 100).
#[derive(Debug, Clone)]
pub struct JitterDelay {
    state: u64,
}

impl JitterDelay {
    pub fn seeded(seed: u64) -> Self {
        Self {
            // xorshift64 requires a nonzero state.
            state: if seed == 0 { 0x9e3779b97f4a7c15 } else { seed },
        }
    }
}

impl DelaySource for JitterDelay {
    fn next_char_delay_ms(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        CHAR_DELAY_MIN_MS + x % (CHAR_DELAY_MAX_MS - CHAR_DELAY_MIN_MS)
    }
}

/// Animation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Typing,
    Done,
}

/// The typing state machine for one demo window.
#[derive(Debug)]
pub struct Typist {
    source: Vec<char>,
    typed: String,
    cursor: usize,
    phase: Phase,
    watch_armed: bool,
    pub output_revealed: bool,
}

impl Typist {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            typed: String::new(),
            cursor: 0,
            phase: Phase::NotStarted,
            watch_armed: true,
            output_revealed: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Text revealed so far.
    pub fn text(&self) -> &str {
        &self.typed
    }

    /// Whether the one-shot visibility watch is still attached.
    pub fn is_watching(&self) -> bool {
        self.watch_armed
    }

    /// The window became visible. The first time this is called it detaches
    /// the watch and schedules the first tick at +500 ms; afterwards it is a
    /// no-op. Returns whether the animation was started.
    pub fn on_visible<E>(&mut self, timers: &mut Timers<E>, tick_event: E) -> bool {
        if !self.watch_armed {
            return false;
        }
        self.watch_armed = false;
        self.phase = Phase::Typing;
        timers.schedule(START_DELAY_MS, tick_event);
        true
    }

    /// A tick fired: emit the next character and schedule the following
    /// tick, or — when the cursor has reached the end — finish and schedule
    /// the output reveal at +400 ms.
    pub fn on_tick<E>(
        &mut self,
        timers: &mut Timers<E>,
        tick_event: E,
        reveal_event: E,
        delays: &mut dyn DelaySource,
    ) -> Option<char> {
        if self.phase == Phase::Done {
            return None;
        }
        if self.cursor < self.source.len() {
            let c = self.source[self.cursor];
            self.typed.push(c);
            self.cursor += 1;
            timers.schedule(delays.next_char_delay_ms(), tick_event);
            Some(c)
        } else {
            self.phase = Phase::Done;
            timers.schedule(REVEAL_DELAY_MS, reveal_event);
            None
        }
    }

    /// The reveal timer fired: show the output panel.
    pub fn on_reveal(&mut self) {
        self.output_revealed = true;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
