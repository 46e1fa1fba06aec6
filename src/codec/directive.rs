//! Compression directive grammar.
//!
//! ```text
//! directive := "" | "auto" | item ("," item)*
//! item      := "l=" ("low" | "mid" | "high")
//!            | "t=" digits
//!            | "m=" digits ["%" | "G" | "M" | "K"] ["B"]
//! ```
//!
//! An empty directive means `auto`.  Parsing is strict: anything left over
//! after the last item is an error, surfaced before any I/O begins.

use std::str::FromStr;
use thiserror::Error;

use super::Level;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("expected {expected} after {after}")]
    Expected { expected: &'static str, after: String },
    #[error("number {0} is out of range")]
    OutOfRange(String),
}

/// Memory budget as requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryHint {
    /// Percentage of currently available memory (capped at 100).
    Percent(u64),
    Bytes(u64),
}

/// Explicit settings; absent keys keep these defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Explicit {
    pub level:   Level,
    /// `0` means every available CPU.
    pub threads: u32,
    pub memory:  Option<MemoryHint>,
}

impl Default for Explicit {
    fn default() -> Self {
        Self { level: Level::Default, threads: 1, memory: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Auto,
    Explicit(Explicit),
}

impl Default for Directive {
    fn default() -> Self { Directive::Auto }
}

impl FromStr for Directive {
    type Err = DirectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn eat(&mut self, lit: &str) -> bool {
        if self.src[self.pos..].starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    fn digits(&mut self) -> Option<&'a str> {
        let src: &'a str = self.src;
        let rest = &src[self.pos..];
        let len = rest.bytes().take_while(u8::is_ascii_digit).count();
        (len > 0).then(|| {
            self.pos += len;
            &rest[..len]
        })
    }

    fn at_end(&self) -> bool { self.pos == self.src.len() }
}

fn expected(expected: &'static str, after: &str) -> DirectiveError {
    DirectiveError::Expected { expected, after: after.to_owned() }
}

fn number(c: &mut Cursor<'_>, after: &str) -> Result<u64, DirectiveError> {
    let digits = c.digits().ok_or_else(|| expected("number", after))?;
    digits.parse().map_err(|_| DirectiveError::OutOfRange(digits.to_owned()))
}

pub fn parse(s: &str) -> Result<Directive, DirectiveError> {
    if s.is_empty() || s == "auto" {
        return Ok(Directive::Auto);
    }

    let mut out = Explicit::default();
    let mut c = Cursor { src: s, pos: 0 };
    let mut after = "start of directive";
    loop {
        if c.eat("l") {
            if !c.eat("=") { return Err(expected("'='", "'l'")); }
            out.level = if c.eat("low") {
                Level::Fastest
            } else if c.eat("mid") {
                Level::Default
            } else if c.eat("high") {
                Level::Better
            } else {
                return Err(expected("'low', 'mid' or 'high'", "'l='"));
            };
            after = "level";
        } else if c.eat("t") {
            if !c.eat("=") { return Err(expected("'='", "'t'")); }
            let v = number(&mut c, "'t='")?;
            out.threads = u32::try_from(v).unwrap_or(u32::MAX);
            after = "thread count";
        } else if c.eat("m") {
            if !c.eat("=") { return Err(expected("'='", "'m'")); }
            let v = number(&mut c, "'m='")?;
            let scaled = |shift: u32| {
                v.checked_mul(1u64 << shift).ok_or_else(|| DirectiveError::OutOfRange(format!("{v}")))
            };
            out.memory = Some(if c.eat("%") {
                MemoryHint::Percent(v.min(100))
            } else if c.eat("G") {
                MemoryHint::Bytes(scaled(30)?)
            } else if c.eat("M") {
                MemoryHint::Bytes(scaled(20)?)
            } else if c.eat("K") {
                MemoryHint::Bytes(scaled(10)?)
            } else {
                MemoryHint::Bytes(v)
            });
            let _ = c.eat("B");
            after = "memory";
        } else {
            return Err(expected("'l', 't', 'm' or 'auto'", after));
        }

        if c.at_end() {
            return Ok(Directive::Explicit(out));
        }
        if !c.eat(",") {
            return Err(expected("','", after));
        }
        after = "','";
    }
}
