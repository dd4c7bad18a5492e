//! Captured fault model
//!
//! A [`FaultRecord`] is an ordered chain of [`FaultLink`]s: the top-level
//! failure comes first and every following link is the cause of the one
//! before it. Records are immutable once captured.

use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;
use std::panic::PanicHookInfo;
use std::sync::OnceLock;

use regex::Regex;

/// A single resolved stack frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Demangled symbol, e.g. `my_app::window::draw`
    pub symbol: String,
    /// Source location (`file:line:col`) if debug info was available
    pub location: Option<String>,
}

impl StackFrame {
    /// Create a frame for `symbol` without location
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            location: None,
        }
    }

    /// Attach a source location
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Origin identity of this frame
    ///
    /// The symbol path with the trailing `::h<hash>` removed. For trait
    /// impl frames (`<my_app::Foo as core::ops::Drop>::drop`) the origin is
    /// the implementing type's path.
    pub fn origin(&self) -> &str {
        let symbol = strip_hash(&self.symbol);
        match symbol.strip_prefix('<') {
            Some(rest) => {
                let end = rest
                    .find(" as ")
                    .or_else(|| rest.find('>'))
                    .unwrap_or(rest.len());
                &rest[..end]
            }
            None => symbol,
        }
    }

    /// Whether this frame originates from the code identified by `id`
    ///
    /// Matches on whole path segments: `my_app::recovery` matches
    /// `my_app::recovery` and `my_app::recovery::show`, but never
    /// `my_app::recovery_stats`.
    pub fn originates_from(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        let origin = self.origin();
        origin == id
            || origin
                .strip_prefix(id)
                .is_some_and(|rest| rest.starts_with("::"))
    }
}

/// Remove a legacy-mangling hash suffix (`::h0123456789abcdef`)
fn strip_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::") {
        Some((path, last))
            if last.len() == 17
                && last.starts_with('h')
                && last[1..].chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            path
        }
        _ => symbol,
    }
}

/// One link of the caused-by chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultLink {
    /// What kind of failure this is (`panic`, `error`, ...)
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Where the failure was raised (`file:line:col`)
    pub origin: Option<String>,
    /// Stack frames, innermost first
    pub frames: Vec<StackFrame>,
}

impl FaultLink {
    /// Create a link with no origin and no frames
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            origin: None,
            frames: Vec::new(),
        }
    }

    /// Set the raising location
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Append a stack frame
    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Replace the stack frames
    pub fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }
}

/// A captured fault: a non-empty, totally ordered caused-by chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    links: Vec<FaultLink>,
}

impl FaultRecord {
    /// Create a record whose top-level failure is `top`
    pub fn new(top: FaultLink) -> Self {
        Self { links: vec![top] }
    }

    /// Append `cause` as the cause of the current deepest link
    pub fn caused_by(mut self, cause: FaultLink) -> Self {
        self.links.push(cause);
        self
    }

    /// Capture a panic together with its backtrace
    pub fn from_panic(info: &PanicHookInfo<'_>, backtrace: &Backtrace) -> Self {
        let payload = info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };

        let thread = std::thread::current();
        let kind = match thread.name() {
            Some(name) => format!("panic in thread '{}'", name),
            None => "panic".to_string(),
        };

        let mut link = FaultLink::new(kind, message)
            .with_frames(parse_backtrace(&backtrace.to_string()));
        if let Some(loc) = info.location() {
            link = link.with_origin(format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));
        }
        Self::new(link)
    }

    /// Capture an error and its `source()` chain
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let mut record = Self::new(FaultLink::new("error", err.to_string()));
        let mut source = err.source();
        while let Some(cause) = source {
            record = record.caused_by(FaultLink::new("error", cause.to_string()));
            source = cause.source();
        }
        record
    }

    /// All links, top-level failure first
    pub fn links(&self) -> &[FaultLink] {
        &self.links
    }

    /// The top-level failure
    pub fn top(&self) -> &FaultLink {
        &self.links[0]
    }

    /// The deepest cause
    pub fn root_cause(&self) -> &FaultLink {
        &self.links[self.links.len() - 1]
    }

    /// Every frame of every link, in chain order
    pub fn frames(&self) -> impl Iterator<Item = &StackFrame> {
        self.links.iter().flat_map(|link| link.frames.iter())
    }

    /// Render the human-readable fault text
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, link) in self.links.iter().enumerate() {
            if i > 0 {
                write!(f, "Caused by: ")?;
            }
            match link.origin {
                Some(ref origin) => writeln!(f, "{} at {}: {}", link.kind, origin, link.message)?,
                None => writeln!(f, "{}: {}", link.kind, link.message)?,
            }
            for frame in &link.frames {
                match frame.location {
                    Some(ref loc) => writeln!(f, "    at {} ({})", frame.symbol, loc)?,
                    None => writeln!(f, "    at {}", frame.symbol)?,
                }
            }
        }
        Ok(())
    }
}

// Compiled lazily; the crash path never panics on a bad pattern, it just
// yields no frames.
fn frame_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+:\s+(.+?)\s*$").ok())
        .as_ref()
}

fn location_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s+at\s+(.+?)\s*$").ok())
        .as_ref()
}

/// Parse the text form of a [`Backtrace`] into frames
///
/// Returns an empty list for disabled or unsupported backtraces.
pub fn parse_backtrace(text: &str) -> Vec<StackFrame> {
    let (Some(frame_re), Some(location_re)) = (frame_line(), location_line()) else {
        return Vec::new();
    };

    let mut frames: Vec<StackFrame> = Vec::new();
    for line in text.lines() {
        if let Some(caps) = location_re.captures(line) {
            if let Some(frame) = frames.last_mut() {
                if frame.location.is_none() {
                    frame.location = Some(caps[1].to_string());
                }
            }
        } else if let Some(caps) = frame_re.captures(line) {
            frames.push(StackFrame::new(&caps[1]));
        }
    }
    frames
}
