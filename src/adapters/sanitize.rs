//! Log sanitization for tracing material.
//!
//! Seeds are the only secret a device holds; identifiers and observation
//! hashes are linkable once logged next to timestamps. This writer redacts,
//! before anything reaches the log sink:
//! - hex blobs of identifier length or longer (EphIDs, seeds, hashes)
//! - report authorization tokens and bearer/JWT tokens
//! - `seed=...` style key-value pairs in any encoding
//!
//! Prefer not logging such values at all; the domain types already redact
//! themselves in `Debug`. This is the fallback for formatted strings.
//!
//! Each formatted event is buffered whole, up to a byte budget
//! (`EPITRACE_SANITIZE_MAX_BYTES`, read once), and redacted when the
//! event's writer is dropped.

use std::io::{self, Write};
use std::sync::OnceLock;

use regex::{Regex, RegexSet};
use tracing_subscriber::fmt::MakeWriter;

/// Default per-event byte budget (16 KiB).
const DEFAULT_EVENT_LIMIT: usize = 16 * 1024;

const LIMIT_ENV: &str = "EPITRACE_SANITIZE_MAX_BYTES";

/// Emitted instead of the event when the rules failed to compile.
const UNSANITIZABLE: &str = "[REDACTED-UNSANITIZABLE]";

const RULES: &[(&str, &str)] = &[
    // JSON authorization field of a report submission
    (
        r#"(?i)"authorization"\s*:\s*"[^"]*""#,
        r#""authorization":"[REDACTED-TOKEN]""#,
    ),
    // Bearer tokens
    (r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]{8,}", "Bearer [REDACTED-TOKEN]"),
    // Key-value secrets, any encoding
    (
        r"(?i)\b(?:seed|secret|authorization|auth[_-]?code|token)\b\s*[:=]\s*[A-Za-z0-9+/_-]{8,}={0,2}",
        "[REDACTED-SECRET]",
    ),
    // Identifier/seed/hash-length hex blobs
    (r"\b[0-9a-fA-F]{32,}\b", "[REDACTED-HEX]"),
];

/// Compiled redaction rules.
struct Redactor {
    set: RegexSet,
    rules: Vec<(Regex, &'static str)>,
}

impl Redactor {
    fn compile() -> Option<Self> {
        let set = RegexSet::new(RULES.iter().map(|(pattern, _)| *pattern)).ok()?;
        let rules = RULES
            .iter()
            .map(|&(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
            .collect::<Option<Vec<_>>>()?;
        Some(Self { set, rules })
    }

    /// Apply the rules that matched `text`, in declaration order.
    fn redact(&self, text: &str) -> String {
        self.set
            .matches(text)
            .into_iter()
            .fold(text.to_string(), |acc, idx| {
                let (regex, replacement) = &self.rules[idx];
                regex.replace_all(&acc, *replacement).into_owned()
            })
    }
}

fn redactor() -> Option<&'static Redactor> {
    static REDACTOR: OnceLock<Option<Redactor>> = OnceLock::new();
    REDACTOR.get_or_init(Redactor::compile).as_ref()
}

fn event_limit() -> usize {
    static LIMIT: OnceLock<usize> = OnceLock::new();
    *LIMIT.get_or_init(|| {
        std::env::var(LIMIT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_EVENT_LIMIT)
    })
}

/// Longest prefix of `input` that fits `max_bytes` without splitting a char.
fn clip(input: &str, max_bytes: usize) -> (&str, bool) {
    match input
        .char_indices()
        .find(|&(at, ch)| at + ch.len_utf8() > max_bytes)
    {
        Some((cut, _)) => (&input[..cut], true),
        None => (input, false),
    }
}

/// Redact tracing material from `input`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_within(input, event_limit())
}

fn sanitize_within(input: &str, max_bytes: usize) -> String {
    let (kept, clipped) = clip(input, max_bytes);
    let mut out = redactor().map_or_else(|| UNSANITIZABLE.to_string(), |r| r.redact(kept));
    if clipped {
        out.push_str(" [TRUNCATED]");
    }
    out
}

/// Check whether `input` contains anything [`sanitize`] would redact.
#[must_use]
pub fn contains_sensitive(input: &str) -> bool {
    let (kept, _) = clip(input, event_limit());
    redactor().map_or(true, |r| r.set.is_match(kept))
}

/// `MakeWriter` that hands every event a [`SanitizingWriter`].
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
    limit: usize,
}

impl<M> SanitizingMakeWriter<M> {
    /// Wrap `inner` with the configured per-event budget.
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self::with_limit(inner, event_limit())
    }

    #[must_use]
    pub fn with_limit(inner: M, limit: usize) -> Self {
        Self {
            inner,
            limit: limit.max(1),
        }
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter::new(self.inner.make_writer(), self.limit)
    }
}

/// Buffers one event and writes it redacted on flush or drop.
///
/// Bytes past the budget are discarded and the event is marked truncated.
pub struct SanitizingWriter<W: Write> {
    inner: W,
    event: Vec<u8>,
    limit: usize,
    overflowed: bool,
}

impl<W: Write> SanitizingWriter<W> {
    fn new(inner: W, limit: usize) -> Self {
        Self {
            inner,
            event: Vec::new(),
            limit,
            overflowed: false,
        }
    }

    fn emit(&mut self) -> io::Result<()> {
        if self.event.is_empty() {
            return Ok(());
        }

        let text = String::from_utf8_lossy(&self.event);
        let mut redacted = sanitize_within(&text, self.limit);
        if self.overflowed {
            if !redacted.ends_with("[TRUNCATED]") {
                redacted.push_str(" [TRUNCATED]");
            }
            // The event's own newline was cut off.
            redacted.push('\n');
        }

        self.event.clear();
        self.overflowed = false;
        self.inner.write_all(redacted.as_bytes())
    }
}

impl<W: Write> Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.limit.saturating_sub(self.event.len());
        let kept = room.min(buf.len());
        self.event.extend_from_slice(&buf[..kept]);
        if kept < buf.len() {
            self.overflowed = true;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit()?;
        self.inner.flush()
    }
}

impl<W: Write> Drop for SanitizingWriter<W> {
    fn drop(&mut self) {
        // Nowhere left to report a failed log write.
        let _ = self.emit();
    }
}
