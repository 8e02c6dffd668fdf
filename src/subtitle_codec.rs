use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use regex::Regex;
use once_cell::sync::Lazy;
use log::debug;
use tempfile::NamedTempFile;

use crate::errors::SubtitleError;

// @module: SRT parsing and serialization

// @const: SRT timing line regex
static TIMING_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2,}):(\d{2}):(\d{2}),(\d{3})\s*-->\s*(\d{2,}):(\d{2}):(\d{2}),(\d{3})$").unwrap()
});

// @const: Written in front of a text line that would otherwise read as a timing line
const TIMING_GUARD: char = '\u{200B}';

// @struct: Single subtitle cue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    // @field: Cue number as found in the source (renumbered on output)
    pub index: usize,

    // @field: Start time in ms
    pub start_ms: u64,

    // @field: End time in ms
    pub end_ms: u64,

    // @field: Text lines, in display order
    pub lines: Vec<String>,
}

impl Cue {
    /// Creates a new cue from already split lines
    pub fn new(index: usize, start_ms: u64, end_ms: u64, lines: Vec<String>) -> Self {
        Cue {
            index,
            start_ms,
            end_ms,
            lines,
        }
    }

    /// Creates a new cue from a newline separated text block
    pub fn from_text(index: usize, start_ms: u64, end_ms: u64, text: &str) -> Self {
        Self::new(index, start_ms, end_ms, split_text_lines(text))
    }

    /// Text lines joined with `\n`
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Number of characters in the text payload, line breaks included
    pub fn char_count(&self) -> usize {
        let chars: usize = self.lines.iter().map(|l| l.chars().count()).sum();
        chars + self.lines.len().saturating_sub(1)
    }

    /// Copy of this cue with its text replaced
    pub fn with_lines(&self, lines: Vec<String>) -> Self {
        Cue {
            lines,
            ..self.clone()
        }
    }

    /// Parse an SRT timestamp (HH:MM:SS,mmm) to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Option<u64> {
        let (hms, millis) = timestamp.trim().split_once(',')?;
        let mut parts = hms.split(':');
        let hours = parts.next()?;
        let minutes = parts.next()?;
        let seconds = parts.next()?;
        if parts.next().is_some() || hours.len() < 2 || minutes.len() != 2 || seconds.len() != 2 || millis.len() != 3 {
            return None;
        }
        to_millis(hours, minutes, seconds, millis)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }

    /// The timing line of this cue
    pub fn timing_line(&self) -> String {
        format!("{} --> {}", Self::format_timestamp(self.start_ms), Self::format_timestamp(self.end_ms))
    }

    // Lines as they are written out: no embedded breaks, no trailing
    // whitespace, no blank lines (a blank line would end the block). A
    // timing line right after a bare number would start a new cue when read
    // back, so it is guarded with a zero width space.
    fn normalized_lines(&self) -> Vec<Cow<'_, str>> {
        let mut out: Vec<Cow<'_, str>> = Vec::new();
        let lines = self
            .lines
            .iter()
            .flat_map(|line| line.split('\n'))
            .map(|line| line.trim_end())
            .filter(|line| !line.is_empty());

        for line in lines {
            let follows_number = out.last().is_some_and(|prev| prev.trim().parse::<usize>().is_ok());
            if follows_number && TIMING_LINE_REGEX.is_match(line.trim()) {
                out.push(Cow::Owned(format!("{}{}", TIMING_GUARD, line)));
            } else {
                out.push(Cow::Borrowed(line));
            }
        }
        out
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.index)?;
        writeln!(f, "{}", self.timing_line())?;
        for line in self.normalized_lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Line break convention of an SRT file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// Detect the convention used by a source text; LF when there are no breaks
    pub fn detect(content: &str) -> Self {
        if content.contains("\r\n") {
            Self::CrLf
        } else {
            Self::Lf
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// SRT codec
pub struct SubtitleCodec;

impl SubtitleCodec {
    /// Parse SRT text into an ordered list of cues.
    ///
    /// Accepts a leading UTF-8 BOM, CRLF line breaks, leading blank lines and
    /// trailing whitespace. Cue numbers must be positive and strictly increasing,
    /// start times must not decrease and every block must be closed by a blank
    /// line (or the end of the text).
    pub fn parse(content: &str) -> Result<Vec<Cue>, SubtitleError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let lines: Vec<&str> = content
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect();

        let mut cues: Vec<Cue> = Vec::new();
        let mut pos = 0;

        while pos < lines.len() {
            let trimmed = lines[pos].trim();
            if trimmed.is_empty() {
                pos += 1;
                continue;
            }

            // Cue number
            let line_no = pos + 1;
            let index: usize = trimmed.parse().map_err(|_| {
                SubtitleError::malformed(line_no, format!("expected a cue number, found {:?}", trimmed))
            })?;
            if index == 0 {
                return Err(SubtitleError::malformed(line_no, "cue numbers start at 1"));
            }
            if let Some(previous) = cues.last() {
                if index <= previous.index {
                    return Err(SubtitleError::malformed(
                        line_no,
                        format!("cue number {} does not follow {}", index, previous.index),
                    ));
                }
            }
            pos += 1;

            // Timing line
            let line_no = pos + 1;
            let timing = lines.get(pos).map(|l| l.trim()).unwrap_or("");
            let (start_ms, end_ms) = Self::parse_timing_line(timing)
                .ok_or_else(|| SubtitleError::malformed(line_no, format!("invalid timing line {:?}", timing)))?;
            if end_ms < start_ms {
                return Err(SubtitleError::malformed(line_no, "cue ends before it starts"));
            }
            if let Some(previous) = cues.last() {
                if start_ms < previous.start_ms {
                    return Err(SubtitleError::malformed(line_no, "cue starts before the previous cue"));
                }
            }
            pos += 1;

            // Text until blank line
            let mut text: Vec<String> = Vec::new();
            while pos < lines.len() {
                let line = lines[pos].trim_end();
                if line.trim().is_empty() {
                    break;
                }
                if TIMING_LINE_REGEX.is_match(line.trim()) {
                    let follows_number = text.last().is_some_and(|l| l.trim().parse::<usize>().is_ok());
                    if follows_number {
                        return Err(SubtitleError::malformed(pos, "missing blank line before cue"));
                    }
                }
                text.push(line.to_string());
                pos += 1;
            }

            cues.push(Cue::new(index, start_ms, end_ms, text));
        }

        debug!("Parsed {} subtitle cues", cues.len());
        Ok(cues)
    }

    /// Serialize cues with LF line breaks, renumbering from 1
    pub fn serialize(cues: &[Cue]) -> String {
        Self::serialize_with(cues, LineEnding::Lf)
    }

    /// Serialize cues with the given line break convention, renumbering from 1
    pub fn serialize_with(cues: &[Cue], line_ending: LineEnding) -> String {
        let eol = line_ending.as_str();
        let mut out = String::new();

        for (i, cue) in cues.iter().enumerate() {
            if i > 0 {
                out.push_str(eol);
            }
            out.push_str(&(i + 1).to_string());
            out.push_str(eol);
            out.push_str(&cue.timing_line());
            out.push_str(eol);
            for line in cue.normalized_lines() {
                out.push_str(&line);
                out.push_str(eol);
            }
        }

        out
    }

    /// Read and parse an SRT file, returning its cues and line break convention
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<(Vec<Cue>, LineEnding), SubtitleError> {
        let content = fs::read_to_string(path.as_ref())?;
        let line_ending = LineEnding::detect(&content);
        let cues = Self::parse(&content)?;
        Ok((cues, line_ending))
    }

    /// Serialize cues and write them to `path`.
    ///
    /// The text goes to a temporary file in the destination directory first and
    /// is renamed into place, so readers never observe a truncated file.
    pub fn write_file<P: AsRef<Path>>(path: P, cues: &[Cue], line_ending: LineEnding) -> Result<(), SubtitleError> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(Self::serialize_with(cues, line_ending).as_bytes())?;
        file.flush()?;
        file.persist(path).map_err(|e| SubtitleError::Io(e.error))?;

        Ok(())
    }

    fn parse_timing_line(line: &str) -> Option<(u64, u64)> {
        let caps = TIMING_LINE_REGEX.captures(line)?;
        let start = to_millis(&caps[1], &caps[2], &caps[3], &caps[4])?;
        let end = to_millis(&caps[5], &caps[6], &caps[7], &caps[8])?;
        Some((start, end))
    }
}

fn to_millis(hours: &str, minutes: &str, seconds: &str, millis: &str) -> Option<u64> {
    let hours: u64 = hours.parse().ok()?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    let millis: u64 = millis.parse().ok()?;

    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    hours
        .checked_mul(3_600_000)?
        .checked_add(minutes * 60_000 + seconds * 1_000 + millis)
}

/// Split a text block into trimmed, non-empty lines
pub fn split_text_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}
