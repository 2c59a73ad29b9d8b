//! WebVTT and SRT subtitle encoding.
//!
//! Both formats number cues from 1 in output order and separate cues with a blank line. They
//! differ only in the header (`WEBVTT` for VTT, none for SRT) and the millisecond separator
//! (`.` for VTT, `,` for SRT).

use capline_asr::types::Cue;
use srtlib::{Subtitle, Timestamp};
use thiserror::Error;

pub const VTT_HEADER: &str = "WEBVTT\n\n";

/// Minimum display window, in milliseconds, given to cues that would not end after their start
const MIN_CUE_MS: u32 = 100;

#[derive(Debug, Error)]
pub enum SubtitleError {
    #[error("missing WEBVTT header")]
    MissingHeader,

    #[error("line {line}: expected cue timing, found {found:?}")]
    MissingTiming { line: usize, found: String },

    #[error("line {line}: invalid timestamp {value:?}")]
    InvalidTimestamp { line: usize, value: String },
}

/// Clamp a cue window, in encoded milliseconds, to something every player accepts.
///
/// Negative starts become 0. Windows that are empty or inverted after rounding get
/// [`MIN_CUE_MS`].
fn sanitize_window(cue: &Cue, index: usize) -> (u32, u32) {
    let start = secs_to_ms(cue.start);
    let mut end = secs_to_ms(cue.end);

    if end <= start {
        tracing::warn!(
            cue = index,
            start = cue.start,
            end = cue.end,
            "cue window empty after rounding, clamping"
        );
        end = start.saturating_add(MIN_CUE_MS);
    }
    (start, end)
}

/// Round seconds to the nearest millisecond; negative values become 0.
fn secs_to_ms(secs: f64) -> u32 {
    (secs * 1000.0).round().clamp(0.0, u32::MAX as f64) as u32
}

/// Convert cues to numbered SRT subtitles.
pub fn to_subtitles(cues: &[Cue]) -> Vec<Subtitle> {
    cues.iter()
        .zip(1..)
        .map(|(cue, i)| {
            let (start, end) = sanitize_window(cue, i);
            Subtitle::new(
                i,
                Timestamp::from_milliseconds(start),
                Timestamp::from_milliseconds(end),
                cue.text.clone(),
            )
        })
        .collect()
}

/// Render cues as an SRT document.
pub fn to_srt(cues: &[Cue]) -> String {
    to_subtitles(cues)
        .iter()
        .map(|s| format!("{s}\n\n"))
        .collect()
}

/// Render cues as a WebVTT document.
pub fn to_vtt(cues: &[Cue]) -> String {
    let mut out = String::from(VTT_HEADER);
    for s in to_subtitles(cues) {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            s.num,
            vtt_timestamp(&s.start_time),
            vtt_timestamp(&s.end_time),
            s.text
        ));
    }
    out
}

fn vtt_timestamp(ts: &Timestamp) -> String {
    ts.to_string().replace(',', ".")
}

/// Parse a WebVTT document into cues.
///
/// Accepts numbered or unnumbered cues with `HH:MM:SS.mmm` or `MM:SS.mmm` timings and
/// single or multi-line text. Cue settings after the end timestamp are ignored.
pub fn parse_vtt(text: &str) -> Result<Vec<Cue>, SubtitleError> {
    let mut lines = text.lines().enumerate().peekable();

    match lines.next() {
        Some((_, header)) if header.trim_start_matches('\u{feff}').starts_with("WEBVTT") => {}
        _ => return Err(SubtitleError::MissingHeader),
    }

    // skip header block
    while let Some(&(_, line)) = lines.peek()
        && !line.trim().is_empty()
    {
        lines.next();
    }

    let mut cues = Vec::new();

    while let Some((n, line)) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (timing_no, timing) = if line.contains("-->") {
            (n, line)
        } else {
            // cue identifier, timing follows
            match lines.next() {
                Some((m, next)) if next.contains("-->") => (m, next.trim()),
                Some((m, next)) => {
                    return Err(SubtitleError::MissingTiming {
                        line: m + 1,
                        found: next.to_string(),
                    });
                }
                None => {
                    return Err(SubtitleError::MissingTiming {
                        line: n + 1,
                        found: String::new(),
                    });
                }
            }
        };

        let (start, end) = parse_timing(timing, timing_no + 1)?;

        let mut body = Vec::new();
        while let Some(&(_, text)) = lines.peek()
            && !text.trim().is_empty()
        {
            body.push(text.trim_end());
            lines.next();
        }

        cues.push(Cue::new(body.join("\n"), start, end));
    }

    Ok(cues)
}

fn parse_timing(line: &str, line_no: usize) -> Result<(f64, f64), SubtitleError> {
    let (start, rest) = line
        .split_once("-->")
        .ok_or_else(|| SubtitleError::MissingTiming {
            line: line_no,
            found: line.to_string(),
        })?;
    let end = rest.split_whitespace().next().unwrap_or_default();

    Ok((
        parse_timestamp(start.trim(), line_no)?,
        parse_timestamp(end, line_no)?,
    ))
}

/// Parse `HH:MM:SS.mmm` or `MM:SS.mmm` into seconds.
fn parse_timestamp(value: &str, line_no: usize) -> Result<f64, SubtitleError> {
    let invalid = || SubtitleError::InvalidTimestamp {
        line: line_no,
        value: value.to_string(),
    };

    let (clock, millis) = value.split_once(['.', ',']).ok_or_else(invalid)?;
    if millis.len() != 3 {
        return Err(invalid());
    }
    let millis: u64 = millis.parse().map_err(|_| invalid())?;

    let parts = clock
        .split(':')
        .map(|p| p.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    let (hours, minutes, seconds) = match parts[..] {
        [h, m, s] => (h, m, s),
        [m, s] => (0, m, s),
        _ => return Err(invalid()),
    };
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    let total_ms = ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis;
    Ok(total_ms as f64 / 1000.0)
}

/// Display a preview of subtitles (first and last entries).
pub fn preview_subtitles(subtitles: &[Subtitle], head_count: usize, tail_count: usize) -> String {
    let total = subtitles.len();
    let render = |s: &[Subtitle]| s.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    if total <= head_count + tail_count {
        render(subtitles).join("\n\n")
    } else {
        let mut out = render(&subtitles[..head_count]);
        out.push("...".to_string());
        out.extend(render(&subtitles[total - tail_count..]));
        out.join("\n\n")
    }
}
