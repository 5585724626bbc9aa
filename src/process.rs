//! ffmpeg subprocess output handling.
use anyhow::{anyhow, ensure};
use std::{borrow::Cow, ffi::OsStr, fmt, io, process::ExitStatus, time::Duration};
use time::macros::format_description;
use tokio::process::Child;
use tokio_process_stream::{Item, ProcessChunkStream};
use tokio_stream::{Stream, StreamExt};

/// Ffmpeg progress line info.
#[derive(Debug, PartialEq)]
pub struct FfmpegOut {
    pub frame: u64,
    pub fps: f32,
    pub time: Duration,
}

impl FfmpegOut {
    pub fn try_parse(line: &str) -> Option<Self> {
        if !line.starts_with("frame=") {
            return None;
        }
        let frame: u64 = parse_label_substr("frame=", line)?.parse().ok()?;
        let fps: f32 = parse_label_substr("fps=", line)?.parse().ok()?;
        let (h, m, s, ns) = time::Time::parse(
            parse_label_substr("time=", line)?,
            &format_description!("[hour]:[minute]:[second].[subsecond]"),
        )
        .ok()?
        .as_hms_nano();
        Some(Self {
            frame,
            fps,
            time: Duration::new(h as u64 * 60 * 60 + m as u64 * 60 + s as u64, ns),
        })
    }

    /// Stream of progress parsed from a child's stderr.
    ///
    /// Yields a final `Err` if the process exits with failure, including the
    /// command line & captured stderr tail.
    pub fn stream(
        child: Child,
        name: &'static str,
        cmd_str: String,
    ) -> impl Stream<Item = anyhow::Result<FfmpegOut>> {
        let mut proc = ProcessChunkStream::from(child);
        async_stream::stream! {
            let mut chunks = Chunks::default();
            while let Some(item) = proc.next().await {
                match item {
                    Item::Stderr(chunk) => {
                        chunks.push(&chunk);
                        if let Some(progress) = FfmpegOut::try_parse(chunks.last_line()) {
                            yield Ok(progress);
                        }
                    }
                    Item::Stdout(_) => {}
                    Item::Done(code) => {
                        if let Err(err) = exit_ok_stderr(name, code, &cmd_str, &chunks) {
                            yield Err(err);
                        }
                    }
                }
            }
        }
    }
}

/// Parse a ffmpeg `label=  value ` type substring.
fn parse_label_substr<'a>(label: &str, line: &'a str) -> Option<&'a str> {
    let line = &line[line.find(label)? + label.len()..];
    let val_start = line.char_indices().find(|(_, c)| !c.is_whitespace())?.0;
    let val_end = val_start
        + line[val_start..]
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
            .map(|(idx, _)| idx)
            .unwrap_or_else(|| line[val_start..].len());

    Some(&line[val_start..val_end])
}

/// Buffered lossy stderr output. Allows scanning lines as chunks arrive,
/// keeping only a bounded tail.
#[derive(Default)]
pub struct Chunks {
    out: String,
}

impl Chunks {
    const MAX_LEN: usize = 64_000;

    pub fn push(&mut self, chunk: &[u8]) {
        self.out.push_str(&String::from_utf8_lossy(chunk));
        if self.out.len() > Self::MAX_LEN {
            // trim from the front on a line boundary
            let mut drop_to = self.out.len() - Self::MAX_LEN / 2;
            while !self.out.is_char_boundary(drop_to) {
                drop_to += 1;
            }
            let cut = self.out[drop_to..]
                .find(['\n', '\r'])
                .map(|idx| drop_to + idx + 1)
                .unwrap_or(drop_to);
            self.out.drain(..cut);
        }
    }

    /// Latest line, including one just terminated by a line break,
    /// e.g. a `\r` ended ffmpeg progress line.
    pub fn last_line(&self) -> &str {
        let out = self.out.trim_end_matches(['\n', '\r']);
        match out.rfind(['\n', '\r']) {
            Some(idx) => &out[idx + 1..],
            None => out,
        }
    }

    /// Latest complete line mapping to `Some`.
    ///
    /// The trailing incomplete line is never considered, a later chunk may
    /// still extend it.
    pub fn rfind_line_map<T>(&self, f: impl Fn(&str) -> Option<T>) -> Option<T> {
        self.complete().lines().rev().find_map(|l| f(l))
    }

    /// Text up to the last line break.
    fn complete(&self) -> &str {
        match self.out.rfind(['\n', '\r']) {
            Some(idx) => &self.out[..idx],
            None => "",
        }
    }

    /// Tail of the output with progress lines removed, for error reporting.
    pub fn error_tail(&self) -> String {
        let lines: Vec<_> = self
            .out
            .lines()
            .filter(|l| !l.trim().is_empty() && !l.starts_with("frame="))
            .collect();
        let skip = lines.len().saturating_sub(8);
        lines[skip..].join("\n")
    }
}

/// Convert exit code result into a result carrying the command line
/// & stderr tail on failure.
pub fn exit_ok_stderr(
    name: &'static str,
    code: io::Result<ExitStatus>,
    cmd_str: &str,
    chunks: &Chunks,
) -> anyhow::Result<()> {
    let code = code?;
    ensure!(
        code.success(),
        "{name} exit code {:?} cmd `{cmd_str}`\n{}",
        code.code(),
        chunks.error_tail(),
    );
    Ok(())
}

pub fn cmd_err(message: impl fmt::Display, cmd_str: &str, chunks: &Chunks) -> anyhow::Error {
    anyhow!("{message} cmd `{cmd_str}`\n{}", chunks.error_tail())
}

pub trait CommandExt {
    /// Adds two arguments.
    fn arg2(&mut self, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>) -> &mut Self;

    /// Shell escaped rendition of the full command.
    fn to_cmd_str(&self) -> String;
}

impl CommandExt for tokio::process::Command {
    fn arg2(&mut self, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>) -> &mut Self {
        self.arg(a).arg(b)
    }

    fn to_cmd_str(&self) -> String {
        let std = self.as_std();
        std::iter::once(std.get_program())
            .chain(std.get_args())
            .map(|a| shell_escape::escape(Cow::from(a.to_string_lossy().into_owned())))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_ffmpeg_progress() {
        let out =
            "frame=  288 fps= 94 q=-0.0 size=N/A time=01:23:12.34 bitrate=N/A speed=3.94x    ";
        assert_eq!(
            FfmpegOut::try_parse(out),
            Some(FfmpegOut {
                frame: 288,
                fps: 94.0,
                time: Duration::new(60 * 60 + 23 * 60 + 12, 340_000_000),
            })
        );
    }

    #[test]
    fn parse_non_progress_line() {
        assert_eq!(FfmpegOut::try_parse("Press [q] to stop, [?] for help"), None);
    }

    #[test]
    fn chunks_last_line_spans_pushes() {
        let mut chunks = Chunks::default();
        chunks.push(b"foo\nbar baz\rfra");
        assert_eq!(chunks.last_line(), "fra");
        chunks.push(b"me=  1 fps= 20");
        assert_eq!(chunks.last_line(), "frame=  1 fps= 20");
    }

    #[test]
    fn chunks_last_line_cr_terminated() {
        let mut chunks = Chunks::default();
        chunks.push(b"header\nframe=  5 fps= 30 time=00:00:01.00 speed=2x    \r");
        assert_eq!(
            chunks.last_line(),
            "frame=  5 fps= 30 time=00:00:01.00 speed=2x    "
        );
    }

    #[test]
    fn chunks_rfind_line_map_complete_lines_only() {
        let mut chunks = Chunks::default();
        chunks.push(b"a score: 1\nnope\nb score: 2\nc score: 3");
        // "c score: 3" may still be extended by a later chunk
        let find = |l: &str| l.contains("score").then(|| l.to_owned());
        assert_eq!(chunks.rfind_line_map(find), Some("b score: 2".to_owned()));
    }

    #[test]
    fn chunks_error_tail_skips_progress() {
        let mut chunks = Chunks::default();
        chunks.push(b"Input #0, mov\nframe=  288 fps= 94\nconversion failed\n");
        assert_eq!(chunks.error_tail(), "Input #0, mov\nconversion failed");
    }
}
