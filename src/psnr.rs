//! psnr logic
use crate::{
    lavfi,
    process::{Chunks, CommandExt, FfmpegOut, cmd_err, exit_ok_stderr},
};
use anyhow::Context;
use log::{debug, info};
use std::{path::Path, process::Stdio};
use tokio::process::Command;
use tokio_process_stream::{Item, ProcessChunkStream};
use tokio_stream::{Stream, StreamExt};

/// Run a psnr comparison writing per-frame stats to `stats_file`.
///
/// Ffmpeg writes no summary artifact for psnr, the luma score is scraped
/// from its own status output on completion.
pub fn run(
    reference: &Path,
    distorted: &Path,
    stats_file: &Path,
) -> anyhow::Result<impl Stream<Item = PsnrOut>> {
    info!(
        "psnr {} vs reference {}",
        distorted.file_name().and_then(|n| n.to_str()).unwrap_or(""),
        reference.file_name().and_then(|n| n.to_str()).unwrap_or(""),
    );

    let mut cmd = Command::new("ffmpeg");
    cmd.kill_on_drop(true)
        .arg2("-i", distorted)
        .arg2("-i", reference)
        .arg2("-lavfi", ffmpeg_lavfi(stats_file))
        .arg2("-f", "null")
        .arg("-")
        .stdin(Stdio::null());

    let cmd_str = cmd.to_cmd_str();
    debug!("cmd `{cmd_str}`");
    let mut psnr = ProcessChunkStream::try_from(cmd).context("ffmpeg psnr")?;

    Ok(async_stream::stream! {
        let mut chunks = Chunks::default();
        let mut parsed_done = false;
        while let Some(next) = psnr.next().await {
            match next {
                Item::Stderr(chunk) => {
                    if let Some(out) = PsnrOut::try_from_chunk(&chunk, &mut chunks) {
                        if matches!(out, PsnrOut::Done(_)) {
                            parsed_done = true;
                        }
                        yield out;
                    }
                }
                Item::Stdout(_) => {}
                Item::Done(code) => {
                    if let Err(err) = exit_ok_stderr("ffmpeg psnr", code, &cmd_str, &chunks) {
                        yield PsnrOut::Err(err);
                    }
                }
            }
        }
        if !parsed_done {
            yield PsnrOut::Err(cmd_err(
                "could not parse ffmpeg psnr score",
                &cmd_str,
                &chunks,
            ));
        }
    })
}

/// lavfi expression computing psnr with a per-frame stats file.
fn ffmpeg_lavfi(stats_file: &Path) -> String {
    format!("psnr=stats_file={}", lavfi::escape_path(stats_file))
}

#[derive(Debug)]
pub enum PsnrOut {
    Progress(FfmpegOut),
    Done(f32),
    Err(anyhow::Error),
}

impl PsnrOut {
    fn try_from_chunk(chunk: &[u8], chunks: &mut Chunks) -> Option<Self> {
        chunks.push(chunk);

        if let Some(score) = chunks.rfind_line_map(score_from_line) {
            return Some(Self::Done(score));
        }
        if let Some(progress) = FfmpegOut::try_parse(chunks.last_line()) {
            return Some(Self::Progress(progress));
        }
        None
    }
}

// E.g. "[Parsed_psnr_0 @ 0x557e8] PSNR y:42.17 u:45.53 v:44.20 average:43.01 min:40.76 max:45.33"
fn score_from_line(line: &str) -> Option<f32> {
    const Y_PREFIX: &str = "y:";

    if !line.contains("PSNR") {
        return None;
    }

    let yidx = line.find(Y_PREFIX)?;
    let tail = &line[yidx + Y_PREFIX.len()..];
    let end_idx = tail.find(char::is_whitespace).unwrap_or(tail.len());
    tail[..end_idx].parse().ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn psnr_lavfi() {
        assert_eq!(
            ffmpeg_lavfi(Path::new("psnr.log")),
            "psnr=stats_file=psnr.log"
        );
    }

    #[test]
    fn parse_summary_line() {
        let score = score_from_line(
            "[Parsed_psnr_0 @ 0x557e8] PSNR y:42.17 u:45.53 v:44.20 average:43.01 min:40.76 max:45.33",
        );
        assert_eq!(score, Some(42.17));
    }

    #[test]
    fn parse_inf_identical_inputs() {
        let score = score_from_line(
            "[Parsed_psnr_0 @ 0x5ff4] PSNR y:inf u:inf v:inf average:inf min:inf max:inf",
        );
        assert_eq!(score, Some(f32::INFINITY));
    }

    #[test]
    fn no_token_no_score() {
        assert_eq!(score_from_line("Press [q] to stop, [?] for help"), None);
        assert_eq!(score_from_line("PSNR calculation enabled"), None);
    }

    #[test]
    fn parse_psnr_score_from_chunks() {
        // Note: some lines omitted for brevity
        const FFMPEG_OUT: &str = r#"Input #0, matroska,webm, from 'b.upscaled.1920x1080.mkv':
  Duration: 00:00:20.00, start: 0.000000, bitrate: 6114 kb/s
  Stream #0:0: Video: ffv1, yuv420p, 1920x1080, 25 fps, 25 tbr, 1k tbn (default)
Input #1, mov,mp4,m4a,3gp,3g2,mj2, from 'a.mp4':
  Duration: 00:00:20.00, start: 0.000000, bitrate: 14109 kb/s
  Stream #1:0[0x1](eng): Video: h264 (High) (avc1 / 0x31637661), yuv420p(progressive), 1920x1080, 25 fps, 25 tbr, 12800 tbn (default)
Stream mapping:
  Stream #0:0 -> psnr
  Stream #1:0 (h264) -> psnr
Press [q] to stop, [?] for help
Output #0, null, to 'pipe:':
frame=  120 fps= 34 q=-0.0 size=N/A time=00:00:04.76 bitrate=N/A speed=1.36x
frame=  400 fps= 37 q=-0.0 size=N/A time=00:00:16.04 bitrate=N/A speed=1.47x
[Parsed_psnr_0 @ 0x78341c004d00] PSNR y:42.17 u:45.53 v:44.20 average:43.01 min:40.76 max:45.33
[out#0/null @ 0x64006e11b1c0] video:578KiB audio:0KiB subtitle:0KiB other streams:0KiB global headers:0KiB muxing overhead: unknown
frame=  500 fps= 37 q=-0.0 Lsize=N/A time=00:00:19.96 bitrate=N/A speed=1.48x
"#;

        const CHUNK_SIZE: usize = 64;

        let ffmpeg = FFMPEG_OUT.as_bytes();

        let mut chunks = Chunks::default();
        let mut start_idx = 0;
        let mut psnr_score = None;
        while start_idx < ffmpeg.len() {
            let chunk = &ffmpeg[start_idx..(start_idx + CHUNK_SIZE).min(FFMPEG_OUT.len())];

            if let Some(PsnrOut::Done(score)) = PsnrOut::try_from_chunk(chunk, &mut chunks) {
                psnr_score = Some(score);
            }

            start_idx += CHUNK_SIZE;
        }

        assert_eq!(psnr_score, Some(42.17), "failed to parse psnr score");
    }
}
