//! vmaf logic
use crate::{
    lavfi,
    process::{CommandExt, FfmpegOut},
};
use anyhow::Context;
use log::{debug, info};
use std::{
    path::Path,
    process::Stdio,
};
use tokio::process::Command;
use tokio_stream::Stream;

/// Run a vmaf comparison writing a per-frame json log to `log_path`.
///
/// Output goes to a null sink, the score is read from the log afterwards,
/// see [`crate::vmaf_log`].
pub fn run(
    reference: &Path,
    distorted: &Path,
    log_path: &Path,
) -> anyhow::Result<impl Stream<Item = anyhow::Result<FfmpegOut>>> {
    info!(
        "vmaf {} vs reference {}",
        distorted.file_name().and_then(|n| n.to_str()).unwrap_or(""),
        reference.file_name().and_then(|n| n.to_str()).unwrap_or(""),
    );

    let mut cmd = Command::new("ffmpeg");
    cmd.kill_on_drop(true)
        .arg2("-i", distorted)
        .arg2("-i", reference)
        .arg2("-lavfi", ffmpeg_lavfi(log_path))
        .arg2("-f", "null")
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let cmd_str = cmd.to_cmd_str();
    debug!("cmd `{cmd_str}`");
    let child = cmd.spawn().context("ffmpeg vmaf")?;

    Ok(FfmpegOut::stream(child, "ffmpeg vmaf", cmd_str))
}

/// lavfi expression computing vmaf (& psnr) into a per-frame json log.
fn ffmpeg_lavfi(log_path: &Path) -> String {
    format!(
        "libvmaf=log_fmt=json:log_path={}:psnr=1",
        lavfi::escape_path(log_path)
    )
}
