//! ffmpeg upscale logic
use crate::{
    process::{CommandExt, FfmpegOut},
    temporary,
};
use anyhow::Context;
use log::{debug, info};
use std::{
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::Command;
use tokio_stream::Stream;

/// Upscale a video to the given resolution writing a lossless intermediate
/// next to the input, returning the intermediate path & progress stream.
///
/// The intermediate is registered as a temporary file. A forced pixel format
/// & constant frame rate guarantee a decodable, frame-aligned comparison
/// input.
pub fn upscale(
    input: &Path,
    (width, height): (u32, u32),
) -> anyhow::Result<(PathBuf, impl Stream<Item = anyhow::Result<FfmpegOut>>)> {
    info!(
        "upscaling {} to {width}x{height}",
        input.file_name().and_then(|n| n.to_str()).unwrap_or(""),
    );

    let dest = upscale_dest(input, width, height);
    temporary::add(&dest);

    let mut cmd = Command::new("ffmpeg");
    cmd.kill_on_drop(true)
        .arg("-y")
        .arg2("-i", input)
        .arg2("-pix_fmt", "yuv420p")
        .arg2("-vf", scale_vf(width, height))
        .arg2("-fps_mode", "cfr")
        .arg2("-c:v", "ffv1")
        .arg("-an")
        .arg(&dest)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let cmd_str = cmd.to_cmd_str();
    debug!("cmd `{cmd_str}`");
    let child = cmd.spawn().context("ffmpeg upscale")?;

    Ok((dest, FfmpegOut::stream(child, "ffmpeg upscale", cmd_str)))
}

/// Deterministic intermediate path, e.g. `vid.mkv` -> `vid.upscaled.1920x1080.mkv`.
fn upscale_dest(input: &Path, width: u32, height: u32) -> PathBuf {
    input.with_extension(format!("upscaled.{width}x{height}.mkv"))
}

fn scale_vf(width: u32, height: u32) -> String {
    format!("scale={width}:{height}:flags=lanczos")
}
