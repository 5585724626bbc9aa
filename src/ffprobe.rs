//! ffprobe logic
use anyhow::{Context, anyhow};
use std::{path::Path, time::Duration};

pub struct Ffprobe {
    /// Video resolution (width, height).
    pub resolution: (u32, u32),
    /// Duration of video, if the container declares one.
    pub duration: Option<Duration>,
}

/// Probe the given input's video stream metadata.
///
/// The resolution is required, it drives the upscale target. A missing
/// duration only degrades progress reporting so is not an error.
pub fn probe(input: &Path) -> anyhow::Result<Ffprobe> {
    let probe = ffprobe::ffprobe(input).map_err(|err| anyhow!("ffprobe {input:?}: {err}"))?;

    let resolution = probe
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .find_map(|s| {
            let w = s.width.and_then(|w| u32::try_from(w).ok())?;
            let h = s.height.and_then(|h| u32::try_from(h).ok())?;
            Some((w, h))
        })
        .with_context(|| format!("ffprobe {input:?}: no video stream resolution"))?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

    Ok(Ffprobe {
        resolution,
        duration,
    })
}
