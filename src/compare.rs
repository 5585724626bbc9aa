//! compare pipeline: probe -> upscale -> psnr? -> vmaf?
use crate::{
    ffmpeg, ffprobe,
    log::ProgressLogger,
    process::FfmpegOut,
    psnr,
    psnr::PsnrOut,
    vmaf, vmaf_log,
};
use anyhow::{Context, ensure};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::{
    path::PathBuf,
    pin::pin,
    time::{Duration, Instant},
};
use tokio_stream::{Stream, StreamExt};

const PROGRESS_CHARS: &str = "##-";

/// Compare an encoded video against its reference, scoring quality.
///
/// The encoded video is first upscaled to the base resolution so both
/// can be compared frame-for-frame.
#[derive(Parser)]
pub struct Args {
    /// Reference video file.
    #[arg(short, long)]
    pub base: PathBuf,

    /// Encoded/processed video file to score against the base.
    #[arg(short, long)]
    pub encoded: PathBuf,

    /// Enable the vmaf stage, writing the per-frame json log to this path.
    /// The mean VMAF score is read from the written log.
    #[arg(long = "vmaf_log", alias = "lv", value_name = "PATH")]
    pub vmaf_log: Option<PathBuf>,

    /// Enable the psnr stage, writing per-frame stats to this path.
    /// The mean luma PSNR is taken from ffmpeg's summary output.
    #[arg(long = "psnr_log", alias = "lp", value_name = "PATH")]
    pub psnr_log: Option<PathBuf>,
}

/// Pipeline stage, in execution order. Metric stages run conditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Probe,
    Upscale,
    Psnr,
    Vmaf,
}

fn plan(psnr: bool, vmaf: bool) -> Vec<Stage> {
    let mut stages = vec![Stage::Probe, Stage::Upscale];
    if psnr {
        stages.push(Stage::Psnr);
    }
    if vmaf {
        stages.push(Stage::Vmaf);
    }
    stages
}

pub async fn run(
    Args {
        base,
        encoded,
        vmaf_log,
        psnr_log,
    }: Args,
) -> anyhow::Result<()> {
    ensure!(
        vmaf_log.is_some() || psnr_log.is_some(),
        "at least one of --vmaf_log & --psnr_log must be set"
    );

    let stages = plan(psnr_log.is_some(), vmaf_log.is_some());
    let bar = ProgressBar::new(stages.len() as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan.bold} {elapsed_precise:.bold} {wide_bar:.cyan/blue} ({msg}stage {pos}/{len})")?
            .progress_chars(PROGRESS_CHARS),
    );
    bar.enable_steady_tick(Duration::from_millis(100));

    // probe the base resolution, the upscale target
    bar.set_message("probing, ");
    let probe = ffprobe::probe(&base)?;
    let (width, height) = probe.resolution;
    bar.inc(1);

    // upscale the encoded video to match the base
    bar.set_message("upscaling, ");
    let (upscaled, upscale_out) = ffmpeg::upscale(&encoded, (width, height))?;
    let mut logger = ProgressLogger::new(module_path!(), Instant::now());
    drain_stage(upscale_out, |FfmpegOut { fps, time, .. }| {
        if fps > 0.0 {
            bar.set_message(format!("upscaling {fps} fps, "));
        }
        if let Some(total) = probe.duration {
            logger.update(total, time, fps);
        }
    })
    .await?;
    bar.println(
        style(format!("- Upscaled {encoded:?} to {width}x{height}"))
            .dim()
            .to_string(),
    );
    bar.inc(1);

    let mut psnr_score = None;
    if let Some(stats_file) = psnr_log {
        bar.set_message("psnr running, ");
        let mut logger = ProgressLogger::new(module_path!(), Instant::now());
        let score = drain_psnr(
            psnr::run(&base, &upscaled, &stats_file)?,
            |FfmpegOut { fps, time, .. }| {
                if fps > 0.0 {
                    bar.set_message(format!("psnr {fps} fps, "));
                }
                if let Some(total) = probe.duration {
                    logger.update(total, time, fps);
                }
            },
        )
        .await?;
        psnr_score = Some(score);
        bar.inc(1);
    }

    let mut vmaf_means = None;
    if let Some(log_path) = vmaf_log {
        bar.set_message("vmaf running, ");
        let mut logger = ProgressLogger::new(module_path!(), Instant::now());
        drain_stage(
            vmaf::run(&base, &upscaled, &log_path)?,
            |FfmpegOut { fps, time, .. }| {
                if fps > 0.0 {
                    bar.set_message(format!("vmaf {fps} fps, "));
                }
                if let Some(total) = probe.duration {
                    logger.update(total, time, fps);
                }
            },
        )
        .await?;
        // score comes from the json log written by the completed run
        vmaf_means = Some(vmaf_log::read(&log_path).await?);
        bar.inc(1);
    }

    bar.finish();

    if let Some(psnr) = psnr_score {
        println!("PSNR {psnr}");
    }
    if let Some(means) = vmaf_means {
        if let Some(psnr) = means.psnr {
            info!("vmaf log mean psnr {psnr}");
        }
        println!("VMAF {}", means.vmaf);
    }
    Ok(())
}

/// Drain a stage's progress stream to completion.
///
/// An `Err` item means the stage failed: it propagates immediately &
/// stages depending on this stage's output must not run.
async fn drain_stage(
    out: impl Stream<Item = anyhow::Result<FfmpegOut>>,
    mut on_progress: impl FnMut(FfmpegOut),
) -> anyhow::Result<()> {
    let mut out = pin!(out);
    while let Some(next) = out.next().await {
        on_progress(next?);
    }
    Ok(())
}

/// Drain a psnr stage to stream end, so the exit status is observed &
/// the stats file is fully written before the score is used.
async fn drain_psnr(
    out: impl Stream<Item = PsnrOut>,
    mut on_progress: impl FnMut(FfmpegOut),
) -> anyhow::Result<f32> {
    let mut out = pin!(out);
    let mut score = None;
    while let Some(next) = out.next().await {
        match next {
            PsnrOut::Done(s) => score = Some(s),
            PsnrOut::Progress(progress) => on_progress(progress),
            PsnrOut::Err(e) => return Err(e),
        }
    }
    score.context("no psnr score")
}
