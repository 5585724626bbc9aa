mod compare;
mod ffmpeg;
mod ffprobe;
mod lavfi;
mod log;
mod process;
mod psnr;
mod temporary;
mod vmaf;
mod vmaf_log;

use anyhow::anyhow;
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use tokio::signal;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    #[command(flatten)]
    compare: compare::Args,

    /// Keep the intermediate upscaled file after exiting.
    #[arg(long)]
    keep: bool,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let out = tokio::select! {
        r = compare::run(args.compare) => r,
        _ = signal::ctrl_c() => Err(anyhow!("ctrl_c")),
    };

    if !args.keep {
        temporary::clean().await;
    }

    out
}
