//! vmaf per-frame json log parsing.
use anyhow::{Context, ensure};
use serde::Deserialize;
use std::path::Path;

/// Mean metric scores across all frames of a vmaf json log.
#[derive(Debug, PartialEq)]
pub struct MeanMetrics {
    pub vmaf: f64,
    /// Mean psnr, if the log carries per-frame psnr.
    pub psnr: Option<f64>,
}

#[derive(Deserialize)]
struct VmafLog {
    frames: Vec<Frame>,
}

#[derive(Deserialize)]
struct Frame {
    metrics: Metrics,
}

#[derive(Deserialize)]
struct Metrics {
    vmaf: f64,
    #[serde(alias = "psnr_y")]
    psnr: Option<f64>,
}

/// Read a vmaf json log & compute mean metrics.
pub async fn read(path: &Path) -> anyhow::Result<MeanMetrics> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading vmaf log {path:?}"))?;
    mean_metrics(&data).with_context(|| format!("parsing vmaf log {path:?}"))
}

/// Arithmetic mean of each metric over all frames, ascending frame order.
fn mean_metrics(json: &[u8]) -> anyhow::Result<MeanMetrics> {
    let log: VmafLog = serde_json::from_slice(json)?;
    ensure!(!log.frames.is_empty(), "log contains no frames");

    let vmaf =
        log.frames.iter().map(|f| f.metrics.vmaf).sum::<f64>() / log.frames.len() as f64;

    let psnr: Vec<_> = log.frames.iter().filter_map(|f| f.metrics.psnr).collect();
    let psnr = match psnr.is_empty() {
        true => None,
        false => Some(psnr.iter().sum::<f64>() / psnr.len() as f64),
    };

    Ok(MeanMetrics { vmaf, psnr })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mean_over_frames() {
        let json = br#"{"frames": [
            {"frameNum": 0, "metrics": {"vmaf": 80.0, "psnr": 40.0}},
            {"frameNum": 1, "metrics": {"vmaf": 90.0, "psnr": 42.0}},
            {"frameNum": 2, "metrics": {"vmaf": 100.0, "psnr": 44.0}}
        ]}"#;
        let means = mean_metrics(json).unwrap();
        assert!((means.vmaf - 90.0).abs() < 1e-9);
        assert!((means.psnr.unwrap() - 42.0).abs() < 1e-9);
    }

    #[test]
    fn mean_without_psnr() {
        let json = br#"{"frames": [{"metrics": {"vmaf": 97.5}}]}"#;
        let means = mean_metrics(json).unwrap();
        assert!((means.vmaf - 97.5).abs() < 1e-9);
        assert_eq!(means.psnr, None);
    }

    #[test]
    fn psnr_y_alias() {
        let json = br#"{"frames": [{"metrics": {"vmaf": 90.0, "psnr_y": 38.5}}]}"#;
        let means = mean_metrics(json).unwrap();
        assert!((means.psnr.unwrap() - 38.5).abs() < 1e-9);
    }

    #[test]
    fn zero_frames_err() {
        let err = mean_metrics(br#"{"frames": []}"#).unwrap_err();
        assert!(err.to_string().contains("no frames"), "{err}");
    }

    #[test]
    fn malformed_json_err() {
        assert!(mean_metrics(b"Input #0, mov,mp4").is_err());
    }
}
