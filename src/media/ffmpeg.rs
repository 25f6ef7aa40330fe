//! Decoder backed by the `ffprobe` / `ffmpeg` executables

use super::gzip::{decompress_to_temp, is_gzip};
use super::source::{source_id, AudioTrack, MediaDecoder, MediaSource, VideoInfo};
use crate::{Error, Result};
use image::RgbImage;
use ndarray::Array2;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tempfile::NamedTempFile;

/// Opens sources by shelling out to ffprobe (metadata) and ffmpeg (decoding)
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use executables other than the ones found on `PATH`
    pub fn with_binaries(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    fn probe(&self, id: &str, file: &Path) -> Result<VideoInfo> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(file)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::decode(id, format!("failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::decode(id, format!("ffprobe failed: {}", stderr.trim())));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::decode(id, format!("unreadable ffprobe output: {e}")))?;
        probe.into_info(id)
    }
}

impl MediaDecoder for FfmpegDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>> {
        let id = source_id(path);
        if !path.exists() {
            return Err(Error::decode(&id, "file not found"));
        }

        let temp = if is_gzip(path) {
            Some(decompress_to_temp(path)?)
        } else {
            None
        };
        let file = temp
            .as_ref()
            .map(|t| t.path().to_path_buf())
            .unwrap_or_else(|| path.to_path_buf());

        let info = self.probe(&id, &file)?;
        tracing::debug!(
            source = %info.source_id,
            duration = info.duration,
            fps = info.frame_rate,
            audio_rate = info.audio_sample_rate,
            "opened source"
        );

        Ok(Box::new(FfmpegSource {
            ffmpeg: self.ffmpeg.clone(),
            file,
            info,
            _temp: temp,
        }))
    }
}

struct FfmpegSource {
    ffmpeg: PathBuf,
    file: PathBuf,
    info: VideoInfo,
    // Keeps an inflated gzip source alive while the source is open
    _temp: Option<NamedTempFile>,
}

impl FfmpegSource {
    fn decode_err(&self, message: impl Into<String>) -> Error {
        Error::decode(&self.info.source_id, message)
    }

    fn frame_index(&self, t: f64) -> usize {
        (t * self.info.frame_rate + 1e-5).floor().max(0.0) as usize
    }
}

impl MediaSource for FfmpegSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn frames_at(&mut self, times: &[f64]) -> Result<Vec<RgbImage>> {
        if times.is_empty() {
            return Ok(Vec::new());
        }

        let (width, height) = (self.info.width, self.info.height);
        let frame_bytes = width as usize * height as usize * 3;
        let wanted: Vec<usize> = times.iter().map(|&t| self.frame_index(t)).collect();

        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(&self.file)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| self.decode_err(format!("failed to run ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.decode_err("ffmpeg stdout unavailable"))?;
        let stream = FrameStream::read(BufReader::new(stdout), frame_bytes, &wanted);

        // Once every wanted frame is in, the rest of the video is not needed
        let stop_early = stream.as_ref().map_or(true, |s| s.complete);
        let exited_cleanly = reap(&self.info.source_id, &mut child, stop_early)?;

        stream
            .map_err(|e| self.decode_err(format!("reading frames: {e}")))?
            .into_images(&self.info.source_id, width, height, &wanted, exited_cleanly)
    }

    fn audio(&mut self, sample_rate: u32) -> Result<AudioTrack> {
        if self.info.audio_channels == 0 {
            return Err(self.decode_err("no audio stream"));
        }
        let channels = self.info.audio_channels;

        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(&self.file)
            .args(["-map", "0:a:0", "-f", "f32le", "-acodec", "pcm_f32le"])
            .args(["-ac", &channels.to_string(), "-ar", &sample_rate.to_string(), "-"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.decode_err(format!("failed to run ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.decode_err(format!("audio decode failed: {}", stderr.trim())));
        }

        let values: Vec<f32> = output
            .stdout
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let num_samples = values.len() / channels;
        let samples = Array2::from_shape_vec(
            (num_samples, channels),
            values[..num_samples * channels].to_vec(),
        )
        .map_err(|e| self.decode_err(e.to_string()))?;

        Ok(AudioTrack {
            sample_rate,
            samples,
        })
    }
}

/// Frames kept while streaming raw `rgb24` video
#[derive(Debug)]
struct FrameStream {
    /// Wanted frames by index
    kept: HashMap<usize, Vec<u8>>,
    /// Most recent frame read
    last: Vec<u8>,
    frames_read: usize,
    /// Every wanted index was reached
    complete: bool,
}

impl FrameStream {
    /// Read frames in order until the highest wanted index or end of stream
    fn read<R: Read>(mut reader: R, frame_bytes: usize, wanted: &[usize]) -> std::io::Result<Self> {
        let mut targets = wanted.to_vec();
        targets.sort_unstable();
        targets.dedup();
        let mut targets = targets.into_iter().peekable();

        let mut kept = HashMap::with_capacity(wanted.len());
        let mut buf = vec![0u8; frame_bytes];
        let mut last = vec![0u8; frame_bytes];
        let mut frames_read = 0;
        while let Some(&target) = targets.peek() {
            match reader.read_exact(&mut buf) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            if frames_read == target {
                kept.insert(target, buf.clone());
                targets.next();
            }
            std::mem::swap(&mut buf, &mut last);
            frames_read += 1;
        }

        Ok(Self {
            kept,
            last,
            frames_read,
            complete: targets.peek().is_none(),
        })
    }

    /// Images in `wanted` order
    ///
    /// A stream that ended before the wanted frames is only accepted when the
    /// decoder exited cleanly; those times are past the end and clip to the
    /// final frame.
    fn into_images(
        self,
        id: &str,
        width: u32,
        height: u32,
        wanted: &[usize],
        exited_cleanly: bool,
    ) -> Result<Vec<RgbImage>> {
        if !self.complete && !exited_cleanly {
            return Err(Error::decode(
                id,
                format!("ffmpeg failed after {} frames", self.frames_read),
            ));
        }
        if self.frames_read == 0 {
            return Err(Error::decode(id, "no video frames decoded"));
        }

        wanted
            .iter()
            .map(|index| {
                let bytes = self.kept.get(index).unwrap_or(&self.last).clone();
                RgbImage::from_raw(width, height, bytes)
                    .ok_or_else(|| Error::decode(id, "frame buffer size mismatch"))
            })
            .collect()
    }
}

/// Wait for ffmpeg, killing it first when its remaining output is unwanted
///
/// Returns whether it exited successfully.
fn reap(id: &str, child: &mut Child, stop_early: bool) -> Result<bool> {
    if stop_early {
        if let Err(e) = child.kill() {
            tracing::warn!(source = %id, error = %e, "failed to stop ffmpeg");
        }
    }
    let status = child
        .wait()
        .map_err(|e| Error::decode(id, format!("failed to wait for ffmpeg: {e}")))?;
    if !stop_early && !status.success() {
        tracing::warn!(source = %id, %status, "ffmpeg exited with an error");
    }
    Ok(status.success())
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<usize>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl ProbeOutput {
    fn into_info(self, id: &str) -> Result<VideoInfo> {
        let video = self
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| Error::decode(id, "no video stream"))?;
        let audio = self
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"));

        let frame_rate = [&video.avg_frame_rate, &video.r_frame_rate]
            .into_iter()
            .flatten()
            .filter_map(|r| parse_rate(r))
            .find(|&r| r > 0.0)
            .ok_or_else(|| Error::decode(id, "unknown frame rate"))?;

        let duration = self
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .or(video.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or_else(|| Error::decode(id, "unknown duration"))?;

        let (width, height) = match (video.width, video.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(Error::decode(id, "unknown frame size")),
        };

        Ok(VideoInfo {
            source_id: id.to_string(),
            duration,
            frame_rate,
            audio_sample_rate: audio
                .and_then(|a| a.sample_rate.as_deref())
                .and_then(|r| r.parse().ok())
                .unwrap_or(0),
            audio_channels: audio.and_then(|a| a.channels).unwrap_or(0),
            width,
            height,
        })
    }
}

/// Parse an ffprobe rational such as `30000/1001`
fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.trim().parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const PROBE_JSON: &str = r#"{
        "streams": [
            {"codec_type": "video", "width": 640, "height": 360,
             "avg_frame_rate": "30000/1001", "r_frame_rate": "30000/1001"},
            {"codec_type": "audio", "sample_rate": "44100", "channels": 2}
        ],
        "format": {"duration": "10.010000"}
    }"#;

    #[test]
    fn test_parse_rate() {
        assert_relative_eq!(parse_rate("30000/1001").unwrap(), 29.97002997, epsilon = 1e-6);
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert_eq!(parse_rate("24"), Some(24.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_probe_output_to_info() {
        let probe: ProbeOutput = serde_json::from_str(PROBE_JSON).unwrap();
        let info = probe.into_info("clip.mkv").unwrap();

        assert_eq!(info.source_id, "clip.mkv");
        assert_relative_eq!(info.duration, 10.01);
        assert_relative_eq!(info.frame_rate, 29.97002997, epsilon = 1e-6);
        assert_eq!(info.audio_sample_rate, 44100);
        assert_eq!(info.audio_channels, 2);
        assert_eq!((info.width, info.height), (640, 360));
    }

    #[test]
    fn test_probe_without_video_stream_is_decode_error() {
        let probe: ProbeOutput = serde_json::from_str(
            r#"{"streams": [{"codec_type": "audio", "sample_rate": "16000", "channels": 1}],
                "format": {"duration": "1.0"}}"#,
        )
        .unwrap();
        assert!(matches!(probe.into_info("a.wav"), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_probe_without_audio_reports_zero_channels() {
        let probe: ProbeOutput = serde_json::from_str(
            r#"{"streams": [{"codec_type": "video", "width": 2, "height": 2, "avg_frame_rate": "25/1"}],
                "format": {"duration": "1.0"}}"#,
        )
        .unwrap();
        let info = probe.into_info("silent.mp4").unwrap();
        assert_eq!(info.audio_channels, 0);
    }

    fn raw_frames(count: usize, frame_bytes: usize) -> Vec<u8> {
        (0..count)
            .flat_map(|i| std::iter::repeat(i as u8 + 1).take(frame_bytes))
            .collect()
    }

    #[test]
    fn test_frame_stream_keeps_wanted_frames() {
        // 2x1 frames, 6 bytes each
        let data = raw_frames(6, 6);
        let wanted = [4, 1, 1];
        let stream = FrameStream::read(&data[..], 6, &wanted).unwrap();

        assert!(stream.complete);
        assert_eq!(stream.frames_read, 5);
        let images = stream.into_images("clip.mp4", 2, 1, &wanted, false).unwrap();
        let firsts: Vec<u8> = images.iter().map(|img| img.as_raw()[0]).collect();
        assert_eq!(firsts, vec![5, 2, 2]);
    }

    #[test]
    fn test_failed_decoder_truncating_stream_is_decode_error() {
        // Decoder died after two and a half frames
        let mut data = raw_frames(2, 6);
        data.extend_from_slice(&[9, 9, 9]);
        let wanted = [0, 3, 5];
        let stream = FrameStream::read(&data[..], 6, &wanted).unwrap();

        assert!(!stream.complete);
        assert_eq!(stream.frames_read, 2);
        match stream.into_images("broken.mkv", 2, 1, &wanted, false) {
            Err(Error::Decode { source_id, message }) => {
                assert_eq!(source_id, "broken.mkv");
                assert!(message.contains("after 2 frames"));
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_end_of_stream_clips_to_last_frame() {
        let data = raw_frames(3, 6);
        let wanted = [1, 7];
        let stream = FrameStream::read(&data[..], 6, &wanted).unwrap();
        let images = stream.into_images("clip.mp4", 2, 1, &wanted, true).unwrap();

        assert_eq!(images[0].as_raw()[0], 2);
        assert_eq!(images[1].as_raw()[0], 3);
    }

    #[test]
    fn test_empty_stream_is_decode_error() {
        let stream = FrameStream::read(&[0u8; 0][..], 6, &[0]).unwrap();
        assert!(matches!(
            stream.into_images("empty.mp4", 2, 1, &[0], true),
            Err(Error::Decode { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_reap_reports_exit_status() {
        let mut ok = Command::new("sh").args(["-c", "exit 0"]).spawn().unwrap();
        assert!(reap("a.mp4", &mut ok, false).unwrap());

        let mut failed = Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
        assert!(!reap("a.mp4", &mut failed, false).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_reap_stops_running_decoder() {
        let mut child = Command::new("sh").args(["-c", "sleep 30"]).spawn().unwrap();
        assert!(!reap("a.mp4", &mut child, true).unwrap());
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn test_open_missing_file_is_decode_error() {
        let decoder = FfmpegDecoder::new();
        match decoder.open(Path::new("/nonexistent/clip.mkv")) {
            Err(Error::Decode { source_id, .. }) => assert_eq!(source_id, "clip.mkv"),
            Err(other) => panic!("expected decode error, got {other:?}"),
            Ok(_) => panic!("expected decode error"),
        }
    }

    #[test]
    fn test_missing_binary_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"x").unwrap();

        let decoder = FfmpegDecoder::new()
            .with_binaries("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        assert!(matches!(decoder.open(&path), Err(Error::Decode { .. })));
    }
}
