//! HEVC map encoding for the V-PCC core by driving an out-of-process
//! `ffmpeg` (libx265) through `ffmpeg-sidecar`.
//!
//! If `ffmpeg` is not installed, it is downloaded locally automatically.

use std::io::{Read, Write};

use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use log::{error, info, warn};
use vpcc_enc::map_encoding::{Encoder2dConfig, Map2dEncoder, Map2dEncoderFactory, MapKind};
use vpcc_enc::Error;

/// An error faced while running the external video encoder.
#[derive(Debug, thiserror::Error)]
pub enum VideoEncodeError {
    #[error("the encoder was not configured before encoding")]
    NotConfigured,
    #[error("frame {index} has {actual} bytes, expected {expected} (YUV420 {width}x{height})")]
    IncorrectFrameSize {
        index: usize,
        actual: usize,
        expected: usize,
        width: usize,
        height: usize,
    },
    #[error("failed to install ffmpeg: {0}")]
    Install(String),
    #[error("an IO error occurred while driving ffmpeg: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg produced no bitstream for the {0} map")]
    EmptyBitstream(&'static str),
}

impl From<VideoEncodeError> for Error {
    fn from(error: VideoEncodeError) -> Self {
        Error::MapEncoding(error.to_string())
    }
}

/// One ffmpeg invocation per GOF and map stream.
pub struct FfmpegMapEncoder {
    kind: MapKind,
    config: Option<Encoder2dConfig>,
}

impl FfmpegMapEncoder {
    pub fn new(kind: MapKind) -> Self {
        Self { kind, config: None }
    }

    fn command(&self, config: &Encoder2dConfig) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new();
        cmd.format("rawvideo")
            .pix_fmt("yuv420p")
            .size(config.width as u32, config.height as u32)
            .input("-")
            .codec_video("libx265")
            .pix_fmt("yuv420p")
            .preset(&config.preset);

        // Map the core's GOP shape onto x265: all-intra uses the intra
        // period as keyint, random access adds the GOP size.
        let mut x265_params = vec![
            format!("keyint={}", config.intra_period.max(1)),
            format!("min-keyint={}", config.intra_period.max(1)),
            "bframes=0".to_string(),
            "log-level=error".to_string(),
        ];
        if config.lossless {
            x265_params.push("lossless=1".to_string());
        } else if let Some(qp) = config.qp {
            x265_params.push(format!("qp={qp}"));
        }
        if config.threads > 0 {
            x265_params.push(format!("pools={}", config.threads));
        }
        cmd.args(["-x265-params", &x265_params.join(":")]);

        if config.gop_size > 0 {
            cmd.args(["-g", &config.gop_size.to_string()]);
        }

        cmd.format("hevc").output("-");
        cmd
    }
}

impl Map2dEncoder for FfmpegMapEncoder {
    fn configure(&mut self, config: &Encoder2dConfig) -> Result<(), Error> {
        if config.input_format != "YUV420" {
            return Err(Error::MapEncoding(format!(
                "ffmpeg encoder: only YUV420 input is supported for the {} map, got '{}'",
                self.kind.label(),
                config.input_format
            )));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn encode_gof(&mut self, frames: &[&[u8]]) -> Result<Vec<u8>, Error> {
        let config = self
            .config
            .as_ref()
            .ok_or(VideoEncodeError::NotConfigured)?;
        let expected = config.width * config.height * 3 / 2;
        for (index, frame) in frames.iter().enumerate() {
            if frame.len() != expected {
                return Err(VideoEncodeError::IncorrectFrameSize {
                    index,
                    actual: frame.len(),
                    expected,
                    width: config.width,
                    height: config.height,
                }
                .into());
            }
        }

        let kind = self.kind.label();
        let mut child = self
            .command(config)
            .spawn()
            .map_err(VideoEncodeError::Io)?;

        let mut stdin = child
            .take_stdin()
            .ok_or_else(|| Error::MapEncoding(format!("{kind}: ffmpeg stdin unavailable")))?;
        let mut stdout = child
            .take_stdout()
            .ok_or_else(|| Error::MapEncoding(format!("{kind}: ffmpeg stdout unavailable")))?;

        // Log pump: surface ffmpeg diagnostics through the log facade.
        let events = child
            .iter()
            .map_err(|e| Error::MapEncoding(format!("{kind}: {e}")))?;
        let log_pump = std::thread::spawn(move || {
            events.for_each(|event| {
                if let FfmpegEvent::Log(level, message) = event {
                    match level {
                        ffmpeg_sidecar::event::LogLevel::Info => {
                            info!(target: "MAP ENCODING", "[ffmpeg] {message}")
                        }
                        ffmpeg_sidecar::event::LogLevel::Warning => {
                            warn!(target: "MAP ENCODING", "[ffmpeg] {message}")
                        }
                        ffmpeg_sidecar::event::LogLevel::Unknown => {}
                        _ => error!(target: "MAP ENCODING", "[ffmpeg] {message}"),
                    }
                }
            });
        });

        // The bitstream comes back over stdout while frames go in.
        let reader = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let mut bitstream = Vec::new();
            stdout.read_to_end(&mut bitstream)?;
            Ok(bitstream)
        });

        for frame in frames {
            stdin.write_all(frame).map_err(VideoEncodeError::Io)?;
        }
        drop(stdin); // end of input, ffmpeg flushes

        let bitstream = reader
            .join()
            .map_err(|_| Error::MapEncoding(format!("{kind}: bitstream reader panicked")))?
            .map_err(VideoEncodeError::Io)?;
        let _ = log_pump.join();
        let _ = child.wait();

        if bitstream.is_empty() {
            return Err(VideoEncodeError::EmptyBitstream(self.kind.label()).into());
        }
        Ok(bitstream)
    }
}

/// Resolves the encoder names of the parameter table. Only `ffmpeg` is
/// known here; other names belong to other backends.
pub struct FfmpegEncoderFactory;

impl Map2dEncoderFactory for FfmpegEncoderFactory {
    fn create(&self, name: &str, kind: MapKind) -> Result<Box<dyn Map2dEncoder>, Error> {
        if !name.eq_ignore_ascii_case("ffmpeg") {
            return Err(Error::MapEncoding(format!(
                "unknown 2D encoder '{name}' for the {} map",
                kind.label()
            )));
        }
        ffmpeg_sidecar::download::auto_download()
            .map_err(|e| Error::from(VideoEncodeError::Install(e.to_string())))?;
        Ok(Box::new(FfmpegMapEncoder::new(kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(width: usize, height: usize) -> Encoder2dConfig {
        Encoder2dConfig {
            kind: MapKind::Geometry,
            width,
            height,
            input_format: "YUV420".into(),
            preset: "ultrafast".into(),
            lossless: false,
            qp: Some(32),
            threads: 1,
            intra_period: 1,
            gop_size: 0,
            frame_count: 1,
        }
    }

    #[test]
    fn unconfigured_encoder_refuses_to_encode() {
        let mut encoder = FfmpegMapEncoder::new(MapKind::Geometry);
        assert!(encoder.encode_gof(&[&[]]).is_err());
    }

    #[test]
    fn wrong_frame_size_is_rejected_before_spawning() {
        let mut encoder = FfmpegMapEncoder::new(MapKind::Geometry);
        encoder.configure(&test_config(16, 16)).unwrap();
        let short = vec![0u8; 10];
        assert!(encoder.encode_gof(&[&short]).is_err());
    }

    #[test]
    fn non_yuv420_is_rejected_at_configure() {
        let mut encoder = FfmpegMapEncoder::new(MapKind::Attribute);
        let mut config = test_config(16, 16);
        config.input_format = "RGB".into();
        assert!(encoder.configure(&config).is_err());
    }

    #[test]
    fn unknown_backend_name_fails() {
        let factory = FfmpegEncoderFactory;
        assert!(factory.create("Kvazaar", MapKind::Occupancy).is_err());
    }
}
