//! Map encoding: hand the per-GOF map sequences to the external 2-D
//! video encoder. The codec itself lives outside the core, behind the
//! [`Map2dEncoder`] capability set; the core only builds the per-map
//! configuration and assembles the three bitstreams.

use crate::error::Error;
use crate::parameters::Parameters;
use crate::Gof;

/// Which of the three map streams an encoder instance handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    Occupancy,
    Geometry,
    Attribute,
}

impl MapKind {
    pub fn label(self) -> &'static str {
        match self {
            MapKind::Occupancy => "occupancy",
            MapKind::Geometry => "geometry",
            MapKind::Attribute => "attribute",
        }
    }
}

/// Everything the external encoder needs to open one map stream.
#[derive(Debug, Clone)]
pub struct Encoder2dConfig {
    pub kind: MapKind,
    pub width: usize,
    pub height: usize,
    /// Planar YUV420 input; the only supported format.
    pub input_format: String,
    pub preset: String,
    pub lossless: bool,
    /// Quantization parameter; `None` for the always-lossless occupancy.
    pub qp: Option<usize>,
    /// 0 lets the encoder pick the detected hardware concurrency.
    pub threads: usize,
    /// Intra period: 1 for all-intra single layer, 2 with a double
    /// layer, the configured period for random access.
    pub intra_period: usize,
    /// GOP length, 0 for all-intra.
    pub gop_size: usize,
    pub frame_count: usize,
}

/// Capability set of the external 2-D encoder collaborator.
pub trait Map2dEncoder: Send {
    fn configure(&mut self, config: &Encoder2dConfig) -> Result<(), Error>;

    /// Encode a sequence of planar YUV420 frames into one bitstream.
    fn encode_gof(&mut self, frames: &[&[u8]]) -> Result<Vec<u8>, Error>;
}

/// Resolves the encoder name from the parameter table (the tagged
/// selector) into a concrete implementation. The ffmpeg-backed one lives
/// in the `vpcc-video` crate.
pub trait Map2dEncoderFactory: Send + Sync {
    fn create(&self, name: &str, kind: MapKind) -> Result<Box<dyn Map2dEncoder>, Error>;
}

fn encoder_config(kind: MapKind, gof: &Gof, params: &Parameters) -> Result<Encoder2dConfig, Error> {
    let layers = if params.double_layer { 2 } else { 1 };
    let (width, height, frame_count) = match kind {
        MapKind::Occupancy => (
            params.map_width / params.occupancy_map_ds_resolution,
            gof.map_height_ds_gof,
            gof.frames.len(),
        ),
        _ => (
            params.map_width,
            gof.map_height_gof,
            gof.frames.len() * layers,
        ),
    };

    let (name_for_log, format, mode, preset, lossless, qp, threads) = match kind {
        MapKind::Occupancy => (
            &params.occupancy_encoder_name,
            &params.occupancy_encoding_format,
            &params.occupancy_encoding_mode,
            &params.occupancy_encoding_preset,
            params.occupancy_encoding_is_lossless,
            None,
            params.occupancy_encoding_nb_thread,
        ),
        MapKind::Geometry => (
            &params.geometry_encoder_name,
            &params.geometry_encoding_format,
            &params.geometry_encoding_mode,
            &params.geometry_encoding_preset,
            params.geometry_encoding_is_lossless,
            Some(params.geometry_encoding_qp),
            params.geometry_encoding_nb_thread,
        ),
        MapKind::Attribute => (
            &params.attribute_encoder_name,
            &params.attribute_encoding_format,
            &params.attribute_encoding_mode,
            &params.attribute_encoding_preset,
            params.attribute_encoding_is_lossless,
            Some(params.attribute_encoding_qp),
            params.attribute_encoding_nb_thread,
        ),
    };

    if kind == MapKind::Occupancy && !lossless {
        return Err(Error::MapEncoding(
            "only lossless encoding is supported for the occupancy map".into(),
        ));
    }
    if format != "YUV420" {
        return Err(Error::MapEncoding(format!(
            "{name_for_log}: only YUV420 input is supported for the {} map, got '{format}'",
            kind.label()
        )));
    }

    let (intra_period, gop_size) = match mode.as_str() {
        "AI" => {
            // All-intra: with a double layer the two layers of one frame
            // still share a prediction pair.
            let period = if kind != MapKind::Occupancy && params.double_layer {
                2
            } else {
                1
            };
            (period, 0)
        }
        "RA" => (params.intra_frame_period, params.size_gop_2d_encoding),
        other => {
            return Err(Error::MapEncoding(format!(
                "unknown {} map encoding mode '{other}', only AI and RA are available",
                kind.label()
            )))
        }
    };

    Ok(Encoder2dConfig {
        kind,
        width,
        height,
        input_format: format.clone(),
        preset: preset.clone(),
        lossless,
        qp,
        threads,
        intra_period,
        gop_size,
        frame_count,
    })
}

fn map_list<'a>(gof: &'a Gof, kind: MapKind, double_layer: bool) -> Vec<&'a [u8]> {
    let mut maps: Vec<&[u8]> = Vec::with_capacity(gof.frames.len() * 2);
    for frame in &gof.frames {
        match kind {
            MapKind::Occupancy => maps.push(&frame.occupancy_map_ds),
            MapKind::Geometry => {
                maps.push(&frame.geometry_map_l1);
                if double_layer {
                    maps.push(&frame.geometry_map_l2);
                }
            }
            MapKind::Attribute => {
                maps.push(&frame.attribute_map_l1);
                if double_layer {
                    maps.push(&frame.attribute_map_l2);
                }
            }
        }
    }
    maps
}

fn encoder_name(kind: MapKind, params: &Parameters) -> &str {
    match kind {
        MapKind::Occupancy => &params.occupancy_encoder_name,
        MapKind::Geometry => &params.geometry_encoder_name,
        MapKind::Attribute => &params.attribute_encoder_name,
    }
}

/// Encode the three map streams of a GOF, filling its bitstream buffers.
pub(crate) fn encode_gof_maps(
    gof: &mut Gof,
    params: &Parameters,
    factory: &dyn Map2dEncoderFactory,
) -> Result<(), Error> {
    log::trace!(target: "MAP ENCODING", "encode maps of GOF {}", gof.gof_id);

    for kind in [MapKind::Occupancy, MapKind::Geometry, MapKind::Attribute] {
        let config = encoder_config(kind, gof, params)?;
        let mut encoder = factory.create(encoder_name(kind, params), kind)?;
        encoder.configure(&config)?;
        let maps = map_list(gof, kind, params.double_layer);
        let bitstream = encoder.encode_gof(&maps)?;
        match kind {
            MapKind::Occupancy => gof.bitstream_occupancy = bitstream,
            MapKind::Geometry => gof.bitstream_geometry = bitstream,
            MapKind::Attribute => gof.bitstream_attribute = bitstream,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Frame;

    fn gof_with_two_frames() -> Gof {
        let mut gof = Gof::default();
        gof.map_height_gof = 32;
        gof.map_height_ds_gof = 16;
        for frame_id in 0..2 {
            let mut frame = Frame::default();
            frame.frame_id = frame_id;
            frame.occupancy_map_ds = vec![0; 8];
            frame.geometry_map_l1 = vec![1; 8];
            frame.geometry_map_l2 = vec![2; 8];
            frame.attribute_map_l1 = vec![3; 8];
            frame.attribute_map_l2 = vec![4; 8];
            gof.frames.push(frame);
        }
        gof
    }

    #[test]
    fn double_layer_interleaves_l1_and_l2() {
        let gof = gof_with_two_frames();
        let maps = map_list(&gof, MapKind::Geometry, true);
        assert_eq!(maps.len(), 4);
        assert_eq!(maps[0][0], 1);
        assert_eq!(maps[1][0], 2);
        assert_eq!(maps[2][0], 1);
        assert_eq!(maps[3][0], 2);
    }

    #[test]
    fn occupancy_config_uses_downscaled_dimensions() {
        let gof = gof_with_two_frames();
        let mut params = Parameters::default();
        params.map_width = 64;
        params.occupancy_map_ds_resolution = 2;
        let config = encoder_config(MapKind::Occupancy, &gof, &params).unwrap();
        assert_eq!(config.width, 32);
        assert_eq!(config.height, 16);
        assert_eq!(config.frame_count, 2);
        assert!(config.lossless);
        assert!(config.qp.is_none());
    }

    #[test]
    fn all_intra_double_layer_uses_period_two() {
        let gof = gof_with_two_frames();
        let mut params = Parameters::default();
        params.double_layer = true;
        let geometry = encoder_config(MapKind::Geometry, &gof, &params).unwrap();
        assert_eq!(geometry.intra_period, 2);
        assert_eq!(geometry.gop_size, 0);
        let occupancy = encoder_config(MapKind::Occupancy, &gof, &params).unwrap();
        assert_eq!(occupancy.intra_period, 1);
    }

    #[test]
    fn lossy_occupancy_is_rejected() {
        let gof = gof_with_two_frames();
        let mut params = Parameters::default();
        params.occupancy_encoding_is_lossless = false;
        assert!(encoder_config(MapKind::Occupancy, &gof, &params).is_err());
    }
}
