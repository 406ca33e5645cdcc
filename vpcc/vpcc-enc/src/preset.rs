//! Preset tables pre-populating most tuning parameters from `presetName`
//! and the input geometry bit depth.

use crate::error::Error;
use crate::parameters::{Parameters, PresetName};

type Preset = &'static [(&'static str, &'static str)];

const PRESET_VOX9_FAST: Preset = &[
    ("sizeGOF", "16"),
    ("geoBitDepthVoxelized", "8"),
    ("normalComputationKnnCount", "6"),
    ("normalComputationMaxDiagonalStep", "4"),
    ("geoBitDepthRefineSegmentation", "7"),
    ("refineSegmentationMaxNNVoxelDistanceLUT", "2"),
    ("refineSegmentationMaxNNTotalPointCount", "32"),
    ("refineSegmentationLambda", "3.5"),
    ("refineSegmentationIterationCount", "3"),
    ("slicingRefineSegmentationMaxNNVoxelDistanceLUT", "2"),
    ("slicingRefineSegmentationMaxNNTotalPointCount", "12"),
    ("slicingRefineSegmentationLambda", "3.5"),
    ("slicingRefineSegmentationIterationCount", "1"),
    ("minPointCountPerCC", "16"),
    ("mapWidth", "608"),
    ("minimumMapHeight", "608"),
    ("omRefinementTreshold2", "1"),
    ("omRefinementTreshold4", "2"),
    ("sizeGOP2DEncoding", "16"),
    ("occupancyEncodingPreset", "ultrafast"),
    ("geometryEncodingPreset", "fast"),
    ("attributeEncodingPreset", "ultrafast"),
];

const PRESET_VOX9_SLOW: Preset = &[
    ("sizeGOF", "8"),
    ("geoBitDepthVoxelized", "9"),
    ("normalComputationKnnCount", "12"),
    ("normalComputationMaxDiagonalStep", "8"),
    ("geoBitDepthRefineSegmentation", "8"),
    ("refineSegmentationMaxNNVoxelDistanceLUT", "9"),
    ("refineSegmentationMaxNNTotalPointCount", "256"),
    ("refineSegmentationLambda", "3"),
    ("refineSegmentationIterationCount", "15"),
    ("slicingRefineSegmentationMaxNNVoxelDistanceLUT", "4"),
    ("slicingRefineSegmentationMaxNNTotalPointCount", "132"),
    ("slicingRefineSegmentationLambda", "5"),
    ("slicingRefineSegmentationIterationCount", "10"),
    ("minPointCountPerCC", "5"),
    ("mapWidth", "608"),
    ("minimumMapHeight", "608"),
    ("omRefinementTreshold2", "1"),
    ("omRefinementTreshold4", "2"),
    ("sizeGOP2DEncoding", "8"),
    ("occupancyEncodingPreset", "veryslow"),
    ("geometryEncodingPreset", "veryslow"),
    ("attributeEncodingPreset", "veryslow"),
];

const PRESET_VOX10_FAST: Preset = &[
    ("sizeGOF", "16"),
    ("geoBitDepthVoxelized", "9"),
    ("normalComputationKnnCount", "6"),
    ("normalComputationMaxDiagonalStep", "4"),
    ("geoBitDepthRefineSegmentation", "8"),
    ("refineSegmentationMaxNNVoxelDistanceLUT", "2"),
    ("refineSegmentationMaxNNTotalPointCount", "32"),
    ("refineSegmentationLambda", "3.5"),
    ("refineSegmentationIterationCount", "3"),
    ("slicingRefineSegmentationMaxNNVoxelDistanceLUT", "2"),
    ("slicingRefineSegmentationMaxNNTotalPointCount", "16"),
    ("slicingRefineSegmentationLambda", "4"),
    ("slicingRefineSegmentationIterationCount", "2"),
    ("minPointCountPerCC", "16"),
    ("mapWidth", "1024"),
    ("minimumMapHeight", "1024"),
    ("omRefinementTreshold2", "1"),
    ("omRefinementTreshold4", "1"),
    ("sizeGOP2DEncoding", "16"),
    ("occupancyEncodingPreset", "ultrafast"),
    ("geometryEncodingPreset", "fast"),
    ("attributeEncodingPreset", "ultrafast"),
];

const PRESET_VOX10_SLOW: Preset = &[
    ("sizeGOF", "16"),
    ("geoBitDepthVoxelized", "10"),
    ("normalComputationKnnCount", "12"),
    ("normalComputationMaxDiagonalStep", "8"),
    ("geoBitDepthRefineSegmentation", "9"),
    ("refineSegmentationMaxNNVoxelDistanceLUT", "9"),
    ("refineSegmentationMaxNNTotalPointCount", "256"),
    ("refineSegmentationLambda", "3.0"),
    ("refineSegmentationIterationCount", "15"),
    ("slicingRefineSegmentationMaxNNVoxelDistanceLUT", "6"),
    ("slicingRefineSegmentationMaxNNTotalPointCount", "132"),
    ("slicingRefineSegmentationLambda", "5"),
    ("slicingRefineSegmentationIterationCount", "10"),
    ("minPointCountPerCC", "5"),
    ("mapWidth", "1024"),
    ("minimumMapHeight", "1024"),
    ("omRefinementTreshold2", "1"),
    ("omRefinementTreshold4", "1"),
    ("sizeGOP2DEncoding", "8"),
    ("occupancyEncodingPreset", "veryslow"),
    ("geometryEncodingPreset", "veryslow"),
    ("attributeEncodingPreset", "veryslow"),
];

const PRESET_VOX11_FAST: Preset = &[
    ("sizeGOF", "16"),
    ("geoBitDepthVoxelized", "10"),
    ("normalComputationKnnCount", "6"),
    ("normalComputationMaxDiagonalStep", "8"),
    ("geoBitDepthRefineSegmentation", "9"),
    ("refineSegmentationMaxNNVoxelDistanceLUT", "4"),
    ("refineSegmentationMaxNNTotalPointCount", "128"),
    ("refineSegmentationLambda", "3.0"),
    ("refineSegmentationIterationCount", "4"),
    ("slicingRefineSegmentationMaxNNVoxelDistanceLUT", "4"),
    ("slicingRefineSegmentationMaxNNTotalPointCount", "128"),
    ("slicingRefineSegmentationLambda", "3.0"),
    ("slicingRefineSegmentationIterationCount", "4"),
    ("minPointCountPerCC", "16"),
    ("mapWidth", "2048"),
    ("minimumMapHeight", "2048"),
    ("omRefinementTreshold2", "1"),
    ("omRefinementTreshold4", "1"),
    ("sizeGOP2DEncoding", "16"),
    ("occupancyEncodingPreset", "ultrafast"),
    ("geometryEncodingPreset", "fast"),
    ("attributeEncodingPreset", "ultrafast"),
];

const PRESET_VOX11_SLOW: Preset = &[
    ("sizeGOF", "16"),
    ("geoBitDepthVoxelized", "10"),
    ("normalComputationKnnCount", "6"),
    ("normalComputationMaxDiagonalStep", "8"),
    ("geoBitDepthRefineSegmentation", "9"),
    ("refineSegmentationMaxNNVoxelDistanceLUT", "4"),
    ("refineSegmentationMaxNNTotalPointCount", "128"),
    ("refineSegmentationLambda", "3.0"),
    ("refineSegmentationIterationCount", "4"),
    ("slicingRefineSegmentationMaxNNVoxelDistanceLUT", "4"),
    ("slicingRefineSegmentationMaxNNTotalPointCount", "128"),
    ("slicingRefineSegmentationLambda", "3.0"),
    ("slicingRefineSegmentationIterationCount", "4"),
    ("minPointCountPerCC", "16"),
    ("mapWidth", "2048"),
    ("minimumMapHeight", "2048"),
    ("omRefinementTreshold2", "1"),
    ("omRefinementTreshold4", "1"),
    ("sizeGOP2DEncoding", "8"),
    ("occupancyEncodingPreset", "veryslow"),
    ("geometryEncodingPreset", "veryslow"),
    ("attributeEncodingPreset", "veryslow"),
];

fn set_preset_values(params: &mut Parameters, preset: Preset) -> Result<(), Error> {
    for (key, value) in preset {
        if params.is_user_set(key) {
            log::info!(target: "API", "user value for '{key}' keeps precedence over the preset");
            continue;
        }
        params.set_value(key, value, true)?;
    }
    Ok(())
}

fn set_preset_pair(params: &mut Parameters, key: &str, value: &str) -> Result<(), Error> {
    if params.is_user_set(key) {
        return Ok(());
    }
    params.set_value(key, value, true)
}

/// Populate parameters from the preset tables, selected by `presetName`
/// and `geoBitDepthInput`. Bit depths 9-11 use their own tables; anything
/// else extrapolates from the nearest one.
pub(crate) fn apply_preset(params: &mut Parameters) -> Result<(), Error> {
    let depth = params.geo_bit_depth_input;
    if depth < 3 {
        return Err(Error::Precondition(format!(
            "geoBitDepthInput ({depth}) is too small to derive a preset"
        )));
    }
    let fast = params.preset_name == PresetName::Fast;

    match depth {
        9 => set_preset_values(params, if fast { PRESET_VOX9_FAST } else { PRESET_VOX9_SLOW }),
        10 => set_preset_values(
            params,
            if fast { PRESET_VOX10_FAST } else { PRESET_VOX10_SLOW },
        ),
        11 => set_preset_values(
            params,
            if fast { PRESET_VOX11_FAST } else { PRESET_VOX11_SLOW },
        ),
        d if d < 9 => {
            if fast {
                set_preset_values(params, PRESET_VOX9_FAST)?;
                set_preset_pair(params, "geoBitDepthVoxelized", &(d - 1).to_string())?;
                set_preset_pair(params, "geoBitDepthRefineSegmentation", &(d - 2).to_string())?;
            } else {
                set_preset_values(params, PRESET_VOX9_SLOW)?;
                set_preset_pair(params, "geoBitDepthVoxelized", &d.to_string())?;
                set_preset_pair(params, "geoBitDepthRefineSegmentation", &(d - 1).to_string())?;
            }
            log::warn!(target: "API",
                "input bit depth {d} has no tuned preset; extrapolating from the vox9 tables");
            Ok(())
        }
        d => {
            if fast {
                set_preset_values(params, PRESET_VOX11_FAST)?;
                set_preset_pair(params, "geoBitDepthVoxelized", &(d - 1).to_string())?;
                set_preset_pair(params, "geoBitDepthRefineSegmentation", &(d - 2).to_string())?;
            } else {
                set_preset_values(params, PRESET_VOX11_SLOW)?;
                set_preset_pair(params, "geoBitDepthVoxelized", &d.to_string())?;
                set_preset_pair(params, "geoBitDepthRefineSegmentation", &(d - 1).to_string())?;
            }
            let scaled = ((1 + d - 11) * 2048).to_string();
            set_preset_pair(params, "mapWidth", &scaled)?;
            set_preset_pair(params, "minimumMapHeight", &scaled)?;
            log::warn!(target: "API",
                "input bit depth {d} has no tuned preset; extrapolating from the vox11 tables");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_preset_populates_vox10_values() {
        let mut params = Parameters::new();
        params.set("geoBitDepthInput", "10").unwrap();
        params.set("presetName", "fast").unwrap();
        apply_preset(&mut params).unwrap();
        assert_eq!(params.geo_bit_depth_voxelized, 9);
        assert_eq!(params.map_width, 1024);
        assert_eq!(params.refine_segmentation_iteration_count, 3);
        assert_eq!(params.occupancy_encoding_preset, "ultrafast");
        params.validate().unwrap();
    }

    #[test]
    fn user_value_wins_over_preset() {
        let mut params = Parameters::new();
        params.set("geoBitDepthInput", "10").unwrap();
        params.set("minPointCountPerCC", "3").unwrap();
        apply_preset(&mut params).unwrap();
        assert_eq!(params.min_point_count_per_cc, 3);
    }

    #[test]
    fn small_bit_depth_extrapolates() {
        let mut params = Parameters::new();
        params.set("geoBitDepthInput", "8").unwrap();
        params.set("presetName", "fast").unwrap();
        apply_preset(&mut params).unwrap();
        assert_eq!(params.geo_bit_depth_voxelized, 7);
        assert_eq!(params.geo_bit_depth_refine_segmentation, 6);
        params.validate().unwrap();
    }

    #[test]
    fn large_bit_depth_scales_map_dimensions() {
        let mut params = Parameters::new();
        params.set("geoBitDepthInput", "12").unwrap();
        params.set("presetName", "slow").unwrap();
        apply_preset(&mut params).unwrap();
        assert_eq!(params.map_width, 4096);
        assert_eq!(params.geo_bit_depth_voxelized, 12);
        params.validate().unwrap();
    }
}
