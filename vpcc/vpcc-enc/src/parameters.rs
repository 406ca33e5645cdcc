//! Encoder configuration: one typed table, mutated only through
//! [`Parameters::set`] with string values, then frozen for the lifetime of
//! an encoder instance.

use fxhash::FxHashSet;

use crate::error::Error;

/// Background fill algorithm for the attribute maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeBgFill {
    #[default]
    PatchExtension,
    Bbpe,
    PushPull,
    None,
}

/// Speed/quality preset family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresetName {
    #[default]
    Fast,
    Slow,
}

/// Configuration of the encoder.
///
/// Defaults below are the values not covered by presets. Use
/// [`Parameters::set`] rather than mutating fields so that validation and
/// preset precedence apply.
#[derive(Debug, Clone)]
pub struct Parameters {
    // General
    pub geo_bit_depth_input: usize,
    pub preset_name: PresetName,
    pub size_gof: usize,
    pub max_concurrent_frames: usize,
    pub double_layer: bool,
    pub errors_are_fatal: bool,
    pub log_level: String,

    // Debug / side channels (stored for outer layers; the core does no I/O)
    pub export_intermediate_maps: bool,
    pub export_intermediate_point_clouds: bool,
    pub export_intermediate_files: bool,
    pub export_statistics: bool,

    // Voxelization
    pub geo_bit_depth_voxelized: usize,

    // KNN
    pub kd_tree_max_leaf_size: usize,
    pub normal_computation_knn_count: usize,
    pub normal_computation_max_diagonal_step: usize,
    pub normal_orientation_knn_count: usize,

    // Refine segmentation (normal path)
    pub geo_bit_depth_refine_segmentation: usize,
    pub refine_segmentation_max_nn_voxel_distance_lut: usize,
    pub refine_segmentation_max_nn_total_point_count: usize,
    pub refine_segmentation_lambda: f64,
    pub refine_segmentation_iteration_count: usize,

    // Refine segmentation (slicing path)
    pub activate_slicing: bool,
    pub slicing_refine_segmentation_max_nn_voxel_distance_lut: usize,
    pub slicing_refine_segmentation_max_nn_total_point_count: usize,
    pub slicing_refine_segmentation_lambda: f64,
    pub slicing_refine_segmentation_iteration_count: usize,

    // Patch segmentation
    pub max_allowed_dist2_raw_points_detection: usize,
    pub min_point_count_per_cc: usize,
    pub max_nn_count_patch_segmentation: usize,
    pub patch_segmentation_max_propagation_distance: usize,
    pub enable_patch_splitting: bool,
    pub max_patch_size: usize,
    pub min_level: usize,
    pub surface_thickness: usize,

    // Atlas / packing
    pub map_width: usize,
    pub minimum_map_height: usize,
    pub dynamic_map_height: bool,

    // Occupancy downscaling
    pub occupancy_map_ds_resolution: usize,
    pub om_refinement_treshold2: usize,
    pub om_refinement_treshold4: usize,

    // Map generation
    pub map_generation_fill_empty_block: bool,
    pub map_generation_background_value_attribute: u8,
    pub map_generation_background_value_geometry: u8,
    pub attribute_bg_fill: AttributeBgFill,
    pub block_size_bbpe: usize,
    pub use_reference_color_conversion: bool,

    // 2-D encoding
    pub size_gop_2d_encoding: usize,
    pub intra_frame_period: usize,

    pub occupancy_encoder_name: String,
    pub occupancy_encoding_is_lossless: bool,
    pub occupancy_encoding_mode: String,
    pub occupancy_encoding_format: String,
    pub occupancy_encoding_nb_thread: usize,
    pub occupancy_encoding_preset: String,

    pub geometry_encoder_name: String,
    pub geometry_encoding_is_lossless: bool,
    pub geometry_encoding_mode: String,
    pub geometry_encoding_format: String,
    pub geometry_encoding_nb_thread: usize,
    pub geometry_encoding_qp: usize,
    pub geometry_encoding_preset: String,

    pub attribute_encoder_name: String,
    pub attribute_encoding_is_lossless: bool,
    pub attribute_encoding_mode: String,
    pub attribute_encoding_format: String,
    pub attribute_encoding_nb_thread: usize,
    pub attribute_encoding_qp: usize,
    pub attribute_encoding_preset: String,

    /// Keys the user set explicitly; presets never override these.
    user_set: FxHashSet<&'static str>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            geo_bit_depth_input: 10,
            preset_name: PresetName::Fast,
            size_gof: 16,
            max_concurrent_frames: 4,
            double_layer: true,
            errors_are_fatal: true,
            log_level: "INFO".into(),

            export_intermediate_maps: false,
            export_intermediate_point_clouds: false,
            export_intermediate_files: false,
            export_statistics: false,

            geo_bit_depth_voxelized: 9,

            kd_tree_max_leaf_size: 10,
            normal_computation_knn_count: 6,
            normal_computation_max_diagonal_step: 4,
            normal_orientation_knn_count: 4,

            geo_bit_depth_refine_segmentation: 8,
            refine_segmentation_max_nn_voxel_distance_lut: 2,
            refine_segmentation_max_nn_total_point_count: 32,
            refine_segmentation_lambda: 3.5,
            refine_segmentation_iteration_count: 3,

            activate_slicing: false,
            slicing_refine_segmentation_max_nn_voxel_distance_lut: 2,
            slicing_refine_segmentation_max_nn_total_point_count: 16,
            slicing_refine_segmentation_lambda: 4.0,
            slicing_refine_segmentation_iteration_count: 2,

            max_allowed_dist2_raw_points_detection: 5,
            min_point_count_per_cc: 16,
            max_nn_count_patch_segmentation: 5,
            patch_segmentation_max_propagation_distance: 3,
            enable_patch_splitting: true,
            max_patch_size: 1024,
            min_level: 64,
            surface_thickness: 4,

            map_width: 1024,
            minimum_map_height: 1024,
            dynamic_map_height: true,

            occupancy_map_ds_resolution: 2,
            om_refinement_treshold2: 1,
            om_refinement_treshold4: 1,

            map_generation_fill_empty_block: true,
            map_generation_background_value_attribute: 128,
            map_generation_background_value_geometry: 128,
            attribute_bg_fill: AttributeBgFill::PatchExtension,
            block_size_bbpe: 16,
            use_reference_color_conversion: false,

            size_gop_2d_encoding: 16,
            intra_frame_period: 64,

            occupancy_encoder_name: "ffmpeg".into(),
            occupancy_encoding_is_lossless: true,
            occupancy_encoding_mode: "AI".into(),
            occupancy_encoding_format: "YUV420".into(),
            occupancy_encoding_nb_thread: 0,
            occupancy_encoding_preset: "ultrafast".into(),

            geometry_encoder_name: "ffmpeg".into(),
            geometry_encoding_is_lossless: false,
            geometry_encoding_mode: "AI".into(),
            geometry_encoding_format: "YUV420".into(),
            geometry_encoding_nb_thread: 0,
            geometry_encoding_qp: 32,
            geometry_encoding_preset: "fast".into(),

            attribute_encoder_name: "ffmpeg".into(),
            attribute_encoding_is_lossless: false,
            attribute_encoding_mode: "AI".into(),
            attribute_encoding_format: "YUV420".into(),
            attribute_encoding_nb_thread: 0,
            attribute_encoding_qp: 32,
            attribute_encoding_preset: "ultrafast".into(),

            user_set: FxHashSet::default(),
        }
    }
}

/// Every recognized key, used for suggestion lookups.
const PARAMETER_NAMES: &[&str] = &[
    "geoBitDepthInput",
    "presetName",
    "sizeGOF",
    "maxConcurrentFrames",
    "doubleLayer",
    "errorsAreFatal",
    "logLevel",
    "exportIntermediateMaps",
    "exportIntermediatePointClouds",
    "exportIntermediateFiles",
    "exportStatistics",
    "geoBitDepthVoxelized",
    "kdTreeMaxLeafSize",
    "normalComputationKnnCount",
    "normalComputationMaxDiagonalStep",
    "normalOrientationKnnCount",
    "geoBitDepthRefineSegmentation",
    "refineSegmentationMaxNNVoxelDistanceLUT",
    "refineSegmentationMaxNNTotalPointCount",
    "refineSegmentationLambda",
    "refineSegmentationIterationCount",
    "activateSlicing",
    "slicingRefineSegmentationMaxNNVoxelDistanceLUT",
    "slicingRefineSegmentationMaxNNTotalPointCount",
    "slicingRefineSegmentationLambda",
    "slicingRefineSegmentationIterationCount",
    "maxAllowedDist2RawPointsDetection",
    "minPointCountPerCC",
    "maxNNCountPatchSegmentation",
    "patchSegmentationMaxPropagationDistance",
    "enablePatchSplitting",
    "maxPatchSize",
    "minLevel",
    "surfaceThickness",
    "mapWidth",
    "minimumMapHeight",
    "dynamicMapHeight",
    "occupancyMapDSResolution",
    "omRefinementTreshold2",
    "omRefinementTreshold4",
    "mapGenerationFillEmptyBlock",
    "mapGenerationBackgroundValueAttribute",
    "mapGenerationBackgroundValueGeometry",
    "attributeBgFill",
    "blockSizeBBPE",
    "useReferenceColorConversion",
    "sizeGOP2DEncoding",
    "intraFramePeriod",
    "occupancyEncoderName",
    "occupancyEncodingIsLossless",
    "occupancyEncodingMode",
    "occupancyEncodingFormat",
    "occupancyEncodingNbThread",
    "occupancyEncodingPreset",
    "geometryEncoderName",
    "geometryEncodingIsLossless",
    "geometryEncodingMode",
    "geometryEncodingFormat",
    "geometryEncodingNbThread",
    "geometryEncodingQp",
    "geometryEncodingPreset",
    "attributeEncoderName",
    "attributeEncodingIsLossless",
    "attributeEncodingMode",
    "attributeEncodingFormat",
    "attributeEncodingNbThread",
    "attributeEncodingQp",
    "attributeEncodingPreset",
];

fn parse_usize(name: &str, value: &str) -> Result<usize, Error> {
    value.parse().map_err(|_| Error::InvalidParameterValue {
        name: name.into(),
        value: value.into(),
        reason: "expected an unsigned integer".into(),
    })
}

fn parse_u8(name: &str, value: &str) -> Result<u8, Error> {
    value.parse().map_err(|_| Error::InvalidParameterValue {
        name: name.into(),
        value: value.into(),
        reason: "expected an integer in 0..=255".into(),
    })
}

fn parse_f64(name: &str, value: &str) -> Result<f64, Error> {
    value.parse().map_err(|_| Error::InvalidParameterValue {
        name: name.into(),
        value: value.into(),
        reason: "expected a number".into(),
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "True" | "1" => Ok(true),
        "false" | "False" | "0" => Ok(false),
        _ => Err(Error::InvalidParameterValue {
            name: name.into(),
            value: value.into(),
            reason: "expected one of [true, false, 1, 0]".into(),
        }),
    }
}

fn parse_choice(name: &str, value: &str, choices: &[&str]) -> Result<String, Error> {
    if choices.contains(&value) {
        Ok(value.into())
    } else {
        Err(Error::InvalidParameterValue {
            name: name.into(),
            value: value.into(),
            reason: format!("accepted values are [{}]", choices.join(",")),
        })
    }
}

const ENCODING_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
];

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest known key by edit distance, for configuration diagnostics.
pub(crate) fn closest_parameter_name(input: &str) -> &'static str {
    PARAMETER_NAMES
        .iter()
        .min_by_key(|candidate| levenshtein(input, candidate))
        .copied()
        .unwrap_or("")
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter from its string form, as an explicit user choice.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.set_value(name, value, false)
    }

    /// True when the user explicitly set `key` (presets must not override).
    pub(crate) fn is_user_set(&self, key: &str) -> bool {
        self.user_set.contains(key)
    }

    pub(crate) fn set_value(
        &mut self,
        name: &str,
        value: &str,
        from_preset: bool,
    ) -> Result<(), Error> {
        log::debug!(target: "API", "set parameter {name} -> {value}");
        if value.is_empty() {
            return Err(Error::InvalidParameterValue {
                name: name.into(),
                value: value.into(),
                reason: "empty value".into(),
            });
        }

        match name {
            "geoBitDepthInput" => self.geo_bit_depth_input = parse_usize(name, value)?,
            "presetName" => {
                self.preset_name = match value {
                    "fast" => PresetName::Fast,
                    "slow" => PresetName::Slow,
                    _ => {
                        return Err(Error::InvalidParameterValue {
                            name: name.into(),
                            value: value.into(),
                            reason: "accepted values are [fast,slow]".into(),
                        })
                    }
                }
            }
            "sizeGOF" => self.size_gof = parse_usize(name, value)?,
            "maxConcurrentFrames" => self.max_concurrent_frames = parse_usize(name, value)?,
            "doubleLayer" => self.double_layer = parse_bool(name, value)?,
            "errorsAreFatal" => self.errors_are_fatal = parse_bool(name, value)?,
            "logLevel" => {
                self.log_level = parse_choice(
                    name,
                    value,
                    &["TRACE", "DEBUG", "INFO", "WARNING", "ERROR", "FATAL"],
                )?
            }
            "exportIntermediateMaps" => self.export_intermediate_maps = parse_bool(name, value)?,
            "exportIntermediatePointClouds" => {
                self.export_intermediate_point_clouds = parse_bool(name, value)?
            }
            "exportIntermediateFiles" => self.export_intermediate_files = parse_bool(name, value)?,
            "exportStatistics" => self.export_statistics = parse_bool(name, value)?,
            "geoBitDepthVoxelized" => self.geo_bit_depth_voxelized = parse_usize(name, value)?,
            "kdTreeMaxLeafSize" => self.kd_tree_max_leaf_size = parse_usize(name, value)?,
            "normalComputationKnnCount" => {
                self.normal_computation_knn_count = parse_usize(name, value)?
            }
            "normalComputationMaxDiagonalStep" => {
                self.normal_computation_max_diagonal_step = parse_usize(name, value)?
            }
            "normalOrientationKnnCount" => {
                self.normal_orientation_knn_count = parse_usize(name, value)?
            }
            "geoBitDepthRefineSegmentation" => {
                self.geo_bit_depth_refine_segmentation = parse_usize(name, value)?
            }
            "refineSegmentationMaxNNVoxelDistanceLUT" => {
                self.refine_segmentation_max_nn_voxel_distance_lut = parse_usize(name, value)?
            }
            "refineSegmentationMaxNNTotalPointCount" => {
                self.refine_segmentation_max_nn_total_point_count = parse_usize(name, value)?
            }
            "refineSegmentationLambda" => self.refine_segmentation_lambda = parse_f64(name, value)?,
            "refineSegmentationIterationCount" => {
                self.refine_segmentation_iteration_count = parse_usize(name, value)?
            }
            "activateSlicing" => self.activate_slicing = parse_bool(name, value)?,
            "slicingRefineSegmentationMaxNNVoxelDistanceLUT" => {
                self.slicing_refine_segmentation_max_nn_voxel_distance_lut =
                    parse_usize(name, value)?
            }
            "slicingRefineSegmentationMaxNNTotalPointCount" => {
                self.slicing_refine_segmentation_max_nn_total_point_count =
                    parse_usize(name, value)?
            }
            "slicingRefineSegmentationLambda" => {
                self.slicing_refine_segmentation_lambda = parse_f64(name, value)?
            }
            "slicingRefineSegmentationIterationCount" => {
                self.slicing_refine_segmentation_iteration_count = parse_usize(name, value)?
            }
            "maxAllowedDist2RawPointsDetection" => {
                self.max_allowed_dist2_raw_points_detection = parse_usize(name, value)?
            }
            "minPointCountPerCC" => self.min_point_count_per_cc = parse_usize(name, value)?,
            "maxNNCountPatchSegmentation" => {
                self.max_nn_count_patch_segmentation = parse_usize(name, value)?
            }
            "patchSegmentationMaxPropagationDistance" => {
                self.patch_segmentation_max_propagation_distance = parse_usize(name, value)?
            }
            "enablePatchSplitting" => self.enable_patch_splitting = parse_bool(name, value)?,
            "maxPatchSize" => self.max_patch_size = parse_usize(name, value)?,
            "minLevel" => self.min_level = parse_usize(name, value)?,
            "surfaceThickness" => self.surface_thickness = parse_usize(name, value)?,
            "mapWidth" => self.map_width = parse_usize(name, value)?,
            "minimumMapHeight" => self.minimum_map_height = parse_usize(name, value)?,
            "dynamicMapHeight" => self.dynamic_map_height = parse_bool(name, value)?,
            "occupancyMapDSResolution" => {
                self.occupancy_map_ds_resolution = parse_usize(name, value)?
            }
            "omRefinementTreshold2" => self.om_refinement_treshold2 = parse_usize(name, value)?,
            "omRefinementTreshold4" => self.om_refinement_treshold4 = parse_usize(name, value)?,
            "mapGenerationFillEmptyBlock" => {
                self.map_generation_fill_empty_block = parse_bool(name, value)?
            }
            "mapGenerationBackgroundValueAttribute" => {
                self.map_generation_background_value_attribute = parse_u8(name, value)?
            }
            "mapGenerationBackgroundValueGeometry" => {
                self.map_generation_background_value_geometry = parse_u8(name, value)?
            }
            "attributeBgFill" => {
                self.attribute_bg_fill = match value {
                    "patchExtension" => AttributeBgFill::PatchExtension,
                    "bbpe" => AttributeBgFill::Bbpe,
                    "pushPull" => AttributeBgFill::PushPull,
                    "none" => AttributeBgFill::None,
                    _ => {
                        return Err(Error::InvalidParameterValue {
                            name: name.into(),
                            value: value.into(),
                            reason: "accepted values are [patchExtension,bbpe,pushPull,none]"
                                .into(),
                        })
                    }
                }
            }
            "blockSizeBBPE" => self.block_size_bbpe = parse_usize(name, value)?,
            "useReferenceColorConversion" => {
                self.use_reference_color_conversion = parse_bool(name, value)?
            }
            "sizeGOP2DEncoding" => self.size_gop_2d_encoding = parse_usize(name, value)?,
            "intraFramePeriod" => self.intra_frame_period = parse_usize(name, value)?,
            "occupancyEncoderName" => self.occupancy_encoder_name = value.into(),
            "occupancyEncodingIsLossless" => {
                self.occupancy_encoding_is_lossless = parse_bool(name, value)?
            }
            "occupancyEncodingMode" => {
                self.occupancy_encoding_mode = parse_choice(name, value, &["AI", "RA"])?
            }
            "occupancyEncodingFormat" => {
                self.occupancy_encoding_format = parse_choice(name, value, &["YUV420"])?
            }
            "occupancyEncodingNbThread" => {
                self.occupancy_encoding_nb_thread = parse_usize(name, value)?
            }
            "occupancyEncodingPreset" => {
                self.occupancy_encoding_preset = parse_choice(name, value, ENCODING_PRESETS)?
            }
            "geometryEncoderName" => self.geometry_encoder_name = value.into(),
            "geometryEncodingIsLossless" => {
                self.geometry_encoding_is_lossless = parse_bool(name, value)?
            }
            "geometryEncodingMode" => {
                self.geometry_encoding_mode = parse_choice(name, value, &["AI", "RA"])?
            }
            "geometryEncodingFormat" => {
                self.geometry_encoding_format = parse_choice(name, value, &["YUV420"])?
            }
            "geometryEncodingNbThread" => {
                self.geometry_encoding_nb_thread = parse_usize(name, value)?
            }
            "geometryEncodingQp" => self.geometry_encoding_qp = parse_usize(name, value)?,
            "geometryEncodingPreset" => {
                self.geometry_encoding_preset = parse_choice(name, value, ENCODING_PRESETS)?
            }
            "attributeEncoderName" => self.attribute_encoder_name = value.into(),
            "attributeEncodingIsLossless" => {
                self.attribute_encoding_is_lossless = parse_bool(name, value)?
            }
            "attributeEncodingMode" => {
                self.attribute_encoding_mode = parse_choice(name, value, &["AI", "RA"])?
            }
            "attributeEncodingFormat" => {
                self.attribute_encoding_format = parse_choice(name, value, &["YUV420"])?
            }
            "attributeEncodingNbThread" => {
                self.attribute_encoding_nb_thread = parse_usize(name, value)?
            }
            "attributeEncodingQp" => self.attribute_encoding_qp = parse_usize(name, value)?,
            "attributeEncodingPreset" => {
                self.attribute_encoding_preset = parse_choice(name, value, ENCODING_PRESETS)?
            }
            _ => {
                return Err(Error::UnknownParameter {
                    name: name.into(),
                    suggestion: closest_parameter_name(name).into(),
                })
            }
        }

        if !from_preset {
            // Leak-free: every accepted name is one of the static strings.
            let key = PARAMETER_NAMES
                .iter()
                .find(|k| **k == name)
                .expect("accepted names are registered");
            self.user_set.insert(key);
        }
        Ok(())
    }

    /// Check value ranges and cross-parameter preconditions. Run once at
    /// encoder initialization, after preset application.
    pub fn validate(&self) -> Result<(), Error> {
        if self.geo_bit_depth_voxelized > self.geo_bit_depth_input {
            return Err(Error::Precondition(format!(
                "geoBitDepthVoxelized ({}) must not exceed geoBitDepthInput ({})",
                self.geo_bit_depth_voxelized, self.geo_bit_depth_input
            )));
        }
        if self.geo_bit_depth_refine_segmentation > self.geo_bit_depth_voxelized {
            return Err(Error::Precondition(format!(
                "geoBitDepthRefineSegmentation ({}) must not exceed geoBitDepthVoxelized ({})",
                self.geo_bit_depth_refine_segmentation, self.geo_bit_depth_voxelized
            )));
        }
        if !matches!(self.occupancy_map_ds_resolution, 2 | 4) {
            return Err(Error::Precondition(format!(
                "occupancyMapDSResolution must be 2 or 4, got {}",
                self.occupancy_map_ds_resolution
            )));
        }
        if !matches!(self.size_gof, 8 | 16) {
            return Err(Error::Precondition(format!(
                "sizeGOF must be 8 or 16, got {}",
                self.size_gof
            )));
        }
        if !self.min_level.is_power_of_two() {
            return Err(Error::Precondition(format!(
                "minLevel must be a power of two, got {}",
                self.min_level
            )));
        }
        if self.patch_segmentation_max_propagation_distance > 9 {
            return Err(Error::Precondition(
                "patchSegmentationMaxPropagationDistance is a shell index in 0..=9".into(),
            ));
        }
        if self.max_allowed_dist2_raw_points_detection > 9 {
            return Err(Error::Precondition(
                "maxAllowedDist2RawPointsDetection is a shell index in 0..=9".into(),
            ));
        }
        if self.refine_segmentation_max_nn_voxel_distance_lut > 9
            || self.slicing_refine_segmentation_max_nn_voxel_distance_lut > 9
        {
            return Err(Error::Precondition(
                "refine segmentation LUT distances are shell indices in 0..=9".into(),
            ));
        }
        if !(1..=4).contains(&self.om_refinement_treshold2) {
            return Err(Error::Precondition(format!(
                "omRefinementTreshold2 must be in 1..=4, got {}",
                self.om_refinement_treshold2
            )));
        }
        if !(1..=16).contains(&self.om_refinement_treshold4) {
            return Err(Error::Precondition(format!(
                "omRefinementTreshold4 must be in 1..=16, got {}",
                self.om_refinement_treshold4
            )));
        }
        let r = self.occupancy_map_ds_resolution;
        if self.map_width == 0 || self.map_width % r != 0 {
            return Err(Error::Precondition(format!(
                "mapWidth ({}) must be a positive multiple of occupancyMapDSResolution ({r})",
                self.map_width
            )));
        }
        if self.minimum_map_height % (8 * r) != 0 {
            return Err(Error::Precondition(format!(
                "minimumMapHeight ({}) must be a multiple of {} (8 x downscale)",
                self.minimum_map_height,
                8 * r
            )));
        }
        if self.block_size_bbpe % r != 0 || self.block_size_bbpe == 0 {
            return Err(Error::Precondition(format!(
                "blockSizeBBPE ({}) must be a positive multiple of occupancyMapDSResolution ({r})",
                self.block_size_bbpe
            )));
        }
        if self.normal_computation_knn_count < 2 || self.normal_orientation_knn_count < 2 {
            return Err(Error::Precondition(
                "KNN counts must be at least 2 (the query point is its own first neighbor)".into(),
            ));
        }
        if self.max_concurrent_frames == 0 {
            return Err(Error::Precondition(
                "maxConcurrentFrames must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_suggests_closest() {
        let mut params = Parameters::new();
        let err = params.set("surfaceThicknes", "4").unwrap_err();
        match err {
            Error::UnknownParameter { suggestion, .. } => {
                assert_eq!(suggestion, "surfaceThickness");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let mut params = Parameters::new();
        assert!(params.set("sizeGOF", "many").is_err());
        assert!(params.set("doubleLayer", "maybe").is_err());
        assert!(params.set("attributeBgFill", "dilate").is_err());
        assert!(params.set("occupancyEncodingMode", "LD").is_err());
    }

    #[test]
    fn voxelized_depth_above_input_fails_validation() {
        let mut params = Parameters::new();
        params.set("geoBitDepthInput", "9").unwrap();
        params.set("geoBitDepthVoxelized", "10").unwrap();
        assert!(matches!(params.validate(), Err(Error::Precondition(_))));
    }

    #[test]
    fn downscale_resolution_must_be_2_or_4() {
        let mut params = Parameters::new();
        params.set("occupancyMapDSResolution", "3").unwrap();
        assert!(params.validate().is_err());
    }

    #[test]
    fn defaults_validate() {
        assert!(Parameters::new().validate().is_ok());
    }

    #[test]
    fn user_set_tracking() {
        let mut params = Parameters::new();
        assert!(!params.is_user_set("sizeGOF"));
        params.set("sizeGOF", "8").unwrap();
        assert!(params.is_user_set("sizeGOF"));
    }
}
