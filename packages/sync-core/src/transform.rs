//! Transform Applier (§4.6): fixes the crop → rotate → scale → box stage
//! ordering for a client's [`VideoTransform`]. Building the actual
//! sub-pipeline is the client's job (it owns the playback pipeline); this
//! module only decides which stages apply and in what order, so that
//! ordering is tested once instead of re-derived at every call site.

use crate::model::VideoTransform;

/// One stage of the insertable video-processing sub-pipeline, in the fixed
/// order the engine must apply them.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformStageOp {
    Crop(crate::model::CropTransform),
    Rotate(crate::model::RotateTransform),
    Scale(crate::model::ScaleTransform),
    Box(crate::model::BoxTransform),
}

/// Returns the ordered list of stages to insert before the video sink.
/// Absent stages are skipped; an empty transform yields an empty plan,
/// meaning no sub-pipeline at all is required.
pub fn plan(transform: &VideoTransform) -> Vec<TransformStageOp> {
    let mut stages = Vec::new();
    if let Some(crop) = transform.crop {
        stages.push(TransformStageOp::Crop(crop));
    }
    if let Some(rotate) = transform.rotate {
        stages.push(TransformStageOp::Rotate(rotate));
    }
    if let Some(scale) = transform.scale {
        stages.push(TransformStageOp::Scale(scale));
    }
    if let Some(offset) = transform.offset {
        stages.push(TransformStageOp::Box(offset));
    }
    stages
}
