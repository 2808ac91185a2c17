use screen_record_core::models::error::RecordError;
use screen_record_core::traits::recorder_backend::RecorderBackend;

use crate::software_gpu::SoftwareGpu;
use crate::y4m_encoder::Y4mEncoder;

/// Pairs the CPU rasterizer with the `.y4m` file encoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareBackend;

impl RecorderBackend for SoftwareBackend {
    type Device = SoftwareGpu;
    type Encoder = Y4mEncoder;

    fn create_encoder(&self) -> Result<Y4mEncoder, RecordError> {
        Ok(Y4mEncoder::new())
    }

    fn create_device(&self) -> Result<SoftwareGpu, RecordError> {
        Ok(SoftwareGpu::new())
    }
}
