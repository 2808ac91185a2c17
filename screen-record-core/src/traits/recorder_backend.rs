use crate::models::error::RecordError;
use crate::traits::gpu_device::GpuDevice;
use crate::traits::hardware_encoder::HardwareEncoder;

/// Supplies the platform GPU device and encoder for each recording session.
pub trait RecorderBackend: Send + Sync + 'static {
    type Device: GpuDevice + 'static;
    type Encoder: HardwareEncoder + 'static;

    /// A fresh, unconfigured encoder. Called on the session thread.
    fn create_encoder(&self) -> Result<Self::Encoder, RecordError>;

    /// A fresh GPU device. Called on the render thread, which then owns it.
    fn create_device(&self) -> Result<Self::Device, RecordError>;
}
