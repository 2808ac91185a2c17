pub mod capture_provider;
pub mod exporter;
pub mod gpu_device;
pub mod hardware_encoder;
pub mod recorder_backend;
pub mod session_delegate;
