pub mod cascade_detector;
pub mod configured_detector_factory;
pub mod haar_cascade;
pub mod math;
pub mod onnx_ssd_detector;
