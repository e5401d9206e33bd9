pub mod detection_error;
pub mod detector_config;
pub mod detector_factory;
pub mod object_detector;
