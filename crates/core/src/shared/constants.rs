/// Upper bound on detector workers a single processor may run.
pub const MAX_WORKER_COUNT: usize = 10;

/// Capacity of the pending-path queue between the directory walk and the workers.
pub const MAX_POOL_SIZE: usize = 1000;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const DEFAULT_WORKER_NUMBER: usize = 2;
pub const DEFAULT_DETECTOR_DESCRIPTION_FILE_NAME: &str = "haar_detector_description.json";
