pub mod detection_report;
pub mod processor;
pub mod status_code;
pub mod task_queue;
