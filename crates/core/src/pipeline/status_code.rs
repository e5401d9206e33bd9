use std::fmt;

/// Aggregate outcome of a processor call.
///
/// Initialization codes live in `100..=106`, processing codes in
/// `200..=203`. Each band has its own success and catch-all codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusCode {
    InitSuccess = 100,
    InitUnexpectedError = 101,
    InitFilesNotFound = 102,
    InitBadSettingsFile = 103,
    InitBadDataFile = 104,
    InitIncorrectWorkerNumber = 105,
    InitDoubleInitialization = 106,

    ProcessSuccess = 200,
    ProcessUnexpectedError = 201,
    ProcessImageFolderNotFound = 202,
    ProcessUninitialized = 203,
}

impl StatusCode {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn is_success(self) -> bool {
        matches!(self, StatusCode::InitSuccess | StatusCode::ProcessSuccess)
    }

    fn description(self) -> &'static str {
        match self {
            StatusCode::InitSuccess => "initialized",
            StatusCode::InitUnexpectedError => "unexpected initialization error",
            StatusCode::InitFilesNotFound => "detector description not found",
            StatusCode::InitBadSettingsFile => "detector description is not valid JSON",
            StatusCode::InitBadDataFile => "detector could not be built from its description",
            StatusCode::InitIncorrectWorkerNumber => "incorrect worker number",
            StatusCode::InitDoubleInitialization => "already initialized",
            StatusCode::ProcessSuccess => "processed",
            StatusCode::ProcessUnexpectedError => "unexpected processing error",
            StatusCode::ProcessImageFolderNotFound => "image folder does not exist",
            StatusCode::ProcessUninitialized => "processor is not initialized",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}
