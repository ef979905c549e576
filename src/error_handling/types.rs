use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Raised when an uploaded entry cannot be flattened into a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The element at `index` of the batch was not a JSON object.
    MalformedRecord { index: usize, found: &'static str },
}

impl NormalizeError {
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizeError::MalformedRecord { .. } => "MalformedRecordError",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            NormalizeError::MalformedRecord { index, .. } => *index,
        }
    }
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::MalformedRecord { index, found } => write!(
                f,
                "Record {} is a JSON {}, expected an object",
                index, found
            ),
        }
    }
}

impl std::error::Error for NormalizeError {}

#[derive(Debug)]
pub enum StorageError {
    /// The backend could not be reached or initialized. Startup only.
    ConnectionFailed(String),
    /// A write was rejected; `index` points at the first failing record of a batch.
    WriteFailed { index: Option<usize>, reason: String },
    ReadFailed(String),
}

impl StorageError {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::ConnectionFailed(_) => "StorageConnectionError",
            StorageError::WriteFailed { .. } => "StorageWriteError",
            StorageError::ReadFailed(_) => "StorageReadError",
        }
    }

    pub(crate) fn write(reason: impl fmt::Display) -> Self {
        StorageError::WriteFailed {
            index: None,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn read(reason: impl fmt::Display) -> Self {
        StorageError::ReadFailed(reason.to_string())
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(e) => write!(f, "Storage connection failed: {}", e),
            StorageError::WriteFailed {
                index: Some(i),
                reason,
            } => write!(f, "Storage write failed at record {}: {}", i, reason),
            StorageError::WriteFailed {
                index: None,
                reason,
            } => write!(f, "Storage write failed: {}", reason),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum UploadError {
    InvalidJson(String),
    NotAnArray,
    /// A `multipart/form-data` body that could not be read.
    InvalidMultipart(String),
    /// A `multipart/form-data` body without a `file` part.
    MissingFilePart,
    Malformed(NormalizeError),
    Storage(StorageError),
}

impl UploadError {
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::InvalidJson(_) => "InvalidJson",
            UploadError::NotAnArray => "NotAnArray",
            UploadError::InvalidMultipart(_) => "InvalidMultipart",
            UploadError::MissingFilePart => "MissingFilePart",
            UploadError::Malformed(e) => e.kind(),
            UploadError::Storage(e) => e.kind(),
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::InvalidJson(e) => write!(f, "Invalid JSON format: {}", e),
            UploadError::NotAnArray => write!(f, "JSON must be an array of session records"),
            UploadError::InvalidMultipart(e) => write!(f, "Invalid multipart upload: {}", e),
            UploadError::MissingFilePart => write!(f, "Multipart upload has no 'file' part"),
            UploadError::Malformed(e) => write!(f, "{}", e),
            UploadError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for UploadError {}

impl From<NormalizeError> for UploadError {
    fn from(err: NormalizeError) -> Self {
        UploadError::Malformed(err)
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        UploadError::Storage(err)
    }
}

#[derive(Debug)]
pub enum WebError {
    InvalidAddress(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::InvalidAddress(e) => write!(f, "Invalid bind address: {}", e),
        }
    }
}

impl std::error::Error for WebError {}
