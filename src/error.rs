use std::fmt;

#[derive(Debug)]
pub enum ReportError {
    InvalidConfiguration(String),
    InvalidRecord(String),
    Io(std::io::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            ReportError::InvalidRecord(message) => write!(f, "invalid record: {}", message),
            ReportError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ReportError {
    fn from(value: std::io::Error) -> Self {
        ReportError::Io(value)
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(value: serde_json::Error) -> Self {
        ReportError::InvalidRecord(value.to_string())
    }
}

/// Why an image reference could not be turned into a placeable image.
/// The layout engine never propagates these; it draws an inline marker.
#[derive(Debug)]
pub enum ImageLoadError {
    Missing,
    NotFound(String),
    Io(std::io::Error),
    InvalidDataUri(String),
    Decode(String),
    EmptyImage,
    TimedOut,
}

impl ImageLoadError {
    pub fn code(&self) -> &'static str {
        match self {
            ImageLoadError::Missing => "IMAGE_MISSING",
            ImageLoadError::NotFound(_) => "IMAGE_NOT_FOUND",
            ImageLoadError::Io(_) => "IMAGE_IO",
            ImageLoadError::InvalidDataUri(_) => "IMAGE_INVALID_DATA_URI",
            ImageLoadError::Decode(_) => "IMAGE_DECODE",
            ImageLoadError::EmptyImage => "IMAGE_EMPTY",
            ImageLoadError::TimedOut => "IMAGE_TIMED_OUT",
        }
    }
}

impl fmt::Display for ImageLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageLoadError::Missing => write!(f, "no image reference provided"),
            ImageLoadError::NotFound(source) => write!(f, "image not found: {}", source),
            ImageLoadError::Io(err) => write!(f, "io error: {}", err),
            ImageLoadError::InvalidDataUri(message) => {
                write!(f, "invalid data uri: {}", message)
            }
            ImageLoadError::Decode(message) => write!(f, "image decode failed: {}", message),
            ImageLoadError::EmptyImage => write!(f, "image has zero width or height"),
            ImageLoadError::TimedOut => write!(f, "image load timed out"),
        }
    }
}

impl std::error::Error for ImageLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageLoadError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ImageLoadError {
    fn from(value: std::io::Error) -> Self {
        ImageLoadError::Io(value)
    }
}
