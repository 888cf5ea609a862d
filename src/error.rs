// THEORY:
// Analyses never fail: missing or sparse data simply produces no detections. Errors
// exist only at the edges of the engine, on input validation and configuration
// loading, and in the async service. Each edge gets its own variants so callers can
// match on what went wrong without parsing messages.

use thiserror::Error;

/// Errors raised by the detection engine.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Depth buffer length does not match `width * height`.
    #[error("depth buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch {
        /// Expected buffer length.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// Point cloud buffer is not a whole number of XYZ triples.
    #[error("malformed point cloud: {len} floats is not a multiple of 3")]
    MalformedPointCloud {
        /// Length of the flat point buffer.
        len: usize,
    },

    /// Frame resolution differs from the established background model.
    #[error("frame is {actual_width}x{actual_height} but background model is {expected_width}x{expected_height}; reset the detector to change resolution")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// A threshold update carried a non-finite value.
    #[error("invalid threshold {name}: {value}")]
    InvalidThreshold {
        /// Name of the rejected threshold.
        name: &'static str,
        /// The offending value.
        value: f32,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The service queue was full and the policy is `Reject`.
    #[error("frame {frame_number} rejected: detector queue is full")]
    FrameRejected {
        /// Number of the dropped frame.
        frame_number: u32,
    },

    /// The detector service task is no longer running.
    #[error("detector service is closed")]
    ServiceClosed,
}

impl DetectionError {
    /// Creates a buffer size mismatch error.
    #[must_use]
    pub const fn buffer_mismatch(expected: usize, actual: usize) -> Self {
        Self::BufferSizeMismatch { expected, actual }
    }
}

impl From<toml::de::Error> for DetectionError {
    fn from(e: toml::de::Error) -> Self {
        DetectionError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;
