//! Error types for the detection feed adapter.

/// Errors that can occur while fetching or decoding detection output.
///
/// A failed detection cycle only delays the next feed update; the control
/// loop keeps operating on the last known value. Staleness itself is never
/// represented as an error.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// The detection source could not be reached or returned a failure.
    #[error("detection source error: {message}")]
    Source {
        /// Description of the failure.
        message: String,
    },

    /// The detection payload could not be decoded.
    #[error("detection decode error: {message}")]
    Decode {
        /// Description of what was malformed.
        message: String,
    },
}
