/// Result alias that carries the custom [`EditorError`] type.
pub type Result<T> = std::result::Result<T, EditorError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// The operation needs a loaded buffer and none is present.
    #[error("no audio loaded, open an audio file first")]
    NoAudioLoaded,
    /// A buffer with zero samples was handed to an operation that needs audio.
    #[error("audio buffer contains no samples")]
    EmptyBuffer,
    /// A numeric input fell outside its documented range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The codec does not understand the requested file format.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// WAV reader/writer failures.
    #[error("wav codec error: {0}")]
    Wav(#[from] hound::Error),
    /// The playback device failed to open or stop, or its state was poisoned.
    #[error("playback device error: {0}")]
    Device(String),
    /// Spectral transform failures inside the filter engine.
    #[error("spectral transform failed: {0}")]
    Fft(String),
}

impl EditorError {
    /// Creates an [`EditorError::InvalidParameter`] from any message.
    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Creates an [`EditorError::Device`] from any message.
    pub fn device<T: Into<String>>(msg: T) -> Self {
        Self::Device(msg.into())
    }
}

impl From<realfft::FftError> for EditorError {
    fn from(value: realfft::FftError) -> Self {
        Self::Fft(value.to_string())
    }
}
