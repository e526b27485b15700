//! In-memory media payloads passed between pipeline stages.

use std::fmt;

/// Encoded narration audio (format decided by the synthesizer, usually MP3).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AudioBytes(pub Vec<u8>);

/// Encoded video container produced by the renderer.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct VideoBytes(pub Vec<u8>);

impl AudioBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl VideoBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AudioBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for VideoBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

// Payloads can be megabytes; Debug prints the size only.
impl fmt::Debug for AudioBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AudioBytes({} bytes)", self.0.len())
    }
}

impl fmt::Debug for VideoBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VideoBytes({} bytes)", self.0.len())
    }
}
