//! Error taxonomy shared by every codec in the crate.
//!
//! Four categories, all fatal for the load/save attempt that raised them:
//! structural corruption, recognised-but-unsupported features, declared
//! length / hash mismatches, and representable-range overflows. There is no
//! silent recovery path; the only tolerated best-effort behaviour is the RLE
//! decoder's graceful stop, which is documented where it happens.

use std::fmt;
use std::io;

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Malformed container: missing or overlapping chunk, bad length field,
    /// truncated buffer. Carries the attempted format name so a multi-format
    /// probe loop can move on to the next candidate.
    Structural { format: String, detail: String },
    /// The data is recognised but uses a feature this crate does not
    /// implement (e.g. the reserved LZSS compression type).
    Unsupported { format: String, detail: String },
    /// A decode produced different output than the container declared, or a
    /// content-hash double check failed.
    Integrity { detail: String },
    /// A count or length field exceeds its representable range. Raised
    /// before any allocation proportional to the bogus value.
    ResourceLimit { detail: String },
}

impl CodecError {
    pub fn structural(format: &str, detail: impl Into<String>) -> Self {
        CodecError::Structural {
            format: format.to_string(),
            detail: detail.into(),
        }
    }

    pub fn unsupported(format: &str, detail: impl Into<String>) -> Self {
        CodecError::Unsupported {
            format: format.to_string(),
            detail: detail.into(),
        }
    }

    pub fn integrity(detail: impl Into<String>) -> Self {
        CodecError::Integrity {
            detail: detail.into(),
        }
    }

    pub fn resource_limit(detail: impl Into<String>) -> Self {
        CodecError::ResourceLimit {
            detail: detail.into(),
        }
    }

    /// Map an `io::Error` from the cursor readers onto a structural error
    /// for the format currently being parsed.
    pub fn from_io(format: &str, err: io::Error) -> Self {
        CodecError::structural(format, err.to_string())
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, CodecError::Structural { .. })
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Structural { format, detail } => {
                write!(f, "corrupt {} data: {}", format, detail)
            }
            CodecError::Unsupported { format, detail } => {
                write!(f, "unsupported {} feature: {}", format, detail)
            }
            CodecError::Integrity { detail } => write!(f, "integrity check failed: {}", detail),
            CodecError::ResourceLimit { detail } => write!(f, "resource limit exceeded: {}", detail),
        }
    }
}

impl std::error::Error for CodecError {}
