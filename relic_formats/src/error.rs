use thiserror::Error;

/// Failure modes shared by every decoder in this crate.
///
/// All of them are local to the resource being decoded: callers are expected
/// to report the error, drop the partial output, and carry on with whatever
/// other resources they hold.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stream ended before the structure it declared.
    #[error("truncated stream: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// Header fields or structure contradict the format.
    #[error("malformed stream: {0}")]
    Malformed(String),
    /// Compressed state no longer agrees with the stream. Unrecoverable for
    /// this stream; neighbouring resources are unaffected.
    #[error("decoder out of sync: {0}")]
    Desync(String),
    /// A layout this crate recognises but does not decode.
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

impl DecodeError {
    /// Bounds-check helper: `len` bytes at `offset` within `available`.
    pub fn check_span(offset: usize, len: usize, available: usize) -> Result<()> {
        let end = offset
            .checked_add(len)
            .ok_or(DecodeError::Truncated {
                offset,
                needed: len,
                available,
            })?;
        if end > available {
            return Err(DecodeError::Truncated {
                offset,
                needed: len,
                available,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_check_accepts_exact_fit() {
        assert!(DecodeError::check_span(10, 6, 16).is_ok());
    }

    #[test]
    fn span_check_rejects_overflowing_extent() {
        assert!(DecodeError::check_span(10, 7, 16).is_err());
        assert!(DecodeError::check_span(usize::MAX, 2, 16).is_err());
    }
}
