//! Per-download bookkeeping.

use crate::error::{Error, Result};
use crate::progress::ByteCounter;

/// One download in flight: the size the server declared and the running count
/// of payload bytes consumed so far.
#[derive(Debug, Clone)]
pub struct TransferSession {
    declared_total: u64,
    counter: ByteCounter,
}

impl TransferSession {
    pub fn new(declared_total: u64) -> Self {
        Self {
            declared_total,
            counter: ByteCounter::new(),
        }
    }

    pub fn declared_total(&self) -> u64 {
        self.declared_total
    }

    /// Counter the read path adds to.
    pub fn counter(&self) -> &ByteCounter {
        &self.counter
    }

    pub fn transferred(&self) -> u64 {
        self.counter.get()
    }

    pub fn remaining(&self) -> u64 {
        self.declared_total.saturating_sub(self.transferred())
    }

    /// Check the number of bytes written to the destination against the
    /// declared total.
    pub fn verify(&self, written: u64) -> Result<()> {
        if written == self.declared_total {
            Ok(())
        } else {
            Err(Error::TruncatedTransfer {
                expected: self.declared_total,
                received: written,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_count_verifies() {
        let session = TransferSession::new(100);
        session.counter().add(100);
        assert_eq!(session.remaining(), 0);
        assert!(session.verify(100).is_ok());
    }

    #[test]
    fn short_count_is_truncation() {
        let session = TransferSession::new(100);
        session.counter().add(90);
        assert_eq!(session.remaining(), 10);

        match session.verify(session.transferred()) {
            Err(Error::TruncatedTransfer { expected, received }) => {
                assert_eq!(expected, 100);
                assert_eq!(received, 90);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn empty_download_verifies() {
        assert!(TransferSession::new(0).verify(0).is_ok());
    }
}
