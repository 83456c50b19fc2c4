use crate::core::error::{Error, Result};

/// Transaction state of a writable database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    /// Flush boundaries before and after the transaction
    ActiveFlushed,
    /// Records join the ordinary buffer on commit
    ActiveUnflushed,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        !matches!(self, TransactionState::Idle)
    }

    pub fn is_flushed(&self) -> bool {
        matches!(self, TransactionState::ActiveFlushed)
    }
}

/// What the caller has to do with the buffer when a transaction ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEnd {
    /// Flush the buffer now
    Flush,
    /// Leave the buffer for the next ordinary flush
    Keep,
    /// Throw the buffer away
    Discard,
}

/// Transaction state machine.
///
/// It only decides transitions; the writable database performs the
/// flushes and discards they call for.
#[derive(Debug, Default)]
pub struct TransactionMachine {
    state: TransactionState,
}

impl TransactionMachine {
    pub fn new() -> Self {
        TransactionMachine::default()
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Idle -> Active*. A flushed transaction needs the buffer flushed
    /// before it starts; the caller does that before calling `begin`.
    pub fn begin(&mut self, flushed: bool) -> Result<()> {
        if self.state.is_active() {
            return Err(Error::invalid_operation("Cannot begin transaction - transaction already in progress"));
        }
        self.state = if flushed {
            TransactionState::ActiveFlushed
        } else {
            TransactionState::ActiveUnflushed
        };
        Ok(())
    }

    /// Active* -> Idle
    pub fn commit(&mut self) -> Result<TransactionEnd> {
        let end = match self.state {
            TransactionState::Idle => {
                return Err(Error::invalid_operation("Cannot commit transaction - no transaction currently in progress"));
            }
            TransactionState::ActiveFlushed => TransactionEnd::Flush,
            TransactionState::ActiveUnflushed => TransactionEnd::Keep,
        };
        self.state = TransactionState::Idle;
        Ok(end)
    }

    /// Active* -> Idle. Both kinds discard the buffer: for an unflushed
    /// transaction that includes records buffered before it began.
    pub fn cancel(&mut self) -> Result<TransactionEnd> {
        if !self.state.is_active() {
            return Err(Error::invalid_operation("Cannot cancel transaction - no transaction currently in progress"));
        }
        self.state = TransactionState::Idle;
        Ok(TransactionEnd::Discard)
    }

    /// Ordinary flushes are only allowed outside transactions
    pub fn check_flush_allowed(&self) -> Result<()> {
        if self.state.is_active() {
            return Err(Error::invalid_operation("Can't flush during a transaction"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_flushed_round_trip() {
        let mut txn = TransactionMachine::new();
        txn.begin(true).unwrap();
        assert_eq!(txn.state(), TransactionState::ActiveFlushed);
        assert_eq!(txn.commit().unwrap(), TransactionEnd::Flush);
        assert_eq!(txn.state(), TransactionState::Idle);
    }

    #[test]
    fn test_unflushed_commit_keeps_buffer() {
        let mut txn = TransactionMachine::new();
        txn.begin(false).unwrap();
        assert_eq!(txn.commit().unwrap(), TransactionEnd::Keep);
    }

    #[test]
    fn test_nested_begin_rejected() {
        let mut txn = TransactionMachine::new();
        txn.begin(false).unwrap();
        let err = txn.begin(true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidOperation);
        assert_eq!(txn.state(), TransactionState::ActiveUnflushed);
    }

    #[test]
    fn test_commit_and_cancel_require_active() {
        let mut txn = TransactionMachine::new();
        assert_eq!(txn.commit().unwrap_err().kind, ErrorKind::InvalidOperation);
        assert_eq!(txn.cancel().unwrap_err().kind, ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_flush_blocked_while_active() {
        let mut txn = TransactionMachine::new();
        assert!(txn.check_flush_allowed().is_ok());
        txn.begin(true).unwrap();
        assert!(txn.check_flush_allowed().is_err());
        assert_eq!(txn.cancel().unwrap(), TransactionEnd::Discard);
        assert!(txn.check_flush_allowed().is_ok());
    }
}
