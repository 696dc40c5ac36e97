//! Cooperative cancellation of query evaluation.
//!
//! Evaluation never blocks on its own, so a long scan is aborted by polling a
//! [`CancellationToken`] at well-defined points: once per conjunction or
//! disjunction sweep and once per emitted match. When the token fires, the
//! poll returns an [`ErrorKind::Cancelled`](amudai_common::error::ErrorKind::Cancelled)
//! error which unwinds the iterator stack through the regular `?` path; the
//! evaluator then reports it as a distinct outcome rather than a failure.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use amudai_common::{Result, error::Error};

/// A cheaply cloneable cancellation flag with an optional deadline.
///
/// Clones share the same flag, so a token handed to several segment scans
/// cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Creates a new token that can be cancelled with [`cancel`](Self::cancel).
    pub fn new() -> CancellationToken {
        CancellationToken {
            flag: Some(Arc::new(AtomicBool::new(false))),
            deadline: None,
        }
    }

    /// A token that never fires.
    pub fn none() -> CancellationToken {
        CancellationToken::default()
    }

    /// Returns a clone of this token that additionally fires once `deadline`
    /// has passed.
    pub fn with_deadline(&self, deadline: Instant) -> CancellationToken {
        let deadline = match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        };
        CancellationToken {
            flag: self.flag.clone(),
            deadline: Some(deadline),
        }
    }

    /// Requests cancellation. Has no effect on a token created with
    /// [`none`](Self::none).
    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::Relaxed);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        if self
            .flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return true;
        }
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Polls the token, returning a `Cancelled` error if it fired.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.flag.is_none() && self.deadline.is_none() {
            return Ok(());
        }
        if self.is_cancelled() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }
}
