// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The interrupt shield: scoped conversion of termination signals into
//! cooperative cancellation.
//!
//! While a test case is in flight, SIGHUP, SIGINT and SIGTERM are captured
//! and surfaced through [`InterruptShield::check`] (at the executor's
//! checkpoints) and [`InterruptShield::recv`] (inside the supervisor's wait
//! loop). The executor tears down the in-flight child and its work
//! directory before letting the resulting [`InterruptedError`] escape;
//! callers that want the conventional die-by-signal behavior re-deliver it
//! with [`InterruptedError::reraise`].

use crate::errors::{InterruptedError, RunError};
use futures::FutureExt;
use tokio::signal::unix::{signal, SignalKind};
use tokio_stream::{wrappers::SignalStream, StreamExt, StreamMap};

/// Which signals the shield listens for.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
enum SignalId {
    Hup,
    Int,
    Term,
}

impl SignalId {
    fn signo(self) -> i32 {
        match self {
            SignalId::Hup => libc::SIGHUP,
            SignalId::Int => libc::SIGINT,
            SignalId::Term => libc::SIGTERM,
        }
    }
}

/// A scoped capture of the termination signals.
///
/// Construction subscribes to the signals; dropping the shield ends the
/// subscription. A captured signal stays pending within the shield, so
/// every checkpoint after the first detection keeps reporting it.
#[derive(Debug)]
pub(crate) struct InterruptShield {
    signals: Option<StreamMap<SignalId, SignalStream>>,
    pending: Option<i32>,
}

impl InterruptShield {
    /// Creates a shield that captures SIGHUP, SIGINT and SIGTERM.
    pub(crate) fn new() -> Result<Self, RunError> {
        let mut map = StreamMap::new();
        map.extend([
            (SignalId::Hup, signal_stream(SignalKind::hangup())?),
            (SignalId::Int, signal_stream(SignalKind::interrupt())?),
            (SignalId::Term, signal_stream(SignalKind::terminate())?),
        ]);
        Ok(Self {
            signals: Some(map),
            pending: None,
        })
    }

    /// Creates a shield that never reports an interrupt. Useful for tests
    /// and embedders that manage signals themselves.
    pub(crate) fn noop() -> Self {
        Self {
            signals: None,
            pending: None,
        }
    }

    /// Waits for the next captured signal. Pends forever on a noop shield.
    pub(crate) async fn recv(&mut self) -> InterruptedError {
        if let Some(signo) = self.pending {
            return InterruptedError::new(signo);
        }
        match &mut self.signals {
            Some(map) => match map.next().await {
                Some((id, ())) => {
                    let signo = id.signo();
                    self.pending = Some(signo);
                    InterruptedError::new(signo)
                }
                // All streams closed; nothing will ever arrive.
                None => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    /// Checkpoint: raises an error if a signal has been captured.
    pub(crate) fn check(&mut self) -> Result<(), InterruptedError> {
        if self.pending.is_none() {
            if let Some(map) = &mut self.signals {
                if let Some(Some((id, ()))) = map.next().now_or_never() {
                    self.pending = Some(id.signo());
                }
            }
        }
        match self.pending {
            Some(signo) => Err(InterruptedError::new(signo)),
            None => Ok(()),
        }
    }
}

fn signal_stream(kind: SignalKind) -> Result<SignalStream, RunError> {
    Ok(SignalStream::new(
        signal(kind).map_err(RunError::SignalSetup)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_shield_never_fires() {
        let mut shield = InterruptShield::noop();
        assert!(shield.check().is_ok());
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), shield.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn captured_signal_stays_pending() {
        let mut shield = InterruptShield::new().unwrap();
        assert!(shield.check().is_ok());

        // Deliver SIGHUP to ourselves; the shield owns the subscription so
        // this does not kill the test process.
        unsafe {
            libc::kill(std::process::id() as i32, libc::SIGHUP);
        }

        let err = shield.recv().await;
        assert_eq!(err.signal(), libc::SIGHUP);

        // Every later checkpoint keeps reporting the same interruption.
        let err = shield.check().unwrap_err();
        assert_eq!(err.signal(), libc::SIGHUP);
        let err = shield.check().unwrap_err();
        assert_eq!(err.signal(), libc::SIGHUP);
    }
}
