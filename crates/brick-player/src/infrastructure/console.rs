//! Console front end for a play session.
//!
//! The headless binary has no screens to navigate, so the session callbacks
//! are rendered as log lines instead:
//!
//! - A progress indicator becomes an `info!` line when it starts and ends.
//! - A cancelable indicator keeps its token, so Ctrl-C during connecting
//!   cancels the attempt (see [`ConsoleObserver::cancel_progress`]).
//! - "Navigate back" means leaving the player: the exit token is cancelled
//!   and `main` shuts down.

use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::ports::{ProgressKind, SessionObserver};

pub struct ConsoleObserver {
    exit: CancellationToken,
    progress: Mutex<Option<CancellationToken>>,
}

impl ConsoleObserver {
    /// `exit` is cancelled when the session asks to leave the player.
    pub fn new(exit: CancellationToken) -> Self {
        Self {
            exit,
            progress: Mutex::new(None),
        }
    }

    /// Cancels the visible cancelable progress indicator, if any.
    /// Returns `true` when something was cancelled.
    pub fn cancel_progress(&self) -> bool {
        let token = self
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match token {
            Some(token) => {
                info!("cancelling connection attempt");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl SessionObserver for ConsoleObserver {
    fn progress_started(&self, kind: ProgressKind, cancel: Option<CancellationToken>) {
        match kind {
            ProgressKind::Connecting => info!("connecting devices (Ctrl-C to cancel)"),
            ProgressKind::Disconnecting => info!("disconnecting devices"),
        }
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = cancel;
    }

    fn progress_finished(&self, kind: ProgressKind) {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        info!(?kind, "done");
    }

    fn navigate_back(&self) {
        warn!("devices could not be brought up; leaving the player");
        self.exit.cancel();
    }
}
