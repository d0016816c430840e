//! Poll → detect → record → repeat.
//!
//! The controller runs on the main thread.  Every cycle it renews the
//! credential if needed, probes the channel and, when the channel is live,
//! records the broadcast through the [`Capturer`] until it ends.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{error, info, warn};

use twrec_common::naming;
use twrec_common::output;
use twrec_common::protocol::LiveSession;

use crate::api::{ProbeResult, Prober};
use crate::auth::{CredentialManager, TokenSource};
use crate::capture::{Capturer, ExitOutcome};

/// Extra pause after a capture that did not exit cleanly.
pub const FAILURE_BACKOFF: Duration = Duration::from_secs(30);

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Recording,
}

/// What happened during one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    Offline,
    ProbeFailed,
    /// Live, but no free output path could be found.
    Skipped,
    Recorded { path: PathBuf, outcome: ExitOutcome },
}

/// Fixed parameters of the loop.
#[derive(Debug, Clone)]
pub struct Settings {
    pub login: String,
    pub quality: String,
    /// `<root>/<login>`.
    pub output_dir: PathBuf,
    pub refresh: Duration,
    pub max_file_suffix: u32,
}

impl Settings {
    /// How long to wait after `cycle` before probing again.
    pub fn delay_after(&self, cycle: &Cycle) -> Duration {
        match cycle {
            Cycle::Recorded {
                outcome: ExitOutcome::Failure(_),
                ..
            } => FAILURE_BACKOFF.saturating_add(self.refresh),
            _ => self.refresh,
        }
    }
}

pub struct SessionController<S, P, C> {
    settings: Settings,
    credentials: CredentialManager<S>,
    prober: P,
    capturer: C,
    state: State,
    shutdown: Arc<AtomicBool>,
}

impl<S, P, C> SessionController<S, P, C>
where
    S: TokenSource,
    P: Prober,
    C: Capturer,
{
    pub fn new(
        settings: Settings,
        credentials: CredentialManager<S>,
        prober: P,
        capturer: C,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        SessionController {
            settings,
            credentials,
            prober,
            capturer,
            state: State::Idle,
            shutdown,
        }
    }

    /// Current state.  `Recording` only lasts for the blocking capture
    /// call inside [`step`](Self::step), so between cycles this always
    /// reads `Idle`.
    pub fn state(&self) -> State {
        self.state
    }

    /// Loop until shutdown is requested.
    pub fn run(&mut self) {
        info!("Loop start!");
        while !self.shutdown.load(Ordering::Relaxed) {
            let cycle = self.step();
            let delay = self.settings.delay_after(&cycle);
            if !sleep_unless_shutdown(delay, &self.shutdown) {
                break;
            }
        }
        info!("Polling loop stopped");
    }

    /// Run one poll cycle without the trailing sleep.
    pub fn step(&mut self) -> Cycle {
        let credential = self.credentials.ensure_fresh();
        match self.prober.probe(&self.settings.login, credential) {
            ProbeResult::Offline => {
                info!(
                    "{} is currently offline, checking again in {} seconds.",
                    self.settings.login,
                    self.settings.refresh.as_secs()
                );
                Cycle::Offline
            }
            ProbeResult::TransientError(reason) => {
                warn!(
                    "Cannot tell whether {} is live ({reason}), checking again in {} seconds.",
                    self.settings.login,
                    self.settings.refresh.as_secs()
                );
                Cycle::ProbeFailed
            }
            ProbeResult::Live(session) => self.record(&session),
        }
    }

    fn record(&mut self, session: &LiveSession) -> Cycle {
        let login = &self.settings.login;
        info!("{login} online. Stream recording in session.");
        info!(
            "Stream {} \"{}\" ({}, {}) started at {}",
            session.id, session.title, session.game_name, session.language, session.started_at
        );

        let file_name = naming::recording_file_name(login, &session.started_at, &session.title, &Local);
        let path = match output::allocate(
            &self.settings.output_dir,
            &file_name,
            self.settings.max_file_suffix,
        ) {
            Ok(p) => p,
            Err(e) => {
                error!("Skipping this stream: {e}");
                return Cycle::Skipped;
            }
        };

        info!("Stream will be saved at {}", path.display());
        self.state = State::Recording;
        let outcome = self
            .capturer
            .capture(login, &self.settings.quality, &path);
        self.state = State::Idle;

        if let ExitOutcome::Failure(code) = outcome {
            warn!(
                "Unexpected error (exit code {code:?}), will try again in {} seconds.",
                FAILURE_BACKOFF.as_secs()
            );
        }
        info!("Recording stream is done. Going back to checking...");

        Cycle::Recorded { path, outcome }
    }
}

/// Sleep for `duration` in short slices.  Returns `false` if shutdown was
/// requested before the time was up.  A duration too large to represent as
/// a deadline sleeps until shutdown.
pub fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now().checked_add(duration);
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                SLEEP_SLICE.min(deadline - now)
            }
            None => SLEEP_SLICE,
        };
        std::thread::sleep(slice);
    }
}
