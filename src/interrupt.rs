//! Two-stage handling of Ctrl-C around filesystem changes.
//!
//! Outside of a guarded operation an interrupt ends the process straight away. While a copy,
//! archive, or program run is in progress (see [`Interrupt::guarded`]), the first interrupt
//! is only noted: the operation finishes, no further operation starts, and the run then stops
//! with [`Interrupted`]. A second interrupt during the same operation ends the process
//! immediately, possibly leaving a partially written file behind.
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::{self, Runtime};
use tracing::Dispatch;

/// Exit status used when the process is ended by an interrupt.
pub const EXIT_INTERRUPTED: u8 = 130;

/// The run stopped because of an interrupt after finishing the operation in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted")]
pub struct Interrupted;

/// What the process should do about an interrupt it just received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// No operation is in progress: exit now.
    Exit,
    /// Let the operation in progress finish, then stop.
    Latch,
    /// Second interrupt during an operation: exit now.
    Abort,
}

const IDLE: u8 = 0;
const GUARDED: u8 = 1;
const LATCHED: u8 = 2;

/// Shared interrupt state between the signal listener and the running backup.
///
/// The state only moves `IDLE -> GUARDED -> IDLE` or `GUARDED -> LATCHED`, each as a single
/// compare-and-swap. `LATCHED` is final.
#[derive(Debug, Default)]
pub struct Interrupt {
    state: AtomicU8,
}

/// Marks an operation in progress for as long as it lives.
struct Guard<'a> {
    interrupt: &'a Interrupt,
    outermost: bool,
}

impl<'a> Guard<'a> {
    /// `None` once an interrupt has been latched.
    fn enter(interrupt: &'a Interrupt) -> Option<Self> {
        match interrupt
            .state
            .compare_exchange(IDLE, GUARDED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Some(Self {
                interrupt,
                outermost: true,
            }),
            Err(GUARDED) => Some(Self {
                interrupt,
                outermost: false,
            }),
            Err(_) => None,
        }
    }
}

impl<'a> Drop for Guard<'a> {
    fn drop(&mut self) {
        if self.outermost {
            // A latched interrupt stays latched.
            let _ = self.interrupt.state.compare_exchange(
                GUARDED,
                IDLE,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }
}

impl Interrupt {
    /// Create a new, untriggered `Interrupt`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an interrupt and decide how to respond to it.
    pub fn notify(&self) -> Response {
        match self
            .state
            .compare_exchange(GUARDED, LATCHED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Response::Latch,
            Err(LATCHED) => Response::Abort,
            Err(_) => Response::Exit,
        }
    }

    /// Whether an interrupt was latched during a guarded operation.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.state.load(Ordering::SeqCst) == LATCHED
    }

    /// Run `op` with interrupts latched instead of acted on.
    ///
    /// The guard is released however `op` ends. If an interrupt arrived meanwhile, the
    /// result of `op` is discarded in favour of [`Interrupted`]. Once an interrupt has been
    /// latched, `op` is not run at all.
    ///
    /// # Errors
    ///
    /// Whatever `op` returns, or [`Interrupted`].
    pub fn guarded<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<Interrupted>,
    {
        let result = {
            let Some(_guard) = Guard::enter(self) else {
                return Err(Interrupted.into());
            };
            op()
        };

        if self.was_interrupted() {
            return Err(Interrupted.into());
        }

        result
    }
}

/// Start listening for Ctrl-C on a background runtime.
///
/// Diagnostics are logged through `dispatch`. Keep the returned runtime alive for as long as
/// interrupts should be handled.
///
/// # Errors
///
/// Any error while building the runtime.
pub fn listen(interrupt: Arc<Interrupt>, dispatch: Dispatch) -> std::io::Result<Runtime> {
    let runtime = runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("batchup-interrupt")
        .enable_io()
        .build()?;

    runtime.spawn(async move {
        loop {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::dispatcher::with_default(&dispatch, || {
                    tracing::error!("failed to listen for interrupts: {}", err);
                });
                return;
            }

            match interrupt.notify() {
                Response::Exit | Response::Abort => std::process::exit(i32::from(EXIT_INTERRUPTED)),
                Response::Latch => tracing::dispatcher::with_default(&dispatch, || {
                    tracing::warn!(
                        "Interrupted: finishing the current operation. Press Ctrl-C again to abort."
                    );
                }),
            }
        }
    });

    Ok(runtime)
}
