// src/progress.rs

//! Notification callbacks emitted by the state machine
//!
//! The transaction owns a [`Notifier`]; the state machine reports
//! progress and failures through it and never inspects the result.
//! Implementations must not call back into the state machine.
//!
//! Implementations include:
//! - `LogNotifier`: forwards events to tracing
//! - `SilentNotifier`: no-op for embedding and tests
//! - `CallbackNotifier`: forwards events to a closure

use tracing::{info, warn};

/// Event codes delivered to the transaction's callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackWhat {
    InstStart,
    InstProgress,
    UninstStart,
    UninstStop,
    UnpackError,
    CpioError,
}

/// Receiver for state machine notifications.
///
/// `element` is the package identity (name-version-release) the event
/// concerns; `amount`/`total` carry progress or are zero on error
/// events.
pub trait Notifier: Send + Sync {
    fn notify(&self, element: &str, what: CallbackWhat, amount: u64, total: u64);
}

/// Logs every notification through tracing
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, element: &str, what: CallbackWhat, amount: u64, total: u64) {
        match what {
            CallbackWhat::UnpackError | CallbackWhat::CpioError => {
                warn!("{}: {:?}", element, what);
            }
            _ => {
                info!("{}: {:?} {}/{}", element, what, amount, total);
            }
        }
    }
}

/// Discards every notification
#[derive(Debug, Default)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _element: &str, _what: CallbackWhat, _amount: u64, _total: u64) {}
}

/// Forwards notifications to a caller-supplied closure
pub struct CallbackNotifier {
    callback: Box<dyn Fn(&str, CallbackWhat, u64, u64) + Send + Sync>,
}

impl CallbackNotifier {
    pub fn new(callback: impl Fn(&str, CallbackWhat, u64, u64) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl Notifier for CallbackNotifier {
    fn notify(&self, element: &str, what: CallbackWhat, amount: u64, total: u64) {
        (self.callback)(element, what, amount, total);
    }
}
