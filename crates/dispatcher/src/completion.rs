//! Completion - single terminal value with replay
//!
//! A `Completer` resolves exactly once; every `Completion` clone, including
//! those that subscribe after resolution, observes the same terminal value.

use tokio::sync::watch;

use contracts::DeliveryError;

type Terminal<T> = Option<Result<T, DeliveryError>>;

/// Create a connected completer/completion pair
pub fn completion<T: Clone>() -> (Completer<T>, Completion<T>) {
    let (tx, rx) = watch::channel(None);
    (Completer { tx }, Completion { rx })
}

/// Write side. Consumed by the terminal write, so a second one cannot happen.
#[derive(Debug)]
pub struct Completer<T> {
    tx: watch::Sender<Terminal<T>>,
}

impl<T> Completer<T> {
    /// Resolve with a value
    pub fn complete(self, value: T) {
        self.finish(Ok(value));
    }

    /// Resolve with an error
    pub fn fail(self, error: DeliveryError) {
        self.finish(Err(error));
    }

    /// Resolve with a result
    pub fn finish(self, result: Result<T, DeliveryError>) {
        // send_replace stores the value even when no receiver is alive
        self.tx.send_replace(Some(result));
    }
}

/// Read side. Cheap to clone; may be polled before or after resolution.
///
/// Dropping every `Completion` does not cancel the delivery.
#[derive(Debug, Clone)]
pub struct Completion<T> {
    rx: watch::Receiver<Terminal<T>>,
}

impl<T: Clone> Completion<T> {
    /// Wait for the terminal value.
    ///
    /// Resolves to `DeliveryError::Abandoned` if the completer was dropped
    /// without writing one.
    pub async fn wait(&self) -> Result<T, DeliveryError> {
        let mut rx = self.rx.clone();
        let result = match rx.wait_for(Option::is_some).await {
            Ok(terminal) => terminal.clone().unwrap_or(Err(DeliveryError::Abandoned)),
            Err(_) => Err(DeliveryError::Abandoned),
        };
        result
    }

    /// Terminal value if already resolved
    pub fn try_result(&self) -> Option<Result<T, DeliveryError>> {
        self.rx.borrow().clone()
    }

    /// Whether a terminal value has been written
    pub fn is_terminated(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl<T> Completion<T> {
    /// A completion that is already resolved
    pub fn resolved(result: Result<T, DeliveryError>) -> Self {
        let (tx, rx) = watch::channel(Some(result));
        drop(tx);
        Self { rx }
    }
}
