use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep_until};

enum Command<T> {
    Push(T, Instant),
    Discard,
}

/// Trailing-edge debounce.
///
/// Each pushed value replaces the pending one and restarts the quiet period;
/// a value is emitted only once `quiet` has elapsed with no newer push.
/// Dropping the debouncer (or calling [`shutdown`](Self::shutdown)) cancels
/// the pending timer, so nothing is emitted after teardown.
pub struct Debouncer<T> {
    input: mpsc::UnboundedSender<Command<T>>,
    timer: AbortHandle,
}

/// Receiving end of a [`Debouncer`]: the settled values, in order.
pub struct Settled<T> {
    output: mpsc::UnboundedReceiver<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Must be called from within a Tokio runtime.
    pub fn new(quiet: Duration) -> (Self, Settled<T>) {
        let (input, mut inbox) = mpsc::unbounded_channel::<Command<T>>();
        let (outbox, output) = mpsc::unbounded_channel::<T>();

        let task = tokio::spawn(async move {
            let mut pending: Option<(T, Instant)> = None;
            loop {
                let command = match pending.take() {
                    None => inbox.recv().await,
                    Some((value, deadline)) => {
                        tokio::select! {
                            biased;
                            command = inbox.recv() => command,
                            _ = sleep_until(deadline) => {
                                if outbox.send(value).is_err() {
                                    return;
                                }
                                continue;
                            }
                        }
                    }
                };

                match command {
                    Some(Command::Push(value, pushed_at)) => {
                        pending = Some((value, pushed_at + quiet));
                    }
                    Some(Command::Discard) => {}
                    None => return,
                }
            }
        });

        (
            Self {
                input,
                timer: task.abort_handle(),
            },
            Settled { output },
        )
    }

    /// Push a new value, discarding any value still waiting out its quiet
    /// period. Ignored after shutdown.
    pub fn push(&self, value: T) {
        let _ = self.input.send(Command::Push(value, Instant::now()));
    }

    /// Drop the pending value, if any, without tearing the debouncer down.
    pub fn discard(&self) {
        let _ = self.input.send(Command::Discard);
    }

    pub fn shutdown(&self) {
        self.timer.abort();
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

impl<T> Settled<T> {
    /// Wait for the next settled value; `None` once the debouncer is gone.
    pub async fn next(&mut self) -> Option<T> {
        self.output.recv().await
    }
}
