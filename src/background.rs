use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};
use crate::execute::execute;
use crate::process::ExitStatus;
use crate::spawn::Command;

/// Run [`execute`] on a new thread.
///
/// The worker takes ownership of `command` and `input`, so nothing it uses
/// borrows from the caller. `on_line` is moved to the worker and called there,
/// once per output line, in order. The returned [`Pending`] yields the exit
/// status after the last `on_line` call has returned.
///
/// Only a failure to start the thread is reported here; failure to start the
/// child is reported by [`Pending::wait`].
pub fn spawn_async<I, F>(command: Command, input: I, on_line: F) -> Result<Pending>
where
    I: IntoIterator<Item = String>,
    F: FnMut(String) + Send + 'static,
{
    let mut input: VecDeque<String> = input.into_iter().collect();
    let (sender, receiver) = mpsc::sync_channel(1);
    let handle = thread::Builder::new()
        .name("linepipe-worker".into())
        .spawn(move || {
            let result = execute(&command, &mut input, on_line);
            // the Pending may have been dropped, nobody is listening then
            let _ = sender.send(result);
        })
        .map_err(|e| Error::Worker(format!("could not start worker thread: {}", e)))?;
    debug!("started worker thread {:?}", handle.thread().id());
    Ok(Pending {
        state: PendingState::Running(receiver),
        handle: Some(handle),
    })
}

#[derive(Debug)]
enum PendingState {
    Running(Receiver<Result<ExitStatus>>),
    Finished(ExitStatus),
    Failed,
}

/// Exit status of a child being driven by a background thread.
///
/// Created by [`spawn_async`]. Dropping a `Pending` does not stop the worker;
/// it still runs the child to completion and reaps it.
#[derive(Debug)]
#[must_use]
pub struct Pending {
    state: PendingState,
    handle: Option<JoinHandle<()>>,
}

impl Pending {
    /// Block until the worker has finished and return the child's exit status.
    pub fn wait(mut self) -> Result<ExitStatus> {
        let received = self.receive(|receiver| receiver.recv().map(Some).map_err(|_| ()))?;
        // recv() only returns once a result or a disconnect arrives
        received.ok_or_else(|| Error::Worker("worker finished without a result".into()))
    }

    /// Return the exit status if the worker has finished, without blocking.
    ///
    /// An error is returned by the first call that observes it; later calls
    /// return [`Error::Worker`]. The status of a successful run is reported on
    /// every call.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.receive(|receiver| match receiver.try_recv() {
            Ok(result) => Ok(Some(result)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(()),
        })
    }

    /// Like [`wait`](Self::wait), but give up after `timeout`.
    ///
    /// Returns `Ok(None)` if the worker is still running. The child is not
    /// affected by the timeout.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        self.receive(|receiver| match receiver.recv_timeout(timeout) {
            Ok(result) => Ok(Some(result)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(()),
        })
    }

    /// True once the worker has delivered its result.
    pub fn is_finished(&self) -> bool {
        match self.state {
            PendingState::Running(_) => self.handle.as_ref().is_none_or(|h| h.is_finished()),
            PendingState::Finished(_) | PendingState::Failed => true,
        }
    }

    fn receive<R>(&mut self, recv: R) -> Result<Option<ExitStatus>>
    where
        R: FnOnce(
            &Receiver<Result<ExitStatus>>,
        ) -> std::result::Result<Option<Result<ExitStatus>>, ()>,
    {
        let received = match &self.state {
            PendingState::Finished(status) => return Ok(Some(*status)),
            PendingState::Failed => {
                return Err(Error::Worker("result already taken".into()));
            }
            PendingState::Running(receiver) => recv(receiver),
        };
        match received {
            Ok(None) => Ok(None),
            Ok(Some(result)) => {
                self.join();
                match result {
                    Ok(status) => {
                        self.state = PendingState::Finished(status);
                        Ok(Some(status))
                    }
                    Err(e) => {
                        self.state = PendingState::Failed;
                        Err(e)
                    }
                }
            }
            Err(()) => {
                self.state = PendingState::Failed;
                self.join();
                Err(Error::Worker("worker thread panicked".into()))
            }
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            // a panic has already been reported as a closed channel
            let _ = handle.join();
        }
    }
}
