//! Channel plumbing between concurrency domains. Every message carries the
//! tracing span it was sent under, so event provenance survives the hop onto
//! the reactor's context.

pub mod reactor;

use tokio::sync::mpsc;
use tracing::Span;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("receiver closed")]
pub struct SendError;

#[derive(Debug)]
pub struct Sender<E>(mpsc::UnboundedSender<(Span, E)>);

// derived Clone would require E: Clone
impl<E> Clone for Sender<E> {
    fn clone(&self) -> Self { Sender(self.0.clone()) }
}

impl<E> Sender<E> {
    pub fn send(&self, event: E) -> Result<(), SendError> {
        self.0.send((Span::current(), event)).map_err(|_| SendError)
    }

    /// Same as `send`; the channel is unbounded so sending never blocks.
    /// Kept for call sites on foreign threads where that is worth spelling
    /// out.
    pub fn try_send(&self, event: E) -> Result<(), SendError> { self.send(event) }
}

#[derive(Debug)]
pub struct Receiver<E>(mpsc::UnboundedReceiver<(Span, E)>);

impl<E> Receiver<E> {
    pub async fn recv(&mut self) -> Option<(Span, E)> { self.0.recv().await }

    /// Non-blocking receive, for draining in synchronous contexts.
    pub fn try_recv(&mut self) -> Option<(Span, E)> { self.0.try_recv().ok() }
}

pub fn channel<E>() -> (Sender<E>, Receiver<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Sender(tx), Receiver(rx))
}
