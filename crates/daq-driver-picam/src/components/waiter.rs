//! Frame-wait worker
//!
//! `wait_for_frame` is the only vendor call that may block for long. It is never
//! called on an async worker thread:
//!
//! - snapshot mode runs [`run_wait`] on `spawn_blocking`, one task per grab
//! - streaming mode keeps one dedicated `picam-wait` thread; each grab sends a
//!   [`WaitRequest`] and awaits the one-shot reply, then re-arms with a new request
//!
//! Every wait carries a [`CancelToken`]. A cancelled wait answers
//! [`WaitOutcome::Cancelled`] even if a frame arrived in the meantime, so the caller
//! can suppress the emission.

use crate::sdk::PicamCamera;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Shared cancellation flag for one wait.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A frame is buffered and can be read.
    Ready,
    /// Nothing arrived before the timeout; the caller may retry.
    TimedOut,
    /// The wait was cancelled; nothing must be emitted.
    Cancelled,
    /// The vendor call failed.
    Failed(String),
}

/// Poll `wait_for_frame` in `poll`-sized slices until a frame, the deadline, or
/// cancellation.
pub fn run_wait(
    camera: &dyn PicamCamera,
    timeout: Duration,
    poll: Duration,
    cancel: &CancelToken,
) -> WaitOutcome {
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::TimedOut;
        }
        match camera.wait_for_frame(poll.min(deadline - now)) {
            Ok(true) if cancel.is_cancelled() => return WaitOutcome::Cancelled,
            Ok(true) => return WaitOutcome::Ready,
            Ok(false) => {}
            Err(e) => return WaitOutcome::Failed(format!("{:#}", e)),
        }
    }
}

/// One wait round trip for the worker thread.
pub struct WaitRequest {
    pub camera: Arc<dyn PicamCamera>,
    pub timeout: Duration,
    pub poll: Duration,
    pub cancel: CancelToken,
    pub reply: oneshot::Sender<WaitOutcome>,
}

enum WorkerMessage {
    Wait(WaitRequest),
    Shutdown,
}

/// Cloneable submission side of a [`FrameWaiter`].
#[derive(Clone)]
pub struct WaitClient {
    tx: mpsc::Sender<WorkerMessage>,
}

impl WaitClient {
    pub fn request(
        &self,
        camera: Arc<dyn PicamCamera>,
        timeout: Duration,
        poll: Duration,
        cancel: CancelToken,
    ) -> Result<oneshot::Receiver<WaitOutcome>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerMessage::Wait(WaitRequest {
                camera,
                timeout,
                poll,
                cancel,
                reply,
            }))
            .map_err(|_| anyhow!("frame wait worker has stopped"))?;
        Ok(rx)
    }
}

/// Dedicated thread serving wait requests one at a time.
pub struct FrameWaiter {
    client: Option<WaitClient>,
    handle: Option<JoinHandle<()>>,
}

impl FrameWaiter {
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::channel::<WorkerMessage>();
        let handle = std::thread::Builder::new()
            .name("picam-wait".into())
            .spawn(move || {
                tracing::debug!("frame wait worker started");
                while let Ok(WorkerMessage::Wait(request)) = rx.recv() {
                    let outcome = run_wait(
                        request.camera.as_ref(),
                        request.timeout,
                        request.poll,
                        &request.cancel,
                    );
                    if request.reply.send(outcome).is_err() {
                        tracing::debug!("wait result dropped, requester went away");
                    }
                }
                tracing::debug!("frame wait worker exiting");
            })?;
        Ok(Self {
            client: Some(WaitClient { tx }),
            handle: Some(handle),
        })
    }

    pub fn client(&self) -> Option<WaitClient> {
        self.client.clone()
    }

    /// Stop the thread and join it. Clients still held elsewhere start failing.
    ///
    /// Pending waits should be cancelled first; the thread finishes the request in
    /// progress before it reads the shutdown message.
    pub fn shutdown(&mut self) {
        if let Some(client) = self.client.take() {
            if client.tx.send(WorkerMessage::Shutdown).is_err() {
                tracing::debug!("frame wait worker already gone");
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("frame wait worker panicked");
            }
        }
    }
}

impl Drop for FrameWaiter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::mock::MockPicamCamera;

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn timeout_when_not_acquiring() {
        let camera = MockPicamCamera::builder().build();
        let outcome = run_wait(
            camera.as_ref(),
            Duration::from_millis(30),
            POLL,
            &CancelToken::new(),
        );
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn ready_once_a_frame_is_buffered() {
        let camera = MockPicamCamera::builder()
            .frame_period(Duration::from_millis(5))
            .build();
        camera.start_acquisition().unwrap();
        let outcome = run_wait(camera.as_ref(), Duration::from_secs(2), POLL, &CancelToken::new());
        assert_eq!(outcome, WaitOutcome::Ready);
    }

    #[test]
    fn cancelled_token_wins() {
        let camera = MockPicamCamera::builder().build();
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = run_wait(camera.as_ref(), Duration::from_secs(2), POLL, &cancel);
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[test]
    fn vendor_error_is_reported() {
        let camera = MockPicamCamera::builder().fail_waits(1).build();
        let outcome = run_wait(camera.as_ref(), Duration::from_secs(1), POLL, &CancelToken::new());
        assert!(matches!(outcome, WaitOutcome::Failed(ref m) if m.contains("injected")));
    }

    #[tokio::test]
    async fn worker_answers_each_request() {
        let camera = MockPicamCamera::builder()
            .frame_period(Duration::from_millis(5))
            .build();
        camera.start_acquisition().unwrap();
        let mut waiter = FrameWaiter::spawn().unwrap();
        let client = waiter.client().unwrap();

        for _ in 0..2 {
            let rx = client
                .request(camera.clone(), Duration::from_secs(2), POLL, CancelToken::new())
                .unwrap();
            assert_eq!(rx.await.unwrap(), WaitOutcome::Ready);
            assert!(camera.read_oldest_image().unwrap().is_some());
        }

        let cancel = CancelToken::new();
        camera.stop_acquisition().unwrap();
        camera.clear_acquisition().unwrap();
        assert_eq!(camera.pending_frames(), 0);
        let rx = client
            .request(camera.clone(), Duration::from_secs(5), POLL, cancel.clone())
            .unwrap();
        cancel.cancel();
        assert_eq!(rx.await.unwrap(), WaitOutcome::Cancelled);

        waiter.shutdown();
        assert!(client
            .request(camera, Duration::from_secs(1), POLL, CancelToken::new())
            .is_err());
    }
}
