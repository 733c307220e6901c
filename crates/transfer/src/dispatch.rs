//! Accept loop shared by both framings.
//!
//! Each accepted connection is handed to its own task. A slot is taken
//! before `accept` so that, once all slots are busy, new connections wait
//! in the listen backlog instead of piling up as idle tasks.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Default slot count for [`DispatchMode::Pooled`].
pub const DEFAULT_MAX_HANDLERS: usize = 16;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How many connection handlers may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// One connection at a time, each handled to completion.
    Serial,
    /// Up to `max_handlers` connections at once.
    Pooled { max_handlers: usize },
}

impl DispatchMode {
    pub fn pooled() -> Self {
        Self::Pooled {
            max_handlers: DEFAULT_MAX_HANDLERS,
        }
    }

    /// Number of handlers allowed to run concurrently (at least 1).
    pub fn slots(&self) -> usize {
        match self {
            Self::Serial => 1,
            Self::Pooled { max_handlers } => (*max_handlers).max(1),
        }
    }
}

impl Default for DispatchMode {
    fn default() -> Self {
        Self::pooled()
    }
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => f.write_str("serial"),
            Self::Pooled { max_handlers } => write!(f, "pooled({max_handlers})"),
        }
    }
}

/// Accepts connections on `listener` until `cancel` fires.
///
/// `handler` is called once per connection and owns the stream from then
/// on. A handler that panics is logged and its slot released; the loop
/// keeps going. Handlers still running at cancellation are left to finish
/// on their own.
pub async fn serve<F, Fut>(
    listener: TcpListener,
    mode: DispatchMode,
    cancel: CancellationToken,
    handler: F,
) where
    F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let slots = Arc::new(Semaphore::new(mode.slots()));
    tracing::debug!(%mode, "dispatcher started");

    loop {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let (stream, peer) = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    drop(permit);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };
        tracing::info!(%peer, "connection accepted");

        let task = tokio::spawn(handler(stream, peer));
        tokio::spawn(async move {
            let result = task.await;
            drop(permit);
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::error!(%peer, "connection handler panicked");
                }
            }
        });
    }

    tracing::debug!("dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Starts `serve` on a loopback port; every handler echoes one byte
    /// after holding the connection for `hold`.
    async fn start(
        mode: DispatchMode,
        hold: Duration,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    ) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(serve(listener, mode, cancel.clone(), move |mut stream, _| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(hold).await;
                let mut b = [0u8; 1];
                if stream.read_exact(&mut b).await.is_ok() {
                    let _ = stream.write_all(&b).await;
                }
                active.fetch_sub(1, Ordering::SeqCst);
            }
        }));
        (addr, cancel, handle)
    }

    async fn ping(addr: SocketAddr) -> u8 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[42]).await.unwrap();
        let mut b = [0u8; 1];
        stream.read_exact(&mut b).await.unwrap();
        b[0]
    }

    #[test]
    fn slots_per_mode() {
        assert_eq!(DispatchMode::Serial.slots(), 1);
        assert_eq!(DispatchMode::Pooled { max_handlers: 4 }.slots(), 4);
        assert_eq!(DispatchMode::Pooled { max_handlers: 0 }.slots(), 1);
        assert_eq!(DispatchMode::default().slots(), DEFAULT_MAX_HANDLERS);
    }

    #[tokio::test]
    async fn serial_runs_one_handler_at_a_time() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (addr, cancel, handle) = start(
            DispatchMode::Serial,
            Duration::from_millis(50),
            Arc::clone(&active),
            Arc::clone(&peak),
        )
        .await;

        let clients: Vec<_> = (0..3).map(|_| tokio::spawn(ping(addr))).collect();
        for c in clients {
            assert_eq!(c.await.unwrap(), 42);
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn pooled_runs_handlers_concurrently_up_to_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (addr, cancel, handle) = start(
            DispatchMode::Pooled { max_handlers: 2 },
            Duration::from_millis(200),
            Arc::clone(&active),
            Arc::clone(&peak),
        )
        .await;

        let clients: Vec<_> = (0..4).map(|_| tokio::spawn(ping(addr))).collect();
        for c in clients {
            assert_eq!(c.await.unwrap(), 42);
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let handle = tokio::spawn(serve(
            listener,
            DispatchMode::Serial,
            cancel.clone(),
            move |mut stream, _| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        panic!("first handler fails");
                    }
                    let mut b = [0u8; 1];
                    stream.read_exact(&mut b).await.unwrap();
                    stream.write_all(&b).await.unwrap();
                }
            },
        ));

        // The first connection is dropped by the panicking handler.
        let mut first = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        let _ = first.read(&mut buf).await;

        assert_eq!(ping(addr).await, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_stops_accepting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(serve(
            listener,
            DispatchMode::pooled(),
            cancel.clone(),
            |_, _| async {},
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
