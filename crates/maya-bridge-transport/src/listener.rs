//! Background receiver for streamed Maya output.
//!
//! The listener owns a UDP socket and a dedicated thread parked in a blocking
//! `recv_from`. A blocking receive cannot be interrupted from another thread,
//! so shutdown sends the listener's own stop token to its own bound address:
//! the pending receive returns with the token and the loop exits.
//!
//! ```text
//! Created --start()--> Running --token received--> Stopping --> Stopped
//! ```

use std::{
    io::{self, Write},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{MAX_DATAGRAM_SIZE, StopToken};

/// Consecutive receive failures tolerated before cooling down.
pub const FAILURE_THRESHOLD: u32 = 10;

/// Pause after too many consecutive receive failures.
pub const FAILURE_COOLDOWN: Duration = Duration::from_secs(3);

/// Listener error.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind output listener to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to spawn output listener thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Output listener cannot be restarted")]
    NotRestartable,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Local address to bind.
    pub host: String,
    /// Local port; `0` picks an ephemeral port.
    pub port: u16,
    /// Receive buffer size.
    pub max_datagram_size: usize,
    /// Consecutive failures before a cooldown.
    pub failure_threshold: u32,
    /// Cooldown length.
    pub failure_cooldown: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            failure_threshold: FAILURE_THRESHOLD,
            failure_cooldown: FAILURE_COOLDOWN,
        }
    }
}

/// Listener lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerPhase {
    /// Bound, thread not started.
    Created = 0,
    /// Receive loop active.
    Running = 1,
    /// Stop token observed, loop exiting.
    Stopping = 2,
    /// Thread finished (or never started and shut down).
    Stopped = 3,
}

impl ListenerPhase {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// State shared with the receive thread.
struct Shared {
    running: AtomicBool,
    phase: AtomicU8,
}

impl Shared {
    fn phase(&self) -> ListenerPhase {
        ListenerPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: ListenerPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

/// Counts consecutive receive failures.
#[derive(Debug)]
struct RecvBackoff {
    failures: u32,
    threshold: u32,
    cooldown: Duration,
}

impl RecvBackoff {
    const fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failures: 0,
            threshold,
            cooldown,
        }
    }

    /// Record a failure; returns the pause to take once the threshold is hit.
    fn record_failure(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.threshold {
            self.failures = 0;
            Some(self.cooldown)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}

/// UDP receiver that echoes datagrams to a sink on its own thread.
///
/// Instances are single-use: once stopped, bind a new one.
pub struct OutputListener {
    id: Uuid,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    stop_token: Arc<StopToken>,
    shared: Arc<Shared>,
    config: ListenerConfig,
    shutdown_requested: AtomicBool,
    handle: Option<JoinHandle<()>>,
}

impl OutputListener {
    /// Bind a listener.
    ///
    /// # Errors
    /// Returns error if the socket cannot be bound.
    pub fn bind(config: ListenerConfig) -> Result<Self, ListenerError> {
        let addr = format!("{}:{}", config.host, config.port);
        let socket = UdpSocket::bind(addr.as_str()).map_err(|source| ListenerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        Ok(Self {
            id: Uuid::new_v4(),
            socket: Arc::new(socket),
            local_addr,
            stop_token: Arc::new(StopToken::new()),
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                phase: AtomicU8::new(ListenerPhase::Created as u8),
            }),
            config,
            shutdown_requested: AtomicBool::new(false),
            handle: None,
        })
    }

    /// Unique id of this instance.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Address the socket is actually bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ListenerPhase {
        self.shared.phase()
    }

    /// Whether the running flag is set.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Whether the receive thread exists and has not finished.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the receive thread, writing every datagram to `sink`.
    ///
    /// Returns immediately; the caller never blocks on the receive loop.
    ///
    /// # Errors
    /// Returns error if the listener was already started or shut down, or
    /// the thread cannot be spawned.
    pub fn start<W>(&mut self, sink: W) -> Result<(), ListenerError>
    where
        W: Write + Send + 'static,
    {
        if self.phase() != ListenerPhase::Created || self.shutdown_requested.load(Ordering::Acquire)
        {
            return Err(ListenerError::NotRestartable);
        }

        // Set before spawning so an early shutdown() cannot be overwritten.
        self.shared.running.store(true, Ordering::Release);
        self.shared.set_phase(ListenerPhase::Running);

        let socket = Arc::clone(&self.socket);
        let stop_token = Arc::clone(&self.stop_token);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let port = self.port();

        let spawned = thread::Builder::new()
            .name(format!("maya-bridge-listener-{port}"))
            .spawn(move || {
                receive_loop(socket.as_ref(), &stop_token, &shared, sink, &config, port);
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                self.shared.set_phase(ListenerPhase::Stopped);
                Err(ListenerError::Spawn(e))
            }
        }
    }

    /// Stop the receive loop.
    ///
    /// Lock-free and safe from any thread. Only the first call sends the stop
    /// token; it returns `true`, later calls return `false`.
    pub fn shutdown(&self) -> bool {
        if self.shutdown_requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shared.running.store(false, Ordering::Release);

        if self.handle.is_none() {
            self.shared.set_phase(ListenerPhase::Stopped);
            return true;
        }

        let target = self_address(self.local_addr);
        if let Err(e) = self.socket.send_to(self.stop_token.as_bytes(), target) {
            tracing::warn!(port = self.port(), "Failed to send listener stop token: {e}");
        }
        true
    }

    /// Wait for the receive thread to exit.
    ///
    /// Call after [`shutdown`](Self::shutdown); returns at once if the thread
    /// never started or was already joined.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(port = self.port(), "Output listener thread panicked");
            }
        }
    }
}

impl Drop for OutputListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for OutputListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputListener")
            .field("id", &self.id)
            .field("local_addr", &self.local_addr)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// Address to send the stop token to; an unspecified bind maps to loopback.
fn self_address(local: SocketAddr) -> SocketAddr {
    match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), local.port())
        }
        _ => local,
    }
}

/// Blocking datagram receive used by the listener thread.
trait RecvDatagram {
    fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

impl RecvDatagram for UdpSocket {
    fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf)
    }
}

fn receive_loop<S: RecvDatagram, W: Write>(
    socket: &S,
    stop_token: &StopToken,
    shared: &Shared,
    mut sink: W,
    config: &ListenerConfig,
    port: u16,
) {
    tracing::info!(port, "Output listener started");

    let mut buf = vec![0u8; config.max_datagram_size];
    let mut backoff = RecvBackoff::new(config.failure_threshold, config.failure_cooldown);

    while shared.running.load(Ordering::Acquire) {
        match socket.recv_datagram(&mut buf) {
            Ok((len, from)) => {
                backoff.reset();
                let datagram = &buf[..len];
                if stop_token.matches(datagram) {
                    shared.set_phase(ListenerPhase::Stopping);
                    break;
                }
                let text = String::from_utf8_lossy(datagram);
                if let Err(e) = sink.write_all(text.as_bytes()).and_then(|()| sink.flush()) {
                    tracing::warn!(port, "Failed to write Maya output: {e}");
                }
                tracing::trace!(port, %from, len, "Output datagram received");
            }
            Err(e) => {
                tracing::warn!(port, failures = backoff.failures + 1, "Output listener receive failed: {e}");
                if let Some(pause) = backoff.record_failure() {
                    tracing::warn!(port, ?pause, "Too many receive failures, cooling down");
                    thread::sleep(pause);
                }
            }
        }
    }

    shared.running.store(false, Ordering::Release);
    shared.set_phase(ListenerPhase::Stopped);
    tracing::info!(port, "Output listener stopped");
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Barrier, Mutex},
        time::Instant,
    };

    use super::*;

    /// Sink collecting everything written to it.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    fn started() -> (OutputListener, SharedSink) {
        let mut listener = OutputListener::bind(ListenerConfig::default()).unwrap();
        let sink = SharedSink::default();
        listener.start(sink.clone()).unwrap();
        (listener, sink)
    }

    #[test]
    fn test_ephemeral_port_is_reported() {
        let listener = OutputListener::bind(ListenerConfig::default()).unwrap();
        assert_ne!(listener.port(), 0);
        assert_eq!(listener.phase(), ListenerPhase::Created);
        assert!(!listener.is_running());
        assert!(!listener.is_alive());
    }

    #[test]
    fn test_datagrams_are_echoed_verbatim() {
        let (mut listener, sink) = started();
        assert!(listener.is_running());

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"no newline", listener.local_addr()).unwrap();
        sender.send_to(b" then one\n", listener.local_addr()).unwrap();

        assert!(wait_until(Duration::from_secs(2), || sink.text().len() == 20));
        assert_eq!(sink.text(), "no newline then one\n");

        assert!(listener.shutdown());
        listener.join();
        assert_eq!(listener.phase(), ListenerPhase::Stopped);
    }

    #[test]
    fn test_stop_token_terminates_promptly() {
        let (mut listener, sink) = started();
        let started_at = Instant::now();

        assert!(listener.shutdown());
        assert!(!listener.is_running());
        assert!(wait_until(Duration::from_secs(2), || !listener.is_alive()));
        assert!(started_at.elapsed() < Duration::from_secs(2));
        listener.join();

        assert_eq!(listener.phase(), ListenerPhase::Stopped);
        assert!(sink.text().is_empty(), "stop token must not be printed");
    }

    #[test]
    fn test_concurrent_shutdown_sends_one_token() {
        let (listener, _sink) = started();
        let listener = Arc::new(listener);
        let barrier = Arc::new(Barrier::new(4));

        let callers: Vec<_> = (0..4)
            .map(|_| {
                let listener = Arc::clone(&listener);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    listener.shutdown()
                })
            })
            .collect();

        let initiated = callers
            .into_iter()
            .map(|c| c.join().unwrap())
            .filter(|sent| *sent)
            .count();
        assert_eq!(initiated, 1);
        assert!(wait_until(Duration::from_secs(2), || listener.phase()
            == ListenerPhase::Stopped));
    }

    #[test]
    fn test_foreign_lookalike_token_is_printed() {
        let (mut listener, sink) = started();
        let other = StopToken::new();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(other.as_bytes(), listener.local_addr()).unwrap();

        assert!(wait_until(Duration::from_secs(2), || !sink.text().is_empty()));
        assert!(listener.is_alive());
        assert_eq!(sink.text().as_bytes(), other.as_bytes());

        listener.shutdown();
        listener.join();
    }

    #[test]
    fn test_not_restartable() {
        let (mut listener, _sink) = started();
        assert!(matches!(
            listener.start(SharedSink::default()),
            Err(ListenerError::NotRestartable)
        ));

        listener.shutdown();
        listener.join();
        assert!(matches!(
            listener.start(SharedSink::default()),
            Err(ListenerError::NotRestartable)
        ));
    }

    #[test]
    fn test_shutdown_before_start() {
        let mut listener = OutputListener::bind(ListenerConfig::default()).unwrap();
        assert!(listener.shutdown());
        assert_eq!(listener.phase(), ListenerPhase::Stopped);
        assert!(matches!(
            listener.start(SharedSink::default()),
            Err(ListenerError::NotRestartable)
        ));
    }

    #[test]
    fn test_unspecified_bind_stops_via_loopback() {
        let mut listener = OutputListener::bind(ListenerConfig {
            host: "0.0.0.0".into(),
            ..ListenerConfig::default()
        })
        .unwrap();
        listener.start(SharedSink::default()).unwrap();

        assert!(listener.shutdown());
        assert!(wait_until(Duration::from_secs(2), || !listener.is_alive()));
        listener.join();
    }

    #[test]
    fn test_backoff_cools_down_after_threshold() {
        let mut backoff = RecvBackoff::new(3, Duration::from_millis(7));
        assert_eq!(backoff.record_failure(), None);
        assert_eq!(backoff.record_failure(), None);
        assert_eq!(backoff.record_failure(), Some(Duration::from_millis(7)));
        assert_eq!(backoff.failures, 0);

        backoff.record_failure();
        backoff.record_failure();
        backoff.reset();
        assert_eq!(backoff.record_failure(), None);
        assert_eq!(backoff.failures, 1);
    }

    /// Replays a fixed sequence of receive results.
    struct ScriptedSocket(Mutex<VecDeque<io::Result<Vec<u8>>>>);

    impl RecvDatagram for ScriptedSocket {
        fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            let next = self.0.lock().unwrap().pop_front().unwrap();
            let datagram = next?;
            buf[..datagram.len()].copy_from_slice(&datagram);
            Ok((datagram.len(), SocketAddr::from((Ipv4Addr::LOCALHOST, 9))))
        }
    }

    #[test]
    fn test_receive_errors_do_not_stop_the_loop() {
        let token = StopToken::new();
        let mut script: VecDeque<io::Result<Vec<u8>>> = VecDeque::new();
        for _ in 0..7 {
            script.push_back(Err(io::Error::from(io::ErrorKind::ConnectionReset)));
        }
        script.push_back(Ok(b"still here\n".to_vec()));
        script.push_back(Err(io::Error::from(io::ErrorKind::Interrupted)));
        script.push_back(Ok(token.as_bytes().to_vec()));
        let socket = ScriptedSocket(Mutex::new(script));

        let shared = Shared {
            running: AtomicBool::new(true),
            phase: AtomicU8::new(ListenerPhase::Running as u8),
        };
        let config = ListenerConfig {
            failure_threshold: 3,
            failure_cooldown: Duration::from_millis(1),
            ..ListenerConfig::default()
        };
        let sink = SharedSink::default();

        receive_loop(&socket, &token, &shared, sink.clone(), &config, 9);

        assert_eq!(sink.text(), "still here\n");
        assert!(socket.0.lock().unwrap().is_empty());
        assert_eq!(shared.phase(), ListenerPhase::Stopped);
        assert!(!shared.running.load(Ordering::Acquire));
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let err = OutputListener::bind(ListenerConfig {
            port,
            ..ListenerConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }
}
