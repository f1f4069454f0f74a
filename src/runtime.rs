use std::io::{ErrorKind, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

/// Unified event type consumed by the delegate driver
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriveEvent {
    /// A chunk of the delegate's stdout
    Output(Vec<u8>),
    /// Nothing arrived within the idle interval
    Idle,
    /// The delegate closed its stdout
    Closed,
}

/// Source of delegate output events
pub trait DriveEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<DriveEvent, RecvTimeoutError>;
}

/// Production event source: a reader thread pumping the child's stdout
pub struct PipeEventSource {
    rx: Receiver<DriveEvent>,
}

impl PipeEventSource {
    pub fn new<R: Read + Send + 'static>(mut reader: R) -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(DriveEvent::Output(buf[..n].to_vec())).is_err() {
                            return;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::debug!(error = %e, "delegate stdout read failed");
                        break;
                    }
                }
            }
            let _ = tx.send(DriveEvent::Closed);
        });

        Self { rx }
    }
}

impl DriveEventSource for PipeEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<DriveEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<DriveEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<DriveEvent>) -> Self {
        Self { rx }
    }
}

impl DriveEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<DriveEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the driver one event at a time
pub struct Runner<E: DriveEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: DriveEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to the idle interval; Idle on timeout, Closed once the source is gone
    pub fn step(&self) -> DriveEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) => DriveEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => DriveEvent::Closed,
        }
    }
}
