//! Sensor Acquisition - readings from the bridge into the writer channel
//!
//! The acquisition task owns a [`SensorSource`] and pushes samples into a
//! bounded channel drained by the store writer. It never talks to the store
//! or the evaluation loop directly.
//!
//! Live readings are throttled to one per `store_interval`; historical
//! readings (those carrying their own timestamp) always pass.

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use sauna_common::error::ReadingError;
use sauna_common::reading::{parse_line, Reading};
use sauna_common::sample::{local_now, Sample};
use std::io::{self, SeekFrom};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::time::Duration as StdDuration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncSeekExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("sensor source I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("skipping reading: {0}")]
    Malformed(#[from] ReadingError),

    #[error("sensor source closed")]
    Closed,
}

impl AcquisitionError {
    /// Whether the source must be reopened before reading again
    pub fn needs_reconnect(&self) -> bool {
        !matches!(self, AcquisitionError::Malformed(_))
    }
}

/// Where readings come from
///
/// `Ok(None)` means the source is exhausted and will not produce more.
/// Sources that follow a live bridge never return it; they wait instead.
/// After an error that [`needs_reconnect`](AcquisitionError::needs_reconnect)
/// the next call reopens the source.
#[async_trait]
pub trait SensorSource: Send {
    async fn next_reading(&mut self) -> Result<Option<Reading>, AcquisitionError>;

    /// Short description for logs
    fn describe(&self) -> String;
}

type LineReader = BufReader<Box<dyn AsyncRead + Send + Sync + Unpin>>;

/// Default poll period while following a regular file
pub const DEFAULT_POLL_INTERVAL: StdDuration = StdDuration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Stdin,
    Fifo,
    File,
}

/// Newline-delimited JSON written by the BLE bridge
///
/// Reads a regular file, a FIFO, or stdin (`-`).
///
/// A regular file is followed: at EOF the source polls for appended lines,
/// and starts over from the top when the file is truncated or replaced.
/// A FIFO or stdin reaching EOF means the writer went away; that is
/// reported as [`AcquisitionError::Closed`] and the next call reopens.
pub struct JsonLinesSource {
    path: String,
    mac_filter: Option<String>,
    clock: Box<dyn Fn() -> NaiveDateTime + Send + Sync>,
    poll_interval: StdDuration,
    start_at_end: bool,
    reader: Option<LineReader>,
    kind: SourceKind,
    /// Bytes of an unterminated line, kept until its newline arrives
    pending: Vec<u8>,
    /// Inode and consumed length of the followed file
    position: Option<(u64, u64)>,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<String>, mac_filter: Option<String>) -> Self {
        let path = path.into();
        let kind = if path == "-" { SourceKind::Stdin } else { SourceKind::File };
        Self {
            path,
            mac_filter,
            clock: Box::new(local_now),
            poll_interval: DEFAULT_POLL_INTERVAL,
            start_at_end: false,
            reader: None,
            kind,
            pending: Vec::new(),
            position: None,
        }
    }

    /// Replace the clock used to stamp live readings
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: StdDuration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Skip what a regular file already holds when it is first opened.
    ///
    /// Lines without a timestamp are stamped on arrival, so replaying an old
    /// file would store stale values as current.
    pub fn from_end(mut self) -> Self {
        self.start_at_end = true;
        self
    }

    async fn open(&mut self) -> Result<(), AcquisitionError> {
        self.pending.clear();

        if self.kind == SourceKind::Stdin {
            self.reader = Some(BufReader::new(Box::new(tokio::io::stdin())));
            debug!("[INGEST] Opened {}", self.describe());
            return Ok(());
        }

        let metadata = tokio::fs::metadata(&self.path).await?;
        if metadata.file_type().is_fifo() {
            self.kind = SourceKind::Fifo;
            let file = tokio::fs::File::open(&self.path).await?;
            self.reader = Some(BufReader::new(Box::new(file)));
            debug!("[INGEST] Opened {}", self.describe());
            return Ok(());
        }

        self.kind = SourceKind::File;
        let mut file = tokio::fs::File::open(&self.path).await?;
        let inode = metadata.ino();

        // Resume where we left off in the same file; start over in a new one
        let offset = match self.position {
            Some((known, consumed)) if known == inode && consumed <= metadata.len() => consumed,
            Some(_) => 0,
            None if self.start_at_end => metadata.len(),
            None => 0,
        };
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }

        self.position = Some((inode, offset));
        self.start_at_end = false;
        self.reader = Some(BufReader::new(Box::new(file)));
        debug!("[INGEST] Opened {} at byte {}", self.describe(), offset);
        Ok(())
    }

    fn close(&mut self) {
        self.reader = None;
        self.pending.clear();
    }

    /// Whether the followed file was truncated or replaced since it was opened
    async fn file_replaced(&self) -> Result<bool, AcquisitionError> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        Ok(match self.position {
            Some((inode, consumed)) => inode != metadata.ino() || metadata.len() < consumed,
            None => true,
        })
    }
}

#[async_trait]
impl SensorSource for JsonLinesSource {
    async fn next_reading(&mut self) -> Result<Option<Reading>, AcquisitionError> {
        if self.reader.is_none() {
            self.open().await?;
        }

        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Err(AcquisitionError::Closed);
            };

            let read = match reader.read_until(b'\n', &mut self.pending).await {
                Ok(n) => n,
                Err(e) => {
                    self.close();
                    return Err(e.into());
                }
            };
            if let Some((_, consumed)) = self.position.as_mut() {
                *consumed += read as u64;
            }

            // A pipe's last line may lack its newline; a file's may still be
            // in the middle of being written
            let complete = self.pending.ends_with(b"\n") || (read > 0 && self.kind != SourceKind::File);
            if complete {
                let line = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                match parse_line(&line, self.mac_filter.as_deref(), (self.clock)())? {
                    Some(reading) => return Ok(Some(reading)),
                    None => continue,
                }
            }
            if read > 0 {
                continue;
            }

            match self.kind {
                SourceKind::File => {
                    if self.file_replaced().await? {
                        info!("[INGEST] {} was truncated or replaced, reading from the start", self.describe());
                        self.position = None;
                        self.close();
                        self.open().await?;
                    } else {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
                SourceKind::Fifo | SourceKind::Stdin => {
                    self.close();
                    return Err(AcquisitionError::Closed);
                }
            }
        }
    }

    fn describe(&self) -> String {
        if self.kind == SourceKind::Stdin {
            "bridge on stdin".to_string()
        } else {
            format!("bridge at {}", self.path)
        }
    }
}

/// Admits at most one live reading per interval
#[derive(Debug, Clone)]
pub struct LiveThrottle {
    interval: Duration,
    last_live: Option<NaiveDateTime>,
}

impl LiveThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_live: None }
    }

    pub fn admit(&mut self, reading: &Reading) -> bool {
        if !reading.live {
            return true;
        }

        let ts = reading.sample.timestamp;
        match self.last_live {
            Some(last) if ts - last < self.interval => false,
            _ => {
                self.last_live = Some(ts);
                true
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub received: u64,
    pub forwarded: u64,
    pub throttled: u64,
    pub malformed: u64,
    pub reconnects: u64,
}

pub struct Acquisition<S> {
    source: S,
    tx: mpsc::Sender<Sample>,
    throttle: LiveThrottle,
    retry: RetryPolicy,
}

impl<S: SensorSource> Acquisition<S> {
    pub fn new(source: S, tx: mpsc::Sender<Sample>, throttle: LiveThrottle, retry: RetryPolicy) -> Self {
        Self { source, tx, throttle, retry }
    }

    /// Read until shutdown, source exhaustion, or the writer going away.
    ///
    /// Dropping `self` on return closes the channel, which lets the writer
    /// drain and finish.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> AcquisitionStats {
        let mut stats = AcquisitionStats::default();
        let mut failures: u32 = 0;

        info!("[INGEST] Reading from {}", self.source.describe());

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = self.source.next_reading() => next,
            };

            match next {
                Ok(Some(reading)) => {
                    failures = 0;
                    stats.received += 1;

                    if !self.throttle.admit(&reading) {
                        stats.throttled += 1;
                        continue;
                    }

                    if self.tx.send(reading.sample).await.is_err() {
                        warn!("[INGEST] Writer has stopped, ending acquisition");
                        break;
                    }
                    stats.forwarded += 1;
                }
                Ok(None) => {
                    info!("[INGEST] {} exhausted", self.source.describe());
                    break;
                }
                Err(e) if !e.needs_reconnect() => {
                    stats.malformed += 1;
                    warn!("[INGEST] {}", e);
                }
                Err(e) => {
                    if !self.retry.should_retry(failures) {
                        error!("[INGEST] {} (giving up after {} attempts)", e, failures);
                        break;
                    }

                    let delay = self.retry.calculate_delay(failures);
                    failures = failures.saturating_add(1);
                    stats.reconnects += 1;
                    warn!("[INGEST] {} (reconnecting in {:?})", e, delay);

                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(
            "[INGEST] Acquisition stopped: {} received, {} forwarded, {} throttled, {} malformed",
            stats.received, stats.forwarded, stats.throttled, stats.malformed
        );
        stats
    }
}
