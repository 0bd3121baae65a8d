
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Event log severity, 0 (disabled) to 8 (everything).
pub const LEVEL_NONE: u8 = 0;
pub const LEVEL_CRITICAL: u8 = 1;
pub const LEVEL_ERROR: u8 = 2;
pub const LEVEL_WARNING: u8 = 3;
pub const LEVEL_INFO: u8 = 5;
pub const LEVEL_DEBUG: u8 = 7;
pub const LEVEL_ALL: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Screen,
    File,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampMode {
    /// Seconds since the log was opened.
    Uptime,
    WallClock,
}

#[derive(Debug, Clone)]
pub struct EventLogConfig {
    pub level: u8,
    pub mode: LogMode,
    pub path: Option<PathBuf>,
    pub append: bool,
    /// Byte cap on the log file; file output stops past it.
    pub max_size: Option<u64>,
    pub flush_interval: Duration,
    pub timestamps: TimestampMode,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        EventLogConfig {
            level: LEVEL_INFO,
            mode: LogMode::Screen,
            path: None,
            append: false,
            max_size: None,
            flush_interval: Duration::from_secs(1),
            timestamps: TimestampMode::Uptime,
        }
    }
}

enum Msg {
    Line { level: u8, text: String },
    Flush,
    Shutdown,
}

/// Cloneable sender side of the event log. All formatting and file I/O
/// happens on the logger thread, so callers never block on the file and
/// never interleave partial lines.
#[derive(Clone)]
pub struct EventLogHandle {
    tx: Sender<Msg>,
    level: Arc<AtomicU8>,
}

impl EventLogHandle {
    pub fn log(&self, level: u8, text: impl Into<String>) {
        if level == LEVEL_NONE || level > self.level.load(Ordering::Relaxed) {
            return;
        }
        let _ = self.tx.send(Msg::Line {
            level,
            text: text.into(),
        });
    }

    pub fn critical(&self, text: impl Into<String>) {
        self.log(LEVEL_CRITICAL, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.log(LEVEL_ERROR, text);
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.log(LEVEL_WARNING, text);
    }

    pub fn info(&self, text: impl Into<String>) {
        self.log(LEVEL_INFO, text);
    }

    pub fn debug(&self, text: impl Into<String>) {
        self.log(LEVEL_DEBUG, text);
    }

    pub fn set_level(&self, level: u8) {
        self.level.store(level.min(LEVEL_ALL), Ordering::Relaxed);
    }

    pub fn flush(&self) {
        let _ = self.tx.send(Msg::Flush);
    }
}

/// Owner of the logger thread. Dropping it drains the queue and joins.
pub struct EventLog {
    handle: EventLogHandle,
    join: Option<JoinHandle<()>>,
}

impl EventLog {
    pub fn spawn(cfg: EventLogConfig) -> Result<EventLog> {
        let file = match (&cfg.path, cfg.mode) {
            (Some(path), LogMode::File | LogMode::Both) => {
                let f = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(cfg.append)
                    .truncate(!cfg.append)
                    .open(path)
                    .map_err(Error::LogFileOpen)?;
                Some(BufWriter::new(f))
            }
            _ => None,
        };

        let (tx, rx) = mpsc::channel();
        let level = Arc::new(AtomicU8::new(cfg.level));
        let join = std::thread::Builder::new()
            .name("mf-eventlog".into())
            .spawn(move || logger_main(cfg, file, rx))?;

        Ok(EventLog {
            handle: EventLogHandle { tx, level },
            join: Some(join),
        })
    }

    pub fn handle(&self) -> EventLogHandle {
        self.handle.clone()
    }
}

impl std::ops::Deref for EventLog {
    type Target = EventLogHandle;
    fn deref(&self) -> &EventLogHandle {
        &self.handle
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(Msg::Shutdown);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

fn level_tag(level: u8) -> &'static str {
    match level {
        LEVEL_CRITICAL => "CRITICAL",
        LEVEL_ERROR => "ERROR",
        LEVEL_WARNING => "WARNING",
        4 | LEVEL_INFO => "INFO",
        6 | LEVEL_DEBUG | LEVEL_ALL => "DEBUG",
        _ => "LOG",
    }
}

fn logger_main(cfg: EventLogConfig, mut file: Option<BufWriter<File>>, rx: Receiver<Msg>) {
    let start = Instant::now();
    let mut written: u64 = 0;
    let mut capped = false;
    let mut last_flush = Instant::now();

    loop {
        let msg = match rx.recv_timeout(cfg.flush_interval) {
            Ok(m) => m,
            Err(RecvTimeoutError::Timeout) => Msg::Flush,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match msg {
            Msg::Line { level, text } => {
                let stamp = match cfg.timestamps {
                    TimestampMode::Uptime => {
                        let up = start.elapsed();
                        format!("{:>9.6}", up.as_secs_f64())
                    }
                    TimestampMode::WallClock => {
                        chrono::Local::now().format("%H:%M:%S%.3f").to_string()
                    }
                };
                let line = format!("{stamp} {} {text}\n", level_tag(level));

                if matches!(cfg.mode, LogMode::Screen | LogMode::Both) {
                    print!("{line}");
                }
                if let Some(f) = &mut file {
                    if !capped {
                        if let Some(cap) = cfg.max_size {
                            if written + line.len() as u64 > cap {
                                capped = true;
                                let _ = f.write_all(b"... event log size cap reached\n");
                            }
                        }
                        if !capped {
                            let _ = f.write_all(line.as_bytes());
                            written += line.len() as u64;
                        }
                    }
                }
            }
            Msg::Flush => {
                if let Some(f) = &mut file {
                    let _ = f.flush();
                }
                last_flush = Instant::now();
            }
            Msg::Shutdown => break,
        }

        if last_flush.elapsed() >= cfg.flush_interval {
            if let Some(f) = &mut file {
                let _ = f.flush();
            }
            last_flush = Instant::now();
        }
    }

    if let Some(f) = &mut file {
        let _ = f.flush();
    }
}

/// `log` crate backend forwarding into the event log, so `warn!` lines
/// from the engine land in the same file as driver events.
pub struct LogBridge {
    handle: EventLogHandle,
}

impl LogBridge {
    pub fn new(handle: EventLogHandle) -> Self {
        LogBridge { handle }
    }

    pub fn install(handle: EventLogHandle) -> std::result::Result<(), log::SetLoggerError> {
        let bridge = Box::new(LogBridge::new(handle));
        log::set_boxed_logger(bridge).map(|()| log::set_max_level(log::LevelFilter::Debug))
    }
}

fn map_level(level: log::Level) -> u8 {
    match level {
        log::Level::Error => LEVEL_ERROR,
        log::Level::Warn => LEVEL_WARNING,
        log::Level::Info => LEVEL_INFO,
        log::Level::Debug => LEVEL_DEBUG,
        log::Level::Trace => LEVEL_ALL,
    }
}

impl log::Log for LogBridge {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        self.handle
            .log(map_level(record.level()), format!("{}", record.args()));
    }

    fn flush(&self) {
        self.handle.flush();
    }
}
