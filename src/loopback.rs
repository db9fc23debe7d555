//! An in-memory serial device for exercising [`SerialLine`](crate::SerialLine) without hardware.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use bitflags::bitflags;

use crate::{Error, ErrorKind, LineAttributes, LineConfig, Result, SerialDevice};

bitflags! {
    /// Device operations a [`LoopbackDevice`] fails on purpose.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct Faults: u8 {
        /// Fetching line attributes fails.
        const ATTRIBUTE_READ = 1 << 0;
        /// Committing line attributes fails.
        const ATTRIBUTE_WRITE = 1 << 1;
        /// Every write fails.
        const WRITE = 1 << 2;
        /// Every read fails.
        const READ = 1 << 3;
        /// The next write and the next read are each interrupted once before proceeding.
        const INTERRUPT = 1 << 4;
    }
}

#[derive(Debug, Default)]
struct Activity {
    open: usize,
    commits: usize,
    reads: usize,
    written: Vec<u8>,
}

/// Shared view of what the loopback devices created from it have been doing.
///
/// Clones observe the same counters, so a test keeps one while the device itself moves into a
/// [`SerialLine`](crate::SerialLine).
#[derive(Debug, Clone, Default)]
pub struct Probe(Rc<RefCell<Activity>>);

impl Probe {
    /// Creates a probe with all counters at zero.
    pub fn new() -> Self {
        Probe::default()
    }

    /// Number of devices created from this probe that have not been dropped yet.
    pub fn open_handles(&self) -> usize {
        self.0.borrow().open
    }

    /// Number of attribute sets committed.
    pub fn commits(&self) -> usize {
        self.0.borrow().commits
    }

    /// Number of read calls that reached the device.
    pub fn reads(&self) -> usize {
        self.0.borrow().reads
    }

    /// Every byte the devices accepted for transmission, in order.
    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }
}

impl LineAttributes for LineConfig {
    fn apply(&mut self, config: &LineConfig) -> Result<()> {
        if config.baud_rate == 0 {
            return Err(Error::new(
                ErrorKind::ConfigWrite,
                "unsupported baud rate 0",
            ));
        }
        *self = *config;
        Ok(())
    }

    fn line_config(&self) -> LineConfig {
        *self
    }
}

/// Simulated serial device whose transmit path feeds its own receive path.
///
/// A new device reports the line state of a freshly opened terminal. Reads never block: when
/// nothing is pending they return `Ok(0)` at once, which is what a raw line reports once its read
/// timeout expires.
#[derive(Debug)]
pub struct LoopbackDevice {
    attributes: LineConfig,
    pending: VecDeque<u8>,
    loopback: bool,
    write_limit: Option<usize>,
    faults: Faults,
    interrupt_write: bool,
    interrupt_read: bool,
    probe: Probe,
}

impl LoopbackDevice {
    /// Opens a loopback device, counted by `probe` until it is dropped.
    pub fn open(probe: &Probe) -> Self {
        probe.0.borrow_mut().open += 1;
        LoopbackDevice {
            attributes: LineConfig::cooked(9600),
            pending: VecDeque::new(),
            loopback: true,
            write_limit: None,
            faults: Faults::empty(),
            interrupt_write: false,
            interrupt_read: false,
            probe: probe.clone(),
        }
    }

    /// Drops transmitted bytes instead of routing them back, as if nothing were connected.
    #[must_use]
    pub fn unconnected(mut self) -> Self {
        self.loopback = false;
        self
    }

    /// Accepts at most `limit` bytes per write call.
    #[must_use]
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Fails the given operations.
    #[must_use]
    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self.interrupt_write = faults.contains(Faults::INTERRUPT);
        self.interrupt_read = faults.contains(Faults::INTERRUPT);
        self
    }

    /// Queues bytes as if the remote end had already sent them.
    #[must_use]
    pub fn preload(mut self, bytes: &[u8]) -> Self {
        self.pending.extend(bytes);
        self
    }
}

impl Drop for LoopbackDevice {
    fn drop(&mut self) {
        self.probe.0.borrow_mut().open -= 1;
    }
}

fn injected(operation: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("injected {} failure", operation),
    )
}

impl io::Read for LoopbackDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.probe.0.borrow_mut().reads += 1;
        if self.faults.contains(Faults::READ) {
            return Err(injected("read"));
        }
        if self.interrupt_read {
            self.interrupt_read = false;
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }

        let count = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl io::Write for LoopbackDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.faults.contains(Faults::WRITE) {
            return Err(injected("write"));
        }
        if self.interrupt_write {
            self.interrupt_write = false;
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }

        let count = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        let accepted = &buf[..count];
        if self.loopback {
            self.pending.extend(accepted);
        }
        self.probe.0.borrow_mut().written.extend_from_slice(accepted);
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialDevice for LoopbackDevice {
    type Attributes = LineConfig;

    fn attributes(&self) -> io::Result<LineConfig> {
        if self.faults.contains(Faults::ATTRIBUTE_READ) {
            return Err(injected("attribute read"));
        }
        Ok(self.attributes)
    }

    fn set_attributes(&mut self, attributes: &LineConfig) -> io::Result<()> {
        if self.faults.contains(Faults::ATTRIBUTE_WRITE) {
            return Err(injected("attribute write"));
        }
        self.attributes = *attributes;
        self.probe.0.borrow_mut().commits += 1;
        Ok(())
    }

    fn name(&self) -> Option<String> {
        Some("loopback".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn writes_come_back_on_the_receive_path() {
        let probe = Probe::new();
        let mut device = LoopbackDevice::open(&probe);

        assert_eq!(device.write(b"abc").unwrap(), 3);
        let mut buf = [0u8; 8];
        assert_eq!(device.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(device.read(&mut buf).unwrap(), 0);
        assert_eq!(probe.written(), b"abc");
    }

    #[test]
    fn unconnected_device_swallows_writes() {
        let probe = Probe::new();
        let mut device = LoopbackDevice::open(&probe).unconnected();

        device.write_all(b"abc").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(device.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn write_limit_splits_writes() {
        let probe = Probe::new();
        let mut device = LoopbackDevice::open(&probe).with_write_limit(2);
        assert_eq!(device.write(b"abcde").unwrap(), 2);
    }

    #[test]
    fn probe_tracks_open_handles() {
        let probe = Probe::new();
        let first = LoopbackDevice::open(&probe);
        let second = LoopbackDevice::open(&probe);
        assert_eq!(probe.open_handles(), 2);
        drop(first);
        assert_eq!(probe.open_handles(), 1);
        drop(second);
        assert_eq!(probe.open_handles(), 0);
    }

    #[test]
    fn interrupt_hits_write_then_read_once() {
        let probe = Probe::new();
        let mut device = LoopbackDevice::open(&probe).with_faults(Faults::INTERRUPT);

        let error = device.write(b"x").unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::Interrupted);
        assert_eq!(device.write(b"x").unwrap(), 1);

        let mut buf = [0u8; 1];
        let error = device.read(&mut buf).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::Interrupted);
        assert_eq!(device.read(&mut buf).unwrap(), 1);
    }

    #[test]
    fn fresh_device_is_not_raw() {
        let probe = Probe::new();
        let device = LoopbackDevice::open(&probe);
        assert!(!device.attributes().unwrap().is_raw());
    }
}
