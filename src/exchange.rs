use std::fmt;
use std::thread;

use log::{debug, info};

use crate::{Error, ErrorKind, ExchangeConfig, ReceiveBuffer, Result, SerialDevice, SerialLine};

#[cfg(unix)]
use crate::TtyDevice;

/// Formats bytes as space-separated, two-digit uppercase hex: `35 A3 65`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Outcome of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReport {
    written: usize,
    received: Vec<u8>,
}

impl ExchangeReport {
    /// Number of payload bytes written to the device.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Bytes read back, in arrival order. Empty when the read timed out.
    pub fn received(&self) -> &[u8] {
        &self.received
    }
}

/// Hooks that see an exchange's results as soon as each step completes.
///
/// Both methods do nothing by default.
pub trait Observer {
    /// Called after the whole payload has been written, before the settle delay.
    fn transmitted(&mut self, _count: usize) {}

    /// Called after the read returned, with the bytes it delivered.
    fn received(&mut self, _bytes: &[u8]) {}
}

impl Observer for () {}

/// One configure, transmit, wait, receive session on a single device.
#[derive(Debug, Clone)]
pub struct Exchange {
    config: ExchangeConfig,
}

impl Exchange {
    /// Prepares an exchange; nothing is opened until it runs.
    pub fn new(config: ExchangeConfig) -> Self {
        Exchange { config }
    }

    /// The settings this exchange runs with.
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Opens the configured terminal and runs the exchange on it.
    ///
    /// ## Errors
    ///
    /// * [`ErrorKind::Open`] if the device cannot be opened, otherwise everything
    ///   [`run_on`](Self::run_on) reports.
    #[cfg(unix)]
    pub fn run(&self) -> Result<ExchangeReport> {
        let device = TtyDevice::open(&self.config.path)?;
        self.run_on(device)
    }

    /// Runs the exchange on an already opened device.
    pub fn run_on<D: SerialDevice>(&self, device: D) -> Result<ExchangeReport> {
        self.run_observed(device, &mut ())
    }

    /// Runs the exchange on `device`, telling `observer` about each completed step.
    ///
    /// The device is released before this returns, whether the exchange succeeded or not. The
    /// first failing step ends the session; nothing is retried.
    ///
    /// ## Errors
    ///
    /// * [`ErrorKind::InvalidInput`] if the receive buffer capacity is zero.
    /// * [`ErrorKind::ConfigRead`] or [`ErrorKind::ConfigWrite`] if the line cannot be
    ///   configured; no data is sent in that case.
    /// * [`ErrorKind::Write`] if transmitting fails; no read is attempted.
    /// * [`ErrorKind::Read`] if receiving fails.
    pub fn run_observed<D, O>(&self, device: D, observer: &mut O) -> Result<ExchangeReport>
    where
        D: SerialDevice,
        O: Observer + ?Sized,
    {
        let mut line = SerialLine::new(device);
        let report = self.exchange(&mut line, observer);
        line.close();
        report
    }

    fn exchange<D, O>(&self, line: &mut SerialLine<D>, observer: &mut O) -> Result<ExchangeReport>
    where
        D: SerialDevice,
        O: Observer + ?Sized,
    {
        if self.config.capacity == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "receive buffer capacity must be at least one byte",
            ));
        }

        line.configure(&self.config.line)?;

        let written = line.transmit(self.config.payload.as_bytes())?;
        info!("transmitted {}", HexBytes(self.config.payload.as_bytes()));
        observer.transmitted(written);

        debug!("waiting {:?} for a reply", self.config.settle);
        thread::sleep(self.config.settle);

        let mut buffer = ReceiveBuffer::new(self.config.capacity);
        line.receive(&mut buffer)?;
        info!("received {}", HexBytes(buffer.filled()));
        observer.received(buffer.filled());

        Ok(ExchangeReport {
            written,
            received: buffer.filled().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Faults, LoopbackDevice, Probe, DEFAULT_PAYLOAD};
    use assert_hex::assert_eq_hex;
    use std::time::{Duration, Instant};

    fn quick() -> Exchange {
        Exchange::new(ExchangeConfig::default().settle(Duration::from_millis(10)))
    }

    #[derive(Default)]
    struct Recorder {
        transmitted: Option<usize>,
        received: Option<Vec<u8>>,
    }

    impl Observer for Recorder {
        fn transmitted(&mut self, count: usize) {
            self.transmitted = Some(count);
        }

        fn received(&mut self, bytes: &[u8]) {
            self.received = Some(bytes.to_vec());
        }
    }

    #[test]
    fn hex_bytes_are_two_digit_uppercase() {
        assert_eq!(HexBytes(&[0x05, 0xA3, 0xff]).to_string(), "05 A3 FF");
        assert_eq!(HexBytes(&[]).to_string(), "");
    }

    #[test]
    fn loopback_exchange_reads_back_the_payload() {
        let probe = Probe::new();
        let mut recorder = Recorder::default();

        let report = quick()
            .run_observed(LoopbackDevice::open(&probe), &mut recorder)
            .unwrap();

        assert_eq!(report.written(), 6);
        assert_eq_hex!(report.received(), &DEFAULT_PAYLOAD[..]);
        assert_eq!(recorder.transmitted, Some(6));
        assert_eq!(recorder.received.as_deref(), Some(&DEFAULT_PAYLOAD[..]));
        assert_eq!(probe.open_handles(), 0);
    }

    #[test]
    fn settle_delay_separates_transmit_and_receive() {
        let probe = Probe::new();
        let exchange = Exchange::new(ExchangeConfig::default().settle(Duration::from_millis(200)));

        let start = Instant::now();
        exchange.run_on(LoopbackDevice::open(&probe)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn zero_capacity_is_rejected_before_touching_the_device() {
        let probe = Probe::new();
        let exchange = Exchange::new(ExchangeConfig::default().capacity(0));

        let error = exchange.run_on(LoopbackDevice::open(&probe)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
        assert_eq!(probe.commits(), 0);
        assert_eq!(probe.open_handles(), 0);
    }

    #[test]
    fn write_failure_skips_the_read() {
        let probe = Probe::new();
        let mut recorder = Recorder::default();

        let error = quick()
            .run_observed(LoopbackDevice::open(&probe).with_faults(Faults::WRITE), &mut recorder)
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Write);
        assert_eq!(probe.reads(), 0);
        assert!(recorder.transmitted.is_none());
        assert_eq!(probe.open_handles(), 0);
    }
}
