//! serial-exchange sends a fixed byte sequence over a serial line and reads back the reply.
//!
//! The library is organised around [`SerialLine`], which owns a single open device, puts it into
//! a raw binary line mode described by [`LineConfig`], and then performs one transmit and one
//! timeout-bounded receive before releasing the device again. [`Exchange`] drives that sequence
//! for a whole session.
//!
//! The device itself sits behind the [`SerialDevice`] trait. On POSIX systems [`TtyDevice`] talks
//! to a tty through termios. With the `loopback` feature enabled, `LoopbackDevice` is an in-memory
//! stand-in that routes transmitted bytes straight back to its receive path and can be told to
//! fail at any step.
//!
//! ```no_run
//! use serial_exchange::{Exchange, ExchangeConfig};
//!
//! let config = ExchangeConfig::new("/dev/ttyUSB0");
//! let report = Exchange::new(config).run()?;
//! println!("Read {} bytes", report.received().len());
//! # Ok::<(), serial_exchange::Error>(())
//! ```

#![deny(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations
)]
// Don't worry about needing to `unwrap()` or otherwise handle some results in
// doc tests.
#![doc(test(attr(allow(unused_must_use))))]

use std::error::Error as StdError;
use std::fmt;
use std::io;

mod config;
mod device;
mod exchange;
mod line;
#[cfg(any(test, feature = "loopback"))]
mod loopback;

#[cfg(unix)]
mod posix;

pub use config::{Environment, ExchangeConfig, LineConfig, Payload, DEFAULT_PAYLOAD};
pub use device::{LineAttributes, SerialDevice};
pub use exchange::{Exchange, ExchangeReport, HexBytes, Observer};
pub use line::{ReceiveBuffer, SerialLine};
#[cfg(any(test, feature = "loopback"))]
pub use loopback::{Faults, LoopbackDevice, Probe};

#[cfg(unix)]
pub use posix::TtyDevice;

/// A type for results generated by interacting with serial lines.
///
/// The `Err` type is hard-wired to [`serial_exchange::Error`](struct.Error.html).
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of errors that can occur when exchanging data over a serial line.
///
/// Every category is terminal for a session: nothing is retried.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The device could not be opened.
    ///
    /// The path does not exist, permissions are missing, or another process holds the device.
    Open,

    /// The current line attributes could not be fetched from the device.
    ConfigRead,

    /// The line attributes could not be committed to the device.
    ConfigWrite,

    /// Writing to the device failed.
    Write,

    /// Reading from the device failed.
    ///
    /// A read that returns no bytes because the timeout expired is not an error.
    Read,

    /// A parameter was incorrect or an operation was called out of order.
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ErrorKind::Open => write!(f, "open error"),
            ErrorKind::ConfigRead => write!(f, "config read error"),
            ErrorKind::ConfigWrite => write!(f, "config write error"),
            ErrorKind::Write => write!(f, "write error"),
            ErrorKind::Read => write!(f, "read error"),
            ErrorKind::InvalidInput => write!(f, "invalid input"),
        }
    }
}

/// An error type for serial line operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    /// The kind of error this is
    pub kind: ErrorKind,
    /// A description of the error suitable for end-users
    pub description: String,
    os_error: Option<i32>,
}

impl Error {
    /// Instantiates a new error
    pub fn new<T: Into<String>>(kind: ErrorKind, description: T) -> Self {
        Error {
            kind,
            description: description.into(),
            os_error: None,
        }
    }

    /// Wraps an I/O error from the device, tagging it with the operation that failed.
    pub fn from_io(kind: ErrorKind, error: io::Error) -> Self {
        Error {
            kind,
            description: error.to_string(),
            os_error: error.raw_os_error(),
        }
    }

    /// Returns the corresponding `ErrorKind` for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the OS error code behind this error, if the device reported one.
    pub fn raw_os_error(&self) -> Option<i32> {
        self.os_error
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        write!(fmt, "{}: {}", self.kind, self.description)
    }
}

impl StdError for Error {}

impl From<Error> for io::Error {
    fn from(error: Error) -> io::Error {
        if let Some(code) = error.os_error {
            return io::Error::from_raw_os_error(code);
        }
        let kind = match error.kind {
            ErrorKind::Open => io::ErrorKind::NotFound,
            ErrorKind::InvalidInput => io::ErrorKind::InvalidInput,
            ErrorKind::Write => io::ErrorKind::WriteZero,
            ErrorKind::ConfigRead | ErrorKind::ConfigWrite | ErrorKind::Read => {
                io::ErrorKind::Other
            }
        };
        io::Error::new(kind, error.description)
    }
}

/// Number of bits per character
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataBits {
    /// 5 bits per character
    Five,

    /// 6 bits per character
    Six,

    /// 7 bits per character
    Seven,

    /// 8 bits per character
    Eight,
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DataBits::Five => write!(f, "Five"),
            DataBits::Six => write!(f, "Six"),
            DataBits::Seven => write!(f, "Seven"),
            DataBits::Eight => write!(f, "Eight"),
        }
    }
}

/// Parity checking modes
///
/// When parity checking is enabled (`Odd` or `Even`) an extra bit is transmitted with
/// each character. The value of the parity bit is arranged so that the number of 1 bits in the
/// character (including the parity bit) is an even number (`Even`) or an odd number
/// (`Odd`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit.
    None,

    /// Parity bit sets odd number of 1 bits.
    Odd,

    /// Parity bit sets even number of 1 bits.
    Even,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Parity::None => write!(f, "None"),
            Parity::Odd => write!(f, "Odd"),
            Parity::Even => write!(f, "Even"),
        }
    }
}

/// Number of stop bits
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopBits {
    /// One stop bit.
    One,

    /// Two stop bits.
    Two,
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StopBits::One => write!(f, "One"),
            StopBits::Two => write!(f, "Two"),
        }
    }
}

/// Flow control modes
///
/// A raw exchange line keeps both kinds of flow control switched off; the variants exist so that
/// a line read back from a device can say what it found.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlowControl {
    /// No flow control.
    None,

    /// Flow control using XON/XOFF bytes.
    Software,

    /// Flow control using RTS/CTS signals.
    Hardware,

    /// Both XON/XOFF bytes and RTS/CTS signals.
    Both,
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FlowControl::None => write!(f, "None"),
            FlowControl::Software => write!(f, "Software"),
            FlowControl::Hardware => write!(f, "Hardware"),
            FlowControl::Both => write!(f, "Both"),
        }
    }
}

impl FlowControl {
    pub(crate) fn from_parts(software: bool, hardware: bool) -> Self {
        match (software, hardware) {
            (false, false) => FlowControl::None,
            (true, false) => FlowControl::Software,
            (false, true) => FlowControl::Hardware,
            (true, true) => FlowControl::Both,
        }
    }

    pub(crate) fn software(self) -> bool {
        matches!(self, FlowControl::Software | FlowControl::Both)
    }

    pub(crate) fn hardware(self) -> bool {
        matches!(self, FlowControl::Hardware | FlowControl::Both)
    }
}
