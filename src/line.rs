use std::fmt;
use std::io::{self, Read, Write};

use log::{debug, trace};

use crate::{Error, ErrorKind, LineAttributes, LineConfig, Result, SerialDevice};

#[cfg(unix)]
use crate::TtyDevice;

const DEFAULT_CAPACITY: usize = 256;

/// Fixed-capacity buffer filled by [`SerialLine::receive`].
///
/// The storage is zeroed on creation and before every receive, so only the filled prefix ever
/// holds device data.
#[derive(Clone, PartialEq, Eq)]
pub struct ReceiveBuffer {
    bytes: Box<[u8]>,
    filled: usize,
}

impl ReceiveBuffer {
    /// Creates a zeroed buffer that accepts up to `capacity` bytes per receive.
    pub fn new(capacity: usize) -> Self {
        ReceiveBuffer {
            bytes: vec![0; capacity].into_boxed_slice(),
            filled: 0,
        }
    }

    /// Maximum number of bytes a single receive can deliver.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// The bytes delivered by the last receive.
    pub fn filled(&self) -> &[u8] {
        &self.bytes[..self.filled]
    }

    /// Number of bytes delivered by the last receive.
    pub fn len(&self) -> usize {
        self.filled
    }

    /// Returns `true` if the last receive delivered nothing.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    fn reset(&mut self) -> &mut [u8] {
        self.bytes.iter_mut().for_each(|b| *b = 0);
        self.filled = 0;
        &mut self.bytes
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        ReceiveBuffer::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReceiveBuffer")
            .field("capacity", &self.capacity())
            .field("filled", &self.filled())
            .finish()
    }
}

/// A single open serial device in raw exchange mode.
///
/// The line owns its device for the whole session. It must be configured before any data moves;
/// after that, transmit and receive can be called in any order. Closing consumes the line, and a
/// line that goes out of scope without being closed releases its device all the same.
#[derive(Debug)]
pub struct SerialLine<D: SerialDevice> {
    device: D,
    config: Option<LineConfig>,
}

#[cfg(unix)]
impl SerialLine<TtyDevice> {
    /// Opens the terminal at `path` and wraps it in an unconfigured line.
    ///
    /// ## Errors
    ///
    /// * [`ErrorKind::Open`] if the device cannot be opened or is in use.
    pub fn open(path: &str) -> Result<Self> {
        TtyDevice::open(path).map(SerialLine::new)
    }
}

impl<D: SerialDevice> SerialLine<D> {
    /// Wraps an already opened device.
    pub fn new(device: D) -> Self {
        SerialLine {
            device,
            config: None,
        }
    }

    /// Puts the line discipline into the state described by `config`.
    ///
    /// The current attributes are fetched from the device, every setting `config` covers is
    /// replaced, and the result is committed in one call. Settings outside `config` keep the
    /// values the device reported.
    ///
    /// ## Errors
    ///
    /// * [`ErrorKind::ConfigRead`] if the attributes cannot be fetched.
    /// * [`ErrorKind::ConfigWrite`] if the device cannot represent a setting or refuses the
    ///   commit. The line stays unconfigured in that case.
    pub fn configure(&mut self, config: &LineConfig) -> Result<()> {
        let mut attributes = self
            .device
            .attributes()
            .map_err(|e| Error::from_io(ErrorKind::ConfigRead, e))?;
        attributes.apply(config)?;
        self.device
            .set_attributes(&attributes)
            .map_err(|e| Error::from_io(ErrorKind::ConfigWrite, e))?;

        debug!(
            "configured {}: {}, read timeout {:?}, min {} bytes",
            self.display_name(),
            config,
            config.read_timeout(),
            config.read_min_bytes()
        );
        self.config = Some(*config);
        Ok(())
    }

    /// Fetches the line discipline the device currently reports.
    pub fn attributes(&self) -> Result<LineConfig> {
        self.device
            .attributes()
            .map(|attributes| attributes.line_config())
            .map_err(|e| Error::from_io(ErrorKind::ConfigRead, e))
    }

    /// The configuration applied by the last successful [`configure`](Self::configure).
    pub fn config(&self) -> Option<&LineConfig> {
        self.config.as_ref()
    }

    /// Writes all of `payload` to the device.
    ///
    /// Short writes are continued and interrupted writes retried until every byte has been
    /// accepted, so on success the returned count equals `payload.len()`.
    ///
    /// ## Errors
    ///
    /// * [`ErrorKind::InvalidInput`] if the line has not been configured.
    /// * [`ErrorKind::Write`] if the device reports an error or stops accepting bytes.
    pub fn transmit(&mut self, payload: &[u8]) -> Result<usize> {
        self.ensure_configured("transmit")?;

        let mut written = 0;
        while written < payload.len() {
            match self.device.write(&payload[written..]) {
                Ok(0) => {
                    return Err(Error::new(
                        ErrorKind::Write,
                        format!(
                            "device accepted no bytes after {} of {}",
                            written,
                            payload.len()
                        ),
                    ))
                }
                Ok(n) => {
                    trace!("wrote {} bytes", n);
                    written += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::from_io(ErrorKind::Write, e)),
            }
        }
        Ok(written)
    }

    /// Reads whatever the device delivers within one read timeout into `buffer`.
    ///
    /// Returns the number of bytes received, which is `0` when the timeout expired with nothing
    /// to read. The bytes themselves are available from [`ReceiveBuffer::filled`].
    ///
    /// ## Errors
    ///
    /// * [`ErrorKind::InvalidInput`] if the line has not been configured.
    /// * [`ErrorKind::Read`] if the device reports an error.
    pub fn receive(&mut self, buffer: &mut ReceiveBuffer) -> Result<usize> {
        self.ensure_configured("receive")?;

        let storage = buffer.reset();
        let count = loop {
            match self.device.read(storage) {
                Ok(n) => break n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::from_io(ErrorKind::Read, e)),
            }
        };
        buffer.filled = count;

        trace!("read {} bytes", count);
        Ok(count)
    }

    /// Releases the device.
    pub fn close(self) {
        debug!("closing {}", self.display_name());
    }

    fn ensure_configured(&self, operation: &str) -> Result<()> {
        if self.config.is_none() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("cannot {} on an unconfigured line", operation),
            ));
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|| String::from("<unnamed>"))
    }
}
