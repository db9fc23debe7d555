use std::io;
use std::os::unix::prelude::*;
use std::path::Path;

use log::{debug, warn};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::{openpty, OpenptyResult, Winsize};
use nix::sys::stat::Mode;
use nix::sys::termios::{self, SetArg, Termios};
use nix::unistd;

use crate::posix::ioctl;
use crate::{Error, ErrorKind, Result, SerialDevice};

fn close(fd: RawFd) {
    if let Err(e) = unistd::close(fd) {
        warn!("closing fd {} failed: {}", fd, e);
    }
}

fn open_error(e: nix::Error) -> Error {
    Error::from_io(ErrorKind::Open, e.into())
}

/// A serial device backed by a POSIX terminal.
///
/// The descriptor is closed when the `TtyDevice` is dropped.
#[derive(Debug)]
pub struct TtyDevice {
    fd: RawFd,
    name: Option<String>,
}

impl TtyDevice {
    /// Opens the terminal at `path` for exclusive reading and writing.
    ///
    /// The terminal does not become the controlling terminal of the process. It is opened
    /// non-blocking so that a modem line without carrier cannot stall the open, then switched back
    /// to blocking I/O; read timeouts come from the line discipline afterwards.
    ///
    /// ## Errors
    ///
    /// * [`ErrorKind::Open`] if the path does not exist, access is denied, or the terminal is
    ///   already held exclusively.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<TtyDevice> {
        let path = path.as_ref();
        let fd = nix::fcntl::open(
            path,
            OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_NONBLOCK | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(open_error)?;

        // Release the descriptor again if any of the following steps fails.
        let fd = scopeguard::guard(fd, close);

        ioctl::tiocexcl(*fd).map_err(open_error)?;
        fcntl(*fd, FcntlArg::F_SETFL(OFlag::empty())).map_err(open_error)?;

        let fd = scopeguard::ScopeGuard::into_inner(fd);
        debug!("opened {} as fd {}", path.display(), fd);
        Ok(TtyDevice {
            fd,
            name: Some(path.to_string_lossy().into_owned()),
        })
    }

    /// Creates a connected pair of pseudo terminals.
    ///
    /// The first device is the controlling side, the second behaves like a serial port: line
    /// discipline settings apply to it, and bytes written to either side arrive at the other.
    /// Neither side is opened exclusively.
    pub fn pair() -> Result<(TtyDevice, TtyDevice)> {
        let OpenptyResult { master, slave } =
            openpty(None::<&Winsize>, None::<&Termios>).map_err(open_error)?;
        debug!("opened pseudo terminal pair {}/{}", master, slave);

        let master = TtyDevice {
            fd: master,
            name: None,
        };
        let slave = TtyDevice {
            fd: slave,
            name: None,
        };
        Ok((master, slave))
    }
}

impl Drop for TtyDevice {
    fn drop(&mut self) {
        debug!("closing fd {}", self.fd);
        close(self.fd);
    }
}

impl AsRawFd for TtyDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl io::Read for TtyDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        unistd::read(self.fd, buf).map_err(io::Error::from)
    }
}

impl io::Write for TtyDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        unistd::write(self.fd, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        termios::tcdrain(self.fd).map_err(io::Error::from)
    }
}

impl SerialDevice for TtyDevice {
    type Attributes = Termios;

    fn attributes(&self) -> io::Result<Termios> {
        termios::tcgetattr(self.fd).map_err(io::Error::from)
    }

    fn set_attributes(&mut self, attributes: &Termios) -> io::Result<()> {
        termios::tcsetattr(self.fd, SetArg::TCSANOW, attributes).map_err(io::Error::from)
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn open_missing_device_is_an_open_error() {
        let error = TtyDevice::open("/dev/this-serial-device-does-not-exist").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Open);
        assert_eq!(error.raw_os_error(), Some(nix::libc::ENOENT));
    }

    #[test]
    fn open_non_terminal_is_an_open_error() {
        let error = TtyDevice::open("/dev/null").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Open);
    }

    #[test]
    fn pair_connects_both_sides() {
        let (mut master, mut slave) = TtyDevice::pair().unwrap();
        let mut attributes = slave.attributes().unwrap();
        termios::cfmakeraw(&mut attributes);
        slave.set_attributes(&attributes).unwrap();

        master.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        slave.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }
}
