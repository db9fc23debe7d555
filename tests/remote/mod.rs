//! The far end of a pseudo terminal pair, standing in for whatever sits on the other side of a
//! serial cable.

use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use nix::poll::{poll, PollFd, PollFlags};
use serial_exchange::TtyDevice;

/// Reads up to `len` bytes from `remote`, giving up once `timeout` has passed.
pub fn read_for(remote: &mut TtyDevice, len: usize, timeout: Duration) -> Vec<u8> {
    let deadline = Instant::now() + timeout;
    let mut received = Vec::new();
    let mut buf = [0u8; 256];

    while received.len() < len {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut fds = [PollFd::new(remote.as_raw_fd(), PollFlags::POLLIN)];
        if poll(&mut fds, remaining.as_millis() as i32).unwrap() == 0 {
            break;
        }
        let wanted = (len - received.len()).min(buf.len());
        let n = remote.read(&mut buf[..wanted]).unwrap();
        received.extend_from_slice(&buf[..n]);
    }
    received
}

/// Sends back the first `len` bytes that arrive at `remote`, like a loopback plug would.
pub fn echo(remote: &mut TtyDevice, len: usize, timeout: Duration) -> Vec<u8> {
    let received = read_for(remote, len, timeout);
    remote.write_all(&received).unwrap();
    received
}
