//! Serial devices on POSIX-compliant operating systems.

pub use self::tty::*;

mod ioctl;
mod termios;
mod tty;
