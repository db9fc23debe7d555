use std::os::unix::io::RawFd;

use nix::libc;

mod raw {
    use nix::ioctl_none_bad;
    use nix::libc;

    ioctl_none_bad!(tiocexcl, libc::TIOCEXCL);
}

/// Puts the terminal into exclusive mode.
///
/// Further `open(2)` calls on the same terminal fail with `EBUSY` unless the caller is root.
pub(crate) fn tiocexcl(fd: RawFd) -> nix::Result<()> {
    unsafe { raw::tiocexcl(fd as libc::c_int) }.map(|_| ())
}
