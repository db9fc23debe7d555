use std::io;

use crate::{LineConfig, Result};

/// A device-native attribute set describing a line discipline.
///
/// Attribute sets are fetched from a device, changed in memory and committed back in one piece.
/// Implementations only touch the fields a [`LineConfig`] covers and leave everything else as
/// the device reported it.
pub trait LineAttributes: Clone {
    /// Applies `config` to this attribute set.
    ///
    /// Fails with [`ErrorKind::ConfigWrite`](crate::ErrorKind::ConfigWrite) when the device
    /// cannot represent a setting, for example an unsupported baud rate. Nothing is committed to
    /// the device by this call.
    fn apply(&mut self, config: &LineConfig) -> Result<()>;

    /// Describes this attribute set in terms of a [`LineConfig`].
    fn line_config(&self) -> LineConfig;
}

/// An open serial endpoint.
///
/// Reading and writing go through [`io::Read`] and [`io::Write`]; a device is released by
/// dropping it.
pub trait SerialDevice: io::Read + io::Write {
    /// The attribute set this device uses to describe its line discipline.
    type Attributes: LineAttributes;

    /// Fetches the current line attributes.
    fn attributes(&self) -> io::Result<Self::Attributes>;

    /// Commits a complete attribute set, taking effect immediately.
    fn set_attributes(&mut self, attributes: &Self::Attributes) -> io::Result<()>;

    /// Returns a name for the device, if it has one.
    fn name(&self) -> Option<String>;
}
