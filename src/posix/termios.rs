//! Mapping between [`LineConfig`] and termios attribute sets.

use cfg_if::cfg_if;
use nix::sys::termios::{
    ControlFlags, InputFlags, LocalFlags, OutputFlags, SpecialCharacterIndices, Termios,
};

use crate::{
    DataBits, Error, ErrorKind, FlowControl, LineAttributes, LineConfig, Parity, Result, StopBits,
};

fn input_processing_flags() -> InputFlags {
    InputFlags::IGNBRK
        | InputFlags::BRKINT
        | InputFlags::PARMRK
        | InputFlags::ISTRIP
        | InputFlags::INLCR
        | InputFlags::IGNCR
        | InputFlags::ICRNL
}

fn software_flow_flags() -> InputFlags {
    InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY
}

fn echo_flags() -> LocalFlags {
    LocalFlags::ECHO | LocalFlags::ECHOE | LocalFlags::ECHONL
}

fn output_processing_flags() -> OutputFlags {
    OutputFlags::OPOST | OutputFlags::ONLCR
}

fn set_data_bits(termios: &mut Termios, data_bits: DataBits) {
    let size = match data_bits {
        DataBits::Five => ControlFlags::CS5,
        DataBits::Six => ControlFlags::CS6,
        DataBits::Seven => ControlFlags::CS7,
        DataBits::Eight => ControlFlags::CS8,
    };
    termios.control_flags.remove(ControlFlags::CSIZE);
    termios.control_flags.insert(size);
}

fn data_bits(termios: &Termios) -> DataBits {
    let size = termios.control_flags & ControlFlags::CSIZE;
    if size == ControlFlags::CS5 {
        DataBits::Five
    } else if size == ControlFlags::CS6 {
        DataBits::Six
    } else if size == ControlFlags::CS7 {
        DataBits::Seven
    } else {
        DataBits::Eight
    }
}

fn set_parity(termios: &mut Termios, parity: Parity) {
    match parity {
        Parity::None => termios.control_flags.remove(ControlFlags::PARENB | ControlFlags::PARODD),
        Parity::Odd => termios.control_flags.insert(ControlFlags::PARENB | ControlFlags::PARODD),
        Parity::Even => {
            termios.control_flags.insert(ControlFlags::PARENB);
            termios.control_flags.remove(ControlFlags::PARODD);
        }
    }
}

fn parity(termios: &Termios) -> Parity {
    if !termios.control_flags.contains(ControlFlags::PARENB) {
        Parity::None
    } else if termios.control_flags.contains(ControlFlags::PARODD) {
        Parity::Odd
    } else {
        Parity::Even
    }
}

fn set_flow_control(termios: &mut Termios, flow_control: FlowControl) {
    termios.control_flags.set(ControlFlags::CRTSCTS, flow_control.hardware());
    termios.input_flags.remove(software_flow_flags());
    if flow_control.software() {
        termios.input_flags.insert(InputFlags::IXON | InputFlags::IXOFF);
    }
}

fn flow_control(termios: &Termios) -> FlowControl {
    FlowControl::from_parts(
        termios.input_flags.intersects(software_flow_flags()),
        termios.control_flags.contains(ControlFlags::CRTSCTS),
    )
}

cfg_if! {
    if #[cfg(any(
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "macos",
        target_os = "netbsd",
        target_os = "openbsd"
    ))] {
        // Speeds on the BSDs are plain numbers.
        fn set_speed(termios: &mut Termios, baud_rate: u32) -> Result<()> {
            nix::sys::termios::cfsetspeed(termios, baud_rate).map_err(|e| {
                Error::from_io(ErrorKind::ConfigWrite, e.into())
            })
        }

        fn speed(termios: &Termios) -> u32 {
            nix::sys::termios::cfgetospeed(termios)
        }
    } else {
        use nix::sys::termios::BaudRate;

        const BAUD_RATES: &[(u32, BaudRate)] = &[
            (50, BaudRate::B50),
            (75, BaudRate::B75),
            (110, BaudRate::B110),
            (134, BaudRate::B134),
            (150, BaudRate::B150),
            (200, BaudRate::B200),
            (300, BaudRate::B300),
            (600, BaudRate::B600),
            (1200, BaudRate::B1200),
            (1800, BaudRate::B1800),
            (2400, BaudRate::B2400),
            (4800, BaudRate::B4800),
            (9600, BaudRate::B9600),
            (19200, BaudRate::B19200),
            (38400, BaudRate::B38400),
            (57600, BaudRate::B57600),
            (115200, BaudRate::B115200),
            (230400, BaudRate::B230400),
            (460800, BaudRate::B460800),
            (921600, BaudRate::B921600),
        ];

        fn set_speed(termios: &mut Termios, baud_rate: u32) -> Result<()> {
            let rate = BAUD_RATES
                .iter()
                .find(|(value, _)| *value == baud_rate)
                .map(|(_, rate)| *rate)
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::ConfigWrite,
                        format!("unsupported baud rate {}", baud_rate),
                    )
                })?;
            nix::sys::termios::cfsetspeed(termios, rate)
                .map_err(|e| Error::from_io(ErrorKind::ConfigWrite, e.into()))
        }

        fn speed(termios: &Termios) -> u32 {
            let rate = nix::sys::termios::cfgetospeed(termios);
            BAUD_RATES
                .iter()
                .find(|(_, candidate)| *candidate == rate)
                .map_or(0, |(value, _)| *value)
        }
    }
}

impl LineAttributes for Termios {
    fn apply(&mut self, config: &LineConfig) -> Result<()> {
        set_data_bits(self, config.data_bits);
        set_parity(self, config.parity);
        self.control_flags.set(ControlFlags::CSTOPB, config.stop_bits == StopBits::Two);
        set_flow_control(self, config.flow_control);
        self.control_flags.set(ControlFlags::CLOCAL, config.local_mode);
        self.control_flags.set(ControlFlags::CREAD, config.receive_enabled);

        self.local_flags.set(LocalFlags::ICANON, config.canonical);
        self.local_flags.remove(echo_flags());
        if config.echo {
            self.local_flags.insert(LocalFlags::ECHO | LocalFlags::ECHOE);
        }
        self.local_flags.set(LocalFlags::ISIG, config.signals);

        self.input_flags.remove(input_processing_flags());
        if config.input_processing {
            self.input_flags.insert(InputFlags::BRKINT | InputFlags::ICRNL);
        }
        self.output_flags.set(output_processing_flags(), config.output_processing);

        self.control_chars[SpecialCharacterIndices::VTIME as usize] = config.read_timeout_ds;
        self.control_chars[SpecialCharacterIndices::VMIN as usize] = config.read_min_bytes;

        set_speed(self, config.baud_rate)
    }

    fn line_config(&self) -> LineConfig {
        LineConfig {
            baud_rate: speed(self),
            data_bits: data_bits(self),
            parity: parity(self),
            stop_bits: if self.control_flags.contains(ControlFlags::CSTOPB) {
                StopBits::Two
            } else {
                StopBits::One
            },
            flow_control: flow_control(self),
            local_mode: self.control_flags.contains(ControlFlags::CLOCAL),
            receive_enabled: self.control_flags.contains(ControlFlags::CREAD),
            canonical: self.local_flags.contains(LocalFlags::ICANON),
            echo: self.local_flags.intersects(echo_flags()),
            signals: self.local_flags.contains(LocalFlags::ISIG),
            input_processing: self.input_flags.intersects(input_processing_flags()),
            output_processing: self.output_flags.contains(OutputFlags::OPOST),
            read_timeout_ds: self.control_chars[SpecialCharacterIndices::VTIME as usize],
            read_min_bytes: self.control_chars[SpecialCharacterIndices::VMIN as usize],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TtyDevice;
    use crate::SerialDevice;

    fn pty_attributes() -> Termios {
        let (_master, slave) = TtyDevice::pair().unwrap();
        slave.attributes().unwrap()
    }

    #[test]
    fn raw_config_clears_line_processing() {
        let mut termios = pty_attributes();
        termios.apply(&LineConfig::default()).unwrap();

        assert!(!termios.local_flags.intersects(
            LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ECHOE | LocalFlags::ECHONL
        ));
        assert!(!termios.local_flags.contains(LocalFlags::ISIG));
        assert!(!termios.input_flags.intersects(input_processing_flags()));
        assert!(!termios.input_flags.intersects(software_flow_flags()));
        assert!(!termios.output_flags.intersects(output_processing_flags()));
        assert!(termios
            .control_flags
            .contains(ControlFlags::CS8 | ControlFlags::CREAD | ControlFlags::CLOCAL));
        assert!(!termios.control_flags.intersects(
            ControlFlags::PARENB | ControlFlags::CSTOPB | ControlFlags::CRTSCTS
        ));
        assert_eq!(termios.control_chars[SpecialCharacterIndices::VTIME as usize], 10);
        assert_eq!(termios.control_chars[SpecialCharacterIndices::VMIN as usize], 0);
    }

    #[test]
    fn apply_leaves_unrelated_flags_alone() {
        let mut termios = pty_attributes();
        termios.input_flags.insert(InputFlags::IMAXBEL);
        termios.local_flags.insert(LocalFlags::IEXTEN);

        termios.apply(&LineConfig::default()).unwrap();

        assert!(termios.input_flags.contains(InputFlags::IMAXBEL));
        assert!(termios.local_flags.contains(LocalFlags::IEXTEN));
    }

    #[test]
    fn line_config_reads_back_what_was_applied() {
        let mut termios = pty_attributes();
        let config = LineConfig::raw(115200).with_read_timeout_deciseconds(25);
        termios.apply(&config).unwrap();
        assert_eq!(termios.line_config(), config);
    }

    #[test]
    fn parity_and_stop_bits_read_back() {
        let mut termios = pty_attributes();
        for parity in [Parity::Odd, Parity::Even, Parity::None] {
            let config = LineConfig {
                parity,
                stop_bits: StopBits::Two,
                data_bits: DataBits::Seven,
                ..LineConfig::default()
            };
            termios.apply(&config).unwrap();
            assert_eq!(termios.line_config(), config);
        }
    }

    #[test]
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn unsupported_speed_is_a_config_write_error() {
        let mut termios = pty_attributes();
        let error = termios.apply(&LineConfig::raw(12345)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ConfigWrite);
    }
}
