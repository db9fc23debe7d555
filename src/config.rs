use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

use crate::{DataBits, Error, ErrorKind, FlowControl, HexBytes, Parity, Result, StopBits};

/// The bytes sent when no other payload is configured.
pub const DEFAULT_PAYLOAD: [u8; 6] = [0x35, 0xA3, 0x65, 0xBB, 0x1C, 0x88];

const DEFAULT_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD_RATE: u32 = 9600;
const DEFAULT_READ_TIMEOUT_DS: u8 = 10;
const DEFAULT_SETTLE: Duration = Duration::from_secs(1);
const DEFAULT_CAPACITY: usize = 256;

const PORT_VAR: &str = "SERIAL_EXCHANGE_PORT";
const BAUD_VAR: &str = "SERIAL_EXCHANGE_BAUD";

/// Line discipline settings applied to a device before any data is exchanged.
///
/// [`LineConfig::raw`] produces the only configuration an exchange uses: 8N1 framing, no flow
/// control, modem control lines ignored, the receiver enabled, and every kind of input and output
/// processing switched off. Reads return after the read timeout even when nothing arrived.
///
/// The same type describes what a device reports back, which is why non-raw values can exist.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LineConfig {
    pub(crate) baud_rate: u32,
    pub(crate) data_bits: DataBits,
    pub(crate) parity: Parity,
    pub(crate) stop_bits: StopBits,
    pub(crate) flow_control: FlowControl,
    pub(crate) local_mode: bool,
    pub(crate) receive_enabled: bool,
    pub(crate) canonical: bool,
    pub(crate) echo: bool,
    pub(crate) signals: bool,
    pub(crate) input_processing: bool,
    pub(crate) output_processing: bool,
    pub(crate) read_timeout_ds: u8,
    pub(crate) read_min_bytes: u8,
}

impl LineConfig {
    /// Raw binary mode at the given speed, with a one second read timeout.
    pub fn raw(baud_rate: u32) -> Self {
        LineConfig {
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            local_mode: true,
            receive_enabled: true,
            canonical: false,
            echo: false,
            signals: false,
            input_processing: false,
            output_processing: false,
            read_timeout_ds: DEFAULT_READ_TIMEOUT_DS,
            read_min_bytes: 0,
        }
    }

    /// Line state of a freshly opened terminal: line-oriented input with echo and signals.
    #[cfg(any(test, feature = "loopback"))]
    pub(crate) fn cooked(baud_rate: u32) -> Self {
        LineConfig {
            flow_control: FlowControl::Software,
            local_mode: false,
            canonical: true,
            echo: true,
            signals: true,
            input_processing: true,
            output_processing: true,
            read_timeout_ds: 0,
            read_min_bytes: 1,
            ..LineConfig::raw(baud_rate)
        }
    }

    /// Replaces the line speed used for both directions.
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Replaces the read timeout, given in tenths of a second.
    #[must_use]
    pub fn with_read_timeout_deciseconds(mut self, deciseconds: u8) -> Self {
        self.read_timeout_ds = deciseconds;
        self
    }

    /// Replaces the read timeout.
    ///
    /// The timeout is rounded up to whole tenths of a second. Anything above 25.5 seconds cannot
    /// be expressed by the line discipline and fails with [`ErrorKind::InvalidInput`].
    pub fn with_read_timeout(self, timeout: Duration) -> Result<Self> {
        let deciseconds = (timeout.as_millis() + 99) / 100;
        let deciseconds = u8::try_from(deciseconds).map_err(|_| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("read timeout of {:?} exceeds 25.5 s", timeout),
            )
        })?;
        Ok(self.with_read_timeout_deciseconds(deciseconds))
    }

    /// Line speed in baud, identical for input and output.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Number of bits per character.
    pub fn data_bits(&self) -> DataBits {
        self.data_bits
    }

    /// Parity checking mode.
    pub fn parity(&self) -> Parity {
        self.parity
    }

    /// Number of stop bits.
    pub fn stop_bits(&self) -> StopBits {
        self.stop_bits
    }

    /// Flow control mode.
    pub fn flow_control(&self) -> FlowControl {
        self.flow_control
    }

    /// Whether modem control lines are ignored.
    pub fn local_mode(&self) -> bool {
        self.local_mode
    }

    /// Whether the receiver is enabled.
    pub fn receive_enabled(&self) -> bool {
        self.receive_enabled
    }

    /// Whether input is delivered line by line.
    pub fn canonical(&self) -> bool {
        self.canonical
    }

    /// Whether received characters are echoed, including erase and newline echo.
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Whether interrupt, quit and suspend characters generate signals.
    pub fn signals(&self) -> bool {
        self.signals
    }

    /// Whether received bytes are transformed (break handling, parity marking, stripping, newline
    /// mapping).
    pub fn input_processing(&self) -> bool {
        self.input_processing
    }

    /// Whether transmitted bytes are post-processed.
    pub fn output_processing(&self) -> bool {
        self.output_processing
    }

    /// Read timeout in tenths of a second, measured from the start of a read.
    pub fn read_timeout_deciseconds(&self) -> u8 {
        self.read_timeout_ds
    }

    /// Read timeout as a duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.read_timeout_ds) * 100)
    }

    /// Bytes a read waits for before the timeout applies.
    pub fn read_min_bytes(&self) -> u8 {
        self.read_min_bytes
    }

    /// Returns `true` when canonical mode, echo and signal generation are all switched off.
    pub fn is_raw(&self) -> bool {
        !self.canonical && !self.echo && !self.signals
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        LineConfig::raw(DEFAULT_BAUD_RATE)
    }
}

impl fmt::Display for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} baud, {} data bits, {} parity, {} stop bits, {} flow control, {}",
            self.baud_rate,
            self.data_bits,
            self.parity,
            self.stop_bits,
            self.flow_control,
            if self.is_raw() { "raw" } else { "cooked" }
        )
    }
}

/// Bytes transmitted verbatim by an exchange.
///
/// A payload is never empty. It parses from hex text such as `"35 A3 65 BB 1C 88"`,
/// `"35a365bb1c88"` or `"0x35,0xa3"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Wraps the given bytes, rejecting an empty sequence.
    pub fn new<T: Into<Vec<u8>>>(bytes: T) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "payload is empty"));
        }
        Ok(Payload(bytes))
    }

    /// The payload bytes in transmission order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes in the payload.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload(DEFAULT_PAYLOAD.to_vec())
    }
}

impl FromStr for Payload {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |token: &str| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("`{}` is not a sequence of hex bytes", token),
            )
        };

        let mut bytes = Vec::new();
        let tokens = s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|token| !token.is_empty());
        for token in tokens {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.is_empty()
                || digits.len() % 2 != 0
                || !digits.bytes().all(|b| b.is_ascii_hexdigit())
            {
                return Err(invalid(token));
            }
            for start in (0..digits.len()).step_by(2) {
                let pair = digits.get(start..start + 2).ok_or_else(|| invalid(token))?;
                bytes.push(u8::from_str_radix(pair, 16).map_err(|_| invalid(token))?);
            }
        }
        Payload::new(bytes)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&HexBytes(&self.0), f)
    }
}

/// Everything a single exchange needs to know, supplied at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    pub(crate) path: String,
    pub(crate) line: LineConfig,
    pub(crate) payload: Payload,
    pub(crate) settle: Duration,
    pub(crate) capacity: usize,
}

impl ExchangeConfig {
    /// Default exchange on the device at `path`: raw 9600 baud, the default payload, a one second
    /// pause before reading and a 256 byte receive buffer.
    pub fn new<'a>(path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        ExchangeConfig {
            path: path.into().into_owned(),
            line: LineConfig::default(),
            payload: Payload::default(),
            settle: DEFAULT_SETTLE,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Set the path to the serial device
    #[must_use]
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.path = path.into().into_owned();
        self
    }

    /// Set the baud rate in symbols-per-second
    #[must_use]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.line = self.line.with_baud_rate(baud_rate);
        self
    }

    /// Replace the whole line configuration
    #[must_use]
    pub fn line(mut self, line: LineConfig) -> Self {
        self.line = line;
        self
    }

    /// Set the bytes to transmit
    #[must_use]
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Set how long to wait between transmitting and starting to read
    #[must_use]
    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Set the receive buffer capacity
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// The configured device path.
    pub fn device_path(&self) -> &str {
        &self.path
    }

    /// The configured line settings.
    pub fn line_config(&self) -> &LineConfig {
        &self.line
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig::new(DEFAULT_PORT)
    }
}

/// Settings taken from the process environment.
#[derive(Debug, Clone, PartialEq, Eq, Envconfig)]
pub struct Environment {
    /// Serial device path, from `SERIAL_EXCHANGE_PORT`.
    #[envconfig(from = "SERIAL_EXCHANGE_PORT", default = "/dev/ttyUSB0")]
    pub port: String,

    /// Line speed, from `SERIAL_EXCHANGE_BAUD`.
    #[envconfig(from = "SERIAL_EXCHANGE_BAUD", default = "9600")]
    pub baud_rate: u32,
}

impl Environment {
    /// Reads the environment, letting explicitly given values take the place of their variables.
    ///
    /// A variable that is replaced is never parsed, so a malformed `SERIAL_EXCHANGE_BAUD` does
    /// not matter when a baud rate is passed in.
    pub fn init_with_overrides(
        port: Option<String>,
        baud_rate: Option<u32>,
    ) -> std::result::Result<Self, envconfig::Error> {
        let mut vars = HashMap::new();
        for name in [PORT_VAR, BAUD_VAR] {
            if let Ok(value) = env::var(name) {
                vars.insert(name.to_owned(), value);
            }
        }
        Self::overriding(vars, port, baud_rate)
    }

    fn overriding(
        mut vars: HashMap<String, String>,
        port: Option<String>,
        baud_rate: Option<u32>,
    ) -> std::result::Result<Self, envconfig::Error> {
        if let Some(port) = port {
            vars.insert(PORT_VAR.to_owned(), port);
        }
        if let Some(baud_rate) = baud_rate {
            vars.insert(BAUD_VAR.to_owned(), baud_rate.to_string());
        }
        Self::init_from_hashmap(&vars)
    }

    /// Builds the exchange these settings describe, leaving everything else at its default.
    pub fn into_config(self) -> ExchangeConfig {
        ExchangeConfig::new(self.port).baud_rate(self.baud_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn raw_line_matches_the_exchange_settings() {
        let line = LineConfig::default();
        assert_eq!(line.baud_rate(), 9600);
        assert_eq!(line.data_bits(), DataBits::Eight);
        assert_eq!(line.parity(), Parity::None);
        assert_eq!(line.stop_bits(), StopBits::One);
        assert_eq!(line.flow_control(), FlowControl::None);
        assert!(line.local_mode());
        assert!(line.receive_enabled());
        assert!(!line.input_processing());
        assert!(!line.output_processing());
        assert_eq!(line.read_timeout_deciseconds(), 10);
        assert_eq!(line.read_timeout(), Duration::from_secs(1));
        assert_eq!(line.read_min_bytes(), 0);
        assert!(line.is_raw());
        assert!(!LineConfig::cooked(9600).is_raw());
    }

    #[test]
    fn line_config_describes_its_framing() {
        assert_eq!(
            LineConfig::default().to_string(),
            "9600 baud, Eight data bits, None parity, One stop bits, None flow control, raw"
        );
        let cooked = LineConfig::cooked(115200).to_string();
        assert!(cooked.starts_with("115200 baud, Eight data bits"));
        assert!(cooked.ends_with("Software flow control, cooked"));
    }

    #[rstest]
    #[case(Duration::from_secs(1), 10)]
    #[case(Duration::from_millis(150), 2)]
    #[case(Duration::from_millis(1), 1)]
    #[case(Duration::ZERO, 0)]
    #[case(Duration::from_millis(25_500), 255)]
    fn read_timeout_rounds_up_to_deciseconds(#[case] timeout: Duration, #[case] expected: u8) {
        let line = LineConfig::default().with_read_timeout(timeout).unwrap();
        assert_eq!(line.read_timeout_deciseconds(), expected);
    }

    #[test]
    fn read_timeout_beyond_vtime_range_is_rejected() {
        let error = LineConfig::default()
            .with_read_timeout(Duration::from_millis(25_501))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
    }

    #[rstest]
    #[case("35 A3 65 BB 1C 88")]
    #[case("35a365bb1c88")]
    #[case("0x35,0xA3,0x65,0xBB,0x1C,0x88")]
    #[case("  35A3 65BB\t1c88 ")]
    fn payload_parses_hex_text(#[case] text: &str) {
        let payload: Payload = text.parse().unwrap();
        assert_eq!(payload.as_bytes(), &DEFAULT_PAYLOAD);
        assert_eq!(payload, Payload::default());
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("0x")]
    #[case("123")]
    #[case("zz")]
    #[case("é0")]
    #[case("+1")]
    fn payload_rejects_malformed_text(#[case] text: &str) {
        let error = text.parse::<Payload>().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn payload_displays_as_hex() {
        assert_eq!(Payload::default().to_string(), "35 A3 65 BB 1C 88");
    }

    #[test]
    fn environment_fills_in_defaults() {
        let env = Environment::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(env.port, "/dev/ttyUSB0");
        assert_eq!(env.baud_rate, 9600);
        assert_eq!(env.into_config(), ExchangeConfig::default());
    }

    #[test]
    fn environment_overrides_port_and_baud() {
        let mut vars = HashMap::new();
        vars.insert("SERIAL_EXCHANGE_PORT".to_owned(), "/dev/ttyACM1".to_owned());
        vars.insert("SERIAL_EXCHANGE_BAUD".to_owned(), "115200".to_owned());

        let config = Environment::init_from_hashmap(&vars).unwrap().into_config();
        assert_eq!(config.device_path(), "/dev/ttyACM1");
        assert_eq!(config.line_config().baud_rate(), 115200);
    }

    #[test]
    fn given_values_replace_malformed_variables() {
        let mut vars = HashMap::new();
        vars.insert(BAUD_VAR.to_owned(), "fast".to_owned());
        assert!(Environment::overriding(vars.clone(), None, None).is_err());

        let port = Some("/dev/ttyS1".to_owned());
        let env = Environment::overriding(vars, port, Some(57600)).unwrap();
        assert_eq!(env.port, "/dev/ttyS1");
        assert_eq!(env.baud_rate, 57600);
    }

    #[test]
    fn variables_fill_in_what_is_not_given() {
        let mut vars = HashMap::new();
        vars.insert(PORT_VAR.to_owned(), "/dev/ttyACM0".to_owned());
        vars.insert(BAUD_VAR.to_owned(), "19200".to_owned());

        let env = Environment::overriding(vars, None, Some(4800)).unwrap();
        assert_eq!(env.port, "/dev/ttyACM0");
        assert_eq!(env.baud_rate, 4800);
    }
}
