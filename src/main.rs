use std::error::Error;
use std::process;
use std::time::Duration;

use clap::Parser;
use serial_exchange::{Environment, Exchange, HexBytes, Observer, Payload, TtyDevice};

/// Send a fixed byte sequence over a raw serial line and print the reply.
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    /// Serial device, e.g. /dev/ttyUSB0 or /dev/cu.usbserial-1420
    /// [env: SERIAL_EXCHANGE_PORT, default: /dev/ttyUSB0]
    port: Option<String>,
    /// Line speed in baud [env: SERIAL_EXCHANGE_BAUD, default: 9600]
    #[clap(short, long)]
    baud: Option<u32>,
    /// Bytes to send, as hex
    #[clap(short, long, default_value = "35 A3 65 BB 1C 88")]
    payload: Payload,
    /// Milliseconds to wait between sending and reading
    #[clap(short, long, default_value_t = 1000)]
    wait_ms: u64,
    /// Read timeout in tenths of a second
    #[clap(short, long, default_value_t = 10)]
    timeout_ds: u8,
    /// Receive buffer size in bytes
    #[clap(short, long, default_value_t = 256)]
    capacity: usize,
}

struct Console;

impl Observer for Console {
    fn transmitted(&mut self, count: usize) {
        println!("Written bytes: {}", count);
    }

    fn received(&mut self, bytes: &[u8]) {
        println!(
            "Read {} bytes. Received message: {}",
            bytes.len(),
            HexBytes(bytes)
        );
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = Environment::init_with_overrides(args.port, args.baud)?.into_config();
    let line = config.line_config().with_read_timeout_deciseconds(args.timeout_ds);
    let config = config
        .line(line)
        .payload(args.payload)
        .settle(Duration::from_millis(args.wait_ms))
        .capacity(args.capacity);

    let exchange = Exchange::new(config);
    let device = TtyDevice::open(exchange.config().device_path())?;
    exchange.run_observed(device, &mut Console)?;
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
