//! DARC bitstream decoder CLI.
//!
//! Reads a demodulated bit stream (one bit per input byte, in the LSB)
//! from a file or stdin and either dumps every decoded group, header and
//! data unit to stdout, or serves a live parking map.

use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use crossbeam_channel::{bounded, Receiver};
use log::{debug, error, info};

use darclib::DarcDecoder;

mod handlers;
mod server;
mod store;

use handlers::{DumpHandler, Handler, HandlerError, ParkingHandler};
use store::ParkingStore;

const STDIN_MARKER: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            // The logging facade has no critical level; error is closest.
            LogLevel::Error | LogLevel::Critical => log::LevelFilter::Error,
        }
    }
}

/// DARC bit-stream decoder.
#[derive(Parser, Debug)]
#[command(name = "decode_darc", version)]
struct Args {
    /// Input DARC bit-stream ('-' = stdin), one bit per byte (LSB).
    #[arg(default_value = STDIN_MARKER)]
    input_path: String,

    /// Logging level.
    #[arg(short = 'l', long, value_enum, default_value_t = LogLevel::Info, ignore_case = true)]
    log_level: LogLevel,

    /// Serve the live parking map instead of dumping to stdout.
    #[arg(long)]
    serve: bool,

    /// Bind host for the map server.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Allowed CORS origins for the map server.
    #[arg(long, num_args = 0.., default_value = "*")]
    cors: Vec<String>,
}

/// Read the input on a worker thread, handing out chunks over a channel.
fn spawn_reader(input_path: &str) -> anyhow::Result<Receiver<Vec<u8>>> {
    let mut source: Box<dyn Read + Send> = if input_path == STDIN_MARKER {
        Box::new(std::io::stdin())
    } else {
        let file = File::open(input_path)
            .with_context(|| format!("cannot open input {input_path:?}"))?;
        Box::new(file)
    };

    let (sender, receiver) = bounded::<Vec<u8>>(16);
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if sender.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!("input read failed: {err}");
                    break;
                }
            }
        }
    });
    Ok(receiver)
}

/// Drive the pipeline from a chunk channel into a set of handlers.
fn run_decoder(receiver: Receiver<Vec<u8>>, handlers: &mut [Box<dyn Handler>]) -> DarcDecoder {
    let mut decoder = DarcDecoder::new();
    'outer: for chunk in receiver.iter() {
        for byte in chunk {
            for event in decoder.push_bit(byte & 1) {
                for handler in handlers.iter_mut() {
                    match handler.handle(&event) {
                        Ok(()) | Err(HandlerError::Skipped) => {}
                        Err(HandlerError::Io(err)) => {
                            // Typically a closed pipe; stop cleanly.
                            debug!("output closed: {err}");
                            break 'outer;
                        }
                    }
                }
            }
        }
    }
    decoder
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level.into())
        .init();

    let receiver = spawn_reader(&args.input_path)?;

    if args.serve {
        let store = Arc::new(ParkingStore::new());
        let worker_store = store.clone();
        thread::spawn(move || {
            let mut handlers: Vec<Box<dyn Handler>> =
                vec![Box::new(ParkingHandler::new(worker_store))];
            let decoder = run_decoder(receiver, &mut handlers);
            info!("input exhausted: {}", decoder.stats());
        });

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(server::serve(store, &args.host, args.port, &args.cors))?;
    } else {
        let mut handlers: Vec<Box<dyn Handler>> =
            vec![Box::new(DumpHandler::new(std::io::stdout()))];
        let decoder = run_decoder(receiver, &mut handlers);
        info!("{}", decoder.stats());
    }

    Ok(())
}
