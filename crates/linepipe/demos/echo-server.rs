//! Minimal echo server: accepts one peer and echoes messages back.
//!
//! Run with:
//!   cargo run -p linepipe --example echo-server
//!
//! In another terminal:
//!   cargo run -p linepipe --features cli -- send linepipe-echo-example \
//!     --json '{"hello":"world"}' --wait

use linepipe::{PipeError, PipeListener};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = PipeListener::bind("linepipe-echo-example")?;
    eprintln!("Listening on {}", listener.path().display());

    let mut session = listener.accept()?;
    eprintln!("Peer connected");

    loop {
        match session.receive_value() {
            Ok(value) => {
                eprintln!("Received {value}");
                session.send(&value)?;
            }
            Err(PipeError::Decode(err)) => eprintln!("Skipping bad message: {err}"),
            Err(e) => {
                eprintln!("Peer disconnected: {e}");
                break;
            }
        }
    }

    session.close()?;
    Ok(())
}
