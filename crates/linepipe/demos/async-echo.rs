//! Async echo server on tokio. Stops on Ctrl-C even before a peer connects.
//!
//! Run with:
//!   cargo run -p linepipe --example async-echo --features async

use linepipe::{AsyncPipeListener, PipeError};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = AsyncPipeListener::bind("linepipe-async-echo")?;
    eprintln!("Listening on {}", listener.path().display());

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let mut session = match listener.accept_until(&shutdown).await {
        Ok(session) => session,
        Err(PipeError::Cancelled) => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            received = session.receive_value() => match received {
                Ok(value) => session.send(&value).await?,
                Err(PipeError::Decode(err)) => eprintln!("Skipping bad message: {err}"),
                Err(_) => break,
            },
        }
    }

    session.close().await?;
    Ok(())
}
