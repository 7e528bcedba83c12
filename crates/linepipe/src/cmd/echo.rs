use linepipe_session::{PipeError, PipeListener};

use crate::cmd::{Context, EchoArgs, Interrupt};
use crate::exit::{pipe_error, CliError, CliResult, SUCCESS};
use crate::output::value_type;

enum RecvErrorDisposition {
    Break,
    Skip,
    Fatal(CliError),
}

pub fn run(args: EchoArgs, ctx: &Context) -> CliResult<i32> {
    let listener = PipeListener::bind_in(&ctx.namespace, &args.name)
        .map_err(|err| pipe_error("bind failed", err))?;
    let interrupt = Interrupt::install(listener.cleanup())?;

    let mut session = listener
        .accept()
        .map_err(|err| pipe_error("accept failed", err))?;
    interrupt.attach(&session)?;

    loop {
        let value = match session.receive_value() {
            Ok(value) => value,
            Err(err) => match classify_recv_error(err) {
                RecvErrorDisposition::Break => break,
                RecvErrorDisposition::Skip => continue,
                RecvErrorDisposition::Fatal(cli_err) => return Err(cli_err),
            },
        };

        tracing::info!(
            pipe = session.name(),
            value_type = value_type(&value),
            "echoing message"
        );
        match session.send(&value) {
            Ok(()) => {}
            Err(PipeError::ConnectionClosed) => break,
            Err(err) => return Err(pipe_error("echo send failed", err)),
        }
    }

    session
        .close()
        .map_err(|err| pipe_error("close failed", err))?;
    Ok(SUCCESS)
}

fn classify_recv_error(err: PipeError) -> RecvErrorDisposition {
    match err {
        PipeError::ConnectionClosed => RecvErrorDisposition::Break,
        PipeError::Decode(err) => {
            tracing::warn!(error = %err, "skipping undecodable message");
            RecvErrorDisposition::Skip
        }
        other => RecvErrorDisposition::Fatal(pipe_error("receive failed", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linepipe_frame::CodecError;

    #[test]
    fn closed_connection_breaks_loop() {
        let disposition = classify_recv_error(PipeError::ConnectionClosed);
        assert!(matches!(disposition, RecvErrorDisposition::Break));
    }

    #[test]
    fn undecodable_message_is_skipped() {
        let disposition = classify_recv_error(PipeError::Decode(CodecError::Text));
        assert!(matches!(disposition, RecvErrorDisposition::Skip));
    }

    #[test]
    fn io_error_is_fatal() {
        let disposition = classify_recv_error(PipeError::Io(std::io::Error::other("boom")));
        assert!(matches!(disposition, RecvErrorDisposition::Fatal(_)));
    }
}
