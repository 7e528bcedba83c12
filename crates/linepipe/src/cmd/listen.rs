use linepipe_session::{PipeError, PipeListener};

use crate::cmd::{Context, Interrupt, ListenArgs};
use crate::exit::{pipe_error, CliResult, SUCCESS};
use crate::output::print_message;

pub fn run(args: ListenArgs, ctx: &Context) -> CliResult<i32> {
    let listener = PipeListener::bind_in(&ctx.namespace, &args.name)
        .map_err(|err| pipe_error("bind failed", err))?;
    let interrupt = Interrupt::install(listener.cleanup())?;

    let mut session = listener
        .accept()
        .map_err(|err| pipe_error("accept failed", err))?;
    interrupt.attach(&session)?;

    let mut printed = 0usize;
    loop {
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
        let value = match session.receive_value() {
            Ok(value) => value,
            Err(PipeError::ConnectionClosed) => break,
            Err(PipeError::Decode(err)) => {
                tracing::warn!(error = %err, "skipping undecodable message");
                continue;
            }
            Err(err) => return Err(pipe_error("receive failed", err)),
        };

        print_message(&value, session.name(), ctx.format);
        printed = printed.saturating_add(1);
    }

    session
        .close()
        .map_err(|err| pipe_error("close failed", err))?;
    Ok(SUCCESS)
}
