use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use linepipe_session::{dial_with_config, AbortHandle, DialConfig, Session};
use serde_json::Value;

use crate::cmd::{Context, SendArgs};
use crate::exit::{pipe_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::print_message;

pub fn run(args: SendArgs, ctx: &Context) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;

    let config = DialConfig::default()
        .with_host(args.host.clone())
        .with_namespace(ctx.namespace.clone());
    let mut session =
        dial_with_config(&args.name, &config).map_err(|err| pipe_error("dial failed", err))?;

    session
        .send(&payload)
        .map_err(|err| pipe_error("send failed", err))?;

    if args.wait {
        let reply = receive_reply(&mut session, wait_timeout)?;
        print_message(&reply, session.name(), ctx.format);
    }

    session
        .close()
        .map_err(|err| pipe_error("close failed", err))?;
    Ok(SUCCESS)
}

/// Wait up to `timeout` for one reply.
///
/// The deadline aborts the session from a timer thread rather than relying on
/// socket timeouts, which synchronous Windows pipe handles do not have.
fn receive_reply(session: &mut Session, timeout: Duration) -> CliResult<Value> {
    let handle = session
        .abort_handle()
        .map_err(|err| pipe_error("abort handle unavailable", err))?;
    let deadline = ReplyDeadline::arm(handle, timeout);
    let reply = session.receive_value();
    let expired = deadline.disarm();

    match reply {
        Ok(value) => Ok(value),
        // The abort surfaces as end-of-stream on Unix and as a cancelled read
        // on Windows.
        Err(_) if expired => Err(CliError::new(
            TIMEOUT,
            format!("no reply within {}ms", timeout.as_millis()),
        )),
        Err(err) => Err(pipe_error("receive failed", err)),
    }
}

/// Aborts a session once `timeout` passes unless disarmed first.
struct ReplyDeadline {
    cancel: mpsc::Sender<()>,
    expired: Arc<AtomicBool>,
    timer: JoinHandle<()>,
}

impl ReplyDeadline {
    fn arm(handle: AbortHandle, timeout: Duration) -> Self {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let expired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&expired);
        let timer = std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(timeout) {
                flag.store(true, Ordering::SeqCst);
                tracing::debug!("reply deadline passed; aborting session");
                if let Err(err) = handle.abort() {
                    tracing::warn!(error = %err, "session abort failed");
                }
            }
        });
        Self {
            cancel,
            expired,
            timer,
        }
    }

    /// Stop the timer. Returns whether it fired.
    fn disarm(self) -> bool {
        drop(self.cancel);
        let _ = self.timer.join();
        self.expired.load(Ordering::SeqCst)
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Value> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    if let Some(data) = &args.data {
        return Ok(Value::String(data.clone()));
    }
    Err(CliError::new(USAGE, "one of --json or --data is required"))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
