use std::sync::{Arc, Mutex};

use clap::{Args, Subcommand};
use linepipe_session::{AbortHandle, Session};
use linepipe_transport::{EndpointCleanup, PipeNamespace};

use crate::exit::{pipe_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::OutputFormat;

pub mod echo;
pub mod exists;
pub mod list;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen on a pipe and print every received message.
    Listen(ListenArgs),
    /// Listen on a pipe and send every received message back.
    Echo(EchoArgs),
    /// Dial a pipe and send a single message.
    Send(SendArgs),
    /// List the pipes currently open in the namespace.
    List(ListArgs),
    /// Exit 0 if a pipe is open, 1 otherwise.
    Exists(ExistsArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    pub namespace: PipeNamespace,
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, ctx),
        Command::Echo(args) => echo::run(args, ctx),
        Command::Send(args) => send::run(args, ctx),
        Command::List(args) => list::run(args, ctx),
        Command::Exists(args) => exists::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Pipe name to create.
    pub name: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Pipe name to create.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Pipe name to dial.
    pub name: String,
    /// JSON payload.
    #[arg(long, conflicts_with = "data", required_unless_present = "data")]
    pub json: Option<String>,
    /// Plain string payload, sent as a JSON string.
    #[arg(long, conflicts_with = "json")]
    pub data: Option<String>,
    /// Host the pipe lives on.
    #[arg(long, default_value = ".")]
    pub host: String,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {}

#[derive(Args, Debug)]
pub struct ExistsArgs {
    /// Pipe name to look for.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Ctrl-C handling for commands that own an endpoint.
///
/// While the command waits for its peer the handler removes the endpoint and
/// exits. Once a session is attached it aborts the session instead, so the
/// blocked receive returns and the command unwinds normally.
#[derive(Clone)]
pub struct Interrupt {
    state: Arc<InterruptState>,
}

struct InterruptState {
    endpoint: EndpointCleanup,
    abort: Mutex<Option<AbortHandle>>,
}

impl Interrupt {
    pub fn install(endpoint: EndpointCleanup) -> CliResult<Self> {
        let interrupt = Self {
            state: Arc::new(InterruptState {
                endpoint,
                abort: Mutex::new(None),
            }),
        };
        let handler = interrupt.clone();
        ctrlc::set_handler(move || handler.trigger()).map_err(|err| {
            CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
        })?;
        Ok(interrupt)
    }

    pub fn attach(&self, session: &Session) -> CliResult<()> {
        let handle = session
            .abort_handle()
            .map_err(|err| pipe_error("abort handle unavailable", err))?;
        if let Ok(mut slot) = self.state.abort.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    fn trigger(&self) {
        if let Ok(slot) = self.state.abort.lock() {
            if let Some(handle) = slot.as_ref() {
                tracing::info!("interrupted; closing session");
                if let Err(err) = handle.abort() {
                    tracing::warn!(error = %err, "session abort failed");
                }
                return;
            }
        }
        tracing::info!("interrupted before a peer connected");
        self.state.endpoint.remove();
        std::process::exit(SUCCESS);
    }
}
