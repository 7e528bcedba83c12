mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;
use linepipe_transport::PipeNamespace;

use crate::cmd::{Command, Context};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "linepipe", version, about = "Structured messages over named pipes")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Namespace root holding the pipes. Defaults to the platform root.
    #[arg(long, value_name = "DIR", env = "LINEPIPE_NAMESPACE", global = true)]
    namespace: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let ctx = Context {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        namespace: cli.namespace.map(PipeNamespace::new).unwrap_or_default(),
    };
    let result = cmd::run(cli.command, &ctx);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "linepipe",
            "send",
            "build-agent",
            "--data",
            "hello",
            "--host",
            "buildbox",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.name, "build-agent");
                assert_eq!(args.host, "buildbox");
                assert!(!args.wait);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "linepipe",
            "send",
            "build-agent",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn send_requires_a_payload() {
        let err = Cli::try_parse_from(["linepipe", "send", "build-agent"])
            .expect_err("missing payload should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn namespace_flag_is_global() {
        let cli = Cli::try_parse_from(["linepipe", "list", "--namespace", "/tmp/lp-cli-ns"])
            .expect("list args should parse");
        assert_eq!(cli.namespace, Some(PathBuf::from("/tmp/lp-cli-ns")));
        assert!(matches!(cli.command, Command::List(_)));
    }

    #[test]
    fn parses_listen_count() {
        let cli = Cli::try_parse_from(["linepipe", "listen", "svc", "--count", "2"])
            .expect("listen args should parse");
        match cli.command {
            Command::Listen(args) => assert_eq!(args.count, Some(2)),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
