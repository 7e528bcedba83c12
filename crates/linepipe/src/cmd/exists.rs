use linepipe_transport::{pipe_exists_in, validate_name};

use crate::cmd::{Context, ExistsArgs};
use crate::exit::{transport_error, CliResult, FAILURE, SUCCESS};
use crate::output::print_exists;

pub fn run(args: ExistsArgs, ctx: &Context) -> CliResult<i32> {
    validate_name(&args.name).map_err(|err| transport_error("invalid name", err))?;
    let exists = pipe_exists_in(&ctx.namespace, &args.name)
        .map_err(|err| transport_error("listing failed", err))?;
    print_exists(&args.name, exists, ctx.format);
    Ok(if exists { SUCCESS } else { FAILURE })
}
