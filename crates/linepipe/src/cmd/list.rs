use linepipe_transport::list_pipes_in;

use crate::cmd::{Context, ListArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::print_pipes;

pub fn run(_args: ListArgs, ctx: &Context) -> CliResult<i32> {
    let pipes =
        list_pipes_in(&ctx.namespace).map_err(|err| transport_error("listing failed", err))?;
    print_pipes(&pipes, ctx.format);
    Ok(SUCCESS)
}
