use crate::cmd::DeviceArgs;
use crate::exit::{driver_error, CliResult, SUCCESS};
use crate::output::{print_errors, OutputFormat};

pub fn run(args: DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let mut lmg = args.connect()?;
    let errors = lmg
        .read_pending_errors()
        .map_err(|err| driver_error("error queue read failed", err));
    let disconnected = lmg
        .disconnect()
        .map_err(|err| driver_error("disconnect failed", err));
    let errors = errors?;
    disconnected?;

    print_errors(&errors, args.device, &args.peer(), format);
    Ok(SUCCESS)
}
