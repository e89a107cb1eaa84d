use crate::cmd::DeviceArgs;
use crate::exit::{driver_error, CliResult, SUCCESS};
use crate::output::{print_identity, OutputFormat};

pub fn run(args: DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let mut lmg = args.connect()?;
    let identity = lmg
        .read_identity()
        .map_err(|err| driver_error("identify failed", err));
    let disconnected = lmg
        .disconnect()
        .map_err(|err| driver_error("disconnect failed", err));
    let identity = identity?;
    disconnected?;

    print_identity(&identity, args.device, &args.peer(), format);
    Ok(SUCCESS)
}
