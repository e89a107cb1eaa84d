use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use powerlog_driver::{Instrument, RangePolicy, ValueSelection};
use powerlog_transport::Transport;
use tracing::{info, warn};

use crate::cmd::LogArgs;
use crate::exit::{driver_error, io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_frame, print_summary, unix_time, FrameValues, LogSummary, OutputFormat};

pub fn run(args: LogArgs, format: OutputFormat) -> CliResult<i32> {
    let family = args.device.device;
    let selection = match &args.values {
        Some(values) => ValueSelection::new(values.iter().map(|v| v.trim()))
            .map_err(|err| driver_error("invalid --values", err))?,
        None => family.default_selection(),
    };
    let (current, voltage) = if args.auto_range {
        if let RangePolicy::PerChannel { .. } = family.range_policy() {
            return Err(CliError::usage(format!(
                "--auto-range is not supported on {family}; give --current and --voltage"
            )));
        }
        (None, None)
    } else {
        (Some(args.current), Some(args.voltage))
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut lmg = args.device.connect()?;
    if let Err(err) = prepare(&mut lmg, &args, selection.clone(), current, voltage) {
        let _ = shutdown(lmg, None);
        return Err(err);
    }

    let file = match File::create(&args.logfile) {
        Ok(file) => file,
        Err(err) => {
            let _ = shutdown(lmg, None);
            return Err(io_error(
                &format!("cannot create {}", args.logfile.display()),
                err,
            ));
        }
    };
    let mut log = BufWriter::new(file);
    let mut summary = LogSummary {
        logfile: args.logfile.display().to_string(),
        ..LogSummary::default()
    };

    let streamed = stream(&mut lmg, &mut log, &args, &selection, &running, &mut summary, format);
    summary.interrupted = !running.load(Ordering::SeqCst);
    if !args.verbose {
        eprintln!();
    }
    let shutdown_result = shutdown(lmg, Some(&mut log));
    streamed?;
    shutdown_result?;

    print_summary(&summary, format);
    Ok(SUCCESS)
}

/// Bring the analyzer from an unknown state to an armed value selection.
fn prepare<T: Transport>(
    lmg: &mut Instrument<T>,
    args: &LogArgs,
    selection: ValueSelection,
    current: Option<f64>,
    voltage: Option<f64>,
) -> CliResult<()> {
    lmg.stop_continuous()
        .map_err(|err| driver_error("stop continuous mode failed", err))?;
    info!("performing device reset");
    lmg.reset().map_err(|err| driver_error("reset failed", err))?;

    let identity = lmg
        .read_identity()
        .map_err(|err| driver_error("identify failed", err))?;
    info!(model = identity.model().unwrap_or("unknown"), "device found");

    let errors = lmg
        .read_pending_errors()
        .map_err(|err| driver_error("error queue read failed", err))?;
    info!(%errors, "error queue before setup");

    lmg.set_cycle_time(args.interval)
        .map_err(|err| driver_error("set interval failed", err))?;
    if args.lowpass {
        lmg.enable_lowpass_60hz()
            .map_err(|err| driver_error("low-pass setup failed", err))?;
    }
    lmg.configure_ranges(current, voltage)
        .map_err(|err| driver_error("range setup failed", err))?;
    lmg.select_values(selection)
        .map_err(|err| driver_error("value selection failed", err))?;
    Ok(())
}

fn stream<T: Transport, W: Write>(
    lmg: &mut Instrument<T>,
    log: &mut W,
    args: &LogArgs,
    selection: &ValueSelection,
    running: &AtomicBool,
    summary: &mut LogSummary,
    format: OutputFormat,
) -> CliResult<()> {
    let write_failed = |err: std::io::Error| io_error("log write failed", err);

    writeln!(log, "# time {}", selection.names().join(" ")).map_err(write_failed)?;
    if !running.load(Ordering::SeqCst) {
        return Ok(());
    }
    if lmg.needs_reconnect() {
        warn!("reply missed during setup; reconnecting");
        reconnect(lmg, summary)?;
    }
    lmg.start_continuous()
        .map_err(|err| driver_error("continuous mode failed", err))?;
    info!(logfile = %summary.logfile, "writing values; press Ctrl-C to stop");

    while running.load(Ordering::SeqCst) {
        if args.count.is_some_and(|count| summary.frames_written >= count) {
            break;
        }
        let read = if args.raw {
            lmg.read_raw_frame().map(FrameValues::Raw)
        } else {
            lmg.read_frame().map(FrameValues::Numeric)
        };
        let frame = match read {
            Ok(frame) => frame,
            Err(err) if err.is_frame_level() => {
                warn!(error = %err, "skipping frame");
                summary.parse_failures += 1;
                continue;
            }
            Err(err) => return Err(driver_error("read failed", err)),
        };

        if frame.is_empty() {
            summary.empty_reads += 1;
            if lmg.needs_reconnect() {
                warn!("partial frame dropped; reconnecting");
                reconnect(lmg, summary)?;
            }
            continue;
        }

        let time = unix_time();
        writeln!(log, "{}", frame.log_line(time)).map_err(write_failed)?;
        log.flush().map_err(write_failed)?;
        summary.frames_written += 1;

        if args.verbose {
            print_frame(&frame, time, selection.names(), format);
        } else {
            eprint!("\r{}", summary.frames_written);
        }
    }
    Ok(())
}

fn reconnect<T: Transport>(lmg: &mut Instrument<T>, summary: &mut LogSummary) -> CliResult<()> {
    lmg.reconnect()
        .map_err(|err| driver_error("reconnect failed", err))?;
    summary.reconnects += 1;
    Ok(())
}

/// Continuous mode off, flush the log, disconnect. Always runs every step.
fn shutdown<T: Transport>(mut lmg: Instrument<T>, log: Option<&mut dyn Write>) -> CliResult<()> {
    let mut first_error = None;
    if let Err(err) = lmg.stop_continuous() {
        warn!(error = %err, "stopping continuous mode failed");
        first_error.get_or_insert(driver_error("stop continuous mode failed", err));
    }
    if let Some(log) = log {
        if let Err(err) = log.flush() {
            first_error.get_or_insert(io_error("log flush failed", err));
        }
    }
    if let Err(err) = lmg.disconnect() {
        warn!(error = %err, "disconnect incomplete");
        first_error.get_or_insert(driver_error("disconnect failed", err));
    }
    first_error.map_or(Ok(()), Err)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
