//! Stream a few frames from an analyzer and print them.
//!
//! Run with:
//!   cargo run --example stream-frames -- <host> [lmg95|lmg670] [frames]

use powerlog::driver::{connect, reading, DeviceFamily, ValueSelection};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().ok_or("usage: stream-frames <host> [family] [frames]")?;
    let family: DeviceFamily = args.next().as_deref().unwrap_or("lmg95").parse()?;
    let frames: usize = args.next().as_deref().unwrap_or("5").parse()?;

    let mut lmg = connect(&host, None, family)?;
    lmg.stop_continuous()?;
    lmg.reset()?;
    eprintln!("connected to {:?}", lmg.read_identity()?.model());

    let selection = ValueSelection::new(["utrms", "itrms", "p"])?;
    let names = selection.names().to_vec();
    lmg.select_values(selection)?;
    lmg.start_continuous()?;

    let mut seen = 0;
    while seen < frames {
        let frame = match lmg.read_frame() {
            Ok(frame) if frame.is_empty() => continue,
            Ok(frame) => frame,
            Err(err) if err.is_frame_level() => {
                eprintln!("skipping frame: {err}");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        for (name, value) in names.iter().zip(frame) {
            match reading(value) {
                Some(value) => print!("{name}={value} "),
                None => print!("{name}=- "),
            }
        }
        println!();
        seen += 1;
    }

    lmg.stop_continuous()?;
    lmg.disconnect()?;
    Ok(())
}
