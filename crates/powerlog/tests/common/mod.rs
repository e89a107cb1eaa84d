//! Scripted LMG670 stand-in on a loopback socket.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const IDN: &str = "ZES ZIMMER,LMG670,01234,2.1";

const FRAME_PERIOD: Duration = Duration::from_millis(20);

/// Accepts one client, answers queries and streams frames while `cont on`.
///
/// Frames carry one value per `?` of the last `actn` command; the second value
/// is always the NaN code.
pub struct FakeAnalyzer {
    pub port: u16,
    handle: JoinHandle<Vec<String>>,
}

impl FakeAnalyzer {
    pub fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("fake analyzer should bind");
        let port = listener
            .local_addr()
            .expect("listener should have an address")
            .port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("fake analyzer should accept");
            serve(stream)
        });
        Self { port, handle }
    }

    /// Wait for the client to hang up and return every command received.
    pub fn finish(self) -> Vec<String> {
        self.handle.join().expect("fake analyzer thread should finish")
    }
}

fn serve(stream: TcpStream) -> Vec<String> {
    stream
        .set_read_timeout(Some(FRAME_PERIOD))
        .expect("read timeout should be settable");
    let mut writer = stream.try_clone().expect("stream should clone");
    let mut reader = BufReader::new(stream);
    let mut received = Vec::new();
    let mut pending = String::new();
    let mut values = 0usize;
    let mut streaming = false;
    let mut tick = 0u64;

    loop {
        match reader.read_line(&mut pending) {
            Ok(0) => return received,
            Ok(_) if pending.ends_with('\n') => {
                let command = pending.trim_end().to_string();
                pending.clear();
                if let Some(reply) = answer(&command, &mut values, &mut streaming) {
                    if writer.write_all(format!("{reply}\n").as_bytes()).is_err() {
                        return received;
                    }
                }
                received.push(command);
            }
            Ok(_) => {}
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(_) => return received,
        }

        if streaming && values > 0 {
            tick += 1;
            let frame: Vec<String> = (0..values)
                .map(|i| match i {
                    1 => "9.91E+37".to_string(),
                    _ => format!("{tick}.5"),
                })
                .collect();
            if writer
                .write_all(format!("{}\n", frame.join(";")).as_bytes())
                .is_err()
            {
                return received;
            }
        }
    }
}

fn answer(command: &str, values: &mut usize, streaming: &mut bool) -> Option<String> {
    if command.ends_with(";*opc?") {
        return Some("1".to_string());
    }
    match command {
        "*idn?" => Some(IDN.to_string()),
        "syst:err:all?" => Some("0,\"No error\"".to_string()),
        "cont on" => {
            *streaming = true;
            None
        }
        "cont off" => {
            *streaming = false;
            None
        }
        _ => {
            if command.starts_with("actn;") {
                *values = command.matches('?').count();
            }
            None
        }
    }
}
