//! In-memory instrument double for driver tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use powerlog_transport::{Result as TransportResult, Transport, TransportError};

use crate::family::DeviceFamily;

enum Incoming {
    Line(String),
    Timeout(usize),
}

/// Answers `*opc?`, `*idn?` and `syst:err:all?`; streams queued frame lines.
///
/// Everything written is recorded in `sent` with the terminator stripped.
/// Commands listed in `late` are answered only after their read has timed
/// out, so the reply sits in front of the next one until a reconnect.
///
/// The shared journal records the same commands plus `<close>`, and outlives
/// the instrument that owns the double.
pub(crate) struct FakeInstrument {
    pub sent: Vec<String>,
    pub idn: String,
    pub errors: String,
    pub opc_reply: String,
    pub break_ok: bool,
    pub breaks: usize,
    pub reconnects: usize,
    pub closed: bool,
    pub late: Vec<String>,
    journal: Rc<RefCell<Vec<String>>>,
    terminator: &'static str,
    replies: VecDeque<Incoming>,
    stream: VecDeque<Incoming>,
}

impl FakeInstrument {
    pub fn new(family: DeviceFamily) -> Self {
        let terminator = match family.terminator().as_bytes() {
            b"\r\n" => "\r\n",
            _ => "\n",
        };
        Self {
            sent: Vec::new(),
            idn: "ZES ZIMMER,LMG670,01234,2.1".to_string(),
            errors: "0,\"No error\"".to_string(),
            opc_reply: "1".to_string(),
            break_ok: true,
            breaks: 0,
            reconnects: 0,
            closed: false,
            late: Vec::new(),
            journal: Rc::default(),
            terminator,
            replies: VecDeque::new(),
            stream: VecDeque::new(),
        }
    }

    pub fn journal(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.journal)
    }

    /// Queue one streamed line.
    pub fn push_frame(&mut self, line: &str) {
        self.stream.push_back(Incoming::Line(line.to_string()));
    }

    /// Queue a read timeout that dropped `discarded` partial bytes.
    pub fn push_timeout(&mut self, discarded: usize) {
        self.stream.push_back(Incoming::Timeout(discarded));
    }

    fn respond(&mut self, command: &str) {
        let reply = if command.ends_with(";*opc?") || command.ends_with(";*OPC?") {
            Some(self.opc_reply.clone())
        } else if command == "*idn?" {
            Some(self.idn.clone())
        } else if command == "syst:err:all?" {
            Some(self.errors.clone())
        } else {
            None
        };
        if let Some(reply) = reply {
            if self.late.iter().any(|late| late == command) {
                self.replies.push_back(Incoming::Timeout(0));
            }
            self.replies.push_back(Incoming::Line(reply));
        }
    }
}

impl Transport for FakeInstrument {
    fn send(&mut self, bytes: &[u8]) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::NotConnected);
        }
        let text = String::from_utf8(bytes.to_vec()).expect("commands are ascii");
        let command = text
            .strip_suffix(self.terminator)
            .expect("command carries the family terminator")
            .to_string();
        self.respond(&command);
        self.journal.borrow_mut().push(command.clone());
        self.sent.push(command);
        Ok(())
    }

    fn receive_until(&mut self, _terminator: &[u8], timeout: Duration) -> TransportResult<Bytes> {
        if self.closed {
            return Err(TransportError::NotConnected);
        }
        let next = match self.replies.pop_front() {
            Some(incoming) => Some(incoming),
            None => self.stream.pop_front(),
        };
        match next {
            Some(Incoming::Line(line)) => Ok(Bytes::from(line)),
            Some(Incoming::Timeout(discarded)) => Err(TransportError::Timeout { timeout, discarded }),
            None => Err(TransportError::Timeout {
                timeout,
                discarded: 0,
            }),
        }
    }

    fn send_break(&mut self) -> bool {
        self.breaks += 1;
        self.break_ok
    }

    fn close(&mut self) {
        if !self.closed {
            self.journal.borrow_mut().push("<close>".to_string());
        }
        self.closed = true;
    }

    fn reconnect(&mut self) -> TransportResult<()> {
        self.reconnects += 1;
        self.closed = false;
        self.replies.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}
