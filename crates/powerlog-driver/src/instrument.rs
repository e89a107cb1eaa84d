use powerlog_line::{Completion, LineSession, Reply};
use powerlog_transport::Transport;
use tracing::{debug, info, warn};

use crate::dialect::{Dialect, DialectState};
use crate::error::{DriverError, Result};
use crate::family::{DeviceFamily, RangePolicy};
use crate::identity::Identity;
use crate::measurement::{parse_frame, split_fields};
use crate::selection::ValueSelection;

/// Lifecycle state of an [`Instrument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentState {
    /// The transport has been closed.
    Disconnected,
    /// Accepting commands in the given dialect.
    Connected(Dialect),
    /// Continuous mode: the analyzer pushes one frame per measurement cycle.
    Streaming,
}

/// A connected LMG power analyzer.
///
/// Owns the command session and the per-connection dialect state. While
/// streaming only [`read_frame`](Self::read_frame),
/// [`read_raw_frame`](Self::read_raw_frame) and
/// [`stop_continuous`](Self::stop_continuous) are accepted; everything else
/// returns [`DriverError::Streaming`].
///
/// Dropping the instrument closes the transport without the
/// [`disconnect`](Self::disconnect) sequence.
#[derive(Debug)]
pub struct Instrument<T: Transport> {
    session: LineSession<T>,
    dialect: DialectState,
    family: DeviceFamily,
    streaming: bool,
    selection: Option<ValueSelection>,
}

impl<T: Transport> Instrument<T> {
    /// Wrap a connected transport. The dialect starts as SCPI.
    pub fn new(transport: T, family: DeviceFamily) -> Self {
        Self {
            session: LineSession::with_config(transport, family.line_config()),
            dialect: DialectState::new(family.dialect_commands()),
            family,
            streaming: false,
            selection: None,
        }
    }

    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    pub fn state(&self) -> InstrumentState {
        if !self.session.is_open() {
            InstrumentState::Disconnected
        } else if self.streaming {
            InstrumentState::Streaming
        } else {
            InstrumentState::Connected(self.dialect.current())
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// The armed value selection, if any.
    pub fn selection(&self) -> Option<&ValueSelection> {
        self.selection.as_ref()
    }

    /// Break, forget the dialect, then clear and reset the analyzer.
    ///
    /// A failed break is logged and the reset continues. Each reset command is
    /// confirmed with the operation-complete query.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_idle("reset")?;
        if !self.session.send_break() {
            warn!(family = %self.family, "break not acknowledged; continuing reset");
        }
        self.dialect.reset();
        for command in self.family.reset_commands() {
            self.session.send_command(command)?;
        }
        info!(family = %self.family, "instrument reset");
        Ok(())
    }

    /// Query `*idn?` in SCPI.
    pub fn read_identity(&mut self) -> Result<Identity> {
        self.ensure_idle("read_identity")?;
        let reply = self.query_scpi("*idn?")?;
        let identity = Identity::parse(reply.text());
        debug!(?identity, "identity");
        Ok(identity)
    }

    /// Drain the error queue. Returns the raw list; empty on timeout.
    pub fn read_pending_errors(&mut self) -> Result<String> {
        self.ensure_idle("read_pending_errors")?;
        self.drain_errors()
    }

    /// Set measurement ranges in amperes and volts.
    ///
    /// Multi-channel analyzers get auto-range off and both ranges on every
    /// channel, so both values are required. Single-channel analyzers switch
    /// each quantity to manual with the given range, or to auto-range when the
    /// value is `None`.
    pub fn configure_ranges(&mut self, current: Option<f64>, voltage: Option<f64>) -> Result<()> {
        self.ensure_idle("configure_ranges")?;
        match self.family.range_policy() {
            RangePolicy::PerChannel { channels } => {
                let (Some(current), Some(voltage)) = (current, voltage) else {
                    return Err(DriverError::MissingRange { channels });
                };
                for c in 1..=channels {
                    self.send_short_cmd(&format!(
                        "iauto{c} 0;uauto{c} 0;irng{c} {current};urng{c} {voltage}"
                    ))?;
                }
            }
            RangePolicy::Single => {
                self.configure_single_range("iam", "irng", current)?;
                self.configure_single_range("uam", "urng", voltage)?;
            }
        }
        info!(?current, ?voltage, "ranges configured");
        Ok(())
    }

    fn configure_single_range(&mut self, mode: &str, range: &str, value: Option<f64>) -> Result<()> {
        match value {
            Some(value) => {
                self.send_short_cmd(&format!("{mode} manual"))?;
                self.send_short_cmd(&format!("{range} {value}"))?;
            }
            None => {
                self.send_short_cmd(&format!("{mode} auto"))?;
            }
        }
        Ok(())
    }

    /// Arm `selection` for all following frame reads.
    pub fn select_values(&mut self, selection: ValueSelection) -> Result<()> {
        self.ensure_idle("select_values")?;
        self.send_short(&selection.to_command())?;
        debug!(values = selection.len(), "value selection armed");
        self.selection = Some(selection);
        Ok(())
    }

    /// Switch continuous mode on.
    ///
    /// Reconnects first if the stream position is lost, so no stale reply is
    /// read as a frame.
    pub fn start_continuous(&mut self) -> Result<()> {
        self.ensure_idle("start_continuous")?;
        self.resync()?;
        self.send_short("cont on")?;
        self.streaming = true;
        info!(family = %self.family, "continuous mode on");
        Ok(())
    }

    /// Switch continuous mode off. Accepted in any state.
    ///
    /// Also sent on a fresh connection, since the analyzer may still be
    /// streaming from an earlier session.
    pub fn stop_continuous(&mut self) -> Result<()> {
        self.send_short("cont off")?;
        if self.streaming {
            info!(family = %self.family, "continuous mode off");
        }
        self.streaming = false;
        Ok(())
    }

    /// Receive one frame and parse it into numbers.
    ///
    /// Sends nothing. A timeout or blank line yields an empty frame. A
    /// non-numeric field or a value count that differs from the armed
    /// selection fails this frame only.
    pub fn read_frame(&mut self) -> Result<Vec<f64>> {
        let Some(line) = self.next_line()? else {
            return Ok(Vec::new());
        };
        let frame = parse_frame(&line)?;
        self.check_length(frame.len())?;
        Ok(frame)
    }

    /// Like [`read_frame`](Self::read_frame) but keeps the fields as text.
    pub fn read_raw_frame(&mut self) -> Result<Vec<String>> {
        let Some(line) = self.next_line()? else {
            return Ok(Vec::new());
        };
        let fields: Vec<String> = split_fields(&line).into_iter().map(str::to_string).collect();
        self.check_length(fields.len())?;
        Ok(fields)
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        match self.session.receive_line()? {
            Reply::Line(line) => Ok(Some(line)),
            Reply::TimedOut { .. } => Ok(None),
        }
    }

    fn check_length(&self, actual: usize) -> Result<()> {
        match &self.selection {
            Some(selection) if actual != 0 && actual != selection.len() => {
                Err(DriverError::FrameLength {
                    expected: selection.len(),
                    actual,
                })
            }
            _ => Ok(()),
        }
    }

    /// Hand the front panel back to the operator.
    pub fn go_to_local(&mut self) -> Result<()> {
        self.ensure_idle("go_to_local")?;
        self.session.send("gtl")?;
        Ok(())
    }

    /// Set the measurement cycle time in seconds.
    pub fn set_cycle_time(&mut self, seconds: f64) -> Result<()> {
        self.ensure_idle("set_cycle_time")?;
        self.send_short_cmd(&format!("cycl {seconds}"))?;
        Ok(())
    }

    /// Enable the 60 Hz low-pass filter.
    pub fn enable_lowpass_60hz(&mut self) -> Result<()> {
        self.ensure_idle("enable_lowpass_60hz")?;
        self.send_short_cmd("faaf 0")?;
        self.send_short_cmd("filt 4")?;
        Ok(())
    }

    pub fn beep(&mut self) -> Result<()> {
        self.ensure_idle("beep")?;
        self.send_short_cmd("beep")?;
        Ok(())
    }

    /// Send a short-form command confirmed by the operation-complete query.
    pub fn short_command(&mut self, command: &str) -> Result<Completion> {
        self.ensure_idle("short_command")?;
        self.send_short_cmd(command)
    }

    /// Send a SCPI query and return its reply.
    pub fn scpi_query(&mut self, command: &str) -> Result<Reply> {
        self.ensure_idle("scpi_query")?;
        self.query_scpi(command)
    }

    /// Whether a timeout left the stream position unknown.
    ///
    /// Queries and [`start_continuous`](Self::start_continuous) reconnect on
    /// their own; a streaming caller checks this after an empty frame.
    pub fn needs_reconnect(&self) -> bool {
        self.session.is_desynchronized()
    }

    /// Reopen the transport. Dialect and streaming state are kept: they
    /// describe the analyzer, not the socket.
    pub fn reconnect(&mut self) -> Result<()> {
        self.session.reconnect()?;
        info!(family = %self.family, "instrument reconnected");
        Ok(())
    }

    /// Stop streaming if needed, drain errors, go to local, then close.
    ///
    /// Every step runs even if an earlier one failed; the first failure is
    /// returned after the transport is closed.
    pub fn disconnect(mut self) -> Result<()> {
        let mut first_error = None;
        if self.streaming {
            if let Err(err) = self.stop_continuous() {
                first_error.get_or_insert(err);
            }
        }
        match self.drain_errors() {
            Ok(errors) => info!(%errors, "drained error queue"),
            Err(err) => {
                warn!(error = %err, "error queue drain failed");
                first_error.get_or_insert(err);
            }
        }
        if let Err(err) = self.session.send("gtl") {
            first_error.get_or_insert(err.into());
        }
        self.session.close();
        info!(family = %self.family, "instrument disconnected");
        first_error.map_or(Ok(()), Err)
    }

    /// Close the transport without talking to the analyzer. Idempotent.
    pub fn close(&mut self) {
        self.session.close();
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &T {
        self.session.get_ref()
    }

    /// Mutably borrow the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        self.session.get_mut()
    }

    fn ensure_idle(&self, operation: &'static str) -> Result<()> {
        if self.streaming {
            return Err(DriverError::Streaming { operation });
        }
        Ok(())
    }

    fn drain_errors(&mut self) -> Result<String> {
        Ok(self.query_scpi("syst:err:all?")?.into_text())
    }

    fn send_short(&mut self, command: &str) -> Result<()> {
        self.dialect.goto_short(&mut self.session)?;
        self.session.send(command)?;
        Ok(())
    }

    fn resync(&mut self) -> Result<()> {
        if self.session.is_desynchronized() {
            warn!(family = %self.family, "stream position lost; reconnecting");
            self.reconnect()?;
        }
        Ok(())
    }

    fn send_short_cmd(&mut self, command: &str) -> Result<Completion> {
        self.resync()?;
        self.dialect.goto_short(&mut self.session)?;
        Ok(self.session.send_command(command)?)
    }

    fn query_scpi(&mut self, command: &str) -> Result<Reply> {
        self.resync()?;
        self.dialect.goto_scpi(&mut self.session)?;
        Ok(self.session.query(command)?)
    }
}

impl<T: Transport> Drop for Instrument<T> {
    fn drop(&mut self) {
        self.session.close();
    }
}

#[cfg(test)]
mod tests {
    use powerlog_line::LineError;
    use powerlog_transport::TransportError;

    use super::*;
    use crate::testing::FakeInstrument;

    fn lmg670() -> Instrument<FakeInstrument> {
        Instrument::new(FakeInstrument::new(DeviceFamily::Lmg670), DeviceFamily::Lmg670)
    }

    fn lmg95() -> Instrument<FakeInstrument> {
        Instrument::new(FakeInstrument::new(DeviceFamily::Lmg95), DeviceFamily::Lmg95)
    }

    fn sent(instrument: &Instrument<FakeInstrument>) -> Vec<&str> {
        instrument.get_ref().sent.iter().map(String::as_str).collect()
    }

    fn switches(instrument: &Instrument<FakeInstrument>) -> usize {
        sent(instrument)
            .iter()
            .filter(|c| c.starts_with("*zlang") || c.contains("lang "))
            .count()
    }

    fn armed(names: &[&str]) -> Instrument<FakeInstrument> {
        let mut lmg = lmg670();
        lmg.select_values(ValueSelection::new(names.iter().copied()).unwrap())
            .unwrap();
        lmg.start_continuous().unwrap();
        lmg
    }

    #[test]
    fn starts_connected_in_scpi() {
        let lmg = lmg670();
        assert_eq!(lmg.state(), InstrumentState::Connected(Dialect::Scpi));
        assert_eq!(
            serde_json::to_string(&lmg.family()).unwrap(),
            "\"lmg670\""
        );
    }

    #[test]
    fn short_switch_is_sent_once() {
        let mut lmg = lmg670();
        lmg.beep().unwrap();
        lmg.set_cycle_time(0.5).unwrap();
        lmg.enable_lowpass_60hz().unwrap();
        assert_eq!(switches(&lmg), 1);
        assert_eq!(
            sent(&lmg),
            vec![
                "*zlang short",
                "beep;*opc?",
                "cycl 0.5;*opc?",
                "faaf 0;*opc?",
                "filt 4;*opc?"
            ]
        );
        assert_eq!(lmg.state(), InstrumentState::Connected(Dialect::Short));
    }

    #[test]
    fn scpi_switch_only_on_change() {
        let mut lmg = lmg670();
        lmg.read_pending_errors().unwrap();
        assert_eq!(switches(&lmg), 0);
        lmg.beep().unwrap();
        lmg.read_pending_errors().unwrap();
        lmg.read_identity().unwrap();
        assert_eq!(
            sent(&lmg),
            vec![
                "syst:err:all?",
                "*zlang short",
                "beep;*opc?",
                "*zlang scpi",
                "syst:err:all?",
                "*idn?"
            ]
        );
    }

    #[test]
    fn reset_breaks_then_confirms_and_forgets_dialect() {
        let mut lmg = lmg670();
        lmg.beep().unwrap();
        lmg.reset().unwrap();
        assert_eq!(lmg.get_ref().breaks, 1);
        assert_eq!(lmg.state(), InstrumentState::Connected(Dialect::Scpi));
        assert_eq!(sent(&lmg)[2..], ["*rst;*cls;*opc?"]);

        lmg.beep().unwrap();
        assert_eq!(sent(&lmg)[3], "*zlang short");
    }

    #[test]
    fn reset_continues_when_break_fails() {
        let mut lmg = lmg95();
        lmg.get_mut().break_ok = false;
        lmg.get_mut().opc_reply = "0".to_string();
        lmg.reset().unwrap();
        assert_eq!(sent(&lmg), vec!["*cls;*OPC?", "*rst;*OPC?"]);
    }

    #[test]
    fn identity_is_split_on_commas() {
        let mut lmg = lmg670();
        let identity = lmg.read_identity().unwrap();
        assert_eq!(identity.model(), Some("LMG670"));
        assert_eq!(identity.fields.len(), 4);
    }

    #[test]
    fn multi_channel_ranges_cover_seven_channels() {
        let mut lmg = lmg670();
        lmg.configure_ranges(Some(10.0), Some(250.0)).unwrap();
        let commands: Vec<&str> = sent(&lmg)
            .into_iter()
            .filter(|c| c.starts_with("iauto"))
            .collect();
        assert_eq!(commands.len(), 7);
        for (i, command) in commands.iter().enumerate() {
            let c = i + 1;
            assert_eq!(
                *command,
                format!("iauto{c} 0;uauto{c} 0;irng{c} 10;urng{c} 250;*opc?")
            );
        }
    }

    #[test]
    fn multi_channel_ranges_need_both_values() {
        let mut lmg = lmg670();
        let err = lmg.configure_ranges(Some(10.0), None).unwrap_err();
        assert!(matches!(err, DriverError::MissingRange { channels: 7 }));
        assert!(sent(&lmg).is_empty());
    }

    #[test]
    fn single_channel_ranges_manual_or_auto() {
        let mut lmg = lmg95();
        lmg.configure_ranges(Some(10.0), None).unwrap();
        assert_eq!(
            sent(&lmg),
            vec![
                "syst:lang short",
                "iam manual;*OPC?",
                "irng 10;*OPC?",
                "uam auto;*OPC?"
            ]
        );
    }

    #[test]
    fn select_values_sends_action_without_confirmation() {
        let mut lmg = lmg670();
        lmg.select_values(ValueSelection::new(["utrms", "itrms", "p"]).unwrap())
            .unwrap();
        assert_eq!(sent(&lmg), vec!["*zlang short", "actn;utrms?;itrms?;p?"]);
        assert_eq!(lmg.selection().map(ValueSelection::len), Some(3));
    }

    #[test]
    fn read_frame_parses_streamed_values() {
        let mut lmg = armed(&["utrms", "itrms", "p"]);
        lmg.get_mut().push_frame("230.1;1.02;234.7");
        lmg.get_mut().push_frame("");
        lmg.get_mut().push_frame("230.1;bad;234.7");
        let before = lmg.get_ref().sent.len();

        assert_eq!(lmg.read_frame().unwrap(), vec![230.1, 1.02, 234.7]);
        assert!(lmg.read_frame().unwrap().is_empty());
        let err = lmg.read_frame().unwrap_err();
        assert!(matches!(err, DriverError::Parse { .. }));
        assert!(err.is_frame_level());
        assert_eq!(lmg.get_ref().sent.len(), before);
    }

    #[test]
    fn read_frame_checks_selection_length() {
        let mut lmg = armed(&["utrms", "itrms", "p"]);
        lmg.get_mut().push_frame("230.1;1.02");
        let err = lmg.read_frame().unwrap_err();
        assert!(matches!(
            err,
            DriverError::FrameLength {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn raw_frame_keeps_text() {
        let mut lmg = armed(&["p1", "p2"]);
        lmg.get_mut().push_frame("9.91E+37;12.5");
        assert_eq!(lmg.read_raw_frame().unwrap(), vec!["9.91E+37", "12.5"]);
    }

    #[test]
    fn timeout_while_streaming_is_empty_frame() {
        let mut lmg = armed(&["p"]);
        lmg.get_mut().push_timeout(0);
        assert!(lmg.read_frame().unwrap().is_empty());
        assert!(!lmg.needs_reconnect());

        lmg.get_mut().push_timeout(5);
        lmg.get_mut().push_frame("1.0");
        assert!(lmg.read_frame().unwrap().is_empty());
        assert!(lmg.needs_reconnect());
        lmg.reconnect().unwrap();
        assert!(!lmg.needs_reconnect());
        assert_eq!(lmg.state(), InstrumentState::Streaming);
        assert_eq!(lmg.get_ref().reconnects, 1);
    }

    #[test]
    fn streaming_rejects_commands() {
        let mut lmg = armed(&["p"]);
        assert_eq!(lmg.state(), InstrumentState::Streaming);
        let before = lmg.get_ref().sent.len();

        assert!(matches!(
            lmg.configure_ranges(Some(1.0), Some(1.0)),
            Err(DriverError::Streaming {
                operation: "configure_ranges"
            })
        ));
        assert!(lmg.read_identity().is_err());
        assert!(lmg.reset().is_err());
        assert!(lmg.start_continuous().is_err());
        assert!(lmg.select_values(ValueSelection::new(["p"]).unwrap()).is_err());
        assert_eq!(lmg.get_ref().sent.len(), before);

        lmg.stop_continuous().unwrap();
        assert_eq!(lmg.get_ref().sent.last().map(String::as_str), Some("cont off"));
        assert!(lmg.read_identity().is_ok());
    }

    #[test]
    fn stop_continuous_on_fresh_connection() {
        let mut lmg = lmg95();
        lmg.stop_continuous().unwrap();
        assert_eq!(sent(&lmg), vec!["syst:lang short", "cont off"]);
    }

    #[test]
    fn disconnect_stops_drains_goes_local_then_closes() {
        let lmg = armed(&["p"]);
        let journal = lmg.get_ref().journal();
        journal.borrow_mut().clear();

        lmg.disconnect().unwrap();
        assert_eq!(
            *journal.borrow(),
            vec!["cont off", "*zlang scpi", "syst:err:all?", "gtl", "<close>"]
        );
    }

    #[test]
    fn disconnect_when_idle_skips_cont_off() {
        let lmg = lmg95();
        let journal = lmg.get_ref().journal();
        lmg.disconnect().unwrap();
        assert_eq!(*journal.borrow(), vec!["syst:err:all?", "gtl", "<close>"]);
    }

    #[test]
    fn late_reset_reply_is_not_read_as_identity() {
        let mut lmg = lmg670();
        lmg.get_mut().late.push("*rst;*cls;*opc?".to_string());
        lmg.reset().unwrap();
        assert!(lmg.needs_reconnect());

        let identity = lmg.read_identity().unwrap();
        assert_eq!(identity.model(), Some("LMG670"));
        assert_eq!(lmg.get_ref().reconnects, 1);
        assert!(!lmg.needs_reconnect());
    }

    #[test]
    fn late_range_reply_is_not_streamed_as_frame() {
        let mut lmg = lmg670();
        lmg.select_values(ValueSelection::new(["p"]).unwrap()).unwrap();
        lmg.get_mut().late.push("beep;*opc?".to_string());
        lmg.beep().unwrap();

        lmg.start_continuous().unwrap();
        assert_eq!(lmg.get_ref().reconnects, 1);
        lmg.get_mut().push_frame("12.5");
        assert_eq!(lmg.read_frame().unwrap(), vec![12.5]);
    }

    #[test]
    fn disconnect_goes_local_and_closes_when_drain_times_out() {
        let mut lmg = lmg670();
        lmg.get_mut().late.push("syst:err:all?".to_string());
        let journal = lmg.get_ref().journal();

        lmg.disconnect().unwrap();
        assert_eq!(*journal.borrow(), vec!["syst:err:all?", "gtl", "<close>"]);
    }

    #[test]
    fn disconnect_closes_even_when_drain_fails() {
        let mut lmg = lmg670();
        lmg.get_mut().closed = true;
        let err = lmg.disconnect().unwrap_err();
        assert!(matches!(
            err,
            DriverError::Line(LineError::Transport(TransportError::NotConnected))
        ));
    }
}
