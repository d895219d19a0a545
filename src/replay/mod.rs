//! Replay engine.
//!
//! Walks the sequence with its cursor. Frames the controller originally sent
//! are written to the transport, frames the host sent are awaited and
//! compared against what actually arrives. Attributes on the node and on its
//! type's override slot decide whether a step is skipped, emulated or
//! replayed.

pub mod matcher;
pub mod pacing;

pub use matcher::{MatchResult, check_match};
pub use pacing::{DelayMode, Pacer, delay_for};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::TypeOverrideTable;
use crate::decoder::{LogPrefix, log_frame};
use crate::emulator::Emulator;
use crate::sequence::Sequence;
use crate::transport::Transport;
use crate::types::{Action, Direction, Frame, PacketKind, Timeval};

/// Runtime knobs for a replay run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayOptions {
    pub delay: DelayMode,
    /// Multiplier applied to recorded deltas in [`DelayMode::Delta`].
    pub delay_factor: f64,
    /// Inbound wait limit; `None` blocks until a frame arrives.
    pub timeout: Option<Duration>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self { delay: DelayMode::None, delay_factor: 1.0, timeout: None }
    }
}

/// Counters reported when a run completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Sequence length.
    pub total: usize,
    /// Positions completed, excluding timeouts and unsupported packets.
    pub processed: usize,
    /// Positions given up on after an inbound timeout.
    pub skipped: usize,
    /// Outbound positions whose packet kind cannot be sent.
    pub unsupported: usize,
    /// Received frames that differed from the expected one.
    pub mismatches: usize,
    /// Frames produced by the emulated peer and written out.
    pub emulated: usize,
}

fn as_json<S: Serialize>(value: &S) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}

/// What a single [`ReplayEngine::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The node's own action is `skip`.
    Skipped,
    /// Outbound packet left to the emulated peer or suppressed by its type slot.
    Satisfied,
    Sent,
    Unsupported(PacketKind),
    Matched,
    Mismatched { description: String, advanced: bool },
    /// Received frame handed to the emulated peer.
    Forwarded { matched: bool, advanced: bool },
    TimedOut,
    /// Cursor exhausted; nothing left to do.
    Finished,
}

impl StepOutcome {
    fn advanced(&self) -> bool {
        match self {
            StepOutcome::Mismatched { advanced, .. } | StepOutcome::Forwarded { advanced, .. } => {
                *advanced
            }
            StepOutcome::Finished => false,
            _ => true,
        }
    }
}

/// Drives a prepared sequence against a transport.
pub struct ReplayEngine<T, E> {
    seq: Sequence,
    types: TypeOverrideTable,
    transport: T,
    emulator: E,
    timeout: Option<Duration>,
    pacer: Pacer,
    paced: Option<usize>,
    summary: ReplaySummary,
}

impl<T: Transport, E: Emulator> ReplayEngine<T, E> {
    /// Take ownership of a loaded, configured sequence and rewind it.
    pub fn new(
        mut seq: Sequence,
        types: TypeOverrideTable,
        transport: T,
        emulator: E,
        options: ReplayOptions,
    ) -> Self {
        let factor = if options.delay_factor.is_finite() && options.delay_factor > 0.0 {
            options.delay_factor
        } else {
            warn!("Invalid delay modifier {}, using 1.0", options.delay_factor);
            1.0
        };

        seq.rewind();
        let summary = ReplaySummary { total: seq.len(), ..ReplaySummary::default() };
        debug!(
            options = %as_json(&options),
            "Replay engine ready: {} packets, emulator '{}'",
            seq.len(),
            emulator.name()
        );

        Self {
            seq,
            types,
            transport,
            emulator,
            timeout: options.timeout,
            pacer: Pacer::new(options.delay, factor),
            paced: None,
            summary,
        }
    }

    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn summary(&self) -> ReplaySummary {
        self.summary
    }

    pub fn is_finished(&self) -> bool {
        self.seq.current().is_none()
    }

    /// Run until the cursor is exhausted.
    pub async fn run(&mut self) -> Result<ReplaySummary> {
        info!("Replaying {} packets", self.seq.len());
        while self.step().await? != StepOutcome::Finished {}

        let s = self.summary;
        info!("Done");
        info!("Processed {} out of {}", s.processed, s.total);
        if s.skipped > 0 || s.unsupported > 0 {
            info!("Skipped {} on timeout, {} unsupported", s.skipped, s.unsupported);
        }
        debug!(summary = %as_json(&s), "Replay summary");
        Ok(s)
    }

    /// Process the node under the cursor.
    ///
    /// Transport failures are returned as errors; timeouts, mismatches and
    /// unsupported packets are reported through the outcome.
    pub async fn step(&mut self) -> Result<StepOutcome> {
        let Some(index) = self.seq.current_index() else {
            return Ok(StepOutcome::Finished);
        };
        let Some(node) = self.seq.node(index).cloned() else {
            return Ok(StepOutcome::Finished);
        };
        let prefix = LogPrefix::Position { pos: index + 1, len: self.seq.len() };

        // re-blocking after a mismatch does not pace again
        if self.paced != Some(index) {
            self.pacer.pace(index + 1, node.attr.ts_diff).await;
            self.paced = Some(index);
        }

        let outcome = if node.attr.action == Action::Skip {
            info!("{} skipped", prefix);
            StepOutcome::Skipped
        } else {
            match node.frame.direction() {
                Direction::FromController => self.process_out(prefix, &node.frame).await?,
                Direction::ToController => self.process_in(prefix, &node.frame, node.attr.action).await?,
            }
        };

        self.pacer.mark();
        if outcome.advanced() {
            match outcome {
                StepOutcome::TimedOut => self.summary.skipped += 1,
                StepOutcome::Unsupported(_) => self.summary.unsupported += 1,
                _ => self.summary.processed += 1,
            }
            self.seq.advance();
        }
        Ok(outcome)
    }

    async fn process_out(&mut self, prefix: LogPrefix, frame: &Frame) -> Result<StepOutcome> {
        if let Some(action @ (Action::Skip | Action::Emulate)) = self.types.action_for(frame) {
            info!("{} left to {} by type override", prefix, action);
            return Ok(StepOutcome::Satisfied);
        }

        match frame.kind() {
            PacketKind::Event | PacketKind::AclData => {
                log_frame(prefix, frame);
                self.transport.send(frame.data()).await?;
                Ok(StepOutcome::Sent)
            }
            kind => {
                warn!(
                    "{} Unsupported packet 0x{:02x}",
                    prefix,
                    frame.data().first().copied().unwrap_or_default()
                );
                Ok(StepOutcome::Unsupported(kind))
            }
        }
    }

    async fn process_in(
        &mut self,
        prefix: LogPrefix,
        expected: &Frame,
        recorded: Action,
    ) -> Result<StepOutcome> {
        let Some(bytes) = self.transport.recv(self.timeout).await? else {
            info!("{} timed out waiting for packet, skipping", prefix);
            return Ok(StepOutcome::TimedOut);
        };
        let received = Frame::new(Direction::ToController, bytes, now());

        let result = check_match(expected, &received);
        if result.matched {
            log_frame(prefix, &received);
        } else {
            self.summary.mismatches += 1;
            if let Some(description) = &result.description {
                warn!("{} {}", LogPrefix::Unknown, description);
            }
            log_frame(LogPrefix::Unknown, &received);
        }

        let outcome = match self.types.action_for(&received) {
            Some(Action::Skip) => {
                debug!("{} type override skips received packet", prefix);
                match result.description {
                    Some(description) if !result.matched => {
                        StepOutcome::Mismatched { description, advanced: true }
                    }
                    _ => StepOutcome::Matched,
                }
            }
            Some(Action::Emulate) => {
                self.forward(&received).await?;
                StepOutcome::Forwarded { matched: result.matched, advanced: result.matched }
            }
            _ if recorded == Action::Emulate => {
                self.forward(&received).await?;
                StepOutcome::Forwarded { matched: result.matched, advanced: true }
            }
            _ if result.matched => StepOutcome::Matched,
            _ => StepOutcome::Mismatched {
                description: result.description.unwrap_or_default(),
                advanced: false,
            },
        };
        Ok(outcome)
    }

    /// Hand `frame` to the emulated peer and write out its responses.
    async fn forward(&mut self, frame: &Frame) -> Result<()> {
        for response in self.emulator.feed(frame.data()) {
            let response = Frame::new(Direction::FromController, response, now());
            log_frame(LogPrefix::Emulated, &response);
            self.transport.send(response.data()).await?;
            self.summary.emulated += 1;
        }
        Ok(())
    }
}

fn now() -> Timeval {
    Timeval::from_duration(SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigParser, TypeKey};
    use crate::emulator::{NullEmulator, ResponderEmulator};
    use crate::sequence::normalize_timing;
    use crate::test_utils::{acl, command, event};
    use crate::transport::MemoryTransport;
    use anyhow::{Result, ensure};

    fn engine(
        frames: Vec<Frame>,
        config: &str,
        inbound: Vec<Vec<u8>>,
    ) -> Result<ReplayEngine<MemoryTransport, ResponderEmulator>> {
        let mut seq: Sequence = frames.into_iter().collect();
        normalize_timing(&mut seq);
        let mut types = TypeOverrideTable::new();
        ConfigParser::new(&mut seq, &mut types).parse_str(config)?;
        Ok(ReplayEngine::new(
            seq,
            types,
            MemoryTransport::with_inbound(inbound),
            ResponderEmulator::default(),
            ReplayOptions::default(),
        ))
    }

    fn reset_cmd() -> Vec<u8> {
        vec![0x01, 0x03, 0x0c, 0x00]
    }

    #[tokio::test]
    async fn outbound_event_then_inbound_command() -> Result<()> {
        let evt = event(0x0e, &[0x01, 0x00, 0x00, 0x00], Timeval::ZERO);
        let mut engine = engine(vec![evt.clone(), command(0x0c03, Timeval::ZERO)], "", vec![reset_cmd()])?;

        ensure!(engine.step().await? == StepOutcome::Sent);
        ensure!(engine.step().await? == StepOutcome::Matched);
        ensure!(engine.step().await? == StepOutcome::Finished);

        let summary = engine.summary();
        assert_eq!(summary, ReplaySummary { total: 2, processed: 2, ..ReplaySummary::default() });
        assert_eq!(engine.transport().sent(), &[evt.data().to_vec()]);
        Ok(())
    }

    #[tokio::test]
    async fn node_skip_does_no_io() -> Result<()> {
        let evt = event(0x0e, &[], Timeval::ZERO);
        let mut engine = engine(vec![evt], "1 action=skip", vec![])?;
        ensure!(engine.step().await? == StepOutcome::Skipped);
        ensure!(engine.transport().sent().is_empty());
        ensure!(engine.is_finished());
        Ok(())
    }

    #[tokio::test]
    async fn outbound_commands_are_unsupported() -> Result<()> {
        let mut cmd = command(0x0c03, Timeval::ZERO);
        cmd.set_direction(Direction::FromController);
        let mut engine = engine(vec![cmd], "", vec![])?;

        ensure!(engine.step().await? == StepOutcome::Unsupported(PacketKind::Command));
        let summary = engine.run().await?;
        assert_eq!(summary.unsupported, 1);
        assert_eq!(summary.processed, 0);
        Ok(())
    }

    #[tokio::test]
    async fn outbound_type_override_is_satisfied() -> Result<()> {
        let frames = vec![
            event(0x0e, &[], Timeval::ZERO),
            acl(1, &[1], Direction::FromController, Timeval::ZERO),
        ];
        let mut engine = engine(frames, "HCI_EVT_0x0e action=emulate\nHCI_ACL action=skip", vec![])?;
        // node attributes were set too; reset them to show the slot alone decides
        ensure!(engine.types.slot(TypeKey::Acl).is_some());
        for node in engine.seq.nodes_mut() {
            node.attr.action = Action::Replay;
        }

        ensure!(engine.step().await? == StepOutcome::Satisfied);
        ensure!(engine.step().await? == StepOutcome::Satisfied);
        ensure!(engine.transport().sent().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn mismatch_blocks_until_timeout() -> Result<()> {
        let mut engine = engine(
            vec![command(0x0c03, Timeval::ZERO)],
            "",
            vec![vec![0x01, 0x01, 0x0c, 0x00], vec![0x01, 0x01, 0x0c, 0x00]],
        )?;

        for _ in 0..2 {
            let outcome = engine.step().await?;
            ensure!(matches!(outcome, StepOutcome::Mismatched { advanced: false, .. }), "{:?}", outcome);
            ensure!(engine.sequence().position() == Some(1));
        }
        ensure!(engine.step().await? == StepOutcome::TimedOut);

        let summary = engine.run().await?;
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.mismatches, 2);
        Ok(())
    }

    #[tokio::test]
    async fn recorded_emulate_forwards_and_advances() -> Result<()> {
        let mut engine = engine(
            vec![command(0x0c03, Timeval::ZERO)],
            "1 action=emulate",
            vec![vec![0x01, 0x09, 0x10, 0x00]],
        )?;

        let outcome = engine.step().await?;
        ensure!(outcome == StepOutcome::Forwarded { matched: false, advanced: true }, "{:?}", outcome);
        ensure!(engine.is_finished());
        // Command Complete for Read BD_ADDR written back
        let sent = engine.transport().sent();
        ensure!(sent.len() == 1 && sent[0][..2] == [0x04, 0x0e]);
        assert_eq!(engine.summary().emulated, 1);
        Ok(())
    }

    #[tokio::test]
    async fn slot_emulate_advances_only_on_match() -> Result<()> {
        let mut engine = engine(
            vec![command(0x0c03, Timeval::ZERO)],
            "HCI_CMD_0x04|0x0009 action=emulate",
            vec![vec![0x01, 0x09, 0x10, 0x00], reset_cmd()],
        )?;

        let outcome = engine.step().await?;
        ensure!(outcome == StepOutcome::Forwarded { matched: false, advanced: false }, "{:?}", outcome);
        ensure!(engine.step().await? == StepOutcome::Matched);
        ensure!(engine.transport().sent().len() == 1);
        Ok(())
    }

    #[tokio::test]
    async fn slot_skip_force_advances() -> Result<()> {
        let mut engine = engine(
            vec![command(0x0c03, Timeval::ZERO), command(0x0c03, Timeval::ZERO)],
            "HCI_CMD_0x03|0x0001 action=skip",
            vec![vec![0x01, 0x01, 0x0c, 0x00]],
        )?;

        let outcome = engine.step().await?;
        ensure!(matches!(outcome, StepOutcome::Mismatched { advanced: true, .. }), "{:?}", outcome);
        ensure!(engine.sequence().position() == Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn null_emulator_forwards_nothing() -> Result<()> {
        let mut seq: Sequence = [command(0x0c03, Timeval::ZERO)].into_iter().collect();
        let mut types = TypeOverrideTable::new();
        ConfigParser::new(&mut seq, &mut types).parse_str("all action=emulate")?;
        let mut engine = ReplayEngine::new(
            seq,
            types,
            MemoryTransport::with_inbound([reset_cmd()]),
            NullEmulator,
            ReplayOptions::default(),
        );

        let summary = engine.run().await?;
        ensure!(summary.processed == 1 && summary.emulated == 0);
        ensure!(engine.into_transport().sent().is_empty());
        Ok(())
    }

    #[test]
    fn run_report_serializes_for_structured_logs() -> Result<()> {
        let summary = ReplaySummary { total: 4, processed: 3, skipped: 1, ..ReplaySummary::default() };
        let value = serde_json::to_value(summary)?;
        assert_eq!(value["total"], 4);
        assert_eq!(value["processed"], 3);
        assert_eq!(value["skipped"], 1);
        assert_eq!(value["mismatches"], 0);

        let options: ReplayOptions = serde_json::from_str(
            r#"{"delay":"delta","delay_factor":2.5,"timeout":{"secs":0,"nanos":500000000}}"#,
        )?;
        assert_eq!(options.delay, DelayMode::Delta);
        assert_eq!(options.delay_factor, 2.5);
        assert_eq!(options.timeout, Some(Duration::from_millis(500)));
        ensure!(as_json(&ReplayOptions::default()).contains(r#""delay":"none""#));
        Ok(())
    }
}
