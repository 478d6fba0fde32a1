//! Keyboard macro: record, play, repeat.
//!
//! Recording captures every fully assembled extended key; the key that ended
//! the recording is trimmed off afterward. Playback feeds keys back into the
//! input assembler (not the terminal), so hooks and redisplay behave exactly
//! as they did during recording. A repeat counter of zero means "forever",
//! bounded by the session loop maximum.

use crate::ExtKey;
use core_status::{EdError, EdResult};
use smallvec::SmallVec;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacState {
    #[default]
    Stop,
    Record,
    Play,
}

#[derive(Debug, Default)]
pub struct KbdMacro {
    state: MacState,
    keys: SmallVec<[ExtKey; 32]>,
    /// Next key to replay.
    idx: usize,
    /// Iterations left, including the one in progress.
    remaining: u32,
    /// Recording length when the current command began; stop-record trims
    /// back to it so the stop command's own keys are dropped.
    cmd_start: usize,
}

impl KbdMacro {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    pub fn keys(&self) -> &[ExtKey] {
        &self.keys
    }

    /// Stop -> Record. Clears the previous recording.
    pub fn start_record(&mut self) -> EdResult<()> {
        match self.state {
            MacState::Stop => {
                self.keys.clear();
                self.state = MacState::Record;
                debug!(target: "input.kbdmacro", "record_begin");
                Ok(())
            }
            _ => Err(EdError::failure("Keyboard macro already active")),
        }
    }

    /// Record -> Stop, trimming the key sequence that invoked the stop
    /// command itself.
    pub fn stop_record(&mut self) -> EdResult<()> {
        if self.state != MacState::Record {
            return Err(EdError::failure("Keyboard macro not being recorded"));
        }
        self.keys.truncate(self.cmd_start);
        self.state = MacState::Stop;
        debug!(target: "input.kbdmacro", keys = self.keys.len(), "record_end");
        Ok(())
    }

    /// Called at the top of each command cycle so stop-record knows where
    /// the stopping command's keys began.
    pub fn note_command_start(&mut self) {
        if self.state == MacState::Record {
            self.cmd_start = self.keys.len();
        }
    }

    /// Stop -> Play with `n` iterations; `n == 0` plays until the loop
    /// maximum. Fails when the recording is empty.
    pub fn start_play(&mut self, n: u32, loop_max: u32) -> EdResult<()> {
        if self.state != MacState::Stop {
            return Err(EdError::failure("Keyboard macro already active"));
        }
        if self.keys.is_empty() {
            return Err(EdError::failure("No keyboard macro defined"));
        }
        self.remaining = if n == 0 { loop_max.max(1) } else { n };
        self.idx = 0;
        self.state = MacState::Play;
        debug!(target: "input.kbdmacro", iterations = self.remaining, "play_begin");
        Ok(())
    }

    /// Capture a key while recording; playback keys are not re-captured.
    pub fn record(&mut self, key: ExtKey) {
        if self.state == MacState::Record {
            self.keys.push(key);
        }
    }

    /// Next playback key, or `None` when not playing. Exhausting the last
    /// iteration returns to Stop.
    pub fn next_play_key(&mut self) -> Option<ExtKey> {
        if self.state != MacState::Play {
            return None;
        }
        if self.idx >= self.keys.len() {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.state = MacState::Stop;
                debug!(target: "input.kbdmacro", "play_end");
                return None;
            }
            self.idx = 0;
        }
        let k = self.keys[self.idx];
        self.idx += 1;
        Some(k)
    }

    /// Force Stop (user abort or error unwind).
    pub fn abort(&mut self) {
        if self.state != MacState::Stop {
            debug!(target: "input.kbdmacro", "aborted");
        }
        self.state = MacState::Stop;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn k(c: u8) -> ExtKey {
        ExtKey::plain(c)
    }

    #[test]
    fn record_trims_stop_sequence() {
        let mut m = KbdMacro::new();
        m.start_record().unwrap();
        m.note_command_start();
        m.record(k(b'a'));
        m.note_command_start();
        m.record(k(b'b'));
        // The stop command arrives as a two-key sequence; both keys go.
        m.note_command_start();
        m.record(k(b'x'));
        m.record(k(b'e'));
        m.stop_record().unwrap();
        assert_eq!(m.keys(), &[k(b'a'), k(b'b')]);
    }

    fn record_one(m: &mut KbdMacro, key: ExtKey) {
        m.note_command_start();
        m.record(key);
    }

    #[test]
    fn playback_repeats() {
        let mut m = KbdMacro::new();
        m.start_record().unwrap();
        record_one(&mut m, k(b'x'));
        record_one(&mut m, k(b'y'));
        record_one(&mut m, k(b'q'));
        m.stop_record().unwrap();
        m.start_play(2, 255).unwrap();
        let mut out = Vec::new();
        while let Some(key) = m.next_play_key() {
            out.push(key.base);
        }
        assert_eq!(out, b"xyxy".to_vec());
        assert_eq!(m.state(), MacState::Stop);
    }

    #[test]
    fn infinite_play_bounded_by_loop_max() {
        let mut m = KbdMacro::new();
        m.start_record().unwrap();
        record_one(&mut m, k(b'z'));
        record_one(&mut m, k(b'q'));
        m.stop_record().unwrap();
        m.start_play(0, 3).unwrap();
        let mut count = 0;
        while m.next_play_key().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn empty_macro_refuses_play() {
        let mut m = KbdMacro::new();
        assert!(m.start_play(1, 255).is_err());
    }

    #[test]
    fn double_record_refused() {
        let mut m = KbdMacro::new();
        m.start_record().unwrap();
        assert!(m.start_record().is_err());
    }

    #[test]
    fn keys_read_during_play_are_not_recorded() {
        let mut m = KbdMacro::new();
        m.start_record().unwrap();
        record_one(&mut m, k(b'a'));
        record_one(&mut m, k(b'q'));
        m.stop_record().unwrap();
        m.start_play(1, 255).unwrap();
        m.record(k(b'!')); // ignored: not recording
        let _ = m.next_play_key();
        assert_eq!(m.keys(), &[k(b'a')]);
    }
}
