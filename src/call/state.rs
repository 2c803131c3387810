//! Turn-taking state machine
//!
//! States and transitions are explicit; anything not in the table is
//! ignored. A capture result that races in while the assistant is speaking
//! therefore falls on the floor instead of starting a second turn.

/// Phase of the current call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// No call
    #[default]
    Idle,
    /// Microphone capture armed
    Listening,
    /// Awaiting or streaming the model reply
    Processing,
    /// Synthesizing and/or playing assistant audio
    Speaking,
}

impl TurnState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
        }
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs driving the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    /// Call started; the greeting is spoken first
    CallStarted,
    /// Capture ended with a non-empty transcript
    TranscriptReady,
    /// Capture ended without speech
    NoSpeech,
    /// Full reply text assembled
    ReplyReady,
    /// Playback finished, or synthesis/playback failed
    SpeechFinished,
    /// User ended the call
    CallEnded,
}

/// Transition table
///
/// Returns `None` when the event has no meaning in `state`. `TranscriptReady`
/// is also refused while `assistant_speaking` is set.
#[must_use]
pub const fn next_state(
    state: TurnState,
    event: TurnEvent,
    assistant_speaking: bool,
) -> Option<TurnState> {
    match (state, event) {
        (_, TurnEvent::CallEnded) => Some(TurnState::Idle),
        (TurnState::Idle, TurnEvent::CallStarted) => Some(TurnState::Speaking),
        (TurnState::Listening, TurnEvent::TranscriptReady) if !assistant_speaking => {
            Some(TurnState::Processing)
        }
        (TurnState::Listening, TurnEvent::NoSpeech) => Some(TurnState::Listening),
        (TurnState::Processing, TurnEvent::ReplyReady) => Some(TurnState::Speaking),
        (TurnState::Speaking, TurnEvent::SpeechFinished) => Some(TurnState::Listening),
        _ => None,
    }
}

/// Current state plus the assistant-speaking guard
///
/// The guard is tracked separately from the state because capture-end
/// notifications can race with synthesis completion.
#[derive(Debug, Default)]
pub struct TurnMachine {
    state: TurnState,
    assistant_speaking: bool,
}

impl TurnMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    #[must_use]
    pub const fn is_assistant_speaking(&self) -> bool {
        self.assistant_speaking
    }

    /// Whether microphone capture may be armed right now
    #[must_use]
    pub const fn can_listen(&self) -> bool {
        matches!(self.state, TurnState::Listening) && !self.assistant_speaking
    }

    /// Apply an event, returning the new state if it was accepted
    pub fn apply(&mut self, event: TurnEvent) -> Option<TurnState> {
        let from = self.state;
        let Some(to) = next_state(from, event, self.assistant_speaking) else {
            tracing::debug!(state = %from, ?event, "ignoring event");
            return None;
        };

        if to == TurnState::Idle {
            self.assistant_speaking = false;
        }
        self.state = to;
        tracing::trace!(from = %from, to = %to, ?event, "turn transition");
        Some(to)
    }

    /// Mark the start of synthesis/playback
    pub const fn speech_started(&mut self) {
        self.assistant_speaking = true;
    }

    /// Mark the end of synthesis/playback, successful or not
    pub const fn speech_finished(&mut self) {
        self.assistant_speaking = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [TurnState; 4] = [
        TurnState::Idle,
        TurnState::Listening,
        TurnState::Processing,
        TurnState::Speaking,
    ];

    #[test]
    fn test_happy_path() {
        let mut m = TurnMachine::new();
        assert_eq!(m.apply(TurnEvent::CallStarted), Some(TurnState::Speaking));
        assert_eq!(m.apply(TurnEvent::SpeechFinished), Some(TurnState::Listening));
        assert_eq!(m.apply(TurnEvent::TranscriptReady), Some(TurnState::Processing));
        assert_eq!(m.apply(TurnEvent::ReplyReady), Some(TurnState::Speaking));
        assert_eq!(m.apply(TurnEvent::SpeechFinished), Some(TurnState::Listening));
    }

    #[test]
    fn test_no_speech_rearms() {
        let mut m = TurnMachine::new();
        m.apply(TurnEvent::CallStarted);
        m.apply(TurnEvent::SpeechFinished);
        assert_eq!(m.apply(TurnEvent::NoSpeech), Some(TurnState::Listening));
        assert!(m.can_listen());
    }

    #[test]
    fn test_call_ended_from_every_state() {
        for state in ALL_STATES {
            for speaking in [false, true] {
                assert_eq!(next_state(state, TurnEvent::CallEnded, speaking), Some(TurnState::Idle));
            }
        }
    }

    #[test]
    fn test_transcript_ignored_while_speaking() {
        let mut m = TurnMachine::new();
        m.apply(TurnEvent::CallStarted);
        m.speech_started();

        assert_eq!(m.apply(TurnEvent::TranscriptReady), None);
        assert_eq!(m.state(), TurnState::Speaking);
        assert!(!m.can_listen());
    }

    #[test]
    fn test_speaking_flag_guards_racing_capture() {
        // Flag set while the state already says Listening
        assert_eq!(
            next_state(TurnState::Listening, TurnEvent::TranscriptReady, true),
            None
        );
        assert_eq!(
            next_state(TurnState::Listening, TurnEvent::TranscriptReady, false),
            Some(TurnState::Processing)
        );
    }

    #[test]
    fn test_idle_ignores_stale_events() {
        let mut m = TurnMachine::new();
        m.apply(TurnEvent::CallStarted);
        m.speech_started();
        m.apply(TurnEvent::CallEnded);

        assert!(!m.is_assistant_speaking());
        for event in [
            TurnEvent::TranscriptReady,
            TurnEvent::NoSpeech,
            TurnEvent::ReplyReady,
            TurnEvent::SpeechFinished,
        ] {
            assert_eq!(m.apply(event), None);
            assert_eq!(m.state(), TurnState::Idle);
        }
    }

    #[test]
    fn test_processing_only_leaves_via_reply() {
        for event in [TurnEvent::TranscriptReady, TurnEvent::NoSpeech, TurnEvent::SpeechFinished] {
            assert_eq!(next_state(TurnState::Processing, event, false), None);
        }
    }
}
