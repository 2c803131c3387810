//! Call status published to the presentation layer

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::TurnState;

/// Visual status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indicator {
    #[default]
    Idle,
    Listening,
    Speaking,
}

impl Indicator {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Speaking => "speaking",
        }
    }
}

/// User-facing status messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusText {
    Ready,
    Connecting,
    Listening,
    Processing,
    GeneratingAudio,
    Speaking,
    CallEnded,
    Unsupported,
    RecognitionError,
    ServerError,
    SpeechError,
}

impl StatusText {
    #[must_use]
    pub const fn text(self) -> &'static str {
        match self {
            Self::Ready => "برای شروع تماس آماده‌ام",
            Self::Connecting => "در حال اتصال...",
            Self::Listening => "گوش می‌دهم...",
            Self::Processing => "در حال پردازش...",
            Self::GeneratingAudio => "در حال تولید صدا...",
            Self::Speaking => "در حال صحبت...",
            Self::CallEnded => "تماس پایان یافت",
            Self::Unsupported => "دستگاه شما از تشخیص گفتار پشتیبانی نمی‌کند",
            Self::RecognitionError => "خطای تشخیص گفتار",
            Self::ServerError => "خطا در ارتباط با سرور",
            Self::SpeechError => "خطا در تولید صدا",
        }
    }

    /// Whether this message reports a failure
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(
            self,
            Self::Unsupported | Self::RecognitionError | Self::ServerError | Self::SpeechError
        )
    }
}

/// Snapshot of the call for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatus {
    pub state: TurnState,
    pub indicator: Indicator,
    pub text: String,
    pub is_error: bool,
}

impl Default for CallStatus {
    fn default() -> Self {
        Self::new(TurnState::Idle, StatusText::Ready)
    }
}

impl CallStatus {
    /// Build a status; outside a call the indicator is always idle
    #[must_use]
    pub fn new(state: TurnState, text: StatusText) -> Self {
        let indicator = match state {
            TurnState::Idle => Indicator::Idle,
            TurnState::Listening => Indicator::Listening,
            // Thinking is shown as speaking
            TurnState::Processing | TurnState::Speaking => Indicator::Speaking,
        };

        Self {
            state,
            indicator,
            text: text.text().to_string(),
            is_error: text.is_error(),
        }
    }
}

/// Publishes status updates for one call
///
/// Goes silent once the call is cancelled so a stale continuation cannot
/// overwrite the final "call ended" status.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: watch::Sender<CallStatus>,
    cancel: CancellationToken,
}

impl StatusReporter {
    #[must_use]
    pub const fn new(tx: watch::Sender<CallStatus>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Publish a status unless the call has ended
    pub fn publish(&self, state: TurnState, text: StatusText) {
        if self.cancel.is_cancelled() {
            return;
        }
        let status = CallStatus::new(state, text);
        tracing::debug!(state = %status.state, indicator = status.indicator.as_str(), text = %status.text, "status");
        self.tx.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_mapping() {
        assert_eq!(CallStatus::new(TurnState::Idle, StatusText::Speaking).indicator, Indicator::Idle);
        assert_eq!(
            CallStatus::new(TurnState::Listening, StatusText::Listening).indicator,
            Indicator::Listening
        );
        assert_eq!(
            CallStatus::new(TurnState::Processing, StatusText::Processing).indicator,
            Indicator::Speaking
        );
    }

    #[test]
    fn test_error_flag() {
        let status = CallStatus::new(TurnState::Idle, StatusText::Unsupported);
        assert!(status.is_error);
        assert!(!CallStatus::new(TurnState::Listening, StatusText::Listening).is_error);
    }

    #[test]
    fn test_reporter_silent_after_cancel() {
        let (tx, rx) = watch::channel(CallStatus::default());
        let cancel = CancellationToken::new();
        let reporter = StatusReporter::new(tx, cancel.clone());

        reporter.publish(TurnState::Listening, StatusText::Listening);
        assert_eq!(rx.borrow().state, TurnState::Listening);

        cancel.cancel();
        reporter.publish(TurnState::Speaking, StatusText::Speaking);
        assert_eq!(rx.borrow().state, TurnState::Listening);
    }
}
