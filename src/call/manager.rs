//! Owner of the single active call

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    CallController, CallSession, CallStatus, ChatModel, SpeechSynthesizer, StatusReporter,
    StatusText, TurnSettings, TurnState,
};
use crate::voice::{AudioOutput, SpeechCapture};
use crate::{Error, Result};

/// External services a call talks to
#[derive(Clone)]
pub struct CallServices {
    pub capture: Arc<dyn SpeechCapture>,
    pub model: Arc<dyn ChatModel>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub output: Arc<dyn AudioOutput>,
}

struct ActiveCall {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Starts and ends calls; at most one is active at a time
pub struct CallManager {
    services: CallServices,
    system_instruction: String,
    settings: TurnSettings,
    status: watch::Sender<CallStatus>,
    active: Option<ActiveCall>,
}

impl CallManager {
    #[must_use]
    pub fn new(services: CallServices, system_instruction: String, settings: TurnSettings) -> Self {
        let (status, _) = watch::channel(CallStatus::default());
        Self {
            services,
            system_instruction,
            settings,
            status,
            active: None,
        }
    }

    /// Receive status updates
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CallStatus> {
        self.status.subscribe()
    }

    /// Latest published status
    #[must_use]
    pub fn status(&self) -> CallStatus {
        self.status.borrow().clone()
    }

    /// Whether a call is in progress
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|call| !call.cancel.is_cancelled() && !call.task.is_finished())
    }

    /// Id of the active call, if any
    #[must_use]
    pub fn active_call(&self) -> Option<Uuid> {
        self.active
            .as_ref()
            .filter(|_| self.is_active())
            .map(|call| call.id)
    }

    /// Start a call and spawn its turn loop
    ///
    /// The greeting is spoken first, then the loop alternates between
    /// listening and replying until [`end_call`](Self::end_call).
    ///
    /// # Errors
    ///
    /// Returns `Error::CallInProgress` if a call is already active, or
    /// `Error::UnsupportedEnvironment` if speech capture is unavailable
    pub fn start_call(&mut self) -> Result<Uuid> {
        if self.is_active() {
            return Err(Error::CallInProgress);
        }
        self.active = None;

        self.publish(TurnState::Idle, StatusText::Connecting);

        if !self.services.capture.is_supported() {
            tracing::warn!("speech capture unavailable, refusing to start call");
            self.publish(TurnState::Idle, StatusText::Unsupported);
            return Err(Error::UnsupportedEnvironment(
                "speech capture is not available".to_string(),
            ));
        }

        let cancel = CancellationToken::new();
        let conversation = self.services.model.open_conversation(&self.system_instruction);
        let session = CallSession::new(conversation, cancel.clone());
        let id = session.id();

        let reporter = StatusReporter::new(self.status.clone(), cancel.clone());
        let controller =
            CallController::new(session, &self.services, reporter, self.settings.clone());
        let task = tokio::spawn(controller.run());

        tracing::info!(call_id = %id, "call started");
        self.active = Some(ActiveCall { id, cancel, task });
        Ok(id)
    }

    /// End the active call
    ///
    /// Stops capture and playback immediately and discards any in-flight
    /// model or synthesis work. Calling this with no active call is a no-op.
    pub fn end_call(&mut self) {
        if let Some(call) = self.stop_active() {
            call.task.abort();
        }
    }

    /// End the active call and wait for its task to unwind
    pub async fn shutdown(&mut self) {
        if let Some(call) = self.stop_active() {
            call.task.abort();
            if let Err(e) = call.task.await
                && !e.is_cancelled()
            {
                tracing::error!(error = %e, "call task failed");
            }
        }
    }

    /// Start a call if idle, otherwise end it
    ///
    /// # Errors
    ///
    /// Propagates errors from [`start_call`](Self::start_call)
    pub fn toggle(&mut self) -> Result<bool> {
        if self.is_active() {
            self.end_call();
            Ok(false)
        } else {
            self.start_call().map(|_| true)
        }
    }

    fn stop_active(&mut self) -> Option<ActiveCall> {
        let call = self.active.take()?;

        call.cancel.cancel();
        self.services.capture.abort();
        self.services.output.stop();
        self.publish(TurnState::Idle, StatusText::CallEnded);

        tracing::info!(call_id = %call.id, "call ended");
        Some(call)
    }

    fn publish(&self, state: TurnState, text: StatusText) {
        self.status.send_replace(CallStatus::new(state, text));
    }
}

impl Drop for CallManager {
    fn drop(&mut self) {
        self.end_call();
    }
}
