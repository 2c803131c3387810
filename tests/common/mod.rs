//! Shared test utilities
//!
//! Scripted stand-ins for the call services. Every interaction is reported
//! on an event channel so tests can assert the order of side effects.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use ava_voice::audio::WavBlob;
use ava_voice::call::{
    AudioFragment, AudioStream, CallManager, CallServices, CallStatus, ChatModel, Conversation,
    SpeechSynthesizer, TextStream, TurnSettings, TurnState,
};
use ava_voice::voice::{AudioOutput, SpeechCapture};
use ava_voice::{Error, Result};

/// Two 16-bit samples of PCM
pub const PCM_CHUNK: &str = "AAABAA==";

pub const PCM_MIME: &str = "audio/L16;codec=pcm;rate=24000";

/// Observable side effect of a fake service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Opened(String),
    Listen,
    Sent(String),
    Synthesized(String),
    Played { pcm_len: usize, sample_rate: u32 },
    Aborted,
    Stopped,
}

type EventTx = mpsc::UnboundedSender<Event>;

fn report(events: &EventTx, event: Event) {
    let _ = events.send(event);
}

fn pop<T>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    queue.lock().unwrap().pop_front()
}

/// One scripted listening span
#[derive(Debug, Clone)]
pub enum Heard {
    Speech(String),
    Silence,
    Failure,
}

/// Capture that replays a script, then waits until aborted
pub struct ScriptedCapture {
    supported: bool,
    script: Mutex<VecDeque<Heard>>,
    events: EventTx,
}

#[async_trait]
impl SpeechCapture for ScriptedCapture {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn listen(&self) -> Result<Option<String>> {
        report(&self.events, Event::Listen);
        match pop(&self.script) {
            Some(Heard::Speech(text)) => Ok(Some(text)),
            Some(Heard::Silence) => Ok(None),
            Some(Heard::Failure) => Err(Error::Recognition("network".to_string())),
            None => std::future::pending().await,
        }
    }

    fn abort(&self) {
        report(&self.events, Event::Aborted);
    }
}

/// One scripted model turn
#[derive(Debug, Clone)]
pub enum Reply {
    Fragments(Vec<String>),
    Delayed(Duration, String),
    Failure,
    Hang,
}

impl Reply {
    pub fn text(fragments: &[&str]) -> Self {
        Self::Fragments(fragments.iter().map(ToString::to_string).collect())
    }
}

/// Model whose conversations share one reply script
pub struct ScriptedModel {
    script: Arc<Mutex<VecDeque<Reply>>>,
    history: Arc<Mutex<Vec<(String, String)>>>,
    events: EventTx,
}

struct ScriptedConversation {
    script: Arc<Mutex<VecDeque<Reply>>>,
    history: Arc<Mutex<Vec<(String, String)>>>,
    events: EventTx,
}

impl ChatModel for ScriptedModel {
    fn open_conversation(&self, system_instruction: &str) -> Box<dyn Conversation> {
        report(&self.events, Event::Opened(system_instruction.to_string()));
        Box::new(ScriptedConversation {
            script: Arc::clone(&self.script),
            history: Arc::clone(&self.history),
            events: self.events.clone(),
        })
    }
}

#[async_trait]
impl Conversation for ScriptedConversation {
    async fn send(&mut self, message: &str) -> Result<TextStream> {
        report(&self.events, Event::Sent(message.to_string()));
        match pop(&self.script).unwrap_or_else(|| Reply::text(&["باشه."])) {
            Reply::Fragments(fragments) => Ok(stream::iter(fragments.into_iter().map(Ok)).boxed()),
            Reply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(stream::iter([Ok(text)]).boxed())
            }
            Reply::Failure => Ok(stream::iter([
                Ok("نیمه".to_string()),
                Err(Error::ModelQuery("connection reset".to_string())),
            ])
            .boxed()),
            Reply::Hang => std::future::pending().await,
        }
    }

    fn record_exchange(&mut self, message: &str, reply: &str) {
        self.history
            .lock()
            .unwrap()
            .push((message.to_string(), reply.to_string()));
    }

    fn turns(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

/// One scripted synthesis response
#[derive(Debug, Clone)]
pub enum Speech {
    Fragments(Vec<AudioFragment>),
    Failure,
}

/// Synthesizer that replays a script, then returns one PCM chunk per call
pub struct ScriptedSynth {
    script: Mutex<VecDeque<Speech>>,
    events: EventTx,
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynth {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        report(&self.events, Event::Synthesized(text.to_string()));
        match pop(&self.script) {
            Some(Speech::Fragments(fragments)) => {
                Ok(stream::iter(fragments.into_iter().map(Ok)).boxed())
            }
            Some(Speech::Failure) => Err(Error::Synthesis("quota exceeded".to_string())),
            None => Ok(stream::iter([Ok(AudioFragment::new(PCM_CHUNK, PCM_MIME))]).boxed()),
        }
    }
}

/// Output that records clips instead of playing them
///
/// With `hold` set, every clip keeps playing until its call is cancelled.
pub struct RecordingOutput {
    clips: Mutex<Vec<WavBlob>>,
    hold: bool,
    cancel: Mutex<Option<CancellationToken>>,
    events: EventTx,
}

impl RecordingOutput {
    pub fn clips(&self) -> Vec<WavBlob> {
        self.clips.lock().unwrap().clone()
    }

    /// Cancellation handed to the most recent `play`
    pub fn last_cancel(&self) -> Option<CancellationToken> {
        self.cancel.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioOutput for RecordingOutput {
    async fn play(&self, clip: WavBlob, cancel: CancellationToken) -> Result<()> {
        *self.cancel.lock().unwrap() = Some(cancel.clone());
        report(
            &self.events,
            Event::Played {
                pcm_len: clip.data_len(),
                sample_rate: clip.descriptor().sample_rate,
            },
        );
        self.clips.lock().unwrap().push(clip);
        if self.hold {
            cancel.cancelled().await;
        }
        Ok(())
    }

    fn stop(&self) {
        report(&self.events, Event::Stopped);
    }
}

/// Builder for a call wired to scripted services
pub struct Script {
    pub supported: bool,
    pub hold_playback: bool,
    pub heard: Vec<Heard>,
    pub replies: Vec<Reply>,
    pub speech: Vec<Speech>,
    pub settings: TurnSettings,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            supported: true,
            hold_playback: false,
            heard: Vec::new(),
            replies: Vec::new(),
            speech: Vec::new(),
            settings: TurnSettings {
                greeting: "سلام، آوا هستم. چطور میتونم کمکتون کنم؟".to_string(),
                fallback_reply: "متاسفانه مشکلی پیش آمده. لطفا دوباره تلاش کنید.".to_string(),
                reply_timeout: Duration::from_secs(5),
                speech_timeout: Duration::from_secs(5),
            },
        }
    }
}

pub struct Harness {
    pub manager: CallManager,
    pub events: mpsc::UnboundedReceiver<Event>,
    pub history: Arc<Mutex<Vec<(String, String)>>>,
    pub output: Arc<RecordingOutput>,
}

pub const SYSTEM_INSTRUCTION: &str = "شما آوا هستید.";

impl Script {
    pub fn build(self) -> Harness {
        let (tx, events) = mpsc::unbounded_channel();
        let history = Arc::new(Mutex::new(Vec::new()));
        let output = Arc::new(RecordingOutput {
            clips: Mutex::new(Vec::new()),
            hold: self.hold_playback,
            cancel: Mutex::new(None),
            events: tx.clone(),
        });

        let services = CallServices {
            capture: Arc::new(ScriptedCapture {
                supported: self.supported,
                script: Mutex::new(self.heard.into()),
                events: tx.clone(),
            }),
            model: Arc::new(ScriptedModel {
                script: Arc::new(Mutex::new(self.replies.into())),
                history: Arc::clone(&history),
                events: tx.clone(),
            }),
            synthesizer: Arc::new(ScriptedSynth {
                script: Mutex::new(self.speech.into()),
                events: tx,
            }),
            output: Arc::clone(&output) as Arc<dyn AudioOutput>,
        };

        Harness {
            manager: CallManager::new(services, SYSTEM_INSTRUCTION.to_string(), self.settings),
            events,
            history,
            output,
        }
    }
}

impl Harness {
    /// Next event, failing the test after two seconds
    pub async fn next(&mut self) -> Event {
        tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Collect events up to and including the first match
    pub async fn until(&mut self, predicate: impl Fn(&Event) -> bool) -> Vec<Event> {
        let mut seen = Vec::new();
        loop {
            let event = self.next().await;
            let done = predicate(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    /// Events that arrive within `window`
    pub async fn quiet_for(&mut self, window: Duration) -> Vec<Event> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, self.events.recv()).await {
            seen.push(event);
        }
        seen
    }
}

/// Wait until the published status reaches `state`
pub async fn wait_for_state(status: &mut watch::Receiver<CallStatus>, state: TurnState) -> CallStatus {
    tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|current| current.state == state),
    )
    .await
    .expect("timed out waiting for state")
    .expect("status channel closed")
    .clone()
}
