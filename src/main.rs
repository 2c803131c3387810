use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ava_voice::audio::{AudioDescriptor, WavBlob, assemble_wav_blob};
use ava_voice::call::{
    CallManager, CallServices, CallStatus, ChatModel, SpeechSynthesizer, collect_speech,
};
use ava_voice::gemini::{GeminiChat, GeminiClient, GeminiSpeech};
use ava_voice::voice::{
    AudioCapture, AudioOutput, FileOutput, MicrophoneRecognizer, SAMPLE_RATE, SpeakerOutput,
    SpeechCapture, SpeechToText, TypedInput, UtteranceDetector, rms,
};
use ava_voice::{Config, Persona};

/// Ava - voice customer-service call assistant
#[derive(Parser)]
#[command(name = "ava", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "AVA_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a call (the default)
    Call(CallArgs),
    /// Wrap a base64 PCM payload in a WAV container
    EncodeWav {
        /// MIME type describing the PCM layout
        #[arg(short, long, default_value = "audio/L16;rate=24000")]
        mime: String,
        /// File holding the base64 payload
        #[arg(short, long)]
        input: PathBuf,
        /// Destination WAV file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show microphone levels and detected speech
    TestMic {
        /// Seconds to listen
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Play a tone through the reply playback path
    TestSpeaker,
    /// Run one listening span and print the transcript
    TestStt,
    /// Synthesize and play a text
    TestTts {
        /// Text to synthesize
        #[arg(default_value = "سلام، آوا هستم. چطور میتونم کمکتون کنم؟")]
        text: String,
    },
    /// Ask the assistant one question and print the streamed reply
    Ask {
        /// Question text
        text: String,
    },
}

#[derive(clap::Args, Default)]
struct CallArgs {
    /// Read utterances from stdin instead of the microphone
    #[arg(long)]
    typed: bool,

    /// Write replies as WAV files instead of playing them
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,ava_voice=info",
        1 => "info,ava_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = cli.command.unwrap_or_else(|| Command::Call(CallArgs::default()));

    // Offline commands need no configuration
    match command {
        Command::EncodeWav { mime, input, output } => return encode_wav(&mime, &input, &output),
        Command::TestMic { duration } => return test_mic(duration).await,
        Command::TestSpeaker => return test_speaker().await,
        _ => {}
    }

    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");
    let persona = config.persona()?;

    match command {
        Command::Call(args) => run_call(&config, &persona, args).await,
        Command::TestStt => test_stt(&config, &persona).await,
        Command::TestTts { text } => test_tts(&config, &persona, &text).await,
        Command::Ask { text } => ask(&config, &persona, &text).await,
        Command::EncodeWav { .. } | Command::TestMic { .. } | Command::TestSpeaker => Ok(()),
    }
}

fn gemini_client(config: &Config) -> anyhow::Result<Arc<GeminiClient>> {
    Ok(Arc::new(GeminiClient::new(
        config.gemini_api_key()?,
        config.gemini.base_url.clone(),
    )?))
}

fn speech_to_text(config: &Config, persona: &Persona) -> anyhow::Result<SpeechToText> {
    Ok(SpeechToText::new(
        config.stt.provider,
        config.stt_api_key()?,
        config.stt_model(),
        config.language(persona),
    )?)
}

/// Run one call until Ctrl+C (or end of typed input)
async fn run_call(config: &Config, persona: &Persona, args: CallArgs) -> anyhow::Result<()> {
    let client = gemini_client(config)?;
    let input_closed = CancellationToken::new();

    let capture: Arc<dyn SpeechCapture> = if args.typed {
        Arc::new(TypedInput::stdin(input_closed.clone()))
    } else {
        Arc::new(MicrophoneRecognizer::new(
            speech_to_text(config, persona)?,
            config.call.listen_timeout,
        ))
    };

    let output: Arc<dyn AudioOutput> = match args.save_dir {
        Some(dir) => Arc::new(FileOutput::new(dir)?),
        None => Arc::new(SpeakerOutput::new()),
    };

    let services = CallServices {
        capture,
        model: Arc::new(GeminiChat::new(Arc::clone(&client), config.gemini.chat_model.clone())),
        synthesizer: Arc::new(GeminiSpeech::new(
            client,
            config.gemini.tts_model.clone(),
            config.tts_voice(persona),
        )),
        output,
    };

    let mut manager = CallManager::new(
        services,
        persona.system_instruction()?,
        config.turn_settings(persona),
    );

    let mut status = manager.subscribe();
    let printer = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            print_status(&current);
        }
    });

    let call_id = manager.start_call()?;
    tracing::info!(%call_id, persona = persona.id(), "call started, press Ctrl+C to hang up");

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        () = input_closed.cancelled() => tracing::info!("input closed, hanging up"),
    }

    manager.shutdown().await;
    drop(manager);
    let _ = printer.await;

    Ok(())
}

fn print_status(status: &CallStatus) {
    let marker = if status.is_error { "!" } else { " " };
    println!("{marker}[{:<9}] {}", status.indicator.as_str(), status.text);
}

/// Wrap a base64 payload file in WAV
fn encode_wav(mime: &str, input: &std::path::Path, output: &std::path::Path) -> anyhow::Result<()> {
    let payload = std::fs::read_to_string(input)?;
    let blob = assemble_wav_blob(&payload, mime)?;
    std::fs::write(output, blob.as_bytes())?;

    let descriptor = blob.descriptor();
    println!(
        "Wrote {} ({} bytes PCM, {} ch, {} Hz, {}-bit, {:.2}s)",
        output.display(),
        blob.data_len(),
        descriptor.num_channels,
        descriptor.sample_rate,
        descriptor.bits_per_sample,
        blob.duration().as_secs_f64(),
    );
    Ok(())
}

/// Print a once-per-second level meter and what the endpoint detector hears
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    let mut capture = AudioCapture::new()?;
    let mut detector = UtteranceDetector::new();
    capture.start()?;

    println!("Listening at {SAMPLE_RATE} Hz for {duration}s, say something...");

    for second in 1..=duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.drain();
        let (rms, peak) = levels(&samples);
        let heard = if detector.process(&samples) {
            let utterance = detector.take_utterance();
            #[allow(clippy::cast_precision_loss)]
            let secs = utterance.len() as f32 / SAMPLE_RATE as f32;
            format!("utterance ({secs:.1}s)")
        } else if detector.in_speech() {
            "speech".to_string()
        } else {
            "quiet".to_string()
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bars = ((rms * 200.0) as usize).min(40);
        println!(
            "{second:>3}s  rms {rms:.4}  peak {peak:.4}  {:<40}  {heard}",
            "#".repeat(bars)
        );
    }

    capture.stop();
    println!("No bars at all usually means the wrong default source is selected.");
    Ok(())
}

/// RMS and peak of a block of samples
fn levels(samples: &[f32]) -> (f32, f32) {
    let peak = samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()));
    (rms(samples), peak)
}

/// Play a two-second 440Hz tone through the same WAV path replies use
async fn test_speaker() -> anyhow::Result<()> {
    let descriptor = AudioDescriptor::default();
    let rate = descriptor.sample_rate;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let pcm: Vec<u8> = (0..rate * 2)
        .flat_map(|n| {
            let phase = 2.0 * std::f32::consts::PI * 440.0 * n as f32 / rate as f32;
            ((phase.sin() * 0.3 * f32::from(i16::MAX)) as i16).to_le_bytes()
        })
        .collect();

    let clip = WavBlob::from_pcm(&pcm, descriptor)?;
    println!(
        "Playing {:.1}s tone ({} Hz, {}-bit)...",
        clip.duration().as_secs_f64(),
        rate,
        descriptor.bits_per_sample
    );
    SpeakerOutput::new().play(clip, CancellationToken::new()).await?;
    println!("Done. Silence here points at the default sink, not at Ava.");

    Ok(())
}

/// Capture and transcribe one utterance
async fn test_stt(config: &Config, persona: &Persona) -> anyhow::Result<()> {
    let recognizer =
        MicrophoneRecognizer::new(speech_to_text(config, persona)?, config.call.listen_timeout);

    println!(
        "Speak now ({}, waiting up to {}s)...",
        config.language(persona),
        config.call.listen_timeout.as_secs()
    );

    match recognizer.listen().await? {
        Some(transcript) => println!("Transcript: {transcript}"),
        None => println!("(no speech detected)"),
    }
    Ok(())
}

/// Synthesize a text with the configured voice and play it
async fn test_tts(config: &Config, persona: &Persona, text: &str) -> anyhow::Result<()> {
    let speech = GeminiSpeech::new(
        gemini_client(config)?,
        config.gemini.tts_model.clone(),
        config.tts_voice(persona),
    );

    let stream = speech.synthesize(text).await?;
    let Some(clip) = collect_speech(stream).await? else {
        println!("Synthesis returned no audio");
        return Ok(());
    };

    let descriptor = clip.descriptor();
    println!(
        "{} bytes of PCM, {} Hz, {}-bit, {:.2}s",
        clip.data_len(),
        descriptor.sample_rate,
        descriptor.bits_per_sample,
        clip.duration().as_secs_f64()
    );

    SpeakerOutput::new().play(clip, CancellationToken::new()).await?;
    Ok(())
}

/// One model query against the persona, printing fragments as they arrive
async fn ask(config: &Config, persona: &Persona, text: &str) -> anyhow::Result<()> {
    let chat = GeminiChat::new(gemini_client(config)?, config.gemini.chat_model.clone());
    let mut conversation = chat.open_conversation(&persona.system_instruction()?);

    let mut fragments = conversation.send(text).await?;
    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        write!(stdout, "{}", fragment?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
