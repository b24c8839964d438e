// demos/polaris_chat.rs
//
// Terminal chat with Polaris. Type a question, or one of:
//   /mode <standard|fast|turbo|deep>   switch thinking mode
//   /image <path>                      attach an image to the next question
//   /speak                             read the last answer aloud
//   /connect                           select an API key
//   /quit
use base64::Engine as _;
use polaris::audio::{PLAYBACK_SAMPLE_RATE_HZ, SpeechPlayer};
use polaris::credential::{connect_key, probe_key};
use polaris::{
    Conversation, CredentialCell, EnvKeyProvider, KeyProvider, MessageRole, Mode, PolarisConfig,
    ResponseClient,
};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{info, warn};

#[path = "common/cpal_audio.rs"]
mod cpal_audio;

/// Environment first, then a key pasted on stdin.
struct StdinKeyProvider;

impl KeyProvider for StdinKeyProvider {
    fn has_selected_key(&self) -> bool {
        EnvKeyProvider.has_selected_key()
    }

    fn select_key(&self) -> Option<String> {
        if let Some(key) = EnvKeyProvider.select_key() {
            return Some(key);
        }
        print!("Paste a Gemini API key: ");
        std::io::stdout().flush().ok()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        Some(line.trim().to_string())
    }
}

fn image_data_uri(path: &Path) -> anyhow::Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        other => anyhow::bail!("unsupported image type: .{}", other),
    };
    let bytes = std::fs::read(path)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime, encoded))
}

fn read_line() -> Option<String> {
    let mut line = String::new();
    match tokio::task::block_in_place(|| std::io::stdin().lock().read_line(&mut line)) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end().to_string()),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = PolarisConfig::from_env();
    let credential = CredentialCell::new();
    if !probe_key(&EnvKeyProvider, &credential) {
        println!("No API key found. Use /connect to add one.");
    }
    let client = ResponseClient::new(config, credential.clone())?;
    let mut conversation = Conversation::new();
    let mut pending_image: Option<String> = None;

    // Output stream must outlive the player.
    let mut speech: Option<(cpal::Stream, SpeechPlayer<cpal_audio::CpalSink>)> = None;

    println!("Polaris ready ({} mode). /quit to exit.", conversation.mode());
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = read_line() else { break };
        let (command, arg) = match line.split_once(' ') {
            Some((c, a)) => (c, a.trim()),
            None => (line.as_str(), ""),
        };

        match command {
            "/quit" | "/exit" => break,
            "/mode" => match arg.parse::<Mode>() {
                Ok(mode) => {
                    conversation.set_mode(mode);
                    let profile = mode.profile();
                    println!(
                        "Mode {} ({}, search: {}, thinking budget: {:?}).",
                        mode, profile.model, profile.google_search, profile.thinking_budget
                    );
                }
                Err(e) => println!("{}.", e),
            },
            "/image" => match image_data_uri(Path::new(arg)) {
                Ok(uri) => {
                    println!("Attached {} to the next question.", arg);
                    pending_image = Some(uri);
                }
                Err(e) => println!("Could not attach image: {}", e),
            },
            "/connect" => {
                let connected =
                    tokio::task::block_in_place(|| connect_key(&StdinKeyProvider, &credential));
                println!("{}", if connected { "Key connected." } else { "No key connected." });
            }
            "/speak" => {
                let Some(last) = conversation
                    .messages()
                    .iter()
                    .rev()
                    .find(|m| m.role == MessageRole::Model && !m.is_error)
                else {
                    println!("Nothing to read yet.");
                    continue;
                };
                let Some(audio) = client.generate_speech(&last.text).await else {
                    println!("Speech is unavailable right now.");
                    continue;
                };
                if speech.is_none() {
                    match cpal_audio::open_output(PLAYBACK_SAMPLE_RATE_HZ) {
                        Ok((stream, sink)) => speech = Some((stream, SpeechPlayer::new(sink))),
                        Err(e) => {
                            warn!("[Demo] No audio output: {}", e);
                            println!("No audio output device.");
                            continue;
                        }
                    }
                }
                if let Some((_, player)) = speech.as_mut() {
                    if let Err(e) = player.play_base64(&audio) {
                        println!("Could not play speech: {}", e);
                    }
                }
            }
            _ if command.starts_with('/') => println!("Unknown command {}.", command),
            _ => {
                let image = pending_image.take();
                println!("Polaris is thinking...");
                match conversation.submit(&client, &line, image).await {
                    Some(reply) => {
                        println!("\n{}\n", reply.text);
                        for source in &reply.grounding_sources {
                            println!("  - {} <{}>", source.title, source.url);
                        }
                    }
                    None => info!("[Demo] Nothing to send."),
                }
            }
        }
    }

    println!("Goodbye.");
    Ok(())
}
