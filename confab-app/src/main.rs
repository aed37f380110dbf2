//! Confab terminal host.
//!
//! Wires the core session engine to local persistence and a minimal line
//! interface: pick a stored conversation, connect, talk, `m` to mute, `q`
//! to hang up.

mod settings;
mod storage;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use confab_core::{ConnectionStatus, SessionConfig, SessionController};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use storage::{Conversation, ConversationConfig, ConversationPatch, ConversationStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("confab_core=info,confab_app=info")),
        )
        .init();

    let settings_path = default_settings_path();
    let settings = load_settings(&settings_path);
    if !settings_path.exists() {
        if let Err(e) = save_settings(&settings_path, &settings) {
            warn!("could not write default settings file: {e}");
        }
    }

    let store = ConversationStore::open(&settings.database_path(&settings_path))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("list") => cmd_list(&store, args.iter().any(|a| a == "--all")),
        Some("new") => cmd_new(&store, &settings, &args[1..]),
        Some("show") => cmd_show(&store, arg_at(&args, 1)?),
        Some("archive") => cmd_archive(&store, arg_at(&args, 1)?),
        Some("delete") => cmd_delete(&store, arg_at(&args, 1)?),
        Some("talk") => cmd_talk(&store, &settings, arg_at(&args, 1)?).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!(
        "confab — real-time voice conversations

USAGE:
    confab list [--all]                 list conversations (--all includes archived)
    confab new <title> [options]        create a conversation
    confab show <id>                    show a conversation and its transcript
    confab archive <id>                 archive a conversation
    confab delete <id>                  delete a conversation
    confab talk <id>                    start a live voice session

OPTIONS for `new`:
    --voice <name>          voice identity (default from settings)
    --model <id>            model identifier
    --system <text>         system instruction
    --language <code>       ISO 639-1 language code
    --temperature <value>   sampling temperature (0.0–2.0)

The API key comes from GEMINI_API_KEY or the settings file."
    );
}

fn arg_at(args: &[String], index: usize) -> Result<&str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing <id> argument — run `confab` for usage"))
}

fn cmd_list(store: &ConversationStore, include_archived: bool) -> Result<()> {
    let conversations = store.list_all(include_archived)?;
    if conversations.is_empty() {
        println!("no conversations yet — create one with `confab new <title>`");
        return Ok(());
    }
    for conversation in conversations {
        println!(
            "{}  {:<30}  voice={:<8} messages={:<4}{}",
            conversation.id,
            conversation.title,
            conversation.config.voice_name,
            conversation.message_count,
            if conversation.archived {
                "  [archived]"
            } else {
                ""
            }
        );
    }
    Ok(())
}

fn cmd_new(store: &ConversationStore, settings: &AppSettings, rest: &[String]) -> Result<()> {
    let mut title: Option<String> = None;
    let mut system_prompt = settings.default_system_prompt.clone();
    let mut config = ConversationConfig {
        voice_name: settings.default_voice.clone(),
        model: settings.default_model.clone(),
        language: settings.default_language.clone(),
        ..ConversationConfig::default()
    };

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--voice" => config.voice_name = take_value(&mut iter, "--voice")?,
            "--model" => config.model = take_value(&mut iter, "--model")?,
            "--system" => system_prompt = take_value(&mut iter, "--system")?,
            "--language" => config.language = take_value(&mut iter, "--language")?,
            "--temperature" => {
                config.temperature = take_value(&mut iter, "--temperature")?
                    .parse()
                    .context("--temperature expects a number")?;
            }
            other if title.is_none() && !other.starts_with("--") => {
                title = Some(other.to_string());
            }
            other => bail!("unexpected argument {other:?}"),
        }
    }

    let title = title.ok_or_else(|| anyhow!("usage: confab new <title> [options]"))?;
    let conversation = store.create(&title, &system_prompt, config)?;
    println!("created {}  {}", conversation.id, conversation.title);
    Ok(())
}

fn take_value(iter: &mut std::slice::Iter<'_, String>, flag: &str) -> Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| anyhow!("{flag} expects a value"))
}

fn cmd_show(store: &ConversationStore, id: &str) -> Result<()> {
    let conversation = require_conversation(store, id)?;
    println!("{}  {}", conversation.id, conversation.title);
    println!("  voice:    {}", conversation.config.voice_name);
    println!("  model:    {}", conversation.config.model);
    println!("  language: {}", conversation.config.language);
    println!("  system:   {}", conversation.system_prompt);
    println!("  created:  {}", conversation.created_at.to_rfc3339());

    let messages = store.messages(id)?;
    if messages.is_empty() {
        println!("  (no transcript yet)");
    } else {
        println!();
        for message in messages {
            println!("  {}: {}", message.role, message.content);
        }
    }
    Ok(())
}

fn cmd_archive(store: &ConversationStore, id: &str) -> Result<()> {
    let updated = store.update(
        id,
        ConversationPatch {
            archived: Some(true),
            ..ConversationPatch::default()
        },
    )?;
    match updated {
        Some(conversation) => println!("archived {}", conversation.title),
        None => bail!("no conversation with id {id}"),
    }
    Ok(())
}

fn cmd_delete(store: &ConversationStore, id: &str) -> Result<()> {
    if store.delete(id)? {
        println!("deleted {id}");
        Ok(())
    } else {
        bail!("no conversation with id {id}")
    }
}

async fn cmd_talk(store: &ConversationStore, settings: &AppSettings, id: &str) -> Result<()> {
    let conversation = require_conversation(store, id)?;
    let api_key = settings
        .resolve_api_key()
        .ok_or_else(|| anyhow!("no API key — set GEMINI_API_KEY or apiKey in settings"))?;

    let session = SessionConfig {
        model: conversation.config.model.clone(),
        voice_name: conversation.config.voice_name.clone(),
        system_prompt: conversation.system_prompt.clone(),
        temperature: Some(conversation.config.temperature),
        language: Some(conversation.config.language.clone()),
        api_key,
        endpoint: settings.endpoint.clone(),
    };

    let controller = Arc::new(SessionController::new());
    let mut status_rx = controller.subscribe_status();
    let mut transcript_rx = controller.subscribe_transcripts();

    println!("{} — {}", conversation.title, conversation.config.voice_name);
    println!("m = mute/unmute, q = hang up");
    controller.connect(session).await.map_err(|e| {
        anyhow!(
            "{}",
            controller
                .snapshot()
                .error
                .unwrap_or_else(|| e.to_string())
        )
    })?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = status_rx.recv() => match event {
                Ok(event) => match event.status {
                    ConnectionStatus::Connecting => println!("connecting…"),
                    ConnectionStatus::Connected => println!("connected — start talking"),
                    ConnectionStatus::Disconnected => {
                        println!("disconnected");
                        break;
                    }
                    ConnectionStatus::Error => {
                        println!("{}", event.detail.unwrap_or_else(|| "connection error".into()));
                        break;
                    }
                },
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            event = transcript_rx.recv() => {
                if let Ok(event) = event {
                    println!("assistant: {}", event.text);
                    if let Err(e) = store.append_message(&conversation.id, "assistant", &event.text) {
                        warn!("could not store transcript line: {e}");
                    }
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(input)) => match input.trim() {
                    "m" => {
                        let muted = controller.toggle_mute();
                        println!("{}", if muted { "muted" } else { "unmuted" });
                    }
                    "q" => break,
                    "" => {}
                    other => println!("unknown command {other:?} (m = mute, q = hang up)"),
                },
                _ => break, // stdin closed
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    controller.disconnect().await;
    println!("session ended");
    Ok(())
}

fn require_conversation(store: &ConversationStore, id: &str) -> Result<Conversation> {
    store
        .get_by_id(id)?
        .ok_or_else(|| anyhow!("no conversation with id {id}"))
}
