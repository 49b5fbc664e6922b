use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{ClientEvent, RoomClient};
use serde::Deserialize;
use shared::{
    domain::{LanguageMode, ParticipantName, SessionKey},
    protocol::ServerEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "roomctl", about = "Terminal participant for collaborative code rooms")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join a session; stdin lines are chat messages or `/` commands.
    Join {
        session_key: String,
        participant_name: String,
    },
    /// List live sessions.
    Sessions,
}

#[derive(Debug, Deserialize)]
struct SessionSummary {
    session_key: String,
    members: Vec<String>,
    language: LanguageMode,
}

#[derive(Debug, PartialEq)]
enum Input {
    Chat(String),
    Language(LanguageMode),
    Load(PathBuf),
    Run,
    Help,
    Quit,
}

fn parse_input(line: &str) -> Result<Option<Input>> {
    let line = line.trim_end();
    let Some(command) = line.strip_prefix('/') else {
        if line.trim().is_empty() {
            return Ok(None);
        }
        return Ok(Some(Input::Chat(line.to_string())));
    };
    let (name, arg) = command
        .split_once(' ')
        .map(|(name, arg)| (name, arg.trim()))
        .unwrap_or((command, ""));
    let input = match name {
        "lang" => match LanguageMode::parse(arg) {
            Some(mode) => Input::Language(mode),
            None => bail!("unknown language '{arg}', expected one of javascript, python, java, cpp"),
        },
        "load" if !arg.is_empty() => Input::Load(PathBuf::from(arg)),
        "load" => bail!("usage: /load <file>"),
        "run" => Input::Run,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => bail!("unknown command '/{other}', try /help"),
    };
    Ok(Some(input))
}

fn render(event: &ServerEvent) -> String {
    match event {
        ServerEvent::InitialState {
            language,
            members,
            transcript,
            document,
            ..
        } => {
            let mut lines = vec![format!(
                "joined: language={language} members={}",
                join_names(members)
            )];
            lines.extend(
                transcript
                    .iter()
                    .map(|entry| format!("[{}] {}: {}", entry.timestamp.format("%H:%M:%S"), entry.author, entry.text)),
            );
            lines.push(format!("--- document ---\n{document}\n----------------"));
            lines.join("\n")
        }
        ServerEvent::UserJoined { members, .. } => format!("members: {}", join_names(members)),
        ServerEvent::CodeUpdate { document } => {
            format!("document updated ({} bytes)", document.len())
        }
        ServerEvent::LanguageUpdate { language } => format!("language: {language}"),
        ServerEvent::UserTyping { participant_name } => format!("{participant_name} is typing..."),
        ServerEvent::ReceiveMessage { message } => format!(
            "[{}] {}: {}",
            message.timestamp.format("%H:%M:%S"),
            message.author,
            message.text
        ),
        ServerEvent::CodeResponse(result) => format!("--- output ---\n{}", result.output()),
    }
}

fn join_names(names: &[ParticipantName]) -> String {
    names
        .iter()
        .map(ParticipantName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

async fn list_sessions(server: &str) -> Result<()> {
    let url = format!("{}/sessions", server.trim_end_matches('/'));
    let sessions: Vec<SessionSummary> = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach {url}"))?
        .error_for_status()?
        .json()
        .await
        .context("invalid sessions response")?;
    if sessions.is_empty() {
        println!("no live sessions");
    }
    for session in sessions {
        println!(
            "{} [{}] {}",
            session.session_key,
            session.language,
            session.members.join(", ")
        );
    }
    Ok(())
}

async fn join(server: &str, session_key: String, participant_name: String) -> Result<()> {
    let client = RoomClient::join(
        server,
        SessionKey::new(session_key),
        ParticipantName::new(participant_name),
    )
    .await?;
    let mut events = client.subscribe_events();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut language = LanguageMode::default();
    let mut document = String::new();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ClientEvent::Server(event)) => {
                    match &event {
                        ServerEvent::InitialState { language: mode, document: text, .. } => {
                            language = *mode;
                            document = text.clone();
                        }
                        ServerEvent::LanguageUpdate { language: mode } => language = *mode,
                        ServerEvent::CodeUpdate { document: text } => document = text.clone(),
                        _ => {}
                    }
                    println!("{}", render(&event));
                }
                Ok(ClientEvent::Error(message)) => eprintln!("error: {message}"),
                Ok(ClientEvent::Disconnected) | Err(_) => {
                    eprintln!("disconnected");
                    return Ok(());
                }
            },
            line = stdin.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let input = match parse_input(&line) {
                    Ok(Some(input)) => input,
                    Ok(None) => continue,
                    Err(err) => {
                        eprintln!("{err}");
                        continue;
                    }
                };
                match input {
                    Input::Chat(text) => client.send_message(text)?,
                    Input::Language(mode) => client.change_language(mode)?,
                    Input::Load(path) => {
                        document = tokio::fs::read_to_string(&path)
                            .await
                            .with_context(|| format!("failed to read {}", path.display()))?;
                        client.typing()?;
                        client.edit(document.clone())?;
                        println!("document replaced from {}", path.display());
                    }
                    Input::Run => client.run(document.clone(), language.as_str(), None)?,
                    Input::Help => println!(
                        "/lang <mode>  /load <file>  /run  /quit  (anything else is chat)"
                    ),
                    Input::Quit => break,
                }
            }
        }
    }

    client.leave().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Join {
            session_key,
            participant_name,
        } => join(&cli.server, session_key, participant_name).await,
        Command::Sessions => list_sessions(&cli.server).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::TranscriptEntry;

    #[test]
    fn plain_lines_are_chat() {
        assert_eq!(
            parse_input("hello there").expect("parse"),
            Some(Input::Chat("hello there".into()))
        );
        assert_eq!(parse_input("   ").expect("parse"), None);
    }

    #[test]
    fn slash_commands_are_parsed() {
        assert_eq!(
            parse_input("/lang Python").expect("parse"),
            Some(Input::Language(LanguageMode::Python))
        );
        assert_eq!(
            parse_input("/load src/main.py").expect("parse"),
            Some(Input::Load(PathBuf::from("src/main.py")))
        );
        assert_eq!(parse_input("/run").expect("parse"), Some(Input::Run));
        assert_eq!(parse_input("/exit").expect("parse"), Some(Input::Quit));
    }

    #[test]
    fn bad_commands_are_rejected() {
        assert!(parse_input("/lang cobol").is_err());
        assert!(parse_input("/load").is_err());
        assert!(parse_input("/dance").is_err());
    }

    #[test]
    fn renders_chat_and_membership() {
        let message = TranscriptEntry::chat(&ParticipantName::from("bob"), "hi");
        assert!(render(&ServerEvent::ReceiveMessage { message }).ends_with("bob: hi"));
        assert_eq!(
            render(&ServerEvent::UserJoined {
                joined: None,
                members: vec![ParticipantName::from("a"), ParticipantName::from("b")],
            }),
            "members: a, b"
        );
    }
}
