//! `toolloop chat` — Interactive or single-message chat mode.

use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use toolloop_core::message::{Message, Role, Transcript};

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let agent = super::build_agent(&config)?;

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let transcript = agent.run(&msg, &[]).await;
        eprint!("\r              \r");
        print_final(&transcript);
        return Ok(());
    }

    println!();
    println!("  Toolloop — Interactive Mode");
    println!();
    println!("  Backend:   {} ({})", config.backend.kind, config.backend.endpoint);
    println!("  Model:     {}", config.backend.model);
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        eprint!("  ...");
        let transcript = agent.run(line, &history).await;
        eprint!("\r     \r");

        for m in transcript.messages.iter().filter(|m| m.role == Role::Tool) {
            let name = m.tool_name.as_deref().unwrap_or("tool");
            eprintln!("  [{name}] {}", m.content);
        }
        print_final(&transcript);
        println!();

        // OpenAI-style backends reject tool messages without their originating call.
        history.push(Message::user(line));
        if let Some(last) = transcript.messages.into_iter().last() {
            history.push(last);
        }
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

fn print_final(transcript: &Transcript) {
    if let Some(last) = transcript.last() {
        for line in last.content.lines() {
            println!("  Assistant > {line}");
        }
    }
}
