//! Line-oriented REPL: reads stdin, feeds each line to the session's agent,
//! and prints the event stream as it arrives. Grounded on the teacher's
//! `chat::interactive_loop` (read-line / drain-response / print loop),
//! narrowed to this system's structured [`AgentEvent`] stream instead of
//! plain text chunks.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use kubeagent_agent::{AgentEventKind, AgentManager, AgentState};

pub async fn run(manager: Arc<AgentManager>, session_id: String) -> anyhow::Result<()> {
    let agent = manager.get(&session_id).await?;

    let mut events = agent
        .take_event_receiver()
        .await
        .expect("no other reader has taken this agent's event receiver yet");
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event.kind);
        }
    });

    println!("kubeagent session {session_id} ready. Type `exit` to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        agent.handle_user_input(line).await?;
        if agent.state() == AgentState::Exited {
            break;
        }
    }
    Ok(())
}

fn print_event(kind: &AgentEventKind) {
    match kind {
        AgentEventKind::TextChunk { text } => {
            print!("{text}");
            std::io::stdout().flush().ok();
        }
        AgentEventKind::ToolCallRequest { name, arguments, .. } => {
            println!("\n[tool call] {name}({arguments})");
        }
        AgentEventKind::ToolCallResponse { result, is_error, .. } => {
            let label = if *is_error { "tool error" } else { "tool result" };
            println!("[{label}] {result}");
        }
        AgentEventKind::Error { message } => {
            println!("\n[error] {message}");
        }
        AgentEventKind::CompressionStarted => {
            println!("\n[compacting history...]");
        }
        AgentEventKind::CompressionFinished { summary_tokens } => {
            println!("[history compacted, summary ~{summary_tokens} tokens]");
        }
        AgentEventKind::StateChanged { .. } => {}
    }
}
