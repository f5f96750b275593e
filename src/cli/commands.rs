//! CLI commands
//!
//! Special commands that can be executed in the REPL.

use std::path::Path;

use crate::agent::Agent;
use crate::core::{Message, Result, Role};
use crate::observability::{JsonlTraceExporter, SpanTree};

/// Result of parsing a command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Send as a user message
    Continue(String),
    /// Command was handled, show output
    Handled(String),
    /// Exit the REPL
    Exit,
}

/// Parse and handle REPL commands. Anything that is not a command is passed
/// through as `Continue`.
pub async fn handle_command(input: &str, agent: &mut Agent, trace_dir: Option<&Path>) -> Result<CommandResult> {
    let input = input.trim();
    let (cmd, args) = match input.split_once(' ') {
        Some((cmd, args)) => (cmd, args.trim()),
        None => (input, ""),
    };
    let cmd = cmd.trim_start_matches('/').to_lowercase();

    match cmd.as_str() {
        "exit" | "quit" | "q" => Ok(CommandResult::Exit),

        "help" | "?" => Ok(CommandResult::Handled(help_text())),

        "new" | "clear" => {
            let id = agent.new_conversation().id.clone();
            Ok(CommandResult::Handled(format!("Started conversation {}", id)))
        }

        "history" => {
            let limit = if args.is_empty() {
                None
            } else {
                match args.parse::<usize>() {
                    Ok(n) => Some(n),
                    Err(_) => {
                        return Ok(CommandResult::Handled(
                            "Usage: history [n]".to_string(),
                        ))
                    }
                }
            };
            Ok(CommandResult::Handled(format_history(agent.history(limit))))
        }

        "tools" => {
            let tools = agent.tools();
            if tools.is_empty() {
                return Ok(CommandResult::Handled("No tools registered.".to_string()));
            }
            let lines: Vec<String> = tools
                .definitions()
                .iter()
                .map(|t| format!("  {:<22} {}", t.name, t.description))
                .collect();
            Ok(CommandResult::Handled(format!("Tools:\n{}", lines.join("\n"))))
        }

        "status" => {
            let conversation = agent.conversation();
            Ok(CommandResult::Handled(format!(
                "Status:\n\
                 ─────────────────────────────\n\
                 Provider:      {}\n\
                 Model:         {}\n\
                 Conversation:  {}\n\
                 Messages:      {}\n\
                 Tools:         {}\n\
                 Token budget:  {}\n\
                 State:         {}",
                agent.provider_name(),
                agent.model(),
                conversation.id,
                conversation.len(),
                agent.tools().len(),
                agent.token_budget(),
                agent.state(),
            )))
        }

        "conversations" | "ls" => {
            let ids = agent.list_conversations().await?;
            if ids.is_empty() {
                return Ok(CommandResult::Handled("No saved conversations.".to_string()));
            }
            let current = agent.conversation().id.clone();
            let lines: Vec<String> = ids
                .iter()
                .map(|id| {
                    let marker = if *id == current { "*" } else { " " };
                    format!("{} {}", marker, id)
                })
                .collect();
            Ok(CommandResult::Handled(lines.join("\n")))
        }

        "load" | "resume" => {
            if args.is_empty() {
                return Ok(CommandResult::Handled("Usage: load <conversation-id>".to_string()));
            }
            let conversation = agent.resume(args).await?;
            Ok(CommandResult::Handled(format!(
                "Loaded conversation {} ({} messages)",
                conversation.id,
                conversation.len()
            )))
        }

        "trace" => {
            let Some(dir) = trace_dir else {
                return Ok(CommandResult::Handled("Trace export is disabled.".to_string()));
            };
            let trace_id = if args.is_empty() {
                agent.conversation().trace_id()
            } else {
                args.to_string()
            };
            let spans = JsonlTraceExporter::new(dir).load(&trace_id)?;
            Ok(CommandResult::Handled(render_trace(&trace_id, spans)))
        }

        _ if input.starts_with('/') => Ok(CommandResult::Handled(format!(
            "Unknown command: {}. Type 'help' for available commands.",
            cmd
        ))),

        _ => Ok(CommandResult::Continue(input.to_string())),
    }
}

/// Render a trace as an indented span tree
pub fn render_trace(trace_id: &str, spans: Vec<crate::observability::Span>) -> String {
    let count = spans.len();
    let tree = SpanTree::build(spans);
    let body: String = tree.iter().map(SpanTree::render).collect();
    format!("Trace {} ({} spans)\n{}", trace_id, count, body.trim_end())
}

fn format_history(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "No messages yet.".to_string();
    }
    messages
        .iter()
        .map(|m| {
            let body = match m.role {
                Role::Assistant if m.has_tool_requests() => {
                    let names: Vec<String> = m.tool_requests().into_iter().map(|r| r.name).collect();
                    format!("[calls {}] {}", names.join(", "), m.content)
                }
                _ => m.content.clone(),
            };
            format!("{:>9}: {}", m.role, truncate(&body, 200))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}…", cut)
}

/// Generate help text
fn help_text() -> String {
    r#"Commands:
─────────────────────────────────────────────
  help, ?             Show this help message
  exit, quit, q       Exit
  new                 Start a new conversation
  history [n]         Show the last n messages (all by default)
  tools               List registered tools
  status              Show provider, model and conversation
  conversations       List saved conversations
  load <id>           Resume a saved conversation
  trace [id]          Show the span tree of a trace
                      (defaults to the current conversation)

Anything else is sent to the agent.
─────────────────────────────────────────────"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedProvider;
    use std::sync::Arc;

    fn agent(provider: ScriptedProvider) -> Agent {
        Agent::builder().provider(Arc::new(provider)).build().unwrap()
    }

    #[tokio::test]
    async fn test_plain_input_passes_through() {
        let mut agent = agent(ScriptedProvider::new());
        let result = handle_command("what is 2+2", &mut agent, None).await.unwrap();
        assert_eq!(result, CommandResult::Continue("what is 2+2".to_string()));
    }

    #[tokio::test]
    async fn test_exit_and_unknown() {
        let mut agent = agent(ScriptedProvider::new());
        assert_eq!(handle_command("exit", &mut agent, None).await.unwrap(), CommandResult::Exit);
        match handle_command("/bogus", &mut agent, None).await.unwrap() {
            CommandResult::Handled(text) => assert!(text.contains("Unknown command")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_and_new() {
        let mut agent = agent(ScriptedProvider::new().respond("4"));
        agent.send_message("what is 2+2").await.unwrap();

        match handle_command("history 1", &mut agent, None).await.unwrap() {
            CommandResult::Handled(text) => {
                assert!(text.contains("assistant: 4"));
                assert!(!text.contains("2+2"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let old = agent.conversation().id.clone();
        handle_command("new", &mut agent, None).await.unwrap();
        assert_ne!(agent.conversation().id, old);
    }

    #[tokio::test]
    async fn test_trace_disabled() {
        let mut agent = agent(ScriptedProvider::new());
        assert_eq!(
            handle_command("trace", &mut agent, None).await.unwrap(),
            CommandResult::Handled("Trace export is disabled.".to_string())
        );
    }
}
