//! Interactive REPL
//!
//! Reads lines from stdin, dispatches commands and sends everything else to
//! the agent.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::agent::Agent;
use crate::cli::commands::{handle_command, CommandResult};
use crate::core::Result;

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    agent: Agent,
    trace_dir: Option<PathBuf>,
}

impl Repl {
    pub fn new(agent: Agent, trace_dir: Option<PathBuf>) -> Self {
        Self { agent, trace_dir }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    /// Run the REPL until `exit` or end of input
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("You: ");
            stdout.flush()?;

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    // EOF (Ctrl+D)
                    println!("\nGoodbye!");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    continue;
                }
            }

            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            match handle_command(input, &mut self.agent, self.trace_dir.as_deref()).await {
                Ok(CommandResult::Exit) => {
                    println!("\nGoodbye!");
                    break;
                }
                Ok(CommandResult::Handled(output)) => println!("{}\n", output),
                Ok(CommandResult::Continue(message)) => match self.agent.send_message(&message).await {
                    Ok(reply) => println!("\nAssistant:\n{}\n", reply),
                    Err(e) => eprintln!("\nError ({}): {}\n", e.kind(), e),
                },
                Err(e) => eprintln!("Command error: {}\n", e),
            }
        }

        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!("detective {}", env!("CARGO_PKG_VERSION"));
        println!("Provider:     {} ({})", self.agent.provider_name(), self.agent.model());
        println!("Conversation: {}", self.agent.conversation().id);
        println!("Tools:        {}", self.agent.tools().len());
        println!();
        println!("Commands: help, new, history, tools, status, conversations, load, trace, exit");
        println!("─────────────────────────────────────────────────────────────");
    }
}
