//! End-to-end agent scenarios
//!
//! Drives the agent with a scripted provider against real tools, stores and
//! tracers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use detective::agent::{AgentState, Conversation};
use detective::core::retry::{RecordingSleeper, RetryConfig};
use detective::core::{AgentError, Message, Role};
use detective::llm::ScriptedProvider;
use detective::observability::{MemoryExporter, SpanStatus, Tracer};
use detective::store::{ConversationStore, FileConversationStore, MemoryConversationStore};
use detective::tools::{register_release_tools, ToolDefinition, ToolRegistry};
use detective::{Agent, AgentOptions, Result};
use serde_json::json;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn options() -> AgentOptions {
    AgentOptions {
        retry: RetryConfig::immediate(3),
        ..AgentOptions::default()
    }
}

/// Memory store whose saves can be switched to fail
#[derive(Default)]
struct BrokenDiskStore {
    inner: MemoryConversationStore,
    failing: AtomicBool,
}

#[async_trait::async_trait]
impl ConversationStore for BrokenDiskStore {
    async fn save(&self, conversation: &Conversation) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AgentError::persistence("disk full"));
        }
        self.inner.save(conversation).await
    }

    async fn load(&self, id: &str) -> Result<Conversation> {
        self.inner.load(id).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        self.inner.list().await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id).await
    }
}

fn releases_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("releases.json");
    std::fs::write(
        &path,
        json!({
            "v1.0": {
                "version": "v1.0",
                "changes": ["auth refactor", "new billing export"],
                "tests": {"passed": 140, "failed": 2},
                "deployment": {"error_rate": 0.04}
            },
            "v1.1": {
                "version": "v1.1",
                "changes": ["copy fixes"],
                "tests": {"passed": 150, "failed": 0}
            }
        })
        .to_string(),
    )
    .unwrap();
    path
}

#[tokio::test]
async fn test_simple_question_is_persisted() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileConversationStore::new(dir.path()));
    let provider = Arc::new(ScriptedProvider::new().respond("4"));
    let mut agent = Agent::builder()
        .provider(provider.clone())
        .store(store.clone())
        .settings(options())
        .build()
        .unwrap();

    let reply = assert_ok!(agent.send_message("what is 2+2").await);
    assert_eq!(reply, "4");

    let saved = store.load(&agent.conversation().id).await.unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved.messages()[0].role, Role::User);
    assert_eq!(saved.messages()[1].content, "4");
    assert_eq!(&saved, agent.conversation());
}

#[tokio::test]
async fn test_release_lookup_with_tool_call() {
    let dir = TempDir::new().unwrap();
    let mut tools = ToolRegistry::new();
    register_release_tools(&mut tools, releases_file(&dir), Some(dir.path().join("reports")));

    let provider = Arc::new(
        ScriptedProvider::new()
            .respond_with_tools(&[("get_release_summary", r#"{"release_id": "v1.0"}"#)])
            .respond("v1.0 is risky: 2 failing tests and a 4% error rate."),
    );
    let store = Arc::new(FileConversationStore::new(dir.path().join("conversations")));
    let mut agent = Agent::builder()
        .provider(provider.clone())
        .tools(tools)
        .store(store.clone())
        .settings(options())
        .build()
        .unwrap();

    let reply = agent.send_message("Assess release v1.0").await.unwrap();
    assert!(reply.contains("risky"));
    assert_eq!(provider.call_count(), 2);

    let messages = agent.conversation().messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1].role, Role::Assistant);
    assert!(messages[1].has_tool_requests());
    assert_eq!(messages[2].role, Role::Tool);
    assert_eq!(messages[2].tool_call_id(), Some("call_1"));
    assert!(messages[2].content.contains("auth refactor"));

    // The second provider call saw the tool result, and both saw the tools.
    let requests = provider.requests();
    assert!(requests.iter().all(|r| r.tool_count == 3));
    let second = &requests[1].messages;
    assert_eq!(second.last().map(|m| m.role), Some(Role::Tool));

    let reloaded = store.load(&agent.conversation().id).await.unwrap();
    assert_eq!(reloaded.len(), 4);
}

#[tokio::test]
async fn test_loop_cap_boundary() {
    let tools = || {
        let mut tools = ToolRegistry::new();
        tools.register(ToolDefinition::new("ping", "Reply with pong", json!({"type": "object"}), |_| async {
            Ok(json!("pong"))
        }));
        tools
    };
    let limited = AgentOptions {
        max_tool_iterations: 3,
        ..options()
    };

    // Tools on the first two turns and a reply on the last one fits the cap.
    let provider = Arc::new(
        ScriptedProvider::new()
            .respond_with_tools(&[("ping", "{}")])
            .respond_with_tools(&[("ping", "{}")])
            .respond("done"),
    );
    let mut agent = Agent::builder()
        .provider(provider.clone())
        .tools(tools())
        .settings(limited.clone())
        .build()
        .unwrap();
    assert_eq!(agent.send_message("go").await.unwrap(), "done");
    assert_eq!(provider.call_count(), 3);

    // One more tool turn exceeds it and leaves no trace in the conversation.
    let provider = Arc::new(
        ScriptedProvider::new()
            .respond_with_tools(&[("ping", "{}")])
            .respond_with_tools(&[("ping", "{}")])
            .respond_with_tools(&[("ping", "{}")])
            .respond("too late"),
    );
    let mut agent = Agent::builder()
        .provider(provider.clone())
        .tools(tools())
        .settings(limited)
        .build()
        .unwrap();
    let err = assert_err!(agent.send_message("go").await);
    assert!(matches!(err, AgentError::ToolLoopExceeded(3)));
    assert_eq!(provider.call_count(), 3);
    assert_eq!(provider.remaining(), 1);
    assert!(agent.conversation().is_empty());
    assert_eq!(agent.state(), AgentState::Idle);
}

#[tokio::test]
async fn test_failing_tool_does_not_abort_turn() {
    let mut tools = ToolRegistry::new();
    tools.register(ToolDefinition::new("flaky", "Always fails", json!({"type": "object"}), |_| async {
        Err(anyhow::anyhow!("disk on fire"))
    }));
    tools.register(ToolDefinition::new("panicky", "Always panics", json!({"type": "object"}), |args| async move {
        if args.is_empty() {
            panic!("boom");
        }
        Ok(json!(null))
    }));

    let provider = Arc::new(
        ScriptedProvider::new()
            .respond_with_tools(&[("flaky", "{}"), ("panicky", "{}"), ("missing", "{}")])
            .respond("tools are broken"),
    );
    let mut agent = Agent::builder()
        .provider(provider)
        .tools(tools)
        .settings(AgentOptions {
            parallel_tools: true,
            ..options()
        })
        .build()
        .unwrap();

    assert_eq!(agent.send_message("try the tools").await.unwrap(), "tools are broken");

    let messages = agent.conversation().messages();
    assert_eq!(messages.len(), 6);
    let results: Vec<&Message> = messages.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(results.len(), 3);
    // Results keep request order even when run concurrently.
    let ids: Vec<_> = results.iter().map(|m| m.tool_call_id()).collect();
    assert_eq!(ids, vec![Some("call_1"), Some("call_2"), Some("call_3")]);
    assert!(results[0].content.contains("disk on fire"));
    assert!(results[1].content.contains("boom"));
    assert!(results[2].content.contains("Tool not found: missing"));
}

#[tokio::test]
async fn test_send_timeout_leaves_conversation_unchanged() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .respond("first")
            .respond("never seen")
            .with_delay(Duration::from_millis(50)),
    );
    let mut agent = Agent::builder()
        .provider(provider)
        .settings(options())
        .build()
        .unwrap();

    agent
        .send_message_with_timeout("hello", Duration::from_secs(5))
        .await
        .unwrap();
    let before = agent.conversation().clone();

    let err = agent
        .send_message_with_timeout("again", Duration::from_millis(5))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::SendTimeout(_)));
    assert_eq!(agent.conversation(), &before);
    assert_eq!(agent.state(), AgentState::Idle);
}

#[tokio::test]
async fn test_configured_send_timeout() {
    let provider = Arc::new(ScriptedProvider::new().respond("slow").with_delay(Duration::from_millis(200)));
    let mut agent = Agent::builder()
        .provider(provider)
        .settings(AgentOptions {
            send_timeout: Some(Duration::from_millis(10)),
            ..options()
        })
        .build()
        .unwrap();

    assert!(matches!(
        agent.send_message("hi").await,
        Err(AgentError::SendTimeout(_))
    ));
    assert!(agent.conversation().is_empty());
}

#[tokio::test]
async fn test_transient_failures_back_off() {
    let sleeper = Arc::new(RecordingSleeper::new());
    let exporter = Arc::new(MemoryExporter::new());
    let provider = Arc::new(
        ScriptedProvider::new()
            .fail(AgentError::rate_limit("429 slow down"))
            .fail(AgentError::network("connection reset"))
            .respond("recovered"),
    );
    let mut agent = Agent::builder()
        .provider(provider.clone())
        .tracer(Tracer::new(exporter.clone()))
        .sleeper(sleeper.clone())
        .settings(AgentOptions {
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_secs: 1.0,
                max_delay_secs: 60.0,
                backoff_factor: 2.0,
                jitter: false,
            },
            ..AgentOptions::default()
        })
        .build()
        .unwrap();

    assert_eq!(agent.send_message("hi").await.unwrap(), "recovered");
    assert_eq!(provider.call_count(), 3);
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );

    let attempts = exporter.spans_named("provider.complete.attempt");
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].attribute("error.kind"), Some(&json!("rate_limit")));
    assert_eq!(attempts[1].attribute("error.kind"), Some(&json!("network")));
}

#[tokio::test]
async fn test_old_history_is_truncated_for_the_provider() {
    let mut conversation = Conversation::new("You are terse.");
    for i in 0..10 {
        conversation
            .push(Message::user(format!("question {} {}", i, "x".repeat(100))))
            .unwrap();
        conversation
            .push(Message::assistant(format!("answer {} {}", i, "y".repeat(100))))
            .unwrap();
    }

    let provider = Arc::new(ScriptedProvider::new().respond("ok"));
    let mut agent = Agent::builder()
        .provider(provider.clone())
        .conversation(conversation)
        .settings(AgentOptions {
            token_budget: Some(200),
            ..options()
        })
        .build()
        .unwrap();

    agent.send_message("latest").await.unwrap();

    let sent = &provider.requests()[0].messages;
    assert_eq!(sent[0].role, Role::System);
    assert_eq!(sent.last().map(|m| m.content.as_str()), Some("latest"));
    assert!(sent.len() < 22);
    // Full history is still kept locally.
    assert_eq!(agent.conversation().len(), 22);
}

#[tokio::test]
async fn test_resume_from_disk_in_a_new_agent() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileConversationStore::new(dir.path()));

    let mut first = Agent::builder()
        .provider(Arc::new(ScriptedProvider::new().respond("noted")))
        .store(store.clone())
        .settings(options())
        .build()
        .unwrap();
    first.send_message("remember v1.1").await.unwrap();
    let id = first.conversation().id.clone();
    drop(first);

    let provider = Arc::new(ScriptedProvider::new().respond("v1.1"));
    let mut second = Agent::builder()
        .provider(provider.clone())
        .store(store)
        .settings(options())
        .build()
        .unwrap();
    second.resume(&id).await.unwrap();
    second.send_message("which release?").await.unwrap();

    // The provider saw the system prompt plus the earlier exchange.
    assert_eq!(provider.requests()[0].messages.len(), 4);
    assert_eq!(second.conversation().len(), 4);
    assert_eq!(second.list_conversations().await.unwrap(), vec![id]);
}

#[tokio::test]
async fn test_resume_unknown_conversation() {
    let mut agent = Agent::builder()
        .provider(Arc::new(ScriptedProvider::new()))
        .build()
        .unwrap();
    assert!(matches!(
        agent.resume("does-not-exist").await,
        Err(AgentError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_failed_save_keeps_last_persisted_state() {
    let store = Arc::new(BrokenDiskStore::default());
    let exporter = Arc::new(MemoryExporter::new());
    let provider = Arc::new(ScriptedProvider::new().respond("saved").respond("lost"));
    let mut agent = Agent::builder()
        .provider(provider.clone())
        .store(store.clone())
        .tracer(Tracer::new(exporter.clone()))
        .settings(options())
        .build()
        .unwrap();

    agent.send_message("first").await.unwrap();
    let committed = agent.conversation().clone();
    exporter.clear();

    store.failing.store(true, Ordering::SeqCst);
    let err = assert_err!(agent.send_message("second").await);
    assert!(matches!(err, AgentError::Persistence(_)));
    assert_eq!(provider.call_count(), 2);
    assert_eq!(agent.conversation(), &committed);
    assert_eq!(agent.state(), AgentState::Idle);
    assert_eq!(store.load(&committed.id).await.unwrap(), committed);

    let saves = exporter.spans_named("conversation.save");
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].status, SpanStatus::Error);
    assert_eq!(saves[0].attribute("error.kind"), Some(&json!("persistence")));
    let roots = exporter.spans_named("agent.send_message");
    assert_eq!(roots[0].status, SpanStatus::Error);
}
