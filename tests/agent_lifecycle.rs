//! Agent-level lifecycle: graph loading, hot swap, session eviction.

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use xdialogue::{Agent, ManualClock, TurnRequest};

fn simple_say_graph(content: &str) -> xdialogue::GraphConfig {
    graph(json!({
        "graph_id": "g_hello",
        "name": "问好",
        "nodes": [
            {
                "node_id": "n_start",
                "node_type": "start",
                "condition_group": [[{"type": "intent", "operator": "==", "value": "greeting"}]]
            },
            {"node_id": "n_say", "node_type": "say", "content": [content]}
        ],
        "connections": [
            {"line_id": "l1", "source_id": "n_start", "target_id": "n_say"}
        ]
    }))
}

fn greeting_interpreter() -> FakeInterpreter {
    FakeInterpreter::new().intent("你好", "greeting", 0.9)
}

#[tokio::test]
async fn bad_graph_is_skipped_but_the_rest_keep_serving() {
    let agent = Agent::new(
        "robot-1",
        basic_collaborators(greeting_interpreter()),
        Duration::from_secs(600),
    );

    let bad = graph(json!({
        "graph_id": "g_bad",
        "nodes": [
            {"node_id": "n_start", "node_type": "start", "condition_group": []},
            // Missing required content/branches.
            {"node_id": "n_say", "node_type": "say"}
        ],
        "connections": []
    }));
    let report = agent.load_graphs(&[bad, simple_say_graph("您好！")]);
    assert_eq!(report.loaded, vec!["g_hello"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "g_bad");
    assert_eq!(agent.graph_count(), 1);

    let pack = agent
        .handle_message(TurnRequest::new("s1", "你好"))
        .await
        .unwrap();
    assert_eq!(pack.says, "您好！");
}

#[tokio::test]
async fn idle_sessions_are_swept_on_the_next_turn() {
    let clock = Arc::new(ManualClock::new());
    let agent = Agent::new(
        "robot-1",
        basic_collaborators(greeting_interpreter()),
        Duration::from_secs(60),
    )
    .with_clock(clock.clone());
    agent.load_graphs(&[simple_say_graph("您好！")]);

    agent
        .handle_message(TurnRequest::new("idle", "你好"))
        .await
        .unwrap();
    assert_eq!(agent.session_count(), 1);

    clock.advance(Duration::from_secs(120));

    // Any inbound turn sweeps the whole map.
    agent
        .handle_message(TurnRequest::new("fresh", "你好"))
        .await
        .unwrap();
    assert_eq!(agent.session_count(), 1);

    // The evicted id comes back as a brand-new session: its first turn only
    // establishes the session, so no intent summary is reported.
    let pack = agent
        .handle_message(TurnRequest::new("idle", "你好"))
        .await
        .unwrap();
    assert!(pack.intent.is_none());
    assert_eq!(agent.session_count(), 2);
}

#[tokio::test]
async fn active_sessions_survive_the_sweep() {
    let clock = Arc::new(ManualClock::new());
    let agent = Agent::new(
        "robot-1",
        basic_collaborators(greeting_interpreter()),
        Duration::from_secs(60),
    )
    .with_clock(clock.clone());
    agent.load_graphs(&[simple_say_graph("您好！")]);

    agent
        .handle_message(TurnRequest::new("s1", "你好"))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(30));
    agent
        .handle_message(TurnRequest::new("s2", "你好"))
        .await
        .unwrap();
    assert_eq!(agent.session_count(), 2);

    // s1 is 50s idle, s2 20s: neither crosses the 60s TTL.
    clock.advance(Duration::from_secs(20));
    agent.evict_expired();
    assert_eq!(agent.session_count(), 2);
}

#[tokio::test]
async fn hot_swap_replaces_a_graph_and_optionally_clears_sessions() {
    let agent = Agent::new(
        "robot-1",
        basic_collaborators(greeting_interpreter()),
        Duration::from_secs(600),
    );
    agent.load_graphs(&[simple_say_graph("您好！")]);

    let pack = agent
        .handle_message(TurnRequest::new("s1", "你好"))
        .await
        .unwrap();
    assert_eq!(pack.says, "您好！");
    assert_eq!(agent.session_count(), 1);

    agent
        .update_graph(&simple_say_graph("欢迎回来！"), true)
        .unwrap();
    assert_eq!(agent.graph_count(), 1);
    assert_eq!(agent.session_count(), 0);

    let pack = agent
        .handle_message(TurnRequest::new("s1", "你好"))
        .await
        .unwrap();
    assert_eq!(pack.says, "欢迎回来！");
}

#[tokio::test]
async fn update_graph_rejects_a_bad_config() {
    let agent = Agent::new(
        "robot-1",
        basic_collaborators(greeting_interpreter()),
        Duration::from_secs(600),
    );
    agent.load_graphs(&[simple_say_graph("您好！")]);

    let bad = graph(json!({
        "graph_id": "g_hello",
        "nodes": [
            {"node_id": "n_start", "node_type": "start", "condition_group": []}
        ],
        "connections": [
            {"line_id": "l1", "source_id": "n_start", "target_id": "n_missing"}
        ]
    }));
    assert!(agent.update_graph(&bad, false).is_err());

    // The old version keeps serving.
    let pack = agent
        .handle_message(TurnRequest::new("s1", "你好"))
        .await
        .unwrap();
    assert_eq!(pack.says, "您好！");
}

#[tokio::test]
async fn remove_graph_stops_triggering() {
    let agent = Agent::new(
        "robot-1",
        basic_collaborators(greeting_interpreter()),
        Duration::from_secs(600),
    );
    agent.load_graphs(&[simple_say_graph("您好！")]);
    assert!(agent.remove_graph("g_hello"));
    assert_eq!(agent.graph_count(), 0);

    // Nothing triggers any more: the turn falls through to chit-chat.
    let pack = agent
        .handle_message(TurnRequest::new("s1", "你好"))
        .await
        .unwrap();
    assert_eq!(pack.reply_type, "1");
}
