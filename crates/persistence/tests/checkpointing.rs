//! End-to-end checkpointing through the agent runner.

use std::sync::{Arc, Mutex};
use weft_agent::patterns::planner::{EVALUATE, PlannerConfig, planner_strategy};
use weft_agent::patterns::test_helpers::{EchoTool, ScriptedExecutor, make_tool_call, test_model};
use weft_agent::pipeline::{AfterNode, BeforeNode};
use weft_agent::strategy::nodes::always;
use weft_agent::strategy::single_run::SEND_TOOL_RESULTS;
use weft_agent::{Agent, AgentError, FINISH, NodeValue, START, Strategy, StrategyBuilder};
use weft_core::checkpoint::{AgentCheckpointData, CheckpointStorage, TOMBSTONE_NODE_ID};
use weft_core::message::{Message, Role};
use weft_persistence::{FileStorage, InMemoryStorage, NoopStorage, Persistency};

fn tagged(builder: StrategyBuilder, name: &str, tag: &'static str) -> StrategyBuilder {
    builder.node(name, move |_ctx, input| {
        Box::pin(async move {
            let text = input.as_text().unwrap_or_default();
            Ok(NodeValue::text(format!("{text}{tag}")))
        })
    })
}

fn linear() -> Strategy {
    let builder = tagged(Strategy::builder("linear"), "A", "a");
    let builder = tagged(builder, "B", "b");
    tagged(builder, "C", "c")
        .edge(START, "A", always)
        .edge("A", "B", always)
        .edge("B", "C", always)
        .edge("C", FINISH, always)
        .build()
        .unwrap()
}

fn sorted(mut checkpoints: Vec<AgentCheckpointData>) -> Vec<AgentCheckpointData> {
    checkpoints.sort_by_key(|c| c.created_at);
    checkpoints
}

#[tokio::test]
async fn linear_run_checkpoints_every_step_in_order() {
    let memory = Arc::new(InMemoryStorage::new());
    let storage: Arc<dyn CheckpointStorage> = memory.clone();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut builder = Agent::builder(Arc::new(ScriptedExecutor::new(vec![])), test_model())
        .id("linear-agent")
        .strategy(linear())
        .install::<Persistency>(|c| {
            c.storage = storage;
            c.enable_automatic_persistence = true;
        })
        .unwrap();
    let l = log.clone();
    builder.pipeline_mut().intercept::<BeforeNode, _>(move |_ctx, e| {
        let l = l.clone();
        Box::pin(async move {
            l.lock().unwrap().push(format!("before:{}", e.node));
            Ok(())
        })
    });
    let l = log.clone();
    builder.pipeline_mut().intercept::<AfterNode, _>(move |_ctx, e| {
        let l = l.clone();
        Box::pin(async move {
            l.lock().unwrap().push(format!("after:{}->{}", e.node, e.next.node_id));
            Ok(())
        })
    });
    let agent = builder.build().unwrap();

    let result = agent.run("").await.unwrap();
    assert_eq!(result, NodeValue::text("abc"));

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "before:__start__",
            "after:__start__->A",
            "before:A",
            "after:A->B",
            "before:B",
            "after:B->C",
            "before:C",
            "after:C->__finish__",
        ]
    );

    let checkpoints = memory.get_checkpoints("linear-agent").await.unwrap();
    let ordered = sorted(checkpoints.clone());
    // Insertion order and timestamp order agree, and timestamps never tie.
    assert_eq!(checkpoints, ordered);
    assert!(ordered.windows(2).all(|w| w[0].created_at < w[1].created_at));

    let nodes: Vec<&str> = ordered.iter().map(|c| c.node_id.as_str()).collect();
    assert_eq!(nodes, vec!["A", "B", "C", FINISH, TOMBSTONE_NODE_ID]);
    assert_eq!(ordered[2].last_input, serde_json::json!({"type": "text", "value": "ab"}));
}

#[tokio::test]
async fn failed_run_resumes_from_last_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let storage: Arc<dyn CheckpointStorage> = Arc::new(FileStorage::new(tmp.path()));

    // First run: the tool call goes through, then the LLM gives out.
    let first = Agent::builder(
        Arc::new(ScriptedExecutor::new(vec![vec![make_tool_call(
            "echo",
            serde_json::json!({"text": "ping"}),
        )]])),
        test_model(),
    )
    .id("resumable")
    .tool(EchoTool)
    .unwrap()
    .install::<Persistency>(|c| {
        c.storage = storage.clone();
        c.enable_automatic_persistence = true;
    })
    .unwrap()
    .build()
    .unwrap();

    let err = first.run("Use the tool").await.unwrap_err();
    assert!(matches!(err, AgentError::Llm(_)));

    let latest = storage.get_latest_checkpoint("resumable").await.unwrap().unwrap();
    assert_eq!(latest.node_id, SEND_TOOL_RESULTS);
    assert_eq!(latest.last_input["type"], "tool_results");

    // Second run: a fresh agent over the same storage picks up at send_tool_results.
    let executor = Arc::new(ScriptedExecutor::new(vec![vec![Message::assistant("pong received")]]));
    let second = Agent::builder(executor.clone(), test_model())
        .id("resumable")
        .tool(EchoTool)
        .unwrap()
        .install::<Persistency>(|c| {
            c.storage = storage.clone();
            c.enable_automatic_persistence = true;
        })
        .unwrap()
        .build()
        .unwrap();

    let result = second.run("ignored on resume").await.unwrap();
    assert_eq!(result, NodeValue::text("pong received"));

    let prompt = &executor.prompts()[0];
    let roles: Vec<Role> = prompt.messages.iter().map(Message::role).collect();
    assert_eq!(roles, vec![Role::User, Role::ToolCall, Role::ToolResult]);
    assert_eq!(prompt.messages[0].content(), "Use the tool");
    assert_eq!(prompt.messages[2].content(), "ping");

    let latest = storage.get_latest_checkpoint("resumable").await.unwrap().unwrap();
    assert!(latest.is_tombstone());

    // Third run: the tombstone means a clean start.
    let executor = Arc::new(ScriptedExecutor::single_text("fresh"));
    let third = Agent::builder(executor.clone(), test_model())
        .id("resumable")
        .install::<Persistency>(|c| c.storage = storage.clone())
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(third.run("hello again").await.unwrap(), NodeValue::text("fresh"));
    assert_eq!(executor.prompts()[0].messages.len(), 1);
}

#[tokio::test]
async fn checkpoint_round_trip_through_feature() {
    let tmp = tempfile::tempdir().unwrap();
    let storage: Arc<dyn CheckpointStorage> = Arc::new(FileStorage::new(tmp.path()));
    let agent = Agent::builder(Arc::new(ScriptedExecutor::new(vec![])), test_model())
        .id("round-trip")
        .install::<Persistency>(|c| c.storage = storage.clone())
        .unwrap()
        .build()
        .unwrap();
    let persistency = agent.feature::<Persistency>().unwrap();

    let mut ctx = agent.new_context();
    ctx.append(Message::user("question"));
    ctx.append(Message::assistant("answer"));
    let input = NodeValue::ToolCalls(vec![weft_core::tool::ToolCall::new(
        Some("c1".into()),
        "echo",
        serde_json::json!({"text": "x"}),
    )]);

    let saved = persistency
        .create_checkpoint(&ctx, "execute_tools", &input, Some("fixed-id".into()))
        .await
        .unwrap()
        .unwrap();
    assert!(tmp.path().join("round-trip").join("fixed-id.json").exists());

    let loaded = persistency
        .get_checkpoint_by_id("round-trip", "fixed-id")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, saved);

    let mut restored = agent.new_context();
    persistency.rollback_to_checkpoint("fixed-id", &mut restored).await.unwrap().unwrap();
    assert_eq!(restored.history(), ctx.history());
    assert_eq!(restored.last_input(), Some(&input));
}

#[tokio::test]
async fn latest_wins_across_feature_instances() {
    let storage: Arc<dyn CheckpointStorage> = Arc::new(InMemoryStorage::new());
    let build = || {
        Agent::builder(Arc::new(ScriptedExecutor::new(vec![])), test_model())
            .id("shared")
            .install::<Persistency>(|c| c.storage = storage.clone())
            .unwrap()
            .build()
            .unwrap()
    };
    let a = build();
    let b = build();
    let ctx = a.new_context();

    a.feature::<Persistency>()
        .unwrap()
        .create_checkpoint(&ctx, "first", &NodeValue::Unit, None)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    b.feature::<Persistency>()
        .unwrap()
        .create_checkpoint(&ctx, "second", &NodeValue::Unit, None)
        .await
        .unwrap();

    let latest = storage.get_latest_checkpoint("shared").await.unwrap().unwrap();
    assert_eq!(latest.node_id, "second");
}

#[tokio::test]
async fn opaque_outputs_skip_checkpoints_but_not_the_run() {
    let memory = Arc::new(InMemoryStorage::new());
    let storage: Arc<dyn CheckpointStorage> = memory.clone();
    let strategy = Strategy::builder("opaque")
        .node("make", |_ctx, _input| Box::pin(async move { Ok(NodeValue::opaque(vec![1u8, 2, 3])) }))
        .node("read", |_ctx, input| {
            Box::pin(async move {
                let len = input.downcast_opaque::<Vec<u8>>().map_or(0, Vec::len);
                Ok(NodeValue::text(len.to_string()))
            })
        })
        .edge(START, "make", always)
        .edge("make", "read", always)
        .edge("read", FINISH, always)
        .build()
        .unwrap();

    let agent = Agent::builder(Arc::new(ScriptedExecutor::new(vec![])), test_model())
        .id("opaque-agent")
        .strategy(strategy)
        .install::<Persistency>(|c| {
            c.storage = storage;
            c.enable_automatic_persistence = true;
        })
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(agent.run(NodeValue::Unit).await.unwrap(), NodeValue::text("3"));

    // make -> read carried an opaque value; that checkpoint is the one missing.
    let nodes: Vec<String> = sorted(memory.get_checkpoints("opaque-agent").await.unwrap())
        .into_iter()
        .map(|c| c.node_id)
        .collect();
    assert_eq!(nodes, vec!["make".to_string(), FINISH.to_string(), TOMBSTONE_NODE_ID.to_string()]);
}

#[tokio::test]
async fn noop_storage_disables_resume() {
    let agent = Agent::builder(
        Arc::new(ScriptedExecutor::new(vec![vec![Message::assistant("one")], vec![Message::assistant("two")]])),
        test_model(),
    )
    .id("forgetful")
    .install::<Persistency>(|c| {
        c.storage = Arc::new(NoopStorage);
        c.enable_automatic_persistence = true;
    })
    .unwrap()
    .build()
    .unwrap();

    assert_eq!(agent.run("a").await.unwrap(), NodeValue::text("one"));
    assert_eq!(agent.run("b").await.unwrap(), NodeValue::text("two"));
    let persistency = agent.feature::<Persistency>().unwrap();
    assert!(persistency.get_latest_checkpoint("forgetful").await.unwrap().is_none());
}

fn planner_agent(executor: Arc<ScriptedExecutor>, storage: &Arc<dyn CheckpointStorage>) -> Agent {
    Agent::builder(executor, test_model())
        .id("planner-agent")
        .strategy(planner_strategy(PlannerConfig::default()).unwrap())
        .install::<Persistency>(|c| {
            c.storage = storage.clone();
            c.enable_automatic_persistence = true;
        })
        .unwrap()
        .build()
        .unwrap()
}

fn replies(texts: &[&str]) -> Vec<Vec<Message>> {
    texts.iter().map(|t| vec![Message::assistant(*t)]).collect()
}

#[tokio::test]
async fn planner_run_resumes_mid_plan() {
    let storage: Arc<dyn CheckpointStorage> = Arc::new(InMemoryStorage::new());

    // First run: plan and first step succeed, evaluation has no reply.
    let first = planner_agent(Arc::new(ScriptedExecutor::new(replies(&["1. a\n2. b", "a done"]))), &storage);
    assert!(matches!(first.run("do a then b").await.unwrap_err(), AgentError::Llm(_)));
    let latest = storage.get_latest_checkpoint("planner-agent").await.unwrap().unwrap();
    assert_eq!(latest.node_id, EVALUATE);

    // Second run: evaluation picks up the stored plan, runs step b, and finishes.
    let executor = Arc::new(ScriptedExecutor::new(replies(&["CONTINUE", "b done"])));
    let second = planner_agent(executor.clone(), &storage);
    assert_eq!(second.run("ignored on resume").await.unwrap(), NodeValue::text("b done"));
    assert_eq!(executor.call_count(), 2);
    let prompt = &executor.prompts()[0];
    assert!(prompt.messages.iter().any(|m| m.content() == "a done"));
    assert!(storage.get_latest_checkpoint("planner-agent").await.unwrap().unwrap().is_tombstone());

    // Third run: a new goal gets a new plan.
    let third = planner_agent(Arc::new(ScriptedExecutor::new(replies(&["1. c", "c done"]))), &storage);
    assert_eq!(third.run("do c").await.unwrap(), NodeValue::text("c done"));
}

#[tokio::test]
async fn undecodable_checkpoint_does_not_block_runs() {
    let storage: Arc<dyn CheckpointStorage> = Arc::new(InMemoryStorage::new());
    let bad = AgentCheckpointData::new("stale", "send_tool_results", serde_json::json!({"type": "opaque"}), vec![
        Message::user("from an older build"),
    ]);
    storage.save_checkpoint(&bad).await.unwrap();

    let executor = Arc::new(ScriptedExecutor::new(replies(&["first", "second"])));
    let agent = Agent::builder(executor.clone(), test_model())
        .id("stale")
        .install::<Persistency>(|c| c.storage = storage.clone())
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(agent.run("hello").await.unwrap(), NodeValue::text("first"));
    assert_eq!(agent.run("again").await.unwrap(), NodeValue::text("second"));
    for prompt in executor.prompts() {
        assert_eq!(prompt.messages.len(), 1);
    }
}
