//! Planner strategy: Plan, execute step by step, evaluate, replan.
//!
//! ```text
//! __start__ ─► build_plan ─► execute_step ─► evaluate ──(finish)──► __finish__
//!                  ▲               ▲            │  │
//!                  │               └─(continue)─┘  │
//!                  └──────────(replan)─────────────┘
//! ```
//!
//! The planner's state travels in the values passed between its nodes, so
//! every checkpoint carries it and a resumed run continues the same plan. A
//! copy is kept in the context's storage under [`PLANNER_STATE`] for
//! features to read. A step is executed by
//! asking the LLM to carry it out, running any tool calls it makes until it
//! answers in text. After each step the LLM decides whether to continue or
//! replan; replans are capped by [`PlannerConfig::max_replans`].

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use weft_core::message::Message;

use crate::context::{AgentContext, StorageKey};
use crate::error::AgentError;
use crate::strategy::{FINISH, START, Strategy};
use crate::value::NodeValue;

pub const BUILD_PLAN: &str = "build_plan";
pub const EXECUTE_STEP: &str = "execute_step";
pub const EVALUATE: &str = "evaluate";

/// Storage slot holding the planner's state during a run.
pub const PLANNER_STATE: StorageKey<PlannerState> = StorageKey::new("planner.state");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// How many times the plan may be rebuilt before evaluation stops asking.
    #[serde(default = "default_max_replans")]
    pub max_replans: usize,

    /// Tool-call rounds allowed while executing a single step.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

fn default_max_replans() -> usize {
    3
}
fn default_max_tool_rounds() -> usize {
    5
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_replans: default_max_replans(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn next_step(&self) -> Option<(usize, &PlanStep)> {
        self.steps.iter().enumerate().find(|(_, s)| s.result.is_none())
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.result.is_some())
    }

    fn completed(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(|s| s.result.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerState {
    pub plan: Plan,
    pub replans: usize,
    #[serde(default)]
    config: PlannerConfig,
}

impl PlannerState {
    /// Result of the most recently completed step.
    fn last_result(&self) -> Option<&str> {
        self.plan.completed().last().and_then(|s| s.result.as_deref())
    }
}

/// What `evaluate` decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PlanDecision {
    Continue,
    Replan { reason: String },
    Finish { answer: String },
}

/// The value passed between planner nodes: the state, plus the verdict once
/// `evaluate` has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlannerTurn {
    state: PlannerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verdict: Option<PlanDecision>,
}

impl PlannerTurn {
    fn from_value(node: &str, value: &NodeValue) -> Result<Self, AgentError> {
        match value {
            NodeValue::Json(v) => Ok(serde_json::from_value(v.clone())?),
            other => Err(AgentError::UnexpectedInput {
                node: node.into(),
                expected: "planner turn",
                found: other.kind(),
            }),
        }
    }

    /// Serialize for the next node and mirror the state into storage.
    fn into_value(self, ctx: &mut AgentContext) -> Result<NodeValue, AgentError> {
        let value = NodeValue::Json(serde_json::to_value(&self)?);
        ctx.store(PLANNER_STATE, self.state);
        Ok(value)
    }
}

fn verdict(value: &NodeValue) -> Option<PlanDecision> {
    match value {
        NodeValue::Json(v) => serde_json::from_value(v.get("verdict")?.clone()).ok(),
        _ => None,
    }
}

/// Build the planner strategy.
///
/// Input: the goal as text. Output: the final answer as text.
pub fn planner_strategy(config: PlannerConfig) -> Result<Strategy, AgentError> {
    Strategy::builder("planner")
        .node(BUILD_PLAN, move |ctx, input| {
            let config = config.clone();
            Box::pin(async move { build_plan(ctx, input, config).await })
        })
        .node(EXECUTE_STEP, execute_step)
        .node(EVALUATE, evaluate)
        .edge(START, BUILD_PLAN, |v| v.as_text().map(NodeValue::text))
        .edge(BUILD_PLAN, EXECUTE_STEP, |v| Some(v.clone()))
        .edge(EXECUTE_STEP, EVALUATE, |v| Some(v.clone()))
        .edge(EVALUATE, EXECUTE_STEP, |v| {
            matches!(verdict(v), Some(PlanDecision::Continue)).then(|| v.clone())
        })
        .edge(EVALUATE, BUILD_PLAN, |v| {
            matches!(verdict(v), Some(PlanDecision::Replan { .. })).then(|| v.clone())
        })
        .edge(EVALUATE, FINISH, |v| match verdict(v) {
            Some(PlanDecision::Finish { answer }) => Some(NodeValue::Text(answer)),
            _ => None,
        })
        .build()
}

async fn build_plan(ctx: &mut AgentContext, input: NodeValue, config: PlannerConfig) -> Result<NodeValue, AgentError> {
    // A goal on the first pass; evaluate's turn with the replan reason after.
    let (text, previous) = match input {
        NodeValue::Text(goal) => (goal, None),
        NodeValue::Json(value) => {
            let turn: PlannerTurn = serde_json::from_value(value)?;
            let reason = match turn.verdict {
                Some(PlanDecision::Replan { reason }) => reason,
                _ => String::new(),
            };
            (reason, Some(turn.state))
        }
        other => {
            return Err(AgentError::UnexpectedInput {
                node: BUILD_PLAN.into(),
                expected: "text or planner turn",
                found: other.kind(),
            });
        }
    };

    let prompt = match &previous {
        None => format!(
            "You are a planner. Break the following goal into a short ordered list of concrete steps.\n\n\
             Goal: {text}\n\n\
             Respond with JSON of the form {{\"steps\": [\"first step\", \"second step\"]}}."
        ),
        Some(state) => {
            let done: Vec<String> = state
                .plan
                .completed()
                .map(|s| format!("- {}: {}", s.description, s.result.as_deref().unwrap_or_default()))
                .collect();
            format!(
                "The current plan for the goal below needs revision.\n\n\
                 Goal: {goal}\n\nCompleted steps:\n{done}\n\nReason for replanning: {text}\n\n\
                 Respond with JSON of the form {{\"steps\": [...]}} listing only the remaining steps.",
                goal = state.plan.goal,
                done = if done.is_empty() { "- none".to_string() } else { done.join("\n") },
            )
        }
    };

    ctx.append(Message::user(prompt));
    let responses = ctx.request_llm().await?;
    let reply = NodeValue::Messages(responses).assistant_text().unwrap_or_default().to_string();
    let mut new_steps = parse_plan_steps(&reply);

    let state = match previous {
        None => {
            if new_steps.is_empty() {
                new_steps.push(text.clone());
            }
            PlannerState {
                plan: Plan {
                    goal: text,
                    steps: new_steps.into_iter().map(step).collect(),
                },
                replans: 0,
                config,
            }
        }
        Some(mut state) => {
            state.plan.steps.retain(|s| s.result.is_some());
            state.plan.steps.extend(new_steps.into_iter().map(step));
            state.replans += 1;
            info!(replans = state.replans, steps = state.plan.steps.len(), "Plan rebuilt");
            state
        }
    };

    debug!(goal = %state.plan.goal, steps = state.plan.steps.len(), "Plan ready");
    PlannerTurn { state, verdict: None }.into_value(ctx)
}

fn step(description: String) -> PlanStep {
    PlanStep {
        description,
        result: None,
    }
}

fn execute_step(ctx: &mut AgentContext, input: NodeValue) -> BoxFuture<'_, Result<NodeValue, AgentError>> {
    Box::pin(async move {
        let mut turn = PlannerTurn::from_value(EXECUTE_STEP, &input)?;
        turn.verdict = None;
        let Some((index, description)) = turn.state.plan.next_step().map(|(i, s)| (i, s.description.clone())) else {
            // Plan already complete; let evaluate finish it.
            return turn.into_value(ctx);
        };
        let total = turn.state.plan.steps.len();
        let max_rounds = turn.state.config.max_tool_rounds;

        debug!(step = index + 1, total, "Executing plan step");
        ctx.append(Message::user(format!(
            "Carry out step {} of {total}: {description}",
            index + 1
        )));

        let mut rounds = 0;
        let result = loop {
            let responses = NodeValue::Messages(ctx.request_llm().await?);
            let calls = responses.tool_calls();
            if calls.is_empty() {
                break responses.assistant_text().unwrap_or_default().to_string();
            }
            rounds += 1;
            if rounds > max_rounds {
                return Err(AgentError::IterationLimit {
                    strategy: format!("planner step {}", index + 1),
                    limit: max_rounds,
                });
            }
            let results = ctx.execute_tools(&calls).await;
            for result in &results {
                ctx.append(result.to_message());
            }
        };

        turn.state.plan.steps[index].result = Some(result);
        turn.into_value(ctx)
    })
}

fn evaluate(ctx: &mut AgentContext, input: NodeValue) -> BoxFuture<'_, Result<NodeValue, AgentError>> {
    Box::pin(async move {
        let mut turn = PlannerTurn::from_value(EVALUATE, &input)?;
        let state = &turn.state;

        if state.plan.is_complete() {
            let answer = state.last_result().unwrap_or_default().to_string();
            turn.verdict = Some(PlanDecision::Finish { answer });
            return turn.into_value(ctx);
        }
        if state.replans >= state.config.max_replans {
            debug!("Replan budget spent, continuing with current plan");
            turn.verdict = Some(PlanDecision::Continue);
            return turn.into_value(ctx);
        }

        let remaining: Vec<String> = state
            .plan
            .steps
            .iter()
            .filter(|s| s.result.is_none())
            .map(|s| format!("- {}", s.description))
            .collect();

        ctx.append(Message::user(format!(
            "Remaining steps:\n{}\n\nReply CONTINUE if the plan still fits, \
             or REPLAN: <reason> if it should change.",
            remaining.join("\n")
        )));
        let responses = NodeValue::Messages(ctx.request_llm().await?);
        let verdict = responses.assistant_text().unwrap_or_default().trim().to_string();

        let decision = match verdict.get(..6) {
            Some(prefix) if prefix.eq_ignore_ascii_case("replan") => {
                let reason = verdict[6..].trim_start_matches([':', ' ']).trim().to_string();
                warn!(reason = %reason, "Evaluation requested a new plan");
                PlanDecision::Replan { reason }
            }
            _ => PlanDecision::Continue,
        };
        turn.verdict = Some(decision);
        turn.into_value(ctx)
    })
}

/// Extract plan steps from an LLM reply.
///
/// Accepts `{"steps": [...]}`, a bare JSON array, or numbered / bulleted
/// lines. Returns an empty list if nothing step-like is found.
pub fn parse_plan_steps(reply: &str) -> Vec<String> {
    if let Some(steps) = parse_json_steps(reply) {
        return steps;
    }

    reply
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| {
                    let digits = line.find(|c: char| !c.is_ascii_digit())?;
                    if digits == 0 {
                        return None;
                    }
                    line[digits..]
                        .strip_prefix(". ")
                        .or_else(|| line[digits..].strip_prefix(") "))
                })?;
            let rest = rest.trim();
            (!rest.is_empty()).then(|| rest.to_string())
        })
        .collect()
}

fn parse_json_steps(reply: &str) -> Option<Vec<String>> {
    #[derive(Deserialize)]
    struct Steps {
        steps: Vec<serde_json::Value>,
    }

    let candidate = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => match (reply.find('['), reply.rfind(']')) {
            (Some(start), Some(end)) if start < end => &reply[start..=end],
            _ => return None,
        },
    };

    let raw = serde_json::from_str::<Steps>(candidate)
        .map(|s| s.steps)
        .or_else(|_| serde_json::from_str::<Vec<serde_json::Value>>(candidate))
        .ok()?;

    let steps: Vec<String> = raw
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Object(o) => o
                .get("description")
                .or_else(|| o.get("step"))
                .and_then(|d| d.as_str())
                .map(str::to_string),
            _ => None,
        })
        .filter(|s| !s.trim().is_empty())
        .collect();
    (!steps.is_empty()).then_some(steps)
}
