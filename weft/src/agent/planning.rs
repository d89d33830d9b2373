//! Planning sub-graph ("smart mode"): plan, execute one step at a time, replan.
//!
//! `planner → execute_step → replan → (execute_step | END)`. Replan either revises the
//! remaining plan or answers; the answer is an assistant message tagged `"Response"`.
//! An empty revised plan counts as completion and answers with the last step's result,
//! so the loop always terminates.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AgentError;
use crate::graph::{GraphState, Node, NodeOutput, RunContext, StateGraph, StateUpdate, END};
use crate::llm::{structured, LlmClient, OutputSchema};
use crate::message::Message;
use crate::prompts;
use crate::state::{ChatState, PastStep, PlanStep, LAST_NODE, MESSAGES, PAST_STEPS, PLAN, RESPONSE_STEP};

use super::worker::{Worker, WorkerTask};

pub const PLANNER: &str = "planner";
pub const EXECUTE_STEP: &str = "execute_step";
pub const REPLAN: &str = "replan";

/// Step tag of the planner's own message.
pub const PLAN_STEP: &str = "Plan";
pub const MAX_PLAN_STEPS: usize = 7;
pub const MAX_SUBSTEPS: usize = 4;

#[derive(Debug, Serialize, Deserialize)]
struct PlanOutput {
    steps: Vec<PlanStep>,
}

/// Replanner answer: a final response or a revised remaining plan, never both.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplanDecision {
    Response { response: String },
    Plan { plan: Vec<PlanStep> },
}

fn step_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "description": {"type": "string"},
            "substeps": {"type": "array", "items": {"type": "string"}, "maxItems": MAX_SUBSTEPS},
        },
        "required": ["description"],
    })
}

fn plan_schema() -> OutputSchema {
    OutputSchema::new(
        "plan",
        "Ordered plan of 1-7 steps.",
        json!({
            "type": "object",
            "properties": {
                "steps": {"type": "array", "items": step_schema(), "minItems": 1, "maxItems": MAX_PLAN_STEPS},
            },
            "required": ["steps"],
        }),
    )
}

fn replan_schema() -> OutputSchema {
    OutputSchema::new(
        "replan",
        "Either the final response to the user or the steps that still need to be done.",
        json!({
            "type": "object",
            "properties": {
                "response": {"type": "string"},
                "plan": {"type": "array", "items": step_schema()},
            },
        }),
    )
}

fn render_plan(steps: &[PlanStep]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Produces the initial plan from the latest user message.
pub struct PlannerNode {
    llm: Arc<dyn LlmClient>,
}

impl PlannerNode {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node for PlannerNode {
    fn id(&self) -> &str {
        PLANNER
    }

    async fn run(&self, state: &GraphState, _ctx: &RunContext) -> Result<NodeOutput, AgentError> {
        let chat = ChatState::from_state(state)?;
        let mut messages = vec![Message::system(prompts::PLANNER_SYSTEM)];
        messages.extend(chat.messages.iter().cloned());
        let out: PlanOutput = structured(self.llm.as_ref(), &messages, &plan_schema()).await?;
        if out.steps.is_empty() || out.steps.len() > MAX_PLAN_STEPS {
            return Err(AgentError::StructuredOutput(format!(
                "plan: expected 1-{} steps, got {}",
                MAX_PLAN_STEPS,
                out.steps.len()
            )));
        }
        tracing::info!(steps = out.steps.len(), "plan created");

        Ok(StateUpdate::new()
            .write(PLAN, &out.steps)?
            .write(MESSAGES, &[Message::assistant(render_plan(&out.steps)).with_step(PLAN_STEP)])?
            .set(LAST_NODE, json!(PLANNER))
            .into())
    }
}

/// Pops the first plan step and delegates it to a worker.
pub struct ExecuteStepNode {
    worker: Arc<dyn Worker>,
}

impl ExecuteStepNode {
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl Node for ExecuteStepNode {
    fn id(&self) -> &str {
        EXECUTE_STEP
    }

    async fn run(&self, state: &GraphState, ctx: &RunContext) -> Result<NodeOutput, AgentError> {
        let chat = ChatState::from_state(state)?;
        let mut remaining = chat.plan.clone();
        if remaining.is_empty() {
            return Err(AgentError::ExecutionFailed("execute_step with an empty plan".into()));
        }
        let step = remaining.remove(0);
        tracing::debug!(step = %step.description, remaining = remaining.len(), "executing plan step");

        let exchange = answered_question(ctx);
        let mut instruction = step.as_instruction();
        if let Some((question, reply)) = &exchange {
            instruction = format!(
                "{}\n\nYou asked the user: {}\nThe user replied: {}",
                instruction, question, reply
            );
        }
        let outcome = self
            .worker
            .run(WorkerTask::from_chat(&chat, instruction))
            .await?;
        if let Some(question) = outcome.question {
            tracing::info!(step = %step.description, %question, "plan step needs the user");
            return Ok(NodeOutput::Suspend(Value::String(question)));
        }

        let mut messages = Vec::new();
        if let Some((question, reply)) = exchange {
            if !question.is_empty() {
                messages.push(Message::assistant(question));
            }
            messages.push(Message::user(reply));
        }
        messages.push(Message::assistant(outcome.answer.clone()).with_step(step.description.clone()));
        let past = PastStep {
            step,
            result: outcome.answer,
        };

        Ok(StateUpdate::new()
            .write(PLAN, &remaining)?
            .write(PAST_STEPS, &[past])?
            .write(MESSAGES, &messages)?
            .set(LAST_NODE, json!(EXECUTE_STEP))
            .into())
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The question this task suspended with and the user's reply, when resuming.
fn answered_question(ctx: &RunContext) -> Option<(String, String)> {
    let reply = ctx.resume_value()?;
    let question = ctx.interrupt_value().map(as_text).unwrap_or_default();
    Some((question, as_text(reply)))
}

/// Revises the plan or answers.
pub struct ReplanNode {
    llm: Arc<dyn LlmClient>,
}

impl ReplanNode {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node for ReplanNode {
    fn id(&self) -> &str {
        REPLAN
    }

    async fn run(&self, state: &GraphState, _ctx: &RunContext) -> Result<NodeOutput, AgentError> {
        let chat = ChatState::from_state(state)?;
        let objective = chat.last_user_content().unwrap_or_default();
        let messages = [
            Message::system(prompts::replan_prompt(objective, &chat.plan, &chat.past_steps)),
            Message::user("Update the plan or give the final response."),
        ];
        let decision: ReplanDecision =
            structured(self.llm.as_ref(), &messages, &replan_schema()).await?;

        let response = match decision {
            ReplanDecision::Plan { plan } if !plan.is_empty() => {
                tracing::debug!(steps = plan.len(), "plan revised");
                return Ok(StateUpdate::new()
                    .write(PLAN, &plan)?
                    .set(LAST_NODE, json!(REPLAN))
                    .into());
            }
            ReplanDecision::Plan { .. } => {
                tracing::debug!("replan returned an empty plan; completing");
                chat.past_steps
                    .last()
                    .map(|p| p.result.clone())
                    .unwrap_or_default()
            }
            ReplanDecision::Response { response } => response,
        };
        tracing::info!(steps = chat.past_steps.len(), "plan complete");

        Ok(StateUpdate::new()
            .write(PLAN, &Vec::<PlanStep>::new())?
            .write(MESSAGES, &[Message::assistant(response).with_step(RESPONSE_STEP)])?
            .set(LAST_NODE, json!(REPLAN))
            .into())
    }
}

/// END when the latest message is the tagged response, else the next step.
pub fn route_after_replan(state: &GraphState) -> String {
    let done = ChatState::from_state(state)
        .map(|chat| {
            chat.last_message().and_then(Message::step) == Some(RESPONSE_STEP) || chat.plan.is_empty()
        })
        .unwrap_or(true);
    if done {
        END.to_string()
    } else {
        EXECUTE_STEP.to_string()
    }
}

/// Adds planner, execute_step and replan with their internal edges. The caller wires
/// the entry into `planner`.
pub fn add_planning_nodes(
    graph: &mut StateGraph,
    llm: Arc<dyn LlmClient>,
    worker: Arc<dyn Worker>,
) -> &mut StateGraph {
    graph
        .add_node(PLANNER, Arc::new(PlannerNode::new(llm.clone())))
        .add_node(EXECUTE_STEP, Arc::new(ExecuteStepNode::new(worker)))
        .add_node(REPLAN, Arc::new(ReplanNode::new(llm)))
        .add_edge(PLANNER, EXECUTE_STEP)
        .add_edge(EXECUTE_STEP, REPLAN)
        .add_conditional_edges(
            REPLAN,
            Arc::new(route_after_replan),
            Some(crate::graph::path_map([(EXECUTE_STEP, EXECUTE_STEP), (END, END)])),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::worker::WorkerOutcome;
    use std::collections::BTreeMap;

    fn state(values: serde_json::Value) -> GraphState {
        let map: BTreeMap<String, serde_json::Value> = serde_json::from_value(values).unwrap();
        GraphState::from_values(map)
    }

    /// Asks which directory until the instruction carries the user's reply.
    struct AskingWorker;

    #[async_trait]
    impl Worker for AskingWorker {
        fn name(&self) -> &str {
            "asking"
        }

        async fn run(&self, task: WorkerTask) -> Result<WorkerOutcome, AgentError> {
            if task.instruction.contains("The user replied: /tmp") {
                return Ok(WorkerOutcome {
                    answer: "cleaned /tmp".into(),
                    ..WorkerOutcome::default()
                });
            }
            Ok(WorkerOutcome {
                question: Some("Which directory?".into()),
                ..WorkerOutcome::default()
            })
        }
    }

    /// **Scenario**: a worker question suspends the step without consuming it; resuming
    /// reruns the step with the exchange and records question, reply and result.
    #[tokio::test]
    async fn step_question_suspends_then_resumes() {
        let node = ExecuteStepNode::new(Arc::new(AskingWorker));
        let s = state(json!({MESSAGES: [Message::user("clean up")], PLAN: [{"description": "clean"}]}));

        match node.run(&s, &RunContext::default()).await.unwrap() {
            NodeOutput::Suspend(question) => assert_eq!(question, json!("Which directory?")),
            NodeOutput::Continue(_) => panic!("step should suspend"),
        }

        let ctx = RunContext::default()
            .with_resume(json!("/tmp"))
            .with_interrupt(json!("Which directory?"));
        let NodeOutput::Continue(update) = node.run(&s, &ctx).await.unwrap() else {
            panic!("resumed step should complete");
        };
        let written = |channel: &str| {
            update
                .writes()
                .iter()
                .find(|(c, _)| c == channel)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        let messages: Vec<Message> = serde_json::from_value(written(MESSAGES)).unwrap();
        let contents: Vec<&str> = messages.iter().map(Message::content).collect();
        assert_eq!(contents, vec!["Which directory?", "/tmp", "cleaned /tmp"]);
        assert_eq!(messages[2].step(), Some("clean"));
        assert_eq!(written(PLAN), json!([]));
    }

    /// **Scenario**: the replan union accepts either shape; response wins when both appear.
    #[test]
    fn replan_decision_shapes() {
        let d: ReplanDecision = serde_json::from_value(json!({"response": "Done"})).unwrap();
        assert_eq!(d, ReplanDecision::Response { response: "Done".into() });
        let d: ReplanDecision =
            serde_json::from_value(json!({"plan": [{"description": "b"}]})).unwrap();
        assert_eq!(d, ReplanDecision::Plan { plan: vec![PlanStep::new("b")] });
        assert!(serde_json::from_value::<ReplanDecision>(json!({"other": 1})).is_err());
    }

    /// **Scenario**: routing ends on a Response-tagged message or an empty plan.
    #[test]
    fn route_after_replan_terminates() {
        let response = Message::assistant("Done").with_step(RESPONSE_STEP);
        let s = state(json!({MESSAGES: [response], PLAN: [{"description": "x"}]}));
        assert_eq!(route_after_replan(&s), END);

        let step_msg = Message::assistant("found").with_step("find X");
        let s = state(json!({MESSAGES: [step_msg], PLAN: [{"description": "x"}]}));
        assert_eq!(route_after_replan(&s), EXECUTE_STEP);

        let s = state(json!({MESSAGES: [], PLAN: []}));
        assert_eq!(route_after_replan(&s), END);
    }
}
