//! The reflect chain controller.
//!
//! Drives the dispatcher through draft → critique → final, strictly
//! sequentially: each step's dispatch must fully materialize before the
//! next one is assembled, so the critique always sees the complete draft.
//!
//! The step hints are ephemeral: they are appended to the per-step dispatch
//! input only and never persisted into caller-visible history. On any
//! dispatch failure the chain terminates in `Failed` — no fallback to an
//! earlier step's output — with the partial record log preserved.

use crate::run::{ChainFailure, ChainRun, ChainState};
use preflight_core::message::Message;
use preflight_core::provider::ReasoningOverride;
use preflight_providers::ProviderDispatcher;
use std::sync::Arc;
use tracing::{info, warn};

const CRITIQUE_HINT: &str = "Critique the draft answer above for accuracy, safety, and \
completeness. Name concrete problems; do not rewrite the answer yet.";

const FINAL_HINT: &str = "Produce the final answer, addressing the critique above. \
Reply with the answer only.";

/// A chain that reached `Done`.
#[derive(Debug)]
pub struct ChainOutcome {
    /// The final step's output — the canonical result. Draft and critique
    /// outputs stay discoverable in `run`.
    pub answer: String,
    pub run: ChainRun,
}

/// Orchestrates the draft → critique → final pass over the dispatcher.
pub struct ReflectChainController {
    dispatcher: Arc<ProviderDispatcher>,
}

impl ReflectChainController {
    pub fn new(dispatcher: Arc<ProviderDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Run the full chain against `conversation` (persona directive and
    /// history included, flattened). The caller's history is not touched.
    pub async fn run(
        &self,
        model: &str,
        conversation: &[Message],
        reasoning: Option<&ReasoningOverride>,
    ) -> Result<ChainOutcome, Box<ChainFailure>> {
        let mut run = ChainRun::new();
        info!(chain_id = %run.id, model = %model, "Reflect chain starting");

        // ── Draft ──────────────────────────────────────────────────────
        let draft_input = conversation.to_vec();
        let draft = self
            .step(ChainState::Draft, ChainState::Critique, model, draft_input, &mut run, reasoning)
            .await?;

        // ── Critique: conversation + draft + ephemeral hint ────────────
        let mut critique_input = conversation.to_vec();
        critique_input.push(Message::assistant(&draft));
        critique_input.push(Message::system(CRITIQUE_HINT));
        let critique = self
            .step(
                ChainState::Critique,
                ChainState::Final,
                model,
                critique_input,
                &mut run,
                reasoning,
            )
            .await?;

        // ── Final: conversation + draft + critique + ephemeral hint ────
        let mut final_input = conversation.to_vec();
        final_input.push(Message::assistant(&draft));
        final_input.push(Message::assistant(&critique));
        final_input.push(Message::system(FINAL_HINT));
        let answer = self
            .step(
                ChainState::Final,
                ChainState::Done,
                model,
                final_input,
                &mut run,
                reasoning,
            )
            .await?;

        info!(chain_id = %run.id, steps = run.records().len(), "Reflect chain done");
        Ok(ChainOutcome { answer, run })
    }

    async fn step(
        &self,
        state: ChainState,
        next: ChainState,
        model: &str,
        input: Vec<Message>,
        run: &mut ChainRun,
        reasoning: Option<&ReasoningOverride>,
    ) -> Result<String, Box<ChainFailure>> {
        match self.dispatcher.complete(model, input.clone(), reasoning).await {
            Ok(response) => {
                let output = response.message.content;
                run.record(state, input, output.clone(), next);
                Ok(output)
            }
            Err(source) => {
                run.fail();
                warn!(
                    chain_id = %run.id,
                    step = ?state,
                    error = %source,
                    "Reflect chain step failed, terminating run"
                );
                Err(Box::new(ChainFailure {
                    step: state,
                    source,
                    run: std::mem::take(run),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preflight_config::ModelEntry;
    use preflight_core::error::ProviderError;
    use preflight_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
    use preflight_providers::{ModelCapabilityRegistry, ProviderRouter};
    use std::sync::Mutex;

    /// A mock provider that returns a scripted sequence of responses and
    /// remembers every request it received.
    struct SequentialMockProvider {
        responses: Mutex<Vec<Result<String, ProviderError>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl SequentialMockProvider {
        fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Provider for SequentialMockProvider {
        fn name(&self) -> &str {
            "sequential_mock"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                panic!("SequentialMockProvider: no more scripted responses");
            }
            responses.remove(0).map(|text| ProviderResponse {
                message: Message::assistant(text),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: "mock-model".into(),
            })
        }
    }

    fn controller_with(
        responses: Vec<Result<String, ProviderError>>,
    ) -> (ReflectChainController, Arc<SequentialMockProvider>) {
        let provider = Arc::new(SequentialMockProvider::new(responses));
        let mut router = ProviderRouter::new("mock");
        router.register("mock", provider.clone());
        let registry = Arc::new(ModelCapabilityRegistry::load(
            &[ModelEntry {
                id: Some("mock-model".into()),
                provider: Some("mock".into()),
                family: None,
                model_type: None,
                reasoning: Some(false),
                parallel: Some(true),
            }],
            "medium",
            "mock",
        ));
        let dispatcher = Arc::new(ProviderDispatcher::new(router, registry));
        (ReflectChainController::new(dispatcher), provider)
    }

    #[tokio::test]
    async fn steps_run_in_fixed_order() {
        let (controller, provider) = controller_with(vec![
            Ok("the draft".into()),
            Ok("the critique".into()),
            Ok("the final answer".into()),
        ]);

        let conversation = vec![Message::system("directive"), Message::user("question")];
        let outcome = controller
            .run("mock-model", &conversation, None)
            .await
            .unwrap();

        assert_eq!(outcome.answer, "the final answer");
        assert_eq!(outcome.run.state(), ChainState::Done);

        let steps: Vec<ChainState> = outcome.run.records().iter().map(|r| r.step).collect();
        assert_eq!(
            steps,
            vec![ChainState::Draft, ChainState::Critique, ChainState::Final]
        );

        // Exactly three dispatches, strictly sequential.
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn critique_sees_complete_draft_verbatim() {
        let (controller, provider) = controller_with(vec![
            Ok("the full draft text".into()),
            Ok("critique".into()),
            Ok("final".into()),
        ]);

        let conversation = vec![Message::user("question")];
        controller
            .run("mock-model", &conversation, None)
            .await
            .unwrap();

        let requests = provider.requests();
        let critique_input = &requests[1].messages;
        assert!(
            critique_input
                .iter()
                .any(|m| m.content == "the full draft text"),
            "critique input must contain the draft output verbatim"
        );
        // The ephemeral hint is present in the step input...
        assert!(
            critique_input
                .iter()
                .any(|m| m.content.contains("Critique the draft"))
        );
    }

    #[tokio::test]
    async fn hints_never_reach_caller_history() {
        let (controller, _provider) = controller_with(vec![
            Ok("draft".into()),
            Ok("critique".into()),
            Ok("final".into()),
        ]);

        let conversation = vec![Message::user("question")];
        let outcome = controller
            .run("mock-model", &conversation, None)
            .await
            .unwrap();

        // Caller's slice untouched; the canonical result is the final
        // output alone.
        assert_eq!(conversation.len(), 1);
        assert_eq!(outcome.answer, "final");
    }

    #[tokio::test]
    async fn critique_failure_preserves_draft_and_skips_final() {
        // Scenario E: the critique dispatch fails.
        let (controller, provider) = controller_with(vec![
            Ok("the draft".into()),
            Err(ProviderError::Timeout("upstream timeout".into())),
        ]);

        let conversation = vec![Message::user("question")];
        let failure = controller
            .run("mock-model", &conversation, None)
            .await
            .unwrap_err();

        assert_eq!(failure.step, ChainState::Critique);
        assert_eq!(failure.run.state(), ChainState::Failed);
        assert_eq!(failure.run.output_of(ChainState::Draft), Some("the draft"));
        assert!(failure.run.output_of(ChainState::Final).is_none());
        // No third dispatch was attempted.
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn draft_failure_fails_immediately() {
        let (controller, provider) =
            controller_with(vec![Err(ProviderError::Network("unreachable".into()))]);

        let failure = controller
            .run("mock-model", &[Message::user("q")], None)
            .await
            .unwrap_err();

        assert_eq!(failure.step, ChainState::Draft);
        assert!(failure.run.records().is_empty());
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_is_failed_never_done() {
        let (controller, _provider) = controller_with(vec![
            Ok("draft".into()),
            Ok("critique".into()),
            Err(ProviderError::Cancelled("client disconnected".into())),
        ]);

        let failure = controller
            .run("mock-model", &[Message::user("q")], None)
            .await
            .unwrap_err();

        assert!(failure.is_cancelled());
        assert_eq!(failure.run.state(), ChainState::Failed);
    }

    #[tokio::test]
    async fn final_input_contains_draft_and_critique() {
        let (controller, provider) = controller_with(vec![
            Ok("draft body".into()),
            Ok("critique body".into()),
            Ok("final".into()),
        ]);

        controller
            .run("mock-model", &[Message::user("q")], None)
            .await
            .unwrap();

        let requests = provider.requests();
        let final_input = &requests[2].messages;
        assert!(final_input.iter().any(|m| m.content == "draft body"));
        assert!(final_input.iter().any(|m| m.content == "critique body"));
        assert!(
            final_input
                .iter()
                .any(|m| m.content.contains("Produce the final answer"))
        );
    }
}
