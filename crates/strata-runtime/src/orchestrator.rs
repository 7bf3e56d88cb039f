//! The turn orchestrator.
//!
//! Sequences one user message end to end: admission (rate and quota
//! checks), activation, session load, context assembly, the ReAct
//! loop, and finalization (accounting, persistence, best-effort
//! knowledge-graph enrichment). Admission and activation failures
//! happen before any event streams; the caller maps them to HTTP
//! statuses. Everything after runs in a background task while the
//! caller drains the event channel.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use strata_config::TurnSection;
use strata_consumption::{ConsumptionStore, TurnRecord, TurnStatus};
use strata_context::{Assembler, AssemblyContext, ModuleOverrides, ToolContextInfo};
use strata_core::{OwnerId, ProfileId, RetryConfig, SessionId, TokenEstimator};
use strata_events::{EventReceiver, EventSink, turn_channel};
use strata_kg::{BulkRelationship, KgStore, NewEntity};
use strata_llm::{ContentPart, Message};
use strata_session::{ChatMessage, Session, SessionStore, TurnTrace};

use crate::activation::{ActiveContext, ContextSwitcher};
use crate::error::{RuntimeError, RuntimeResult};
use crate::executor::{ConversationExecutor, ExecutorInputs, ExecutorOutcome};

/// Characters of the query kept in the consumption audit row.
const QUERY_PREVIEW_CHARS: usize = 100;

/// One incoming user message.
#[derive(Debug)]
pub struct TurnRequest {
    /// Owning user.
    pub owner_id: OwnerId,
    /// Session to continue; `None` opens a new session.
    pub session_id: Option<SessionId>,
    /// Profile to run under.
    pub profile_id: ProfileId,
    /// The message text.
    pub message: String,
    /// Attachment references.
    pub attachments: Vec<String>,
    /// Multimodal parts accompanying the message.
    pub multimodal_parts: Vec<ContentPart>,
    /// Turn-scoped cancel signal.
    pub cancel: CancellationToken,
}

/// A started turn: the session it runs in and its event stream.
pub struct TurnHandle {
    /// Session id (fresh when the request had none).
    pub session_id: SessionId,
    /// Ordered event stream for the client.
    pub events: EventReceiver,
    /// Completion handle for the background finalization.
    pub done: tokio::task::JoinHandle<()>,
}

/// Glues consumption, activation, sessions, context, and execution
/// into user turns.
pub struct TurnOrchestrator {
    switcher: Arc<ContextSwitcher>,
    sessions: Arc<SessionStore>,
    consumption: Arc<ConsumptionStore>,
    kg: Arc<KgStore>,
    assembler: Arc<Assembler>,
    turn_config: TurnSection,
    event_buffer: usize,
    /// Turns for the same session serialize behind these; turns for
    /// different sessions run concurrently.
    turn_locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl TurnOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        switcher: Arc<ContextSwitcher>,
        sessions: Arc<SessionStore>,
        consumption: Arc<ConsumptionStore>,
        kg: Arc<KgStore>,
        assembler: Arc<Assembler>,
        turn_config: TurnSection,
        event_buffer: usize,
    ) -> Self {
        Self {
            switcher,
            sessions,
            consumption,
            kg,
            assembler,
            turn_config,
            event_buffer,
            turn_locks: DashMap::new(),
        }
    }

    /// Run admission, activation, and session setup, then start the
    /// turn in the background.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` (429), `QuotaExceeded` (402), activation
    /// errors (auth/timeout/connection), or session-store failures.
    /// None of these emit any events.
    pub async fn start_turn(self: &Arc<Self>, request: TurnRequest) -> RuntimeResult<TurnHandle> {
        let owner_id = request.owner_id;
        if request.message.trim().is_empty() {
            return Err(RuntimeError::Validation("message is empty".into()));
        }

        // 1-2: admission checks. A turn admitted here runs to
        // completion even if it crosses a quota; the next request is
        // the one rejected.
        let rate = {
            let consumption = Arc::clone(&self.consumption);
            tokio::task::spawn_blocking(move || consumption.check_rate(owner_id))
                .await
                .map_err(|e| RuntimeError::Internal(e.to_string()))??
        };
        if !rate.allowed {
            return Err(RuntimeError::RateLimited {
                reason: rate.reason.unwrap_or_else(|| "rate limited".into()),
                retry_after_secs: rate.retry_after_secs,
            });
        }
        let quota = {
            let consumption = Arc::clone(&self.consumption);
            tokio::task::spawn_blocking(move || consumption.check_quota(owner_id))
                .await
                .map_err(|e| RuntimeError::Internal(e.to_string()))??
        };
        if !quota.allowed {
            return Err(RuntimeError::QuotaExceeded(
                quota.reason.unwrap_or_else(|| "quota exceeded".into()),
            ));
        }

        // 3: count the admitted request.
        {
            let consumption = Arc::clone(&self.consumption);
            tokio::task::spawn_blocking(move || consumption.increment_request(owner_id))
                .await
                .map_err(|e| RuntimeError::Internal(e.to_string()))??;
        }

        // 4: ensure the right (profile, LLM, MCP) tuple is active.
        let context = self
            .switcher
            .activate(owner_id, request.profile_id, true)
            .await?;

        // 5: load or create the session. The per-session lock is held
        // through finalization so a later turn never observes a
        // partially-committed earlier one.
        let (mut session, is_new, turn_guard) = match request.session_id {
            Some(id) => {
                let lock = self
                    .turn_locks
                    .entry(id)
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                let guard = lock.lock_owned().await;
                match self.sessions.load(owner_id, id).await? {
                    Some(session) => (session, false, guard),
                    None => {
                        return Err(RuntimeError::NotFound {
                            what: "session",
                            id: id.to_string(),
                        });
                    },
                }
            },
            None => {
                let session = Session::new(owner_id, request.profile_id);
                let lock = self
                    .turn_locks
                    .entry(session.id)
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                let guard = lock.lock_owned().await;
                (session, true, guard)
            },
        };
        // The user message is not appended yet: context assembly and
        // the executor's INIT phase both treat it as the current
        // query, and it joins the chat object at finalization.
        session.current_query = Some(request.message.clone());
        for attachment in &request.attachments {
            if !session.attachments.contains(attachment) {
                session.attachments.push(attachment.clone());
            }
        }
        let session_id = session.id;

        {
            let consumption = Arc::clone(&self.consumption);
            tokio::task::spawn_blocking(move || {
                consumption.increment_session_count(owner_id, session_id, is_new)
            })
            .await
            .map_err(|e| RuntimeError::Internal(e.to_string()))??;
        }

        let (sink, events) = turn_channel(self.event_buffer);
        let orchestrator = Arc::clone(self);
        let done = tokio::spawn(async move {
            let _turn_guard = turn_guard;
            orchestrator
                .run_to_completion(request, context, session, sink)
                .await;
        });

        Ok(TurnHandle {
            session_id,
            events,
            done,
        })
    }

    /// Steps 6-11: assemble, execute, finalize. Never panics the task;
    /// failures synthesize an apologetic assistant message and are
    /// recorded as failed turns.
    async fn run_to_completion(
        self: Arc<Self>,
        request: TurnRequest,
        context: Arc<ActiveContext>,
        mut session: Session,
        sink: EventSink,
    ) {
        let owner_id = request.owner_id;
        let turn_number = session.next_turn_number();

        // 6: context window under the effective budget.
        let budget = self.effective_budget(&context);
        let assembly_ctx = self.build_assembly_context(&request, &context, &session, turn_number);
        let overrides = ModuleOverrides {
            weights: context.profile.module_weights.clone(),
            disabled: context.profile.disabled_modules.clone(),
        };
        let assembly = self.assembler.assemble(budget, &assembly_ctx, &overrides).await;
        debug!(
            tokens = assembly.total_tokens,
            budget,
            dropped = assembly.dropped.len(),
            "Context assembled"
        );

        // 7: the ReAct loop. A clone of the sink keeps the recorded
        // lossless events reachable for the session's event log.
        let tools = enabled_tool_definitions(&context);
        let event_log = sink.clone();
        let executor = ConversationExecutor::new(
            Arc::clone(&context.llm),
            context.tool_runner.clone(),
            sink,
            request.cancel.clone(),
        );
        let inputs = ExecutorInputs {
            session_id: session.id,
            owner_id,
            turn_number,
            provider: context.llm.provider_id().to_string(),
            model: context.llm.model().to_string(),
            system_prompt: assembly.render(),
            history: history_messages(&session),
            query: request.message.clone(),
            multimodal_parts: request.multimodal_parts.clone(),
            tools,
            pricing: context.pricing,
            max_iterations: self.turn_config.max_iterations,
            retry: RetryConfig {
                max_attempts: 3,
                base_delay: std::time::Duration::from_secs(1),
                attempt_timeout: std::time::Duration::from_secs(self.turn_config.llm_timeout_secs),
            },
        };

        let outcome = match executor.execute(inputs).await {
            Ok(outcome) => outcome,
            Err(err) => {
                // 7 (failure path): synthesized apology in the class
                // of the error, per-kind.
                error!(error = %err, kind = %err.kind(), "Turn aborted by LLM failure");
                ExecutorOutcome {
                    success: false,
                    cancelled: false,
                    answer: apology_for(&err),
                    tools_used: Vec::new(),
                    usage: strata_llm::Usage::default(),
                    cost_micro_usd: 0,
                    steps: Vec::new(),
                    component_payloads: Vec::new(),
                    canvas_payloads: Vec::new(),
                }
            },
        };

        // 8: append the user message and, unless cancelled, the
        // assistant answer, plus the turn trace.
        session.push_message(ChatMessage::user(&request.message));
        if !outcome.cancelled {
            session.push_message(ChatMessage::assistant(&outcome.answer));
        }
        session.push_trace(TurnTrace {
            turn_number,
            execution_trace: outcome.steps.clone(),
            is_valid: outcome.success,
        });
        session.counters.turn_count = turn_number;
        session.counters.tool_call_count = session
            .counters
            .tool_call_count
            .saturating_add(outcome.steps.len() as u64);
        session.counters.input_tokens = session
            .counters
            .input_tokens
            .saturating_add(outcome.usage.input_tokens);
        session.counters.output_tokens = session
            .counters
            .output_tokens
            .saturating_add(outcome.usage.output_tokens);
        session.current_query = None;
        let events = event_log.recorded().await;
        session.last_turn_data = Some(serde_json::json!({
            "turn_number": turn_number,
            "answer": outcome.answer,
            "tools_used": outcome.tools_used,
            "success": outcome.success,
            "events": events,
        }));

        // 9: consumption accounting.
        let record = TurnRecord {
            session_id: session.id,
            turn_number,
            input_tokens: outcome.usage.input_tokens,
            output_tokens: outcome.usage.output_tokens,
            provider: context.llm.provider_id().to_string(),
            model: context.llm.model().to_string(),
            status: if outcome.success {
                TurnStatus::Success
            } else {
                TurnStatus::Failure
            },
            rag_used: context.profile.rag_config.enabled,
            rag_tokens_saved: 0,
            cost_micro_usd: outcome.cost_micro_usd,
            query_preview: Some(preview(&request.message)),
            session_name: session.name.clone(),
        };
        {
            let consumption = Arc::clone(&self.consumption);
            let result = tokio::task::spawn_blocking(move || {
                consumption.record_turn(owner_id, &record)
            })
            .await;
            if let Err(e) = result.map_err(|e| e.to_string()).and_then(|r| r.map_err(|e| e.to_string())) {
                error!(error = %e, "Failed to record turn consumption");
            }
        }

        // 10: persist the session.
        if let Err(e) = self.sessions.save(owner_id, &session).await {
            error!(error = %e, session = %session.id, "Failed to persist session");
        }

        // 11: best-effort KG enrichment from successful tool results.
        if context.profile.knowledge_config.enabled && outcome.success {
            self.enrich_knowledge_graph(owner_id, context.profile.id, &outcome);
        }
    }

    fn effective_budget(&self, context: &ActiveContext) -> usize {
        let profile_budget = context
            .profile
            .context_budget
            .unwrap_or(self.turn_config.context_budget);
        let model_cap = context
            .llm
            .max_context_length()
            .saturating_sub(self.turn_config.safety_margin);
        profile_budget.min(model_cap)
    }

    fn build_assembly_context(
        &self,
        request: &TurnRequest,
        context: &ActiveContext,
        session: &Session,
        turn_number: u64,
    ) -> AssemblyContext {
        let tools_by_category: BTreeMap<String, Vec<ToolContextInfo>> = context
            .classification
            .enabled_tools(&context.profile.enabled_tools)
            .into_iter()
            .map(|(category, tools)| {
                let infos = tools
                    .into_iter()
                    .map(|t| ToolContextInfo {
                        name: t.name,
                        description: t.description.unwrap_or_default(),
                        input_schema: t.input_schema,
                    })
                    .collect();
                (category, infos)
            })
            .collect();

        let kg_context = if context.profile.knowledge_config.enabled {
            self.kg_planner_context(request, context)
        } else {
            None
        };

        let mut ctx = AssemblyContext::new(context.profile.kind, turn_number, &request.message);
        ctx.system_prompt = context.profile.system_prompt.clone();
        ctx.session = Some(Arc::new(session.clone()));
        ctx.tools_by_category = tools_by_category;
        ctx.kg_context = kg_context;
        ctx.estimator = TokenEstimator::new();
        ctx
    }

    /// Seed the knowledge graph from query words and extract planner
    /// context. Failures fall back to no enrichment.
    fn kg_planner_context(
        &self,
        request: &TurnRequest,
        context: &ActiveContext,
    ) -> Option<String> {
        let profile_id = context.profile.id;
        let owner_id = request.owner_id;

        let mut seeds = Vec::new();
        for word in request.message.split_whitespace() {
            let term = word.trim_matches(|c: char| !c.is_alphanumeric());
            if term.len() < 3 {
                continue;
            }
            match self.kg.search_entities(owner_id, profile_id, term, 5) {
                Ok(matches) => seeds.extend(matches.into_iter().map(|e| e.id)),
                Err(e) => {
                    warn!(error = %e, "KG seed search failed");
                    return None;
                },
            }
        }
        seeds.sort_unstable();
        seeds.dedup();
        if seeds.is_empty() {
            return None;
        }

        match self.kg.planner_context(
            owner_id,
            profile_id,
            &seeds,
            Some(&seeds),
            context.profile.knowledge_config.max_nodes,
        ) {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "KG planner context failed");
                None
            },
        }
    }

    /// Upsert entities and relationships that successful tool results
    /// declared in their metadata. Failures are logged, never fatal.
    fn enrich_knowledge_graph(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        outcome: &ExecutorOutcome,
    ) {
        for step in &outcome.steps {
            let Some(kg) = step.output_summary.get("metadata").and_then(|m| m.get("kg")) else {
                continue;
            };
            let entities: Vec<NewEntity> = kg
                .get("entities")
                .and_then(|e| serde_json::from_value(e.clone()).ok())
                .unwrap_or_default();
            let relationships: Vec<BulkRelationship> = kg
                .get("relationships")
                .and_then(|r| serde_json::from_value(r.clone()).ok())
                .unwrap_or_default();
            if entities.is_empty() && relationships.is_empty() {
                continue;
            }
            match self
                .kg
                .import_bulk(owner_id, profile_id, &entities, &relationships)
            {
                Ok(counts) => debug!(
                    entities = counts.entities,
                    relationships = counts.relationships,
                    "Knowledge graph enriched from tool results"
                ),
                Err(e) => warn!(error = %e, "Knowledge graph enrichment failed"),
            }
        }
    }
}

impl std::fmt::Debug for TurnOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnOrchestrator").finish_non_exhaustive()
    }
}

fn preview(message: &str) -> String {
    message.chars().take(QUERY_PREVIEW_CHARS).collect()
}

/// Convert valid chat messages into LLM messages.
fn history_messages(session: &Session) -> Vec<Message> {
    session
        .valid_messages()
        .map(|m| match m.role {
            strata_session::ChatRole::User => Message::user(&m.content),
            strata_session::ChatRole::Assistant => Message::assistant(&m.content),
        })
        .collect()
}

/// Flatten enabled classified tools into LLM definitions.
fn enabled_tool_definitions(context: &ActiveContext) -> Vec<strata_llm::LlmToolDefinition> {
    context
        .classification
        .enabled_tools(&context.profile.enabled_tools)
        .into_values()
        .flatten()
        .map(|t| {
            strata_llm::LlmToolDefinition::new(t.name)
                .with_description(t.description.unwrap_or_default())
                .with_schema(t.input_schema)
        })
        .collect()
}

/// The synthesized assistant message for an aborted turn.
fn apology_for(err: &RuntimeError) -> String {
    let class = match err.kind() {
        strata_core::ErrorKind::UpstreamTimeout => "the model took too long to respond",
        strata_core::ErrorKind::RateLimited => "the model provider is rate limiting requests",
        strata_core::ErrorKind::Auth => "the model credentials were rejected",
        strata_core::ErrorKind::UpstreamTransient | strata_core::ErrorKind::UpstreamPermanent => {
            "the model provider returned an error"
        },
        _ => "an unexpected error occurred",
    };
    format!(
        "I apologize - I could not complete this request because {class}. \
         Your message was not lost; please try again."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use strata_consumption::ConsumptionLimits;
    use strata_context::standard_modules;
    use strata_core::{LlmConfigId, ProfileKind};
    use strata_llm::{
        LlmProvider, LlmResponse, LlmResult, LlmToolDefinition as ToolDef, StopReason, Usage,
    };

    use crate::registry::{LlmConfig, Profile, Registry};

    struct CannedLlm;

    #[async_trait]
    impl LlmProvider for CannedLlm {
        fn provider_id(&self) -> &str {
            "canned"
        }
        fn model(&self) -> &str {
            "canned-1"
        }
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolDef],
            _system: &str,
        ) -> LlmResult<LlmResponse> {
            Ok(LlmResponse {
                message: Message::assistant("Here is your answer."),
                has_tool_calls: false,
                stop_reason: StopReason::EndTurn,
                usage: Usage {
                    input_tokens: 120,
                    output_tokens: 30,
                },
            })
        }
        fn max_context_length(&self) -> usize {
            100_000
        }
    }

    struct Harness {
        _dirs: Vec<tempfile::TempDir>,
        orchestrator: Arc<TurnOrchestrator>,
        sessions: Arc<SessionStore>,
        consumption: Arc<ConsumptionStore>,
        owner: OwnerId,
        profile: Profile,
    }

    async fn harness(limits: ConsumptionLimits) -> Harness {
        let registry_dir = tempfile::tempdir().unwrap();
        let session_dir = tempfile::tempdir().unwrap();

        let owner = OwnerId::new();
        let registry = Arc::new(Registry::new(registry_dir.path()));
        let config = LlmConfig {
            id: LlmConfigId::new(),
            owner_id: owner,
            provider: "canned".into(),
            model: "canned-1".into(),
            encrypted_credentials: Some("key".into()),
            base_url: None,
            context_window: None,
        };
        registry.upsert_llm_config(config.clone()).await.unwrap();
        let profile = registry
            .create_profile(
                Profile::new(owner, "analyst", ProfileKind::LlmOnly, config.id)
                    .with_system_prompt("You are a data analyst."),
            )
            .await
            .unwrap();

        let switcher = Arc::new(
            ContextSwitcher::new(Arc::clone(&registry))
                .with_provider_factory(Box::new(|_, _| Ok(Box::new(CannedLlm)))),
        );
        let sessions = Arc::new(SessionStore::new(session_dir.path()));
        let consumption = Arc::new(ConsumptionStore::in_memory(limits).unwrap());
        let kg = Arc::new(KgStore::in_memory().unwrap());
        let assembler = Arc::new(Assembler::new(standard_modules()));

        let orchestrator = Arc::new(TurnOrchestrator::new(
            switcher,
            Arc::clone(&sessions),
            Arc::clone(&consumption),
            kg,
            assembler,
            TurnSection::default(),
            256,
        ));

        Harness {
            _dirs: vec![registry_dir, session_dir],
            orchestrator,
            sessions,
            consumption,
            owner,
            profile,
        }
    }

    fn request(owner: OwnerId, profile: ProfileId, session: Option<SessionId>) -> TurnRequest {
        TurnRequest {
            owner_id: owner,
            session_id: session,
            profile_id: profile,
            message: "show top 5 products by sales last month".into(),
            attachments: Vec::new(),
            multimodal_parts: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_fresh_turn_appends_two_messages() {
        let h = harness(ConsumptionLimits::default()).await;
        let handle = h
            .orchestrator
            .start_turn(request(h.owner, h.profile.id, None))
            .await
            .unwrap();
        handle.done.await.unwrap();

        let session = h
            .sessions
            .load(h.owner, handle.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.chat_object.len(), 2);
        assert_eq!(session.counters.turn_count, 1);
        assert_eq!(session.counters.input_tokens, 120);
        assert!(session.last_turn_data.is_some());
        assert_eq!(session.workflow_history.len(), 1);
    }

    #[tokio::test]
    async fn test_tokens_recorded_in_consumption() {
        let h = harness(ConsumptionLimits::default()).await;
        for _ in 0..3 {
            let handle = h
                .orchestrator
                .start_turn(request(h.owner, h.profile.id, None))
                .await
                .unwrap();
            handle.done.await.unwrap();
        }
        let summary = h.consumption.summary(h.owner).unwrap();
        assert_eq!(summary.total_input_tokens, 360);
        assert_eq!(summary.total_output_tokens, 90);
        assert_eq!(summary.total_turns, 3);
        assert_eq!(summary.total_sessions, 3);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_third_turn() {
        let limits = ConsumptionLimits {
            prompts_per_hour: 2,
            prompts_per_day: 100,
            input_tokens_per_month: None,
            output_tokens_per_month: None,
        };
        let h = harness(limits).await;

        for _ in 0..2 {
            let handle = h
                .orchestrator
                .start_turn(request(h.owner, h.profile.id, None))
                .await
                .unwrap();
            handle.done.await.unwrap();
        }
        let result = h
            .orchestrator
            .start_turn(request(h.owner, h.profile.id, None))
            .await;
        match result {
            Err(RuntimeError::RateLimited {
                retry_after_secs, ..
            }) => {
                assert!(retry_after_secs.unwrap_or(0) > 0);
            },
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_quota_rejects_after_crossing() {
        let limits = ConsumptionLimits {
            prompts_per_hour: 100,
            prompts_per_day: 100,
            // The first turn (120 input tokens) crosses this.
            input_tokens_per_month: Some(110),
            output_tokens_per_month: None,
        };
        let h = harness(limits).await;

        // First turn passes the checks and is recorded in full.
        let handle = h
            .orchestrator
            .start_turn(request(h.owner, h.profile.id, None))
            .await
            .unwrap();
        handle.done.await.unwrap();
        let summary = h.consumption.summary(h.owner).unwrap();
        assert_eq!(summary.total_input_tokens, 120);

        // The next one is rejected at admission.
        let result = h
            .orchestrator
            .start_turn(request(h.owner, h.profile.id, None))
            .await;
        assert!(matches!(result, Err(RuntimeError::QuotaExceeded(_))));
    }

    #[tokio::test]
    async fn test_continuing_session_accumulates() {
        let h = harness(ConsumptionLimits::default()).await;
        let first = h
            .orchestrator
            .start_turn(request(h.owner, h.profile.id, None))
            .await
            .unwrap();
        first.done.await.unwrap();

        let second = h
            .orchestrator
            .start_turn(request(h.owner, h.profile.id, Some(first.session_id)))
            .await
            .unwrap();
        second.done.await.unwrap();

        let session = h
            .sessions
            .load(h.owner, first.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.chat_object.len(), 4);
        assert_eq!(session.counters.turn_count, 2);

        // Session counted once despite two turns.
        let summary = h.consumption.summary(h.owner).unwrap();
        assert_eq!(summary.total_sessions, 1);
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let h = harness(ConsumptionLimits::default()).await;
        let result = h
            .orchestrator
            .start_turn(request(h.owner, h.profile.id, Some(SessionId::new())))
            .await;
        assert!(matches!(result, Err(RuntimeError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let h = harness(ConsumptionLimits::default()).await;
        let mut req = request(h.owner, h.profile.id, None);
        req.message = "   ".into();
        let result = h.orchestrator.start_turn(req).await;
        assert!(matches!(result, Err(RuntimeError::Validation(_))));
    }
}
