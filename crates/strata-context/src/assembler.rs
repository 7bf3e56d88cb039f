//! The budgeted assembler.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::module::{AssemblyContext, CONDENSE_FLOOR_TOKENS, ContextModule, Contribution};

/// A registered module with its allocation weight and drop priority.
#[derive(Clone)]
pub struct ModuleSpec {
    /// The module.
    pub module: Arc<dyn ContextModule>,
    /// Relative budget weight; normalized across applicable modules.
    pub weight: f64,
    /// Drop priority: higher survives longer when dropping is needed.
    pub priority: u8,
}

/// Per-profile overrides: reweight or disable modules by id.
#[derive(Debug, Clone, Default)]
pub struct ModuleOverrides {
    /// Weight replacements by module id.
    pub weights: HashMap<String, f64>,
    /// Disabled module ids.
    pub disabled: HashSet<String>,
}

/// Result of one assembly pass.
#[derive(Debug)]
pub struct AssemblyResult {
    /// Contribution per module id.
    pub contributions: BTreeMap<String, Contribution>,
    /// Total tokens used.
    pub total_tokens: usize,
    /// The budget the pass ran under.
    pub budget: usize,
    /// Module ids dropped to fit.
    pub dropped: Vec<String>,
}

impl AssemblyResult {
    /// Concatenate non-empty contributions in module-id order.
    #[must_use]
    pub fn render(&self) -> String {
        self.contributions
            .values()
            .filter(|c| !c.content.is_empty())
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Runs registered modules under a token budget.
pub struct Assembler {
    specs: Vec<ModuleSpec>,
}

impl Assembler {
    /// Create an assembler over a module registry.
    #[must_use]
    pub fn new(specs: Vec<ModuleSpec>) -> Self {
        Self { specs }
    }

    /// Modules applicable to the context, with overrides applied and
    /// weights normalized to sum 1.0.
    fn applicable(
        &self,
        ctx: &AssemblyContext,
        overrides: &ModuleOverrides,
    ) -> Vec<(ModuleSpec, f64)> {
        let mut selected: Vec<ModuleSpec> = self
            .specs
            .iter()
            .filter(|spec| {
                spec.module.applies_to(ctx.profile_kind)
                    && !overrides.disabled.contains(spec.module.module_id())
            })
            .cloned()
            .collect();

        for spec in &mut selected {
            if let Some(&weight) = overrides.weights.get(spec.module.module_id()) {
                spec.weight = weight.max(0.0);
            }
        }

        let total: f64 = selected.iter().map(|s| s.weight).sum();
        if total <= f64::EPSILON {
            return selected.into_iter().map(|s| (s, 0.0)).collect();
        }
        selected
            .into_iter()
            .map(|s| {
                let normalized = s.weight / total;
                (s, normalized)
            })
            .collect()
    }

    /// Assemble the context window under `budget` tokens.
    ///
    /// Contributions are gathered concurrently; the result's total
    /// token usage respects the budget whenever the non-condensable
    /// floors themselves fit.
    pub async fn assemble(
        &self,
        budget: usize,
        ctx: &AssemblyContext,
        overrides: &ModuleOverrides,
    ) -> AssemblyResult {
        let applicable = self.applicable(ctx, overrides);

        // Phase 1: allocate and contribute concurrently.
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let futures: Vec<_> = applicable
            .iter()
            .map(|(spec, share)| {
                let allocation = ((budget as f64) * share).floor() as usize;
                let module = Arc::clone(&spec.module);
                async move {
                    let contribution = module.contribute(allocation, ctx).await;
                    (module.module_id().to_string(), allocation, contribution)
                }
            })
            .collect();
        let results = futures::future::join_all(futures).await;

        let mut allocations: HashMap<String, usize> = HashMap::new();
        let mut contributions: BTreeMap<String, Contribution> = BTreeMap::new();
        for (id, allocation, contribution) in results {
            allocations.insert(id.clone(), allocation);
            contributions.insert(id, contribution);
        }

        // Phase 2: condense largest condensable contributions until
        // under budget or nothing condenses further.
        let mut exhausted: HashSet<String> = HashSet::new();
        loop {
            let total: usize = contributions.values().map(|c| c.tokens_used).sum();
            if total <= budget {
                break;
            }
            let overshoot = total.saturating_sub(budget);

            let Some((id, current_tokens)) = contributions
                .iter()
                .filter(|(id, c)| c.condensable && c.tokens_used > 0 && !exhausted.contains(*id))
                .max_by_key(|(_, c)| c.tokens_used)
                .map(|(id, c)| (id.clone(), c.tokens_used))
            else {
                break;
            };

            let target = current_tokens
                .saturating_sub(overshoot)
                .max(CONDENSE_FLOOR_TOKENS);

            let spec = self
                .specs
                .iter()
                .find(|s| s.module.module_id() == id)
                .expect("contribution came from a registered module");
            let content = contributions[&id].content.clone();
            match spec.module.condense(&content, target, ctx).await {
                Some(condensed) if condensed.tokens_used < current_tokens => {
                    debug!(module = %id, from = current_tokens, to = condensed.tokens_used, "Condensed contribution");
                    contributions.insert(id, condensed);
                },
                _ => {
                    exhausted.insert(id);
                },
            }
        }

        // Phase 3: drop lowest-priority condensable contributions.
        let mut dropped = Vec::new();
        loop {
            let total: usize = contributions.values().map(|c| c.tokens_used).sum();
            if total <= budget {
                break;
            }

            let mut droppable: Vec<(String, u8, usize)> = contributions
                .iter()
                .filter(|(_, c)| c.condensable && c.tokens_used > 0)
                .map(|(id, c)| {
                    let priority = self
                        .specs
                        .iter()
                        .find(|s| s.module.module_id() == id)
                        .map_or(0, |s| s.priority);
                    (id.clone(), priority, c.tokens_used)
                })
                .collect();
            if droppable.is_empty() {
                break;
            }
            // Lowest priority first; largest first within a priority.
            droppable.sort_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)));
            let (id, _, _) = droppable.swap_remove(0);
            debug!(module = %id, "Dropped contribution to fit budget");
            contributions.insert(
                id.clone(),
                Contribution {
                    content: String::new(),
                    tokens_used: 0,
                    metadata: serde_json::json!({"mode": "dropped"}),
                    condensable: true,
                },
            );
            dropped.push(id);
        }

        let total_tokens = contributions.values().map(|c| c.tokens_used).sum();
        let _ = allocations;
        AssemblyResult {
            contributions,
            total_tokens,
            budget,
            dropped,
        }
    }
}

impl std::fmt::Debug for Assembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembler")
            .field("modules", &self.specs.len())
            .finish_non_exhaustive()
    }
}
