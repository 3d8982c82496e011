//! Recipe trigger policy: decides when the accumulated ingredient set is
//! turned into a remote generation request.
//!
//! Automatic ingredient changes never invoke the paid generation call; only
//! an explicit (voice-command-originated) trigger does. A forced trigger
//! always invokes, even when the ingredient set is unchanged.

use anyhow::Result;
use futures_util::future::BoxFuture;
use log::{debug, error, info};
use std::sync::{Arc, Mutex};

use crate::managers::ingredients::IngredientAccumulator;
use crate::recipes::{parse_recipes, Recipe};

/// Remote recipe generation capability. Takes the ordered ingredient display
/// strings and returns the provider's raw JSON-array response text.
pub trait RecipeProvider: Send + Sync {
    fn generate_recipes(&self, ingredients: Vec<String>) -> BoxFuture<'static, Result<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerAction {
    NoOp,
    EmitEmpty,
    Invoke(Vec<String>),
}

struct TriggerState {
    last_snapshot: Vec<String>,
    last_trigger_was_forced: bool,
}

pub type RecipeListener = Box<dyn Fn(Vec<Recipe>) + Send + Sync>;

pub struct RecipeTrigger {
    accumulator: Arc<IngredientAccumulator>,
    provider: Arc<dyn RecipeProvider>,
    rt: tokio::runtime::Handle,
    state: Mutex<TriggerState>,
    listener: Arc<Mutex<Option<RecipeListener>>>,
}

impl RecipeTrigger {
    pub fn new(
        accumulator: Arc<IngredientAccumulator>,
        provider: Arc<dyn RecipeProvider>,
        rt: tokio::runtime::Handle,
    ) -> Self {
        Self {
            accumulator,
            provider,
            rt,
            state: Mutex::new(TriggerState {
                last_snapshot: Vec::new(),
                last_trigger_was_forced: false,
            }),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Register the listener receiving parsed recipe lists (and the empty
    /// list on `EmitEmpty`).
    pub fn set_recipe_listener(&self, listener: RecipeListener) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    /// Decide what a trigger should do given the current ingredient set, and
    /// record the decision. `Invoke` updates `last_snapshot` before dispatch.
    pub fn evaluate(&self, forced: bool) -> TriggerAction {
        let snapshot = self.accumulator.snapshot();
        let mut state = self.state.lock().unwrap();

        if snapshot.is_empty() {
            state.last_trigger_was_forced = forced;
            return TriggerAction::EmitEmpty;
        }
        if !forced {
            return TriggerAction::NoOp;
        }
        if snapshot == state.last_snapshot {
            // Unchanged set: a forced trigger still invokes, by decision.
            debug!("ingredient set unchanged, forced trigger invokes anyway");
        }
        state.last_snapshot = snapshot.clone();
        state.last_trigger_was_forced = true;
        TriggerAction::Invoke(snapshot)
    }

    /// Evaluate and act: emit an empty list, invoke the provider, or nothing.
    pub fn request_update(&self, forced: bool) {
        match self.evaluate(forced) {
            TriggerAction::NoOp => {}
            TriggerAction::EmitEmpty => {
                debug!("no ingredients accumulated; clearing displayed recipes");
                self.deliver(Vec::new());
            }
            TriggerAction::Invoke(ingredients) => {
                info!("requesting recipes for {} ingredients", ingredients.len());
                let provider = Arc::clone(&self.provider);
                let listener = Arc::clone(&self.listener);
                self.rt.spawn(async move {
                    match provider.generate_recipes(ingredients).await {
                        Ok(json) => {
                            let recipes = parse_recipes(&json);
                            info!("received {} recipes", recipes.len());
                            if let Some(callback) = &*listener.lock().unwrap() {
                                callback(recipes);
                            }
                        }
                        Err(e) => {
                            // Previously delivered recipes stay untouched.
                            error!("recipe generation failed: {e:#}");
                        }
                    }
                });
            }
        }
    }

    fn deliver(&self, recipes: Vec<Recipe>) {
        if let Some(callback) = &*self.listener.lock().unwrap() {
            callback(recipes);
        }
    }
}
