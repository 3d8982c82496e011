//! Core pipeline: camera frames and microphone audio in, deduplicated
//! ingredients and on-demand recipe suggestions out.
//!
//! All long-lived components are explicitly constructed and owned by a
//! [`Session`]; there are no process-global singletons. UI layers interact
//! through listeners and the few public entry points on `Session`.

pub mod audio_toolkit;
pub mod gemini;
pub mod managers;
pub mod nouns;
pub mod recipes;
pub mod settings;
pub mod whisper_api;

use anyhow::{Context, Result};
use std::sync::Arc;

use audio_toolkit::audio::{AudioInput, CpalAudioInput};
use gemini::GeminiClient;
use managers::describer::{CameraFrame, DescriptionGate, DescriptionProvider};
use managers::ingredients::{IngredientAccumulator, IngredientListener};
use managers::recipes::{RecipeListener, RecipeProvider, RecipeTrigger};
use managers::voice::{TranscriptionProvider, VoiceCommandManager, VoiceConfig};
use nouns::{Lexicon, NounExtractor};
use settings::Settings;
use whisper_api::WhisperApi;

/// The three remote capabilities a session talks to. Injected so hosts and
/// tests can substitute their own implementations.
pub struct Providers {
    pub description: Arc<dyn DescriptionProvider>,
    pub transcription: Arc<dyn TranscriptionProvider>,
    pub recipes: Arc<dyn RecipeProvider>,
}

pub struct Session {
    runtime: tokio::runtime::Runtime,
    accumulator: Arc<IngredientAccumulator>,
    trigger: Arc<RecipeTrigger>,
    gate: DescriptionGate,
    voice: VoiceCommandManager,
}

impl Session {
    pub fn new(
        settings: Settings,
        providers: Providers,
        audio: Arc<dyn AudioInput>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to build session runtime")?;

        let accumulator = Arc::new(IngredientAccumulator::new());
        let extractor = Arc::new(NounExtractor::new(Lexicon::from_paths(
            &settings.pos_model_paths,
        )));

        let gate = DescriptionGate::new(
            runtime.handle(),
            providers.description,
            Arc::clone(&extractor),
            Arc::clone(&accumulator),
            settings.frame_skip,
        );

        let trigger = Arc::new(RecipeTrigger::new(
            Arc::clone(&accumulator),
            providers.recipes,
            runtime.handle().clone(),
        ));

        let voice = VoiceCommandManager::new(
            VoiceConfig {
                keyword: settings.command_keyword.clone(),
                window: settings.window(),
                sample_rate: settings.sample_rate,
                device: settings.selected_microphone.clone(),
                fuzzy_threshold: settings.fuzzy_keyword_threshold,
                dump_dir: settings.dump_audio_dir.clone(),
            },
            audio,
            providers.transcription,
            runtime.handle().clone(),
        );

        // The voice command is the only thing that forces generation;
        // ingredient changes merely keep the trigger policy informed (and
        // clear displayed recipes once the set empties).
        let trigger_for_voice = Arc::clone(&trigger);
        voice.set_command_listener(Box::new(move || trigger_for_voice.request_update(true)));
        let trigger_for_changes = Arc::clone(&trigger);
        accumulator.register(Box::new(move |_| trigger_for_changes.request_update(false)));

        Ok(Self {
            runtime,
            accumulator,
            trigger,
            gate,
            voice,
        })
    }

    /// Build a session against the real remote providers and cpal audio.
    /// Description and recipe generation get separate clients so each
    /// provider serializes its own requests without blocking the other.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let providers = Providers {
            description: Arc::new(GeminiClient::new(
                settings.gemini_api_key.clone(),
                settings.gemini_model.clone(),
            )),
            transcription: Arc::new(WhisperApi::new(
                settings.transcription_url.clone(),
                settings.transcription_api_key.clone(),
                settings.transcription_model.clone(),
            )),
            recipes: Arc::new(GeminiClient::new(
                settings.gemini_api_key.clone(),
                settings.gemini_model.clone(),
            )),
        };
        Self::new(settings, providers, Arc::new(CpalAudioInput))
    }

    /// Submit one camera frame to the description pipeline. Non-blocking.
    pub fn submit_frame(&self, frame: CameraFrame) {
        self.gate.submit(frame);
    }

    /// Start the continuous voice command loop.
    pub fn start_listening(&self) -> Result<()> {
        self.voice.start()
    }

    pub fn stop_listening(&self) {
        self.voice.stop();
    }

    /// Explicitly request recipe generation, as the voice command would.
    pub fn refresh_recipes(&self) {
        self.trigger.request_update(true);
    }

    pub fn ingredients(&self) -> Vec<String> {
        self.accumulator.snapshot()
    }

    pub fn clear_ingredients(&self) {
        self.accumulator.clear();
    }

    /// Register a listener for ingredient set changes (full snapshots).
    pub fn on_ingredients(&self, listener: IngredientListener) {
        self.accumulator.register(listener);
    }

    /// Register the listener receiving generated recipe lists.
    pub fn on_recipes(&self, listener: RecipeListener) {
        self.trigger.set_recipe_listener(listener);
    }

    pub fn handle(&self) -> tokio::runtime::Handle {
        self.runtime.handle().clone()
    }

    /// Tear the session down: stop the voice loop (joining the recording
    /// thread), close the gate, and abandon in-flight provider calls.
    pub fn shutdown(self) {
        self.voice.stop();
        drop(self.gate);
        drop(self.trigger);
        drop(self.accumulator);
        self.runtime.shutdown_background();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use crate::managers::describer::{FeatureStatus, ProgressSink, TextSink};
    use crate::recipes::Recipe;
    use crate::whisper_api::TranscriptEvent;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc::Sender;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    struct FakeStack;

    impl DescriptionProvider for FakeStack {
        fn feature_status(&self) -> BoxFuture<'static, Result<FeatureStatus>> {
            Box::pin(async move { Ok(FeatureStatus::Available) })
        }
        fn download_feature(&self, _: ProgressSink) -> BoxFuture<'static, Result<()>> {
            Box::pin(async move { Err(anyhow!("nothing to download")) })
        }
        fn describe(&self, _: Vec<u8>, on_text: TextSink) -> BoxFuture<'static, Result<()>> {
            Box::pin(async move {
                on_text("a tomato and a cucumber");
                Ok(())
            })
        }
    }

    impl TranscriptionProvider for FakeStack {
        fn transcribe(&self, _: Vec<u8>) -> BoxFuture<'static, Result<TranscriptEvent>> {
            Box::pin(async move {
                Ok(TranscriptEvent {
                    text: "update the recipes".to_string(),
                    is_command: false,
                })
            })
        }
    }

    struct FakeRecipes {
        calls: Arc<AtomicUsize>,
    }

    impl RecipeProvider for FakeRecipes {
        fn generate_recipes(&self, _: Vec<String>) -> BoxFuture<'static, Result<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Ok(r#"[{"title":"Salad","description":"Crisp","ingredients":"tomato,cucumber","instructions":"Chop\nMix"}]"#.to_string())
            })
        }
    }

    struct SilenceInput;

    struct SilenceCapture {
        alive: Arc<AtomicBool>,
    }

    impl crate::audio_toolkit::audio::AudioCapture for SilenceCapture {
        fn sample_rate(&self) -> u32 {
            16_000
        }
    }

    impl Drop for SilenceCapture {
        fn drop(&mut self) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    impl AudioInput for SilenceInput {
        fn open(
            &self,
            _device: Option<&str>,
            sample_rate: u32,
            sink: Sender<Vec<f32>>,
        ) -> Result<Box<dyn crate::audio_toolkit::audio::AudioCapture>> {
            let alive = Arc::new(AtomicBool::new(true));
            let feeder_alive = Arc::clone(&alive);
            let chunk = vec![0.0f32; sample_rate as usize / 100];
            thread::spawn(move || {
                while feeder_alive.load(Ordering::SeqCst) {
                    if sink.send(chunk.clone()).is_err() {
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            });
            Ok(Box::new(SilenceCapture { alive }))
        }
    }

    fn wait_until(cond: impl Fn() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn frames_and_voice_commands_flow_end_to_end() {
        let recipe_calls = Arc::new(AtomicUsize::new(0));
        let mut settings = Settings::default();
        settings.window_ms = 100;
        settings.frame_skip = 1;
        settings.pos_model_paths = Vec::new();

        let session = Session::new(
            settings,
            Providers {
                description: Arc::new(FakeStack),
                transcription: Arc::new(FakeStack),
                recipes: Arc::new(FakeRecipes {
                    calls: Arc::clone(&recipe_calls),
                }),
            },
            Arc::new(SilenceInput),
        )
        .unwrap();

        let delivered = Arc::new(Mutex::new(Vec::<Recipe>::new()));
        let delivered_cb = Arc::clone(&delivered);
        session.on_recipes(Box::new(move |recipes| {
            if !recipes.is_empty() {
                *delivered_cb.lock().unwrap() = recipes;
            }
        }));

        session.submit_frame(CameraFrame::new(vec![0u8; 16]));
        wait_until(|| session.ingredients() == vec!["tomato", "cucumber"]);

        session.start_listening().unwrap();
        wait_until(|| recipe_calls.load(Ordering::SeqCst) >= 1);
        wait_until(|| delivered.lock().unwrap().len() == 1);
        assert_eq!(delivered.lock().unwrap()[0].title, "Salad");

        session.stop_listening();
        session.clear_ingredients();
        wait_until(|| session.ingredients().is_empty());
        session.shutdown();
    }
}
