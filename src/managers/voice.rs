//! Continuous voice command listening loop.
//!
//! A long-lived recording thread captures fixed-length audio windows, frames
//! each one as WAV, and hands it fire-and-forget to the transcription
//! provider while the next window is already recording. A keyword hit in a
//! transcript raises the command event. The loop auto-restarts after every
//! window until `stop()` is called.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use futures_util::future::BoxFuture;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio_toolkit::audio::AudioInput;
use crate::audio_toolkit::{contains_keyword, fuzzy_contains_keyword, AudioWindow};
use crate::whisper_api::TranscriptEvent;

/// Remote speech-to-text capability consuming one WAV-framed window per call.
pub trait TranscriptionProvider: Send + Sync {
    fn transcribe(&self, wav: Vec<u8>) -> BoxFuture<'static, Result<TranscriptEvent>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Recording,
    Processing,
}

#[derive(Clone)]
pub struct VoiceConfig {
    pub keyword: String,
    pub window: Duration,
    pub sample_rate: u32,
    pub device: Option<String>,
    /// When set, the keyword also matches fuzzily at this threshold.
    pub fuzzy_threshold: Option<f64>,
    /// When set, every finalized window is written here as a WAV file.
    pub dump_dir: Option<PathBuf>,
}

pub struct VoiceCommandManager {
    config: VoiceConfig,
    audio: Arc<dyn AudioInput>,
    transcriber: Arc<dyn TranscriptionProvider>,
    rt: tokio::runtime::Handle,
    state: Arc<Mutex<LoopState>>,
    cancel: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    command_listener: Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>,
}

impl VoiceCommandManager {
    pub fn new(
        config: VoiceConfig,
        audio: Arc<dyn AudioInput>,
        transcriber: Arc<dyn TranscriptionProvider>,
        rt: tokio::runtime::Handle,
    ) -> Self {
        Self {
            config,
            audio,
            transcriber,
            rt,
            state: Arc::new(Mutex::new(LoopState::Idle)),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            command_listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Register the zero-argument command event callback.
    pub fn set_command_listener(&self, listener: Box<dyn Fn() + Send + Sync>) {
        *self.command_listener.lock().unwrap() = Some(listener);
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock().unwrap()
    }

    /// Start the listening loop. Idempotent while already running. A device
    /// open failure surfaces here and leaves the loop `Idle`; no retry is
    /// attempted.
    pub fn start(&self) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if *state != LoopState::Idle {
                debug!("voice loop already running");
                return Ok(());
            }
        }
        self.cancel.store(false, Ordering::SeqCst);

        let audio = Arc::clone(&self.audio);
        let transcriber = Arc::clone(&self.transcriber);
        let rt = self.rt.clone();
        let state = Arc::clone(&self.state);
        let cancel = Arc::clone(&self.cancel);
        let listener = Arc::clone(&self.command_listener);
        let config = self.config.clone();

        // The cpal stream is not Send, so the recording thread owns the
        // device; a handshake channel carries the open result back.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let handle = thread::Builder::new()
            .name("voice-loop".to_string())
            .spawn(move || {
                let (frame_tx, frame_rx) = mpsc::channel::<Vec<f32>>();
                let capture =
                    match audio.open(config.device.as_deref(), config.sample_rate, frame_tx) {
                        Ok(capture) => {
                            let _ = ready_tx.send(Ok(()));
                            capture
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                run_loop(&config, &state, &cancel, &frame_rx, &transcriber, &listener, &rt);

                // Explicit for clarity: leaving this scope releases the device.
                drop(capture);
                *state.lock().unwrap() = LoopState::Idle;
                debug!("recording thread exited");
            })
            .context("failed to spawn recording thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *self.state.lock().unwrap() = LoopState::Recording;
                *self.worker.lock().unwrap() = Some(handle);
                info!("voice command loop started (keyword: '{}')", self.config.keyword);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e.context("failed to open audio input"))
            }
            Err(_) => {
                let _ = handle.join();
                Err(anyhow!("recording thread exited before opening the device"))
            }
        }
    }

    /// Stop the loop from any state, releasing the audio device and joining
    /// the recording thread. In-flight transcription requests are not
    /// cancelled; their replies are discarded by the state filter.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        *self.state.lock().unwrap() = LoopState::Idle;
        if let Some(handle) = self.worker.lock().unwrap().take() {
            if let Err(e) = handle.join() {
                error!("recording thread panicked: {e:?}");
            }
        }
        info!("voice command loop stopped");
    }
}

fn run_loop(
    config: &VoiceConfig,
    state: &Arc<Mutex<LoopState>>,
    cancel: &Arc<AtomicBool>,
    frame_rx: &mpsc::Receiver<Vec<f32>>,
    transcriber: &Arc<dyn TranscriptionProvider>,
    listener: &Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>,
    rt: &tokio::runtime::Handle,
) {
    let samples_per_window =
        ((config.sample_rate as f64) * config.window.as_secs_f64()).round() as usize;

    while !cancel.load(Ordering::SeqCst) {
        *state.lock().unwrap() = LoopState::Recording;
        let mut window = AudioWindow::new(config.sample_rate, 1);

        while window.sample_count() < samples_per_window {
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            match frame_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(frame) => window.push_samples(&frame),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    error!("audio capture stream closed unexpectedly");
                    return;
                }
            }
        }

        *state.lock().unwrap() = LoopState::Processing;
        let has_audio = window.data_len() > 0;
        let wav = window.finalize();

        if let Some(dir) = &config.dump_dir {
            dump_window(dir, &wav);
        }

        if has_audio {
            // Fire-and-forget: the loop must never block on the remote call.
            let transcriber = Arc::clone(transcriber);
            let state = Arc::clone(state);
            let listener = Arc::clone(listener);
            let keyword = config.keyword.clone();
            let fuzzy = config.fuzzy_threshold;
            rt.spawn(async move {
                let result = transcriber.transcribe(wav).await;
                handle_transcript(result, &state, &listener, &keyword, fuzzy);
            });
        }
        // Loop head re-enters Recording: the perpetual sliding window.
    }
}

fn handle_transcript(
    result: Result<TranscriptEvent>,
    state: &Arc<Mutex<LoopState>>,
    listener: &Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>,
    keyword: &str,
    fuzzy_threshold: Option<f64>,
) {
    let event = match result {
        Ok(event) => event,
        Err(e) => {
            // Transcription errors never stop the loop.
            warn!("transcription failed: {e:#}");
            return;
        }
    };

    if *state.lock().unwrap() == LoopState::Idle {
        debug!("discarding transcript received after stop");
        return;
    }

    debug!("transcript: '{}'", event.text);
    let mut hit = event.is_command || contains_keyword(&event.text, keyword);
    if !hit {
        if let Some(threshold) = fuzzy_threshold {
            hit = fuzzy_contains_keyword(&event.text, keyword, threshold);
        }
    }

    if hit {
        info!("command keyword detected");
        if let Some(callback) = &*listener.lock().unwrap() {
            callback();
        }
    }
}

fn dump_window(dir: &PathBuf, wav: &[u8]) {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S%.3f").to_string();
    let path = dir.join(format!("window_{timestamp}.wav"));
    if let Err(e) = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, wav)) {
        warn!("failed to dump capture window to {:?}: {e}", path);
    } else {
        debug!("dumped capture window: {:?}", path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_toolkit::audio::AudioCapture;
    use std::sync::atomic::AtomicUsize;

    /// Synthetic audio input producing silence, tracking open handles so
    /// tests can assert the device is released.
    struct FakeAudioInput {
        open_handles: Arc<AtomicUsize>,
        fail_open: bool,
    }

    struct FakeCapture {
        open_handles: Arc<AtomicUsize>,
        alive: Arc<AtomicBool>,
    }

    impl AudioCapture for FakeCapture {
        fn sample_rate(&self) -> u32 {
            16_000
        }
    }

    impl Drop for FakeCapture {
        fn drop(&mut self) {
            self.alive.store(false, Ordering::SeqCst);
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl AudioInput for FakeAudioInput {
        fn open(
            &self,
            _device_name: Option<&str>,
            sample_rate: u32,
            sink: mpsc::Sender<Vec<f32>>,
        ) -> Result<Box<dyn AudioCapture>> {
            if self.fail_open {
                return Err(anyhow!("microphone permission denied"));
            }
            self.open_handles.fetch_add(1, Ordering::SeqCst);
            let alive = Arc::new(AtomicBool::new(true));
            let feeder_alive = Arc::clone(&alive);
            // Feed 10ms of silence every millisecond or so; plenty fast for
            // the short windows the tests use.
            let chunk = vec![0.0f32; sample_rate as usize / 100];
            thread::spawn(move || {
                while feeder_alive.load(Ordering::SeqCst) {
                    if sink.send(chunk.clone()).is_err() {
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            });
            Ok(Box::new(FakeCapture {
                open_handles: Arc::clone(&self.open_handles),
                alive,
            }))
        }
    }

    struct CountingTranscriber {
        calls: Arc<AtomicUsize>,
        text: String,
    }

    impl TranscriptionProvider for CountingTranscriber {
        fn transcribe(&self, _wav: Vec<u8>) -> BoxFuture<'static, Result<TranscriptEvent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = self.text.clone();
            Box::pin(async move {
                Ok(TranscriptEvent {
                    text,
                    is_command: false,
                })
            })
        }
    }

    fn test_config() -> VoiceConfig {
        VoiceConfig {
            keyword: "update".to_string(),
            window: Duration::from_millis(100),
            sample_rate: 16_000,
            device: None,
            fuzzy_threshold: None,
            dump_dir: None,
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
    fn one_request_per_window_and_loop_restarts() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let open_handles = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = VoiceCommandManager::new(
            test_config(),
            Arc::new(FakeAudioInput {
                open_handles: Arc::clone(&open_handles),
                fail_open: false,
            }),
            Arc::new(CountingTranscriber {
                calls: Arc::clone(&calls),
                text: "nothing to see".to_string(),
            }),
            rt.handle().clone(),
        );

        manager.start().unwrap();
        wait_until(|| calls.load(Ordering::SeqCst) >= 1);
        // Loop re-entered Recording without intervention.
        wait_until(|| manager.state() == LoopState::Recording);
        wait_until(|| calls.load(Ordering::SeqCst) >= 2);

        manager.stop();
        assert_eq!(manager.state(), LoopState::Idle);
        assert_eq!(open_handles.load(Ordering::SeqCst), 0, "device left open");
    }

    #[test]
    fn start_is_idempotent_while_running() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let open_handles = Arc::new(AtomicUsize::new(0));
        let manager = VoiceCommandManager::new(
            test_config(),
            Arc::new(FakeAudioInput {
                open_handles: Arc::clone(&open_handles),
                fail_open: false,
            }),
            Arc::new(CountingTranscriber {
                calls: Arc::new(AtomicUsize::new(0)),
                text: String::new(),
            }),
            rt.handle().clone(),
        );

        manager.start().unwrap();
        manager.start().unwrap();
        assert_eq!(open_handles.load(Ordering::SeqCst), 1);
        manager.stop();
        assert_eq!(open_handles.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn open_failure_surfaces_and_returns_to_idle() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let manager = VoiceCommandManager::new(
            test_config(),
            Arc::new(FakeAudioInput {
                open_handles: Arc::new(AtomicUsize::new(0)),
                fail_open: true,
            }),
            Arc::new(CountingTranscriber {
                calls: Arc::new(AtomicUsize::new(0)),
                text: String::new(),
            }),
            rt.handle().clone(),
        );

        assert!(manager.start().is_err());
        assert_eq!(manager.state(), LoopState::Idle);
    }

    #[test]
    fn keyword_in_transcript_raises_command_event() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let commands = Arc::new(AtomicUsize::new(0));
        let manager = VoiceCommandManager::new(
            test_config(),
            Arc::new(FakeAudioInput {
                open_handles: Arc::new(AtomicUsize::new(0)),
                fail_open: false,
            }),
            Arc::new(CountingTranscriber {
                calls: Arc::new(AtomicUsize::new(0)),
                text: "please UPDATE the recipes".to_string(),
            }),
            rt.handle().clone(),
        );
        let commands_cb = Arc::clone(&commands);
        manager.set_command_listener(Box::new(move || {
            commands_cb.fetch_add(1, Ordering::SeqCst);
        }));

        manager.start().unwrap();
        wait_until(|| commands.load(Ordering::SeqCst) >= 1);
        manager.stop();
    }

    #[test]
    fn stale_replies_after_stop_are_discarded() {
        let commands = Arc::new(AtomicUsize::new(0));
        let state = Arc::new(Mutex::new(LoopState::Idle));
        let listener: Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>> = {
            let commands_cb = Arc::clone(&commands);
            Arc::new(Mutex::new(Some(Box::new(move || {
                commands_cb.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn Fn() + Send + Sync>)))
        };

        // State is Idle (stopped): a keyword-bearing reply must be dropped.
        handle_transcript(
            Ok(TranscriptEvent {
                text: "update".to_string(),
                is_command: true,
            }),
            &state,
            &listener,
            "update",
            None,
        );
        assert_eq!(commands.load(Ordering::SeqCst), 0);

        *state.lock().unwrap() = LoopState::Recording;
        handle_transcript(
            Ok(TranscriptEvent {
                text: "update".to_string(),
                is_command: false,
            }),
            &state,
            &listener,
            "update",
            None,
        );
        assert_eq!(commands.load(Ordering::SeqCst), 1);
    }
}
