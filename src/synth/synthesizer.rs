use crate::audio::Waveform;
use crate::defaults;
use crate::error::{NarratorError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// Text to narrate.
    pub text: String,
    /// Conditioning audio; `None` lets the model choose a voice.
    pub reference: Option<Waveform>,
    pub temperature: f32,
    pub top_p: f32,
}

/// Trait for the text-to-speech generation resource.
///
/// The resource is a single loaded model; callers serialize access through
/// the exclusive-access gate. Implementations may fail for any reason and
/// may return empty audio, which callers treat as a failure.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Waveform>;

    /// Name of the model or backend, for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Waveform> {
        (**self).synthesize(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A call observed by [`MockSynthesizer`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub text: String,
    pub reference: Option<Waveform>,
    pub started: Instant,
    pub finished: Instant,
    /// The waveform returned, if the call succeeded.
    pub output: Option<Waveform>,
}

#[derive(Debug, Default)]
struct MockState {
    failing: Vec<String>,
    empty: Vec<String>,
    calls: Vec<RecordedCall>,
}

/// Mock generation resource for testing.
///
/// Each successful call returns a constant waveform whose level is unique to
/// the call (`(n + 1) / 1000` for the n-th call), so tests can tell which
/// call produced which artifact. Clones share state.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    name: String,
    sample_rate: u32,
    samples_per_call: usize,
    latency: Duration,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new("mock-tts")
    }
}

impl MockSynthesizer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sample_rate: defaults::SAMPLE_RATE,
            samples_per_call: 240,
            latency: Duration::ZERO,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Fail every call whose text contains `pattern`.
    pub fn with_failure_on(self, pattern: &str) -> Self {
        self.lock().failing.push(pattern.to_string());
        self
    }

    /// Return zero samples for every call whose text contains `pattern`.
    pub fn with_empty_output_on(self, pattern: &str) -> Self {
        self.lock().empty.push(pattern.to_string());
        self
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_samples_per_call(mut self, samples: usize) -> Self {
        self.samples_per_call = samples;
        self
    }

    /// Drop all configured failures and empty outputs.
    pub fn heal(&self) {
        let mut state = self.lock();
        state.failing.clear();
        state.empty.clear();
    }

    /// Every call so far, in call order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Waveform> {
        let started = Instant::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.lock();
        let n = state.calls.len();
        let result = if state.failing.iter().any(|p| request.text.contains(p)) {
            Err(NarratorError::Generation {
                message: "mock generation failure".to_string(),
            })
        } else if state.empty.iter().any(|p| request.text.contains(p)) {
            Ok(Waveform::new(Vec::new(), self.sample_rate))
        } else {
            let level = (n + 1) as f32 / 1000.0;
            Ok(Waveform::new(
                vec![level; self.samples_per_call],
                self.sample_rate,
            ))
        };

        state.calls.push(RecordedCall {
            text: request.text,
            reference: request.reference,
            started,
            finished: Instant::now(),
            output: result.as_ref().ok().cloned(),
        });
        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}
