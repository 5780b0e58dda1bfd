//! Announcers
//!
//! `LogAnnouncer` speaks into the log and finishes instantly. The speaker
//! task simulates speech timing on tokio and reports completions back over
//! a channel, with a watchdog that cuts off over-long utterances.

use callout_scheduler::{Announcer, CalloutCommand, Priority, SpeechTicket};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Writes callouts to the log
#[derive(Debug, Default)]
pub struct LogAnnouncer {
    spoken: usize,
}

impl LogAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> usize {
        self.spoken
    }
}

impl Announcer for LogAnnouncer {
    fn announce(&mut self, text: &str, priority: Priority) -> bool {
        self.spoken += 1;
        info!("[{:?}] {}", priority, text);
        true
    }

    fn vibrate(&mut self, pattern: &[Duration]) {
        debug!("Haptic pattern: {} pulses", pattern.len().div_ceil(2));
    }
}

/// Speaker timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    /// Speaking rate (default: 170 words per minute)
    pub words_per_minute: f64,
    /// Watchdog: utterances are cut off after this long (default: 4 s)
    pub max_utterance_ms: u64,
    /// Request queue depth (default: 8)
    pub queue_depth: usize,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            words_per_minute: 170.0,
            max_utterance_ms: 4_000,
            queue_depth: 8,
        }
    }
}

impl SpeakerConfig {
    /// Time needed to say `text`
    pub fn speech_duration(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count().max(1) as f64;
        let rate = self.words_per_minute.max(1.0);
        Duration::from_millis((words * 60_000.0 / rate).round() as u64)
    }
}

/// How an utterance ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechOutcome {
    Finished,
    /// Cut off by a newer request
    Interrupted,
    /// Cut off by the watchdog
    TimedOut,
}

impl SpeechOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeechOutcome::Finished => "finished",
            SpeechOutcome::Interrupted => "interrupted",
            SpeechOutcome::TimedOut => "timed_out",
        }
    }
}

/// Completion report for one ticketed utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechCompletion {
    pub ticket: SpeechTicket,
    pub outcome: SpeechOutcome,
}

#[derive(Debug)]
struct SpeakRequest {
    text: String,
    priority: Priority,
    ticket: Option<SpeechTicket>,
}

/// Sending side of the speaker task
#[derive(Debug, Clone)]
pub struct SpeakerHandle {
    requests: mpsc::Sender<SpeakRequest>,
}

/// Start the speaker task. Completions for ticketed commands arrive on the
/// returned receiver.
pub fn spawn_speaker(
    config: SpeakerConfig,
) -> (
    SpeakerHandle,
    mpsc::Receiver<SpeechCompletion>,
    JoinHandle<()>,
) {
    let (request_tx, request_rx) = mpsc::channel(config.queue_depth.max(1));
    let (completion_tx, completion_rx) = mpsc::channel(config.queue_depth.max(1) * 4);
    info!("Starting speaker task with config: {:?}", config);
    let task = tokio::spawn(run_speaker(config, request_rx, completion_tx));
    (
        SpeakerHandle {
            requests: request_tx,
        },
        completion_rx,
        task,
    )
}

impl SpeakerHandle {
    fn enqueue(&self, request: SpeakRequest) -> bool {
        match self.requests.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(request)) => {
                warn!("Speaker queue full, dropping '{}'", request.text);
                false
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                warn!("Speaker task gone, dropping '{}'", request.text);
                false
            }
        }
    }
}

impl Announcer for SpeakerHandle {
    fn announce(&mut self, text: &str, priority: Priority) -> bool {
        self.enqueue(SpeakRequest {
            text: text.to_string(),
            priority,
            ticket: None,
        })
    }

    fn vibrate(&mut self, pattern: &[Duration]) {
        let total: Duration = pattern.iter().sum();
        debug!("Haptic pattern for {:?}", total);
    }

    fn announce_command(&mut self, command: &CalloutCommand) -> bool {
        self.enqueue(SpeakRequest {
            text: command.text.clone(),
            priority: command.priority,
            ticket: Some(command.ticket),
        })
    }

    fn completes_async(&self) -> bool {
        true
    }
}

/// Speak requests one at a time. A new request cuts off the current one:
/// the scheduler only sends while nothing is in flight, or to preempt.
async fn run_speaker(
    config: SpeakerConfig,
    mut requests: mpsc::Receiver<SpeakRequest>,
    completions: mpsc::Sender<SpeechCompletion>,
) {
    let watchdog = Duration::from_millis(config.max_utterance_ms);
    let mut next = requests.recv().await;

    while let Some(request) = next.take() {
        let needed = config.speech_duration(&request.text);
        let timed_out = needed > watchdog;
        debug!("Speaking [{:?}] '{}' for {:?}", request.priority, request.text, needed);

        let speaking = tokio::time::sleep(needed.min(watchdog));
        tokio::pin!(speaking);

        let outcome = tokio::select! {
            _ = &mut speaking => {
                if timed_out {
                    warn!("Speech watchdog cut off '{}'", request.text);
                    SpeechOutcome::TimedOut
                } else {
                    SpeechOutcome::Finished
                }
            }
            incoming = requests.recv() => match incoming {
                Some(incoming) => {
                    next = Some(incoming);
                    SpeechOutcome::Interrupted
                }
                None => {
                    speaking.as_mut().await;
                    SpeechOutcome::Finished
                }
            },
        };

        metrics::counter!("copilot_speech_total", "outcome" => outcome.as_str()).increment(1);
        if let Some(ticket) = request.ticket {
            if completions
                .send(SpeechCompletion { ticket, outcome })
                .await
                .is_err()
            {
                debug!("Completion receiver dropped");
            }
        }

        if next.is_none() {
            next = requests.recv().await;
        }
    }
    debug!("Speaker task stopped");
}
