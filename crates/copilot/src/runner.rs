//! Simulated drive
//!
//! Moves a virtual vehicle along the loaded route at constant speed on a
//! tokio interval, ticking the session and delivering every callout.

use crate::announcer::SpeechCompletion;
use crate::config::SimulationConfig;
use crate::error::Result;
use crate::session::Session;
use callout_scheduler::{Announcer, CalloutKind, Priority, SchedulerStats};
use curve_detection::EventId;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// One issued callout
#[derive(Debug, Clone, Serialize)]
pub struct CalloutRecord {
    pub timestamp_ms: u64,
    pub distance_m: f64,
    pub kind: CalloutKind,
    pub priority: Priority,
    pub text: String,
    pub source_event_id: Option<EventId>,
    pub compound_event_id: Option<EventId>,
    pub delivered: bool,
}

/// Outcome of a simulated drive
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub route_length_m: f64,
    pub ticks: u64,
    pub callouts: Vec<CalloutRecord>,
    pub rejected_updates: u64,
    pub completions: u64,
    pub stale_completions: u64,
    pub scheduler: SchedulerStats,
}

impl SimulationReport {
    /// MAIN callouts covering `id`, compound partners included
    pub fn mains_for(&self, id: EventId) -> usize {
        self.callouts
            .iter()
            .filter(|c| c.kind == CalloutKind::Main)
            .filter(|c| c.source_event_id == Some(id) || c.compound_event_id == Some(id))
            .count()
    }
}

/// Drive the loaded route to the end.
///
/// `completions` carries speech results from an asynchronous announcer;
/// pass `None` for announcers that finish synchronously.
pub async fn run_simulation<A: Announcer>(
    session: &mut Session,
    config: &SimulationConfig,
    announcer: &mut A,
    mut completions: Option<&mut mpsc::Receiver<SpeechCompletion>>,
) -> Result<SimulationReport> {
    let route = session.require_route()?;
    session.set_time_acceleration(config.time_acceleration);
    let acceleration = session.scheduler().time_acceleration();
    info!(
        "Simulating {:.0} m at {} m/s (x{}), tick {} ms",
        route.length_m, config.speed_mps, acceleration, config.tick_ms
    );

    let mut report = SimulationReport {
        route_length_m: route.length_m,
        ..Default::default()
    };
    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let start = Instant::now();
    let mut tail = 0;

    loop {
        interval.tick().await;
        let now_ms = start.elapsed().as_millis() as u64;

        if let Some(receiver) = completions.as_deref_mut() {
            while let Ok(done) = receiver.try_recv() {
                if session.complete(done.ticket) {
                    report.completions += 1;
                } else if done.ticket.epoch != session.scheduler().epoch() {
                    report.stale_completions += 1;
                }
            }
        }

        let travelled = now_ms as f64 / 1_000.0 * config.speed_mps * acceleration;
        let distance = travelled.min(route.length_m);
        let fraction = if route.length_m > 0.0 {
            distance / route.length_m
        } else {
            1.0
        };
        if let Err(rejected) = session.on_simulated_progress(fraction, config.speed_mps, now_ms) {
            report.rejected_updates += 1;
            debug!("Simulated progress rejected: {}", rejected);
        }

        report.ticks += 1;
        if let Some(command) = session.tick(now_ms) {
            let delivered = session.deliver(&command, announcer).is_ok();
            report.callouts.push(CalloutRecord {
                timestamp_ms: now_ms,
                distance_m: distance,
                kind: command.kind,
                priority: command.priority,
                text: command.text,
                source_event_id: command.source_event_id,
                compound_event_id: command.compound_event_id,
                delivered,
            });
        }

        if distance >= route.length_m {
            tail += 1;
            if tail > config.tail_ticks {
                break;
            }
        }
    }

    report.scheduler = session.scheduler().stats().clone();
    info!(
        "Simulation finished: {} ticks, {} callouts, {} throttled",
        report.ticks,
        report.callouts.len(),
        report.scheduler.throttled
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announcer::{spawn_speaker, LogAnnouncer, SpeakerConfig};
    use crate::config::CopilotConfig;
    use crate::error::CopilotError;
    use crate::route::demo_route;
    use crate::session::RouteEvents;
    use curve_detection::EventSource;

    fn loaded_session() -> Session {
        let mut session = Session::new(CopilotConfig::default());
        session.load_route(&demo_route()).unwrap();
        session
    }

    fn curve_ids(session: &Session) -> Vec<EventId> {
        match session.events() {
            Some(RouteEvents::Curves(events)) => events.iter().map(|e| e.id()).collect(),
            _ => Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_route() {
        let mut session = Session::new(CopilotConfig::default());
        let result = run_simulation(
            &mut session,
            &SimulationConfig::default(),
            &mut LogAnnouncer::new(),
            None,
        )
        .await;
        assert!(matches!(result, Err(CopilotError::NoRoute)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_drive_announces_every_curve_once() {
        let mut session = loaded_session();
        let config = SimulationConfig {
            speed_mps: 30.0,
            tick_ms: 100,
            time_acceleration: 10.0,
            tail_ticks: 20,
        };
        let mut announcer = LogAnnouncer::new();

        let report = run_simulation(&mut session, &config, &mut announcer, None)
            .await
            .unwrap();

        let ids = curve_ids(&session);
        assert!(ids.len() >= 5);
        for id in ids {
            assert_eq!(report.mains_for(id), 1, "MAIN count for {}", id);
        }
        assert!(report.callouts.iter().all(|c| c.delivered));
        assert_eq!(announcer.spoken(), report.callouts.len());
        assert_eq!(report.scheduler.inconsistencies, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_with_async_speaker() {
        let mut session = loaded_session();
        let config = SimulationConfig {
            speed_mps: 25.0,
            tick_ms: 200,
            time_acceleration: 4.0,
            tail_ticks: 30,
        };
        let (mut speaker, mut completions, _task) = spawn_speaker(SpeakerConfig::default());

        let report = run_simulation(&mut session, &config, &mut speaker, Some(&mut completions))
            .await
            .unwrap();

        assert!(!report.callouts.is_empty());
        assert!(report.completions > 0);
        assert_eq!(report.stale_completions, 0);
        for id in curve_ids(&session) {
            assert_eq!(report.mains_for(id), 1, "MAIN count for {}", id);
        }
    }
}
