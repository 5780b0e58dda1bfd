//! Callout Scheduler Implementation
//!
//! Each event moves through EARLY, MAIN and FINAL warnings as the vehicle
//! closes in. The scheduler dedups those warnings per event, spaces NORMAL
//! callouts with a speed-dependent throttle, lets HIGH callouts preempt
//! speech in flight, and fills long quiet stretches with zone and "clear"
//! announcements.

use crate::announcer::Announcer;
use crate::command::{haptic_pattern, CalloutCommand, CalloutKind, Priority, SpeechTicket};
use crate::error::DeliveryError;
use crate::mode::{Aggressiveness, CalloutWindows, DrivingMode};
use crate::phase::{PhaseMap, WarningPhase};
use crate::phrasebook::{CalloutSubject, Phrasebook, RallyPhrasebook};
use curve_detection::{character_at, zone_at, EventId, EventSource, Zone, ZoneCharacter};
use progress_tracker::{ProgressSource, VehicleState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, trace, warn};

/// Scheduler timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum lookahead for tracked events (default: 2000 m)
    pub horizon_m: f64,
    /// Largest entry-to-entry gap folded into a compound MAIN (default: 150 m)
    pub compound_gap_m: f64,
    /// FINAL is never spoken closer than this (default: 15 m)
    pub final_floor_m: f64,
    /// Severity from which EARLY and FINAL are spoken (default: 4)
    pub hard_severity: u8,
    /// Severity that is always announced at HIGH priority (default: 5)
    pub critical_severity: u8,
    /// Quiet time before "clear" is spoken (default: 20 s)
    pub clear_silence_ms: u64,
    /// Minimum spacing between "clear" callouts (default: 60 s)
    pub clear_interval_ms: u64,
    /// Minimum spacing between zone announcements (default: 10 s)
    pub zone_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            horizon_m: 2_000.0,
            compound_gap_m: 150.0,
            final_floor_m: 15.0,
            hard_severity: 4,
            critical_severity: 5,
            clear_silence_ms: 20_000,
            clear_interval_ms: 60_000,
            zone_interval_ms: 10_000,
        }
    }
}

/// Everything one tick looks at
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a, E> {
    pub vehicle: &'a VehicleState,
    pub events: &'a [E],
    pub zones: &'a [Zone],
    pub now_ms: u64,
}

/// Scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub emitted: u64,
    pub throttled: u64,
    pub busy_dropped: u64,
    pub preempted: u64,
    pub discarded_phases: u64,
    pub malformed_skipped: u64,
    pub stale_completions: u64,
    pub delivery_failures: u64,
    pub inconsistencies: u64,
    pub resets: u64,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: SpeechTicket,
    priority: Priority,
}

/// Everything `reset` throws away
#[derive(Debug, Default)]
struct SessionState {
    phases: PhaseMap,
    last_progress: Option<f64>,
    started_ms: Option<u64>,
    /// Last EARLY/MAIN/FINAL, drives the throttle
    last_callout_ms: Option<u64>,
    /// Last command of any kind
    last_command_ms: Option<u64>,
    last_clear_ms: Option<u64>,
    last_zone_ms: Option<u64>,
    announced_zone: Option<u32>,
    in_flight: Option<InFlight>,
}

/// Outcome of one planning step
enum Plan {
    Emit(CalloutCommand),
    /// A candidate exists but may not speak this tick
    Hold,
    Idle,
}

/// Turns route events plus progress into at most one callout per tick
pub struct CalloutScheduler<P = RallyPhrasebook> {
    config: SchedulerConfig,
    mode: DrivingMode,
    phrasebook: P,
    epoch: u64,
    sequence: u64,
    time_acceleration: f64,
    state: SessionState,
    stats: SchedulerStats,
}

impl CalloutScheduler<RallyPhrasebook> {
    /// Create a scheduler with the default phrasebook
    pub fn new(config: SchedulerConfig, mode: DrivingMode) -> Self {
        Self::with_phrasebook(config, mode, RallyPhrasebook)
    }
}

impl Default for CalloutScheduler<RallyPhrasebook> {
    fn default() -> Self {
        Self::new(SchedulerConfig::default(), DrivingMode::default())
    }
}

impl<P: Phrasebook> CalloutScheduler<P> {
    pub fn with_phrasebook(config: SchedulerConfig, mode: DrivingMode, phrasebook: P) -> Self {
        info!(
            "Creating callout scheduler with config: {:?}, mode: {:?}",
            config, mode
        );
        Self {
            config,
            mode,
            phrasebook,
            epoch: 0,
            sequence: 0,
            time_acceleration: 1.0,
            state: SessionState::default(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn mode(&self) -> &DrivingMode {
        &self.mode
    }

    pub fn set_mode(&mut self, mode: DrivingMode) {
        info!("Driving mode changed: {:?}", mode);
        self.mode = mode;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn phase_of(&self, id: EventId) -> WarningPhase {
        self.state.phases.get(id)
    }

    /// Ticket of the command currently being spoken
    pub fn in_flight(&self) -> Option<SpeechTicket> {
        self.state.in_flight.map(|f| f.ticket)
    }

    pub fn time_acceleration(&self) -> f64 {
        self.time_acceleration
    }

    /// Simulation speed-up; the throttle shrinks accordingly. Values below
    /// 1 (or non-finite) fall back to real time.
    pub fn set_time_acceleration(&mut self, factor: f64) {
        self.time_acceleration = if factor.is_finite() && factor >= 1.0 {
            factor
        } else {
            1.0
        };
        debug!("Time acceleration set to {}", self.time_acceleration);
    }

    /// Minimum spacing between NORMAL callouts at `speed_mps`
    pub fn min_interval_ms(&self, speed_mps: f64) -> u64 {
        let base_ms = if speed_mps >= 27.0 {
            2_000.0
        } else if speed_mps >= 18.0 {
            2_500.0
        } else if speed_mps >= 10.0 {
            3_000.0
        } else {
            3_500.0
        };
        (base_ms * self.mode.aggressiveness.interval_factor() / self.time_acceleration).round()
            as u64
    }

    /// Whether `subject`, lying in a zone of `character`, is worth speaking
    pub fn should_announce(
        &self,
        subject: &CalloutSubject,
        character: ZoneCharacter,
        source: ProgressSource,
    ) -> bool {
        if subject.severity >= self.config.critical_severity {
            return true;
        }
        if subject.is_chicane
            && subject
                .max_child_severity
                .is_some_and(|severity| severity >= self.config.hard_severity)
        {
            return true;
        }

        let mut min = self.mode.min_severity.for_character(character);
        if source == ProgressSource::Live && self.mode.aggressiveness == Aggressiveness::Aggressive
        {
            min = min.min(3);
        }
        subject.severity >= min
    }

    /// Advance the session by one tick. Never fails: anomalies just yield
    /// no command.
    pub fn tick<E: EventSource>(&mut self, input: &TickInput<'_, E>) -> Option<CalloutCommand> {
        self.stats.ticks += 1;
        let now = input.now_ms;
        let vehicle = input.vehicle;
        let progress = vehicle.distance_along_route;
        if !progress.is_finite() {
            debug!("Tick skipped: non-finite progress");
            return None;
        }

        let started = *self.state.started_ms.get_or_insert(now);
        let previous = self
            .state
            .last_progress
            .map_or(progress, |last| last.min(progress));
        self.state.last_progress = Some(progress);

        let windows = CalloutWindows::for_speed(vehicle.speed);
        let horizon = self.config.horizon_m.max(windows.early * 1.5);
        let tracked = self.track_events(input, progress, previous, horizon);

        match self.curve_callout(&tracked, &windows, vehicle.speed, now) {
            Plan::Emit(command) => return Some(command),
            Plan::Hold => return None,
            Plan::Idle => {}
        }
        match self.zone_callout(input.zones, progress, now) {
            Plan::Emit(command) => return Some(command),
            Plan::Hold => return None,
            Plan::Idle => {}
        }
        self.clear_callout(&tracked, &windows, now, started)
    }

    /// Mark the command holding `ticket` as finished speaking.
    ///
    /// Returns `false` for stale epochs and for tickets that are no longer
    /// in flight (e.g. already preempted).
    pub fn complete(&mut self, ticket: SpeechTicket) -> bool {
        if ticket.epoch != self.epoch {
            self.stats.stale_completions += 1;
            debug!(
                "Discarding completion from stale epoch {} (current {})",
                ticket.epoch, self.epoch
            );
            return false;
        }
        match self.state.in_flight {
            Some(flight) if flight.ticket == ticket => {
                self.state.in_flight = None;
                true
            }
            _ => false,
        }
    }

    /// Drop all session state and start a new epoch
    pub fn reset(&mut self) -> u64 {
        self.epoch += 1;
        self.state = SessionState::default();
        self.stats.resets += 1;
        info!("Callout scheduler reset, epoch {}", self.epoch);
        self.epoch
    }

    /// Hand `command` to `announcer`.
    ///
    /// Phases are already committed; a refused command is counted and
    /// dropped, never retried.
    pub fn deliver(
        &mut self,
        command: &CalloutCommand,
        announcer: &mut dyn Announcer,
    ) -> Result<(), DeliveryError> {
        let spoken = announcer.announce_command(command);
        if let Some(pattern) = &command.haptic_pattern {
            announcer.vibrate(pattern);
        }
        if !spoken || !announcer.completes_async() {
            self.complete(command.ticket);
        }
        if spoken {
            return Ok(());
        }

        self.stats.delivery_failures += 1;
        metrics::counter!("copilot_announcer_failures_total").increment(1);
        warn!(
            "Announcer unavailable, dropped {} callout '{}'",
            command.kind, command.text
        );
        Err(DeliveryError::AnnouncerUnavailable(command.text.clone()))
    }

    /// Eligible events in the tracked window, nearest first.
    ///
    /// Events ahead of the previous position are tracked, so an event
    /// crossed during one long step still gets its MAIN. Passed events stay
    /// tracked until that MAIN has been spoken.
    fn track_events<E: EventSource>(
        &mut self,
        input: &TickInput<'_, E>,
        progress: f64,
        previous: f64,
        horizon: f64,
    ) -> Vec<CalloutSubject> {
        let mut tracked = Vec::new();
        let mut keep = HashSet::new();

        for event in input.events {
            let Some(subject) = CalloutSubject::from_event(event, progress) else {
                self.stats.malformed_skipped += 1;
                trace!("Skipping malformed event {}", event.id());
                continue;
            };

            let upcoming = subject.distance > previous && subject.ahead_m <= horizon;
            let owed = subject.distance <= previous
                && self.state.phases.contains(subject.id)
                && self.state.phases.get(subject.id) < WarningPhase::MainDone;
            if !upcoming && !owed {
                continue;
            }

            let character = character_at(input.zones, subject.distance);
            if !self.should_announce(&subject, character, input.vehicle.source) {
                continue;
            }

            keep.insert(subject.id);
            self.state.phases.track(subject.id);
            tracked.push(subject);
        }

        let dropped = self.state.phases.retain_tracked(&keep);
        if dropped > 0 {
            self.stats.discarded_phases += dropped as u64;
            debug!("Discarded phases of {} untracked events", dropped);
        }

        tracked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        tracked
    }

    /// First warning due, nearest event first: `(index, kind, catch_up)`
    fn due_warning(
        &self,
        tracked: &[CalloutSubject],
        windows: &CalloutWindows,
    ) -> Option<(usize, CalloutKind, bool)> {
        tracked.iter().enumerate().find_map(|(i, subject)| {
            let phase = self.state.phases.get(subject.id);
            let d = subject.ahead_m;
            let hard = subject.severity >= self.config.hard_severity;

            if phase < WarningPhase::MainDone && d <= windows.main {
                Some((i, CalloutKind::Main, d <= windows.final_))
            } else if phase == WarningPhase::Unannounced
                && hard
                && d > windows.final_
                && d <= windows.early
            {
                Some((i, CalloutKind::Early, false))
            } else if phase == WarningPhase::MainDone
                && hard
                && d > self.config.final_floor_m
                && d <= windows.final_
            {
                Some((i, CalloutKind::Final, false))
            } else {
                None
            }
        })
    }

    fn curve_callout(
        &mut self,
        tracked: &[CalloutSubject],
        windows: &CalloutWindows,
        speed: f64,
        now: u64,
    ) -> Plan {
        let Some((index, kind, catch_up)) = self.due_warning(tracked, windows) else {
            return Plan::Idle;
        };
        let subject = &tracked[index];

        let priority = match kind {
            CalloutKind::Main if catch_up || subject.severity >= self.config.critical_severity => {
                Priority::High
            }
            CalloutKind::Early | CalloutKind::Main => Priority::Normal,
            _ => Priority::High,
        };
        let Some(preempt) = self.admit(priority, Some(speed), now) else {
            return Plan::Hold;
        };

        let compound = if kind == CalloutKind::Main {
            tracked[index + 1..]
                .iter()
                .find(|next| self.state.phases.get(next.id) < WarningPhase::MainDone)
                .filter(|next| {
                    !next.is_chicane
                        && next.distance - subject.distance <= self.config.compound_gap_m
                })
        } else {
            None
        };

        let text = match compound {
            Some(next) => self.phrasebook.render_compound(subject, next, &self.mode),
            None => self.phrasebook.render(subject, kind, &self.mode),
        };

        let target = match kind {
            CalloutKind::Early => WarningPhase::EarlyDone,
            CalloutKind::Main => WarningPhase::MainDone,
            _ => WarningPhase::FinalDone,
        };
        self.commit_phase(subject.id, target);
        if let Some(next) = compound {
            self.commit_phase(next.id, WarningPhase::MainDone);
        }

        let haptic = (kind == CalloutKind::Main && self.mode.haptic_enabled)
            .then(|| haptic_pattern(subject.severity));
        if catch_up {
            debug!(
                "Catch-up MAIN for {} at {:.0} m",
                subject.id, subject.ahead_m
            );
        }

        self.state.last_callout_ms = Some(now);
        Plan::Emit(self.issue(IssueRequest {
            text,
            priority,
            kind,
            haptic_pattern: haptic,
            source_event_id: Some(subject.id),
            compound_event_id: compound.map(|next| next.id),
            preempt,
            now,
        }))
    }

    fn zone_callout(&mut self, zones: &[Zone], progress: f64, now: u64) -> Plan {
        let Some(zone) = zone_at(zones, progress) else {
            return Plan::Idle;
        };
        if self.state.announced_zone == Some(zone.id) {
            return Plan::Idle;
        }
        if let Some(last) = self.state.last_zone_ms {
            if now.saturating_sub(last) < self.config.zone_interval_ms {
                trace!("Zone {} announcement pending", zone.id);
                return Plan::Hold;
            }
        }
        if self.admit(Priority::Low, None, now).is_none() {
            return Plan::Hold;
        }

        let text = self.phrasebook.render_zone(zone, &self.mode);
        self.state.announced_zone = Some(zone.id);
        self.state.last_zone_ms = Some(now);
        Plan::Emit(self.issue(IssueRequest {
            text,
            priority: Priority::Low,
            kind: CalloutKind::Zone,
            haptic_pattern: None,
            source_event_id: None,
            compound_event_id: None,
            preempt: false,
            now,
        }))
    }

    fn clear_callout(
        &mut self,
        tracked: &[CalloutSubject],
        windows: &CalloutWindows,
        now: u64,
        started: u64,
    ) -> Option<CalloutCommand> {
        if !self.mode.chatter_enabled {
            return None;
        }
        if tracked.iter().any(|s| s.ahead_m <= windows.early) {
            return None;
        }
        let silent_for = now.saturating_sub(self.state.last_command_ms.unwrap_or(started));
        if silent_for < self.config.clear_silence_ms {
            return None;
        }
        if let Some(last) = self.state.last_clear_ms {
            if now.saturating_sub(last) < self.config.clear_interval_ms {
                return None;
            }
        }
        self.admit(Priority::Low, None, now)?;

        let text = self.phrasebook.render_clear(&self.mode);
        self.state.last_clear_ms = Some(now);
        Some(self.issue(IssueRequest {
            text,
            priority: Priority::Low,
            kind: CalloutKind::Clear,
            haptic_pattern: None,
            source_event_id: None,
            compound_event_id: None,
            preempt: false,
            now,
        }))
    }

    /// Throttle and in-flight gate. `Some(preempt)` when the command may
    /// be issued. The throttle only applies to NORMAL curve callouts
    /// (`speed` given).
    fn admit(&mut self, priority: Priority, speed: Option<f64>, now: u64) -> Option<bool> {
        if let (Priority::Normal, Some(speed), Some(last)) =
            (priority, speed, self.state.last_callout_ms)
        {
            let interval = self.min_interval_ms(speed);
            if now.saturating_sub(last) < interval {
                self.stats.throttled += 1;
                suppressed("throttled");
                debug!(
                    "Callout throttled: {} ms since last < {} ms",
                    now.saturating_sub(last),
                    interval
                );
                return None;
            }
        }

        match self.state.in_flight {
            Some(flight) if priority == Priority::High => {
                self.stats.preempted += 1;
                debug!(
                    "Preempting {:?} callout {:?}",
                    flight.priority, flight.ticket
                );
                Some(true)
            }
            Some(flight) => {
                self.stats.busy_dropped += 1;
                suppressed("busy");
                debug!(
                    "{:?} callout held: {:?} still speaking",
                    priority, flight.ticket
                );
                None
            }
            None => Some(false),
        }
    }

    fn commit_phase(&mut self, id: EventId, to: WarningPhase) {
        if let Err(err) = self.state.phases.advance(id, to) {
            self.stats.inconsistencies += 1;
            warn!("{}", err);
            debug_assert!(false, "{}", err);
        }
    }

    fn issue(&mut self, request: IssueRequest) -> CalloutCommand {
        self.sequence += 1;
        let ticket = SpeechTicket {
            epoch: self.epoch,
            sequence: self.sequence,
        };
        self.state.in_flight = Some(InFlight {
            ticket,
            priority: request.priority,
        });
        self.state.last_command_ms = Some(request.now);
        self.stats.emitted += 1;
        metrics::counter!("copilot_callouts_emitted_total", "phase" => request.kind.as_str())
            .increment(1);
        debug!(
            "Issuing {} callout '{}' ({:?})",
            request.kind, request.text, request.priority
        );

        CalloutCommand {
            text: request.text,
            priority: request.priority,
            kind: request.kind,
            haptic_pattern: request.haptic_pattern,
            source_event_id: request.source_event_id,
            compound_event_id: request.compound_event_id,
            preempt: request.preempt,
            timestamp_ms: request.now,
            ticket,
        }
    }
}

struct IssueRequest {
    text: String,
    priority: Priority,
    kind: CalloutKind,
    haptic_pattern: Option<Vec<std::time::Duration>>,
    source_event_id: Option<EventId>,
    compound_event_id: Option<EventId>,
    preempt: bool,
    now: u64,
}

fn suppressed(reason: &'static str) {
    metrics::counter!("copilot_callouts_suppressed_total", "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve_detection::{Direction, Modifier};
    use proptest::prelude::*;
    use route_geometry::GeoPoint;

    #[derive(Debug, Clone)]
    struct TestEvent {
        id: u32,
        distance: f64,
        severity: u8,
        direction: Direction,
        parts: Vec<(Direction, u8)>,
    }

    impl TestEvent {
        fn new(id: u32, distance: f64, severity: u8) -> Self {
            Self {
                id,
                distance,
                severity,
                direction: Direction::Right,
                parts: Vec::new(),
            }
        }

        fn left(mut self) -> Self {
            self.direction = Direction::Left;
            self
        }

        fn chicane(mut self, parts: Vec<(Direction, u8)>) -> Self {
            self.parts = parts;
            self
        }
    }

    impl EventSource for TestEvent {
        fn id(&self) -> EventId {
            EventId::Curve(self.id)
        }

        fn distance(&self) -> Option<f64> {
            (self.distance.is_finite() && self.distance >= 0.0).then_some(self.distance)
        }

        fn severity(&self) -> Option<u8> {
            (1..=6).contains(&self.severity).then_some(self.severity)
        }

        fn direction(&self) -> Direction {
            self.direction
        }

        fn angle_degrees(&self) -> f64 {
            45.0
        }

        fn modifier(&self) -> Modifier {
            if self.parts.is_empty() {
                Modifier::None
            } else {
                Modifier::Caution
            }
        }

        fn is_chicane(&self) -> bool {
            !self.parts.is_empty()
        }

        fn chicane_parts(&self) -> Vec<(Direction, u8)> {
            self.parts.clone()
        }
    }

    fn vehicle(progress: f64, speed: f64, source: ProgressSource) -> VehicleState {
        VehicleState {
            position: GeoPoint::new(0.0, 0.0),
            heading: 0.0,
            speed,
            distance_along_route: progress,
            timestamp_ms: 0,
            source,
        }
    }

    fn quiet_mode() -> DrivingMode {
        DrivingMode {
            chatter_enabled: false,
            ..Default::default()
        }
    }

    fn quiet_scheduler() -> CalloutScheduler {
        CalloutScheduler::new(SchedulerConfig::default(), quiet_mode())
    }

    /// Tick without completing speech
    fn tick_only(
        scheduler: &mut CalloutScheduler,
        events: &[TestEvent],
        zones: &[Zone],
        progress: f64,
        speed: f64,
        now_ms: u64,
    ) -> Option<CalloutCommand> {
        let vehicle = vehicle(progress, speed, ProgressSource::Simulation);
        scheduler.tick(&TickInput {
            vehicle: &vehicle,
            events,
            zones,
            now_ms,
        })
    }

    /// Tick with an announcer that finishes instantly
    fn drive(
        scheduler: &mut CalloutScheduler,
        events: &[TestEvent],
        progress: f64,
        speed: f64,
        now_ms: u64,
    ) -> Option<CalloutCommand> {
        let command = tick_only(scheduler, events, &[], progress, speed, now_ms);
        if let Some(command) = &command {
            scheduler.complete(command.ticket);
        }
        command
    }

    struct RecordingAnnouncer {
        available: bool,
        spoken: Vec<String>,
        vibrations: usize,
    }

    impl Announcer for RecordingAnnouncer {
        fn announce(&mut self, text: &str, _priority: Priority) -> bool {
            if self.available {
                self.spoken.push(text.to_string());
            }
            self.available
        }

        fn vibrate(&mut self, _pattern: &[std::time::Duration]) {
            self.vibrations += 1;
        }
    }

    #[test]
    fn test_windows_at_30_mps() {
        let mut scheduler = quiet_scheduler();
        let events = vec![TestEvent::new(1, 1_000.0, 3)];

        assert!(drive(&mut scheduler, &events, 750.0, 30.0, 0).is_none());
        assert!(drive(&mut scheduler, &events, 790.0, 30.0, 5_000).is_none());

        let main = drive(&mut scheduler, &events, 810.0, 30.0, 10_000).unwrap();
        assert_eq!(main.kind, CalloutKind::Main);
        assert_eq!(main.priority, Priority::Normal);
        assert_eq!(main.text, "right 3");
        assert_eq!(main.source_event_id, Some(EventId::Curve(1)));
        assert!(main.haptic_pattern.is_some());
        assert_eq!(scheduler.phase_of(EventId::Curve(1)), WarningPhase::MainDone);
    }

    #[test]
    fn test_hard_curve_full_sequence() {
        let mut scheduler = quiet_scheduler();
        let events = vec![TestEvent::new(1, 1_000.0, 4)];

        assert!(drive(&mut scheduler, &events, 550.0, 30.0, 0).is_none());

        let early = drive(&mut scheduler, &events, 620.0, 30.0, 5_000).unwrap();
        assert_eq!(early.kind, CalloutKind::Early);
        assert_eq!(early.priority, Priority::Normal);
        assert_eq!(early.text, "caution, right 4 in 400 meters");
        assert!(early.haptic_pattern.is_none());

        let main = drive(&mut scheduler, &events, 810.0, 30.0, 10_000).unwrap();
        assert_eq!(main.kind, CalloutKind::Main);

        let last = drive(&mut scheduler, &events, 960.0, 30.0, 15_000).unwrap();
        assert_eq!(last.kind, CalloutKind::Final);
        assert_eq!(last.priority, Priority::High);
        assert_eq!(last.text, "right 4 now");

        assert!(drive(&mut scheduler, &events, 990.0, 30.0, 20_000).is_none());
        assert_eq!(scheduler.phase_of(EventId::Curve(1)), WarningPhase::FinalDone);
    }

    #[test]
    fn test_final_not_spoken_inside_floor() {
        let mut scheduler = quiet_scheduler();
        let events = vec![TestEvent::new(1, 1_000.0, 4)];

        drive(&mut scheduler, &events, 810.0, 30.0, 0).unwrap();
        assert!(drive(&mut scheduler, &events, 990.0, 30.0, 5_000).is_none());
        assert_eq!(scheduler.phase_of(EventId::Curve(1)), WarningPhase::MainDone);
    }

    #[test]
    fn test_compound_main() {
        let mut scheduler = quiet_scheduler();
        let events = vec![
            TestEvent::new(1, 300.0, 3),
            TestEvent::new(2, 400.0, 3).left(),
        ];

        let main = drive(&mut scheduler, &events, 150.0, 20.0, 0).unwrap();
        assert_eq!(main.kind, CalloutKind::Main);
        assert_eq!(main.source_event_id, Some(EventId::Curve(1)));
        assert_eq!(main.compound_event_id, Some(EventId::Curve(2)));
        assert_eq!(main.text, "right 3 into left 3");
        assert_eq!(scheduler.phase_of(EventId::Curve(2)), WarningPhase::MainDone);

        assert!(drive(&mut scheduler, &events, 250.0, 20.0, 5_000).is_none());
    }

    #[test]
    fn test_no_compound_into_chicane() {
        let mut scheduler = quiet_scheduler();
        let events = vec![
            TestEvent::new(1, 300.0, 3),
            TestEvent::new(2, 400.0, 4)
                .left()
                .chicane(vec![(Direction::Left, 3), (Direction::Right, 4)]),
        ];

        let main = drive(&mut scheduler, &events, 150.0, 20.0, 0).unwrap();
        assert_eq!(main.compound_event_id, None);
        assert_eq!(
            scheduler.phase_of(EventId::Curve(2)),
            WarningPhase::Unannounced
        );
    }

    #[test]
    fn test_catch_up_after_jump() {
        let mut scheduler = quiet_scheduler();
        let events = vec![TestEvent::new(1, 1_000.0, 3)];

        assert!(drive(&mut scheduler, &events, 0.0, 25.0, 0).is_none());

        let main = drive(&mut scheduler, &events, 1_300.0, 25.0, 1_000).unwrap();
        assert_eq!(main.kind, CalloutKind::Main);
        assert_eq!(main.priority, Priority::High);
        assert_eq!(scheduler.phase_of(EventId::Curve(1)), WarningPhase::MainDone);

        assert!(drive(&mut scheduler, &events, 1_800.0, 25.0, 2_000).is_none());
        assert_eq!(
            scheduler.phase_of(EventId::Curve(1)),
            WarningPhase::Unannounced
        );
        assert!(scheduler.stats().discarded_phases >= 1);
    }

    #[test]
    fn test_owed_mains_flush_one_per_tick() {
        let mut scheduler = quiet_scheduler();
        let events = vec![
            TestEvent::new(1, 1_000.0, 3),
            TestEvent::new(2, 1_200.0, 3),
            TestEvent::new(3, 1_400.0, 3),
        ];

        assert!(drive(&mut scheduler, &events, 0.0, 25.0, 0).is_none());
        let ids: Vec<_> = (1..=3)
            .filter_map(|i| drive(&mut scheduler, &events, 2_000.0, 25.0, i * 1_000))
            .map(|c| c.source_event_id)
            .collect();
        assert_eq!(
            ids,
            vec![
                Some(EventId::Curve(1)),
                Some(EventId::Curve(2)),
                Some(EventId::Curve(3))
            ]
        );
        assert!(drive(&mut scheduler, &events, 2_000.0, 25.0, 5_000).is_none());
    }

    #[test]
    fn test_normal_callout_throttled() {
        let mut scheduler = quiet_scheduler();
        let events = vec![TestEvent::new(1, 1_000.0, 3), TestEvent::new(2, 1_300.0, 3)];

        assert!(drive(&mut scheduler, &events, 810.0, 20.0, 0).is_some());
        assert!(drive(&mut scheduler, &events, 1_110.0, 20.0, 1_000).is_none());
        assert_eq!(scheduler.stats().throttled, 1);

        let main = drive(&mut scheduler, &events, 1_120.0, 20.0, 3_000).unwrap();
        assert_eq!(main.source_event_id, Some(EventId::Curve(2)));
    }

    #[test]
    fn test_high_preempts_in_flight() {
        let mut scheduler = quiet_scheduler();
        let events = vec![TestEvent::new(1, 1_000.0, 3), TestEvent::new(2, 1_200.0, 5)];

        let first = tick_only(&mut scheduler, &events, &[], 810.0, 20.0, 0).unwrap();
        assert_eq!(first.source_event_id, Some(EventId::Curve(1)));
        assert!(!first.preempt);

        let second = tick_only(&mut scheduler, &events, &[], 1_005.0, 20.0, 1_000).unwrap();
        assert_eq!(second.source_event_id, Some(EventId::Curve(2)));
        assert_eq!(second.priority, Priority::High);
        assert!(second.preempt);

        // The preempted command's completion must not clear the new one
        assert!(!scheduler.complete(first.ticket));
        assert_eq!(scheduler.in_flight(), Some(second.ticket));
        assert!(scheduler.complete(second.ticket));
    }

    #[test]
    fn test_normal_held_while_speaking() {
        let mut scheduler = quiet_scheduler();
        let events = vec![TestEvent::new(1, 1_000.0, 3), TestEvent::new(2, 1_300.0, 3)];

        let first = tick_only(&mut scheduler, &events, &[], 810.0, 20.0, 0).unwrap();
        assert!(tick_only(&mut scheduler, &events, &[], 1_110.0, 20.0, 5_000).is_none());
        assert_eq!(scheduler.stats().busy_dropped, 1);
        assert_eq!(
            scheduler.phase_of(EventId::Curve(2)),
            WarningPhase::Unannounced
        );

        assert!(scheduler.complete(first.ticket));
        let second = tick_only(&mut scheduler, &events, &[], 1_115.0, 20.0, 6_000).unwrap();
        assert_eq!(second.source_event_id, Some(EventId::Curve(2)));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let mut scheduler = quiet_scheduler();
        let events = vec![TestEvent::new(1, 1_000.0, 3), TestEvent::new(2, 3_000.0, 4)];

        assert!(drive(&mut scheduler, &events, 810.0, 20.0, 0).is_some());
        assert!(drive(&mut scheduler, &events, 810.0, 20.0, 10_000).is_none());

        assert!(drive(&mut scheduler, &events, 2_810.0, 20.0, 20_000).is_some());
        let last = drive(&mut scheduler, &events, 2_960.0, 20.0, 30_000).unwrap();
        assert_eq!(last.kind, CalloutKind::Final);
        assert!(drive(&mut scheduler, &events, 2_960.0, 20.0, 40_000).is_none());
    }

    #[test]
    fn test_reset_starts_new_epoch() {
        let mut scheduler = quiet_scheduler();
        let events = vec![TestEvent::new(1, 1_000.0, 3)];

        let main = tick_only(&mut scheduler, &events, &[], 810.0, 20.0, 0).unwrap();
        assert_eq!(main.ticket.epoch, 0);

        assert_eq!(scheduler.reset(), 1);
        assert_eq!(
            scheduler.phase_of(EventId::Curve(1)),
            WarningPhase::Unannounced
        );
        assert_eq!(scheduler.in_flight(), None);

        assert!(!scheduler.complete(main.ticket));
        assert_eq!(scheduler.stats().stale_completions, 1);

        // Same route again from the same spot: announced afresh
        let again = tick_only(&mut scheduler, &events, &[], 810.0, 20.0, 100).unwrap();
        assert_eq!(again.ticket.epoch, 1);
    }

    #[test]
    fn test_zone_announced_once_per_transition() {
        let mut scheduler = quiet_scheduler();
        let zones = vec![
            Zone {
                id: 1,
                character: ZoneCharacter::Technical,
                start_distance: 0.0,
                end_distance: 500.0,
            },
            Zone {
                id: 2,
                character: ZoneCharacter::Urban,
                start_distance: 500.0,
                end_distance: 2_000.0,
            },
        ];
        let events: Vec<TestEvent> = Vec::new();

        let zone = tick_only(&mut scheduler, &events, &zones, 10.0, 15.0, 0).unwrap();
        assert_eq!(zone.kind, CalloutKind::Zone);
        assert_eq!(zone.priority, Priority::Low);
        assert_eq!(zone.text, "technical section");
        scheduler.complete(zone.ticket);

        assert!(tick_only(&mut scheduler, &events, &zones, 100.0, 15.0, 1_000).is_none());
        // Second transition waits out the zone interval
        assert!(tick_only(&mut scheduler, &events, &zones, 600.0, 15.0, 2_000).is_none());

        let urban = tick_only(&mut scheduler, &events, &zones, 700.0, 15.0, 12_000).unwrap();
        assert_eq!(urban.text, "urban section");
    }

    #[test]
    fn test_clear_after_silence() {
        let mut scheduler = CalloutScheduler::default();
        let events: Vec<TestEvent> = Vec::new();

        assert!(drive(&mut scheduler, &events, 0.0, 20.0, 0).is_none());
        let clear = drive(&mut scheduler, &events, 400.0, 20.0, 21_000).unwrap();
        assert_eq!(clear.kind, CalloutKind::Clear);
        assert_eq!(clear.text, "clear");
        assert_eq!(clear.priority, Priority::Low);

        assert!(drive(&mut scheduler, &events, 600.0, 20.0, 30_000).is_none());
        assert!(drive(&mut scheduler, &events, 1_600.0, 20.0, 82_000).is_some());
    }

    #[test]
    fn test_no_clear_near_curve() {
        let mut scheduler = CalloutScheduler::default();
        let events = vec![TestEvent::new(1, 1_000.0, 3)];

        assert!(drive(&mut scheduler, &events, 0.0, 20.0, 0).is_none());
        assert!(drive(&mut scheduler, &events, 700.0, 20.0, 30_000).is_none());
    }

    #[test]
    fn test_eligibility_rules() {
        let mode = DrivingMode {
            min_severity: crate::mode::SeverityTable {
                technical: 2,
                transit: 3,
                urban: 5,
            },
            ..Default::default()
        };
        let scheduler = CalloutScheduler::new(SchedulerConfig::default(), mode);
        let sim = ProgressSource::Simulation;

        let plain = CalloutSubject::from_event(&TestEvent::new(1, 100.0, 4), 0.0).unwrap();
        assert!(!scheduler.should_announce(&plain, ZoneCharacter::Urban, sim));
        assert!(scheduler.should_announce(&plain, ZoneCharacter::Transit, sim));

        let chicane = TestEvent::new(2, 100.0, 4)
            .chicane(vec![(Direction::Right, 3), (Direction::Left, 4)]);
        let chicane = CalloutSubject::from_event(&chicane, 0.0).unwrap();
        assert_eq!(chicane.max_child_severity, Some(4));
        assert!(scheduler.should_announce(&chicane, ZoneCharacter::Urban, sim));

        let mild = TestEvent::new(4, 100.0, 3)
            .chicane(vec![(Direction::Right, 3), (Direction::Left, 3)]);
        let mild = CalloutSubject::from_event(&mild, 0.0).unwrap();
        assert!(!scheduler.should_announce(&mild, ZoneCharacter::Urban, sim));

        let critical = CalloutSubject::from_event(&TestEvent::new(3, 100.0, 5), 0.0).unwrap();
        assert!(scheduler.should_announce(&critical, ZoneCharacter::Urban, sim));
    }

    #[test]
    fn test_live_aggressive_override() {
        let scheduler =
            CalloutScheduler::new(SchedulerConfig::default(), DrivingMode::aggressive());
        let subject = CalloutSubject::from_event(&TestEvent::new(1, 100.0, 3), 0.0).unwrap();
        let urban = ZoneCharacter::Urban;

        assert!(!scheduler.should_announce(&subject, urban, ProgressSource::Simulation));
        assert!(scheduler.should_announce(&subject, urban, ProgressSource::Live));
    }

    #[test]
    fn test_min_interval_bands() {
        let mut scheduler = quiet_scheduler();
        assert_eq!(scheduler.min_interval_ms(30.0), 2_000);
        assert_eq!(scheduler.min_interval_ms(20.0), 2_500);
        assert_eq!(scheduler.min_interval_ms(12.0), 3_000);
        assert_eq!(scheduler.min_interval_ms(5.0), 3_500);

        scheduler.set_time_acceleration(5.0);
        assert_eq!(scheduler.min_interval_ms(20.0), 500);
        scheduler.set_time_acceleration(0.5);
        assert_eq!(scheduler.min_interval_ms(20.0), 2_500);

        scheduler.set_mode(DrivingMode::aggressive());
        assert_eq!(scheduler.min_interval_ms(20.0), 2_000);
        scheduler.set_mode(DrivingMode::conservative());
        assert_eq!(scheduler.min_interval_ms(30.0), 2_500);
    }

    #[test]
    fn test_malformed_events_skipped() {
        let mut scheduler = quiet_scheduler();
        let events = vec![
            TestEvent::new(1, 1_000.0, 0),
            TestEvent::new(2, f64::NAN, 4),
        ];
        assert!(drive(&mut scheduler, &events, 900.0, 20.0, 0).is_none());
        assert_eq!(scheduler.stats().malformed_skipped, 2);
    }

    #[test]
    fn test_non_finite_progress_is_ignored() {
        let mut scheduler = quiet_scheduler();
        let events = vec![TestEvent::new(1, 1_000.0, 6)];
        assert!(drive(&mut scheduler, &events, f64::NAN, 20.0, 0).is_none());
    }

    #[test]
    fn test_delivery() {
        let mut scheduler = quiet_scheduler();
        let events = vec![TestEvent::new(1, 1_000.0, 4), TestEvent::new(2, 2_000.0, 3)];
        let mut announcer = RecordingAnnouncer {
            available: true,
            spoken: Vec::new(),
            vibrations: 0,
        };

        let main = tick_only(&mut scheduler, &events, &[], 810.0, 20.0, 0).unwrap();
        assert!(scheduler.deliver(&main, &mut announcer).is_ok());
        assert_eq!(announcer.spoken, vec!["right 4".to_string()]);
        assert_eq!(announcer.vibrations, 1);
        assert_eq!(scheduler.in_flight(), None);

        announcer.available = false;
        let next = tick_only(&mut scheduler, &events, &[], 1_810.0, 20.0, 10_000).unwrap();
        assert_eq!(
            scheduler.deliver(&next, &mut announcer),
            Err(DeliveryError::AnnouncerUnavailable("right 3".to_string()))
        );
        assert_eq!(scheduler.phase_of(EventId::Curve(2)), WarningPhase::MainDone);
        assert_eq!(scheduler.in_flight(), None);
        assert_eq!(scheduler.stats().delivery_failures, 1);
    }

    #[test]
    fn test_accelerated_500m_jumps() {
        let mut scheduler = quiet_scheduler();
        scheduler.set_time_acceleration(10.0);
        let events: Vec<_> = (0..8)
            .map(|i| TestEvent::new(i, 700.0 + 650.0 * i as f64, 3 + (i % 4) as u8))
            .collect();

        let mut mains = Vec::new();
        for step in 0..20u64 {
            if let Some(c) = drive(&mut scheduler, &events, step as f64 * 500.0, 25.0, step * 100)
            {
                if c.kind == CalloutKind::Main {
                    mains.push(c.source_event_id);
                }
            }
        }
        mains.sort();
        let expected: Vec<_> = (0..8).map(|i| Some(EventId::Curve(i))).collect();
        assert_eq!(mains, expected);
    }

    fn main_count(log: &[CalloutCommand], id: EventId) -> usize {
        log.iter()
            .filter(|c| c.kind == CalloutKind::Main)
            .filter(|c| c.source_event_id == Some(id) || c.compound_event_id == Some(id))
            .count()
    }

    fn position_of(log: &[CalloutCommand], id: EventId, kind: CalloutKind) -> Vec<usize> {
        log.iter()
            .enumerate()
            .filter(|(_, c)| {
                c.kind == kind
                    && (c.source_event_id == Some(id) || c.compound_event_id == Some(id))
            })
            .map(|(i, _)| i)
            .collect()
    }

    proptest! {
        #[test]
        fn prop_monotonic_drive_phases(
            specs in prop::collection::vec((50.0f64..5_000.0, 1u8..=6), 1..12),
            steps in prop::collection::vec(1.0f64..600.0, 1..80),
            speed in 5.0f64..45.0,
        ) {
            let mut specs = specs;
            specs.sort_by(|a, b| a.0.total_cmp(&b.0));
            let events: Vec<_> = specs
                .iter()
                .enumerate()
                .map(|(i, (d, s))| TestEvent::new(i as u32, *d, *s))
                .collect();

            let mut scheduler = quiet_scheduler();
            let mut log = Vec::new();
            let mut progress = 0.0;
            let mut now = 0u64;
            log.extend(drive(&mut scheduler, &events, progress, speed, now));
            for step in &steps {
                progress += step;
                now += 1_000;
                log.extend(drive(&mut scheduler, &events, progress, speed, now));
            }
            // Run off the end of the route and let owed MAINs drain
            progress = progress.max(6_000.0);
            for _ in 0..events.len() + 2 {
                now += 1_000;
                log.extend(drive(&mut scheduler, &events, progress, speed, now));
            }

            for event in events.iter().filter(|e| e.severity >= 3) {
                let id = event.id();
                prop_assert_eq!(main_count(&log, id), 1, "MAIN count for {}", id);
                let mains = position_of(&log, id, CalloutKind::Main);
                let earlies = position_of(&log, id, CalloutKind::Early);
                let finals = position_of(&log, id, CalloutKind::Final);
                prop_assert!(earlies.len() <= 1);
                prop_assert!(finals.len() <= 1);
                if let Some(early) = earlies.first() {
                    prop_assert!(*early < mains[0]);
                }
                if let Some(last) = finals.first() {
                    prop_assert!(*last > mains[0]);
                }
            }
            for event in events.iter().filter(|e| e.severity < 3) {
                prop_assert_eq!(main_count(&log, event.id()), 0);
            }

            // NORMAL callouts respect the throttle
            let interval = scheduler.min_interval_ms(speed);
            let normals: Vec<u64> = log
                .iter()
                .filter(|c| c.priority == Priority::Normal)
                .map(|c| c.timestamp_ms)
                .collect();
            for pair in normals.windows(2) {
                prop_assert!(pair[1] - pair[0] >= interval);
            }

            scheduler.reset();
            for event in &events {
                prop_assert_eq!(scheduler.phase_of(event.id()), WarningPhase::Unannounced);
            }
        }
    }
}
