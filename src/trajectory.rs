//! Replayed mobility: the enter/leave events of a typical day per weekday, and their pairing
//! into each person's activity instances.
use chrono::Weekday;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::activity::ActivityId;
use crate::calendar::SECONDS_PER_DAY;
use crate::container::ContainerId;
use crate::hashing::{HashMap, HashMapExt};
use crate::people::{PersonId, TrajectoryEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Enter,
    Leave,
}

/// One row of an events file, before ids are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub weekday: Weekday,
    /// Seconds since midnight
    pub time: f64,
    pub person: String,
    pub facility: String,
    pub activity: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MobilityEvent {
    /// Seconds since midnight, within `[0, 86400]`
    pub time: f64,
    pub person: PersonId,
    pub container: ContainerId,
    pub activity: ActivityId,
    pub kind: EventKind,
}

/// Where the day's events come from. Implementations are shared read-only between runs.
pub trait TrajectorySource: Send + Sync {
    /// The events of `weekday` in replay order.
    fn events(&self, weekday: Weekday) -> &[MobilityEvent];
}

/// Events held in memory, one list per weekday.
#[derive(Debug, Clone, Default)]
pub struct WeeklyTrajectories {
    days: [Vec<MobilityEvent>; 7],
}

impl WeeklyTrajectories {
    /// Sorts every weekday's events by time; at equal times leaves come before enters, then
    /// person and container ids decide.
    pub fn new(events: impl IntoIterator<Item = (Weekday, MobilityEvent)>) -> Self {
        let mut days: [Vec<MobilityEvent>; 7] = Default::default();
        for (weekday, mut event) in events {
            event.time = event.time.clamp(0.0, SECONDS_PER_DAY);
            days[weekday.num_days_from_monday() as usize].push(event);
        }
        for events in &mut days {
            events.sort_by(|a, b| {
                a.time
                    .total_cmp(&b.time)
                    .then((a.kind == EventKind::Enter).cmp(&(b.kind == EventKind::Enter)))
                    .then(a.person.cmp(&b.person))
                    .then(a.container.cmp(&b.container))
            });
        }
        WeeklyTrajectories { days }
    }

    /// The same events on every weekday.
    pub fn uniform(events: &[MobilityEvent]) -> Self {
        let mut weekday = Weekday::Mon;
        let mut all = Vec::with_capacity(events.len() * 7);
        for _ in 0..7 {
            all.extend(events.iter().map(|event| (weekday, *event)));
            weekday = weekday.succ();
        }
        WeeklyTrajectories::new(all)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.days.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrajectorySource for WeeklyTrajectories {
    /// Falls back to the next weekday that has events.
    fn events(&self, weekday: Weekday) -> &[MobilityEvent] {
        let mut day = weekday;
        for _ in 0..7 {
            let events = &self.days[day.num_days_from_monday() as usize];
            if !events.is_empty() {
                return events;
            }
            day = day.succ();
        }
        &[]
    }
}

/// Pairs each person's enter and leave events into activity instances, all participating.
/// A leave without an enter starts at midnight; an enter without a leave ends at midnight.
#[must_use]
pub fn pair_events(events: &[MobilityEvent], num_persons: usize) -> Vec<Vec<TrajectoryEntry>> {
    let mut trajectories: Vec<Vec<TrajectoryEntry>> = vec![Vec::new(); num_persons];
    let mut open: HashMap<(PersonId, ContainerId), (f64, ActivityId)> = HashMap::new();
    let push = |trajectories: &mut Vec<Vec<TrajectoryEntry>>, person: PersonId, entry| {
        if let Some(trajectory) = trajectories.get_mut(person.0 as usize) {
            trajectory.push(entry);
        }
    };

    for event in events {
        let key = (event.person, event.container);
        match event.kind {
            EventKind::Enter => {
                if let Some((start, activity)) = open.insert(key, (event.time, event.activity)) {
                    warn!(
                        "{:?} entered {:?} twice, closing the first visit",
                        event.person, event.container
                    );
                    push(
                        &mut trajectories,
                        event.person,
                        TrajectoryEntry {
                            start,
                            end: event.time,
                            container: event.container,
                            activity,
                            participating: true,
                        },
                    );
                }
            }
            EventKind::Leave => {
                let (start, activity) = open.remove(&key).unwrap_or((0.0, event.activity));
                push(
                    &mut trajectories,
                    event.person,
                    TrajectoryEntry {
                        start,
                        end: event.time,
                        container: event.container,
                        activity,
                        participating: true,
                    },
                );
            }
        }
    }

    let mut unclosed: Vec<_> = open.into_iter().collect();
    unclosed.sort_by_key(|((person, container), _)| (*person, *container));
    for ((person, container), (start, activity)) in unclosed {
        push(
            &mut trajectories,
            person,
            TrajectoryEntry {
                start,
                end: SECONDS_PER_DAY,
                container,
                activity,
                participating: true,
            },
        );
    }
    for trajectory in &mut trajectories {
        trajectory.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.container.cmp(&b.container)));
    }
    trajectories
}
