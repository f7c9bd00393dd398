// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Append-only pulse sequence.
//!
//! A [`PulseSequence`] owns its events in an arena and keeps a separate
//! index list defining execution order. Events can only be appended;
//! there is no way to obtain a mutable reference to one after it has been
//! added, so the same sequence always compiles to the same program.
//!
//! # Builder pattern
//!
//! [`add_event`](PulseSequence::add_event) checks the new event against
//! everything already in the sequence and fails fast. Sequences restored
//! through serde skip those checks; [`validate`](PulseSequence::validate)
//! reports every violation and the compiler refuses sequences that fail it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::event::Event;
use super::time::{deserialize_ns, is_multiple};
use crate::error::ValidationError;

/// Largest repetition count a sequence may request.
pub const MAX_REPETITIONS: u32 = 1_000_000;

/// Index of an event in a sequence's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(usize);

impl EventId {
    /// Position in the arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// An ordered, append-only collection of events plus repetition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SequenceFile", into = "SequenceFile")]
pub struct PulseSequence {
    name: String,
    arena: Vec<Event>,
    order: Vec<EventId>,
    repetitions: u32,
    inter_repetition_delay_ns: f64,
    resolution_ns: Option<f64>,
}

impl PulseSequence {
    /// Create an empty sequence that runs once.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arena: Vec::new(),
            order: Vec::new(),
            repetitions: 1,
            inter_repetition_delay_ns: 0.0,
            resolution_ns: None,
        }
    }

    /// Require every start offset and duration to sit on a grid of
    /// `resolution_ns`.
    ///
    /// # Errors
    ///
    /// - `resolution_ns` is not finite and positive
    /// - an event already in the sequence is off the grid
    pub fn with_resolution(mut self, resolution_ns: f64) -> Result<Self, ValidationError> {
        if !resolution_ns.is_finite() || resolution_ns <= 0.0 {
            return Err(ValidationError::Sequence {
                field: "resolution_ns",
                message: format!("must be finite and > 0, got {resolution_ns}"),
            });
        }
        if let Some(issue) = self
            .events()
            .find_map(|e| grid_violation(e, resolution_ns))
        {
            return Err(issue);
        }
        self.resolution_ns = Some(resolution_ns);
        Ok(self)
    }

    /// Repeat the sequence `count` times with `delay_ns` between blocks.
    ///
    /// # Errors
    ///
    /// - `count` is zero or above [`MAX_REPETITIONS`]
    /// - `delay_ns` is negative or not finite
    pub fn with_repetitions(mut self, count: u32, delay_ns: f64) -> Result<Self, ValidationError> {
        let mut issues = Vec::new();
        check_repetitions(count, delay_ns, &mut issues);
        if let Some(issue) = issues.into_iter().next() {
            return Err(issue);
        }
        self.repetitions = count;
        self.inter_repetition_delay_ns = delay_ns;
        Ok(self)
    }

    /// Append an event.
    ///
    /// Returns `&mut self` for chaining.
    ///
    /// # Errors
    ///
    /// - any parameter is outside its declared range
    /// - the name is already used
    /// - the event starts before the previous one
    /// - timing is off the sequence's resolution grid
    /// - the event overlaps an existing one (other than a concurrent pulse
    ///   paired with an acquisition window)
    pub fn add_event(&mut self, event: Event) -> Result<&mut Self, ValidationError> {
        if let Some(issue) = event.validate().into_iter().next() {
            return Err(issue);
        }
        if self.events().any(|e| e.name() == event.name()) {
            return Err(ValidationError::DuplicateName(event.name().to_string()));
        }
        if let Some(last) = self.events().last() {
            if event.start_ns() < last.start_ns() {
                return Err(ordering_violation(&event, last));
            }
        }
        if let Some(resolution_ns) = self.resolution_ns {
            if let Some(issue) = grid_violation(&event, resolution_ns) {
                return Err(issue);
            }
        }
        if let Some(existing) = self
            .events()
            .find(|e| e.overlaps(&event) && !e.may_overlap(&event))
        {
            return Err(overlap_violation(existing, &event));
        }

        let id = EventId(self.arena.len());
        self.arena.push(event);
        self.order.push(id);
        Ok(self)
    }

    /// Full-sequence check. Returns every violation found; empty means
    /// valid. Has no side effects.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut issues = Vec::new();

        check_repetitions(self.repetitions, self.inter_repetition_delay_ns, &mut issues);
        if let Some(res) = self.resolution_ns {
            if !res.is_finite() || res <= 0.0 {
                issues.push(ValidationError::Sequence {
                    field: "resolution_ns",
                    message: format!("must be finite and > 0, got {res}"),
                });
            }
        }

        let mut seen = HashSet::new();
        let mut previous: Option<&Event> = None;
        for event in self.events() {
            issues.extend(event.validate());
            if !seen.insert(event.name()) {
                issues.push(ValidationError::DuplicateName(event.name().to_string()));
            }
            if let Some(prev) = previous {
                if event.start_ns() < prev.start_ns() {
                    issues.push(ordering_violation(event, prev));
                }
            }
            if let Some(res) = self.resolution_ns.filter(|r| r.is_finite() && *r > 0.0) {
                issues.extend(grid_violation(event, res));
            }
            previous = Some(event);
        }

        let events: Vec<&Event> = self.events().collect();
        for (i, a) in events.iter().enumerate() {
            for b in &events[i + 1..] {
                if a.overlaps(b) && !a.may_overlap(b) {
                    issues.push(overlap_violation(a, b));
                }
            }
        }

        issues
    }

    /// End time of the latest event; zero for an empty sequence.
    pub fn total_duration_ns(&self) -> f64 {
        self.events().map(Event::end_ns).fold(0.0, f64::max)
    }

    /// Events in execution order.
    pub fn events(&self) -> impl DoubleEndedIterator<Item = &Event> + '_ {
        self.order.iter().map(move |id| &self.arena[id.0])
    }

    /// Event ids in execution order.
    pub fn ids(&self) -> &[EventId] {
        &self.order
    }

    /// Look up an event by id.
    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.arena.get(id.0)
    }

    /// Look up an event by name.
    pub fn find(&self, name: &str) -> Option<(EventId, &Event)> {
        self.order
            .iter()
            .map(|id| (*id, &self.arena[id.0]))
            .find(|(_, e)| e.name() == name)
    }

    /// Sequence name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the sequence has no events.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of times the block is played.
    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// Idle time between repetition blocks.
    pub fn inter_repetition_delay_ns(&self) -> f64 {
        self.inter_repetition_delay_ns
    }

    /// Authoring grid, if one was declared.
    pub fn resolution_ns(&self) -> Option<f64> {
        self.resolution_ns
    }
}

fn check_repetitions(count: u32, delay_ns: f64, issues: &mut Vec<ValidationError>) {
    if count == 0 || count > MAX_REPETITIONS {
        issues.push(ValidationError::Sequence {
            field: "repetitions",
            message: format!("must be in 1..={MAX_REPETITIONS}, got {count}"),
        });
    }
    if !delay_ns.is_finite() || delay_ns < 0.0 {
        issues.push(ValidationError::Sequence {
            field: "inter_repetition_delay_ns",
            message: format!("must be finite and >= 0, got {delay_ns}"),
        });
    }
}

fn grid_violation(event: &Event, resolution_ns: f64) -> Option<ValidationError> {
    [("start", event.start_ns()), ("duration", event.duration_ns())]
        .into_iter()
        .find(|(_, value)| value.is_finite() && !is_multiple(*value, resolution_ns))
        .map(|(field, value_ns)| ValidationError::Incommensurate {
            event: event.name().to_string(),
            field,
            value_ns,
            resolution_ns,
        })
}

fn ordering_violation(event: &Event, previous: &Event) -> ValidationError {
    ValidationError::Ordering {
        event: event.name().to_string(),
        start_ns: event.start_ns(),
        previous: previous.name().to_string(),
        previous_start_ns: previous.start_ns(),
    }
}

fn overlap_violation(first: &Event, second: &Event) -> ValidationError {
    ValidationError::Overlap {
        first: first.name().to_string(),
        first_start_ns: first.start_ns(),
        first_end_ns: first.end_ns(),
        second: second.name().to_string(),
        second_start_ns: second.start_ns(),
        second_end_ns: second.end_ns(),
    }
}

/// Serialized form of a [`PulseSequence`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SequenceFile {
    name: String,
    #[serde(default = "default_repetitions")]
    repetitions: u32,
    #[serde(default, deserialize_with = "deserialize_ns")]
    inter_repetition_delay_ns: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolution_ns: Option<f64>,
    #[serde(default)]
    events: Vec<Event>,
}

fn default_repetitions() -> u32 {
    1
}

impl From<SequenceFile> for PulseSequence {
    fn from(file: SequenceFile) -> Self {
        let order = (0..file.events.len()).map(EventId).collect();
        Self {
            name: file.name,
            arena: file.events,
            order,
            repetitions: file.repetitions,
            inter_repetition_delay_ns: file.inter_repetition_delay_ns,
            resolution_ns: file.resolution_ns,
        }
    }
}

impl From<PulseSequence> for SequenceFile {
    fn from(seq: PulseSequence) -> Self {
        let events = seq.events().cloned().collect();
        Self {
            name: seq.name,
            repetitions: seq.repetitions,
            inter_repetition_delay_ns: seq.inter_repetition_delay_ns,
            resolution_ns: seq.resolution_ns,
            events,
        }
    }
}
