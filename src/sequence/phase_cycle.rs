// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Phase cycling.
//!
//! Each transmitting pulse steps through `phase_cycles` phases
//! `(φ0 + 360·k/n) mod 360`. Pulses sharing a phase-cycle group step
//! together; different groups are nested, lowest group outermost. The
//! resulting [`PhaseTable`] has one row per combination and one column per
//! transmitting pulse. Repetition `r` of a sequence plays row
//! `r mod num_rows`.

use std::collections::BTreeMap;

use super::event::EventKind;
use super::pulse_sequence::{EventId, PulseSequence};

/// Per-repetition transmit phases.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTable {
    columns: Vec<EventId>,
    rows: Vec<Vec<f64>>,
}

struct Column {
    id: EventId,
    group: usize,
    phases: Vec<f64>,
}

impl PhaseTable {
    /// Derive the table from the pulses of `sequence`.
    ///
    /// Pulses with zero amplitude do not transmit and get no column.
    pub fn from_sequence(sequence: &PulseSequence) -> Self {
        let mut columns: Vec<Column> = sequence
            .ids()
            .iter()
            .filter_map(|id| {
                let event = sequence.get(*id)?;
                match event.kind() {
                    EventKind::Pulse(p) if p.amplitude_pct > 0.0 => {
                        let n = p.phase_cycles.max(1);
                        let phases = (0..n)
                            .map(|k| (p.phase_deg + 360.0 * f64::from(k) / f64::from(n)) % 360.0)
                            .collect();
                        Some(Column {
                            id: *id,
                            group: p.phase_cycle_group as usize,
                            phases,
                        })
                    }
                    _ => None,
                }
            })
            .collect();

        // Renumber groups densely, keeping their order.
        let mut group_lengths: BTreeMap<usize, usize> = BTreeMap::new();
        for c in &columns {
            let len = group_lengths.entry(c.group).or_insert(0);
            *len = (*len).max(c.phases.len());
        }
        let dense: BTreeMap<usize, usize> = group_lengths
            .keys()
            .enumerate()
            .map(|(dense, sparse)| (*sparse, dense))
            .collect();
        let lengths: Vec<usize> = group_lengths.values().copied().collect();
        for c in &mut columns {
            c.group = dense[&c.group];
        }

        let num_rows: usize = lengths.iter().product();
        let rows = (0..num_rows)
            .map(|row| {
                let indices = mixed_radix(row, &lengths);
                columns
                    .iter()
                    .map(|c| c.phases[indices[c.group] % c.phases.len()])
                    .collect()
            })
            .collect();

        Self {
            columns: columns.into_iter().map(|c| c.id).collect(),
            rows,
        }
    }

    /// Number of distinct phase combinations (at least 1).
    pub fn num_rows(&self) -> usize {
        self.rows.len().max(1)
    }

    /// Pulses that have a column, in sequence order.
    pub fn columns(&self) -> &[EventId] {
        &self.columns
    }

    /// Table row played by repetition `repetition`.
    pub fn row_for_repetition(&self, repetition: u32) -> usize {
        repetition as usize % self.num_rows()
    }

    /// Phase of pulse `id` in `row`, if the pulse transmits.
    pub fn phase(&self, row: usize, id: EventId) -> Option<f64> {
        let column = self.columns.iter().position(|c| *c == id)?;
        self.rows.get(row).map(|r| r[column])
    }

    /// All rows.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
}

/// Split `value` into digits with the given radices, last digit fastest.
fn mixed_radix(mut value: usize, radices: &[usize]) -> Vec<usize> {
    let mut digits = vec![0; radices.len()];
    for (digit, radix) in digits.iter_mut().zip(radices).rev() {
        *digit = value % radix;
        value /= radix;
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::event::{Event, PulseParams};

    fn pulse(name: &str, start: f64, phase: f64, cycles: u32, group: u32) -> Event {
        Event::pulse(
            name,
            start,
            10.0,
            PulseParams::rect(100.0, phase).with_phase_cycling(cycles, group),
        )
    }

    #[test]
    fn test_no_cycling_single_row() {
        let mut seq = PulseSequence::new("s");
        seq.add_event(pulse("p", 0.0, 90.0, 1, 0)).unwrap();
        let table = PhaseTable::from_sequence(&seq);
        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.phase(0, seq.ids()[0]), Some(90.0));
    }

    #[test]
    fn test_empty_sequence_one_row() {
        let table = PhaseTable::from_sequence(&PulseSequence::new("s"));
        assert_eq!(table.num_rows(), 1);
        assert!(table.columns().is_empty());
        assert_eq!(table.row_for_repetition(5), 0);
    }

    #[test]
    fn test_four_step_cycle_wraps() {
        let mut seq = PulseSequence::new("s");
        seq.add_event(pulse("p", 0.0, 90.0, 4, 0)).unwrap();
        let table = PhaseTable::from_sequence(&seq);
        let id = seq.ids()[0];
        let phases: Vec<f64> = (0..4).map(|r| table.phase(r, id).unwrap()).collect();
        assert_eq!(phases, vec![90.0, 180.0, 270.0, 0.0]);
        assert_eq!(table.row_for_repetition(5), 1);
    }

    #[test]
    fn test_same_group_steps_together_and_tiles() {
        let mut seq = PulseSequence::new("s");
        seq.add_event(pulse("a", 0.0, 0.0, 4, 0))
            .unwrap()
            .add_event(pulse("b", 20.0, 0.0, 2, 0))
            .unwrap();
        let table = PhaseTable::from_sequence(&seq);
        assert_eq!(table.num_rows(), 4);
        assert_eq!(table.rows()[2], vec![180.0, 0.0]);
        assert_eq!(table.rows()[3], vec![270.0, 180.0]);
    }

    #[test]
    fn test_groups_nest_lowest_outermost() {
        let mut seq = PulseSequence::new("s");
        seq.add_event(pulse("a", 0.0, 0.0, 2, 0))
            .unwrap()
            .add_event(pulse("b", 20.0, 0.0, 2, 5))
            .unwrap();
        let table = PhaseTable::from_sequence(&seq);
        assert_eq!(
            table.rows(),
            &[
                vec![0.0, 0.0],
                vec![0.0, 180.0],
                vec![180.0, 0.0],
                vec![180.0, 180.0],
            ]
        );
    }

    #[test]
    fn test_silent_pulse_has_no_column() {
        let mut seq = PulseSequence::new("s");
        seq.add_event(Event::pulse("off", 0.0, 10.0, PulseParams::rect(0.0, 0.0)))
            .unwrap();
        let table = PhaseTable::from_sequence(&seq);
        assert!(table.columns().is_empty());
        assert_eq!(table.phase(0, seq.ids()[0]), None);
    }

    #[test]
    fn test_mixed_radix() {
        assert_eq!(mixed_radix(5, &[2, 3]), vec![1, 2]);
        assert_eq!(mixed_radix(0, &[]), Vec::<usize>::new());
    }
}
