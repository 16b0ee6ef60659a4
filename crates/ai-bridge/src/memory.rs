//! Narrative memory - short-term window plus long-term summary
//!
//! Events append to the short-term window in insertion order. When the
//! window fills, the oldest K events are collapsed into one summary event
//! (and folded into the long-term summary) by an asynchronous condensation.
//! Events keep arriving at the tail while a condensation is in flight; the
//! collapse only ever touches the prefix it was launched against.

use crawler_core::config::MemoryConfig;
use crawler_core::{EventKind, NarrativeEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Serializable state of the memory, for saves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub events: Vec<NarrativeEvent>,
    pub summary: String,
    pub next_event_id: u64,
}

#[derive(Debug)]
pub struct NarrativeMemory {
    window: VecDeque<NarrativeEvent>,
    summary: String,
    next_event_id: u64,
    /// Highest event id a launched condensation will collapse, if one is
    /// in flight.
    condensing_upto: Option<u64>,
    config: MemoryConfig,
}

impl NarrativeMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            window: VecDeque::new(),
            summary: String::new(),
            next_event_id: 1,
            condensing_upto: None,
            config,
        }
    }

    /// Append an event, assigning its id. Returns a clone of the stored
    /// event.
    pub fn append(
        &mut self,
        turn: u64,
        kind: EventKind,
        summary: impl Into<String>,
        payload: Value,
    ) -> NarrativeEvent {
        let event = NarrativeEvent {
            id: self.next_event_id,
            turn,
            kind,
            summary: summary.into(),
            payload,
        };
        self.next_event_id += 1;
        self.window.push_back(event.clone());
        event
    }

    pub fn short_term(&self) -> impl Iterator<Item = &NarrativeEvent> {
        self.window.iter()
    }

    pub fn short_term_lines(&self) -> Vec<String> {
        self.window.iter().map(|e| e.one_line()).collect()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn next_event_id(&self) -> u64 {
        self.next_event_id
    }

    /// Whether the window has grown enough to condense and no condensation
    /// is already in flight.
    pub fn needs_condensation(&self) -> bool {
        self.condensing_upto.is_none() && self.window.len() >= self.config.short_term_window
    }

    /// Begin a condensation: claim the K oldest events and mark the prefix.
    /// Returns the claimed events and the id the collapse will reach.
    pub fn begin_condensation(&mut self) -> Option<(Vec<NarrativeEvent>, u64)> {
        if !self.needs_condensation() {
            return None;
        }
        let chunk = self.config.condense_chunk.min(self.window.len());
        let events: Vec<NarrativeEvent> = self.window.iter().take(chunk).cloned().collect();
        let upto = events.last()?.id;
        self.condensing_upto = Some(upto);
        debug!(upto, count = events.len(), "condensation started");
        Some((events, upto))
    }

    /// Land a finished condensation. Collapses exactly the claimed prefix
    /// into one summary event and folds the text into the long-term
    /// summary; events appended since the launch are untouched.
    pub fn apply_condensation(&mut self, upto: u64, text: &str) {
        if self.condensing_upto != Some(upto) {
            warn!(upto, "stale condensation result dropped");
            return;
        }
        self.condensing_upto = None;

        let mut last_turn = 0;
        while let Some(front) = self.window.front() {
            if front.id > upto {
                break;
            }
            last_turn = front.turn;
            self.window.pop_front();
        }

        let event = NarrativeEvent {
            id: self.next_event_id,
            turn: last_turn,
            kind: EventKind::Summary,
            summary: text.to_string(),
            payload: Value::Null,
        };
        self.next_event_id += 1;
        self.window.push_front(event);

        if !self.summary.is_empty() {
            self.summary.push(' ');
        }
        self.summary.push_str(text);
    }

    pub fn to_record(&self) -> MemoryRecord {
        MemoryRecord {
            events: self.window.iter().cloned().collect(),
            summary: self.summary.clone(),
            next_event_id: self.next_event_id,
        }
    }

    pub fn from_record(record: MemoryRecord, config: MemoryConfig) -> Self {
        Self {
            window: record.events.into(),
            summary: record.summary,
            next_event_id: record.next_event_id,
            condensing_upto: None,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> MemoryConfig {
        MemoryConfig { short_term_window: 10, condense_chunk: 4, summary_token_budget: 64 }
    }

    fn fill(memory: &mut NarrativeMemory, count: u64) {
        for i in 0..count {
            memory.append(i, EventKind::RoomEntered, format!("entered room {i}"), json!({}));
        }
    }

    #[test]
    fn test_events_keep_insertion_order() {
        let mut memory = NarrativeMemory::new(config());
        fill(&mut memory, 5);
        let ids: Vec<u64> = memory.short_term().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_condensation_counts() {
        // window N=10, chunk K=4: after condensation the window holds
        // N - K + 1 events, the summary event included
        let mut memory = NarrativeMemory::new(config());
        fill(&mut memory, 10);
        assert!(memory.needs_condensation());
        let (events, upto) = memory.begin_condensation().unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(upto, 4);
        memory.apply_condensation(upto, "four rooms passed in a blur");
        assert_eq!(memory.len(), 10 - 4 + 1);
        assert_eq!(memory.short_term().next().unwrap().kind, EventKind::Summary);
        assert!(memory.summary().contains("four rooms"));
    }

    #[test]
    fn test_events_during_condensation_are_not_lost() {
        let mut memory = NarrativeMemory::new(config());
        fill(&mut memory, 10);
        let (_, upto) = memory.begin_condensation().unwrap();
        // new events land while the summarizer is thinking
        memory.append(99, EventKind::Discovery, "found a hidden door", json!({}));
        memory.apply_condensation(upto, "early wanderings");
        let summaries: Vec<&str> = memory.short_term().map(|e| e.summary.as_str()).collect();
        assert!(summaries.contains(&"found a hidden door"));
        assert_eq!(memory.len(), 11 - 4 + 1);
    }

    #[test]
    fn test_stale_condensation_is_dropped() {
        let mut memory = NarrativeMemory::new(config());
        fill(&mut memory, 10);
        let before = memory.len();
        memory.apply_condensation(4, "never started");
        assert_eq!(memory.len(), before);
        assert!(memory.summary().is_empty());
    }

    #[test]
    fn test_no_double_condensation() {
        let mut memory = NarrativeMemory::new(config());
        fill(&mut memory, 12);
        assert!(memory.begin_condensation().is_some());
        assert!(memory.begin_condensation().is_none());
    }

    #[test]
    fn test_record_round_trip() {
        let mut memory = NarrativeMemory::new(config());
        fill(&mut memory, 6);
        let record = memory.to_record();
        let restored = NarrativeMemory::from_record(record.clone(), config());
        assert_eq!(restored.to_record(), record);
        assert_eq!(restored.next_event_id(), memory.next_event_id());
    }
}
