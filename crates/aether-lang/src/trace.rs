use std::{
    collections::{BTreeMap, VecDeque},
    fmt::{self, Display, Formatter},
};

use serde::Serialize;

use crate::ast::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    EnterCall,
    ExitCall,
    LimitWarning,
    IoAttempt,
    Error,
    User,
}

impl TraceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceKind::EnterCall => "enter_call",
            TraceKind::ExitCall => "exit_call",
            TraceKind::LimitWarning => "limit_warning",
            TraceKind::IoAttempt => "io_attempt",
            TraceKind::Error => "error",
            TraceKind::User => "user",
        }
    }

    fn default_level(&self) -> TraceLevel {
        match self {
            TraceKind::EnterCall | TraceKind::ExitCall => TraceLevel::Debug,
            TraceKind::IoAttempt | TraceKind::User => TraceLevel::Info,
            TraceKind::LimitWarning => TraceLevel::Warn,
            TraceKind::Error => TraceLevel::Error,
        }
    }
}

impl Display for TraceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl Display for TraceLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TraceLevel::Debug => write!(f, "DEBUG"),
            TraceLevel::Info => write!(f, "INFO"),
            TraceLevel::Warn => write!(f, "WARN"),
            TraceLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// An event before the tracer stamps it with a sequence number and time.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub kind: TraceKind,
    pub level: TraceLevel,
    pub category: String,
    pub node: Option<NodeId>,
    pub message: String,
    pub values: Vec<serde_json::Value>,
}

impl TraceEvent {
    pub fn new(kind: TraceKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            level: kind.default_level(),
            category: kind.as_str().to_string(),
            node: None,
            message: message.into(),
            values: Vec::new(),
        }
    }

    pub fn with_level(mut self, level: TraceLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_values(mut self, values: Vec<serde_json::Value>) -> Self {
        self.values = values;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub seq: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub kind: TraceKind,
    pub level: TraceLevel,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<serde_json::Value>,
}

impl TraceEntry {
    /// The plain text form, `[LEVEL] category: message`.
    pub fn raw_line(&self) -> String {
        format!("[{}] {}: {}", self.level, self.category, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TraceStats {
    pub total_entries: usize,
    pub by_kind: BTreeMap<TraceKind, usize>,
    pub by_level: BTreeMap<TraceLevel, usize>,
    pub by_category: BTreeMap<String, usize>,
    /// `None` when the buffer is unbounded.
    pub buffer_size: Option<usize>,
    pub buffer_full: bool,
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceOptions {
    /// Maximum number of buffered entries; the oldest entry is dropped when full.
    pub capacity: Option<usize>,
}

#[derive(Debug, Default)]
pub struct Tracer {
    entries: VecDeque<TraceEntry>,
    next_seq: u64,
    capacity: Option<usize>,
    dropped: u64,
}

impl Tracer {
    pub fn new(options: TraceOptions) -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 0,
            capacity: options.capacity,
            dropped: 0,
        }
    }

    /// Appends an entry and returns its sequence number.
    pub fn record(&mut self, event: TraceEvent) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                self.dropped += 1;
                return seq;
            }
            while self.entries.len() >= capacity {
                self.entries.pop_front();
                self.dropped += 1;
            }
        }

        self.entries.push_back(TraceEntry {
            seq,
            timestamp: chrono::Utc::now().timestamp_millis(),
            kind: event.kind,
            level: event.level,
            category: event.category,
            node: event.node,
            message: event.message,
            values: event.values,
        });

        seq
    }

    pub fn entries(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every buffered entry in sequence order.
    pub fn take(&mut self) -> Vec<TraceEntry> {
        self.dropped = 0;
        self.entries.drain(..).collect()
    }

    pub fn stats(&self) -> TraceStats {
        let mut stats = TraceStats {
            total_entries: self.entries.len(),
            buffer_size: self.capacity,
            buffer_full: self
                .capacity
                .is_some_and(|capacity| self.entries.len() >= capacity),
            dropped: self.dropped,
            ..Default::default()
        };

        for entry in &self.entries {
            *stats.by_kind.entry(entry.kind).or_default() += 1;
            *stats.by_level.entry(entry.level).or_default() += 1;
            *stats.by_category.entry(entry.category.clone()).or_default() += 1;
        }

        stats
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dropped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn tracer() -> Tracer {
        let mut tracer = Tracer::default();
        tracer.record(TraceEvent::new(TraceKind::EnterCall, "ADD(2)").with_node(NodeId(3)));
        tracer.record(
            TraceEvent::new(TraceKind::User, "Hello")
                .with_category("test")
                .with_values(vec![serde_json::json!(1)]),
        );
        tracer.record(TraceEvent::new(TraceKind::ExitCall, "ADD returned"));
        tracer
    }

    #[rstest]
    fn test_sequence_numbers_increase(mut tracer: Tracer) {
        let seqs: Vec<_> = tracer.entries().map(|entry| entry.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);

        tracer.clear();
        assert_eq!(tracer.record(TraceEvent::new(TraceKind::Error, "boom")), 3);
    }

    #[rstest]
    fn test_take_drains(mut tracer: Tracer) {
        let entries = tracer.take();
        assert_eq!(entries.len(), 3);
        assert!(tracer.is_empty());
        assert_eq!(entries[1].raw_line(), "[INFO] test: Hello");
    }

    #[rstest]
    fn test_stats(tracer: Tracer) {
        let stats = tracer.stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.by_kind.get(&TraceKind::EnterCall), Some(&1));
        assert_eq!(stats.by_level.get(&TraceLevel::Debug), Some(&2));
        assert_eq!(stats.by_category.get("test"), Some(&1));
        assert_eq!(stats.buffer_size, None);
        assert!(!stats.buffer_full);
        assert_eq!(tracer.len(), 3);
    }

    #[rstest]
    fn test_clear_resets_count(mut tracer: Tracer) {
        tracer.clear();
        assert_eq!(tracer.stats().total_entries, 0);
    }

    #[rstest]
    #[case(0, 0, 3)]
    #[case(2, 2, 1)]
    #[case(5, 3, 0)]
    fn test_bounded_buffer(#[case] capacity: usize, #[case] kept: usize, #[case] dropped: u64) {
        let mut tracer = Tracer::new(TraceOptions {
            capacity: Some(capacity),
        });
        for i in 0..3 {
            tracer.record(TraceEvent::new(TraceKind::User, i.to_string()));
        }
        let stats = tracer.stats();
        assert_eq!(stats.total_entries, kept);
        assert_eq!(stats.dropped, dropped);
        assert_eq!(stats.buffer_full, kept == capacity);
        if kept > 0 {
            assert_eq!(tracer.entries().last().map(|entry| entry.seq), Some(2));
        }
    }

    #[test]
    fn test_entry_json_shape() {
        let mut tracer = Tracer::default();
        tracer.record(TraceEvent::new(TraceKind::IoAttempt, "PRINTLN denied").with_level(TraceLevel::Warn));
        let json = serde_json::to_value(tracer.entries().next().unwrap()).unwrap();
        assert_eq!(json["kind"], "io_attempt");
        assert_eq!(json["level"], "warn");
        assert_eq!(json["category"], "io_attempt");
        assert!(json.get("node").is_none());
    }
}
