use super::{Id, LogError, Loggable, StatsLogger};
use crate::utils::stats::OnlineMeanVariance;
use std::borrow::Cow;
use std::collections::{btree_map::Entry, BTreeMap};
use std::ops::Drop;
use std::time::{Duration, Instant};

/// Control the aggregation of logs into summaries and summaries into chunks.
pub trait Chunker {
    /// Start a new log group and decided whether to flush.
    #[inline]
    fn flush_group_start(&mut self) -> bool {
        false
    }
    /// Note an entry to be logged
    #[inline]
    fn note_log(&mut self, _id: &Id, _value: &Loggable) {}
    /// Note the value of the resulting post-log summary.
    ///
    /// Must immediately follow the corresponding value of `note_log`.
    #[inline]
    fn note_log_summary(&mut self, _summary: &ChunkSummary) {}
    /// End the current group and decide whether to flush.
    #[inline]
    fn flush_group_end(&mut self) -> bool {
        false
    }
    /// Indicate that the current chunk has been flushed
    fn note_flush(&mut self);
}

/// Write out summaries to a backend.
pub trait SummaryWriter {
    fn write_summaries<'a, I>(&mut self, summaries: I, elapsed: Duration)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>;
}

/// Logs time series statistics by breaking the time series into chunks and summarizing each chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkLogger<C: Chunker, W: SummaryWriter> {
    chunker: C,
    writer: W,

    // A binary tree is used so that keys are retrieved in sorted order
    summaries: BTreeMap<Id, Node>,

    // Start time of the current chunk.
    chunk_start: Instant,
}

impl<C: Chunker, W: SummaryWriter> ChunkLogger<C, W> {
    pub fn new(chunker: C, writer: W) -> Self {
        Self {
            chunker,
            writer,
            summaries: BTreeMap::new(),
            chunk_start: Instant::now(),
        }
    }
}

impl<C: Chunker + Default, W: SummaryWriter + Default> Default for ChunkLogger<C, W> {
    fn default() -> Self {
        Self::new(C::default(), W::default())
    }
}

impl<C: Chunker, W: SummaryWriter> StatsLogger for ChunkLogger<C, W> {
    fn group_start(&mut self) {
        if self.chunker.flush_group_start() {
            self.flush();
        }
    }

    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.chunker.note_log(&id, &value);
        let node = match self.summaries.entry(id) {
            Entry::Vacant(e) => e.insert(Node::new(value.into())),
            Entry::Occupied(e) => {
                let node = e.into_mut();
                node.push(value)?;
                node
            }
        };
        self.chunker.note_log_summary(&node.summary);
        Ok(())
    }

    fn group_end(&mut self) {
        if self.chunker.flush_group_end() {
            self.flush()
        }
    }

    fn flush(&mut self) {
        if !self.summaries.values().any(|node| node.dirty) {
            return;
        }
        self.writer.write_summaries(
            self.summaries
                .iter()
                .filter_map(|(id, node)| node.dirty.then(|| (id, &node.summary))),
            self.chunk_start.elapsed(),
        );

        for node in self.summaries.values_mut() {
            node.reset();
        }
        self.chunk_start = Instant::now();
        self.chunker.note_flush();
    }
}

/// Flush when dropped
impl<C: Chunker, W: SummaryWriter> Drop for ChunkLogger<C, W> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    /// Variable chunk summary
    summary: ChunkSummary,
    /// Whether the summary has been updated in this chunk
    dirty: bool,
}

impl Node {
    const fn new(summary: ChunkSummary) -> Self {
        Self {
            summary,
            dirty: true,
        }
    }

    fn push(&mut self, value: Loggable) -> Result<(), LogError> {
        self.dirty = true;
        self.summary.push(value)
    }

    fn reset(&mut self) {
        self.dirty = false;
        self.summary.reset()
    }
}

/// Summary of the values logged under one ID within a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkSummary {
    Counter {
        increment: u64,
        initial_value: u64,
    },
    Scalar {
        stats: OnlineMeanVariance<f64>,
    },
    Message {
        counts: BTreeMap<Cow<'static, str>, usize>,
    },
}

impl From<Loggable> for ChunkSummary {
    fn from(value: Loggable) -> Self {
        match value {
            Loggable::CounterIncrement(i) => Self::Counter {
                increment: i,
                initial_value: 0,
            },
            Loggable::Scalar(v) => {
                let mut stats = OnlineMeanVariance::new();
                stats.push(v);
                Self::Scalar { stats }
            }
            Loggable::Message(s) => {
                let mut counts = BTreeMap::new();
                counts.insert(s, 1);
                Self::Message { counts }
            }
        }
    }
}

impl ChunkSummary {
    /// Add a value to the summary
    ///
    /// Returns an error and does not insert the value if it is incompatible with the current
    /// summary, i.e. the summary was created from a different loggable variant.
    fn push(&mut self, value: Loggable) -> Result<(), LogError> {
        match (self, value) {
            (Self::Counter { increment, .. }, Loggable::CounterIncrement(i)) => {
                *increment += i;
            }
            (Self::Scalar { stats }, Loggable::Scalar(v)) => stats.push(v),
            (Self::Message { counts }, Loggable::Message(s)) => {
                *counts.entry(s).or_insert(0) += 1;
            }
            (summary, value) => {
                return Err(LogError::IncompatibleValue {
                    prev: summary.loggable_variant_name(),
                    now: value.variant_name(),
                })
            }
        };
        Ok(())
    }

    /// Reset for the start of the next chunk.
    fn reset(&mut self) {
        match self {
            Self::Counter {
                increment,
                initial_value,
            } => {
                *initial_value += *increment;
                *increment = 0
            }
            Self::Scalar { stats } => *stats = OnlineMeanVariance::new(),
            Self::Message { counts } => counts.clear(),
        }
    }

    /// The name of the associated loggable variant
    const fn loggable_variant_name(&self) -> &'static str {
        match self {
            Self::Counter { .. } => "CounterIncrement",
            Self::Scalar { .. } => "Scalar",
            Self::Message { .. } => "Message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Written = Rc<RefCell<Vec<BTreeMap<Id, ChunkSummary>>>>;

    #[derive(Debug, Default)]
    struct RecordingWriter(Written);

    impl SummaryWriter for RecordingWriter {
        fn write_summaries<'a, I>(&mut self, summaries: I, _: Duration)
        where
            I: Iterator<Item = (&'a Id, &'a ChunkSummary)>,
        {
            self.0.borrow_mut().push(
                summaries
                    .map(|(id, summary)| (id.clone(), summary.clone()))
                    .collect(),
            );
        }
    }

    #[derive(Debug, Default)]
    struct NeverFlush;

    impl Chunker for NeverFlush {
        fn note_flush(&mut self) {}
    }

    #[test]
    fn scalar_summary_aggregates() {
        let written = Written::default();
        let mut logger = ChunkLogger::new(NeverFlush, RecordingWriter(Rc::clone(&written)));
        logger.log("x".into(), Loggable::Scalar(1.0)).unwrap();
        logger.log("x".into(), Loggable::Scalar(3.0)).unwrap();
        logger.flush();

        let chunks = written.borrow();
        assert_eq!(chunks.len(), 1);
        match &chunks[0]["x"] {
            ChunkSummary::Scalar { stats } => {
                assert_eq!(stats.count(), 2);
                assert!((stats.mean().unwrap() - 2.0).abs() < 1e-12);
            }
            other => panic!("unexpected summary {:?}", other),
        }
    }

    #[test]
    fn incompatible_value_rejected() {
        let mut logger = ChunkLogger::new(NeverFlush, RecordingWriter::default());
        logger.log("x".into(), Loggable::Scalar(1.0)).unwrap();
        assert_eq!(
            logger.log("x".into(), Loggable::CounterIncrement(1)),
            Err(LogError::IncompatibleValue {
                prev: "Scalar",
                now: "CounterIncrement"
            })
        );
    }

    #[test]
    fn counter_carries_across_chunks() {
        let written = Written::default();
        let mut logger = ChunkLogger::new(NeverFlush, RecordingWriter(Rc::clone(&written)));
        logger.log("n".into(), Loggable::CounterIncrement(2)).unwrap();
        logger.flush();
        logger.log("n".into(), Loggable::CounterIncrement(3)).unwrap();
        logger.flush();

        let chunks = written.borrow();
        assert_eq!(
            chunks[1]["n"],
            ChunkSummary::Counter {
                increment: 3,
                initial_value: 2
            }
        );
    }

    #[test]
    fn clean_flush_writes_nothing() {
        let written = Written::default();
        let mut logger = ChunkLogger::new(NeverFlush, RecordingWriter(Rc::clone(&written)));
        logger.flush();
        assert!(written.borrow().is_empty());
    }
}
