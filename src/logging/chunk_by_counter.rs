use super::chunk::{ChunkSummary, Chunker};
use super::{Id, Loggable};

/// Chunk summaries at fixed multiples of a counter (for [`ChunkLogger`][super::ChunkLogger]).
///
/// Flushes the summary after the counter update has been included in the summary.
/// As such, users should log counter increments last, after other logs associated with that
/// counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByCounter {
    /// ID of the counter to use
    pub counter: Id,
    /// Chunk length in terms of the counter.
    pub interval: u64,
    state: State,
}

impl ByCounter {
    pub fn new<T: Into<Id>>(counter: T, interval: u64) -> Self {
        Self {
            counter: counter.into(),
            interval: interval.max(1),
            state: State::NoFlush,
        }
    }
}

impl Default for ByCounter {
    /// Flush every 100 training iterations.
    fn default() -> Self {
        Self::new("iteration", 100)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum State {
    NoFlush,
    IdMatch,
    Flush,
}

impl Chunker for ByCounter {
    #[inline]
    fn note_log(&mut self, id: &Id, _: &Loggable) {
        if matches!(self.state, State::NoFlush) && &self.counter == id {
            self.state = State::IdMatch;
        }
    }

    #[inline]
    fn note_log_summary(&mut self, summary: &ChunkSummary) {
        if matches!(self.state, State::IdMatch) {
            self.state = match summary {
                ChunkSummary::Counter {
                    increment,
                    initial_value,
                } if (increment + initial_value) % self.interval == 0 => State::Flush,
                // A non-counter value under the counter ID never triggers a flush
                _ => State::NoFlush,
            };
        }
    }

    #[inline]
    fn flush_group_end(&mut self) -> bool {
        matches!(self.state, State::Flush)
    }

    #[inline]
    fn note_flush(&mut self) {
        self.state = State::NoFlush;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_counter(chunker: &mut ByCounter, total: u64) -> bool {
        let id: Id = "iteration".into();
        chunker.note_log(&id, &Loggable::CounterIncrement(1));
        chunker.note_log_summary(&ChunkSummary::Counter {
            increment: 1,
            initial_value: total - 1,
        });
        chunker.flush_group_end()
    }

    #[test]
    fn flushes_on_multiples() {
        let mut chunker = ByCounter::new("iteration", 3);
        assert!(!push_counter(&mut chunker, 1));
        assert!(!push_counter(&mut chunker, 2));
        assert!(push_counter(&mut chunker, 3));
        chunker.note_flush();
        assert!(!push_counter(&mut chunker, 4));
    }

    #[test]
    fn ignores_other_ids() {
        let mut chunker = ByCounter::new("iteration", 1);
        chunker.note_log(&"J".into(), &Loggable::Scalar(1.0));
        chunker.note_log_summary(&ChunkSummary::Counter {
            increment: 1,
            initial_value: 0,
        });
        assert!(!chunker.flush_group_end());
    }
}
