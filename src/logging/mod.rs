//! Logging statistics from training runs
mod chunk;
mod chunk_by_counter;
mod display;

pub use chunk::{ChunkLogger, ChunkSummary, Chunker, SummaryWriter};
pub use chunk_by_counter::ByCounter;
pub use display::{DisplayBackend, DisplayLogger};

use std::borrow::Cow;
use thiserror::Error;

/// Identifier of a logged value.
pub type Id = Cow<'static, str>;

/// A value that can be logged.
#[derive(Debug, Clone, PartialEq)]
pub enum Loggable {
    /// Increment a counter.
    CounterIncrement(u64),
    /// A scalar value. Aggregate by taking means.
    Scalar(f64),
    /// A message. Aggregated by counting occurrences.
    Message(Cow<'static, str>),
}

impl Loggable {
    /// The name of this variant
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::CounterIncrement(_) => "CounterIncrement",
            Self::Scalar(_) => "Scalar",
            Self::Message(_) => "Message",
        }
    }
}

impl From<f64> for Loggable {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<&'static str> for Loggable {
    #[inline]
    fn from(value: &'static str) -> Self {
        Self::Message(value.into())
    }
}

/// Error logging a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("incompatible value type; previously {prev} now {now}")]
    IncompatibleValue {
        prev: &'static str,
        now: &'static str,
    },
}

/// Log statistics from a training run.
///
/// Values are logged in groups. All values within a group share the same (training iteration)
/// index; a logger may use group boundaries to decide when to summarize.
pub trait StatsLogger {
    /// Start a new group of logs.
    fn group_start(&mut self);

    /// Log a value within the current group.
    ///
    /// # Returns
    /// An error if the value is structurally incompatible with previous values logged
    /// under the same ID.
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError>;

    /// End the current group of logs.
    fn group_end(&mut self);

    /// Write out any summarized values that have not been written yet.
    fn flush(&mut self);

    /// Log a single value as its own group.
    #[inline]
    fn log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.group_start();
        let result = self.group_log(id, value);
        self.group_end();
        result
    }

    /// Log a scalar value within the current group.
    #[inline]
    fn log_scalar(&mut self, name: &'static str, value: f64) -> Result<(), LogError> {
        self.group_log(name.into(), Loggable::Scalar(value))
    }

    /// Log a counter increment within the current group.
    #[inline]
    fn log_counter_increment(
        &mut self,
        name: &'static str,
        increment: u64,
    ) -> Result<(), LogError> {
        self.group_log(name.into(), Loggable::CounterIncrement(increment))
    }

    /// Log a message within the current group.
    #[inline]
    fn log_message(&mut self, name: &'static str, message: &'static str) -> Result<(), LogError> {
        self.group_log(name.into(), Loggable::Message(message.into()))
    }
}

/// Logger that does nothing
impl StatsLogger for () {
    #[inline]
    fn group_start(&mut self) {}
    #[inline]
    fn group_log(&mut self, _: Id, _: Loggable) -> Result<(), LogError> {
        Ok(())
    }
    #[inline]
    fn group_end(&mut self) {}
    #[inline]
    fn flush(&mut self) {}
}

impl<T: StatsLogger + ?Sized> StatsLogger for &mut T {
    #[inline]
    fn group_start(&mut self) {
        T::group_start(self)
    }
    #[inline]
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        T::group_log(self, id, value)
    }
    #[inline]
    fn group_end(&mut self) {
        T::group_end(self)
    }
    #[inline]
    fn flush(&mut self) {
        T::flush(self)
    }
}

impl<T: StatsLogger + ?Sized> StatsLogger for Box<T> {
    #[inline]
    fn group_start(&mut self) {
        T::group_start(self)
    }
    #[inline]
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        T::group_log(self, id, value)
    }
    #[inline]
    fn group_end(&mut self) {
        T::group_end(self)
    }
    #[inline]
    fn flush(&mut self) {
        T::flush(self)
    }
}
