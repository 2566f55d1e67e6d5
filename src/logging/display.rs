//! Command-line logger
use super::chunk::{ChunkLogger, ChunkSummary, Chunker, SummaryWriter};
use super::{ByCounter, Id, LogError, Loggable, StatsLogger};
use crate::utils::fmt::{DisplayFn, PrettyPrint};
use std::fmt;
use std::time::Duration;
use yansi::Paint;

/// Logger that displays grouped summaries to standard output.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DisplayLogger<C: Chunker = ByCounter>(ChunkLogger<C, DisplayBackend>);

impl<C: Chunker> DisplayLogger<C> {
    #[inline]
    pub fn new(chunker: C) -> Self {
        Self(ChunkLogger::new(chunker, DisplayBackend))
    }
}

impl<C: Chunker> StatsLogger for DisplayLogger<C> {
    #[inline]
    fn group_start(&mut self) {
        self.0.group_start()
    }
    #[inline]
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.0.group_log(id, value)
    }
    #[inline]
    fn group_end(&mut self) {
        self.0.group_end()
    }
    #[inline]
    fn flush(&mut self) {
        self.0.flush()
    }
}

/// Logging backend that displays summaries to standard output.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DisplayBackend;

impl SummaryWriter for DisplayBackend {
    fn write_summaries<'a, I>(&mut self, summaries: I, elapsed: Duration)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>,
    {
        println!();
        for (id, summary) in summaries {
            println!("{:<24} {}", Paint::fixed(35, id), DisplaySummary(summary));
        }
        println!("{}", Paint::fixed(8, DisplayFn(|f| write!(f, "({:.2?})", elapsed))));
    }
}

#[derive(Debug)]
struct DisplaySummary<'a>(&'a ChunkSummary);

impl<'a> fmt::Display for DisplaySummary<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            ChunkSummary::Counter {
                increment,
                initial_value,
            } => write!(
                f,
                "{}  (+{})",
                initial_value + increment,
                Paint::fixed(253, increment)
            ),
            ChunkSummary::Scalar { stats } => {
                if let Some(mean) = stats.mean() {
                    write!(f, "{:.4}", PrettyPrint(mean))?;
                }
                if stats.count() > 1 {
                    if let Some(stddev) = stats.stddev() {
                        write!(
                            f,
                            " {}",
                            Paint::fixed(
                                8,
                                DisplayFn(|f| write!(f, "(σ {:.3})", PrettyPrint(stddev)))
                            )
                        )?;
                    }
                }
                Ok(())
            }
            ChunkSummary::Message { counts } => {
                let mut first = true;
                for (message, count) in counts {
                    if first {
                        first = false;
                    } else {
                        write!(f, "  ")?;
                    }
                    write!(
                        f,
                        "{} {}",
                        message,
                        Paint::fixed(111, DisplayFn(|f| write!(f, "×{}", count)))
                    )?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::stats::OnlineMeanVariance;
    use std::collections::BTreeMap;

    #[test]
    fn display_scalar() {
        Paint::disable();
        let stats: OnlineMeanVariance<f64> = [1.0, 3.0].into_iter().collect();
        let summary = ChunkSummary::Scalar { stats };
        assert_eq!(DisplaySummary(&summary).to_string(), "2.0000 (σ 1.000)");
    }

    #[test]
    fn display_messages() {
        Paint::disable();
        let mut counts = BTreeMap::new();
        counts.insert("converged".into(), 3);
        counts.insert("budget_exhausted".into(), 1);
        let summary = ChunkSummary::Message { counts };
        assert_eq!(
            DisplaySummary(&summary).to_string(),
            "budget_exhausted ×1  converged ×3"
        );
    }

    #[test]
    fn logs_iteration_groups() {
        Paint::disable();
        let mut logger = DisplayLogger::new(ByCounter::new("iteration", 2));
        for j in [1.0, 2.0, 3.0] {
            logger.group_start();
            logger.log_scalar("J", j).unwrap();
            logger.log_message("actor/termination", "converged").unwrap();
            logger.log_counter_increment("iteration", 1).unwrap();
            logger.group_end();
        }
        logger.flush();

        let mut default_logger: DisplayLogger = DisplayLogger::default();
        default_logger.log("J".into(), Loggable::Scalar(0.5)).unwrap();
    }
}
