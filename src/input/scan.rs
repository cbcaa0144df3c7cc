//! Paginated scanning of incentive-market logs.

use std::cmp::min;

use alloy::rpc::types::{Filter, Log};
use tracing::instrument;

use crate::{Error, Result, types::common::Address};

/// A source of event logs with decoded argument data.
///
/// Real log sources enforce a maximum block span per query, which is why scanning always goes
/// through [`BlockWindows`] rather than issuing one query for the whole range.
pub trait LogSource: Sync {
    /// Fetch all logs matching the filter.
    fn get_logs(&self, filter: &Filter) -> impl Send + Future<Output = Result<Vec<Log>>>;
}

/// A lazy, finite, restartable sequence of block windows covering an inclusive range.
///
/// Windows are ascending, non-overlapping, each at most `max_range` blocks, with the final
/// window clipped to the end of the range.
#[derive(Clone, Copy, Debug)]
pub struct BlockWindows {
    next_start: u64,
    end: u64,
    max_range: u64,
    exhausted: bool,
}

impl BlockWindows {
    pub fn new(from_block: u64, to_block: u64, max_range: u64) -> Self {
        Self {
            next_start: from_block,
            end: to_block,
            max_range: max_range.max(1),
            exhausted: false,
        }
    }

    /// Restart iteration from a given window start.
    ///
    /// This makes resuming after a failed window a first-class operation: the caller records the
    /// start of the window that failed and continues from there, instead of re-scanning windows
    /// that already completed.
    pub fn resume_from(&mut self, window_start: u64) {
        self.next_start = window_start;
        self.exhausted = false;
    }
}

impl Iterator for BlockWindows {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<(u64, u64)> {
        if self.exhausted || self.next_start > self.end {
            return None;
        }
        let window_end = min(self.next_start.saturating_add(self.max_range - 1), self.end);
        let window = (self.next_start, window_end);
        match window_end.checked_add(1) {
            Some(next) => self.next_start = next,
            // The range ends at the top of the block space; there is no next window.
            None => self.exhausted = true,
        }
        Some(window)
    }
}

/// Scans a block range for logs of one contract, window by window.
#[derive(Clone, Debug)]
pub struct RangeScanner<S> {
    source: S,
    max_range: u64,
}

impl<S: LogSource> RangeScanner<S> {
    pub fn new(source: S, max_range: u64) -> Self {
        Self { source, max_range }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch all logs emitted by `address` in `[from_block, to_block]`, in chain order.
    ///
    /// Windows are fetched sequentially. A failed window aborts the whole scan with an
    /// incomplete-history error: a gap would invalidate every downstream sum, so it must never
    /// be skipped silently.
    #[instrument(skip(self))]
    pub async fn scan(&self, address: Address, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        let mut logs = Vec::new();
        for (start, end) in BlockWindows::new(from_block, to_block, self.max_range) {
            tracing::debug!(start, end, "fetching logs in window");
            let filter = Filter::new().address(address).from_block(start).to_block(end);
            let batch = self.source.get_logs(&filter).await.map_err(|err| {
                Error::incomplete_history().context(format!("window [{start}, {end}]: {err}"))
            })?;
            logs.extend(batch);
        }
        Ok(logs)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::{
        error::ErrorKind,
        input::testing::{FailingLogSource, MemoryLogSource, direct_log},
        types::common::Address,
    };

    use super::*;

    #[test_log::test]
    fn test_block_windows_exact_multiple() {
        let windows = BlockWindows::new(0, 3, 2).collect::<Vec<_>>();
        assert_eq!(windows, vec![(0, 1), (2, 3)]);
    }

    #[test_log::test]
    fn test_block_windows_partial_window() {
        let windows = BlockWindows::new(0, 4, 2).collect::<Vec<_>>();
        assert_eq!(windows, vec![(0, 1), (2, 3), (4, 4)]);
    }

    #[test_log::test]
    fn test_block_windows_small() {
        let windows = BlockWindows::new(1, 1, 10).collect::<Vec<_>>();
        assert_eq!(windows, vec![(1, 1)]);
    }

    #[test_log::test]
    fn test_block_windows_empty_range() {
        let windows = BlockWindows::new(5, 4, 10).collect::<Vec<_>>();
        assert_eq!(windows, Vec::<(u64, u64)>::new());
    }

    #[test_log::test]
    fn test_block_windows_reach_top_of_block_space() {
        let windows = BlockWindows::new(u64::MAX - 2, u64::MAX, 2).collect::<Vec<_>>();
        assert_eq!(
            windows,
            vec![(u64::MAX - 2, u64::MAX - 1), (u64::MAX, u64::MAX)]
        );
    }

    #[test_log::test]
    fn test_block_windows_resume() {
        let mut windows = BlockWindows::new(0, 9, 3);
        assert_eq!(windows.next(), Some((0, 2)));
        assert_eq!(windows.next(), Some((3, 5)));

        // Pretend the (3, 5) window failed and restart from it.
        windows.resume_from(3);
        assert_eq!(windows.collect::<Vec<_>>(), vec![(3, 5), (6, 8), (9, 9)]);
    }

    fn market() -> Address {
        Address::repeat_byte(0x11)
    }

    fn sample_source() -> MemoryLogSource {
        let depositor = Address::repeat_byte(2);
        let token = Address::repeat_byte(3);
        let protocol = Address::repeat_byte(4);
        MemoryLogSource::new(
            market(),
            vec![
                direct_log(protocol, depositor, token, 100, 1, 1),
                direct_log(protocol, depositor, token, 50, 7, 2),
                direct_log(protocol, depositor, token, 25, 19, 3),
            ],
        )
    }

    #[test_log::test(tokio::test)]
    async fn test_scan_collects_all_windows() {
        let source = sample_source();
        let scanner = RangeScanner::new(source, 5);
        let logs = scanner.scan(market(), 0, 20).await.unwrap();
        assert_eq!(logs.len(), 3);
        // Chain order is preserved across window boundaries.
        let blocks = logs
            .iter()
            .map(|log| log.block_number.unwrap())
            .collect::<Vec<_>>();
        assert_eq!(blocks, vec![1, 7, 19]);
    }

    #[test_log::test(tokio::test)]
    async fn test_scan_respects_max_range() {
        // The memory source rejects any filter spanning more than its configured limit, like a
        // real RPC node does.
        let source = sample_source().with_max_block_range(5);
        let scanner = RangeScanner::new(source, 5);
        assert!(scanner.scan(market(), 0, 20).await.is_ok());

        let source = sample_source().with_max_block_range(5);
        let scanner = RangeScanner::new(source, 6);
        let err = scanner.scan(market(), 0, 20).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteHistory);
    }

    #[test_log::test(tokio::test)]
    async fn test_scan_window_failure_aborts() {
        let source = FailingLogSource::new(sample_source(), 5);
        let scanner = RangeScanner::new(source, 5);
        let err = scanner.scan(market(), 0, 20).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteHistory);
    }

    #[test_log::test(tokio::test)]
    async fn test_scan_window_split_is_invisible() {
        let coarse = RangeScanner::new(sample_source(), 100)
            .scan(market(), 0, 20)
            .await
            .unwrap();
        let fine = RangeScanner::new(sample_source(), 1)
            .scan(market(), 0, 20)
            .await
            .unwrap();
        assert_eq!(coarse, fine);
    }
}
