//! Offset/limit pagination.
//!
//! Every page is fetched over its own connection which is released before
//! the page's records are handed out, so a paginator never holds a
//! connection between pulls and stopping early needs no cleanup.

use std::iter::FusedIterator;

use tracing::debug;

use crate::connector::Connector;
use crate::cursor::collect_scan;
use crate::errors::{Operation, Position, Result, invalid_argument};
use crate::query::{ScanQuery, TableRef};
use crate::value::Record;

/// Records returned by one bounded query. An empty page marks the end of
/// the data.
pub type Page = Vec<Record>;

fn check_page_size(op: Operation, page_size: usize) -> Result<()> {
    if page_size == 0 {
        return Err(invalid_argument!(
            op,
            "page size must be at least 1, got {page_size}"
        ));
    }
    if i64::try_from(page_size).is_err() {
        return Err(invalid_argument!(
            op,
            "page size must be at most {}, got {page_size}",
            i64::MAX
        ));
    }
    Ok(())
}

fn fetch(
    connector: &impl Connector,
    table: &TableRef,
    page_size: usize,
    offset: usize,
    operation: Operation,
) -> Result<Page> {
    let query = ScanQuery::users(table.clone()).window(page_size, offset);
    let page = collect_scan(connector, &query, operation)
        .map_err(|e| e.with_position(Position::Offset(offset)))?;
    debug!(%table, offset, page_size, len = page.len(), "fetched page");
    Ok(page)
}

/// Fetch `page_size` user rows of `table` starting at `offset`.
pub fn fetch_page<K: Connector>(
    connector: &K,
    table: &str,
    page_size: usize,
    offset: usize,
) -> Result<Page> {
    check_page_size(Operation::FetchPage, page_size)?;
    if i64::try_from(offset).is_err() {
        return Err(invalid_argument!(
            Operation::FetchPage,
            "offset must be at most {}, got {offset}",
            i64::MAX
        ));
    }
    let table = TableRef::try_new(Operation::FetchPage, table)?;
    fetch(connector, &table, page_size, offset, Operation::FetchPage)
}

/// Lazily page through the user rows of `table`.
///
/// The next page is only requested once every record of the current page
/// has been pulled. The sequence ends at the first empty page.
pub fn lazy_paginate<K: Connector>(
    connector: K,
    table: &str,
    page_size: usize,
) -> Result<Paginator<K>> {
    check_page_size(Operation::LazyPaginate, page_size)?;
    let table = TableRef::try_new(Operation::LazyPaginate, table)?;

    Ok(Paginator {
        connector,
        table,
        page_size,
        offset: 0,
        current: Vec::new().into_iter(),
        page_loaded: false,
        done: false,
        pages_fetched: 0,
    })
}

pub struct Paginator<K: Connector> {
    connector: K,
    table: TableRef,
    page_size: usize,
    /// Offset of the page currently being handed out, or of the next page
    /// to fetch if none is loaded.
    offset: usize,
    current: std::vec::IntoIter<Record>,
    page_loaded: bool,
    done: bool,
    pages_fetched: usize,
}

impl<K: Connector> Paginator<K> {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of page queries issued, including the final empty probe.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }
}

impl<K: Connector> Iterator for Paginator<K> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.current.next() {
            return Some(Ok(record));
        }
        if self.done {
            return None;
        }

        if self.page_loaded {
            // Current page fully delivered.
            self.page_loaded = false;
            match self.offset.checked_add(self.page_size) {
                Some(offset) if i64::try_from(offset).is_ok() => self.offset = offset,
                // No row can live past this offset.
                _ => {
                    self.done = true;
                    return None;
                }
            }
        }
        self.current = Vec::new().into_iter();

        self.pages_fetched += 1;
        let page = match fetch(
            &self.connector,
            &self.table,
            self.page_size,
            self.offset,
            Operation::LazyPaginate,
        ) {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        if page.is_empty() {
            debug!(table = %self.table, offset = self.offset, pages = self.pages_fetched, "pagination finished");
            self.done = true;
            return None;
        }

        self.page_loaded = true;
        self.current = page.into_iter();
        self.current.next().map(Ok)
    }
}

impl<K: Connector> FusedIterator for Paginator<K> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StreamError;
    use crate::stream::stream_all;
    use crate::testutil::{generated_rows, ids, users_fixture, users_fixture_with};

    #[test]
    fn paginate_in_pages_of_two() {
        let connector = users_fixture();
        let mut pages = lazy_paginate(&connector, "users", 2).unwrap();
        let rows = pages.by_ref().collect::<Result<Vec<_>>>().unwrap();

        assert_eq!(vec![1, 2, 3, 4, 5], ids(&rows));
        assert_eq!(vec![0, 2, 4, 6], connector.executed_offsets());
        assert_eq!(4, pages.pages_fetched());
        assert_eq!(6, pages.offset());

        let stats = connector.stats();
        assert_eq!(4, stats.connects);
        assert_eq!(4, stats.connection_closes);
    }

    #[test]
    fn output_equals_stream_and_probe_count() {
        for n in [0, 1, 5, 9, 10, 11] {
            let connector = users_fixture_with(generated_rows(n));
            let all = stream_all(&connector, "users")
                .unwrap()
                .collect::<Result<Vec<_>>>()
                .unwrap();

            for page_size in 1..=12 {
                let mut pages = lazy_paginate(&connector, "users", page_size).unwrap();
                let got = pages.by_ref().collect::<Result<Vec<_>>>().unwrap();

                assert_eq!(all, got, "n {n}, page size {page_size}");
                assert_eq!(
                    n.div_ceil(page_size) + 1,
                    pages.pages_fetched(),
                    "n {n}, page size {page_size}"
                );
            }
        }
    }

    #[test]
    fn advances_only_after_page_consumed() {
        let connector = users_fixture();
        let mut pages = lazy_paginate(&connector, "users", 2).unwrap();
        assert!(connector.events().is_empty());

        pages.next().unwrap().unwrap();
        assert_eq!(vec![0], connector.executed_offsets());

        // Last record of the first page, no new fetch.
        pages.next().unwrap().unwrap();
        assert_eq!(vec![0], connector.executed_offsets());
        assert_eq!(0, pages.offset());

        pages.next().unwrap().unwrap();
        assert_eq!(vec![0, 2], connector.executed_offsets());
        assert_eq!(2, pages.offset());
    }

    #[test]
    fn early_stop_leaves_nothing_open() {
        let connector = users_fixture_with(generated_rows(10));
        let first: Vec<_> = lazy_paginate(&connector, "users", 4)
            .unwrap()
            .take(5)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(vec![1, 2, 3, 4, 5], ids(&first));

        let stats = connector.stats();
        assert_eq!(2, stats.connects);
        assert_eq!(stats.connects, stats.connection_closes);
        assert_eq!(stats.queries, stats.cursor_closes);
    }

    #[test]
    fn fetch_failure_is_terminal() {
        let connector = users_fixture();
        connector.fail_after_rows(3);

        let mut pages = lazy_paginate(&connector, "users", 2).unwrap();
        let results: Vec<_> = pages.by_ref().collect();

        // The second page fails part way, none of its rows are yielded.
        assert_eq!(3, results.len());
        assert!(results[..2].iter().all(|r| r.is_ok()));
        match &results[2] {
            Err(StreamError::Query {
                operation,
                position,
                ..
            }) => {
                assert_eq!(Operation::LazyPaginate, *operation);
                assert_eq!(Position::Offset(2), *position);
            }
            other => panic!("unexpected: {other:?}"),
        }

        assert!(pages.next().is_none());
        assert_eq!(2, pages.pages_fetched());
        assert_eq!(2, connector.stats().connection_closes);
    }

    #[test]
    fn connection_failure_is_terminal() {
        let connector = users_fixture();
        connector.refuse_connections(true);

        let results: Vec<_> = lazy_paginate(&connector, "users", 2).unwrap().collect();
        assert_eq!(1, results.len());
        assert!(results[0].as_ref().unwrap_err().is_connection());
    }

    #[test]
    fn zero_page_size_rejected() {
        let connector = users_fixture();
        assert!(matches!(
            lazy_paginate(&connector, "users", 0),
            Err(StreamError::InvalidArgument { .. })
        ));
        assert!(fetch_page(&connector, "users", 0, 0)
            .unwrap_err()
            .is_invalid_argument());
        assert!(connector.events().is_empty());
    }

    #[test]
    fn oversized_page_size_rejected() {
        let connector = users_fixture();
        let too_big = i64::MAX as usize + 1;

        assert!(lazy_paginate(&connector, "users", too_big)
            .map(|_| ())
            .unwrap_err()
            .is_invalid_argument());
        assert!(fetch_page(&connector, "users", too_big, 0)
            .unwrap_err()
            .is_invalid_argument());
        assert!(fetch_page(&connector, "users", 2, usize::MAX)
            .unwrap_err()
            .is_invalid_argument());
        assert!(connector.events().is_empty());
    }

    #[test]
    fn huge_page_over_small_table() {
        let connector = users_fixture();
        let mut pages = lazy_paginate(&connector, "users", 1 << 60).unwrap();
        let rows = pages.by_ref().collect::<Result<Vec<_>>>().unwrap();

        assert_eq!(vec![1, 2, 3, 4, 5], ids(&rows));
        assert_eq!(vec![0, 1 << 60], connector.executed_offsets());
        assert_eq!(2, connector.stats().connection_closes);

        let page = fetch_page(&connector, "users", i64::MAX as usize, 0).unwrap();
        assert_eq!(5, page.len());
    }

    #[test]
    fn offset_past_addressable_range_ends_pagination() {
        let connector = users_fixture();
        let page_size = i64::MAX as usize;
        let mut pages = lazy_paginate(&connector, "users", page_size).unwrap();
        assert_eq!(5, pages.by_ref().count());

        // Advancing would leave the i64 range, so no probe query is issued.
        assert_eq!(vec![0], connector.executed_offsets());
        assert_eq!(1, pages.pages_fetched());
        assert!(pages.next().is_none());
    }

    #[test]
    fn connection_failure_reports_page_offset() {
        let connector = users_fixture();
        let mut pages = lazy_paginate(&connector, "users", 2).unwrap();
        pages.next().unwrap().unwrap();
        pages.next().unwrap().unwrap();

        connector.refuse_connections(true);
        let err = pages.next().unwrap().unwrap_err();
        match &err {
            StreamError::Connection {
                operation,
                position,
                ..
            } => {
                assert_eq!(Operation::LazyPaginate, *operation);
                assert_eq!(Some(Position::Offset(2)), *position);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(err.to_string().contains("at offset 2"));
        assert!(pages.next().is_none());
    }

    #[test]
    fn fetch_single_page() {
        let connector = users_fixture();
        let page = fetch_page(&connector, "users", 2, 2).unwrap();
        assert_eq!(vec![3, 4], ids(&page));

        let page = fetch_page(&connector, "users", 3, 4).unwrap();
        assert_eq!(vec![5], ids(&page));

        assert!(fetch_page(&connector, "users", 3, 5).unwrap().is_empty());

        let stats = connector.stats();
        assert_eq!(3, stats.connects);
        assert_eq!(3, stats.connection_closes);
    }
}
