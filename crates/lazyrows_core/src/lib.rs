//! Bounded memory streaming over tabular data sources.
//!
//! Three ways of reading the same table are provided, all lazy and pull
//! based:
//!
//! - [`stream_all`]: every row, one connection for the whole stream.
//! - [`stream_batches`] / [`filter_over_batches`]: fixed size batches drawn
//!   from the row stream, optionally filtered back down to records.
//! - [`lazy_paginate`]: offset/limit pages, one short-lived connection per
//!   page.
//!
//! [`average`] and friends reduce a stream in constant memory.
//!
//! The data source itself is abstracted behind [`connector::Connector`].

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod connector;
pub mod cursor;
pub mod errors;
pub mod memory;
pub mod paginate;
pub mod query;
pub mod stream;
pub mod value;

#[cfg(test)]
pub(crate) mod testutil;

pub use aggregate::{average, count_matching, maximum, minimum};
pub use batch::{Batch, filter_over_batches, stream_batches};
pub use cursor::query_all;
pub use errors::{Result, StreamError};
pub use paginate::{Page, fetch_page, lazy_paginate};
pub use stream::{stream_all, stream_columns, stream_user_ages};
pub use value::{Record, Value};
