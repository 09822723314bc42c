//! Constant memory reductions over fallible streams.

use crate::errors::Result;

/// State for a reduction that sees each input exactly once, in order.
pub trait StreamingReduction<T> {
    type Output;

    fn update(&mut self, input: T);

    fn finish(self) -> Self::Output;
}

/// Drive `reduction` over every value of `values`.
///
/// The first error aborts the reduction and is returned as is; no partial
/// result is produced.
pub fn reduce<T, I, R>(values: I, mut reduction: R) -> Result<R::Output>
where
    I: IntoIterator<Item = Result<T>>,
    R: StreamingReduction<T>,
{
    for value in values {
        reduction.update(value?);
    }
    Ok(reduction.finish())
}

/// Average of every value, 0 if there were none.
pub fn average<I>(values: I) -> Result<f64>
where
    I: IntoIterator<Item = Result<f64>>,
{
    reduce(values, RunningAverage::default())
}

pub fn minimum<I>(values: I) -> Result<Option<f64>>
where
    I: IntoIterator<Item = Result<f64>>,
{
    reduce(values, Extreme::min())
}

pub fn maximum<I>(values: I) -> Result<Option<f64>>
where
    I: IntoIterator<Item = Result<f64>>,
{
    reduce(values, Extreme::max())
}

/// Number of values satisfying `predicate`.
pub fn count_matching<T, I, P>(values: I, predicate: P) -> Result<u64>
where
    I: IntoIterator<Item = Result<T>>,
    P: FnMut(&T) -> bool,
{
    reduce(values, CountMatching { predicate, count: 0 })
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunningAverage {
    sum: f64,
    count: u64,
}

impl RunningAverage {
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl StreamingReduction<f64> for RunningAverage {
    type Output = f64;

    fn update(&mut self, input: f64) {
        self.sum += input;
        self.count += 1;
    }

    fn finish(self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extreme {
    current: Option<f64>,
    keep_greater: bool,
}

impl Extreme {
    pub fn min() -> Self {
        Extreme {
            current: None,
            keep_greater: false,
        }
    }

    pub fn max() -> Self {
        Extreme {
            current: None,
            keep_greater: true,
        }
    }
}

impl StreamingReduction<f64> for Extreme {
    type Output = Option<f64>;

    fn update(&mut self, input: f64) {
        self.current = match self.current {
            None => Some(input),
            Some(curr) if self.keep_greater => Some(curr.max(input)),
            Some(curr) => Some(curr.min(input)),
        };
    }

    fn finish(self) -> Option<f64> {
        self.current
    }
}

pub struct CountMatching<P> {
    predicate: P,
    count: u64,
}

impl<T, P> StreamingReduction<T> for CountMatching<P>
where
    P: FnMut(&T) -> bool,
{
    type Output = u64;

    fn update(&mut self, input: T) {
        if (self.predicate)(&input) {
            self.count += 1;
        }
    }

    fn finish(self) -> u64 {
        self.count
    }
}
