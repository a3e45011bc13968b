// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Histograms attached to time-series data points.
//!
//! A data point may carry several histograms, one per measured quantity; each is tagged with a
//! one-byte identifier and owns a mergeable quantile sketch. The [`Histogram`] trait is the
//! capability set shared by every histogram kind, so callers can store, query and merge
//! histograms without knowing the sketch behind them.
//!
//! # Wire format
//!
//! ```text
//! without id:  [ sketch bytes... ]              length = S
//! with id:     [ id: 1 byte ][ sketch bytes... ] length = S + 1
//! ```
//!
//! Buffers shorter than [`MIN_RAW_LEN`] (or [`MIN_RAW_LEN_WITH_ID`] when prefixed) are rejected
//! before the sketch deserializer sees them. The deserializer still performs the structural
//! validation and reports truncation as
//! [`ErrorKind::MalformedDeserializeData`](crate::error::ErrorKind::MalformedDeserializeData).
//!
//! # Usage
//!
//! ```rust
//! # use datapoint_histogram::histogram::{Histogram, HistogramAggregation, TDigestHistogram};
//! # use datapoint_histogram::tdigest::TDigestMut;
//! let mut latency = TDigestMut::new(100);
//! for v in [42.5, 1.0, 24.0] {
//!     latency.update(v);
//! }
//! let mut histogram = TDigestHistogram::with_sketch(42, latency);
//! assert_eq!(histogram.percentile(50.0).unwrap(), 24.0);
//!
//! let encoded = histogram.encode(true).unwrap();
//! assert_eq!(encoded[0], 42);
//!
//! let mut other = TDigestHistogram::new(42);
//! other.decode(&encoded, true).unwrap();
//! histogram.merge(&other, HistogramAggregation::Sum).unwrap();
//! ```

mod aggregation;
mod codec;
mod sketch;

use std::any::Any;
use std::fmt;

pub use self::aggregation::HistogramAggregation;
pub use self::codec::CodecConfig;
pub use self::codec::DEFAULT_COMPRESSION;
pub use self::codec::HistogramCodec;
pub use self::codec::HistogramCodecBuilder;
pub use self::sketch::QuantileSketch;
pub use self::sketch::SketchHistogram;
pub use self::sketch::TDigestHistogram;
use crate::error::Error;

/// Minimum length of a raw buffer without an identifier prefix.
pub const MIN_RAW_LEN: usize = 8;
/// Minimum length of a raw buffer carrying an identifier prefix.
pub const MIN_RAW_LEN_WITH_ID: usize = MIN_RAW_LEN + 1;

/// Largest identifier a histogram may carry.
pub const MAX_ID: i64 = u8::MAX as i64;

/// One bucket of a structured histogram.
///
/// Returned by [`Histogram::raw_histogram`]. No histogram kind in this crate produces buckets
/// yet, so every implementation currently fails with
/// [`ErrorKind::Unsupported`](crate::error::ErrorKind::Unsupported).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    /// Inclusive lower bound.
    pub lower: f64,
    /// Exclusive upper bound.
    pub upper: f64,
    /// Number of values in the bucket.
    pub count: u64,
}

/// Capabilities shared by every histogram kind.
///
/// Implementations are not synchronized: mutation through [`Histogram::decode`] or
/// [`Histogram::merge`] needs exclusive access, while percentile queries only borrow.
pub trait Histogram: fmt::Debug + Send + Sync {
    /// The identifier of this histogram within its data point.
    fn id(&self) -> u8;

    /// Name of the concrete histogram kind, reported when kinds are mixed up.
    fn kind(&self) -> &'static str;

    /// Encodes the sketch, optionally prefixed with the identifier byte.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::NotPopulated`](crate::error::ErrorKind::NotPopulated) if no sketch is set.
    fn encode(&self, include_id: bool) -> Result<Vec<u8>, Error>;

    /// Replaces the sketch with one decoded from `raw`.
    ///
    /// When `includes_id` is set, the first byte is skipped. On error the previous sketch, if
    /// any, is kept.
    fn decode(&mut self, raw: &[u8], includes_id: bool) -> Result<(), Error>;

    /// Estimates the value at percentile `p`, with `p` in `[0, 100]`.
    fn percentile(&self, p: f64) -> Result<f64, Error>;

    /// Estimates several percentiles at once, in the order given.
    ///
    /// Fails without a partial result if any entry is invalid.
    fn percentiles(&self, ps: &[f64]) -> Result<Vec<f64>, Error> {
        for &p in ps {
            check_percentile(p)?;
        }
        ps.iter().map(|&p| self.percentile(p)).collect()
    }

    /// Folds `other` into this histogram using `function`.
    fn merge(
        &mut self,
        other: &dyn Histogram,
        function: HistogramAggregation,
    ) -> Result<(), Error>;

    /// Folds every histogram of `others` into this one, left to right.
    fn merge_all(
        &mut self,
        others: &[&dyn Histogram],
        function: HistogramAggregation,
    ) -> Result<(), Error>;

    /// Deep copy that shares no state with `self`.
    fn clone_histogram(&self) -> Result<Box<dyn Histogram>, Error>;

    /// Structured bucket view of the histogram.
    ///
    /// Not supported by sketch-backed histograms.
    fn raw_histogram(&self) -> Result<Vec<Bucket>, Error> {
        Err(Error::unsupported("structured histogram extraction is not supported yet")
            .with_context("kind", self.kind()))
    }

    /// Upcast used to check the concrete kind before merging.
    fn as_any(&self) -> &dyn Any;
}

/// Validates an identifier given as a wide integer.
pub(crate) fn check_id(id: i64) -> Result<u8, Error> {
    u8::try_from(id).map_err(|_| {
        Error::invalid_argument(format!("id must be between 0 and {MAX_ID}")).with_context("id", id)
    })
}

pub(crate) fn check_percentile(p: f64) -> Result<(), Error> {
    if (0.0..=100.0).contains(&p) {
        Ok(())
    } else {
        Err(Error::invalid_argument("percentile must be between 0 and 100").with_context("p", p))
    }
}

pub(crate) fn check_raw_len(raw: &[u8], includes_id: bool) -> Result<(), Error> {
    if raw.len() < MIN_RAW_LEN {
        return Err(Error::invalid_argument(format!(
            "raw data cannot be less than {MIN_RAW_LEN} bytes"
        ))
        .with_context("len", raw.len()));
    }
    if includes_id && raw.len() < MIN_RAW_LEN_WITH_ID {
        return Err(Error::invalid_argument(format!(
            "raw data with an id cannot be less than {MIN_RAW_LEN_WITH_ID} bytes"
        ))
        .with_context("len", raw.len()));
    }
    Ok(())
}
