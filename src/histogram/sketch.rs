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

use std::any::Any;
use std::fmt;

use tracing::debug;
use tracing::trace;

use crate::error::Error;
use crate::histogram::Histogram;
use crate::histogram::HistogramAggregation;
use crate::histogram::check_id;
use crate::histogram::check_percentile;
use crate::histogram::check_raw_len;
use crate::tdigest::MIN_K;
use crate::tdigest::TDigest;

/// The mergeable quantile estimator behind a [`SketchHistogram`].
///
/// The histogram layer treats the sketch as opaque: it only queries, merges, and moves it in and
/// out of its own byte format.
pub trait QuantileSketch: fmt::Debug + Send + Sync + Sized + 'static {
    /// Name of the histogram kind backed by this sketch.
    const KIND: &'static str;

    /// Smallest compression parameter accepted when creating sketches of this kind.
    const MIN_COMPRESSION: u16;

    /// Estimated value at normalized rank `rank` in `[0, 1]`; `None` if the sketch is empty.
    fn quantile(&self, rank: f64) -> Option<f64>;

    /// Folds `other` into `self`.
    fn merge(&mut self, other: &Self);

    /// Exact length of the serialized form.
    fn serialized_size(&self) -> usize;

    /// Appends the serialized form to `out`.
    fn serialize_into(&self, out: &mut Vec<u8>);

    /// Reads a sketch back from its serialized form.
    fn deserialize(bytes: &[u8]) -> Result<Self, Error>;
}

impl QuantileSketch for TDigest {
    const KIND: &'static str = "tdigest";
    const MIN_COMPRESSION: u16 = MIN_K;

    fn quantile(&self, rank: f64) -> Option<f64> {
        TDigest::quantile(self, rank)
    }

    fn merge(&mut self, other: &Self) {
        TDigest::merge(self, other)
    }

    fn serialized_size(&self) -> usize {
        TDigest::serialized_size(self)
    }

    fn serialize_into(&self, out: &mut Vec<u8>) {
        TDigest::serialize_into(self, out)
    }

    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        TDigest::deserialize(bytes)
    }
}

/// Histogram backed by a t-digest.
pub type TDigestHistogram = SketchHistogram<TDigest>;

/// A histogram identifier plus an exclusively owned sketch.
///
/// A histogram starts unpopulated and receives its sketch either directly
/// ([`SketchHistogram::set_sketch`]) or by decoding raw bytes ([`Histogram::decode`]).
/// Querying, encoding or merging an unpopulated histogram fails with
/// [`ErrorKind::NotPopulated`](crate::error::ErrorKind::NotPopulated).
#[derive(Debug)]
pub struct SketchHistogram<S> {
    id: u8,
    sketch: Option<S>,
}

impl<S: QuantileSketch> SketchHistogram<S> {
    /// Creates an unpopulated histogram.
    pub fn new(id: u8) -> Self {
        Self { id, sketch: None }
    }

    /// Creates an unpopulated histogram from an unchecked identifier.
    ///
    /// # Errors
    ///
    /// If `id` is outside `[0, 255]`, returns
    /// [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument).
    ///
    /// # Examples
    ///
    /// ```
    /// # use datapoint_histogram::histogram::{Histogram, TDigestHistogram};
    /// assert_eq!(TDigestHistogram::try_new(42).unwrap().id(), 42);
    /// assert!(TDigestHistogram::try_new(256).is_err());
    /// assert!(TDigestHistogram::try_new(-1).is_err());
    /// ```
    pub fn try_new(id: i64) -> Result<Self, Error> {
        check_id(id).map(Self::new)
    }

    /// Creates a populated histogram.
    pub fn with_sketch(id: u8, sketch: impl Into<S>) -> Self {
        Self {
            id,
            sketch: Some(sketch.into()),
        }
    }

    /// Replaces the sketch.
    pub fn set_sketch(&mut self, sketch: impl Into<S>) {
        self.sketch = Some(sketch.into());
    }

    /// The current sketch, if any.
    pub fn sketch(&self) -> Option<&S> {
        self.sketch.as_ref()
    }

    /// Removes and returns the sketch, leaving the histogram unpopulated.
    pub fn take_sketch(&mut self) -> Option<S> {
        self.sketch.take()
    }

    /// Whether a sketch has been set.
    pub fn is_populated(&self) -> bool {
        self.sketch.is_some()
    }

    /// Deep copy made by round-tripping the sketch through its byte form, so the copy shares
    /// nothing with `self`.
    pub fn try_clone(&self) -> Result<Self, Error> {
        let mut copy = Self::new(self.id);
        copy.decode(&self.encode(false)?, false)?;
        Ok(copy)
    }

    fn populated(&self) -> Result<&S, Error> {
        self.sketch.as_ref().ok_or_else(|| {
            Error::not_populated("the sketch has not been set yet").with_context("id", self.id)
        })
    }

    fn downcast(other: &dyn Histogram) -> Result<&Self, Error> {
        other.as_any().downcast_ref::<Self>().ok_or_else(|| {
            Error::invalid_argument("incoming histogram was not of the same kind")
                .with_context("expected", S::KIND)
                .with_context("actual", other.kind())
        })
    }
}

impl<S: QuantileSketch> Histogram for SketchHistogram<S> {
    fn id(&self) -> u8 {
        self.id
    }

    fn kind(&self) -> &'static str {
        S::KIND
    }

    fn encode(&self, include_id: bool) -> Result<Vec<u8>, Error> {
        let sketch = self.populated()?;
        let mut out = Vec::with_capacity(sketch.serialized_size() + usize::from(include_id));
        if include_id {
            out.push(self.id);
        }
        sketch.serialize_into(&mut out);
        Ok(out)
    }

    fn decode(&mut self, raw: &[u8], includes_id: bool) -> Result<(), Error> {
        check_raw_len(raw, includes_id)?;
        let payload = if includes_id {
            // the prefix is not required to match, which allows re-tagging a buffer
            if raw[0] != self.id {
                debug!(
                    id = self.id,
                    prefix = raw[0],
                    "Decoding histogram with a different id prefix."
                );
            }
            &raw[1..]
        } else {
            raw
        };
        let sketch = S::deserialize(payload)?;
        self.sketch = Some(sketch);
        Ok(())
    }

    /// Returns NaN if the sketch holds no values.
    fn percentile(&self, p: f64) -> Result<f64, Error> {
        check_percentile(p)?;
        let sketch = self.populated()?;
        Ok(sketch.quantile(p / 100.0).unwrap_or(f64::NAN))
    }

    fn merge(
        &mut self,
        other: &dyn Histogram,
        function: HistogramAggregation,
    ) -> Result<(), Error> {
        self.merge_all(&[other], function)
    }

    /// Every entry is checked before any is folded in, so on error `self` is unchanged.
    fn merge_all(
        &mut self,
        others: &[&dyn Histogram],
        function: HistogramAggregation,
    ) -> Result<(), Error> {
        function.ensure_supported()?;
        let sketches = others
            .iter()
            .map(|other| Self::downcast(*other)?.populated())
            .collect::<Result<Vec<&S>, Error>>()?;

        let id = self.id;
        let sketch = self.sketch.as_mut().ok_or_else(|| {
            Error::not_populated("cannot merge into a histogram without a sketch")
                .with_context("id", id)
        })?;
        for other in sketches {
            sketch.merge(other);
        }
        trace!(id, merged = others.len(), %function, "Merged histograms.");
        Ok(())
    }

    fn clone_histogram(&self) -> Result<Box<dyn Histogram>, Error> {
        Ok(Box::new(self.try_clone()?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
