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

use std::fmt;
use std::marker::PhantomData;

use tracing::debug;

use crate::error::Error;
use crate::histogram::Histogram;
use crate::histogram::QuantileSketch;
use crate::histogram::SketchHistogram;
use crate::histogram::TDigestHistogram;
use crate::histogram::check_id;
use crate::histogram::check_raw_len;
use crate::tdigest::TDigest;
use crate::tdigest::TDigestMut;

/// Compression handed to new sketches when none is configured.
pub const DEFAULT_COMPRESSION: u16 = 100;

/// Settings of a [`HistogramCodec`].
///
/// With the `serde` feature enabled, missing fields fall back to [`CodecConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct CodecConfig {
    /// Identifier given to every decoded histogram, in `[0, 255]`.
    pub id: i64,
    /// Compression parameter for sketches created through the codec.
    pub compression: u16,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            id: 0,
            compression: DEFAULT_COMPRESSION,
        }
    }
}

/// Translates between raw byte buffers and [`SketchHistogram`]s of one kind.
///
/// The identifier is fixed when the codec is built and stamped on every histogram it decodes;
/// identifier bytes embedded in incoming buffers are skipped, never checked or corrected.
///
/// # Examples
///
/// ```
/// # use datapoint_histogram::histogram::{Histogram, HistogramCodec};
/// let codec = HistogramCodec::builder().id(42).build().unwrap();
/// let mut sketch = codec.new_sketch();
/// sketch.update(42.5);
/// sketch.update(1.0);
///
/// let mut histogram = codec.new_histogram();
/// histogram.set_sketch(sketch);
/// let raw = codec.encode(&histogram, true).unwrap();
/// assert_eq!(raw[0], 42);
///
/// let decoded = codec.decode(&raw, true).unwrap();
/// assert_eq!(decoded.id(), 42);
/// assert_eq!(decoded.percentile(100.0).unwrap(), 42.5);
/// ```
pub struct HistogramCodec<S = TDigest> {
    id: u8,
    compression: u16,
    _sketch: PhantomData<fn() -> S>,
}

impl<S> fmt::Debug for HistogramCodec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramCodec")
            .field("id", &self.id)
            .field("compression", &self.compression)
            .finish()
    }
}

impl<S> Clone for HistogramCodec<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            compression: self.compression,
            _sketch: PhantomData,
        }
    }
}

impl HistogramCodec {
    /// Returns a builder for a t-digest codec.
    pub fn builder() -> HistogramCodecBuilder {
        HistogramCodecBuilder::default()
    }

    /// Creates an empty sketch with the configured compression.
    pub fn new_sketch(&self) -> TDigestMut {
        TDigestMut::new(self.compression)
    }

    /// Creates an unpopulated histogram carrying the configured identifier.
    pub fn new_histogram(&self) -> TDigestHistogram {
        TDigestHistogram::new(self.id)
    }
}

impl<S: QuantileSketch> HistogramCodec<S> {
    /// Creates a codec with an already validated identifier and the default compression.
    pub fn new(id: u8) -> Self {
        Self {
            id,
            compression: DEFAULT_COMPRESSION.max(S::MIN_COMPRESSION),
            _sketch: PhantomData,
        }
    }

    /// Builds a codec from its configuration.
    pub fn from_config(config: &CodecConfig) -> Result<Self, Error> {
        HistogramCodecBuilder::<S>::default()
            .id(config.id)
            .compression(config.compression)
            .build()
    }

    /// Identifier stamped on decoded histograms.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Compression parameter for new sketches.
    pub fn compression(&self) -> u16 {
        self.compression
    }

    /// Decodes a histogram from `raw`.
    ///
    /// # Errors
    ///
    /// * [`ErrorKind::InvalidArgument`] if `raw` is shorter than
    ///   [`MIN_RAW_LEN`](crate::histogram::MIN_RAW_LEN), or than
    ///   [`MIN_RAW_LEN_WITH_ID`](crate::histogram::MIN_RAW_LEN_WITH_ID) when `includes_id` is set.
    /// * [`ErrorKind::MalformedDeserializeData`] if the sketch bytes are corrupt.
    ///
    /// [`ErrorKind::InvalidArgument`]: crate::error::ErrorKind::InvalidArgument
    /// [`ErrorKind::MalformedDeserializeData`]: crate::error::ErrorKind::MalformedDeserializeData
    pub fn decode(&self, raw: &[u8], includes_id: bool) -> Result<SketchHistogram<S>, Error> {
        check_raw_len(raw, includes_id)?;
        let mut histogram = SketchHistogram::new(self.id);
        histogram.decode(raw, includes_id).inspect_err(|err| {
            debug!(
                id = self.id,
                len = raw.len(),
                includes_id,
                error = %err,
                "Failed to decode histogram."
            );
        })?;
        Ok(histogram)
    }

    /// Like [`HistogramCodec::decode`], treating an absent buffer as an invalid argument.
    pub fn decode_opt(
        &self,
        raw: Option<&[u8]>,
        includes_id: bool,
    ) -> Result<SketchHistogram<S>, Error> {
        let raw = raw.ok_or_else(|| Error::invalid_argument("raw data cannot be absent"))?;
        self.decode(raw, includes_id)
    }

    /// Encodes `histogram`, optionally prefixed with its identifier byte.
    pub fn encode(&self, histogram: &dyn Histogram, include_id: bool) -> Result<Vec<u8>, Error> {
        histogram.encode(include_id)
    }

    /// Like [`HistogramCodec::encode`], treating an absent histogram as an invalid argument.
    pub fn encode_opt(
        &self,
        histogram: Option<&dyn Histogram>,
        include_id: bool,
    ) -> Result<Vec<u8>, Error> {
        let histogram =
            histogram.ok_or_else(|| Error::invalid_argument("histogram cannot be absent"))?;
        self.encode(histogram, include_id)
    }
}

/// Builder for [`HistogramCodec`].
///
/// The identifier is validated once, in [`HistogramCodecBuilder::build`].
pub struct HistogramCodecBuilder<S = TDigest> {
    id: i64,
    compression: u16,
    _sketch: PhantomData<fn() -> S>,
}

impl<S> Default for HistogramCodecBuilder<S> {
    fn default() -> Self {
        Self {
            id: 0,
            compression: DEFAULT_COMPRESSION,
            _sketch: PhantomData,
        }
    }
}

impl<S> fmt::Debug for HistogramCodecBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramCodecBuilder")
            .field("id", &self.id)
            .field("compression", &self.compression)
            .finish()
    }
}

impl<S: QuantileSketch> HistogramCodecBuilder<S> {
    /// Sets the identifier stamped on decoded histograms.
    pub fn id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Sets the compression parameter for new sketches.
    pub fn compression(mut self, compression: u16) -> Self {
        self.compression = compression;
        self
    }

    /// Builds the codec.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument) if the
    /// identifier is outside `[0, 255]` or the compression is below the sketch's minimum.
    pub fn build(self) -> Result<HistogramCodec<S>, Error> {
        let id = check_id(self.id)?;
        if self.compression < S::MIN_COMPRESSION {
            return Err(Error::invalid_argument(format!(
                "compression must be at least {}",
                S::MIN_COMPRESSION
            ))
            .with_context("compression", self.compression));
        }
        Ok(HistogramCodec {
            id,
            compression: self.compression,
            _sketch: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_builder_validates_once() {
        let codec = HistogramCodec::builder().id(255).compression(10).build().unwrap();
        assert_eq!(codec.id(), 255);
        assert_eq!(codec.compression(), 10);

        let err = HistogramCodec::builder().id(256).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = HistogramCodec::builder().compression(9).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_from_default_config() {
        let codec = HistogramCodec::<TDigest>::from_config(&CodecConfig::default()).unwrap();
        assert_eq!(codec.id(), 0);
        assert_eq!(codec.compression(), DEFAULT_COMPRESSION);
        assert_eq!(codec.new_sketch().k(), DEFAULT_COMPRESSION);
    }
}
