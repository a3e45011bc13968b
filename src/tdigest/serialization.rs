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

use std::num::NonZeroU64;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::error::Error;
use crate::tdigest::MIN_K;
use crate::tdigest::TDigest;
use crate::tdigest::TDigestMut;
use crate::tdigest::sketch::Centroid;

const PREAMBLE_LONGS_EMPTY_OR_SINGLE: u8 = 1;
const PREAMBLE_LONGS_MULTIPLE: u8 = 2;
const SERIAL_VERSION: u8 = 1;
const FLAGS_IS_EMPTY: u8 = 1 << 0;
const FLAGS_IS_SINGLE_VALUE: u8 = 1 << 1;
const FLAGS_REVERSE_MERGE: u8 = 1 << 2;
/// `asBytes()` layout of the reference implementation: doubles, big endian.
const COMPAT_DOUBLE: u32 = 1;
/// `asSmallBytes()` layout of the reference implementation: floats, big endian.
const COMPAT_FLOAT: u32 = 2;

/// Borrowed view of a compressed digest, shared by both digest flavours.
struct NativeLayout<'a> {
    k: u16,
    reverse_merge: bool,
    min: f64,
    centroids: &'a [Centroid],
    max: f64,
    total_weight: u64,
}

impl NativeLayout<'_> {
    fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    fn is_single_value(&self) -> bool {
        self.total_weight == 1
    }

    fn serialized_size(&self) -> usize {
        // preamble, serial version, family, k (2), flags, unused (2)
        let mut size = size_of::<u64>();
        if self.is_empty() {
            return size;
        }
        if self.is_single_value() {
            return size + size_of::<f64>();
        }
        // num centroids, num buffered
        size += size_of::<u32>() * 2;
        // min, max
        size += size_of::<f64>() * 2;
        size + self.centroids.len() * (size_of::<f64>() + size_of::<u64>())
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.reserve(self.serialized_size());
        let mut bytes = SketchBytes::new(out);
        bytes.write_u8(if self.is_empty() || self.is_single_value() {
            PREAMBLE_LONGS_EMPTY_OR_SINGLE
        } else {
            PREAMBLE_LONGS_MULTIPLE
        });
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::TDIGEST.id);
        bytes.write_u16_le(self.k);
        bytes.write_u8({
            let mut flags = 0;
            if self.is_empty() {
                flags |= FLAGS_IS_EMPTY;
            }
            if self.is_single_value() {
                flags |= FLAGS_IS_SINGLE_VALUE;
            }
            if self.reverse_merge {
                flags |= FLAGS_REVERSE_MERGE;
            }
            flags
        });
        bytes.write_u16_le(0); // unused
        if self.is_empty() {
            return;
        }
        if self.is_single_value() {
            bytes.write_f64_le(self.min);
            return;
        }
        bytes.write_u32_le(self.centroids.len() as u32);
        bytes.write_u32_le(0); // buffered values are always compressed first
        bytes.write_f64_le(self.min);
        bytes.write_f64_le(self.max);
        for centroid in self.centroids {
            bytes.write_f64_le(centroid.mean);
            bytes.write_u64_le(centroid.weight.get());
        }
    }
}

impl TDigest {
    fn layout(&self) -> NativeLayout<'_> {
        NativeLayout {
            k: self.k,
            reverse_merge: self.reverse_merge,
            min: self.min,
            max: self.max,
            centroids: &self.centroids,
            total_weight: self.centroids_weight,
        }
    }

    /// Number of bytes [`TDigest::serialize`] produces.
    pub fn serialized_size(&self) -> usize {
        self.layout().serialized_size()
    }

    /// Appends the serialized form of this TDigest to `out`.
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        self.layout().write(out);
    }

    /// Serializes this TDigest to bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// # use datapoint_histogram::tdigest::{TDigest, TDigestMut};
    /// let digest = TDigestMut::new(100).freeze();
    /// let bytes = digest.serialize();
    /// assert_eq!(bytes.len(), 8);
    /// assert!(TDigest::deserialize(&bytes).unwrap().is_empty());
    /// ```
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        self.serialize_into(&mut out);
        out
    }

    /// Deserializes a TDigest from bytes, compressing any buffered values.
    ///
    /// See [`TDigestMut::deserialize`] for the accepted formats.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        TDigestMut::deserialize(bytes).map(TDigestMut::freeze)
    }
}

impl TDigestMut {
    /// Serializes this TDigest to bytes, compressing buffered values first.
    pub fn serialize(&mut self) -> Vec<u8> {
        self.compress();
        let layout = NativeLayout {
            k: self.k,
            reverse_merge: self.reverse_merge,
            min: self.min,
            max: self.max,
            centroids: &self.centroids,
            total_weight: self.centroids_weight,
        };
        let mut out = Vec::with_capacity(layout.serialized_size());
        layout.write(&mut out);
        out
    }

    /// Deserializes a TDigest from bytes.
    ///
    /// Reads the native format written by [`TDigest::serialize`], and auto-detects the
    /// big-endian `asBytes()`/`asSmallBytes()` formats of the reference implementation [^1].
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MalformedDeserializeData`] if the bytes are truncated or describe an
    /// invalid digest.
    ///
    /// [^1]: <https://github.com/tdunning/t-digest>
    /// [`ErrorKind::MalformedDeserializeData`]: crate::error::ErrorKind::MalformedDeserializeData
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        fn make_error(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
            move |err| Error::insufficient_data(tag, err)
        }

        let mut cursor = SketchSlice::new(bytes);

        let preamble_longs = cursor.read_u8().map_err(make_error("preamble_longs"))?;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        if let Err(err) = Family::TDIGEST.validate_id(family_id) {
            // the reference formats start with a big-endian u32 encoding type
            return if preamble_longs == 0 && serial_version == 0 && family_id == 0 {
                Self::deserialize_compat(bytes)
            } else {
                Err(err)
            };
        }
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(
                SERIAL_VERSION,
                serial_version,
            ));
        }
        let k = cursor.read_u16_le().map_err(make_error("k"))?;
        check_k(k, "k")?;
        let flags = cursor.read_u8().map_err(make_error("flags"))?;
        let is_empty = (flags & FLAGS_IS_EMPTY) != 0;
        let is_single_value = (flags & FLAGS_IS_SINGLE_VALUE) != 0;
        let expected_preamble_longs = if is_empty || is_single_value {
            PREAMBLE_LONGS_EMPTY_OR_SINGLE
        } else {
            PREAMBLE_LONGS_MULTIPLE
        };
        if preamble_longs != expected_preamble_longs {
            return Err(Error::invalid_preamble_longs(
                expected_preamble_longs,
                preamble_longs,
            ));
        }
        cursor.read_u16_le().map_err(make_error("<unused>"))?;
        if is_empty {
            return Ok(TDigestMut::new(k));
        }

        let reverse_merge = (flags & FLAGS_REVERSE_MERGE) != 0;
        if is_single_value {
            let value = cursor.read_f64_le().map_err(make_error("single_value"))?;
            check_finite(value, "single_value")?;
            return Ok(TDigestMut::make(
                k,
                reverse_merge,
                value,
                value,
                vec![Centroid {
                    mean: value,
                    weight: NonZeroU64::MIN,
                }],
                1,
                vec![],
            ));
        }

        let num_centroids = cursor.read_u32_le().map_err(make_error("num_centroids"))? as usize;
        let num_buffered = cursor.read_u32_le().map_err(make_error("num_buffered"))? as usize;
        let min = cursor.read_f64_le().map_err(make_error("min"))?;
        let max = cursor.read_f64_le().map_err(make_error("max"))?;
        check_non_nan(min, "min")?;
        check_non_nan(max, "max")?;
        // never trust a length field for the allocation size
        let mut centroids = Vec::with_capacity(num_centroids.min(bytes.len() / 16));
        let mut centroids_weight = 0u64;
        for _ in 0..num_centroids {
            let mean = cursor.read_f64_le().map_err(make_error("centroid mean"))?;
            let weight = cursor.read_u64_le().map_err(make_error("centroid weight"))?;
            check_finite(mean, "centroid mean")?;
            let weight = check_nonzero(weight, "centroid weight")?;
            centroids_weight = centroids_weight.saturating_add(weight.get());
            centroids.push(Centroid { mean, weight });
        }
        let mut buffer = Vec::with_capacity(num_buffered.min(bytes.len() / 8));
        for _ in 0..num_buffered {
            let value = cursor.read_f64_le().map_err(make_error("buffered_value"))?;
            check_finite(value, "buffered_value")?;
            buffer.push(value);
        }
        Ok(TDigestMut::make(
            k,
            reverse_merge,
            min,
            max,
            centroids,
            centroids_weight,
            buffer,
        ))
    }

    // default byte order of java.nio.ByteBuffer is used there, which is big endian
    fn deserialize_compat(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);

        let ty = cursor
            .read_u32_be()
            .map_err(|e| Error::insufficient_data_of("compat format", "type", e))?;
        match ty {
            COMPAT_DOUBLE => {
                let err =
                    |tag| move |e| Error::insufficient_data_of("compat double format", tag, e);
                let min = cursor.read_f64_be().map_err(err("min"))?;
                let max = cursor.read_f64_be().map_err(err("max"))?;
                check_non_nan(min, "min in compat double format")?;
                check_non_nan(max, "max in compat double format")?;
                let k = cursor.read_f64_be().map_err(err("compression"))? as u16;
                check_k(k, "compression in compat double format")?;
                let num_centroids = cursor.read_u32_be().map_err(err("num_centroids"))? as usize;
                let mut centroids = Vec::with_capacity(num_centroids.min(bytes.len() / 16));
                let mut total_weight = 0u64;
                for _ in 0..num_centroids {
                    let weight = cursor.read_f64_be().map_err(err("centroid weight"))? as u64;
                    let mean = cursor.read_f64_be().map_err(err("centroid mean"))?;
                    let weight =
                        check_nonzero(weight, "centroid weight in compat double format")?;
                    check_finite(mean, "centroid mean in compat double format")?;
                    total_weight = total_weight.saturating_add(weight.get());
                    centroids.push(Centroid { mean, weight });
                }
                Ok(TDigestMut::make(
                    k,
                    false,
                    min,
                    max,
                    centroids,
                    total_weight,
                    vec![],
                ))
            }
            COMPAT_FLOAT => {
                let err =
                    |tag| move |e| Error::insufficient_data_of("compat float format", tag, e);
                // min and max stay doubles in the small layout
                let min = cursor.read_f64_be().map_err(err("min"))?;
                let max = cursor.read_f64_be().map_err(err("max"))?;
                check_non_nan(min, "min in compat float format")?;
                check_non_nan(max, "max in compat float format")?;
                let k = cursor.read_f32_be().map_err(err("compression"))? as u16;
                check_k(k, "compression in compat float format")?;
                // capacities of the centroid array and the buffer, derived from k on our side
                cursor.read_u16_be().map_err(err("centroid capacity"))?;
                cursor.read_u16_be().map_err(err("buffer capacity"))?;
                let num_centroids = cursor.read_u16_be().map_err(err("num_centroids"))? as usize;
                let mut centroids = Vec::with_capacity(num_centroids);
                let mut total_weight = 0u64;
                for _ in 0..num_centroids {
                    let weight = cursor.read_f32_be().map_err(err("centroid weight"))? as u64;
                    let mean = cursor.read_f32_be().map_err(err("centroid mean"))? as f64;
                    let weight = check_nonzero(weight, "centroid weight in compat float format")?;
                    check_finite(mean, "centroid mean in compat float format")?;
                    total_weight = total_weight.saturating_add(weight.get());
                    centroids.push(Centroid { mean, weight });
                }
                Ok(TDigestMut::make(
                    k,
                    false,
                    min,
                    max,
                    centroids,
                    total_weight,
                    vec![],
                ))
            }
            ty => Err(Error::deserial(format!("unknown TDigest compat type {ty}"))),
        }
    }
}

fn check_k(k: u16, tag: &'static str) -> Result<(), Error> {
    if k < MIN_K {
        return Err(Error::deserial(format!(
            "malformed data: {tag} must be at least {MIN_K}, got {k}"
        )));
    }
    Ok(())
}

fn check_non_nan(value: f64, tag: &'static str) -> Result<(), Error> {
    if value.is_nan() {
        return Err(Error::deserial(format!(
            "malformed data: {tag} cannot be NaN"
        )));
    }
    Ok(())
}

fn check_finite(value: f64, tag: &'static str) -> Result<(), Error> {
    if !value.is_finite() {
        return Err(Error::deserial(format!(
            "malformed data: {tag} must be finite"
        )));
    }
    Ok(())
}

fn check_nonzero(value: u64, tag: &'static str) -> Result<NonZeroU64, Error> {
    NonZeroU64::new(value)
        .ok_or_else(|| Error::deserial(format!("malformed data: {tag} cannot be zero")))
}
