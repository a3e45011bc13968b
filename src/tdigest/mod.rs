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

//! Mergeable t-digest used as the sketch behind [`TDigestHistogram`](crate::histogram::TDigestHistogram).
//!
//! The implementation follows the MergingDigest described in
//! [Computing Extremely Accurate Quantiles Using t-Digests][paper] by Ted Dunning and Otmar Ertl.
//!
//! Values are collected in a [`TDigestMut`], which buffers incoming values and compresses them
//! into centroids on demand. [`TDigestMut::freeze`] produces a compressed, immutable [`TDigest`]
//! whose quantile and rank queries take `&self`, which is what histograms hold.
//!
//! Serialization writes a compact little-endian format whose empty form is exactly eight bytes.
//! Deserialization also accepts the big-endian `asBytes` and `asSmallBytes` layouts of the
//! reference Java library (auto-detected), so digests persisted by older writers can be read.
//!
//! # Usage
//!
//! ```rust
//! # use datapoint_histogram::tdigest::TDigestMut;
//! let mut sketch = TDigestMut::new(100);
//! for v in [42.5, 1.0, 24.0] {
//!     sketch.update(v);
//! }
//! let digest = sketch.freeze();
//! assert_eq!(digest.quantile(0.5), Some(24.0));
//! ```
//!
//! [paper]: https://arxiv.org/abs/1902.04023

mod serialization;

mod sketch;
pub use self::sketch::TDigest;
pub use self::sketch::TDigestMut;

/// Default value of parameter k.
pub const DEFAULT_K: u16 = 200;
/// Minimum value of parameter k.
pub const MIN_K: u16 = 10;
