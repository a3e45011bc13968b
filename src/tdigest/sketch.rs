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

use std::cmp::Ordering;
use std::convert::identity;
use std::num::NonZeroU64;

use crate::error::Error;
use crate::tdigest::DEFAULT_K;
use crate::tdigest::MIN_K;

/// Multiplier for buffer size relative to centroids capacity.
const BUFFER_MULTIPLIER: usize = 4;
/// Weight of a single buffered value.
const UNIT_WEIGHT: NonZeroU64 = NonZeroU64::MIN;

/// Mutable T-Digest that accepts new values.
///
/// See the [module level documentation](super) for more.
#[derive(Debug, Clone)]
pub struct TDigestMut {
    pub(super) k: u16,

    pub(super) reverse_merge: bool,
    pub(super) min: f64,
    pub(super) max: f64,

    pub(super) centroids: Vec<Centroid>,
    pub(super) centroids_weight: u64,
    centroids_capacity: usize,
    pub(super) buffer: Vec<f64>,
}

impl Default for TDigestMut {
    fn default() -> Self {
        TDigestMut::new(DEFAULT_K)
    }
}

impl TDigestMut {
    /// Creates a tdigest instance with the given value of k.
    ///
    /// The fallible version of this method is [`TDigestMut::try_new`].
    ///
    /// # Panics
    ///
    /// Panics if k is less than [`MIN_K`].
    pub fn new(k: u16) -> Self {
        assert!(k >= MIN_K, "k must be at least {MIN_K}");
        Self::make(k, false, f64::INFINITY, f64::NEG_INFINITY, vec![], 0, vec![])
    }

    /// Creates a tdigest instance with the given value of k.
    ///
    /// # Errors
    ///
    /// If k is less than [`MIN_K`], returns
    /// [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument).
    ///
    /// # Examples
    ///
    /// ```
    /// # use datapoint_histogram::tdigest::TDigestMut;
    /// assert_eq!(TDigestMut::try_new(20).unwrap().k(), 20);
    /// assert!(TDigestMut::try_new(9).is_err());
    /// ```
    pub fn try_new(k: u16) -> Result<Self, Error> {
        if k < MIN_K {
            return Err(Error::invalid_argument(format!(
                "k must be at least {MIN_K}, got {k}"
            )));
        }
        Ok(Self::new(k))
    }

    pub(super) fn make(
        k: u16,
        reverse_merge: bool,
        min: f64,
        max: f64,
        mut centroids: Vec<Centroid>,
        centroids_weight: u64,
        mut buffer: Vec<f64>,
    ) -> Self {
        let fudge = if k < 30 { 30 } else { 10 };
        let centroids_capacity = (k as usize * 2) + fudge;

        centroids.reserve(centroids_capacity.saturating_sub(centroids.len()));
        buffer.reserve((centroids_capacity * BUFFER_MULTIPLIER).saturating_sub(buffer.len()));

        TDigestMut {
            k,
            reverse_merge,
            min,
            max,
            centroids,
            centroids_weight,
            centroids_capacity,
            buffer,
        }
    }

    /// Update this TDigest with the given value.
    ///
    /// [f64::NAN], [f64::INFINITY], and [f64::NEG_INFINITY] values are ignored.
    pub fn update(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }

        if self.buffer.len() >= self.centroids_capacity * BUFFER_MULTIPLIER {
            self.compress();
        }

        self.buffer.push(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Returns parameter k (compression) that was used to configure this TDigest.
    pub fn k(&self) -> u16 {
        self.k
    }

    /// Returns true if TDigest has not seen any data.
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty() && self.buffer.is_empty()
    }

    /// Returns minimum value seen by TDigest; `None` if TDigest is empty.
    pub fn min_value(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.min)
    }

    /// Returns maximum value seen by TDigest; `None` if TDigest is empty.
    pub fn max_value(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.max)
    }

    /// Returns total weight.
    pub fn total_weight(&self) -> u64 {
        self.centroids_weight.saturating_add(self.buffer.len() as u64)
    }

    /// Merge the given TDigest into this one. `other` is left unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// # use datapoint_histogram::tdigest::TDigestMut;
    /// let mut left = TDigestMut::new(100);
    /// let mut right = TDigestMut::new(100);
    /// left.update(1.0);
    /// right.update(2.0);
    /// left.merge(&right);
    /// assert_eq!(left.total_weight(), 2);
    /// ```
    pub fn merge(&mut self, other: &TDigestMut) {
        if other.is_empty() {
            return;
        }
        self.absorb(&other.centroids, &other.buffer, other.min, other.max);
    }

    /// Folds foreign centroids and buffered values into this digest.
    fn absorb(&mut self, centroids: &[Centroid], buffer: &[f64], min: f64, max: f64) {
        let mut tmp =
            Vec::with_capacity(self.buffer.len() + buffer.len() + centroids.len());
        for &v in self.buffer.iter().chain(buffer) {
            tmp.push(Centroid {
                mean: v,
                weight: UNIT_WEIGHT,
            });
        }
        tmp.extend_from_slice(centroids);
        let weight = centroids
            .iter()
            .fold((self.buffer.len() + buffer.len()) as u64, |acc, c| {
                acc.saturating_add(c.weight.get())
            });

        self.min = self.min.min(min);
        self.max = self.max.max(max);
        self.do_merge(tmp, weight);
    }

    /// Freezes this TDigest into an immutable one.
    pub fn freeze(mut self) -> TDigest {
        self.compress();
        TDigest {
            k: self.k,
            reverse_merge: self.reverse_merge,
            min: self.min,
            max: self.max,
            centroids: self.centroids,
            centroids_weight: self.centroids_weight,
        }
    }

    fn view(&mut self) -> TDigestView<'_> {
        self.compress();
        TDigestView {
            min: self.min,
            max: self.max,
            centroids: &self.centroids,
            centroids_weight: self.centroids_weight,
        }
    }

    /// See [`TDigest::rank`].
    pub fn rank(&mut self, value: f64) -> Option<f64> {
        assert!(!value.is_nan(), "value must not be NaN");
        self.view().rank(value)
    }

    /// See [`TDigest::quantile`].
    pub fn quantile(&mut self, rank: f64) -> Option<f64> {
        assert!((0.0..=1.0).contains(&rank), "rank must be in [0.0, 1.0]");
        self.view().quantile(rank)
    }

    /// Process buffered values and merge centroids if needed.
    pub(super) fn compress(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let tmp = self
            .buffer
            .iter()
            .map(|&v| Centroid {
                mean: v,
                weight: UNIT_WEIGHT,
            })
            .collect();
        self.do_merge(tmp, self.buffer.len() as u64)
    }

    /// Merges the given buffer of centroids into this TDigest.
    ///
    /// # Contract
    ///
    /// * `buffer` must have at least one centroid and no `NAN` means.
    /// * `self.buffer` is folded into `buffer` by the caller and is cleared here.
    fn do_merge(&mut self, mut buffer: Vec<Centroid>, weight: u64) {
        buffer.extend(std::mem::take(&mut self.centroids));
        buffer.sort_by(centroid_cmp);
        if self.reverse_merge {
            buffer.reverse();
        }
        self.centroids_weight = self.centroids_weight.saturating_add(weight);

        let len = buffer.len();
        self.centroids.push(buffer[0]);
        let mut weight_so_far = 0.;
        for (current, &c) in buffer.iter().enumerate().skip(1) {
            let last = self.centroids.len() - 1;
            let proposed_weight = self.centroids[last].weight() + c.weight();
            let mut add_this = false;
            if current != 1 && current != len - 1 {
                let centroids_weight = self.centroids_weight as f64;
                let q0 = weight_so_far / centroids_weight;
                let q2 = (weight_so_far + proposed_weight) / centroids_weight;
                let normalizer =
                    scale_function::normalizer(2.0 * f64::from(self.k), centroids_weight);
                add_this = proposed_weight
                    <= (centroids_weight
                        * scale_function::max(q0, normalizer)
                            .min(scale_function::max(q2, normalizer)));
            }
            if add_this {
                self.centroids[last].add(c);
            } else {
                weight_so_far += self.centroids[last].weight();
                self.centroids.push(c);
            }
        }

        if self.reverse_merge {
            self.centroids.reverse();
        }
        let num_centroids = self.centroids.len();
        self.min = self.min.min(self.centroids[0].mean);
        self.max = self.max.max(self.centroids[num_centroids - 1].mean);
        self.reverse_merge = !self.reverse_merge;
        self.buffer.clear();
    }
}

impl From<TDigestMut> for TDigest {
    fn from(sketch: TDigestMut) -> Self {
        sketch.freeze()
    }
}

/// Immutable (frozen) T-Digest sketch for estimating quantiles and ranks.
///
/// All buffered values have been compressed into centroids, so queries do not mutate.
///
/// See the [module level documentation](super) for more.
#[derive(Debug, Clone, PartialEq)]
pub struct TDigest {
    pub(super) k: u16,

    pub(super) reverse_merge: bool,
    pub(super) min: f64,
    pub(super) max: f64,

    pub(super) centroids: Vec<Centroid>,
    pub(super) centroids_weight: u64,
}

impl TDigest {
    /// Returns parameter k (compression) that was used to configure this TDigest.
    pub fn k(&self) -> u16 {
        self.k
    }

    /// Returns true if TDigest has not seen any data.
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Returns minimum value seen by TDigest; `None` if TDigest is empty.
    pub fn min_value(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.min)
    }

    /// Returns maximum value seen by TDigest; `None` if TDigest is empty.
    pub fn max_value(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.max)
    }

    /// Returns total weight.
    pub fn total_weight(&self) -> u64 {
        self.centroids_weight
    }

    /// Number of centroids retained.
    pub fn num_centroids(&self) -> usize {
        self.centroids.len()
    }

    fn view(&self) -> TDigestView<'_> {
        TDigestView {
            min: self.min,
            max: self.max,
            centroids: &self.centroids,
            centroids_weight: self.centroids_weight,
        }
    }

    /// Compute approximate normalized rank (from 0 to 1 inclusive) of the given value.
    ///
    /// Returns `None` if TDigest is empty.
    ///
    /// # Panics
    ///
    /// Panics if the value is `NaN`.
    pub fn rank(&self, value: f64) -> Option<f64> {
        assert!(!value.is_nan(), "value must not be NaN");
        self.view().rank(value)
    }

    /// Compute approximate quantile value corresponding to the given normalized rank.
    ///
    /// Returns `None` if TDigest is empty.
    ///
    /// # Panics
    ///
    /// Panics if rank is not in [0.0, 1.0].
    ///
    /// # Examples
    ///
    /// ```
    /// # use datapoint_histogram::tdigest::TDigestMut;
    /// let mut sketch = TDigestMut::new(100);
    /// for value in [1.0, 2.0, 3.0] {
    ///     sketch.update(value);
    /// }
    /// let digest = sketch.freeze();
    /// assert_eq!(digest.quantile(0.0), Some(1.0));
    /// assert_eq!(digest.quantile(1.0), Some(3.0));
    /// ```
    pub fn quantile(&self, rank: f64) -> Option<f64> {
        assert!((0.0..=1.0).contains(&rank), "rank must be in [0.0, 1.0]");
        self.view().quantile(rank)
    }

    /// Merge the given TDigest into this one. `other` is left unchanged.
    ///
    /// Centroids of `other` are folded in after the centroids of `self`, so merging a fixed
    /// sequence of digests in the same order is deterministic.
    pub fn merge(&mut self, other: &TDigest) {
        if other.is_empty() {
            return;
        }
        let k = self.k;
        let this = std::mem::replace(self, TDigestMut::new(k).freeze());
        let mut merged = this.unfreeze();
        merged.absorb(&other.centroids, &[], other.min, other.max);
        *self = merged.freeze();
    }

    /// Converts this immutable TDigest into a mutable one.
    pub fn unfreeze(self) -> TDigestMut {
        TDigestMut::make(
            self.k,
            self.reverse_merge,
            self.min,
            self.max,
            self.centroids,
            self.centroids_weight,
            vec![],
        )
    }
}

struct TDigestView<'a> {
    min: f64,
    max: f64,
    centroids: &'a [Centroid],
    centroids_weight: u64,
}

impl TDigestView<'_> {
    fn rank(&self, value: f64) -> Option<f64> {
        if self.centroids.is_empty() {
            return None;
        }
        if value < self.min {
            return Some(0.0);
        }
        if value > self.max {
            return Some(1.0);
        }
        // one centroid and value == min == max
        if self.centroids.len() == 1 {
            return Some(0.5);
        }

        let centroids_weight = self.centroids_weight as f64;
        let num_centroids = self.centroids.len();

        // left tail
        let first_mean = self.centroids[0].mean;
        if value < first_mean {
            if first_mean - self.min > 0. {
                return Some(if value == self.min {
                    0.5 / centroids_weight
                } else {
                    1. + (((value - self.min) / (first_mean - self.min))
                        * ((self.centroids[0].weight() / 2.) - 1.))
                });
            }
            return Some(0.);
        }

        // right tail
        let last_mean = self.centroids[num_centroids - 1].mean;
        if value > last_mean {
            if self.max - last_mean > 0. {
                return Some(if value == self.max {
                    1. - (0.5 / centroids_weight)
                } else {
                    1.0 - ((1.0
                        + (((self.max - value) / (self.max - last_mean))
                            * ((self.centroids[num_centroids - 1].weight() / 2.) - 1.)))
                        / centroids_weight)
                });
            }
            return Some(1.);
        }

        let mut lower = self
            .centroids
            .binary_search_by(|c| centroid_lower_bound(c, value))
            .unwrap_or_else(identity);
        let mut upper = self
            .centroids
            .binary_search_by(|c| centroid_upper_bound(c, value))
            .unwrap_or_else(identity);
        debug_assert_ne!(lower, num_centroids, "rank: lower == end");
        debug_assert_ne!(upper, 0, "rank: upper == begin");
        if value < self.centroids[lower].mean {
            lower -= 1;
        }
        if upper == num_centroids || self.centroids[upper - 1].mean >= value {
            upper -= 1;
        }

        let weight_below = self.centroids[..lower]
            .iter()
            .map(Centroid::weight)
            .sum::<f64>()
            + self.centroids[lower].weight() / 2.;
        let weight_delta = self.centroids[lower..upper]
            .iter()
            .map(Centroid::weight)
            .sum::<f64>()
            - self.centroids[lower].weight() / 2.
            + self.centroids[upper].weight() / 2.;

        let lower_mean = self.centroids[lower].mean;
        let upper_mean = self.centroids[upper].mean;
        Some(if upper_mean - lower_mean > 0. {
            (weight_below + (weight_delta * (value - lower_mean) / (upper_mean - lower_mean)))
                / centroids_weight
        } else {
            (weight_below + weight_delta / 2.) / centroids_weight
        })
    }

    fn quantile(&self, rank: f64) -> Option<f64> {
        if self.centroids.is_empty() {
            return None;
        }
        if self.centroids.len() == 1 {
            return Some(self.centroids[0].mean);
        }

        // at least 2 centroids
        let centroids_weight = self.centroids_weight as f64;
        let num_centroids = self.centroids.len();
        let weight = rank * centroids_weight;
        if weight < 1. {
            return Some(self.min);
        }
        if weight > centroids_weight - 1. {
            return Some(self.max);
        }
        let first_weight = self.centroids[0].weight();
        if first_weight > 1. && weight < first_weight / 2. {
            return Some(
                self.min
                    + (((weight - 1.) / ((first_weight / 2.) - 1.))
                        * (self.centroids[0].mean - self.min)),
            );
        }
        let last_weight = self.centroids[num_centroids - 1].weight();
        if last_weight > 1. && (centroids_weight - weight <= last_weight / 2.) {
            return Some(
                self.max
                    + (((centroids_weight - weight - 1.) / ((last_weight / 2.) - 1.))
                        * (self.max - self.centroids[num_centroids - 1].mean)),
            );
        }

        // interpolate between extremes
        let mut weight_so_far = first_weight / 2.;
        for pair in self.centroids.windows(2) {
            let (left, right) = (pair[0], pair[1]);
            let dw = (left.weight() + right.weight()) / 2.;
            if weight_so_far + dw > weight {
                // the target weight is between left and right
                let mut left_weight = 0.;
                if left.weight == UNIT_WEIGHT {
                    if weight - weight_so_far < 0.5 {
                        return Some(left.mean);
                    }
                    left_weight = 0.5;
                }
                let mut right_weight = 0.;
                if right.weight == UNIT_WEIGHT {
                    if weight_so_far + dw - weight <= 0.5 {
                        return Some(right.mean);
                    }
                    right_weight = 0.5;
                }
                let w1 = weight - weight_so_far - left_weight;
                let w2 = weight_so_far + dw - weight - right_weight;
                return Some(weighted_average(left.mean, w1, right.mean, w2));
            }
            weight_so_far += dw;
        }

        let last = self.centroids[num_centroids - 1];
        let w1 = weight - centroids_weight - (last.weight() / 2.);
        let w2 = (last.weight() / 2.) - w1;
        Some(weighted_average(last.mean, w1, self.max, w2))
    }
}

fn centroid_cmp(a: &Centroid, b: &Centroid) -> Ordering {
    match a.mean.partial_cmp(&b.mean) {
        Some(order) => order,
        None => unreachable!("NaN values should never be present in centroids"),
    }
}

fn centroid_lower_bound(c: &Centroid, value: f64) -> Ordering {
    if c.mean < value {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

fn centroid_upper_bound(c: &Centroid, value: f64) -> Ordering {
    if c.mean > value {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Centroid {
    pub(super) mean: f64,
    pub(super) weight: NonZeroU64,
}

impl Centroid {
    fn add(&mut self, other: Centroid) {
        let total_weight = self.weight.saturating_add(other.weight.get());
        let ratio_other = other.weight() / total_weight.get() as f64;
        self.mean += (other.mean - self.mean) * ratio_other;
        self.weight = total_weight;
    }

    fn weight(&self) -> f64 {
        self.weight.get() as f64
    }
}

/// Generates cluster sizes proportional to `q*(1-q)`.
///
/// The use of a normalizing function results in a strictly bounded number of clusters no matter
/// how many samples.
mod scale_function {
    pub(super) fn max(q: f64, normalizer: f64) -> f64 {
        q * (1. - q) / normalizer
    }

    pub(super) fn normalizer(compression: f64, n: f64) -> f64 {
        compression / z(compression, n)
    }

    pub(super) fn z(compression: f64, n: f64) -> f64 {
        4. * (n / compression).ln() + 24.
    }
}

const fn weighted_average(x1: f64, w1: f64, x2: f64, w2: f64) -> f64 {
    (x1 * w1 + x2 * w2) / (w1 + w2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freeze_compresses_buffer() {
        let mut sketch = TDigestMut::new(100);
        for v in [3.0, 1.0, 2.0] {
            sketch.update(v);
        }
        let digest = sketch.freeze();
        assert_eq!(digest.total_weight(), 3);
        assert_eq!(digest.num_centroids(), 3);
        assert!(digest.reverse_merge);
    }

    #[test]
    fn test_frozen_merge_keeps_other_extremes() {
        let mut left = TDigestMut::new(100);
        left.update(10.0);
        let mut right = TDigestMut::new(100);
        right.update(-5.0);
        right.update(50.0);

        let mut left = left.freeze();
        let right = right.freeze();
        left.merge(&right);
        assert_eq!(left.total_weight(), 3);
        assert_eq!(left.min_value(), Some(-5.0));
        assert_eq!(left.max_value(), Some(50.0));
        assert_eq!(right.total_weight(), 2);
    }

    #[test]
    fn test_merge_into_empty() {
        let mut empty = TDigestMut::new(100).freeze();
        let mut other = TDigestMut::new(100);
        other.update(7.0);
        empty.merge(&other.freeze());
        assert_eq!(empty.quantile(0.5), Some(7.0));
    }

    #[test]
    fn test_non_finite_values_ignored() {
        let mut sketch = TDigestMut::new(100);
        sketch.update(f64::NAN);
        sketch.update(f64::INFINITY);
        sketch.update(f64::NEG_INFINITY);
        assert!(sketch.is_empty());
    }
}
