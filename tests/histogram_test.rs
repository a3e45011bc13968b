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

use datapoint_histogram::error::Error;
use datapoint_histogram::error::ErrorKind;
use datapoint_histogram::histogram::Histogram;
use datapoint_histogram::histogram::HistogramAggregation;
use datapoint_histogram::histogram::TDigestHistogram;
use datapoint_histogram::tdigest::TDigest;
use datapoint_histogram::tdigest::TDigestMut;
use googletest::assert_that;
use googletest::prelude::contains_substring;
use googletest::prelude::near;

fn digest(values: &[f64]) -> TDigest {
    let mut sketch = TDigestMut::new(100);
    for &v in values {
        sketch.update(v);
    }
    sketch.freeze()
}

fn first() -> TDigest {
    digest(&[42.5, 1.0, 24.0])
}

fn second() -> TDigest {
    digest(&[12.0, 89.3, 15.0])
}

fn third() -> TDigest {
    digest(&[33.0, 22.4, 6.98])
}

/// Native multi-value header: preamble longs, serial version, family, k, flags, unused.
fn native_header(k: u16, num_centroids: u32, num_buffered: u32, min: f64, max: f64) -> Vec<u8> {
    let mut bytes = vec![2, 1, 20];
    bytes.extend_from_slice(&k.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0]);
    bytes.extend_from_slice(&num_centroids.to_le_bytes());
    bytes.extend_from_slice(&num_buffered.to_le_bytes());
    bytes.extend_from_slice(&min.to_le_bytes());
    bytes.extend_from_slice(&max.to_le_bytes());
    bytes
}

/// A histogram kind that is not backed by a t-digest.
#[derive(Debug)]
struct SimpleHistogram {
    id: u8,
}

impl Histogram for SimpleHistogram {
    fn id(&self) -> u8 {
        self.id
    }

    fn kind(&self) -> &'static str {
        "simple"
    }

    fn encode(&self, _include_id: bool) -> Result<Vec<u8>, Error> {
        Ok(vec![self.id; 8])
    }

    fn decode(&mut self, _raw: &[u8], _includes_id: bool) -> Result<(), Error> {
        Ok(())
    }

    fn percentile(&self, _p: f64) -> Result<f64, Error> {
        Ok(0.0)
    }

    fn merge(&mut self, _other: &dyn Histogram, _f: HistogramAggregation) -> Result<(), Error> {
        Ok(())
    }

    fn merge_all(
        &mut self,
        _others: &[&dyn Histogram],
        _f: HistogramAggregation,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn clone_histogram(&self) -> Result<Box<dyn Histogram>, Error> {
        Ok(Box::new(SimpleHistogram { id: self.id }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_ctor() {
    let histo = TDigestHistogram::try_new(42).unwrap();
    assert_eq!(histo.id(), 42);
    assert_eq!(histo.kind(), "tdigest");
    assert!(!histo.is_populated());

    for id in 0..=255 {
        assert_eq!(TDigestHistogram::try_new(id).unwrap().id() as i64, id);
    }
    for id in [-1, 256, i64::MIN, i64::MAX] {
        let err = TDigestHistogram::try_new(id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

#[test]
fn test_encode() {
    let histo = TDigestHistogram::with_sketch(42, first());
    let raw = first().serialize();

    assert_eq!(histo.encode(false).unwrap(), raw);
    let with_id = histo.encode(true).unwrap();
    assert_eq!(with_id.len(), raw.len() + 1);
    assert_eq!(with_id[0], 42);
    assert_eq!(&with_id[1..], &raw[..]);
}

#[test]
fn test_encode_unpopulated() {
    let histo = TDigestHistogram::new(42);
    for include_id in [false, true] {
        let err = histo.encode(include_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPopulated);
    }
}

#[test]
fn test_decode() {
    let raw = first().serialize();
    let mut histo = TDigestHistogram::new(42);

    histo.decode(&raw, false).unwrap();
    assert_that!(histo.percentile(95.0).unwrap(), near(42.5, 0.001));
    assert_eq!(histo.encode(false).unwrap(), raw);

    let mut with_id = vec![42];
    with_id.extend_from_slice(&raw);
    histo.decode(&with_id, true).unwrap();
    assert_that!(histo.percentile(95.0).unwrap(), near(42.5, 0.001));
    assert_eq!(histo.encode(true).unwrap(), with_id);
}

#[test]
fn test_decode_ignores_prefix_value() {
    let raw = first().serialize();
    let mut with_other_id = vec![7];
    with_other_id.extend_from_slice(&raw);

    let mut histo = TDigestHistogram::new(42);
    histo.decode(&with_other_id, true).unwrap();
    assert_eq!(histo.id(), 42);
    assert_eq!(histo.encode(true).unwrap()[0], 42);
}

#[test]
fn test_decode_rejects_short_buffers() {
    let mut histo = TDigestHistogram::new(42);
    for (raw, includes_id) in [
        (&[][..], false),
        (&[0; 7][..], false),
        (&[0; 1][..], true),
        (&[0; 8][..], true),
    ] {
        let err = histo.decode(raw, includes_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert!(!histo.is_populated());
}

#[test]
fn test_decode_truncated_payload() {
    let mut histo = TDigestHistogram::new(42);
    let truncated = [
        0, 0, 0, 2, 64, 89, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 63, 128, 0, 0,
    ];
    let err = histo.decode(&truncated, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDeserializeData);
    assert!(!histo.is_populated());
}

#[test]
fn test_round_trip() {
    let histo = TDigestHistogram::with_sketch(9, second());
    for include_id in [false, true] {
        let raw = histo.encode(include_id).unwrap();
        let mut decoded = TDigestHistogram::new(9);
        decoded.decode(&raw, include_id).unwrap();
        for p in [0.0, 25.0, 50.0, 95.0, 100.0] {
            assert_that!(
                decoded.percentile(p).unwrap(),
                near(histo.percentile(p).unwrap(), 0.001)
            );
        }
    }
}

#[test]
fn test_percentile() {
    let histo = TDigestHistogram::with_sketch(42, first());

    assert_that!(histo.percentile(95.0).unwrap(), near(42.5, 0.001));
    assert_that!(histo.percentile(50.0).unwrap(), near(24.0, 0.001));
    assert_that!(histo.percentile(0.0).unwrap(), near(1.0, 0.001));

    for p in [-1.0, 101.0, f64::NAN] {
        let err = histo.percentile(p).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

#[test]
fn test_percentile_unpopulated() {
    let histo = TDigestHistogram::new(42);
    let err = histo.percentile(50.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotPopulated);
    assert_that!(err.message(), contains_substring("not been set"));
}

#[test]
fn test_percentiles() {
    let histo = TDigestHistogram::with_sketch(42, first());

    let percentiles = histo.percentiles(&[0.0, 50.0, 95.0]).unwrap();
    assert_eq!(percentiles.len(), 3);
    assert_that!(percentiles[0], near(1.0, 0.001));
    assert_that!(percentiles[1], near(24.0, 0.001));
    assert_that!(percentiles[2], near(42.5, 0.001));

    let err = histo.percentiles(&[0.0, -1.0, 95.0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(histo.percentiles(&[]).unwrap().is_empty());
}

#[test]
fn test_raw_histogram_unsupported() {
    let histo = TDigestHistogram::with_sketch(42, first());
    let err = histo.raw_histogram().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[test]
fn test_clone() {
    let histo = TDigestHistogram::with_sketch(42, first());

    let copy = histo.try_clone().unwrap();
    assert_eq!(copy.id(), 42);
    assert_eq!(copy.encode(true).unwrap(), histo.encode(true).unwrap());
    assert_that!(histo.percentile(95.0).unwrap(), near(42.5, 0.001));

    let boxed = histo.clone_histogram().unwrap();
    assert_eq!(boxed.id(), 42);
    assert_that!(boxed.percentile(95.0).unwrap(), near(42.5, 0.001));

    let err = TDigestHistogram::new(1).try_clone().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotPopulated);
}

#[test]
fn test_clone_is_independent() {
    let histo = TDigestHistogram::with_sketch(42, first());
    let mut copy = histo.try_clone().unwrap();
    let other = TDigestHistogram::with_sketch(42, second());

    copy.merge(&other, HistogramAggregation::Sum).unwrap();
    assert_that!(copy.percentile(95.0).unwrap(), near(89.3, 0.01));
    assert_that!(histo.percentile(95.0).unwrap(), near(42.5, 0.001));
    assert_eq!(histo.sketch().unwrap().total_weight(), 3);
}

#[test]
fn test_merge() {
    let mut histo = TDigestHistogram::with_sketch(42, first());
    let histo2 = TDigestHistogram::with_sketch(42, second());

    histo.merge(&histo2, HistogramAggregation::Sum).unwrap();

    assert_that!(histo.percentile(95.0).unwrap(), near(89.3, 0.01));
    assert_that!(histo.percentile(0.0).unwrap(), near(1.0, 0.01));
    assert_eq!(histo.sketch().unwrap().total_weight(), 6);
    assert_eq!(histo2.sketch().unwrap().total_weight(), 3);

    let simple = SimpleHistogram { id: 1 };
    let err = histo.merge(&simple, HistogramAggregation::Sum).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_that!(err.to_string(), contains_substring("simple"));
}

#[test]
fn test_merge_list() {
    let mut histo = TDigestHistogram::with_sketch(42, first());
    let histo2 = TDigestHistogram::with_sketch(42, second());
    let histo3 = TDigestHistogram::with_sketch(42, third());

    histo
        .merge_all(&[&histo2, &histo3], HistogramAggregation::Sum)
        .unwrap();

    assert_that!(histo.percentile(95.0).unwrap(), near(89.3, 0.001));
    assert_that!(histo.percentile(50.0).unwrap(), near(22.4, 0.01));
    assert_that!(histo.percentile(0.0).unwrap(), near(1.0, 0.01));

    let simple = SimpleHistogram { id: 1 };
    let err = histo
        .merge_all(&[&histo2, &simple], HistogramAggregation::Sum)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(histo.sketch().unwrap().total_weight(), 9);
}

#[test]
fn test_merge_order_is_reproducible() {
    let a = TDigestHistogram::with_sketch(1, first());
    let b = TDigestHistogram::with_sketch(1, second());

    let mut acc1 = TDigestHistogram::with_sketch(1, TDigestMut::new(100));
    acc1.merge_all(&[&a, &b], HistogramAggregation::Sum).unwrap();
    let mut acc2 = TDigestHistogram::with_sketch(2, TDigestMut::new(100));
    acc2.merge(&a, HistogramAggregation::Sum).unwrap();
    acc2.merge(&b, HistogramAggregation::Sum).unwrap();

    for p in [0.0, 10.0, 50.0, 90.0, 100.0] {
        assert_that!(
            acc1.percentile(p).unwrap(),
            near(acc2.percentile(p).unwrap(), 1e-9)
        );
    }
}

#[test]
fn test_merge_unsupported_function() {
    let mut histo = TDigestHistogram::with_sketch(42, first());
    let histo2 = TDigestHistogram::with_sketch(42, second());

    for function in HistogramAggregation::ALL {
        if function.is_supported() {
            continue;
        }
        let err = histo.merge(&histo2, function).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_that!(err.message(), contains_substring(function.name()));

        let err = histo.merge_all(&[&histo2], function).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }
    assert_eq!(histo.sketch().unwrap().total_weight(), 3);
}

#[test]
fn test_merge_unpopulated() {
    let populated = TDigestHistogram::with_sketch(42, first());

    let mut empty = TDigestHistogram::new(42);
    let err = empty.merge(&populated, HistogramAggregation::Sum).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotPopulated);

    let mut histo = TDigestHistogram::with_sketch(42, first());
    let err = histo
        .merge(&TDigestHistogram::new(42), HistogramAggregation::Sum)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotPopulated);
}

#[test]
fn test_concurrent_percentile_queries() {
    let histo = TDigestHistogram::with_sketch(42, first());
    let expected = histo.percentile(50.0).unwrap();
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..100 {
                    assert_eq!(histo.percentile(50.0).unwrap(), expected);
                }
            });
        }
    });
}

#[test]
fn test_histograms_as_trait_objects() {
    let histograms: Vec<Box<dyn Histogram>> = vec![
        Box::new(TDigestHistogram::with_sketch(1, first())),
        Box::new(SimpleHistogram { id: 2 }),
    ];
    let encoded = histograms
        .iter()
        .map(|h| h.encode(true))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(encoded[0][0], 1);
    assert_eq!(encoded[1][0], 2);
}

#[test]
fn test_decode_large_k_with_buffered_values() {
    let mut raw = native_header(40000, 0, 4, 1.0, 4.0);
    for v in [3.0f64, 1.0, 4.0, 2.0] {
        raw.extend_from_slice(&v.to_le_bytes());
    }

    let mut histo = TDigestHistogram::new(5);
    histo.decode(&raw, false).unwrap();
    let sketch = histo.sketch().unwrap();
    assert_eq!(sketch.k(), 40000);
    assert_eq!(sketch.total_weight(), 4);
    assert_eq!(histo.percentile(0.0).unwrap(), 1.0);
    assert_eq!(histo.percentile(100.0).unwrap(), 4.0);
}

#[test]
fn test_merge_saturates_total_weight() {
    let half = u64::MAX / 2;
    let mut raw = native_header(100, 2, 0, 1.0, 2.0);
    for (mean, weight) in [(1.0f64, half), (2.0, half)] {
        raw.extend_from_slice(&mean.to_le_bytes());
        raw.extend_from_slice(&weight.to_le_bytes());
    }

    let mut a = TDigestHistogram::new(1);
    a.decode(&raw, false).unwrap();
    let mut b = TDigestHistogram::new(1);
    b.decode(&raw, false).unwrap();
    assert_eq!(a.sketch().unwrap().total_weight(), u64::MAX - 1);

    a.merge(&b, HistogramAggregation::Sum).unwrap();
    assert_eq!(a.sketch().unwrap().total_weight(), u64::MAX);
    assert_eq!(a.percentile(0.0).unwrap(), 1.0);
    let median = a.percentile(50.0).unwrap();
    assert!((1.0..=2.0).contains(&median), "median {median} out of range");
}
