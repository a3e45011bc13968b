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

use datapoint_histogram::histogram::Histogram;
use datapoint_histogram::histogram::HistogramAggregation;
use datapoint_histogram::histogram::HistogramCodec;

fn main() {
    let codec = HistogramCodec::builder().id(42).build().unwrap();
    println!("Codec: {:?}", codec);

    // Two hosts report latencies for the same metric
    let mut host_a = codec.new_sketch();
    let mut host_b = codec.new_sketch();
    for i in 0..10_000 {
        host_a.update(i as f64 / 100.0);
        host_b.update(100.0 + i as f64 / 50.0);
    }

    let mut histogram_a = codec.new_histogram();
    histogram_a.set_sketch(host_a);
    let mut histogram_b = codec.new_histogram();
    histogram_b.set_sketch(host_b);

    // Ship them over the wire
    let raw_a = codec.encode(&histogram_a, true).unwrap();
    let raw_b = codec.encode(&histogram_b, true).unwrap();
    println!("Encoded sizes: {} and {} bytes", raw_a.len(), raw_b.len());

    // Receive and combine
    let mut merged = codec.decode(&raw_a, true).unwrap();
    let other = codec.decode(&raw_b, true).unwrap();
    merged.merge(&other, HistogramAggregation::Sum).unwrap();

    let ps = [0.0, 50.0, 90.0, 99.0, 100.0];
    let values = merged.percentiles(&ps).unwrap();
    println!("\nMerged histogram (id {}):", merged.id());
    for (p, v) in ps.iter().zip(values) {
        println!("  p{:<5} {:.2}", p, v);
    }

    // Unsupported aggregations are rejected
    let err = merged
        .merge(&other, HistogramAggregation::Avg)
        .unwrap_err();
    println!("\nMerging with avg: {}", err);
}
