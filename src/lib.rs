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

//! # Data point histograms
//!
//! Compact, mergeable value distributions attached to time-series data points, and the codec
//! that moves them in and out of their storage byte layout.
//!
//! * [`histogram`] holds the [`Histogram`](histogram::Histogram) capability set, the
//!   sketch-backed implementation, the aggregation policy and the codec.
//! * [`tdigest`] provides the mergeable quantile sketch the histograms are built on.
//! * [`error`] defines the error type returned by every fallible operation.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

mod codec;

pub mod error;
pub mod histogram;
pub mod tdigest;
