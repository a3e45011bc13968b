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
use std::str::FromStr;

use tracing::debug;

use crate::error::Error;

/// Functions used to combine histograms that share an identifier.
///
/// Only [`HistogramAggregation::Sum`] is implemented: it merges the underlying sketches, which
/// amounts to the union of the sampled values rather than an arithmetic sum. Every other
/// function is rejected with [`ErrorKind::Unsupported`](crate::error::ErrorKind::Unsupported).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum HistogramAggregation {
    /// Merge the sketches.
    Sum,
    /// Smallest distribution.
    Min,
    /// Largest distribution.
    Max,
    /// Averaged distribution.
    Avg,
    /// Number of histograms.
    Count,
}

impl HistogramAggregation {
    /// All known aggregation functions.
    pub const ALL: [HistogramAggregation; 5] = [
        HistogramAggregation::Sum,
        HistogramAggregation::Min,
        HistogramAggregation::Max,
        HistogramAggregation::Avg,
        HistogramAggregation::Count,
    ];

    /// Lowercase name of the function.
    pub const fn name(self) -> &'static str {
        match self {
            HistogramAggregation::Sum => "sum",
            HistogramAggregation::Min => "min",
            HistogramAggregation::Max => "max",
            HistogramAggregation::Avg => "avg",
            HistogramAggregation::Count => "count",
        }
    }

    /// Whether histograms can be combined with this function.
    pub const fn is_supported(self) -> bool {
        matches!(self, HistogramAggregation::Sum)
    }

    /// Fails with [`ErrorKind::Unsupported`](crate::error::ErrorKind::Unsupported) unless this
    /// function is implemented.
    pub fn ensure_supported(self) -> Result<(), Error> {
        if self.is_supported() {
            return Ok(());
        }
        debug!(function = self.name(), "Rejected histogram aggregation.");
        Err(
            Error::unsupported(format!("function {self} is not supported yet"))
                .with_context("function", self),
        )
    }
}

impl fmt::Display for HistogramAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HistogramAggregation {
    type Err = Error;

    /// Parses a function name, ignoring case.
    ///
    /// Unknown names fail with [`ErrorKind::Unsupported`](crate::error::ErrorKind::Unsupported)
    /// so that a misspelled or newer function never falls back to another one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                Error::unsupported(format!("function {s} is not supported"))
                    .with_context("function", s)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_only_sum_is_supported() {
        for function in HistogramAggregation::ALL {
            let result = function.ensure_supported();
            if function == HistogramAggregation::Sum {
                assert!(result.is_ok());
            } else {
                let err = result.unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Unsupported);
                assert!(err.message().contains(function.name()));
            }
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("sum".parse::<HistogramAggregation>().unwrap(), HistogramAggregation::Sum);
        assert_eq!("SUM".parse::<HistogramAggregation>().unwrap(), HistogramAggregation::Sum);
        assert_eq!("Avg".parse::<HistogramAggregation>().unwrap(), HistogramAggregation::Avg);

        let err = "p99".parse::<HistogramAggregation>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(err.message().contains("p99"));
    }
}
