// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `fin_runtime` live in `benches/`.
