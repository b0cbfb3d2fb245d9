// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Conditional tracing instrumentation.
//!
//! With the `profiling` feature enabled the codec entry points emit
//! `tracing` spans. Without it the attributes below compile away.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[cfg_attr(feature = "profiling", tracing::instrument(skip_all))]
//! pub fn encode_instances(...) -> Result<BlueMask, Error> {
//!     // ...
//! }
//! ```
//!
//! For manual spans inside a function:
//!
//! ```rust,ignore
//! #[cfg(feature = "profiling")]
//! let _span = crate::instrument::debug_span!("trace_contours", width, height).entered();
//! ```

#[cfg(feature = "profiling")]
pub use tracing::{debug_span, info_span, trace_span};
