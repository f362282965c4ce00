// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The boundary between the scheduler and the execution system.
//!
//! [`DispatchGateway`] is the seam; [`RedisGateway`] pushes Celery-compatible
//! messages onto Redis lists and [`LoggingGateway`] only logs them.

pub mod broker;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod request;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use broker::RedisGateway;
pub use error::{DispatchError, Result};
pub use gateway::{DispatchGateway, LoggingGateway};
pub use request::{DispatchReceipt, DispatchRequest};
