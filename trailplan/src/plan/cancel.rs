// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cooperative cancellation of a planning run

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::plan::error::{PlanningError, PlanningResult};

/// Shared flag set by the caller, polled by the composer
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> PlanningResult<()> {
        if self.is_cancelled() {
            Err(PlanningError::Cancelled)
        } else {
            Ok(())
        }
    }
}
