//! # Usage Ledger
//!
//! Per-client accounting of model calls and token counts. A client may be
//! shared by concurrent trajectories, so every update happens under one lock.

use crate::error::{self, Result};
use crate::provider::Usage;
use crate::types::{ModelUsageSummary, UsageSummary};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct LedgerState {
    summary: UsageSummary,
    last: Option<ModelUsageSummary>,
}

/// Tracks token usage across calls made through one client
#[derive(Debug, Default)]
pub struct UsageLedger {
    state: Mutex<LedgerState>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // Counters stay consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one completed call.
    ///
    /// Fails with `UsageMissing` when the provider reported no usage; nothing
    /// is recorded in that case.
    pub fn track(&self, model: &str, usage: Option<&Usage>) -> Result<()> {
        let usage = usage
            .ok_or_else(|| error::usage_missing(model).with_operation("usage::track"))?;

        let call = ModelUsageSummary::new(1, usage.prompt_tokens as u64, usage.completion_tokens as u64);

        let mut state = self.state();
        state
            .summary
            .model_usage_summaries
            .entry(model.to_string())
            .or_default()
            .add(&call);
        state.last = Some(call);
        Ok(())
    }

    /// Cumulative per-model breakdown
    pub fn get_usage_summary(&self) -> UsageSummary {
        self.state().summary.clone()
    }

    /// The most recent call alone, `None` before the first call
    pub fn get_last_usage(&self) -> Option<ModelUsageSummary> {
        self.state().last
    }

    pub fn total_calls(&self) -> u64 {
        self.state().summary.total_calls()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Arc;

    fn usage(prompt: usize, completion: usize) -> Usage {
        Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    #[test]
    fn test_track() {
        let ledger = UsageLedger::new();
        assert!(ledger.get_last_usage().is_none());

        ledger.track("gpt-4o", Some(&usage(100, 50))).unwrap();
        ledger.track("gpt-4o", Some(&usage(200, 100))).unwrap();
        ledger.track("gpt-4o-mini", Some(&usage(10, 5))).unwrap();

        let summary = ledger.get_usage_summary();
        assert_eq!(summary.get("gpt-4o"), Some(&ModelUsageSummary::new(2, 300, 150)));
        assert_eq!(summary.get("gpt-4o-mini"), Some(&ModelUsageSummary::new(1, 10, 5)));
        assert_eq!(ledger.total_calls(), 3);
        assert_eq!(ledger.get_last_usage(), Some(ModelUsageSummary::new(1, 10, 5)));
    }

    #[test]
    fn test_missing_usage_fails() {
        let ledger = UsageLedger::new();
        ledger.track("gpt-4o", Some(&usage(1, 1))).unwrap();

        let err = ledger.track("gpt-4o", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageMissing);
        assert!(!err.is_retryable());

        // Nothing recorded for the failed call
        assert_eq!(ledger.total_calls(), 1);
        assert_eq!(ledger.get_last_usage(), Some(ModelUsageSummary::new(1, 1, 1)));
    }

    #[test]
    fn test_totals_never_decrease() {
        let ledger = UsageLedger::new();
        let mut previous = ledger.get_usage_summary();

        for i in 0..20 {
            let model = if i % 2 == 0 { "a" } else { "b" };
            ledger.track(model, Some(&usage(i, i * 2))).unwrap();

            let current = ledger.get_usage_summary();
            assert!(current.total_input_tokens() >= previous.total_input_tokens());
            assert!(current.total_output_tokens() >= previous.total_output_tokens());
            assert_eq!(current.total_calls(), i as u64 + 1);
            previous = current;
        }
    }

    #[test]
    fn test_concurrent_updates() {
        let ledger = Arc::new(UsageLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        ledger.track("gpt-4o", Some(&usage(2, 1))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            ledger.get_usage_summary().get("gpt-4o"),
            Some(&ModelUsageSummary::new(800, 1600, 800))
        );
    }
}
