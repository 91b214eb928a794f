//! Failure Classifier
//!
//! Decides, once per cycle, whether the account loop keeps going.
//!
//! ```text
//!   no error ───────────────► Continue (counter = 0, wait scan_interval)
//!   contract, retryable ────► counter += 1
//!                               counter >= max_retries ─► Stop
//!                               otherwise ──────────────► Continue (wait min_scan_interval)
//!   contract, non-retryable ► Stop
//!   session expired ────────► Stop
//!   unrecoverable ──────────► Stop
//!   anything else ──────────► Continue (wait min_scan_interval)
//! ```
//!
//! `Stop` is terminal: the loop is not restarted automatically.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::error::RelayError;

/// Verdict for the end of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Continue,
    Stop,
}

/// State carried across cycles of one account loop
#[derive(Debug, Clone)]
pub struct RunState {
    /// Cycles in a row that ended in a contract error
    pub consecutive_contract_errors: u32,
    /// Confirmed submissions in the current cycle
    pub success_count: u32,
    /// Failed submissions in the current cycle
    pub failure_count: u32,
    /// Recipients that could not be served this cycle
    pub not_operational: HashSet<String>,
    pub next_scan_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            consecutive_contract_errors: 0,
            success_count: 0,
            failure_count: 0,
            not_operational: HashSet::new(),
            next_scan_at: now,
        }
    }

    /// Clear per-cycle bookkeeping. The consecutive counter survives.
    pub fn reset_cycle(&mut self) {
        self.success_count = 0;
        self.failure_count = 0;
        self.not_operational.clear();
    }

    /// Time left until the scheduled scan; zero when already due
    pub fn until_next_scan(&self, now: DateTime<Utc>) -> Duration {
        (self.next_scan_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

pub struct FailureClassifier {
    scan_interval: Duration,
    min_scan_interval: Duration,
}

impl FailureClassifier {
    pub fn new(scan_interval: Duration, min_scan_interval: Duration) -> Self {
        Self {
            scan_interval,
            min_scan_interval,
        }
    }

    /// Apply the cycle's outcome to `state` and schedule the next scan.
    pub fn evaluate(
        &self,
        error: Option<&RelayError>,
        state: &mut RunState,
        now: DateTime<Utc>,
    ) -> ScanStatus {
        let Some(err) = error else {
            state.consecutive_contract_errors = 0;
            state.next_scan_at = after(now, self.scan_interval);
            info!(
                success = state.success_count,
                next_scan_at = %state.next_scan_at,
                "Cycle finished"
            );
            return ScanStatus::Continue;
        };

        let status = match err {
            e if e.is_contract() => {
                if !e.is_retryable() {
                    error!(code = e.code(), error = %e, "Contract error is not retryable");
                    ScanStatus::Stop
                } else {
                    state.consecutive_contract_errors += 1;
                    match e.max_retries() {
                        Some(max) if state.consecutive_contract_errors >= max => {
                            error!(
                                code = e.code(),
                                consecutive = state.consecutive_contract_errors,
                                max_retries = max,
                                "Contract error retry limit reached"
                            );
                            ScanStatus::Stop
                        }
                        _ => {
                            warn!(
                                code = e.code(),
                                consecutive = state.consecutive_contract_errors,
                                error = %e,
                                "Contract error, will retry"
                            );
                            ScanStatus::Continue
                        }
                    }
                }
            }
            RelayError::SessionExpired(_) => {
                error!(code = err.code(), error = %err, "Signer session expired, log in again");
                ScanStatus::Stop
            }
            RelayError::Unrecoverable(_) => {
                error!(code = err.code(), error = %err, "Unrecoverable error");
                ScanStatus::Stop
            }
            _ => {
                warn!(code = err.code(), error = %err, "Cycle failed, will retry");
                ScanStatus::Continue
            }
        };

        match status {
            ScanStatus::Continue => {
                state.next_scan_at = after(now, self.min_scan_interval);
                info!(next_scan_at = %state.next_scan_at, "Next scan scheduled");
            }
            ScanStatus::Stop => {
                state.next_scan_at = now;
                error!("Relay stopped. Check the logs and restart manually");
            }
        }
        status
    }
}

fn after(now: DateTime<Utc>, wait: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(wait)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
