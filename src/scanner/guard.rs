//! Failure isolation at the rule boundary.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, warn};

use super::report::{Anomaly, Diagnostics, Phase};

/// Result of one guarded rule call.
pub(crate) struct Guarded<T> {
    /// `None` when the call returned an error or panicked.
    pub value: Option<T>,
    pub elapsed: Duration,
}

/// Runs one rule callback, turning errors and panics into a `RuleFailed` anomaly.
pub(crate) fn call_rule<T>(
    rule: &str,
    phase: Phase,
    file: Option<&Path>,
    diag: &mut Diagnostics,
    f: impl FnOnce() -> anyhow::Result<T>,
) -> Guarded<T> {
    let started = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(f));
    let elapsed = started.elapsed();

    let reason = match outcome {
        Ok(Ok(value)) => {
            return Guarded {
                value: Some(value),
                elapsed,
            };
        }
        Ok(Err(e)) => {
            warn!(rule, phase = phase.as_str(), file = ?file, error = %e, "Rule failed");
            format!("{:#}", e)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(rule, phase = phase.as_str(), file = ?file, panic = %message, "Rule panicked");
            format!("panic: {}", message)
        }
    };

    diag.record(Anomaly::RuleFailed {
        rule: rule.to_string(),
        phase,
        file: file.map(Path::to_path_buf),
        reason,
    });
    Guarded { value: None, elapsed }
}

/// Records a `RuleTimedOut` anomaly when `elapsed` is over `budget`. Returns whether it was.
pub(crate) fn check_budget(
    rule: &str,
    phase: Phase,
    file: Option<&Path>,
    elapsed: Duration,
    budget: Option<Duration>,
    diag: &mut Diagnostics,
) -> bool {
    match budget {
        Some(limit) if elapsed > limit => {
            warn!(
                rule,
                phase = phase.as_str(),
                file = ?file,
                elapsed_ms = elapsed.as_millis() as u64,
                "Rule exceeded its time budget"
            );
            diag.record(Anomaly::RuleTimedOut {
                rule: rule.to_string(),
                phase,
                file: file.map(Path::to_path_buf),
                elapsed_ms: elapsed.as_millis() as u64,
            });
            true
        }
        _ => false,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
