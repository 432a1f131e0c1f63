use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to the rest of a DAG when one of its jobs fails.
///
/// - `FinishRunning`: fail fast. Every other job still tracked for the DAG is
///   cancelled and the DAG is marked failed immediately.
/// - `FinishAllPossible`: best effort. Branches that do not depend on the
///   failed job keep running; the DAG is marked failed once nothing is left
///   in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureOption {
    FinishRunning,
    FinishAllPossible,
}

impl Default for FailureOption {
    fn default() -> Self {
        FailureOption::FinishRunning
    }
}

impl FromStr for FailureOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FINISH_RUNNING" => Ok(FailureOption::FinishRunning),
            "FINISH_ALL_POSSIBLE" => Ok(FailureOption::FinishAllPossible),
            other => Err(format!(
                "invalid failure option: {other} (expected \"FINISH_RUNNING\" or \"FINISH_ALL_POSSIBLE\")"
            )),
        }
    }
}

impl fmt::Display for FailureOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureOption::FinishRunning => f.write_str("FINISH_RUNNING"),
            FailureOption::FinishAllPossible => f.write_str("FINISH_ALL_POSSIBLE"),
        }
    }
}

/// Status of a single job execution.
///
/// The status source reports everything except `Pending`, which only exists
/// on nodes that have not been submitted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Orchestrated,
    Running,
    Complete,
    Failed,
    Cancelled,
    PendingRetry,
    PendingResume,
}

impl ExecutionStatus {
    /// The job has been handed to the executor and has not finished yet.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Orchestrated | ExecutionStatus::Running | ExecutionStatus::PendingRetry
        )
    }

    /// The attempt has ended; its executor reports nothing further.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Complete | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Failed or cancelled: a node a resume would run again.
    pub fn is_failure(self) -> bool {
        matches!(self, ExecutionStatus::Failed | ExecutionStatus::Cancelled)
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(ExecutionStatus::Pending),
            "ORCHESTRATED" => Ok(ExecutionStatus::Orchestrated),
            "RUNNING" => Ok(ExecutionStatus::Running),
            "COMPLETE" => Ok(ExecutionStatus::Complete),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "CANCELLED" => Ok(ExecutionStatus::Cancelled),
            "PENDING_RETRY" => Ok(ExecutionStatus::PendingRetry),
            "PENDING_RESUME" => Ok(ExecutionStatus::PendingResume),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Orchestrated => "ORCHESTRATED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Complete => "COMPLETE",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Cancelled => "CANCELLED",
            ExecutionStatus::PendingRetry => "PENDING_RETRY",
            ExecutionStatus::PendingResume => "PENDING_RESUME",
        };
        f.write_str(s)
    }
}

/// Parse a simple duration string like `"250ms"`, `"3s"`, `"15m"`, `"2h"`
/// or `"7d"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 60 * 60 * 24,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, h or d",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_duration(" 2h "), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_duration("7d"), Ok(Duration::from_secs(604_800)));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("1w").is_err());
        assert!(parse_duration("h1").is_err());
        assert!(parse_duration("999999999999999999d").is_err());
        assert!(parse_duration("99999999999999999999s").is_err());
    }

    #[test]
    fn failure_option_round_trips_through_strings() {
        for opt in [FailureOption::FinishRunning, FailureOption::FinishAllPossible] {
            assert_eq!(opt.to_string().parse::<FailureOption>(), Ok(opt));
        }
        assert_eq!(
            "finish_all_possible".parse::<FailureOption>(),
            Ok(FailureOption::FinishAllPossible)
        );
        assert!("FINISH_SOMETIMES".parse::<FailureOption>().is_err());
    }

    #[test]
    fn execution_status_parses_wire_names() {
        assert_eq!(
            "PENDING_RESUME".parse::<ExecutionStatus>(),
            Ok(ExecutionStatus::PendingResume)
        );
        assert!(ExecutionStatus::Cancelled.is_failure());
        assert!(ExecutionStatus::PendingRetry.is_in_flight());
        assert!(!ExecutionStatus::Complete.is_in_flight());
        assert!(ExecutionStatus::Failed.is_final());
        assert!(!ExecutionStatus::PendingRetry.is_final());
    }
}
