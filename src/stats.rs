//! Statistics
//!
//! Dashboard and report figures derived from fetched collections. Pure
//! functions: the result depends only on the multiset of inputs, never on
//! their order.

use serde::Serialize;

use crate::models::{Camera, Checklist, Execution, ExecutionStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub cameras: usize,
    pub checklists: usize,
    pub executions: usize,
    /// Executions still In Progress
    pub active_executions: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub failed: usize,
    pub aborted: usize,
    /// Percentage of executions completed, one decimal place; 0 when there are none
    pub success_rate: f64,
}

pub fn dashboard_stats(
    cameras: &[Camera],
    checklists: &[Checklist],
    executions: &[Execution],
) -> DashboardStats {
    DashboardStats {
        cameras: cameras.len(),
        checklists: checklists.len(),
        executions: executions.len(),
        active_executions: count_status(executions, ExecutionStatus::InProgress),
    }
}

pub fn report_stats(executions: &[Execution]) -> ReportStats {
    let total = executions.len();
    let completed = count_status(executions, ExecutionStatus::Completed);

    ReportStats {
        total,
        completed,
        in_progress: count_status(executions, ExecutionStatus::InProgress),
        failed: count_status(executions, ExecutionStatus::Failed),
        aborted: count_status(executions, ExecutionStatus::Aborted),
        success_rate: success_rate(completed, total),
    }
}

fn count_status(executions: &[Execution], status: ExecutionStatus) -> usize {
    executions.iter().filter(|e| e.status == status).count()
}

fn success_rate(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let percent = completed as f64 / total as f64 * 100.0;
    (percent * 10.0).round() / 10.0
}
