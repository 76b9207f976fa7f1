//! Instalment schedule bookkeeping.
//!
//! The processor collects instalments itself and reports each cycle through a
//! webhook; this module keeps the local mirror of the schedule in sync.

use serde::{Deserialize, Serialize};

use crate::gateway::types::InstalmentInfo;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstalmentCycle {
    pub cycle: u32,
    /// Transaction id of the cycle once the processor executed it.
    #[serde(default)]
    pub tid: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub refunded_amount: i64,
}

/// How an instalment cancellation applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelMode {
    /// Refund everything collected so far and stop.
    AllCycles,
    /// Keep what was collected, stop future cycles.
    RemainingCycles,
}

impl CancelMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ALL_CYCLES" => Some(Self::AllCycles),
            "REMAINING_CYCLES" => Some(Self::RemainingCycles),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstalmentPlan {
    pub total_cycles: u32,
    pub cycle_amount: i64,
    pub cycles_executed: u32,
    #[serde(default)]
    pub next_cycle_date: Option<String>,
    /// Cleared when the schedule is cancelled.
    pub active: bool,
    pub cycles: Vec<InstalmentCycle>,
}

impl InstalmentPlan {
    /// Builds the local schedule from the processor's instalment block on the
    /// initial transaction. The first cycle is the confirmed transaction
    /// itself.
    pub fn from_gateway(info: &InstalmentInfo, first_tid: &str, total_amount: i64) -> Self {
        let cycle_amount = info.cycle_amount.unwrap_or(total_amount);
        let executed = info.cycles_executed.unwrap_or(1).max(1);
        let total_cycles = executed + info.pending_cycles.unwrap_or(0);

        let mut cycles = Vec::with_capacity(total_cycles as usize);
        for cycle in 1..=total_cycles.max(1) {
            let date = info
                .cycle_dates
                .as_ref()
                .and_then(|dates| dates.get(&cycle.to_string()))
                .and_then(|value| value.as_str())
                .map(str::to_string);
            cycles.push(InstalmentCycle {
                cycle,
                tid: (cycle == 1).then(|| first_tid.to_string()),
                amount: cycle_amount,
                date,
                refunded_amount: 0,
            });
        }

        InstalmentPlan {
            total_cycles: total_cycles.max(1),
            cycle_amount,
            cycles_executed: executed,
            next_cycle_date: info.next_cycle_date.clone(),
            active: true,
            cycles,
        }
    }

    /// Applies a cycle-executed notification. Returns the cycle number, or
    /// `None` when the schedule is already complete or inactive.
    pub fn record_cycle(&mut self, info: &InstalmentInfo, cycle_tid: &str) -> Option<u32> {
        if !self.active {
            return None;
        }
        let executed = info
            .cycles_executed
            .unwrap_or(self.cycles_executed + 1)
            .min(self.total_cycles);
        if executed <= self.cycles_executed {
            return None;
        }
        self.cycles_executed = executed;
        self.next_cycle_date = info.next_cycle_date.clone();

        if let Some(entry) = self.cycles.iter_mut().find(|c| c.cycle == executed) {
            entry.tid = Some(cycle_tid.to_string());
            if let Some(amount) = info.cycle_amount {
                entry.amount = amount;
            }
        }
        Some(executed)
    }

    /// Books a refund against the cycle carrying `tid`. Returns the cycle
    /// number when one matched.
    pub fn apply_refund(&mut self, tid: &str, amount: i64) -> Option<u32> {
        let entry = self
            .cycles
            .iter_mut()
            .find(|c| c.tid.as_deref() == Some(tid))?;
        entry.refunded_amount += amount;
        Some(entry.cycle)
    }

    /// Amount collected across executed cycles, net of per-cycle refunds.
    pub fn collected_amount(&self) -> i64 {
        self.cycles
            .iter()
            .filter(|c| c.tid.is_some())
            .map(|c| (c.amount - c.refunded_amount).max(0))
            .sum()
    }

    /// Deactivates the schedule. For [`CancelMode::AllCycles`] the collected
    /// amount becomes refundable; for remaining-cycles nothing is paid back.
    pub fn cancel(&mut self, mode: CancelMode) -> i64 {
        self.active = false;
        self.next_cycle_date = None;
        match mode {
            CancelMode::AllCycles => self.collected_amount(),
            CancelMode::RemainingCycles => 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.cycles_executed >= self.total_cycles
    }
}
