use serde::Serialize;

use crate::schemas::{Expense, Member};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub total_amount: f64,
    pub member_count: usize,
    pub expense_count: usize,
    pub average_amount: f64,
}

pub fn compute_group_stats(members: &[Member], expenses: &[Expense]) -> GroupStats {
    let total_amount: f64 = expenses.iter().map(|expense| expense.amount).sum();
    let expense_count = expenses.len();
    let average_amount = if expense_count > 0 {
        total_amount / expense_count as f64
    } else {
        0.0
    };
    GroupStats {
        total_amount,
        member_count: members.len(),
        expense_count,
        average_amount,
    }
}
