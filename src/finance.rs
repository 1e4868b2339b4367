use chrono::{DateTime, Utc};

use crate::models::{ClientFinancials, FinancialSummary, LedgerEntry, Prospect, ProspectStatus};

/// Average month length used for every elapsed-month figure.
pub const AVG_DAYS_PER_MONTH: f64 = 30.44;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Whole average-length months from `from` to `to`; zero if `to` is not later.
pub fn months_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
    let days = (to - from).num_milliseconds() as f64 / MILLIS_PER_DAY;
    (days / AVG_DAYS_PER_MONTH).floor().max(0.0) as u32
}

pub fn integration_months_elapsed(prospect: &Prospect, now: DateTime<Utc>) -> u32 {
    prospect
        .integration_start()
        .map_or(0, |start| months_between(start, now))
}

/// Walks a ledger in order: each entry is charged for the whole months
/// between its date (no earlier than `start`) and the next entry, or `now`.
pub fn ledger_total(ledger: &[LedgerEntry], start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let window_ends = ledger
        .iter()
        .skip(1)
        .map(|entry| entry.date)
        .chain(std::iter::once(now));

    ledger
        .iter()
        .zip(window_ends)
        .fold(0.0, |total, (entry, end)| {
            let months = months_between(entry.date.max(start), end);
            total + f64::from(months) * entry.amount
        })
}

/// Recurring amount accrued since the integration start: a ledger walk when
/// the ledger has entries, otherwise the flat rate times elapsed months.
fn accrued(
    prospect: &Prospect,
    ledger: &[LedgerEntry],
    flat_rate: f64,
    now: DateTime<Utc>,
) -> f64 {
    let Some(start) = prospect.integration_start() else {
        return 0.0;
    };
    if ledger.is_empty() {
        f64::from(months_between(start, now)) * flat_rate
    } else {
        ledger_total(ledger, start, now)
    }
}

pub fn total_collected(prospect: &Prospect, now: DateTime<Utc>) -> f64 {
    prospect.integration_fee + accrued(prospect, &prospect.fee_history, prospect.monthly_fee, now)
}

pub fn total_costs(prospect: &Prospect, now: DateTime<Utc>) -> f64 {
    accrued(prospect, &prospect.cost_history, prospect.monthly_cost, now)
}

pub fn summarize(
    prospects: &[Prospect],
    profit_share_percent: f64,
    now: DateTime<Utc>,
) -> FinancialSummary {
    let won: Vec<&Prospect> = prospects
        .iter()
        .filter(|p| p.status == ProspectStatus::Won)
        .collect();
    let active: Vec<&Prospect> = prospects.iter().filter(|p| p.status.is_active()).collect();

    let mrr: f64 = won.iter().map(|p| p.monthly_fee).sum();
    let integration_total: f64 = won.iter().map(|p| p.integration_fee).sum();
    let monthly_cost: f64 = won.iter().map(|p| p.monthly_cost).sum();
    let pipeline_mrr: f64 = active.iter().map(|p| p.monthly_fee).sum();
    let pipeline_integration: f64 = active.iter().map(|p| p.integration_fee).sum();

    let clients: Vec<ClientFinancials> = won
        .iter()
        .map(|p| {
            let total_collected = total_collected(p, now);
            let total_costs = total_costs(p, now);
            ClientFinancials {
                id: p.id.clone(),
                company_name: p.company_name.clone(),
                months_elapsed: integration_months_elapsed(p, now),
                total_collected,
                total_costs,
                profit: total_collected - total_costs,
                payment_delayed: p.payment_delayed,
            }
        })
        .collect();

    let total_collected: f64 = clients.iter().map(|c| c.total_collected).sum();
    let total_costs: f64 = clients.iter().map(|c| c.total_costs).sum();
    let net_profit = total_collected - total_costs;

    FinancialSummary {
        total_count: prospects.len(),
        active_count: active.len(),
        won_count: won.len(),
        lost_count: prospects
            .iter()
            .filter(|p| p.status == ProspectStatus::Lost)
            .count(),
        mrr,
        integration_total,
        arr: mrr * 12.0 + integration_total,
        pipeline_mrr,
        pipeline_integration,
        pipeline_arr: pipeline_mrr * 12.0,
        monthly_cost,
        monthly_profit: mrr - monthly_cost,
        total_collected,
        total_costs,
        net_profit,
        profit_share: net_profit * profit_share_percent / 100.0,
        delayed_payments: clients.iter().filter(|c| c.payment_delayed).count(),
        clients,
    }
}
