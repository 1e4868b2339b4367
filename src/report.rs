use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::finance;
use crate::models::{Prospect, ProspectStatus, Settings};

pub fn status_breakdown(prospects: &[Prospect]) -> Vec<(ProspectStatus, usize)> {
    ProspectStatus::ALL
        .into_iter()
        .map(|status| (status, prospects.iter().filter(|p| p.status == status).count()))
        .filter(|(_, count)| *count > 0)
        .collect()
}

pub fn build_report(prospects: &[Prospect], settings: &Settings, now: DateTime<Utc>) -> String {
    let summary = finance::summarize(prospects, settings.profit_share_percent, now);
    let breakdown = status_breakdown(prospects);

    let mut output = String::new();

    let _ = writeln!(output, "# Pipeline Financial Report");
    let _ = writeln!(output, "Generated {}", now.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Pipeline");
    let _ = writeln!(
        output,
        "- {} prospects: {} active, {} won, {} lost",
        summary.total_count, summary.active_count, summary.won_count, summary.lost_count
    );

    for (status, count) in breakdown.iter() {
        let _ = writeln!(output, "- {}: {}", status, count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recurring Revenue");
    let _ = writeln!(output, "- MRR: {:.2}", summary.mrr);
    let _ = writeln!(
        output,
        "- ARR: {:.2} (includes {:.2} integration)",
        summary.arr, summary.integration_total
    );
    let _ = writeln!(
        output,
        "- Pipeline MRR: {:.2} (ARR {:.2} + {:.2} integration)",
        summary.pipeline_mrr, summary.pipeline_arr, summary.pipeline_integration
    );
    let _ = writeln!(
        output,
        "- Monthly costs: {:.2}, monthly profit {:.2}",
        summary.monthly_cost, summary.monthly_profit
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## To Date");
    let _ = writeln!(output, "- Collected: {:.2}", summary.total_collected);
    let _ = writeln!(output, "- Costs: {:.2}", summary.total_costs);
    let _ = writeln!(output, "- Net profit: {:.2}", summary.net_profit);
    let _ = writeln!(
        output,
        "- Profit share ({:.0}%): {:.2}",
        settings.profit_share_percent, summary.profit_share
    );
    let _ = writeln!(output, "- Delayed payments: {}", summary.delayed_payments);

    let mut clients = summary.clients.clone();
    clients.sort_by(|a, b| b.profit.partial_cmp(&a.profit).unwrap_or(std::cmp::Ordering::Equal));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Clients");

    if clients.is_empty() {
        let _ = writeln!(output, "No won clients yet.");
    } else {
        for client in clients.iter() {
            let _ = writeln!(
                output,
                "- {} ({}): {} months, collected {:.2}, costs {:.2}, profit {:.2}{}",
                client.company_name,
                client.id,
                client.months_elapsed,
                client.total_collected,
                client.total_costs,
                client.profit,
                if client.payment_delayed { " (payment delayed)" } else { "" }
            );
        }
    }

    output
}
