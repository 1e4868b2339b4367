use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Country codes offered for the `country` field. `GE` is the default.
pub const COUNTRIES: &[(&str, &str)] = &[
    ("GE", "Georgia"),
    ("KZ", "Kazakhstan"),
    ("AM", "Armenia"),
    ("AZ", "Azerbaijan"),
    ("UZ", "Uzbekistan"),
    ("KG", "Kyrgyzstan"),
    ("UA", "Ukraine"),
    ("MD", "Moldova"),
    ("TR", "Turkey"),
    ("DE", "Germany"),
    ("GB", "United Kingdom"),
    ("US", "United States"),
    ("AE", "United Arab Emirates"),
];

pub const DEFAULT_COUNTRY: &str = "GE";

pub fn is_known_country(code: &str) -> bool {
    COUNTRIES.iter().any(|(known, _)| *known == code)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProspectStatus {
    #[default]
    New,
    Contacted,
    MeetingScheduled,
    ProposalSent,
    Negotiation,
    Won,
    Lost,
}

impl ProspectStatus {
    pub const ALL: [ProspectStatus; 7] = [
        ProspectStatus::New,
        ProspectStatus::Contacted,
        ProspectStatus::MeetingScheduled,
        ProspectStatus::ProposalSent,
        ProspectStatus::Negotiation,
        ProspectStatus::Won,
        ProspectStatus::Lost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProspectStatus::New => "new",
            ProspectStatus::Contacted => "contacted",
            ProspectStatus::MeetingScheduled => "meeting_scheduled",
            ProspectStatus::ProposalSent => "proposal_sent",
            ProspectStatus::Negotiation => "negotiation",
            ProspectStatus::Won => "won",
            ProspectStatus::Lost => "lost",
        }
    }

    /// Won and lost are terminal; everything else is still in the pipeline.
    pub fn is_active(self) -> bool {
        !matches!(self, ProspectStatus::Won | ProspectStatus::Lost)
    }
}

impl fmt::Display for ProspectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProspectStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ProspectStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| format!("unknown status '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProspectType {
    #[default]
    Business,
    Government,
}

impl ProspectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProspectType::Business => "business",
            ProspectType::Government => "government",
        }
    }
}

impl fmt::Display for ProspectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProspectType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "business" => Ok(ProspectType::Business),
            "government" => Ok(ProspectType::Government),
            other => Err(format!("unknown prospect type '{other}'")),
        }
    }
}

/// One value in a fee or cost ledger, effective from `date` until the next entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub date: DateTime<Utc>,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    pub id: String,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub status: ProspectStatus,
    #[serde(rename = "type")]
    pub kind: ProspectType,
    pub country: String,
    pub monthly_fee: f64,
    pub integration_fee: f64,
    pub monthly_cost: f64,
    #[serde(default)]
    pub logo_url: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub integration_start_date: Option<NaiveDate>,
    pub payment_day_of_month: u8,
    #[serde(default)]
    pub payment_delayed: bool,
    #[serde(default)]
    pub payment_delay_notes: String,
    #[serde(default)]
    pub cost_history: Vec<LedgerEntry>,
    #[serde(default)]
    pub fee_history: Vec<LedgerEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a caller supplies when creating a prospect.
#[derive(Debug, Clone, PartialEq)]
pub struct ProspectDraft {
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub status: ProspectStatus,
    pub kind: ProspectType,
    pub country: String,
    pub monthly_fee: f64,
    pub integration_fee: f64,
    pub monthly_cost: f64,
    pub logo_url: String,
    pub notes: String,
    pub integration_start_date: Option<NaiveDate>,
    pub payment_day_of_month: u8,
    pub payment_delayed: bool,
    pub payment_delay_notes: String,
}

impl Default for ProspectDraft {
    fn default() -> Self {
        Self {
            company_name: String::new(),
            contact_name: String::new(),
            email: String::new(),
            phone: String::new(),
            status: ProspectStatus::New,
            kind: ProspectType::Business,
            country: DEFAULT_COUNTRY.to_string(),
            monthly_fee: 0.0,
            integration_fee: 0.0,
            monthly_cost: 0.0,
            logo_url: String::new(),
            notes: String::new(),
            integration_start_date: None,
            payment_day_of_month: 1,
            payment_delayed: false,
            payment_delay_notes: String::new(),
        }
    }
}

/// A partial update. `None` leaves the field untouched; for the start date,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProspectPatch {
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<ProspectStatus>,
    pub kind: Option<ProspectType>,
    pub country: Option<String>,
    pub monthly_fee: Option<f64>,
    pub integration_fee: Option<f64>,
    pub monthly_cost: Option<f64>,
    pub logo_url: Option<String>,
    pub notes: Option<String>,
    pub integration_start_date: Option<Option<NaiveDate>>,
    pub payment_day_of_month: Option<u8>,
    pub payment_delayed: Option<bool>,
    pub payment_delay_notes: Option<String>,
}

impl ProspectPatch {
    pub fn status(status: ProspectStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Mutable prospect fields, used to describe which columns an update touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    CompanyName,
    ContactName,
    Email,
    Phone,
    Status,
    Kind,
    Country,
    MonthlyFee,
    IntegrationFee,
    MonthlyCost,
    LogoUrl,
    Notes,
    IntegrationStartDate,
    PaymentDayOfMonth,
    PaymentDelayed,
    PaymentDelayNotes,
    CostHistory,
    FeeHistory,
    UpdatedAt,
}

impl Prospect {
    pub fn from_draft(id: String, draft: ProspectDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            company_name: draft.company_name.trim().to_string(),
            contact_name: draft.contact_name,
            email: draft.email,
            phone: draft.phone,
            status: draft.status,
            kind: draft.kind,
            country: draft.country,
            monthly_fee: finite_amount(draft.monthly_fee),
            integration_fee: finite_amount(draft.integration_fee),
            monthly_cost: finite_amount(draft.monthly_cost),
            logo_url: draft.logo_url,
            notes: draft.notes,
            integration_start_date: draft.integration_start_date,
            payment_day_of_month: draft.payment_day_of_month.clamp(1, 31),
            payment_delayed: draft.payment_delayed,
            payment_delay_notes: draft.payment_delay_notes,
            cost_history: Vec::new(),
            fee_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn integration_start(&self) -> Option<DateTime<Utc>> {
        self.integration_start_date
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|start| start.and_utc())
    }

    /// Merges `patch` into the record and stamps `updated_at`.
    ///
    /// Fee and cost changes are appended to their ledgers. Returns the fields
    /// that were written, `UpdatedAt` always included.
    pub fn apply(&mut self, patch: &ProspectPatch, now: DateTime<Utc>) -> Vec<Field> {
        let mut changed = Vec::new();

        macro_rules! assign {
            ($field:ident, $tag:expr) => {
                if let Some(value) = &patch.$field {
                    self.$field = value.clone();
                    changed.push($tag);
                }
            };
        }

        if let Some(name) = &patch.company_name {
            self.company_name = name.trim().to_string();
            changed.push(Field::CompanyName);
        }
        assign!(contact_name, Field::ContactName);
        assign!(email, Field::Email);
        assign!(phone, Field::Phone);
        assign!(status, Field::Status);
        assign!(kind, Field::Kind);
        assign!(country, Field::Country);
        assign!(logo_url, Field::LogoUrl);
        assign!(notes, Field::Notes);
        assign!(integration_start_date, Field::IntegrationStartDate);
        assign!(payment_delayed, Field::PaymentDelayed);
        assign!(payment_delay_notes, Field::PaymentDelayNotes);

        if let Some(fee) = patch.integration_fee {
            self.integration_fee = finite_amount(fee);
            changed.push(Field::IntegrationFee);
        }
        if let Some(day) = patch.payment_day_of_month {
            self.payment_day_of_month = day.clamp(1, 31);
            changed.push(Field::PaymentDayOfMonth);
        }

        let seed_date = self.integration_start().unwrap_or(self.created_at);
        if let Some(fee) = patch.monthly_fee.map(finite_amount) {
            if fee != self.monthly_fee {
                append_ledger(&mut self.fee_history, self.monthly_fee, fee, seed_date, now);
                changed.push(Field::FeeHistory);
            }
            self.monthly_fee = fee;
            changed.push(Field::MonthlyFee);
        }
        if let Some(cost) = patch.monthly_cost.map(finite_amount) {
            if cost != self.monthly_cost {
                append_ledger(&mut self.cost_history, self.monthly_cost, cost, seed_date, now);
                changed.push(Field::CostHistory);
            }
            self.monthly_cost = cost;
            changed.push(Field::MonthlyCost);
        }

        self.updated_at = next_timestamp(self.updated_at, now);
        changed.push(Field::UpdatedAt);
        changed
    }
}

// An empty ledger is seeded with `previous` at `seed_date`.
fn append_ledger(
    ledger: &mut Vec<LedgerEntry>,
    previous: f64,
    amount: f64,
    seed_date: DateTime<Utc>,
    now: DateTime<Utc>,
) {
    if ledger.is_empty() && previous != 0.0 {
        ledger.push(LedgerEntry {
            date: seed_date.min(now),
            amount: previous,
        });
    }
    let date = ledger.last().map_or(now, |last| now.max(last.date));
    ledger.push(LedgerEntry { date, amount });
}

/// Amounts must serialize as JSON numbers, so NaN and infinities become 0.
fn finite_amount(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// A timestamp strictly after `previous`, normally `now`.
pub fn next_timestamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Time-based id with a random suffix. Unique in practice, not guaranteed.
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", to_base36(millis), &suffix[..10])
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub profit_share_percent: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profit_share_percent: 30.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientFinancials {
    pub id: String,
    pub company_name: String,
    pub months_elapsed: u32,
    pub total_collected: f64,
    pub total_costs: f64,
    pub profit: f64,
    pub payment_delayed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FinancialSummary {
    pub total_count: usize,
    pub active_count: usize,
    pub won_count: usize,
    pub lost_count: usize,
    pub mrr: f64,
    pub integration_total: f64,
    pub arr: f64,
    pub pipeline_mrr: f64,
    pub pipeline_integration: f64,
    pub pipeline_arr: f64,
    pub monthly_cost: f64,
    pub monthly_profit: f64,
    pub total_collected: f64,
    pub total_costs: f64,
    pub net_profit: f64,
    pub profit_share: f64,
    pub delayed_payments: usize,
    pub clients: Vec<ClientFinancials>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(now: DateTime<Utc>) -> Prospect {
        Prospect::from_draft(
            "p1".to_string(),
            ProspectDraft {
                company_name: "  Tbilisi Bank ".to_string(),
                monthly_fee: 100.0,
                monthly_cost: 40.0,
                integration_start_date: NaiveDate::from_ymd_opt(2026, 1, 1),
                ..ProspectDraft::default()
            },
            now,
        )
    }

    #[test]
    fn status_parsing_matches_wire_names() {
        assert_eq!(
            "meeting_scheduled".parse::<ProspectStatus>(),
            Ok(ProspectStatus::MeetingScheduled)
        );
        assert!("archived".parse::<ProspectStatus>().is_err());
        assert!(!ProspectStatus::Won.is_active());
        assert!(!ProspectStatus::Lost.is_active());
        assert!(ProspectStatus::Negotiation.is_active());
    }

    #[test]
    fn draft_becomes_record_with_equal_timestamps() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let prospect = sample(now);
        assert_eq!(prospect.company_name, "Tbilisi Bank");
        assert_eq!(prospect.created_at, prospect.updated_at);
        assert!(prospect.cost_history.is_empty());
        assert_eq!(prospect.country, "GE");
    }

    #[test]
    fn cost_change_keeps_previous_cost_as_history() {
        let created = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let mut prospect = sample(created);
        let later = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

        let changed = prospect.apply(
            &ProspectPatch {
                monthly_cost: Some(55.0),
                ..ProspectPatch::default()
            },
            later,
        );

        assert!(changed.contains(&Field::CostHistory));
        assert_eq!(prospect.monthly_cost, 55.0);
        assert_eq!(prospect.cost_history.len(), 2);
        assert_eq!(prospect.cost_history[0].amount, 40.0);
        assert_eq!(
            prospect.cost_history[0].date,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(prospect.cost_history[1], LedgerEntry { date: later, amount: 55.0 });
    }

    #[test]
    fn unchanged_fee_does_not_touch_ledger() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let mut prospect = sample(now);
        let changed = prospect.apply(
            &ProspectPatch {
                monthly_fee: Some(100.0),
                ..ProspectPatch::default()
            },
            now,
        );
        assert!(!changed.contains(&Field::FeeHistory));
        assert!(prospect.fee_history.is_empty());
        assert!(prospect.updated_at > prospect.created_at);
    }

    #[test]
    fn non_finite_amounts_are_stored_as_zero() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let mut prospect = Prospect::from_draft(
            "p2".to_string(),
            ProspectDraft {
                company_name: "Poti Logistics".to_string(),
                monthly_fee: f64::NAN,
                integration_fee: f64::INFINITY,
                ..ProspectDraft::default()
            },
            now,
        );
        assert_eq!(prospect.monthly_fee, 0.0);
        assert_eq!(prospect.integration_fee, 0.0);

        prospect.apply(
            &ProspectPatch {
                monthly_cost: Some(f64::NEG_INFINITY),
                integration_fee: Some(f64::NAN),
                ..ProspectPatch::default()
            },
            now,
        );
        assert_eq!(prospect.monthly_cost, 0.0);
        assert_eq!(prospect.integration_fee, 0.0);
        assert!(prospect.cost_history.is_empty());
    }

    #[test]
    fn ledger_dates_never_go_backwards() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let mut ledger = vec![LedgerEntry { date: now, amount: 10.0 }];
        append_ledger(&mut ledger, 10.0, 20.0, now, now - Duration::days(3));
        assert_eq!(ledger[1].date, now);
    }

    #[test]
    fn generated_ids_differ() {
        let first = generate_id();
        let second = generate_id();
        assert_ne!(first, second);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn base36_encodes_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
