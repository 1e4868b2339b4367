//! Mapping between [`Prospect`] and the flat rows of the remote `prospects` table.
//!
//! Rows travel as JSON objects keyed by column name. Reading a row never
//! fails: every column has a default and loosely typed values are coerced.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::models::{
    generate_id, Field, LedgerEntry, Prospect, ProspectStatus, ProspectType, DEFAULT_COUNTRY,
};

pub type RemoteRow = Map<String, Value>;

/// Every column of the remote table, in table order.
pub const COLUMNS: &[&str] = &[
    "id",
    "company_name",
    "contact_name",
    "email",
    "phone",
    "status",
    "type",
    "country",
    "monthly_fee",
    "integration_fee",
    "monthly_cost",
    "logo_url",
    "notes",
    "integration_start_date",
    "payment_day_of_month",
    "payment_delayed",
    "payment_delay_notes",
    "cost_history",
    "fee_history",
    "created_at",
    "updated_at",
];

pub fn column(field: Field) -> &'static str {
    match field {
        Field::CompanyName => "company_name",
        Field::ContactName => "contact_name",
        Field::Email => "email",
        Field::Phone => "phone",
        Field::Status => "status",
        Field::Kind => "type",
        Field::Country => "country",
        Field::MonthlyFee => "monthly_fee",
        Field::IntegrationFee => "integration_fee",
        Field::MonthlyCost => "monthly_cost",
        Field::LogoUrl => "logo_url",
        Field::Notes => "notes",
        Field::IntegrationStartDate => "integration_start_date",
        Field::PaymentDayOfMonth => "payment_day_of_month",
        Field::PaymentDelayed => "payment_delayed",
        Field::PaymentDelayNotes => "payment_delay_notes",
        Field::CostHistory => "cost_history",
        Field::FeeHistory => "fee_history",
        Field::UpdatedAt => "updated_at",
    }
}

pub fn to_remote_row(prospect: &Prospect) -> RemoteRow {
    let mut row = Map::new();
    row.insert("id".into(), Value::from(prospect.id.clone()));
    row.insert("company_name".into(), Value::from(prospect.company_name.clone()));
    row.insert("contact_name".into(), Value::from(prospect.contact_name.clone()));
    row.insert("email".into(), Value::from(prospect.email.clone()));
    row.insert("phone".into(), Value::from(prospect.phone.clone()));
    row.insert("status".into(), Value::from(prospect.status.as_str()));
    row.insert("type".into(), Value::from(prospect.kind.as_str()));
    row.insert("country".into(), Value::from(prospect.country.clone()));
    row.insert("monthly_fee".into(), Value::from(prospect.monthly_fee));
    row.insert("integration_fee".into(), Value::from(prospect.integration_fee));
    row.insert("monthly_cost".into(), Value::from(prospect.monthly_cost));
    row.insert("logo_url".into(), Value::from(prospect.logo_url.clone()));
    row.insert("notes".into(), Value::from(prospect.notes.clone()));
    row.insert(
        "integration_start_date".into(),
        Value::from(
            prospect
                .integration_start_date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        ),
    );
    row.insert(
        "payment_day_of_month".into(),
        Value::from(prospect.payment_day_of_month),
    );
    row.insert("payment_delayed".into(), Value::from(prospect.payment_delayed));
    row.insert(
        "payment_delay_notes".into(),
        Value::from(prospect.payment_delay_notes.clone()),
    );
    row.insert("cost_history".into(), ledger_payload(&prospect.cost_history));
    row.insert("fee_history".into(), ledger_payload(&prospect.fee_history));
    row.insert("created_at".into(), Value::from(timestamp(prospect.created_at)));
    row.insert("updated_at".into(), Value::from(timestamp(prospect.updated_at)));
    row
}

/// Restricts a row to `id` plus the columns named by `fields`.
pub fn remote_subset(row: &RemoteRow, fields: &[Field]) -> RemoteRow {
    let mut subset = Map::new();
    for name in std::iter::once("id").chain(fields.iter().map(|field| column(*field))) {
        if let Some(value) = row.get(name) {
            subset.insert(name.to_string(), value.clone());
        }
    }
    subset
}

pub fn from_remote_row(row: &RemoteRow) -> Prospect {
    let id = match text(row, "id") {
        id if id.is_empty() => {
            let fresh = generate_id();
            warn!("Remote row without id, assigned {}", fresh);
            fresh
        }
        id => id,
    };

    let created_at = instant(row, "created_at").unwrap_or_else(Utc::now);
    let updated_at = instant(row, "updated_at")
        .unwrap_or(created_at)
        .max(created_at);

    let country = match text(row, "country") {
        country if country.is_empty() => DEFAULT_COUNTRY.to_string(),
        country => country,
    };

    Prospect {
        id,
        company_name: text(row, "company_name"),
        contact_name: text(row, "contact_name"),
        email: text(row, "email"),
        phone: text(row, "phone"),
        status: text(row, "status").parse().unwrap_or(ProspectStatus::New),
        kind: text(row, "type").parse().unwrap_or(ProspectType::Business),
        country,
        monthly_fee: number(row, "monthly_fee"),
        integration_fee: number(row, "integration_fee"),
        monthly_cost: number(row, "monthly_cost"),
        logo_url: text(row, "logo_url"),
        notes: text(row, "notes"),
        integration_start_date: date(row, "integration_start_date"),
        payment_day_of_month: day_of_month(row, "payment_day_of_month"),
        payment_delayed: flag(row, "payment_delayed"),
        payment_delay_notes: text(row, "payment_delay_notes"),
        cost_history: ledger(row, "cost_history"),
        fee_history: ledger(row, "fee_history"),
        created_at,
        updated_at,
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn ledger_payload(entries: &[LedgerEntry]) -> Value {
    // Vec<LedgerEntry> always serializes; an empty list is the only sane fallback.
    Value::from(serde_json::to_string(entries).unwrap_or_else(|_| "[]".to_string()))
}

fn text(row: &RemoteRow, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(value)) => value.clone(),
        Some(Value::Number(value)) => value.to_string(),
        Some(Value::Bool(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn number(row: &RemoteRow, key: &str) -> f64 {
    let value = match row.get(key) {
        Some(Value::Number(value)) => value.as_f64(),
        Some(Value::String(value)) => value.trim().parse::<f64>().ok(),
        Some(Value::Bool(value)) => Some(if *value { 1.0 } else { 0.0 }),
        _ => None,
    };
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn flag(row: &RemoteRow, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Bool(value)) => *value,
        Some(Value::Number(value)) => value.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(value)) => {
            matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "t" | "yes")
        }
        _ => false,
    }
}

fn day_of_month(row: &RemoteRow, key: &str) -> u8 {
    match row.get(key) {
        None | Some(Value::Null) => 1,
        Some(_) => number(row, key).round().clamp(1.0, 31.0) as u8,
    }
}

fn date(row: &RemoteRow, key: &str) -> Option<NaiveDate> {
    let raw = text(row, key);
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|at| at.date_naive()))
}

fn instant(row: &RemoteRow, key: &str) -> Option<DateTime<Utc>> {
    let raw = text(row, key);
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // Postgres' own text rendering, e.g. "2026-01-05 10:00:00+00".
            DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z")
                .map(|at| at.with_timezone(&Utc))
                .ok()
        })
}

fn ledger(row: &RemoteRow, key: &str) -> Vec<LedgerEntry> {
    let parsed = match row.get(key) {
        Some(Value::String(payload)) if payload.trim().is_empty() => return Vec::new(),
        Some(Value::String(payload)) => serde_json::from_str::<Vec<LedgerEntry>>(payload),
        Some(value) if value.is_array() => {
            serde_json::from_value::<Vec<LedgerEntry>>(value.clone())
        }
        _ => return Vec::new(),
    };
    parsed.unwrap_or_else(|err| {
        warn!("Discarding malformed {} for remote row: {}", key, err);
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn full_prospect() -> Prospect {
        let created = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        Prospect {
            id: "m2x9k1abc123".to_string(),
            company_name: "Caucasus Logistics".to_string(),
            contact_name: "Nino Beridze".to_string(),
            email: "nino@example.ge".to_string(),
            phone: "+995 555 000 111".to_string(),
            status: ProspectStatus::Won,
            kind: ProspectType::Government,
            country: "KZ".to_string(),
            monthly_fee: 249.99,
            integration_fee: 1500.0,
            monthly_cost: 42.5,
            logo_url: "https://example.ge/logo.png".to_string(),
            notes: "Signed after second demo".to_string(),
            integration_start_date: NaiveDate::from_ymd_opt(2026, 1, 15),
            payment_day_of_month: 28,
            payment_delayed: true,
            payment_delay_notes: "Waiting on treasury".to_string(),
            cost_history: vec![
                LedgerEntry {
                    date: Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap(),
                    amount: 30.0,
                },
                LedgerEntry {
                    date: created + chrono::Duration::nanoseconds(123_456_789),
                    amount: 42.5,
                },
            ],
            fee_history: Vec::new(),
            created_at: created,
            updated_at: created + chrono::Duration::nanoseconds(987_654_321),
        }
    }

    #[test]
    fn round_trips_a_complete_record() {
        let prospect = full_prospect();
        let row = to_remote_row(&prospect);
        assert_eq!(from_remote_row(&row), prospect);
    }

    #[test]
    fn row_uses_snake_case_columns_and_string_ledgers() {
        let row = to_remote_row(&full_prospect());
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        for column in COLUMNS {
            assert!(keys.contains(column), "missing column {column}");
        }
        assert!(row["cost_history"].is_string());
        assert_eq!(row["integration_start_date"], json!("2026-01-15"));
        assert_eq!(row["type"], json!("government"));
    }

    #[test]
    fn empty_row_falls_back_to_defaults() {
        let prospect = from_remote_row(&Map::new());
        assert!(!prospect.id.is_empty());
        assert_eq!(prospect.company_name, "");
        assert_eq!(prospect.status, ProspectStatus::New);
        assert_eq!(prospect.kind, ProspectType::Business);
        assert_eq!(prospect.country, "GE");
        assert_eq!(prospect.monthly_fee, 0.0);
        assert_eq!(prospect.payment_day_of_month, 1);
        assert!(!prospect.payment_delayed);
        assert!(prospect.cost_history.is_empty());
        assert!(prospect.updated_at >= prospect.created_at);
    }

    #[test]
    fn loosely_typed_values_are_coerced() {
        let row = json!({
            "id": "abc",
            "company_name": "Kartli Water",
            "status": "negotiation",
            "monthly_fee": "120.5",
            "integration_fee": null,
            "monthly_cost": true,
            "payment_day_of_month": 45,
            "payment_delayed": "true",
            "cost_history": [{ "date": "2026-01-01T00:00:00Z", "amount": 10.0 }],
            "fee_history": "not json",
            "created_at": "2026-01-05 10:00:00+00",
            "updated_at": "2025-12-01T00:00:00Z"
        });
        let prospect = from_remote_row(row.as_object().unwrap());

        assert_eq!(prospect.status, ProspectStatus::Negotiation);
        assert_eq!(prospect.monthly_fee, 120.5);
        assert_eq!(prospect.integration_fee, 0.0);
        assert_eq!(prospect.monthly_cost, 1.0);
        assert_eq!(prospect.payment_day_of_month, 31);
        assert!(prospect.payment_delayed);
        assert_eq!(prospect.cost_history.len(), 1);
        assert!(prospect.fee_history.is_empty());
        assert_eq!(
            prospect.created_at,
            Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap()
        );
        assert_eq!(prospect.updated_at, prospect.created_at);
    }

    #[test]
    fn unknown_enum_values_default() {
        let row = json!({ "id": "x", "status": "archived", "type": "ngo" });
        let prospect = from_remote_row(row.as_object().unwrap());
        assert_eq!(prospect.status, ProspectStatus::New);
        assert_eq!(prospect.kind, ProspectType::Business);
    }

    #[test]
    fn subset_keeps_id_and_changed_columns() {
        let row = to_remote_row(&full_prospect());
        let subset = remote_subset(&row, &[Field::Status, Field::UpdatedAt]);
        let mut keys: Vec<&str> = subset.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["id", "status", "updated_at"]);
    }
}
