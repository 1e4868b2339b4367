use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::warn;

use crate::controller::ProspectController;
use crate::error::SyncError;
use crate::models::{ProspectDraft, ProspectStatus, ProspectType, DEFAULT_COUNTRY};

#[derive(serde::Deserialize)]
struct CsvRow {
    company_name: String,
    #[serde(default)]
    contact_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    monthly_fee: Option<f64>,
    #[serde(default)]
    integration_fee: Option<f64>,
    #[serde(default)]
    monthly_cost: Option<f64>,
    #[serde(default)]
    integration_start_date: Option<NaiveDate>,
    #[serde(default)]
    notes: String,
}

impl CsvRow {
    fn into_draft(self) -> ProspectDraft {
        ProspectDraft {
            company_name: self.company_name,
            contact_name: self.contact_name,
            email: self.email,
            phone: self.phone,
            status: self
                .status
                .and_then(|s| s.parse().ok())
                .unwrap_or(ProspectStatus::New),
            kind: self
                .kind
                .and_then(|k| k.parse().ok())
                .unwrap_or(ProspectType::Business),
            country: self
                .country
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            monthly_fee: self.monthly_fee.unwrap_or(0.0),
            integration_fee: self.integration_fee.unwrap_or(0.0),
            monthly_cost: self.monthly_cost.unwrap_or(0.0),
            integration_start_date: self.integration_start_date,
            notes: self.notes,
            ..ProspectDraft::default()
        }
    }
}

pub fn import_csv(controller: &mut ProspectController, csv_path: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    import_reader(controller, file)
}

fn import_reader(controller: &mut ProspectController, input: impl Read) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_reader(input);
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV record {}", line + 1))?;
        match controller.create(row.into_draft()) {
            Ok(_) => inserted += 1,
            Err(SyncError::MissingCompanyName) => {
                warn!("Skipping CSV record {} without a company name", line + 1);
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(inserted)
}
