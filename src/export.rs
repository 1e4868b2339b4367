use chrono::NaiveDate;

use crate::models::Prospect;

/// File name and pretty-printed JSON body for a full collection export.
pub fn export_document(
    prospects: &[Prospect],
    date: NaiveDate,
) -> Result<(String, String), serde_json::Error> {
    let file_name = format!("simpler-crm-{}.json", date.format("%Y-%m-%d"));
    let body = serde_json::to_string_pretty(prospects)?;
    Ok((file_name, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::prospect;

    #[test]
    fn names_file_after_the_date_and_keeps_every_record() {
        let prospects = vec![prospect("a", "Alpha"), prospect("b", "Beta")];
        let date = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();

        let (name, body) = export_document(&prospects, date).unwrap();
        assert_eq!(name, "simpler-crm-2026-10-14.json");

        let parsed: Vec<Prospect> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed, prospects);
    }
}
