use std::collections::BTreeSet;

use crate::models::{Prospect, ProspectStatus, ProspectType};

/// Search text plus optional exact-match filters; empty criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct ProspectFilter {
    pub query: Option<String>,
    pub status: Option<ProspectStatus>,
    pub kind: Option<ProspectType>,
    pub country: Option<String>,
}

impl ProspectFilter {
    pub fn matches(&self, prospect: &Prospect) -> bool {
        let matches_query = match self.query.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(query) => {
                let needle = query.to_lowercase();
                [&prospect.company_name, &prospect.contact_name, &prospect.email]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
        };

        matches_query
            && self.status.map_or(true, |status| prospect.status == status)
            && self.kind.map_or(true, |kind| prospect.kind == kind)
            && self
                .country
                .as_deref()
                .map_or(true, |country| prospect.country.eq_ignore_ascii_case(country))
    }

    pub fn apply<'a>(&self, prospects: &'a [Prospect]) -> Vec<&'a Prospect> {
        prospects.iter().filter(|p| self.matches(p)).collect()
    }
}

/// Distinct countries present in the collection, sorted.
pub fn countries_in_use(prospects: &[Prospect]) -> Vec<String> {
    prospects
        .iter()
        .map(|p| p.country.clone())
        .filter(|country| !country.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
