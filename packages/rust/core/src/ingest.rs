//! CSV lead ingestion.
//!
//! One row per lead. Required headers must all be present (their cells may be
//! empty); optional headers may be missing entirely. Every missing value
//! becomes `""`, numeric cells are parsed leniently, and rows that yield no
//! identity are skipped and reported rather than failing the batch.

use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use leadqual_shared::coerce::{parse_amount, parse_count, split_list};
use leadqual_shared::{Lead, LeadIdentity, LeadQualError, Result};
use serde::Serialize;
use tracing::{debug, warn};

pub const REQUIRED_HEADERS: [&str; 12] = [
    "First Name",
    "Last Name",
    "Company",
    "Person Linkedin Url",
    "Email",
    "Industry",
    "Website",
    "# Employees",
    "Annual Revenue",
    "City",
    "State",
    "Country",
];

pub const OPTIONAL_HEADERS: [&str; 10] = [
    "Title",
    "Seniority",
    "Departments",
    "Technologies",
    "Keywords",
    "SEO Description",
    "Company City",
    "Company State",
    "Company Country",
    "Company Linkedin Url",
];

/// A row that did not become a lead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    /// 1-based line number in the file (the header is line 1).
    pub line: u64,
    pub reason: String,
}

/// Outcome of reading a lead file.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub leads: Vec<Lead>,
    pub skipped: Vec<SkippedRow>,
}

/// Read leads from a CSV file.
pub fn read_leads(path: &Path) -> Result<IngestReport> {
    let file = std::fs::File::open(path).map_err(|e| LeadQualError::io(path, e))?;
    read_leads_from(file)
}

/// Read leads from any CSV source.
pub fn read_leads_from<R: Read>(source: R) -> Result<IngestReport> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| LeadQualError::ingest(format!("failed to read header row: {e}")))?
        .clone();

    let columns: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim_start_matches('\u{feff}'), i))
        .collect();

    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .copied()
        .filter(|h| !columns.contains_key(h))
        .collect();
    if !missing.is_empty() {
        return Err(LeadQualError::ingest(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }

    let mut report = IngestReport::default();
    let mut seen = BTreeSet::new();

    for row in reader.records() {
        let row = row.map_err(|e| match e.position() {
            Some(pos) => LeadQualError::ingest(format!("line {}: {e}", pos.line())),
            None => LeadQualError::ingest(e.to_string()),
        })?;
        let line = row.position().map_or(0, |pos| pos.line());
        if row.iter().all(str::is_empty) {
            continue;
        }

        let cell = |name: &str| -> String {
            columns
                .get(name)
                .and_then(|&i| row.get(i))
                .unwrap_or_default()
                .to_string()
        };

        let Some(identity) =
            LeadIdentity::from_parts(&cell("Email"), &cell("Person Linkedin Url"), &cell("Website"))
        else {
            warn!(line, "row has no email, LinkedIn URL or website; skipping");
            report.skipped.push(SkippedRow {
                line,
                reason: "no email, LinkedIn URL or website to identify the lead".into(),
            });
            continue;
        };

        if !seen.insert(identity.as_str().to_string()) {
            warn!(line, identity = identity.as_str(), "duplicate lead in file; skipping");
            report.skipped.push(SkippedRow {
                line,
                reason: format!("duplicate of an earlier row ({})", identity.as_str()),
            });
            continue;
        }

        let mut lead = Lead::new(identity);
        lead.first_name = cell("First Name");
        lead.last_name = cell("Last Name");
        lead.company = cell("Company");
        lead.linkedin_url = cell("Person Linkedin Url");
        lead.email = cell("Email");
        lead.industry = cell("Industry");
        lead.website = cell("Website");
        lead.employee_count = parse_count(&cell("# Employees"));
        lead.revenue = parse_amount(&cell("Annual Revenue"));
        lead.city = cell("City");
        lead.state = cell("State");
        lead.country = cell("Country");
        lead.title = cell("Title");
        lead.seniority = cell("Seniority");
        lead.departments = split_list(&cell("Departments"));
        lead.technologies = split_list(&cell("Technologies")).into_iter().collect();
        lead.keywords = split_list(&cell("Keywords"));
        lead.seo_description = cell("SEO Description");
        lead.company_city = cell("Company City");
        lead.company_state = cell("Company State");
        lead.company_country = cell("Company Country");
        lead.company_linkedin_url = cell("Company Linkedin Url");

        debug!(line, identity = lead.identity.as_str(), "ingested lead");
        report.leads.push(lead);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const HEADER: &str = "First Name,Last Name,Company,Person Linkedin Url,Email,Industry,Website,# Employees,Annual Revenue,City,State,Country";

    fn read(body: &str) -> Result<IngestReport> {
        read_leads_from(body.as_bytes())
    }

    #[test]
    fn reads_fixture_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures/csv/leads.fixture.csv");
        let report = read_leads(&path).expect("fixture parses");
        assert_eq!(report.leads.len(), 3);
        assert_eq!(report.skipped.len(), 1);

        let ada = &report.leads[0];
        assert_eq!(ada.identity.as_str(), "email:ada@northwind.io");
        assert_eq!(ada.employee_count, Some(120));
        assert_eq!(ada.revenue, Some(12_000_000.0));
        assert!(ada.technologies.contains("Salesforce"));
        assert_eq!(ada.departments, vec!["Engineering", "Operations"]);

        let grace = &report.leads[1];
        assert_eq!(grace.identity.as_str(), "linkedin:linkedin.com/in/grace-h");
        assert_eq!(grace.linkedin_url, "https://www.linkedin.com/in/grace-h/");
    }

    #[test]
    fn missing_required_header_is_fatal() {
        let err = read("First Name,Last Name,Email\nAda,L,ada@x.io\n").expect_err("missing columns");
        assert!(matches!(err, LeadQualError::Ingest { .. }));
        assert!(err.to_string().contains("Company"), "{err}");
    }

    #[test]
    fn optional_columns_default_to_empty() {
        let body = format!("{HEADER}\nAda,Lovelace,Northwind,,ada@x.io,SaaS,,n/a,,,,\n");
        let report = read(&body).expect("parses");
        let lead = &report.leads[0];
        assert_eq!(lead.title, "");
        assert_eq!(lead.seo_description, "");
        assert!(lead.technologies.is_empty());
        assert_eq!(lead.employee_count, None);
    }

    #[test]
    fn rows_without_identity_and_duplicates_are_reported() {
        let body = format!(
            "{HEADER}\n\
             Ada,L,Northwind,,ada@x.io,SaaS,,10,,,,\n\
             No,Body,Ghost,,,Retail,,5,,,,\n\
             Ada,L,Northwind,,ADA@x.io,SaaS,,10,,,,\n"
        );
        let report = read(&body).expect("parses");
        assert_eq!(report.leads.len(), 1);
        let lines: Vec<u64> = report.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![3, 4]);
    }

    #[test]
    fn skipped_lines_count_blank_lines_and_quoted_newlines() {
        let body = format!(
            "{HEADER}\n\
             Ada,L,\"North\nwind\",,ada@x.io,SaaS,,10,,,,\n\
             \n\
             No,Body,Ghost,,,Retail,,5,,,,\n"
        );
        let report = read(&body).expect("parses");
        assert_eq!(report.leads[0].company, "North\nwind");
        let lines: Vec<u64> = report.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![5]);
    }
}
