//! Portal endpoint configuration.
//!
//! The lookup form's endpoint, field names and encoding are an external
//! contract owned by the portal, not by this crate. They live here as plain
//! data so a portal-side change is a configuration edit, never a pipeline
//! change.

use std::time::Duration;

use casefetch_core::CaseQuery;

/// Central eCourts services entry point used for district-court lookups.
pub const DEFAULT_BASE_URL: &str = "https://services.ecourts.gov.in/ecourtindia_v6/";

/// Declared identification string. Honest and stable; no header spoofing.
pub const DEFAULT_USER_AGENT: &str =
    concat!("casefetch/", env!("CARGO_PKG_VERSION"), " (+https://github.com/casefetch/casefetch)");

/// Endpoint, form field names, and request policy for the target portal.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    /// Value of the portal's `p` routing parameter.
    pub page: String,
    pub court_field: String,
    pub case_type_field: String,
    pub case_number_field: String,
    pub year_field: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page: "casestatus/index".to_string(),
            court_field: "court_code".to_string(),
            // The portal's own (misspelled) field name.
            case_number_field: "filling_number".to_string(),
            case_type_field: "case_type".to_string(),
            year_field: "year".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

impl PortalConfig {
    /// Encode a query as the portal's GET parameters.
    pub fn query_params(&self, query: &CaseQuery) -> Vec<(String, String)> {
        vec![
            ("p".to_string(), self.page.clone()),
            (self.court_field.clone(), query.court_id.clone()),
            (self.case_type_field.clone(), query.case_type.clone()),
            (self.case_number_field.clone(), query.case_number.clone()),
            (self.year_field.clone(), query.filing_year.to_string()),
        ]
    }

    /// Origin (scheme + host) of the portal, for resolving relative links.
    pub fn origin(&self) -> String {
        let url = &self.base_url;
        match url.find("://").map(|i| i + 3) {
            Some(start) => match url[start..].find('/') {
                Some(end) => url[..start + end].to_string(),
                None => url.clone(),
            },
            None => url.trim_end_matches('/').to_string(),
        }
    }
}
