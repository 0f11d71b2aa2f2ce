//! Country relevance filter

use crate::models::RawRecord;

/// The country the pipeline cares about.
///
/// A record is in scope when its country name contains the target name
/// (case-insensitive) or its ISO code equals the target code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryScope {
    name: String,
    code: String,
}

impl CountryScope {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_lowercase(),
            code: code.into().trim().to_uppercase(),
        }
    }

    /// Lowercased target name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uppercased target ISO code
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_relevant(&self, record: &RawRecord) -> bool {
        self.matches(record.country.as_deref(), record.country_code.as_deref())
    }

    pub fn matches(&self, country: Option<&str>, code: Option<&str>) -> bool {
        let by_name = !self.name.is_empty()
            && country.is_some_and(|c| c.to_lowercase().contains(&self.name));
        let by_code = !self.code.is_empty()
            && code.is_some_and(|c| c.trim().eq_ignore_ascii_case(&self.code));
        by_name || by_code
    }
}

impl Default for CountryScope {
    fn default() -> Self {
        Self::new("India", "IND")
    }
}
