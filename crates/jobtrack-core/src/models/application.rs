use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApplicationStatus {
    Applied,
    Rejected,
    PhoneScreen,
    TechnicalInterview,
    OnSiteInterview,
    Offer,
    Accepted,
    Withdrawn,
    Other(String),
}

impl ApplicationStatus {
    pub const KNOWN: [ApplicationStatus; 8] = [
        ApplicationStatus::Applied,
        ApplicationStatus::Rejected,
        ApplicationStatus::PhoneScreen,
        ApplicationStatus::TechnicalInterview,
        ApplicationStatus::OnSiteInterview,
        ApplicationStatus::Offer,
        ApplicationStatus::Accepted,
        ApplicationStatus::Withdrawn,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ApplicationStatus::Applied => "Applied",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::PhoneScreen => "Phone Screen",
            ApplicationStatus::TechnicalInterview => "Technical Interview",
            ApplicationStatus::OnSiteInterview => "On-site Interview",
            ApplicationStatus::Offer => "Offer",
            ApplicationStatus::Accepted => "Accepted",
            ApplicationStatus::Withdrawn => "Withdrawn",
            ApplicationStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for ApplicationStatus {
    fn from(raw: String) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|status| status.as_str() == raw)
            .unwrap_or(ApplicationStatus::Other(raw))
    }
}

impl From<&str> for ApplicationStatus {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<ApplicationStatus> for String {
    fn from(status: ApplicationStatus) -> Self {
        match status {
            ApplicationStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl Display for ApplicationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job-application record as served by the backend. The search core only
/// transports these; it never edits them.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub company: String,
    pub role: String,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub application_date: Option<String>,
    #[serde(default)]
    pub met_with: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub pros: Option<String>,
    #[serde(default)]
    pub cons: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub follow_up_required: bool,
    #[serde(default)]
    pub resume_file: Option<String>,
    #[serde(default)]
    pub cover_letter_file: Option<String>,
    #[serde(default)]
    pub order_number: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Application {
    pub fn new(
        id: i64,
        company: impl Into<String>,
        role: impl Into<String>,
        status: ApplicationStatus,
    ) -> Self {
        Self {
            id,
            company: company.into(),
            role: role.into(),
            status,
            url: None,
            application_date: None,
            met_with: None,
            notes: None,
            pros: None,
            cons: None,
            salary: None,
            follow_up_required: false,
            resume_file: None,
            cover_letter_file: None,
            order_number: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Case-insensitive substring match over the free-text fields.
    /// `needle` must already be lowercased.
    pub fn matches_term(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }

        let contains = |field: &str| field.to_lowercase().contains(needle);
        let optional = [
            &self.met_with,
            &self.notes,
            &self.pros,
            &self.cons,
            &self.salary,
            &self.url,
        ];

        contains(&self.company)
            || contains(&self.role)
            || contains(self.status.as_str())
            || optional
                .into_iter()
                .any(|field| field.as_deref().is_some_and(contains))
    }
}

/// One page of search results: the records plus the total match count
/// across all pages.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ApplicationPage {
    #[serde(rename = "data", default, deserialize_with = "null_as_default")]
    pub records: Vec<Application>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u64,
}

impl ApplicationPage {
    pub fn new(records: Vec<Application>, total: u64) -> Self {
        Self { records, total }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// The backend writes `null` for unset columns, including non-optional ones.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
