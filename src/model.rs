//! Scan job data model
//!
//! A [`ScanJob`] is the persisted record of one scan. It is created when a
//! target passes fingerprinting and is then updated stage by stage through
//! [`JobField`] partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Plugin or theme findings keyed by slug
pub type AssetFindings = BTreeMap<String, AssetFinding>;

/// Lifecycle of a scan job
///
/// Variants are declared in pipeline order; a job only ever moves forward.
/// `Failed` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Created,
    DetectingFingerprint,
    ProbingSurface,
    EnumeratingPlugins,
    EnumeratingThemes,
    CorrelatingCoreVulnerabilities,
    Finished,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Whether a job in this state may move to `next`
    ///
    /// Re-applying the current state is allowed so updates stay idempotent.
    pub fn can_advance_to(self, next: ScanStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next > self
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "Created",
            Self::DetectingFingerprint => "Detecting fingerprint",
            Self::ProbingSurface => "Probing surface",
            Self::EnumeratingPlugins => "Enumerating plugins",
            Self::EnumeratingThemes => "Enumerating themes",
            Self::CorrelatingCoreVulnerabilities => "Correlating core vulnerabilities",
            Self::Finished => "Finished",
            Self::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Exposure checks recorded as boolean flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exposure {
    DirectoryListing,
    XmlRpc,
    WpCron,
    WpLogin,
    ConfigLeak,
    Registration,
    DebugLog,
    OembedSsrf,
}

impl Exposure {
    pub const ALL: [Exposure; 8] = [
        Self::DirectoryListing,
        Self::XmlRpc,
        Self::WpCron,
        Self::WpLogin,
        Self::ConfigLeak,
        Self::Registration,
        Self::DebugLog,
        Self::OembedSsrf,
    ];
}

impl fmt::Display for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DirectoryListing => "Directory listing",
            Self::XmlRpc => "XML-RPC pingback",
            Self::WpCron => "wp-cron.php reachable",
            Self::WpLogin => "Login page reachable",
            Self::ConfigLeak => "Config file leak",
            Self::Registration => "Registration enabled",
            Self::DebugLog => "Debug log exposed",
            Self::OembedSsrf => "oEmbed SSRF",
        };
        f.write_str(label)
    }
}

/// Result of every exposure probe, `false` until proven exposed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureFlags {
    pub directory_listing: bool,
    pub xmlrpc: bool,
    pub wp_cron: bool,
    pub wp_login: bool,
    pub config_leak: bool,
    pub registration: bool,
    pub debug_log: bool,
    pub oembed_ssrf: bool,
}

impl ExposureFlags {
    pub fn get(&self, exposure: Exposure) -> bool {
        match exposure {
            Exposure::DirectoryListing => self.directory_listing,
            Exposure::XmlRpc => self.xmlrpc,
            Exposure::WpCron => self.wp_cron,
            Exposure::WpLogin => self.wp_login,
            Exposure::ConfigLeak => self.config_leak,
            Exposure::Registration => self.registration,
            Exposure::DebugLog => self.debug_log,
            Exposure::OembedSsrf => self.oembed_ssrf,
        }
    }

    pub fn set(&mut self, exposure: Exposure, value: bool) {
        let slot = match exposure {
            Exposure::DirectoryListing => &mut self.directory_listing,
            Exposure::XmlRpc => &mut self.xmlrpc,
            Exposure::WpCron => &mut self.wp_cron,
            Exposure::WpLogin => &mut self.wp_login,
            Exposure::ConfigLeak => &mut self.config_leak,
            Exposure::Registration => &mut self.registration,
            Exposure::DebugLog => &mut self.debug_log,
            Exposure::OembedSsrf => &mut self.oembed_ssrf,
        };
        *slot = value;
    }

    /// Exposures that were detected
    pub fn exposed(&self) -> impl Iterator<Item = Exposure> + '_ {
        Exposure::ALL.into_iter().filter(|e| self.get(*e))
    }
}

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// External references of a vulnerability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct References {
    #[serde(deserialize_with = "null_as_default")]
    pub url: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub cve: Vec<String>,
}

/// A single known vulnerability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnerabilityRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    pub description: Option<String>,
    pub poc: Option<String>,
    pub vuln_type: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub references: References,
    #[serde(deserialize_with = "null_as_default")]
    pub verified: bool,
    pub fixed_in: Option<String>,
    pub introduced_in: Option<String>,
}

/// An installed plugin or theme and the vulnerabilities still affecting it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFinding {
    pub friendly_name: Option<String>,
    pub latest_version: Option<String>,
    pub current_version: String,
    pub last_updated: Option<String>,
    pub popular: bool,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
}

impl AssetFinding {
    /// Finding for an asset the vulnerability database could not be asked about
    pub fn uncorrelated(current_version: impl Into<String>) -> Self {
        Self {
            current_version: current_version.into(),
            ..Default::default()
        }
    }
}

/// Persisted state of one scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: Uuid,
    pub url: String,
    pub status: ScanStatus,
    pub scan_date: DateTime<Utc>,
    pub wordpress_version: Option<String>,
    pub exposures: ExposureFlags,
    pub users: Vec<String>,
    pub plugins: AssetFindings,
    pub themes: AssetFindings,
    pub wordpress_vulnerabilities: Vec<VulnerabilityRecord>,
}

impl ScanJob {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            status: ScanStatus::Created,
            scan_date: Utc::now(),
            wordpress_version: None,
            exposures: ExposureFlags::default(),
            users: Vec::new(),
            plugins: AssetFindings::new(),
            themes: AssetFindings::new(),
            wordpress_vulnerabilities: Vec::new(),
        }
    }

    /// Move to `next` if the lifecycle allows it
    pub fn advance(&mut self, next: ScanStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Merge a partial update into the job
    ///
    /// Status changes that would move the job backwards are ignored.
    pub fn apply(&mut self, fields: &[JobField]) {
        for field in fields {
            match field {
                JobField::Status(status) => {
                    self.advance(*status);
                }
                JobField::WordPressVersion(version) => self.wordpress_version = version.clone(),
                JobField::Exposure(exposure, value) => self.exposures.set(*exposure, *value),
                JobField::Users(users) => self.users = users.clone(),
                JobField::Plugins(plugins) => self.plugins = plugins.clone(),
                JobField::Themes(themes) => self.themes = themes.clone(),
                JobField::WordPressVulnerabilities(vulns) => {
                    self.wordpress_vulnerabilities = vulns.clone()
                }
            }
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            scan_date: self.scan_date,
            status: self.status,
            url: self.url.clone(),
        }
    }

    /// Total vulnerabilities across core, plugins and themes
    pub fn vulnerability_count(&self) -> usize {
        self.wordpress_vulnerabilities.len()
            + self
                .plugins
                .values()
                .chain(self.themes.values())
                .map(|a| a.vulnerabilities.len())
                .sum::<usize>()
    }
}

/// One field of a partial job update
#[derive(Debug, Clone, PartialEq)]
pub enum JobField {
    Status(ScanStatus),
    WordPressVersion(Option<String>),
    Exposure(Exposure, bool),
    Users(Vec<String>),
    Plugins(AssetFindings),
    Themes(AssetFindings),
    WordPressVulnerabilities(Vec<VulnerabilityRecord>),
}

/// Listing entry for a stored job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub scan_date: DateTime<Utc>,
    pub status: ScanStatus,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        assert!(ScanStatus::Created.can_advance_to(ScanStatus::DetectingFingerprint));
        assert!(ScanStatus::ProbingSurface.can_advance_to(ScanStatus::Finished));
        assert!(!ScanStatus::EnumeratingThemes.can_advance_to(ScanStatus::EnumeratingPlugins));
        assert!(!ScanStatus::Finished.can_advance_to(ScanStatus::Failed));
        assert!(!ScanStatus::Failed.can_advance_to(ScanStatus::Finished));
    }

    #[test]
    fn failed_reachable_from_any_running_state() {
        for status in [
            ScanStatus::Created,
            ScanStatus::DetectingFingerprint,
            ScanStatus::ProbingSurface,
            ScanStatus::EnumeratingPlugins,
            ScanStatus::EnumeratingThemes,
            ScanStatus::CorrelatingCoreVulnerabilities,
        ] {
            assert!(status.can_advance_to(ScanStatus::Failed), "{status}");
        }
    }

    #[test]
    fn apply_ignores_backwards_status() {
        let mut job = ScanJob::new("https://example.com/");
        job.apply(&[JobField::Status(ScanStatus::EnumeratingThemes)]);
        job.apply(&[JobField::Status(ScanStatus::ProbingSurface)]);
        assert_eq!(job.status, ScanStatus::EnumeratingThemes);
    }

    #[test]
    fn apply_is_idempotent() {
        let fields = vec![
            JobField::Status(ScanStatus::ProbingSurface),
            JobField::Exposure(Exposure::XmlRpc, true),
            JobField::Users(vec!["admin".into()]),
        ];
        let mut once = ScanJob::new("https://example.com/");
        let mut twice = once.clone();
        once.apply(&fields);
        twice.apply(&fields);
        twice.apply(&fields);
        assert_eq!(once, twice);
        assert!(once.exposures.xmlrpc);
    }

    #[test]
    fn exposed_lists_only_true_flags() {
        let mut flags = ExposureFlags::default();
        flags.set(Exposure::DebugLog, true);
        flags.set(Exposure::WpCron, true);
        let exposed: Vec<_> = flags.exposed().collect();
        assert_eq!(exposed, vec![Exposure::WpCron, Exposure::DebugLog]);
    }

    #[test]
    fn vulnerability_count_sums_all_sources() {
        let mut job = ScanJob::new("https://example.com/");
        job.wordpress_vulnerabilities.push(VulnerabilityRecord::default());
        let mut finding = AssetFinding::uncorrelated("1.0");
        finding.vulnerabilities = vec![VulnerabilityRecord::default(); 2];
        job.plugins.insert("akismet".into(), finding.clone());
        job.themes.insert("astra".into(), finding);
        assert_eq!(job.vulnerability_count(), 5);
    }

    #[test]
    fn job_serializes_canonical_field_names() {
        let job = ScanJob::new("https://example.com/");
        let value = serde_json::to_value(&job).unwrap();
        assert!(value.get("wordpress_vulnerabilities").is_some());
        assert_eq!(value["status"], "created");
    }

    #[test]
    fn null_record_fields_read_as_defaults() {
        let record: VulnerabilityRecord = serde_json::from_str(
            r#"{"title":null,"verified":null,"references":{"cve":null,"url":["https://example.com"]}}"#,
        )
        .unwrap();
        assert_eq!(record.title, "");
        assert!(!record.verified);
        assert!(record.references.cve.is_empty());
        assert_eq!(record.references.url, vec!["https://example.com"]);

        let record: VulnerabilityRecord = serde_json::from_str(r#"{"references":null}"#).unwrap();
        assert_eq!(record.references, References::default());
    }
}
