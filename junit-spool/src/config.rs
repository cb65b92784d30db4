// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration, built once at session start and passed explicitly to every component.

use crate::{
    diagnostics::{Diagnostic, DiagnosticKind},
    errors::ConfigError,
    metadata::Property,
    sanitize::TraceSanitizer,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::Deserialize;
use std::{collections::BTreeSet, fmt, io, time::Duration};
use tracing::{debug, warn};

/// The test suite name used when none is configured.
pub const DEFAULT_REPORT_NAME: &str = "junit-spool";

/// How long a single issue tracker request may take by default.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable configuration for a recording session.
#[derive(Clone, Debug)]
pub struct SpoolConfig {
    report_path: Utf8PathBuf,
    report_name: String,
    run_root_parent: Option<Utf8PathBuf>,
    store_success_output: bool,
    store_failure_output: bool,
    sanitizer: TraceSanitizer,
    issue_tracker: Option<IssueTrackerConfig>,
    static_properties: Vec<Property>,
    diagnostics: Vec<Diagnostic>,
}

impl SpoolConfig {
    /// Returns a builder with default settings.
    pub fn builder() -> SpoolConfigBuilder {
        SpoolConfigBuilder::default()
    }

    /// Where the final report is published.
    pub fn report_path(&self) -> &Utf8Path {
        &self.report_path
    }

    /// The name of the report's test suite.
    pub fn report_name(&self) -> &str {
        &self.report_name
    }

    /// The directory in which the run root is created: configured explicitly, or else the
    /// report's directory.
    pub fn run_root_parent(&self) -> &Utf8Path {
        match &self.run_root_parent {
            Some(parent) => parent,
            None => match self.report_path.parent() {
                Some(parent) if !parent.as_str().is_empty() => parent,
                _ => Utf8Path::new("."),
            },
        }
    }

    /// Whether captured output is kept for passing and skipped attempts.
    pub fn store_success_output(&self) -> bool {
        self.store_success_output
    }

    /// Whether captured output is kept for failed and errored attempts.
    pub fn store_failure_output(&self) -> bool {
        self.store_failure_output
    }

    /// The trace sanitizer.
    pub fn sanitizer(&self) -> &TraceSanitizer {
        &self.sanitizer
    }

    /// The issue tracker, if fully configured.
    pub fn issue_tracker(&self) -> Option<&IssueTrackerConfig> {
        self.issue_tracker.as_ref()
    }

    /// Fixed session properties from the `[metadata]` table and explicit overrides.
    pub fn static_properties(&self) -> &[Property] {
        &self.static_properties
    }

    /// Non-fatal problems found while building the configuration.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Connection parameters for the issue tracker.
#[derive(Clone)]
pub struct IssueTrackerConfig {
    endpoint: String,
    principal: String,
    credential: String,
    timeout: Duration,
}

impl IssueTrackerConfig {
    /// Creates a new issue tracker configuration.
    pub fn new(
        endpoint: impl Into<String>,
        principal: impl Into<String>,
        credential: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            principal: principal.into(),
            credential: credential.into(),
            timeout,
        }
    }

    /// Builds a configuration from optional parts.
    ///
    /// The integration is active only if all three connection parameters are present and
    /// non-empty. If none are present, returns `Ok(None)`. If only some are, the integration is
    /// disabled with a diagnostic, or, in strict mode, an error is returned.
    pub fn from_parts(
        endpoint: Option<String>,
        principal: Option<String>,
        credential: Option<String>,
        timeout: Duration,
        strict: bool,
    ) -> Result<(Option<Self>, Option<Diagnostic>), ConfigError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        match (non_empty(endpoint), non_empty(principal), non_empty(credential)) {
            (Some(endpoint), Some(principal), Some(credential)) => Ok((
                Some(Self::new(endpoint, principal, credential, timeout)),
                None,
            )),
            (None, None, None) => Ok((None, None)),
            (endpoint, principal, credential) => {
                let missing: Vec<_> = [
                    ("url", endpoint.is_none()),
                    ("username", principal.is_none()),
                    ("password", credential.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, missing)| missing.then_some(name))
                .collect();
                if strict {
                    return Err(ConfigError::PartialIssueTracker { missing });
                }
                let diagnostic = Diagnostic::warn(
                    DiagnosticKind::IssueTrackerDisabled,
                    format!(
                        "issue tracker disabled: missing {}",
                        missing.join(", ")
                    ),
                );
                Ok((None, Some(diagnostic)))
            }
        }
    }

    /// The tracker's base URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The user name to authenticate as.
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// The password or API token.
    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for IssueTrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueTrackerConfig")
            .field("endpoint", &self.endpoint)
            .field("principal", &self.principal)
            .field("credential", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builds a [`SpoolConfig`] from an optional TOML file and explicit overrides.
///
/// Explicit settings take precedence over the file.
#[derive(Clone, Debug, Default)]
pub struct SpoolConfigBuilder {
    report_path: Option<Utf8PathBuf>,
    report_name: Option<String>,
    run_root_parent: Option<Utf8PathBuf>,
    store_success_output: Option<bool>,
    store_failure_output: Option<bool>,
    denylist: Option<Vec<String>>,
    tracker_url: Option<String>,
    tracker_username: Option<String>,
    tracker_password: Option<String>,
    tracker_timeout: Option<Duration>,
    tracker_strict: bool,
    properties: Vec<Property>,
}

impl SpoolConfigBuilder {
    /// Loads settings from a TOML file.
    pub fn from_toml_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        debug!("loading config from {path}");
        let contents = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_owned(),
            error,
        })?;
        let (config, unknown) =
            deserialize_toml(&contents).map_err(|error| ConfigError::Parse {
                path: Some(path.to_owned()),
                error,
            })?;
        warn_unknown_keys(Some(path), &unknown);
        Ok(config.into_builder())
    }

    /// Loads settings from a TOML file if it exists.
    pub fn from_toml_file_if_exists(path: &Utf8Path) -> Result<Self, ConfigError> {
        match Self::from_toml_file(path) {
            Err(ConfigError::Read { error, .. }) if error.kind() == io::ErrorKind::NotFound => {
                debug!("config file {path} does not exist");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Loads settings from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let (config, unknown) =
            deserialize_toml(contents).map_err(|error| ConfigError::Parse { path: None, error })?;
        warn_unknown_keys(None, &unknown);
        Ok(config.into_builder())
    }

    /// Sets the report path.
    pub fn report_path(&mut self, path: impl Into<Utf8PathBuf>) -> &mut Self {
        self.report_path = Some(path.into());
        self
    }

    /// Sets the test suite name.
    pub fn report_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.report_name = Some(name.into());
        self
    }

    /// Sets the directory in which the run root is created.
    pub fn run_root_parent(&mut self, dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.run_root_parent = Some(dir.into());
        self
    }

    /// Sets whether output is kept for passing and skipped attempts.
    pub fn store_success_output(&mut self, store: bool) -> &mut Self {
        self.store_success_output = Some(store);
        self
    }

    /// Sets whether output is kept for failed and errored attempts.
    pub fn store_failure_output(&mut self, store: bool) -> &mut Self {
        self.store_failure_output = Some(store);
        self
    }

    /// Replaces the trace sanitizer's denylist.
    pub fn denylist(&mut self, denylist: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.denylist = Some(denylist.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the issue tracker URL.
    pub fn issue_tracker_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.tracker_url = Some(url.into());
        self
    }

    /// Sets the issue tracker user name.
    pub fn issue_tracker_username(&mut self, username: impl Into<String>) -> &mut Self {
        self.tracker_username = Some(username.into());
        self
    }

    /// Sets the issue tracker password or token.
    pub fn issue_tracker_password(&mut self, password: impl Into<String>) -> &mut Self {
        self.tracker_password = Some(password.into());
        self
    }

    /// Sets the per-request issue tracker timeout.
    pub fn issue_tracker_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.tracker_timeout = Some(timeout);
        self
    }

    /// Makes a partially configured issue tracker an error rather than a warning.
    pub fn strict_issue_tracker(&mut self, strict: bool) -> &mut Self {
        self.tracker_strict = strict;
        self
    }

    /// Adds a fixed session property.
    pub fn property(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.properties.push(Property::new(name, value));
        self
    }

    /// Adds a fixed session property given as `name=value`.
    pub fn parse_property(&mut self, input: &str) -> Result<&mut Self, ConfigError> {
        match input.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok(self.property(name.trim(), value))
            }
            _ => Err(ConfigError::InvalidProperty {
                input: input.to_owned(),
            }),
        }
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<SpoolConfig, ConfigError> {
        let report_path = self.report_path.ok_or(ConfigError::MissingReportPath)?;
        let (issue_tracker, diagnostic) = IssueTrackerConfig::from_parts(
            self.tracker_url,
            self.tracker_username,
            self.tracker_password,
            self.tracker_timeout.unwrap_or(DEFAULT_LOOKUP_TIMEOUT),
            self.tracker_strict,
        )?;
        let sanitizer = match self.denylist {
            Some(denylist) => TraceSanitizer::new(denylist),
            None => TraceSanitizer::default(),
        };

        Ok(SpoolConfig {
            report_path,
            report_name: self
                .report_name
                .unwrap_or_else(|| DEFAULT_REPORT_NAME.to_owned()),
            run_root_parent: self.run_root_parent,
            store_success_output: self.store_success_output.unwrap_or(false),
            store_failure_output: self.store_failure_output.unwrap_or(true),
            sanitizer,
            issue_tracker,
            static_properties: self.properties,
            diagnostics: diagnostic.into_iter().collect(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedConfig {
    #[serde(default)]
    report: DeserializedReport,
    #[serde(default)]
    sanitize: DeserializedSanitize,
    #[serde(default)]
    issue_tracker: DeserializedIssueTracker,
    #[serde(default)]
    metadata: IndexMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedReport {
    path: Option<Utf8PathBuf>,
    name: Option<String>,
    run_root: Option<Utf8PathBuf>,
    store_success_output: Option<bool>,
    store_failure_output: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedSanitize {
    denylist: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedIssueTracker {
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default)]
    strict: bool,
}

impl DeserializedConfig {
    fn into_builder(self) -> SpoolConfigBuilder {
        SpoolConfigBuilder {
            report_path: self.report.path,
            report_name: self.report.name,
            run_root_parent: self.report.run_root,
            store_success_output: self.report.store_success_output,
            store_failure_output: self.report.store_failure_output,
            denylist: self.sanitize.denylist,
            tracker_url: self.issue_tracker.url,
            tracker_username: self.issue_tracker.username,
            tracker_password: self.issue_tracker.password,
            tracker_timeout: self.issue_tracker.timeout,
            tracker_strict: self.issue_tracker.strict,
            properties: self
                .metadata
                .into_iter()
                .map(|(name, value)| Property::new(name, value))
                .collect(),
        }
    }
}

fn deserialize_toml(
    contents: &str,
) -> Result<(DeserializedConfig, BTreeSet<String>), toml::de::Error> {
    let deserializer = toml::Deserializer::parse(contents)?;
    let mut unknown = BTreeSet::new();
    let config: DeserializedConfig = serde_ignored::deserialize(deserializer, |path| {
        unknown.insert(path.to_string());
    })?;
    Ok((config, unknown))
}

fn warn_unknown_keys(path: Option<&Utf8Path>, unknown: &BTreeSet<String>) {
    if unknown.is_empty() {
        return;
    }
    let location = match path {
        Some(path) => format!("config file {path}"),
        None => "config".to_owned(),
    };
    let keys = unknown.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    warn!("in {location}, ignoring unknown configuration keys: {keys}");
}
