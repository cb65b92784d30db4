// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session and case metadata providers.

use crate::{
    attempt::Outcome,
    diagnostics::{Diagnostic, DiagnosticKind},
    errors::{DisplayErrorChain, ProviderError},
    identity::TestIdentity,
};
use debug_ignore::DebugIgnore;
use serde::{Deserialize, Serialize};
use std::net::ToSocketAddrs;

/// A name/value pair attached to the session or to a single attempt.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Property {
    /// The property name.
    pub name: String,

    /// The property value.
    pub value: String,
}

impl Property {
    /// Creates a new property.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl<T: Into<String>, U: Into<String>> From<(T, U)> for Property {
    fn from((name, value): (T, U)) -> Self {
        Self::new(name, value)
    }
}

impl From<&Property> for xunit_report::Property {
    fn from(property: &Property) -> Self {
        xunit_report::Property::new(property.name.as_str(), property.value.as_str())
    }
}

/// A source of properties for the session and for individual test attempts.
///
/// Both methods default to contributing nothing, so a provider only implements the scope it
/// cares about.
pub trait MetadataProvider {
    /// A short name for this provider, used in diagnostics.
    fn name(&self) -> &str;

    /// Returns properties describing the whole session.
    fn session_metadata(&self) -> Result<Vec<Property>, ProviderError> {
        Ok(Vec::new())
    }

    /// Returns properties for one attempt of `identity`, which finished with `outcome`.
    fn case_metadata(
        &self,
        identity: &TestIdentity,
        outcome: Outcome,
    ) -> Result<Vec<Property>, ProviderError> {
        let _ = (identity, outcome);
        Ok(Vec::new())
    }
}

/// Properties gathered from every provider, plus a diagnostic for each provider that failed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectedProperties {
    /// Properties, in provider registration order.
    pub properties: Vec<Property>,

    /// One diagnostic per failed provider.
    pub diagnostics: Vec<Diagnostic>,
}

/// Calls registered providers in order and concatenates their properties.
///
/// A failing provider contributes nothing and is reported as a diagnostic; the providers
/// after it still run. Properties with the same name from different providers are all kept.
#[derive(Debug, Default)]
pub struct MetadataEnricher {
    providers: DebugIgnore<Vec<Box<dyn MetadataProvider>>>,
}

impl MetadataEnricher {
    /// Creates an enricher with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider after all previously registered ones.
    pub fn register(&mut self, provider: impl MetadataProvider + 'static) -> &mut Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Returns the names of registered providers, in order.
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|provider| provider.name())
    }

    /// Collects session properties from every provider.
    pub fn collect_session_properties(&self) -> CollectedProperties {
        self.collect(|provider| provider.session_metadata())
    }

    /// Collects case properties for one attempt from every provider.
    pub fn collect_case_properties(
        &self,
        identity: &TestIdentity,
        outcome: Outcome,
    ) -> CollectedProperties {
        self.collect(|provider| provider.case_metadata(identity, outcome))
    }

    fn collect(
        &self,
        mut call: impl FnMut(&dyn MetadataProvider) -> Result<Vec<Property>, ProviderError>,
    ) -> CollectedProperties {
        let mut collected = CollectedProperties::default();
        for provider in self.providers.iter() {
            match call(provider.as_ref()) {
                Ok(properties) => collected.properties.extend(properties),
                Err(error) => collected.diagnostics.push(Diagnostic::warn(
                    DiagnosticKind::ProviderFailed,
                    format!(
                        "metadata provider `{}` failed: {}",
                        provider.name(),
                        DisplayErrorChain::new(&error)
                    ),
                )),
            }
        }
        collected
    }
}

/// Reports the host's name and address as session properties `hostname` and `ip_address`.
#[derive(Clone, Debug, Default)]
pub struct HostProvider;

impl HostProvider {
    /// Returns the host name.
    pub fn hostname() -> Result<String, ProviderError> {
        whoami::hostname()
            .map_err(|error| ProviderError::with_source("could not determine host name", error))
    }
}

impl MetadataProvider for HostProvider {
    fn name(&self) -> &str {
        "host"
    }

    fn session_metadata(&self) -> Result<Vec<Property>, ProviderError> {
        let hostname = Self::hostname()?;
        let mut properties = vec![Property::new("hostname", hostname.as_str())];

        // Name resolution commonly fails in sandboxes; the address is optional.
        match (hostname.as_str(), 0).to_socket_addrs() {
            Ok(mut addrs) => {
                if let Some(addr) = addrs.next() {
                    properties.push(Property::new("ip_address", addr.ip().to_string()));
                }
            }
            Err(error) => {
                tracing::debug!(%hostname, %error, "could not resolve host address");
            }
        }
        Ok(properties)
    }
}

/// Contributes a fixed list of session properties, such as build metadata.
#[derive(Clone, Debug, Default)]
pub struct StaticProvider {
    properties: Vec<Property>,
}

impl StaticProvider {
    /// Creates a provider for the given properties.
    pub fn new(properties: impl IntoIterator<Item = impl Into<Property>>) -> Self {
        Self {
            properties: properties.into_iter().map(Into::into).collect(),
        }
    }
}

impl MetadataProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn session_metadata(&self) -> Result<Vec<Property>, ProviderError> {
        Ok(self.properties.clone())
    }
}

/// Contributes session properties from environment variables. Unset variables are skipped.
#[derive(Clone, Debug, Default)]
pub struct EnvProvider {
    // (property name, variable name)
    vars: Vec<(String, String)>,
}

impl EnvProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports environment variable `var` as property `name`.
    pub fn var(mut self, name: impl Into<String>, var: impl Into<String>) -> Self {
        self.vars.push((name.into(), var.into()));
        self
    }
}

impl MetadataProvider for EnvProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn session_metadata(&self) -> Result<Vec<Property>, ProviderError> {
        let mut properties = Vec::new();
        for (name, var) in &self.vars {
            match std::env::var(var) {
                Ok(value) => properties.push(Property::new(name.as_str(), value)),
                Err(std::env::VarError::NotPresent) => {}
                Err(error @ std::env::VarError::NotUnicode(_)) => {
                    return Err(ProviderError::with_source(
                        format!("environment variable `{var}` is not valid"),
                        error,
                    ));
                }
            }
        }
        Ok(properties)
    }
}
