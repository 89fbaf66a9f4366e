//! Runtime secrets needed on a first deploy.
//!
//! Each secret is resolved from an ordered chain of sources: the process
//! environment first, then (unless disabled) an interactive prompt. Resolution
//! finishes before anything is mutated.

use std::fmt;

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use tracing::{debug, warn};

use crate::error::DeployError;

pub const SECRET_KEY: &str = "DJANGO_SECRET_KEY";
pub const DATABASE_URL: &str = "DATABASE_URL";

/// A value that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeSecrets {
    pub secret_key: Secret,
    pub database_url: Secret,
}

/// What a source needs to know to look up one secret.
#[derive(Debug, Clone, Copy)]
pub struct SecretSpec {
    pub name: &'static str,
    pub prompt: &'static str,
    pub hidden: bool,
}

const REQUIRED: [SecretSpec; 2] = [
    SecretSpec {
        name: SECRET_KEY,
        prompt: "Django secret key",
        hidden: true,
    },
    SecretSpec {
        name: DATABASE_URL,
        prompt: "Database URL (postgresql://...?sslmode=require)",
        hidden: false,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Environment,
    Interactive,
}

pub trait SecretSource {
    fn kind(&self) -> SourceKind;

    /// `Ok(None)` means this source has nothing to offer; the next one is asked.
    fn lookup(&self, spec: &SecretSpec) -> Result<Option<String>>;
}

pub struct EnvSource;

impl SecretSource for EnvSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Environment
    }

    fn lookup(&self, spec: &SecretSpec) -> Result<Option<String>> {
        // An exported-but-empty variable counts as not supplied.
        Ok(std::env::var(spec.name).ok().filter(|v| !v.trim().is_empty()))
    }
}

pub struct PromptSource;

impl SecretSource for PromptSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Interactive
    }

    fn lookup(&self, spec: &SecretSpec) -> Result<Option<String>> {
        let value = if spec.hidden {
            Password::new()
                .with_prompt(spec.prompt)
                .interact()
                .with_context(|| format!("Failed to read {}", spec.name))?
        } else {
            Input::<String>::new()
                .with_prompt(spec.prompt)
                .interact_text()
                .with_context(|| format!("Failed to read {}", spec.name))?
        };
        Ok(Some(value))
    }
}

pub struct SecretResolver {
    sources: Vec<Box<dyn SecretSource>>,
}

impl SecretResolver {
    pub fn new(sources: Vec<Box<dyn SecretSource>>) -> Self {
        Self { sources }
    }

    /// Environment first, then the terminal unless `interactive` is false.
    pub fn standard(interactive: bool) -> Self {
        let mut sources: Vec<Box<dyn SecretSource>> = vec![Box::new(EnvSource)];
        if interactive {
            sources.push(Box::new(PromptSource));
        }
        Self::new(sources)
    }

    pub fn resolve(&self) -> Result<RuntimeSecrets> {
        let secret_key = self.resolve_one(&REQUIRED[0])?;
        let database_url = self.resolve_one(&REQUIRED[1])?;

        check_database_url(database_url.expose());

        Ok(RuntimeSecrets {
            secret_key,
            database_url,
        })
    }

    fn resolve_one(&self, spec: &SecretSpec) -> Result<Secret> {
        for source in &self.sources {
            if let Some(value) = source.lookup(spec)? {
                if value.trim().is_empty() {
                    return Err(DeployError::EmptySecret(spec.name.to_string()).into());
                }
                debug!("{} resolved from {:?}", spec.name, source.kind());
                return Ok(Secret::new(value));
            }
        }
        Err(DeployError::SecretUnavailable(spec.name.to_string()).into())
    }
}

/// The site expects a TLS-enforced Postgres URL. Anything else is allowed
/// through with a warning.
fn check_database_url(url: &str) {
    if !(url.starts_with("postgresql://") || url.starts_with("postgres://")) {
        warn!("{} does not use the postgresql:// scheme", DATABASE_URL);
    }
    if !url.contains("sslmode=") {
        warn!("{} has no sslmode parameter; the database may reject the connection", DATABASE_URL);
    }
}

/// Fixed answers, for driving the orchestrator without a terminal.
#[cfg(test)]
pub struct StaticSource(pub std::collections::BTreeMap<&'static str, String>);

#[cfg(test)]
impl StaticSource {
    pub fn resolver(pairs: &[(&'static str, &str)]) -> SecretResolver {
        let map = pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        SecretResolver::new(vec![Box::new(StaticSource(map))])
    }
}

#[cfg(test)]
impl SecretSource for StaticSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Interactive
    }

    fn lookup(&self, spec: &SecretSpec) -> Result<Option<String>> {
        Ok(self.0.get(spec.name).cloned())
    }
}
