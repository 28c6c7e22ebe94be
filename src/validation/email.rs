use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use tracing::{debug, warn};
use validator::ValidateEmail;

/// Result of looking up a domain's mail-exchange records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxOutcome {
    Found,
    /// The resolver answered and there is nothing there (including NXDOMAIN).
    NoRecords,
    /// The resolver could not answer (timeout, I/O, server failure).
    LookupFailed(String),
}

#[async_trait]
pub trait MxResolver: Send + Sync {
    async fn lookup_mx(&self, domain: &str) -> MxOutcome;
}

/// MX lookups against the system's upstream DNS. One attempt, bounded by a timeout.
pub struct HickoryMxResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryMxResolver {
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
        }
    }
}

#[async_trait]
impl MxResolver for HickoryMxResolver {
    async fn lookup_mx(&self, domain: &str) -> MxOutcome {
        match self.resolver.mx_lookup(format!("{}.", domain)).await {
            Ok(lookup) if lookup.iter().next().is_some() => MxOutcome::Found,
            Ok(_) => MxOutcome::NoRecords,
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => MxOutcome::NoRecords,
                _ => MxOutcome::LookupFailed(e.to_string()),
            },
        }
    }
}

/// Fixed answers per domain; anything unlisted resolves to the default outcome.
pub struct StaticMxResolver {
    answers: HashMap<String, MxOutcome>,
    default: MxOutcome,
}

impl StaticMxResolver {
    pub fn new(default: MxOutcome) -> Self {
        Self {
            answers: HashMap::new(),
            default,
        }
    }

    pub fn with(mut self, domain: &str, outcome: MxOutcome) -> Self {
        self.answers.insert(domain.to_ascii_lowercase(), outcome);
        self
    }
}

#[async_trait]
impl MxResolver for StaticMxResolver {
    async fn lookup_mx(&self, domain: &str) -> MxOutcome {
        self.answers
            .get(&domain.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailVerdict {
    Valid,
    InvalidSyntax,
    /// No usable MX record. `lookup_error` is set when the resolver failed rather than answered.
    InvalidDomain { lookup_error: Option<String> },
}

impl EmailVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, EmailVerdict::Valid)
    }

    pub fn reason(&self) -> String {
        match self {
            EmailVerdict::Valid => "Email is valid".to_string(),
            EmailVerdict::InvalidSyntax => "Invalid email format".to_string(),
            EmailVerdict::InvalidDomain { lookup_error: None } => {
                "Email domain has no MX records".to_string()
            }
            EmailVerdict::InvalidDomain {
                lookup_error: Some(error),
            } => format!("Email domain has no MX records (lookup failed: {})", error),
        }
    }
}

#[derive(Clone)]
pub struct EmailValidator {
    resolver: Arc<dyn MxResolver>,
}

impl EmailValidator {
    pub fn new(resolver: Arc<dyn MxResolver>) -> Self {
        Self { resolver }
    }

    pub async fn classify(&self, raw: &str) -> EmailVerdict {
        let email = raw.trim();
        if !email.validate_email() {
            debug!(email = %email, "email failed syntax check");
            return EmailVerdict::InvalidSyntax;
        }

        let Some((_, domain)) = email.rsplit_once('@') else {
            return EmailVerdict::InvalidSyntax;
        };

        match self.resolver.lookup_mx(domain).await {
            MxOutcome::Found => EmailVerdict::Valid,
            MxOutcome::NoRecords => {
                debug!(domain = %domain, "no MX records for domain");
                EmailVerdict::InvalidDomain { lookup_error: None }
            }
            MxOutcome::LookupFailed(error) => {
                warn!(domain = %domain, error = %error, "MX lookup failed, treating domain as invalid");
                EmailVerdict::InvalidDomain {
                    lookup_error: Some(error),
                }
            }
        }
    }
}
