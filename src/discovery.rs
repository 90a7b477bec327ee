//! Domain discovery: resolve an organization name to its internet domain.
//!
//! [`DomainDiscovery::discover`] runs a fixed chain of strategies and returns
//! the first candidate that passes the validation gate:
//!
//! 1. **Model prompt**: ask the language model for the primary domain
//! 2. **Name patterns**: derive `acme.com`, `acmeinc.com`, ... from the name
//! 3. **Web search** (opt-in): scan search-result links for a domain that
//!    shares a normalized substring with the name
//! 4. **Model alternatives**: ask the model for three more candidates
//!
//! A candidate is accepted only if it matches the domain grammar
//! ([`is_valid_domain`]) *and* resolves through a [`NameResolver`]. When every
//! strategy is exhausted the result is an empty string, which callers accept
//! as a valid outcome.

use crate::api::{ChatRequest, LanguageModel};
use crate::fetch::Fetch;
use async_trait::async_trait;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$")
        .expect("static domain regex")
});

static RESULT_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:www\.)?((?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63})")
        .expect("static result link regex")
});

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static link selector"));

/// Suffixes appended to the squashed organization name, in trial order.
const NAME_SUFFIXES: [&str; 8] = [
    ".com", ".org", ".net", "inc.com", "corp.com", "llc.com", "group.com", "company.com",
];

const SINGLE_SYSTEM_PROMPT: &str = "You are a domain name expert. Provide only the primary domain name (e.g., example.com) without www, protocols, or paths.";
const ALTERNATIVES_SYSTEM_PROMPT: &str = "You are a domain name expert. Provide 3 possible domain names for this organization, one per line, domain only.";

/// Domain-name grammar check.
///
/// Letters, digits and inner hyphens per label, 1 to 63 characters per
/// label, at least one dot, an alphabetic TLD of 2 to 63 characters, at most
/// 253 characters overall. Schemes and a leading `www.` are rejected.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    let lower = domain.to_ascii_lowercase();
    if lower.contains("://") || lower.starts_with("www.") {
        return false;
    }
    DOMAIN_RE.is_match(domain)
}

/// Strip scheme, `www.`, path and trailing words from a model answer.
///
/// `"https://www.acme.com/about"` -> `"acme.com"`,
/// `"acme.com (the official site)"` -> `"acme.com"`
pub fn clean_domain_answer(answer: &str) -> String {
    let stripped = answer
        .trim()
        .replace("https://", "")
        .replace("http://", "")
        .replace("www.", "");
    let host = stripped.split('/').next().unwrap_or_default();
    host.split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches(['.', ',', ';'])
        .to_string()
}

/// Lowercase the name and drop spaces, commas, dots and hyphens.
///
/// `"Acme Health, Inc."` -> `"acmehealthinc"`
pub fn squash_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | ',' | '.' | '-'))
        .collect()
}

/// Deterministic candidates derived from the organization name.
pub fn name_pattern_candidates(name: &str) -> Vec<String> {
    let squashed = squash_name(name);
    if squashed.is_empty() {
        return Vec::new();
    }
    NAME_SUFFIXES
        .iter()
        .map(|suffix| format!("{squashed}{suffix}"))
        .collect()
}

/// Pull domains out of search-result links that look related to `name`.
pub fn domains_from_search_results(html: &str, name: &str) -> Vec<String> {
    let needle = name.to_lowercase().replace(' ', "");
    if needle.is_empty() {
        return Vec::new();
    }
    let document = Html::parse_document(html);
    document
        .select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| RESULT_LINK_RE.captures(href))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_lowercase()))
        .filter(|domain| needle.contains(domain.as_str()) || domain.contains(&needle))
        .unique()
        .collect()
}

/// Name lookup used by the validation gate.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Whether `domain` resolves to at least one address.
    async fn resolves(&self, domain: &str) -> bool;
}

/// [`NameResolver`] backed by the system resolver.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    timeout: Duration,
}

impl DnsResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl NameResolver for DnsResolver {
    async fn resolves(&self, domain: &str) -> bool {
        match timeout(self.timeout, tokio::net::lookup_host((domain, 80))).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(e)) => {
                debug!(%domain, error = %e, "Name lookup failed");
                false
            }
            Err(_) => {
                debug!(%domain, "Name lookup timed out");
                false
            }
        }
    }
}

/// The ordered fallback chain.
pub struct DomainDiscovery {
    resolver: Arc<dyn NameResolver>,
    /// Present only when the web-search strategy is enabled.
    web_search: Option<Arc<dyn Fetch>>,
}

impl DomainDiscovery {
    pub fn new(resolver: Arc<dyn NameResolver>) -> Self {
        Self {
            resolver,
            web_search: None,
        }
    }

    /// Enable the web-search strategy using `fetch` for the search request.
    pub fn with_web_search(mut self, fetch: Arc<dyn Fetch>) -> Self {
        self.web_search = Some(fetch);
        self
    }

    /// Grammar check, then name lookup.
    pub async fn validate(&self, candidate: &str) -> bool {
        is_valid_domain(candidate) && self.resolver.resolves(candidate).await
    }

    /// Run the chain. Returns an empty string when nothing validates.
    #[instrument(level = "info", skip(self, model))]
    pub async fn discover(&self, organization: &str, model: Option<&dyn LanguageModel>) -> String {
        let organization = organization.trim();
        if organization.is_empty() {
            return String::new();
        }

        if let Some(model) = model {
            if let Some(answer) = self.ask_primary(organization, model).await {
                if self.validate(&answer).await {
                    info!(domain = %answer, "Model domain validated");
                    return answer;
                }
                debug!(domain = %answer, "Model suggested an invalid or unresolvable domain");
            }
        }

        for candidate in name_pattern_candidates(organization) {
            if self.validate(&candidate).await {
                info!(domain = %candidate, "Name pattern matched");
                return candidate;
            }
        }

        if let Some(fetch) = &self.web_search {
            for candidate in self.search_web(organization, fetch.as_ref()).await {
                if self.validate(&candidate).await {
                    info!(domain = %candidate, "Web search matched");
                    return candidate;
                }
            }
        }

        if let Some(model) = model {
            for candidate in self.ask_alternatives(organization, model).await {
                if self.validate(&candidate).await {
                    info!(domain = %candidate, "Model alternative validated");
                    return candidate;
                }
            }
        }

        info!("No valid domain found");
        String::new()
    }

    async fn ask_primary(&self, organization: &str, model: &dyn LanguageModel) -> Option<String> {
        let request = ChatRequest::new(
            SINGLE_SYSTEM_PROMPT,
            format!(
                "What is the primary internet domain name for the organization \"{organization}\"? Return only the domain name (like company.com), nothing else."
            ),
        )
        .temperature(0.1)
        .max_tokens(20);

        match model.complete(&request).await {
            Ok(answer) => Some(clean_domain_answer(&answer)).filter(|d| !d.is_empty()),
            Err(e) => {
                warn!(error = %e, "Model domain lookup failed");
                None
            }
        }
    }

    async fn ask_alternatives(&self, organization: &str, model: &dyn LanguageModel) -> Vec<String> {
        let request = ChatRequest::new(
            ALTERNATIVES_SYSTEM_PROMPT,
            format!(
                "What are 3 possible domain names for \"{organization}\"? List only domain names like company.com, one per line."
            ),
        )
        .temperature(0.3)
        .max_tokens(50);

        match model.complete(&request).await {
            Ok(answer) => answer
                .lines()
                .map(clean_domain_answer)
                .filter(|d| !d.is_empty())
                .unique()
                .collect(),
            Err(e) => {
                warn!(error = %e, "Model alternatives lookup failed");
                Vec::new()
            }
        }
    }

    async fn search_web(&self, organization: &str, fetch: &dyn Fetch) -> Vec<String> {
        let query = format!("{organization} official website domain");
        let url = format!("https://www.google.com/search?q={}", urlencoding::encode(&query));
        match fetch.text(&url).await {
            Ok(html) => domains_from_search_results(&html, organization),
            Err(e) => {
                warn!(error = %e, "Web search failed");
                Vec::new()
            }
        }
    }
}
