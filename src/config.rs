use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const CROSSREF_BASE: &str = "https://api.crossref.org";
pub const OPENALEX_BASE: &str = "https://api.openalex.org";
/// Upper bound on identifiers per batched scholarly lookup.
pub const MAX_IDENTIFIER_BATCH: usize = 50;
pub const CITATION_PAGE_SIZE: u32 = 200;
/// Safety cap on cursor pages fetched per reference.
pub const MAX_CITATION_PAGES: u32 = 50;

/// Candidate pinned by configuration instead of harvested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateOverride {
    pub url: String,
    pub title: String,
}

/// Tunable pipeline parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub crossref_base: String,
    pub openalex_base: String,
    /// Polite-pool contact sent as `mailto`
    pub polite_email: Option<String>,
    pub http_timeout: Duration,
    pub lookup_concurrency: usize,
    pub lookup_retries: u32,
    pub citation_page_size: u32,
    pub max_citation_pages: u32,
    pub page_delay: Duration,
    pub recency_years: i32,
    pub remote_artifacts: bool,
    pub candidate_override: Option<CandidateOverride>,
    pub artifact_dir: PathBuf,
    pub artifact_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            crossref_base: CROSSREF_BASE.to_string(),
            openalex_base: OPENALEX_BASE.to_string(),
            polite_email: None,
            http_timeout: Duration::from_secs(30),
            lookup_concurrency: 4,
            lookup_retries: 3,
            citation_page_size: CITATION_PAGE_SIZE,
            max_citation_pages: MAX_CITATION_PAGES,
            page_delay: Duration::from_millis(80),
            recency_years: 10,
            remote_artifacts: false,
            candidate_override: None,
            artifact_dir: PathBuf::from("./data/artifacts"),
            artifact_prefix: "netpdf".to_string(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    dotenv::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env_string(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    env_string(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl PipelineConfig {
    /// Build from environment variables, falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let candidate_override = env_string("OVERRIDE_CANDIDATE_URL").map(|url| CandidateOverride {
            url,
            title: env_string("OVERRIDE_CANDIDATE_TITLE").unwrap_or_else(|| "network_pdf".to_string()),
        });

        Self {
            crossref_base: env_string("CROSSREF_BASE_URL").unwrap_or(defaults.crossref_base),
            openalex_base: env_string("OPENALEX_BASE_URL").unwrap_or(defaults.openalex_base),
            polite_email: env_string("POLITE_EMAIL"),
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 30)),
            lookup_concurrency: env_parse("LOOKUP_CONCURRENCY", defaults.lookup_concurrency).max(1),
            lookup_retries: env_parse("LOOKUP_RETRIES", defaults.lookup_retries),
            citation_page_size: env_parse("CITATION_PAGE_SIZE", defaults.citation_page_size).max(1),
            max_citation_pages: env_parse("MAX_CITATION_PAGES", defaults.max_citation_pages).max(1),
            page_delay: Duration::from_millis(env_parse("PAGE_DELAY_MS", 80)),
            recency_years: env_parse("RECENCY_YEARS", defaults.recency_years),
            remote_artifacts: env_flag("REMOTE_ARTIFACTS"),
            candidate_override,
            artifact_dir: env_string("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            artifact_prefix: env_string("ARTIFACT_PREFIX").unwrap_or(defaults.artifact_prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_limits() {
        let config = PipelineConfig::default();
        assert_eq!(config.citation_page_size, 200);
        assert_eq!(config.max_citation_pages, 50);
        assert_eq!(config.recency_years, 10);
        assert_eq!(config.page_delay, Duration::from_millis(80));
        assert!(!config.remote_artifacts);
        assert!(config.candidate_override.is_none());
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("PRIOR_ART_TEST_BAD_NUMBER", "not-a-number");
        assert_eq!(env_parse("PRIOR_ART_TEST_BAD_NUMBER", 7u32), 7);
        std::env::set_var("PRIOR_ART_TEST_GOOD_NUMBER", " 12 ");
        assert_eq!(env_parse("PRIOR_ART_TEST_GOOD_NUMBER", 7u32), 12);
    }

    #[test]
    fn test_env_flag_values() {
        std::env::set_var("PRIOR_ART_TEST_FLAG_ON", "Yes");
        std::env::set_var("PRIOR_ART_TEST_FLAG_OFF", "0");
        assert!(env_flag("PRIOR_ART_TEST_FLAG_ON"));
        assert!(!env_flag("PRIOR_ART_TEST_FLAG_OFF"));
        assert!(!env_flag("PRIOR_ART_TEST_FLAG_UNSET"));
    }
}
