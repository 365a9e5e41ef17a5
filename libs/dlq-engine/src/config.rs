use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::error::DlqError;

/// Hard bounds on the replay rate, records per second.
pub const MIN_REPLAY_RATE: u32 = 1;
pub const MAX_REPLAY_RATE: u32 = 10_000;

/// Engine configuration: the `[discovery]`, `[fetch]` and `[replay]` sections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, DlqError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| DlqError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, DlqError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| DlqError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DlqError> {
        self.discovery.validate()?;
        self.fetch.validate()?;
        self.replay.validate()
    }
}

// ---------------------------------------------------------------------------
// [discovery]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Regex a topic name must match in full to count as a dead-letter topic.
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

fn default_pattern() -> String {
    ".*-DLQ$".into()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
        }
    }
}

impl DiscoveryConfig {
    fn validate(&self) -> Result<(), DlqError> {
        regex::Regex::new(&self.pattern)
            .map(|_| ())
            .map_err(|e| DlqError::Config(format!("discovery.pattern: {e}")))
    }
}

// ---------------------------------------------------------------------------
// [fetch]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Records per partition when the caller gives no positive limit.
    #[serde(default = "default_fetch_limit")]
    pub default_limit: usize,
    /// Hard ceiling on records per partition.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Wall-clock budget of one fetch call, from call start.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Bounded wait of a single broker pull.
    #[serde(default = "default_poll_wait_ms")]
    pub poll_wait_ms: u64,
}

fn default_fetch_limit() -> usize {
    200
}
fn default_max_limit() -> usize {
    5000
}
fn default_deadline_ms() -> u64 {
    1500
}
fn default_poll_wait_ms() -> u64 {
    100
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_fetch_limit(),
            max_limit: default_max_limit(),
            deadline_ms: default_deadline_ms(),
            poll_wait_ms: default_poll_wait_ms(),
        }
    }
}

impl FetchConfig {
    /// Records per partition for a caller-supplied limit.
    ///
    /// Non-positive or absent limits fall back to the default; the result never
    /// exceeds `max_limit`.
    pub fn effective_limit(&self, requested: Option<i64>) -> usize {
        let n = match requested {
            Some(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
            _ => self.default_limit,
        };
        n.min(self.max_limit)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }

    fn validate(&self) -> Result<(), DlqError> {
        if self.max_limit == 0 || self.default_limit == 0 {
            return Err(DlqError::Config("fetch limits must be positive".into()));
        }
        if self.default_limit > self.max_limit {
            return Err(DlqError::Config(format!(
                "fetch.default_limit ({}) exceeds fetch.max_limit ({})",
                self.default_limit, self.max_limit
            )));
        }
        if self.poll_wait_ms == 0 {
            return Err(DlqError::Config("fetch.poll_wait_ms must be positive".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// [replay]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    /// Default publish rate, records per second.
    #[serde(default = "default_throttle")]
    pub throttle_per_sec: u32,
    /// Header names that survive replay unless a batch overrides the list.
    #[serde(default)]
    pub header_allow_list: AllowList,
}

fn default_throttle() -> u32 {
    50
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            throttle_per_sec: default_throttle(),
            header_allow_list: AllowList::default(),
        }
    }
}

impl ReplayConfig {
    /// Rate for a batch: its own positive rate, else the default, clamped to
    /// `[MIN_REPLAY_RATE, MAX_REPLAY_RATE]`.
    pub fn effective_rate(&self, requested: Option<i64>) -> u32 {
        let rate = match requested {
            Some(r) if r > 0 => u32::try_from(r).unwrap_or(MAX_REPLAY_RATE),
            _ => self.throttle_per_sec,
        };
        rate.clamp(MIN_REPLAY_RATE, MAX_REPLAY_RATE)
    }

    /// Fixed per-item delay for a rate: `max(1ms, 1000ms / rate)`.
    pub fn interval(rate: u32) -> Duration {
        let rate = u64::from(rate.max(MIN_REPLAY_RATE));
        Duration::from_millis((1000 / rate).max(1))
    }

    fn validate(&self) -> Result<(), DlqError> {
        if self.throttle_per_sec == 0 {
            return Err(DlqError::Config("replay.throttle_per_sec must be positive".into()));
        }
        Ok(())
    }
}

/// Header allow-list.
///
/// Deserializes from a comma-separated string (`"content-type, correlation-id"`)
/// or an array. Entries are trimmed and blanks dropped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawAllowList")]
pub struct AllowList(HashSet<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAllowList {
    Csv(String),
    List(Vec<String>),
}

impl From<RawAllowList> for AllowList {
    fn from(raw: RawAllowList) -> Self {
        match raw {
            RawAllowList::Csv(s) => AllowList::parse(&s),
            RawAllowList::List(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for AllowList {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        AllowList(
            iter.into_iter()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

impl AllowList {
    pub fn parse(csv: &str) -> Self {
        csv.split(',').collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn as_set(&self) -> &HashSet<String> {
        &self.0
    }
}

impl Default for AllowList {
    fn default() -> Self {
        AllowList::parse("content-type,correlation-id")
    }
}
