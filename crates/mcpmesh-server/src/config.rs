//! Server and proxy configuration.
//!
//! Configuration is plain data: it can be built in code, deserialized, or
//! read from `MCPMESH_*` environment variables with [`ServerConfig::from_env`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use mcpmesh_core::template::QueryPolicy;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What registering an already-present key does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Reject the registration with `NameConflict`.
    #[default]
    Error,
    /// Replace the existing entry and log a warning.
    Warn,
    /// Replace the existing entry silently.
    Replace,
    /// Keep the existing entry and report success.
    Ignore,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Replace => write!(f, "replace"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "replace" => Ok(Self::Replace),
            "ignore" => Ok(Self::Ignore),
            other => Err(format!("unknown duplicate policy '{other}'")),
        }
    }
}

/// How a mount prefix is written into resource identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePrefixFormat {
    /// `scheme://prefix/rest`
    #[default]
    Path,
    /// `prefix+scheme://rest`
    Protocol,
}

impl fmt::Display for ResourcePrefixFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => write!(f, "path"),
            Self::Protocol => write!(f, "protocol"),
        }
    }
}

impl FromStr for ResourcePrefixFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "protocol" => Ok(Self::Protocol),
            other => Err(format!("unknown resource prefix format '{other}'")),
        }
    }
}

/// Newtype so the query policy can be parsed from the environment.
#[derive(Debug, Clone, Copy)]
struct EnvQueryPolicy(QueryPolicy);

impl fmt::Display for EnvQueryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            QueryPolicy::Ignore => write!(f, "ignore"),
            QueryPolicy::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for EnvQueryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self(QueryPolicy::Ignore)),
            "reject" => Ok(Self(QueryPolicy::Reject)),
            other => Err(format!("unknown query policy '{other}'")),
        }
    }
}

/// Configuration of one server node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Replace non-public handler error messages with a generic one.
    pub mask_error_details: bool,
    /// What registering a duplicate key does.
    pub on_duplicate: DuplicatePolicy,
    /// What to do with undeclared query keys when matching templates.
    pub unknown_query_params: QueryPolicy,
    /// How mount prefixes appear in resource identifiers.
    pub resource_prefix_format: ResourcePrefixFormat,
}

impl ServerConfig {
    /// Environment variable for [`mask_error_details`](Self::mask_error_details).
    pub const ENV_MASK_ERROR_DETAILS: &'static str = "MCPMESH_MASK_ERROR_DETAILS";
    /// Environment variable for [`on_duplicate`](Self::on_duplicate).
    pub const ENV_ON_DUPLICATE: &'static str = "MCPMESH_ON_DUPLICATE";
    /// Environment variable for [`unknown_query_params`](Self::unknown_query_params).
    pub const ENV_UNKNOWN_QUERY_PARAMS: &'static str = "MCPMESH_UNKNOWN_QUERY_PARAMS";
    /// Environment variable for [`resource_prefix_format`](Self::resource_prefix_format).
    pub const ENV_RESOURCE_PREFIX_FORMAT: &'static str = "MCPMESH_RESOURCE_PREFIX_FORMAT";

    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `MCPMESH_*` environment variables.
    ///
    /// Unset variables keep their default. Invalid values log a warning and
    /// keep their default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            mask_error_details: parse_var(
                &lookup,
                Self::ENV_MASK_ERROR_DETAILS,
                defaults.mask_error_details,
            ),
            on_duplicate: parse_var(&lookup, Self::ENV_ON_DUPLICATE, defaults.on_duplicate),
            unknown_query_params: parse_var(
                &lookup,
                Self::ENV_UNKNOWN_QUERY_PARAMS,
                EnvQueryPolicy(defaults.unknown_query_params),
            )
            .0,
            resource_prefix_format: parse_var(
                &lookup,
                Self::ENV_RESOURCE_PREFIX_FORMAT,
                defaults.resource_prefix_format,
            ),
        }
    }

    /// Set error masking.
    #[must_use]
    pub fn mask_error_details(mut self, mask: bool) -> Self {
        self.mask_error_details = mask;
        self
    }

    /// Set the duplicate policy.
    #[must_use]
    pub fn on_duplicate(mut self, policy: DuplicatePolicy) -> Self {
        self.on_duplicate = policy;
        self
    }

    /// Set the unknown query parameter policy.
    #[must_use]
    pub fn unknown_query_params(mut self, policy: QueryPolicy) -> Self {
        self.unknown_query_params = policy;
        self
    }

    /// Set the resource prefix format.
    #[must_use]
    pub fn resource_prefix_format(mut self, format: ResourcePrefixFormat) -> Self {
        self.resource_prefix_format = format;
        self
    }
}

/// When a proxy refetches the remote catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Keep the catalog until invalidated explicitly or by a list-changed event.
    #[default]
    UntilInvalidated,
    /// Refetch on every lookup.
    PerCall,
}

/// Configuration of a proxy bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Catalog caching.
    pub cache: CachePolicy,
    /// Upper bound on one forwarded round trip.
    #[serde(with = "duration_ms", skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<Duration>,
}

impl ProxyConfig {
    /// Set the cache policy.
    #[must_use]
    pub fn cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    /// Bound every forwarded round trip.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(val) => match val.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = name,
                    value = %val,
                    default = %default,
                    "Invalid value for environment variable, using default"
                );
                default
            }
        },
        None => default,
    }
}
