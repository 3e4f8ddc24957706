//! Origin allowlist resolution.
//!
//! The allowlist is computed once at startup from the local development
//! origins and the optional production origin, then shared read-only with the
//! CORS gate and the `/api/health/cors` probe.

use std::fmt;

/// Browser origins used during local development (Vite and CRA dev servers).
pub const DEV_ORIGINS: [&str; 4] = [
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
    "http://127.0.0.1:3000",
];

/// Ordered, duplicate-free set of origins allowed to call the API.
///
/// Entries never end with `/` and are never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginAllowlist {
    origins: Vec<String>,
}

impl OriginAllowlist {
    /// Development origins plus the production origin, if one is configured.
    pub fn resolve(production_origin: Option<&str>) -> Self {
        Self::from_sources(DEV_ORIGINS, production_origin)
    }

    pub fn from_sources<I, S>(static_origins: I, production_origin: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut origins: Vec<String> = Vec::new();
        let candidates = static_origins
            .into_iter()
            .map(|o| normalize(o.as_ref()))
            .chain(production_origin.map(normalize));

        for origin in candidates.flatten() {
            if !origins.contains(&origin) {
                origins.push(origin);
            }
        }

        Self { origins }
    }

    /// Exact, case-sensitive membership; browsers send origins already serialized.
    pub fn contains(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.origins
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

impl fmt::Display for OriginAllowlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.origins.is_empty() {
            f.write_str("(none)")
        } else {
            f.write_str(&self.origins.join(", "))
        }
    }
}

fn normalize(origin: &str) -> Option<String> {
    let origin = origin.trim().trim_end_matches('/');
    if origin.is_empty() {
        None
    } else {
        Some(origin.to_string())
    }
}
