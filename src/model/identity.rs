use std::fmt;

use serde::{Deserialize, Serialize};

/// Coordinates of a package on a remote service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdentity {
    /// Base URL of the remote service, without trailing slash
    pub api_url: String,
    pub project: String,
    pub package: String,
}

impl PackageIdentity {
    pub fn new(
        api_url: impl Into<String>,
        project: impl Into<String>,
        package: impl Into<String>,
    ) -> Self {
        let api_url: String = api_url.into();
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            project: project.into(),
            package: package.into(),
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_stripped() {
        let id = PackageIdentity::new("https://api.example.org/", "home:me", "hello");
        assert_eq!(id.api_url, "https://api.example.org");
        assert_eq!(id.to_string(), "home:me/hello");
    }
}
