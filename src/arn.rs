//! Parsing of ECS resource identifiers (ARNs) and image references.
//!
//! Only the trailing structure matters here: everything up to the last `/`
//! is an opaque prefix, and the remainder is `resource[:revision]`. The same
//! shape covers task definition ARNs (`...:task-definition/web:12`), container
//! instance ARNs and docker image references (`registry/org/image:tag`).

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A resource identifier split into its structural parts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Arn {
    /// Everything before the last `/`, or empty if there was none.
    pub prefix: String,

    /// The resource name.
    pub resource: String,

    /// The revision (or tag) following the first `:` of the resource part,
    /// or empty if there was none.
    pub revision: String,
}

impl Arn {
    /// Parses an identifier. Never fails: input without any structure
    /// becomes a bare resource name.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (prefix, rest) = s.rsplit_once('/').unwrap_or(("", s));
        let (resource, revision) = rest.split_once(':').unwrap_or((rest, ""));

        Self {
            prefix: prefix.to_string(),
            resource: resource.to_string(),
            revision: revision.to_string(),
        }
    }

    /// Returns `resource` or `resource:revision`.
    #[must_use]
    pub fn short_name(&self) -> String {
        if self.revision.is_empty() {
            self.resource.clone()
        } else {
            format!("{}:{}", self.resource, self.revision)
        }
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            f.write_str(&self.short_name())
        } else {
            write!(f, "{}/{}", self.prefix, self.short_name())
        }
    }
}

impl FromStr for Arn {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Arn {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}
