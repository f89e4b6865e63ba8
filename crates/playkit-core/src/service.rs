//! Service categories, authentication status, and HTTP methods.

use serde::{Deserialize, Serialize};

/// Classification of a request's purpose.
///
/// The numeric codes govern deliverability gating: a category is
/// deliverable under an [`AuthStatus`] when its code is less than or
/// equal to the status code. Applications may define their own
/// positive-numbered categories via `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCategory {
    /// Session establishment calls. Always deliverable.
    Authentication,
    /// Usage metrics. Deliverable under any status.
    Metrics,
    /// Application post-style calls. Requires a ready session.
    Post,
    /// Application-defined category with a positive code other than 2.
    Custom(i32),
}

impl ServiceCategory {
    /// Numeric code as stored in the cache.
    pub fn code(&self) -> i32 {
        match self {
            Self::Authentication => -2,
            Self::Metrics => -1,
            Self::Post => 2,
            Self::Custom(code) => *code,
        }
    }

    /// Reconstruct a category from its stored code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -2 => Some(Self::Authentication),
            -1 => Some(Self::Metrics),
            2 => Some(Self::Post),
            c if c > 0 => Some(Self::Custom(c)),
            _ => None,
        }
    }

    /// Whether this is an authentication-category request, which
    /// preempts all other pending work.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication)
    }
}

/// Current authentication status of the SDK session, as reported by
/// the session state machine (an external collaborator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// No session attempt has completed yet.
    #[default]
    Undetermined,
    /// The service rejected the session.
    NotAuthorized,
    /// A limited session: reads and metrics only.
    ReadOnly,
    /// A fully established session.
    Ready,
}

impl AuthStatus {
    /// Numeric code used for the deliverability comparison and the
    /// cache's pending-request filter.
    pub fn code(&self) -> i32 {
        match self {
            Self::Undetermined => -1,
            Self::NotAuthorized => 0,
            Self::ReadOnly => 1,
            Self::Ready => 2,
        }
    }

    /// Reconstruct a status from its code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::Undetermined),
            0 => Some(Self::NotAuthorized),
            1 => Some(Self::ReadOnly),
            2 => Some(Self::Ready),
            _ => None,
        }
    }

    /// Whether requests of `category` may be attempted under this
    /// status.
    pub fn admits(&self, category: ServiceCategory) -> bool {
        category.code() <= self.code()
    }
}

/// HTTP verb for a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_codes_round_trip() {
        for category in [
            ServiceCategory::Authentication,
            ServiceCategory::Metrics,
            ServiceCategory::Post,
            ServiceCategory::Custom(7),
        ] {
            assert_eq!(ServiceCategory::from_code(category.code()), Some(category));
        }

        // Code 2 canonicalizes to Post.
        assert_eq!(ServiceCategory::from_code(2), Some(ServiceCategory::Post));
        assert_eq!(ServiceCategory::from_code(0), None);
        assert_eq!(ServiceCategory::from_code(-5), None);
    }

    #[test]
    fn test_auth_gating() {
        // Authentication is deliverable under every status.
        for status in [
            AuthStatus::Undetermined,
            AuthStatus::NotAuthorized,
            AuthStatus::ReadOnly,
            AuthStatus::Ready,
        ] {
            assert!(status.admits(ServiceCategory::Authentication));
            assert!(status.admits(ServiceCategory::Metrics));
        }

        // Post requires a ready session.
        assert!(!AuthStatus::Undetermined.admits(ServiceCategory::Post));
        assert!(!AuthStatus::NotAuthorized.admits(ServiceCategory::Post));
        assert!(!AuthStatus::ReadOnly.admits(ServiceCategory::Post));
        assert!(AuthStatus::Ready.admits(ServiceCategory::Post));

        // Custom categories follow the numeric rule.
        assert!(AuthStatus::ReadOnly.admits(ServiceCategory::Custom(1)));
        assert!(!AuthStatus::ReadOnly.admits(ServiceCategory::Custom(2)));
    }

    #[test]
    fn test_method_strings() {
        assert_eq!(HttpMethod::Get.as_str(), "GET");
        assert_eq!(HttpMethod::from_str("POST"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::from_str("PATCH"), None);
    }
}
