use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Label Gmail puts on a message once it sits in the trash.
pub const TRASH_LABEL: &str = "TRASH";

/// Scopes needed to list, read headers of, and trash messages.
pub const REQUIRED_SCOPES: [AccessScopes; 2] = [AccessScopes::Modify, AccessScopes::Readonly];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessScopes {
    AllGmail,
    Compose,
    Insert,
    Labels,
    Metadata,
    Modify,
    Readonly,
    Send,
    SettingsBasic,
    SettingsSharing,
}

impl AccessScopes {
    pub const ALL: [AccessScopes; 10] = [
        AccessScopes::AllGmail,
        AccessScopes::Compose,
        AccessScopes::Insert,
        AccessScopes::Labels,
        AccessScopes::Metadata,
        AccessScopes::Modify,
        AccessScopes::Readonly,
        AccessScopes::Send,
        AccessScopes::SettingsBasic,
        AccessScopes::SettingsSharing,
    ];

    pub fn as_url(&self) -> &'static str {
        match self {
            AccessScopes::AllGmail => "https://mail.google.com/",
            AccessScopes::Compose => "https://www.googleapis.com/auth/gmail.compose",
            AccessScopes::Insert => "https://www.googleapis.com/auth/gmail.insert",
            AccessScopes::Labels => "https://www.googleapis.com/auth/gmail.labels",
            AccessScopes::Metadata => "https://www.googleapis.com/auth/gmail.metadata",
            AccessScopes::Modify => "https://www.googleapis.com/auth/gmail.modify",
            AccessScopes::Readonly => "https://www.googleapis.com/auth/gmail.readonly",
            AccessScopes::Send => "https://www.googleapis.com/auth/gmail.send",
            AccessScopes::SettingsBasic => "https://www.googleapis.com/auth/gmail.settings.basic",
            AccessScopes::SettingsSharing => {
                "https://www.googleapis.com/auth/gmail.settings.sharing"
            }
        }
    }

    /// Space separated scope list, as expected by the `scope` query parameter.
    pub fn join(scopes: &[AccessScopes]) -> String {
        scopes
            .iter()
            .map(|s| s.as_url())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for AccessScopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_url())
    }
}

impl FromStr for AccessScopes {
    type Err = AccessScopesParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccessScopes::ALL
            .into_iter()
            .find(|scope| scope.as_url() == s)
            .ok_or(AccessScopesParseError)
    }
}

#[derive(Debug)]
pub struct AccessScopesParseError;

impl fmt::Display for AccessScopesParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid access scope")
    }
}

impl std::error::Error for AccessScopesParseError {}
