//! Client/server security negotiation.
//!
//! Each side states a policy; the client combines the two into an outcome
//! and reports it back to the server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Keyword prefixing the outcome sent back to the server.
pub const RESULT_KEYWORD: &str = "cs_neg_result_kw";

/// Status value meaning a side completed negotiation.
pub const STATUS_SUCCESS: i32 = 1;
/// Status value reporting a failed negotiation.
pub const STATUS_FAILURE: i32 = 0;

/// A side's position on encrypting the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NegotiationPolicy {
    #[serde(rename = "CS_NEG_REQUIRE")]
    Require,
    #[serde(rename = "CS_NEG_DONT_CARE")]
    DontCare,
    #[default]
    #[serde(rename = "CS_NEG_REFUSE")]
    Refuse,
}

impl NegotiationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationPolicy::Require => "CS_NEG_REQUIRE",
            NegotiationPolicy::DontCare => "CS_NEG_DONT_CARE",
            NegotiationPolicy::Refuse => "CS_NEG_REFUSE",
        }
    }
}

impl FromStr for NegotiationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CS_NEG_REQUIRE" => Ok(NegotiationPolicy::Require),
            "CS_NEG_DONT_CARE" => Ok(NegotiationPolicy::DontCare),
            "CS_NEG_REFUSE" => Ok(NegotiationPolicy::Refuse),
            other => Err(format!("unknown negotiation policy {other:?}")),
        }
    }
}

impl fmt::Display for NegotiationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of combining both policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationOutcome {
    UseTcp,
    UseSsl,
    Failure,
}

impl NegotiationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationOutcome::UseTcp => "CS_NEG_USE_TCP",
            NegotiationOutcome::UseSsl => "CS_NEG_USE_SSL",
            NegotiationOutcome::Failure => "CS_NEG_FAILURE",
        }
    }

    /// The result string sent to the server, e.g. `cs_neg_result_kw=CS_NEG_USE_TCP;`.
    pub fn result_string(&self) -> String {
        format!("{RESULT_KEYWORD}={};", self.as_str())
    }

    pub fn status(&self) -> i32 {
        match self {
            NegotiationOutcome::Failure => STATUS_FAILURE,
            _ => STATUS_SUCCESS,
        }
    }
}

/// Combines the client and server policies.
pub fn negotiate(client: NegotiationPolicy, server: NegotiationPolicy) -> NegotiationOutcome {
    use NegotiationOutcome::*;
    use NegotiationPolicy::*;

    match (client, server) {
        (Require, Refuse) | (Refuse, Require) => Failure,
        (Refuse, _) | (DontCare, Refuse) => UseTcp,
        _ => UseSsl,
    }
}

#[cfg(test)]
mod tests {
    use super::NegotiationOutcome::*;
    use super::NegotiationPolicy::*;
    use super::*;

    #[test]
    fn test_negotiation_table() {
        let table = [
            (Require, Require, UseSsl),
            (Require, DontCare, UseSsl),
            (Require, Refuse, Failure),
            (DontCare, Require, UseSsl),
            (DontCare, DontCare, UseSsl),
            (DontCare, Refuse, UseTcp),
            (Refuse, Require, Failure),
            (Refuse, DontCare, UseTcp),
            (Refuse, Refuse, UseTcp),
        ];
        for (client, server, expected) in table {
            assert_eq!(negotiate(client, server), expected, "{client} vs {server}");
        }
    }

    #[test]
    fn test_result_string() {
        assert_eq!(UseTcp.result_string(), "cs_neg_result_kw=CS_NEG_USE_TCP;");
        assert_eq!(Failure.status(), STATUS_FAILURE);
        assert_eq!(UseSsl.status(), STATUS_SUCCESS);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("CS_NEG_DONT_CARE".parse::<NegotiationPolicy>(), Ok(DontCare));
        assert!("maybe".parse::<NegotiationPolicy>().is_err());
        assert_eq!(NegotiationPolicy::default(), Refuse);
    }
}
