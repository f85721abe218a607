//! OPC-UA status-code taxonomy, restricted to the kinds this core actually
//! produces (see `SPEC_FULL.md` §7 / spec.md §7).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Good,
    /// A value was accepted but its provenance is in question — used for the
    /// DeltaFrame-before-KeyFrame case (see DESIGN.md Open Question 2).
    UncertainInitialValue,
    BadInvalidArgument,
    BadOutOfMemory,
    BadCommunicationError,
    BadConnectionClosed,
    BadEncodingError,
    BadDecodingError,
    BadSecurityChecksFailed,
    BadSecurityModeInsufficient,
    BadUserAccessDenied,
    BadNotFound,
    BadNotImplemented,
    BadSecurityPolicyRejected,
    BadNodeIdExists,
}

impl StatusCode {
    pub fn is_good(self) -> bool {
        matches!(self, StatusCode::Good)
    }

    pub fn is_uncertain(self) -> bool {
        matches!(self, StatusCode::UncertainInitialValue)
    }

    pub fn is_bad(self) -> bool {
        !self.is_good() && !self.is_uncertain()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(StatusCode::Good.is_good());
        assert!(StatusCode::UncertainInitialValue.is_uncertain());
        assert!(StatusCode::BadNotFound.is_bad());
        assert!(!StatusCode::BadNotFound.is_good());
    }
}
