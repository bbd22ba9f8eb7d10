//! Classification of DIMSE status codes carried in the (0000,0900) *Status*
//! command element.

/// The classification of a DIMSE status code, per PS3.7 Annex C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimseStatus {
    /// `0x0000`: the operation completed successfully.
    Success,
    /// `0xFF00` or `0xFF01`: more responses are expected.
    Pending,
    /// A warning status: the operation completed, but with caveats.
    Warning(u16),
    /// A failure status: the operation did not complete.
    Failure(u16),
}

impl DimseStatus {
    /// Classify a raw DIMSE status code.
    pub fn classify(status: u16) -> DimseStatus {
        match status {
            0x0000 => DimseStatus::Success,
            0xFF00 | 0xFF01 => DimseStatus::Pending,
            0xB000 => DimseStatus::Warning(status),
            other => DimseStatus::Failure(other),
        }
    }

    /// Whether this status means the requester should keep reading
    /// further response/data messages for the same request.
    pub fn is_pending(self) -> bool {
        matches!(self, DimseStatus::Pending)
    }

    /// A short human-readable description of well-known failure/warning
    /// codes, for logging. Falls back to a generic message for unknown
    /// non-zero codes.
    pub fn describe(status: u16) -> &'static str {
        match status {
            0x0000 => "Success",
            0xFF00 | 0xFF01 => "Pending",
            0xA701 => "Refused: out of resources (unable to calculate number of matches)",
            0xA702 => "Refused: out of resources (unable to perform sub-operations)",
            0xA801 => "Refused: move destination unknown",
            0xA900 => "Failed: identifier does not match SOP class",
            0xAA00 => "Failed: none of the frames requested were found",
            0xAA01 => "Failed: unable to create new object for this SOP class",
            0xAA02 => "Failed: unable to extract frames",
            0xAA03 => "Failed: time-based request received out of order",
            0xAA04 => "Failed: invalid request",
            0xB000 => "Warning: sub-operations complete, one or more failures",
            0xFE00 => "Cancelled",
            _ => "Unable to process",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DimseStatus;

    #[test]
    fn classifies_success() {
        assert_eq!(DimseStatus::classify(0x0000), DimseStatus::Success);
    }

    #[test]
    fn classifies_pending() {
        assert_eq!(DimseStatus::classify(0xFF00), DimseStatus::Pending);
        assert_eq!(DimseStatus::classify(0xFF01), DimseStatus::Pending);
        assert!(DimseStatus::classify(0xFF00).is_pending());
    }

    #[test]
    fn classifies_warning_and_failure() {
        assert_eq!(DimseStatus::classify(0xB000), DimseStatus::Warning(0xB000));
        assert_eq!(DimseStatus::classify(0xA801), DimseStatus::Failure(0xA801));
        assert_eq!(DimseStatus::classify(0x0123), DimseStatus::Failure(0x0123));
    }

    #[test]
    fn describes_known_codes() {
        assert_eq!(DimseStatus::describe(0xA801), "Refused: move destination unknown");
        assert_eq!(DimseStatus::describe(0x9999), "Unable to process");
    }
}
