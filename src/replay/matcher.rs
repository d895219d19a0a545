//! Expected-versus-received frame comparison.

use crate::types::{Frame, PacketKind, opcode_ocf, opcode_ogf};

/// Result of comparing a received frame with the expected one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    /// Operator-facing explanation, set for mismatches and unknown kinds.
    pub description: Option<String>,
}

impl MatchResult {
    fn hit() -> Self {
        Self { matched: true, description: None }
    }

    fn miss(description: String) -> Self {
        Self { matched: false, description: Some(description) }
    }
}

/// Compare packet kind, then the type-specific identity: opcode for
/// commands, event code for events, full contents for ACL and anything else.
pub fn check_match(expected: &Frame, received: &Frame) -> MatchResult {
    let (want, got) = (expected.data(), received.data());
    let (type_l, type_r) = (want.first().copied().unwrap_or(0), got.first().copied().unwrap_or(0));

    if type_l != type_r {
        return MatchResult::miss(format!(
            "! Wrong packet type - expected (0x{:02x}), was (0x{:02x})",
            type_l, type_r
        ));
    }

    match expected.kind() {
        PacketKind::Command => match (expected.opcode(), received.opcode()) {
            (Some(l), Some(r)) if l == r => MatchResult::hit(),
            (Some(l), Some(r)) => MatchResult::miss(format!(
                "! Wrong opcode - expected (0x{:02x}|0x{:04x}), was (0x{:02x}|0x{:04x})",
                opcode_ogf(l),
                opcode_ocf(l),
                opcode_ogf(r),
                opcode_ocf(r)
            )),
            _ => MatchResult::miss("! Truncated command packet".to_string()),
        },
        PacketKind::Event => match (expected.event_code(), received.event_code()) {
            (Some(l), Some(r)) if l == r => MatchResult::hit(),
            (Some(l), Some(r)) => MatchResult::miss(format!(
                "! Wrong event type - expected (0x{:02x}), was (0x{:02x})",
                l, r
            )),
            _ => MatchResult::miss("! Truncated event packet".to_string()),
        },
        PacketKind::AclData if want == got => MatchResult::hit(),
        PacketKind::AclData if want.len() != got.len() => MatchResult::miss(format!(
            "! Wrong ACL data length - expected ({}), was ({})",
            want.len(),
            got.len()
        )),
        PacketKind::AclData => MatchResult::miss("! Wrong ACL data contents".to_string()),
        PacketKind::ScoData | PacketKind::Unknown => MatchResult {
            matched: want == got,
            description: Some(format!("! Unknown packet type (0x{:02x})", type_l)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{acl, command, event};
    use crate::types::{Direction, Timeval};

    #[test]
    fn matching_command() {
        let result = check_match(&command(0x0c03, Timeval::ZERO), &command(0x0c03, Timeval::new(9, 0)));
        assert_eq!(result, MatchResult::hit());
    }

    #[test]
    fn wrong_opcode() {
        let result = check_match(&command(0x0c03, Timeval::ZERO), &command(0x0c01, Timeval::ZERO));
        assert!(!result.matched);
        assert_eq!(
            result.description.as_deref(),
            Some("! Wrong opcode - expected (0x03|0x0003), was (0x03|0x0001)")
        );
    }

    #[test]
    fn wrong_packet_type() {
        let result = check_match(&command(0x0c03, Timeval::ZERO), &event(0x0e, &[], Timeval::ZERO));
        assert_eq!(
            result.description.as_deref(),
            Some("! Wrong packet type - expected (0x01), was (0x04)")
        );
    }

    #[test]
    fn events_compare_codes_only() {
        let l = event(0x0e, &[0x01, 0x03, 0x0c, 0x00], Timeval::ZERO);
        assert!(check_match(&l, &event(0x0e, &[0x02], Timeval::ZERO)).matched);

        let result = check_match(&l, &event(0x0f, &[], Timeval::ZERO));
        assert_eq!(
            result.description.as_deref(),
            Some("! Wrong event type - expected (0x0e), was (0x0f)")
        );
    }

    #[test]
    fn acl_compares_full_contents() {
        let l = acl(1, &[1, 2, 3], Direction::ToController, Timeval::ZERO);
        assert!(check_match(&l, &acl(1, &[1, 2, 3], Direction::ToController, Timeval::ZERO)).matched);
        assert!(!check_match(&l, &acl(1, &[1, 2, 4], Direction::ToController, Timeval::ZERO)).matched);
        assert!(!check_match(&l, &acl(1, &[1, 2], Direction::ToController, Timeval::ZERO)).matched);
    }

    #[test]
    fn unknown_kinds_always_describe() {
        let l = Frame::new(Direction::ToController, vec![0x03, 0x01, 0x00, 0x00], Timeval::ZERO);
        let result = check_match(&l, &l.clone());
        assert!(result.matched);
        assert_eq!(result.description.as_deref(), Some("! Unknown packet type (0x03)"));
    }
}
