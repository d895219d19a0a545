//! Scope literals and their resolution onto sequence nodes and type slots.
//!
//! | Literal | Targets |
//! |---|---|
//! | `all` | every node, positions 1..=N |
//! | `HCI_ACL` | every ACL node, then the ACL slot |
//! | `HCI_CMD_0xOO\|0xOOOO` | every command node with that OGF/OCF, then its slot |
//! | `HCI_EVT_0xOO` | every event node with that code, then its slot |
//! | `N`, `FROM-TO` | the node(s) at those 1-based positions |
//!
//! Numeric scopes are resolved by walking forward from where the previous
//! numeric scope started, so they must be listed in ascending order.

use tracing::{debug, warn};

use super::type_table::{TypeKey, TypeOverrideTable};
use crate::sequence::Sequence;
use crate::types::{PacketKind, opcode_pack};

/// One attribute target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Sequence node by 0-based index.
    Node(usize),
    Slot(TypeKey),
}

/// Resolved set of targets for one configuration line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    targets: Vec<Target>,
}

impl Scope {
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// 1-based positions of the node targets, in resolution order.
    pub fn positions(&self) -> Vec<usize> {
        self.targets
            .iter()
            .filter_map(|t| match t {
                Target::Node(i) => Some(i + 1),
                Target::Slot(_) => None,
            })
            .collect()
    }

    pub fn slots(&self) -> Vec<TypeKey> {
        self.targets
            .iter()
            .filter_map(|t| match t {
                Target::Slot(key) => Some(*key),
                Target::Node(_) => None,
            })
            .collect()
    }
}

/// Parsed scope literal, before resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeSpec {
    All,
    Acl,
    Command { ogf: u8, ocf: u16 },
    Event(u8),
    /// Inclusive 1-based positions.
    Range { from: usize, to: usize },
}

impl ScopeSpec {
    pub fn parse(literal: &str) -> Result<Self, String> {
        if literal == "all" {
            return Ok(ScopeSpec::All);
        }

        if let Some(rest) = literal.strip_prefix("HCI_") {
            return match rest.get(..3) {
                Some("ACL") if rest.len() == 3 => Ok(ScopeSpec::Acl),
                Some("CMD") => parse_command(literal),
                Some("EVT") => parse_event(literal),
                _ => Err(format!("unknown scope '{}'", literal)),
            };
        }

        if literal.starts_with(|c: char| c.is_ascii_digit()) {
            return parse_range(literal);
        }

        Err(format!("unknown scope '{}'", literal))
    }
}

/// `HCI_CMD_0xOO|0xOOOO`, exactly 19 characters.
fn parse_command(literal: &str) -> Result<ScopeSpec, String> {
    let malformed = || format!("malformed command scope '{}' (expected HCI_CMD_0xOO|0xOOOO)", literal);
    if literal.len() != 19 || !literal.is_ascii() || literal.as_bytes()[12] != b'|' {
        return Err(malformed());
    }

    let ogf = parse_hex(&literal[8..12]).ok_or_else(malformed)?;
    let ocf = parse_hex(&literal[13..19]).ok_or_else(malformed)?;
    if ogf > 0x3f {
        return Err(format!("OGF {:#04x} out of range in '{}'", ogf, literal));
    }
    if ocf > 0x03ff {
        return Err(format!("OCF {:#06x} out of range in '{}'", ocf, literal));
    }

    Ok(ScopeSpec::Command { ogf: ogf as u8, ocf: ocf as u16 })
}

/// `HCI_EVT_0xOO`, exactly 12 characters.
fn parse_event(literal: &str) -> Result<ScopeSpec, String> {
    let malformed = || format!("malformed event scope '{}' (expected HCI_EVT_0xOO)", literal);
    if literal.len() != 12 || !literal.is_ascii() {
        return Err(malformed());
    }

    let code = parse_hex(&literal[8..12]).ok_or_else(malformed)?;
    Ok(ScopeSpec::Event(code as u8))
}

/// `0x` followed by hex digits filling the rest of the field.
fn parse_hex(field: &str) -> Option<u32> {
    let digits = field.strip_prefix("0x").or_else(|| field.strip_prefix("0X"))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// `N` or `FROM-TO`.
fn parse_range(literal: &str) -> Result<ScopeSpec, String> {
    let position = |s: &str| -> Result<usize, String> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid position '{}' in scope '{}'", s, literal));
        }
        match s.parse::<usize>() {
            Ok(0) | Err(_) => Err(format!("invalid position '{}' in scope '{}'", s, literal)),
            Ok(n) => Ok(n),
        }
    };

    let (from, to) = match literal.split_once('-') {
        Some((from, to)) => (position(from)?, position(to)?),
        None => {
            let n = position(literal)?;
            (n, n)
        }
    };

    if from > to {
        return Err(format!("empty range {}-{}", from, to));
    }
    Ok(ScopeSpec::Range { from, to })
}

/// Resolves scope literals for one configuration file.
///
/// Holds the numeric scan cursor, which only ever moves forward.
#[derive(Debug, Clone, Default)]
pub struct ScopeResolver {
    scan: usize,
}

impl ScopeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 0-based index where the next numeric scope walk starts.
    pub fn scan_cursor(&self) -> usize {
        self.scan
    }

    pub fn resolve(
        &mut self,
        spec: ScopeSpec,
        seq: &Sequence,
        types: &mut TypeOverrideTable,
    ) -> Result<Scope, String> {
        let scope = match spec {
            ScopeSpec::All => {
                debug!("\tadd all");
                Scope { targets: (0..seq.len()).map(Target::Node).collect() }
            }
            ScopeSpec::Acl => {
                debug!("\tadd all HCI ACL data packets");
                self.resolve_type(TypeKey::Acl, seq, types)
            }
            ScopeSpec::Command { ogf, ocf } => {
                debug!("\tadd all HCI command packets with opcode (0x{:02x}|0x{:04x})", ogf, ocf);
                self.resolve_type(TypeKey::Command(opcode_pack(ogf, ocf)), seq, types)
            }
            ScopeSpec::Event(code) => {
                debug!("\tadd all HCI event packets with event type (0x{:02x})", code);
                self.resolve_type(TypeKey::Event(code), seq, types)
            }
            ScopeSpec::Range { from, to } => self.resolve_range(from, to, seq)?,
        };
        Ok(scope)
    }

    fn resolve_type(
        &self,
        key: TypeKey,
        seq: &Sequence,
        types: &mut TypeOverrideTable,
    ) -> Scope {
        let mut targets: Vec<Target> = seq
            .iter()
            .enumerate()
            .filter(|(_, node)| match key {
                TypeKey::Acl => node.frame.kind() == PacketKind::AclData,
                TypeKey::Command(_) | TypeKey::Event(_) => TypeKey::of(&node.frame) == Some(key),
            })
            .map(|(i, _)| {
                debug!("\tadd packet [{}]", i + 1);
                Target::Node(i)
            })
            .collect();

        if types.get_or_create(key).is_some() {
            targets.push(Target::Slot(key));
        } else {
            warn!("{} is outside the override table, only matching packets are affected", key);
        }

        Scope { targets }
    }

    fn resolve_range(&mut self, from: usize, to: usize, seq: &Sequence) -> Result<Scope, String> {
        if to > seq.len() {
            return Err(format!("position {} exceeds sequence length {}", to, seq.len()));
        }

        let start = from - 1;
        if start < self.scan {
            return Err(format!(
                "scope starting at {} follows a scope starting at {}; numeric scopes must be ascending",
                from,
                self.scan + 1
            ));
        }

        self.scan = start;

        if from == to {
            debug!("\tadd single packet [{}]", from);
        } else {
            debug!("\tadd packets {} to {}", from, to);
        }
        Ok(Scope { targets: (start..to).map(Target::Node).collect() })
    }
}
