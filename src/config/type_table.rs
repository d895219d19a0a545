//! Position-independent override slots keyed by packet type.

use std::collections::HashMap;
use std::fmt;

use crate::types::{Action, Attr, Frame, PacketKind, opcode_ocf, opcode_ogf};

/// Opcodes with OGF 0x01..=0x08 (0x0000..0x2400) get a command slot.
pub const MAX_OPCODE_SLOTS: u16 = 9216;

/// Key of one override slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Command(u16),
    Event(u8),
    Acl,
}

impl TypeKey {
    /// The slot a frame would be governed by, if its kind has slots at all.
    pub fn of(frame: &Frame) -> Option<TypeKey> {
        match frame.kind() {
            PacketKind::Command => frame.opcode().map(TypeKey::Command),
            PacketKind::Event => frame.event_code().map(TypeKey::Event),
            PacketKind::AclData => Some(TypeKey::Acl),
            PacketKind::ScoData | PacketKind::Unknown => None,
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKey::Command(opcode) => {
                write!(f, "HCI_CMD_0x{:02x}|0x{:04x}", opcode_ogf(*opcode), opcode_ocf(*opcode))
            }
            TypeKey::Event(code) => write!(f, "HCI_EVT_0x{:02x}", code),
            TypeKey::Acl => f.write_str("HCI_ACL"),
        }
    }
}

/// Override slots created on first reference by a configuration scope.
#[derive(Debug, Clone, Default)]
pub struct TypeOverrideTable {
    commands: HashMap<u16, Attr>,
    events: HashMap<u8, Attr>,
    acl: Option<Attr>,
}

impl TypeOverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing slot for `key`.
    pub fn slot(&self, key: TypeKey) -> Option<&Attr> {
        match key {
            TypeKey::Command(opcode) => self.commands.get(&opcode),
            TypeKey::Event(code) => self.events.get(&code),
            TypeKey::Acl => self.acl.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, key: TypeKey) -> Option<&mut Attr> {
        match key {
            TypeKey::Command(opcode) => self.commands.get_mut(&opcode),
            TypeKey::Event(code) => self.events.get_mut(&code),
            TypeKey::Acl => self.acl.as_mut(),
        }
    }

    /// Slot for `key`, created with default attributes if missing.
    ///
    /// Returns `None` for command opcodes outside the slot range.
    pub fn get_or_create(&mut self, key: TypeKey) -> Option<&mut Attr> {
        match key {
            TypeKey::Command(opcode) if opcode >= MAX_OPCODE_SLOTS => None,
            TypeKey::Command(opcode) => Some(self.commands.entry(opcode).or_default()),
            TypeKey::Event(code) => Some(self.events.entry(code).or_default()),
            TypeKey::Acl => Some(self.acl.get_or_insert_with(Attr::default)),
        }
    }

    /// Slot governing `frame`, if one was configured.
    pub fn lookup(&self, frame: &Frame) -> Option<&Attr> {
        TypeKey::of(frame).and_then(|key| self.slot(key))
    }

    /// Configured action for `frame`'s type.
    pub fn action_for(&self, frame: &Frame) -> Option<Action> {
        self.lookup(frame).map(|attr| attr.action)
    }

    /// Number of slots created so far.
    pub fn len(&self) -> usize {
        self.commands.len() + self.events.len() + usize::from(self.acl.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{acl, command, event};
    use crate::types::{Direction, Timeval};

    #[test]
    fn slots_are_created_on_first_reference() {
        let mut table = TypeOverrideTable::new();
        assert!(table.slot(TypeKey::Event(0x0e)).is_none());

        if let Some(attr) = table.get_or_create(TypeKey::Event(0x0e)) {
            attr.action = Action::Skip;
        }
        assert!(table.get_or_create(TypeKey::Event(0x0e)).is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.slot(TypeKey::Event(0x0e)).map(|a| a.action), Some(Action::Skip));
    }

    #[test]
    fn vendor_opcodes_have_no_slot() {
        let mut table = TypeOverrideTable::new();
        assert!(table.get_or_create(TypeKey::Command(0xfc01)).is_none());
        assert!(table.get_or_create(TypeKey::Command(0x23ff)).is_some());
        assert!(table.get_or_create(TypeKey::Command(0x2400)).is_none());
    }

    #[test]
    fn lookup_by_frame() {
        let mut table = TypeOverrideTable::new();
        if let Some(attr) = table.get_or_create(TypeKey::Command(0x0c03)) {
            attr.action = Action::Emulate;
        }
        if let Some(attr) = table.get_or_create(TypeKey::Acl) {
            attr.action = Action::Skip;
        }

        assert_eq!(table.action_for(&command(0x0c03, Timeval::ZERO)), Some(Action::Emulate));
        assert_eq!(table.action_for(&command(0x0c01, Timeval::ZERO)), None);
        assert_eq!(table.action_for(&event(0x0e, &[], Timeval::ZERO)), None);
        assert_eq!(
            table.action_for(&acl(1, &[1, 2], Direction::ToController, Timeval::ZERO)),
            Some(Action::Skip)
        );
    }

    #[test]
    fn key_display_matches_scope_syntax() {
        assert_eq!(TypeKey::Command(0x0c03).to_string(), "HCI_CMD_0x03|0x0003");
        assert_eq!(TypeKey::Event(0x0e).to_string(), "HCI_EVT_0x0e");
        assert_eq!(TypeKey::Acl.to_string(), "HCI_ACL");
    }
}
