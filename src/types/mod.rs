//! Core value types: frames, timestamps and replay attributes.

pub mod attr;
pub mod frame;
pub mod timeval;

pub use attr::{Action, Attr};
pub use frame::{
    Direction, Frame, H4_ACL_DATA, H4_COMMAND, H4_EVENT, H4_SCO_DATA, HCI_MAX_FRAME_SIZE,
    PacketKind, opcode_ocf, opcode_ogf, opcode_pack,
};
pub use timeval::{Timeval, USEC_PER_SEC};
