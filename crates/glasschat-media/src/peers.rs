//! Peer-slot naming for the external signaling broker.
//!
//! Each side registers under `{roomId}-{role}` and dials the slot with the
//! role flipped. The convention is part of the external interface and must
//! not change, or existing peers cannot find each other.

use glasschat_shared::Role;

/// The identifier the local side registers under.
pub fn peer_slot(room_id: &str, role: Role) -> String {
    format!("{room_id}-{role}")
}

/// The identifier the opposite side registers under.
pub fn remote_peer_slot(room_id: &str, local_role: Role) -> String {
    peer_slot(room_id, local_role.opposite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_the_room_role_convention() {
        assert_eq!(peer_slot("1712-abc", Role::Admin), "1712-abc-admin");
        assert_eq!(peer_slot("1712-abc", Role::User), "1712-abc-user");
    }

    #[test]
    fn remote_slot_flips_the_role() {
        assert_eq!(remote_peer_slot("r", Role::Admin), "r-user");
        assert_eq!(remote_peer_slot("r", Role::User), "r-admin");
    }
}
