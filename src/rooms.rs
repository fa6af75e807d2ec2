//! The fixed room roster for this version of the server. Rooms are not
//! user-created; the set is a compile-time constant.

pub struct RoomDef {
    pub id: &'static str,
    pub name: &'static str,
}

pub const ROOMS: &[RoomDef] = &[
    RoomDef { id: "beast", name: "Boost.Beast" },
    RoomDef { id: "async", name: "Boost.Async" },
    RoomDef { id: "db", name: "Database connectors" },
    RoomDef { id: "wasm", name: "Web assembly" },
];

pub fn room_ids() -> Vec<String> {
    ROOMS.iter().map(|room| room.id.to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_is_the_four_fixed_rooms_in_order() {
        let ids: Vec<&str> = ROOMS.iter().map(|room| room.id).collect();
        assert_eq!(ids, vec!["beast", "async", "db", "wasm"]);
    }
}
