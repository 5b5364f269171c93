use crate::registry::Registry;

pub const ID_HEX_LEN: usize = 32;

/// Fresh 128-bit random id, lowercase hex.
pub fn make_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

pub fn unique_id(registry: &Registry) -> String {
    for _ in 0..16 {
        let id = make_id();

        if !registry.contains(&id) {
            return id;
        }
    }

    make_id()
}
