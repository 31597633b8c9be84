//! Port allocation (spec.md §6: "each replica listens on `BASE_PORT +
//! replica_id`"). Client agents get their own base so that a client id
//! never collides with a live replica id on the same host; see
//! DESIGN.md OQ-1/"client port space" for why this departs from the
//! original source, which reused one port space for both.

pub const DEFAULT_BASE_PORT: u16 = 8800;
pub const DEFAULT_CLIENT_BASE_PORT: u16 = 9800;
pub const DEFAULT_MAX_REPLICAS: u32 = 100;

pub fn replica_url(host: &str, base_port: u16, replica_id: u32) -> String {
    format!("http://{host}:{}", base_port + replica_id as u16)
}

pub fn client_url(host: &str, client_base_port: u16, client_id: u32) -> String {
    format!("http://{host}:{}", client_base_port + client_id as u16)
}
