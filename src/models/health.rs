use serde::Serialize;

/// Hardware and usage figures served by the health endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HwStatusResponse {
    /// Average CPU load over the last sampling window, percent.
    pub cpu: f32,
    /// Used memory, percent.
    pub ram: f32,
    /// Users currently online across all rooms.
    pub uo: usize,
    /// Whether the queried room is hosted on this instance.
    pub rf: bool,
}
