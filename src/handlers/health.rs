use crate::engine::dispatcher::normalize_room_name;
use crate::models::health::HwStatusResponse;
use crate::state::SharedState;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use sysinfo::System;

const CPU_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);
const CPU_WINDOW_SLOTS: usize = 12;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();
static CPU_WINDOW: Mutex<VecDeque<f32>> = Mutex::new(VecDeque::new());

fn system() -> &'static Mutex<System> {
    SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()))
}

/// Periodically sample CPU load so the health endpoint can report a rolling
/// one-minute average instead of an instant spike.
pub fn start_hw_sampler() -> tokio::task::JoinHandle<()> {
    tokio::spawn(async {
        loop {
            {
                let mut sys = system().lock().unwrap_or_else(|e| e.into_inner());
                sys.refresh_cpu();
                let usage = sys.global_cpu_info().cpu_usage();
                let mut window = CPU_WINDOW.lock().unwrap_or_else(|e| e.into_inner());
                if window.len() >= CPU_WINDOW_SLOTS {
                    window.pop_front();
                }
                window.push_back(usage);
            }
            tokio::time::sleep(CPU_SAMPLE_INTERVAL).await;
        }
    })
}

fn cpu_average() -> f32 {
    let window = CPU_WINDOW.lock().unwrap_or_else(|e| e.into_inner());
    if window.is_empty() {
        return 0.0;
    }
    window.iter().sum::<f32>() / window.len() as f32
}

fn ram_used_percent() -> f32 {
    let mut sys = system().lock().unwrap_or_else(|e| e.into_inner());
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        return 0.0;
    }
    (sys.used_memory() as f32 / total as f32) * 100.0
}

#[derive(Debug, Deserialize)]
pub struct HwStatusQuery {
    /// Room whose presence on this instance the caller wants to know.
    #[serde(default)]
    pub r: Option<String>,
}

/// Health figures for the load balancer: rolling CPU average, RAM usage,
/// live user count and whether the queried room lives on this instance.
pub async fn hw_status(
    State(state): State<SharedState>,
    Query(query): Query<HwStatusQuery>,
) -> Json<HwStatusResponse> {
    let rooms = state.registry.snapshot().await;
    let mut users_online = 0;
    for room in &rooms {
        users_online += room.state.lock().await.online_count();
    }
    let room_found = match query.r.as_deref() {
        Some(raw) if !raw.is_empty() => {
            state.registry.contains(&normalize_room_name(raw)).await
        }
        _ => false,
    };
    Json(HwStatusResponse {
        cpu: cpu_average(),
        ram: ram_used_percent(),
        uo: users_online,
        rf: room_found,
    })
}
