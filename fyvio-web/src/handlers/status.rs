//! Server status route.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::server::AppState;

/// JSON body of `GET /`.
#[derive(Debug, Serialize)]
pub struct ServerStatus {
    /// Always `"running"` while the server answers
    pub server_status: &'static str,
    /// Time since start, e.g. `1h 2m 3s`
    pub uptime: String,
    /// RFC 3339 start timestamp
    pub started_at: String,
    /// Number of backend connections in the pool
    pub connected_connections: usize,
    /// Workload per connection, busiest first
    pub loads: ConnectionLoads,
    /// Gateway version
    pub version: &'static str,
}

/// Workloads serialized as an ordered `{"connection<n>": load}` object.
///
/// `n` is the 1-based rank after sorting by descending load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLoads(Vec<usize>);

impl ConnectionLoads {
    /// Sorts `(index, workload)` pairs by descending workload.
    pub fn from_workloads(workloads: &[(usize, usize)]) -> Self {
        let mut loads: Vec<usize> = workloads.iter().map(|(_, load)| *load).collect();
        loads.sort_unstable_by(|a, b| b.cmp(a));
        Self(loads)
    }
}

impl Serialize for ConnectionLoads {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (rank, load) in self.0.iter().enumerate() {
            map.serialize_entry(&format!("connection{}", rank + 1), load)?;
        }
        map.end()
    }
}

/// Reports uptime and per-connection workloads.
pub async fn server_status(State(state): State<AppState>) -> Json<ServerStatus> {
    let pool = state.gateway.pool();

    Json(ServerStatus {
        server_status: "running",
        uptime: readable_duration(state.server_started_at.elapsed()),
        started_at: state.server_started_at_utc.to_rfc3339(),
        connected_connections: pool.len(),
        loads: ConnectionLoads::from_workloads(&pool.workloads()),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Formats a duration as `Xd Xh Xm Xs`, omitting leading zero units.
pub fn readable_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let units = [
        (total / 86_400, "d"),
        ((total % 86_400) / 3_600, "h"),
        ((total % 3_600) / 60, "m"),
        (total % 60, "s"),
    ];

    let parts: Vec<String> = units
        .iter()
        .skip_while(|(value, unit)| *value == 0 && *unit != "s")
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect();
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_duration() {
        assert_eq!(readable_duration(Duration::from_secs(0)), "0s");
        assert_eq!(readable_duration(Duration::from_secs(42)), "42s");
        assert_eq!(readable_duration(Duration::from_secs(3_723)), "1h 2m 3s");
        assert_eq!(readable_duration(Duration::from_secs(90_061)), "1d 1h 1m 1s");
        assert_eq!(readable_duration(Duration::from_secs(3_600)), "1h 0m 0s");
    }

    #[test]
    fn test_loads_serialize_busiest_first() {
        let loads = ConnectionLoads::from_workloads(&[(0, 1), (1, 7), (2, 3)]);
        let json = serde_json::to_string(&loads).unwrap();
        assert_eq!(json, r#"{"connection1":7,"connection2":3,"connection3":1}"#);
    }
}
