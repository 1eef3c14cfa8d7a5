/// Liveness probe.
pub async fn liveness() -> &'static str {
    "ok"
}
