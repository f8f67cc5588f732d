/// Health check handler
///
/// Liveness probe for load balancers; carries no state.
pub async fn health_check() -> &'static str {
    "OK"
}
