use axum::{Json, Router, extract::State, routing::get};
use flockid::{ID_FAILURE, TimeSource, WorkerNode};
use std::sync::Arc;

/// Routes served by a worker.
pub fn router<T>(node: Arc<WorkerNode<T>>) -> Router
where
    T: TimeSource + Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/worker/id", get(next_id::<T>))
        .with_state(node)
}

/// Answers the next id, or [`ID_FAILURE`] when none can be issued.
///
/// Generation may sleep through a clock step or sequence rollover, so it runs
/// on the blocking pool.
async fn next_id<T>(State(node): State<Arc<WorkerNode<T>>>) -> Json<i64>
where
    T: TimeSource + Clone + Send + Sync + 'static,
{
    match tokio::task::spawn_blocking(move || node.next_id()).await {
        Ok(Ok(id)) => Json(i64::try_from(id).unwrap_or(ID_FAILURE)),
        Ok(Err(e)) => {
            tracing::debug!("id request failed: {e}");
            Json(ID_FAILURE)
        }
        Err(e) => {
            tracing::error!("id generation task failed: {e}");
            Json(ID_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::longest_stall;
    use crate::server::worker::testing::{active_node, interfaces};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use flockid::{
        ClockDriftPolicy, DEFAULT_EPOCH_MILLIS, GeneratorConfig, RegistrationIdentity,
        SystemClock, resolve_fingerprint,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    /// Reads 300 ms ahead once, then follows the system clock, so the next
    /// id has to wait out a backward step.
    #[derive(Clone, Default)]
    struct SteppedBackClock(Arc<AtomicBool>);

    impl TimeSource for SteppedBackClock {
        fn current_millis(&self) -> u64 {
            let ahead = if self.0.swap(true, Ordering::Relaxed) { 0 } else { 300 };
            SystemClock.current_millis() + ahead
        }
    }

    async fn fetch(app: &Router) -> i64 {
        let response = app
            .clone()
            .oneshot(Request::get("/worker/id").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unregistered_worker_answers_failure() {
        let app = router(Arc::new(WorkerNode::new(
            GeneratorConfig::default(),
            SystemClock,
        )));
        assert_eq!(fetch(&app).await, -1);
    }

    #[tokio::test]
    async fn active_worker_answers_increasing_ids() {
        let node = Arc::new(active_node(&interfaces(), 12));
        let app = router(Arc::clone(&node));

        let a = fetch(&app).await;
        let b = fetch(&app).await;
        assert!(a > 0);
        assert!(b > a);
        assert_eq!(node.config().layout().decode(b as u64).identity, 12);

        node.terminate();
        assert_eq!(fetch(&app).await, -1);
    }

    #[tokio::test]
    async fn drift_wait_leaves_the_runtime_free() {
        let node = WorkerNode::new(
            GeneratorConfig::new(ClockDriftPolicy::Wait, 1_000, DEFAULT_EPOCH_MILLIS),
            SteppedBackClock::default(),
        );
        node.activate(RegistrationIdentity {
            fingerprint: resolve_fingerprint(&interfaces()).unwrap(),
            exposed_address: "http://10.0.0.9:8080".into(),
            identity: 3,
        });
        let app = router(Arc::new(node));

        let first = fetch(&app).await;
        let started = Instant::now();
        let (second, stall) = longest_stall(fetch(&app)).await;

        assert!(second > first);
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert!(stall < Duration::from_millis(150), "runtime stalled {stall:?}");
    }
}
