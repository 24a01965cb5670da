use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use flockid::{
    Beacon, Envelope, TimeSource, UnregisterRequest, WorkerRegistry, WorkerStore, codes,
};
use std::sync::Arc;

type Registry<S, T> = State<Arc<WorkerRegistry<S, T>>>;

/// Routes served by the coordinator.
pub fn router<S, T>(registry: Arc<WorkerRegistry<S, T>>) -> Router
where
    S: WorkerStore + 'static,
    T: TimeSource + Send + Sync + 'static,
{
    Router::new()
        .route("/master/registry", post(register::<S, T>))
        .route("/master/heartbeat", post(heartbeat::<S, T>))
        .route("/master/unregister", post(unregister::<S, T>))
        .route("/master/id", get(redirect::<S, T>))
        .with_state(registry)
}

async fn register<S, T>(
    State(registry): Registry<S, T>,
    Json(beacon): Json<Beacon>,
) -> Json<Envelope<u16>>
where
    S: WorkerStore + 'static,
    T: TimeSource + Send + Sync + 'static,
{
    let Beacon {
        fingerprint,
        timestamp,
        exposed_address,
        ..
    } = beacon;
    let address = exposed_address.clone();
    let registered = off_runtime(registry, move |registry| {
        registry.register(fingerprint, exposed_address, timestamp)
    })
    .await;
    match registered {
        Ok(identity) => Json(Envelope::success(identity)),
        Err(refusal) => {
            tracing::warn!(%fingerprint, %address, "registration rejected: {}", refusal.message);
            Json(refusal)
        }
    }
}

async fn heartbeat<S, T>(
    State(registry): Registry<S, T>,
    Json(beacon): Json<Beacon>,
) -> Json<Envelope<u16>>
where
    S: WorkerStore + 'static,
    T: TimeSource + Send + Sync + 'static,
{
    let Some(identity) = beacon.worker_id else {
        return Json(Envelope::fail(
            codes::UNKNOWN_WORKER,
            "heartbeat carries no workerId",
        ));
    };
    let timestamp = beacon.timestamp;
    match off_runtime(registry, move |registry| registry.heartbeat(identity, timestamp)).await {
        Ok(()) => Json(Envelope::success(identity)),
        Err(refusal) => Json(refusal),
    }
}

async fn unregister<S, T>(
    State(registry): Registry<S, T>,
    Json(request): Json<UnregisterRequest>,
) -> Json<Envelope<u16>>
where
    S: WorkerStore + 'static,
    T: TimeSource + Send + Sync + 'static,
{
    let identity = request.worker_id;
    match off_runtime(registry, move |registry| registry.unregister(identity)).await {
        Ok(()) => Json(Envelope::success(identity)),
        Err(refusal) => Json(refusal),
    }
}

/// Runs `call` on the blocking pool. Store writes may hit the disk.
async fn off_runtime<S, T, R, F>(
    registry: Arc<WorkerRegistry<S, T>>,
    call: F,
) -> Result<R, Envelope<u16>>
where
    S: WorkerStore + 'static,
    T: TimeSource + Send + Sync + 'static,
    R: Send + 'static,
    F: FnOnce(&WorkerRegistry<S, T>) -> flockid::Result<R> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || call(&registry)).await {
        Ok(result) => result.map_err(|e| Envelope::from(&e)),
        Err(e) => {
            tracing::error!("registry task failed: {e}");
            Err(Envelope::fail(codes::FAILURE, "registry task failed"))
        }
    }
}

/// Sends the caller to a random live worker's id endpoint.
async fn redirect<S: WorkerStore, T: TimeSource>(State(registry): Registry<S, T>) -> Response {
    match registry.select_live_worker() {
        Ok(address) => Redirect::temporary(&worker_id_url(&address)).into_response(),
        Err(e) => {
            tracing::warn!("cannot route id request: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn worker_id_url(exposed_address: &str) -> String {
    format!("{}/worker/id", exposed_address.trim_end_matches('/'))
}
