use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use poem::http::StatusCode;
use poem::web::{Data, Path};
use poem::{handler, post, Endpoint, EndpointExt, Response, Route};

use crate::config::RuntimeConfig;
use crate::envelope::GatewayResponse;
use crate::invoker::{HttpTransport, TransportConfig, WorkerInvoker, WorkerTransport};
use crate::workers::{self, LocalTransport, WorkerContext, WorkerName};
use crate::workflow::{DELETE, UPLOAD};

/// Shared by every handler.
pub struct AppState {
    pub invoker: WorkerInvoker,
    pub workers: Arc<WorkerContext>,
}

impl AppState {
    /// Connects every backend named in the config.
    pub async fn from_config(cfg: &RuntimeConfig) -> anyhow::Result<Self> {
        let storage = cfg.backend.connect().await?;
        let index = cfg.database.connect().await?;
        let keys = cfg.secret.build()?;

        let workers = Arc::new(WorkerContext {
            storage,
            index,
            keys,
            settings: cfg.settings.clone(),
        });

        let transport: Arc<dyn WorkerTransport> = match &cfg.workers {
            TransportConfig::Local => Arc::new(LocalTransport::new(workers.clone())),
            TransportConfig::Http { base_url, timeout_secs } => {
                Arc::new(HttpTransport::new(base_url, timeout_secs.map(Duration::from_secs))?)
            },
        };

        Ok(Self {
            invoker: WorkerInvoker::new(transport),
            workers,
        })
    }
}

pub fn api(state: Arc<AppState>) -> impl Endpoint {
    let v1 = Route::new()
        .at("/photos/upload", post(upload))
        .at("/photos/delete", post(delete))
        .at("/workers/:name", post(invoke_worker));

    Route::new().nest("/v1", v1).data(state)
}

/// Upload a photo.
///
/// Stores the record, the original and a thumbnail, reporting each activity.
#[handler]
async fn upload(body: String, state: Data<&Arc<AppState>>) -> Response {
    into_response(UPLOAD.run(&state.invoker, &body).await)
}

/// Delete a photo, its record and its thumbnail.
#[handler]
async fn delete(body: String, state: Data<&Arc<AppState>>) -> Response {
    into_response(DELETE.run(&state.invoker, &body).await)
}

/// Invoke a single worker directly.
#[handler]
async fn invoke_worker(
    Path(name): Path<String>,
    body: String,
    state: Data<&Arc<AppState>>,
) -> Response {
    let worker = match WorkerName::from_str(&name) {
        Ok(worker) => worker,
        Err(_) => {
            let resp = GatewayResponse::json(404, &json!({ "error": format!("Unknown worker: {}", name) }));
            return into_response(resp);
        },
    };

    into_response(workers::dispatch(&state.workers, worker, &body).await)
}

fn into_response(resp: GatewayResponse) -> Response {
    let status = StatusCode::from_u16(resp.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let content_type = match resp.content_type() {
        Some(content_type) => content_type.to_string(),
        None if resp.body.starts_with('{') || resp.body.starts_with('[') => {
            mime::APPLICATION_JSON.to_string()
        },
        None => mime::TEXT_PLAIN_UTF_8.to_string(),
    };

    Response::builder()
        .status(status)
        .content_type(content_type)
        .body(resp.body)
}
