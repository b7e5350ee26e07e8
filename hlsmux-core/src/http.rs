// HTTP adapter over the retrieval API
//
// Routes:
// - GET /index.m3u8                multivariant playlist
// - GET /stream.m3u8               media playlist (_HLS_msn, _HLS_part, _HLS_skip)
// - GET /{prefix}_init.mp4         initialization file
// - GET /{prefix}_seg{id}.mp4      segment
// - GET /{prefix}_part{id}.mp4     part
//
// Blocking playlist reload and preload-hinted part requests wait here, in the
// HTTP layer, by polling the store until the requested entry exists or the
// configured timeout elapses. The store itself never blocks.

use crate::config::HttpConfig;
use crate::error::MuxerError;
use crate::muxer::MuxerServer;
use crate::naming::{self, NameKind};
use crate::playlist::Variant;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const MEDIA_CONTENT_TYPE: &str = "video/mp4";

/// HTTP server state
#[derive(Clone)]
struct HlsState {
    muxer: Arc<MuxerServer>,
    config: Arc<HttpConfig>,
}

/// Build the router serving one muxer
pub fn router(muxer: Arc<MuxerServer>, config: HttpConfig) -> Router {
    let state = HlsState {
        muxer,
        config: Arc::new(config),
    };

    Router::new()
        .route("/index.m3u8", get(serve_index))
        .route("/stream.m3u8", get(serve_playlist))
        .route("/{file}", get(serve_file))
        .with_state(state)
}

/// HTTP error with status code
#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl From<MuxerError> for HttpError {
    fn from(err: MuxerError) -> Self {
        match err {
            MuxerError::NotFound(name) => Self::not_found(format!("{name} not found")),
            MuxerError::Name(e) => Self::not_found(e.to_string()),
            MuxerError::GenerationFailed(e) => {
                tracing::error!("Generation failed: {}", e);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Generation failed")
            }
            MuxerError::Storage(e) => {
                tracing::warn!("Storage error: {}", e);
                Self::unavailable("Storage temporarily unavailable")
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlaylistQuery {
    #[serde(rename = "_HLS_msn")]
    msn: Option<u64>,
    #[serde(rename = "_HLS_part")]
    part: Option<u64>,
    #[serde(rename = "_HLS_skip")]
    skip: Option<String>,
}

fn playlist_response(body: Bytes) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

fn media_response(body: Bytes) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, MEDIA_CONTENT_TYPE),
            (header::CACHE_CONTROL, "public, max-age=60"),
        ],
        body,
    )
        .into_response()
}

/// Poll `ready` until it holds or the blocking timeout elapses
async fn wait_until<F>(config: &HttpConfig, mut ready: F) -> bool
where
    F: FnMut() -> bool,
{
    let poll = async {
        let mut interval = tokio::time::interval(config.block_poll_interval());
        loop {
            interval.tick().await;
            if ready() {
                break;
            }
        }
    };

    tokio::time::timeout(config.block_timeout(), poll).await.is_ok()
}

async fn serve_index(State(state): State<HlsState>) -> Response {
    playlist_response(state.muxer.index())
}

async fn serve_playlist(
    State(state): State<HlsState>,
    Query(query): Query<PlaylistQuery>,
) -> Result<Response, HttpError> {
    let muxer = &state.muxer;

    match (query.msn, query.part) {
        (Some(msn), part) => {
            if muxer.variant() != Variant::LowLatency {
                return Err(HttpError::bad_request("Blocking reload is not supported"));
            }

            // Clients may only block on the next two segments
            let next_msn = muxer.store().next_media_sequence();
            if msn > next_msn + 2 {
                return Err(HttpError::bad_request("_HLS_msn is too far in the future"));
            }

            let store = muxer.store();
            if !wait_until(&state.config, || store.has_media_sequence(msn, part)).await {
                tracing::debug!(msn, ?part, "Blocking playlist reload timed out");
                return Err(HttpError::unavailable("Timed out waiting for segment"));
            }
        }
        (None, Some(_)) => {
            return Err(HttpError::bad_request("_HLS_part requires _HLS_msn"));
        }
        (None, None) => {}
    }

    let is_delta_update = matches!(query.skip.as_deref(), Some("YES" | "v2"));
    let body = muxer.playlist(is_delta_update)?;

    Ok(playlist_response(body))
}

async fn serve_file(
    State(state): State<HlsState>,
    Path(file): Path<String>,
) -> Result<Response, HttpError> {
    let muxer = &state.muxer;

    if file == naming::init_file_name(muxer.prefix()) {
        let body = muxer.init_file().await?;
        return Ok(media_response(body));
    }

    let (kind, id) = naming::decode(&file).map_err(MuxerError::from)?;

    // Only names this muxer could have generated
    if file != naming::encode(muxer.prefix(), kind, id) {
        return Err(HttpError::not_found(format!("{file} not found")));
    }

    let body = match kind {
        NameKind::Segment => muxer.segment(id).await?,
        NameKind::Part => {
            // Sampled before the lookup: the writer may append this very part
            // while the lookup is in flight
            let hinted = id == muxer.store().next_part_id();
            read_part(&state, id, hinted).await?
        }
    };

    Ok(media_response(body))
}

/// Read a part, waiting for it when it is the one advertised by the preload
/// hint and has not been produced yet
async fn read_part(state: &HlsState, id: u64, hinted: bool) -> Result<Bytes, HttpError> {
    let muxer = &state.muxer;

    match muxer.part(id).await {
        Err(MuxerError::NotFound(_)) if hinted => {
            let store = muxer.store();
            if !wait_until(&state.config, || store.resolve(NameKind::Part, id).is_some()).await {
                return Err(HttpError::unavailable("Timed out waiting for part"));
            }
            Ok(muxer.part(id).await?)
        }
        result => Ok(result?),
    }
}
