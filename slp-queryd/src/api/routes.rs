use std::collections::HashMap;
use std::sync::Arc;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::sync::watch;
use shared::types::{ServiceRecord, TypeDescriptor, WatchedRecord};
use slp_query::{DiscoveryClient, QueryParams, SlpError, SlpServices};
use crate::config::WatchConfig;
use crate::store_manager::StoreHandle;

pub struct AppState<C> {
    pub services: Arc<SlpServices<C>>,
    pub store: StoreHandle,
    pub hash_rx: watch::Receiver<String>,
    pub watches: Arc<Vec<WatchConfig>>,
    pub poll_interval_secs: u64,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
            store: self.store.clone(),
            hash_rx: self.hash_rx.clone(),
            watches: self.watches.clone(),
            poll_interval_secs: self.poll_interval_secs,
        }
    }
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub watches: Vec<String>,
    pub poll_interval_secs: u64,
}

pub fn router<C>(state: AppState<C>) -> Router
where
    C: DiscoveryClient + Send + Sync + 'static,
{
    Router::new()
        .route("/v1/config", get(get_config::<C>))
        .route("/v1/types", get(get_types::<C>))
        .route("/v1/services/:service", get(get_services::<C>))
        .route("/v1/services/:service/first", get(get_first_service::<C>))
        .route("/v1/watches", get(get_watched::<C>))
        .route("/v1/watches/hash", get(get_hash::<C>))
        .route("/v1/watches/:name", get(get_watch::<C>))
        .with_state(state)
}

fn status_for(error: &SlpError) -> StatusCode {
    match error {
        SlpError::InvalidPattern { .. } => StatusCode::BAD_REQUEST,
        SlpError::Discovery { .. }
        | SlpError::DnsResolutionFailure { .. }
        | SlpError::MalformedServiceType { .. }
        | SlpError::MalformedServiceUrl { .. } => StatusCode::BAD_GATEWAY,
    }
}

/// Run a blocking facade call off the async workers.
async fn blocking<C, T, F>(services: &Arc<SlpServices<C>>, query: F) -> Result<T, StatusCode>
where
    C: DiscoveryClient + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&SlpServices<C>) -> slp_query::Result<T> + Send + 'static,
{
    let services = services.clone();
    tokio::task::spawn_blocking(move || query(services.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!("Query task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            tracing::error!("Query failed: {}", e);
            status_for(&e)
        })
}

async fn get_config<C>(State(state): State<AppState<C>>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        watches: state.watches.iter().map(|w| w.name.clone()).collect(),
        poll_interval_secs: state.poll_interval_secs,
    })
}

async fn get_types<C>(
    State(state): State<AppState<C>>,
) -> Result<Json<Vec<TypeDescriptor>>, StatusCode>
where
    C: DiscoveryClient + Send + Sync + 'static,
{
    blocking(&state.services, |services| services.types())
        .await
        .map(Json)
}

async fn get_services<C>(
    State(state): State<AppState<C>>,
    Path(service): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Vec<ServiceRecord>>, StatusCode>
where
    C: DiscoveryClient + Send + Sync + 'static,
{
    let params = QueryParams::from_map(query);
    blocking(&state.services, move |services| services.all(&service, &params))
        .await
        .map(Json)
}

async fn get_first_service<C>(
    State(state): State<AppState<C>>,
    Path(service): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ServiceRecord>, StatusCode>
where
    C: DiscoveryClient + Send + Sync + 'static,
{
    let params = QueryParams::from_map(query);
    blocking(&state.services, move |services| services.find(&service, &params))
        .await?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_watched<C>(
    State(state): State<AppState<C>>,
) -> Result<Json<Vec<WatchedRecord>>, StatusCode> {
    state.store.get_all().await.map(Json).map_err(|e| {
        tracing::error!("Failed to query watched records: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn get_hash<C>(State(state): State<AppState<C>>) -> String {
    state.hash_rx.borrow().clone()
}

async fn get_watch<C>(
    State(state): State<AppState<C>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<WatchedRecord>>, StatusCode> {
    if !state.watches.iter().any(|w| w.name == name) {
        return Err(StatusCode::NOT_FOUND);
    }

    state.store.get_watch(name).await.map(Json).map_err(|e| {
        tracing::error!("Failed to query watch: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use slp_query::{DnsReverseCache, MemoryDiscovery, ReverseResolver};
    use crate::store::db::WatchDb;
    use crate::store_manager::poll_watch;

    struct EchoResolver;

    impl ReverseResolver for EchoResolver {
        fn reverse(&self, ip: IpAddr) -> std::io::Result<String> {
            Ok(format!("host-{}", ip))
        }
    }

    fn main_watch() -> WatchConfig {
        WatchConfig {
            name: "main".to_string(),
            service: "ldap".to_string(),
            scope: String::new(),
            protocol: None,
            criteria: [("desc".to_string(), "main".to_string())].into(),
        }
    }

    fn test_state(discovery: MemoryDiscovery) -> AppState<MemoryDiscovery> {
        let (hash_tx, hash_rx) = watch::channel(String::new());
        AppState {
            services: Arc::new(SlpServices::new(
                discovery,
                Arc::new(DnsReverseCache::with_resolver(EchoResolver)),
            )),
            store: StoreHandle::spawn(WatchDb::open(":memory:").unwrap(), hash_tx),
            hash_rx,
            watches: Arc::new(vec![main_watch()]),
            poll_interval_secs: 60,
        }
    }

    fn directory() -> MemoryDiscovery {
        MemoryDiscovery::new()
            .with_service("service:ldap://10.0.0.1:389", &[("desc", "backup")])
            .with_service("service:ldap://10.0.0.2:389", &[("desc", "main")])
            .with_service("service:printer:lpr://10.0.0.5:515/q", &[])
    }

    async fn get(state: AppState<MemoryDiscovery>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_all_services_with_criteria() {
        let (status, body) = get(test_state(directory()), "/v1/services/ldap?desc=MAIN").await;
        assert_eq!(status, StatusCode::OK);
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["ip"], "10.0.0.2");
        assert_eq!(records[0]["host"], "host-10.0.0.2");
    }

    #[tokio::test]
    async fn test_protocol_query_parameter() {
        let (status, body) = get(test_state(directory()), "/v1/services/printer?protocol=lpr").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["slp_type"], "service:printer:lpr");
    }

    #[tokio::test]
    async fn test_first_service() {
        let (status, body) = get(test_state(directory()), "/v1/services/ldap/first").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ip"], "10.0.0.1");

        let (status, _) = get(test_state(directory()), "/v1/services/ldap/first?desc=none").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_bad_request() {
        let (status, _) = get(test_state(directory()), "/v1/services/ldap?desc=%5B").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_provider_failure_is_bad_gateway() {
        let state = test_state(directory().failing_attributes());
        let (status, _) = get(state, "/v1/services/ldap").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_types() {
        let (status, body) = get(test_state(directory()), "/v1/types").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[1]["name"], "printer");
        assert_eq!(body[1]["protocol"], "lpr");
    }

    #[tokio::test]
    async fn test_config_lists_watches() {
        let (status, body) = get(test_state(directory()), "/v1/config").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["watches"][0], "main");
        assert_eq!(body["poll_interval_secs"], 60);
    }

    #[tokio::test]
    async fn test_watch_records() {
        let state = test_state(directory());
        poll_watch(&state.services, &state.store, &main_watch()).await.unwrap();

        let (status, body) = get(state.clone(), "/v1/watches/main").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["watch"], "main");
        assert_eq!(body[0]["record"]["ip"], "10.0.0.2");
        assert_eq!(body[0]["alive"], true);

        let (status, body) = get(state.clone(), "/v1/watches").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = get(state, "/v1/watches/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_hash_follows_store() {
        let state = test_state(directory());
        let response = router(state.clone())
            .oneshot(Request::builder().uri("/v1/watches/hash").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let before = response.into_body().collect().await.unwrap().to_bytes();
        assert!(before.is_empty());

        poll_watch(&state.services, &state.store, &main_watch()).await.unwrap();
        assert_eq!(state.hash_rx.borrow().len(), 64);
    }
}
