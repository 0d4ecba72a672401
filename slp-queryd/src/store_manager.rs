use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use shared::types::{ServiceRecord, WatchedRecord};
use slp_query::{DiscoveryClient, SlpServices};
use crate::config::{StoreConfig, WatchConfig};
use crate::store::{db::WatchDb, hash};

/// Commands sent to the store thread
pub enum StoreCommand {
    Sync {
        watch: String,
        records: Vec<ServiceRecord>,
        reply: oneshot::Sender<Result<bool>>,
    },
    GetAll(oneshot::Sender<Result<Vec<WatchedRecord>>>),
    GetWatch(String, oneshot::Sender<Result<Vec<WatchedRecord>>>),
    Prune {
        prune_after_secs: u64,
        reply: oneshot::Sender<Result<u64>>,
    },
    Shutdown,
}

/// Handle to interact with the watch database
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

/// Replace the stored view of `watch` with `records`. Returns true if
/// anything changed.
fn sync_watch(db: &WatchDb, watch: &str, records: &[ServiceRecord]) -> Result<bool> {
    let mut changed = false;
    for record in records {
        changed |= db.upsert_record(watch, record)?;
    }
    let live: Vec<String> = records.iter().map(|r| r.slp_url.clone()).collect();
    let gone = db.mark_gone(watch, &live)?;
    Ok(changed || gone > 0)
}

impl StoreHandle {
    /// Spawn a new store thread with the given database
    pub fn spawn(db: WatchDb, hash_tx: watch::Sender<String>) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(256);

        let recompute_hash = |db: &WatchDb, hash_tx: &watch::Sender<String>| {
            match db.get_all_records().and_then(|records| hash::compute_hash(&records)) {
                Ok(hash) => {
                    let _ = hash_tx.send(hash);
                }
                Err(e) => tracing::error!("Failed to recompute store hash: {:#}", e),
            }
        };

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::Sync { watch, records, reply } => {
                        let result = sync_watch(&db, &watch, &records);
                        if matches!(&result, Ok(true)) {
                            recompute_hash(&db, &hash_tx);
                        }
                        let _ = reply.send(result);
                    }
                    StoreCommand::GetAll(reply) => {
                        let _ = reply.send(db.get_all_records());
                    }
                    StoreCommand::GetWatch(watch, reply) => {
                        let _ = reply.send(db.get_watch_records(&watch));
                    }
                    StoreCommand::Prune { prune_after_secs, reply } => {
                        let result = db.prune_stale(prune_after_secs);
                        if matches!(&result, Ok(n) if *n > 0) {
                            recompute_hash(&db, &hash_tx);
                        }
                        let _ = reply.send(result);
                    }
                    StoreCommand::Shutdown => {
                        tracing::info!("Store thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Store the latest results of a watch. Returns true if data changed.
    pub async fn sync(&self, watch: String, records: Vec<ServiceRecord>) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::Sync { watch, records, reply }).await?;
        rx.await?
    }

    /// Get every stored record
    pub async fn get_all(&self) -> Result<Vec<WatchedRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::GetAll(reply)).await?;
        rx.await?
    }

    /// Get the stored records of one watch
    pub async fn get_watch(&self, watch: String) -> Result<Vec<WatchedRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::GetWatch(watch, reply)).await?;
        rx.await?
    }

    /// Delete records not seen within `prune_after_secs`
    pub async fn prune(&self, prune_after_secs: u64) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::Prune { prune_after_secs, reply }).await?;
        rx.await?
    }

    /// Shutdown the store thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(StoreCommand::Shutdown).await?;
        Ok(())
    }
}

/// Run one watch query on the blocking pool and store its results.
pub async fn poll_watch<C>(
    services: &Arc<SlpServices<C>>,
    store: &StoreHandle,
    watch: &WatchConfig,
) -> Result<bool>
where
    C: DiscoveryClient + Send + Sync + 'static,
{
    let query_services = services.clone();
    let service = watch.service.clone();
    let params = watch.params();

    let records = tokio::task::spawn_blocking(move || query_services.all(&service, &params))
        .await
        .context("Watch query task failed")?
        .with_context(|| format!("Watch {} query failed", watch.name))?;

    tracing::debug!("Watch {} returned {} records", watch.name, records.len());
    store.sync(watch.name.clone(), records).await
}

/// Watch loop - re-runs every configured watch each poll interval
pub async fn run<C>(
    services: Arc<SlpServices<C>>,
    store: StoreHandle,
    watches: Vec<WatchConfig>,
    config: StoreConfig,
    cancel: CancellationToken,
) -> Result<()>
where
    C: DiscoveryClient + Send + Sync + 'static,
{
    let mut poll_interval = tokio::time::interval(
        std::time::Duration::from_secs(config.poll_interval_secs)
    );

    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                for watch in &watches {
                    match poll_watch(&services, &store, watch).await {
                        Ok(true) => tracing::info!("Watch {} changed", watch.name),
                        Ok(false) => {}
                        Err(e) => tracing::error!("{:#}", e),
                    }
                }
                match store.prune(config.prune_after_secs).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Pruned {} stale records", n),
                    Err(e) => tracing::error!("Failed to prune records: {}", e),
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Watch loop shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use slp_query::{DnsReverseCache, MemoryDiscovery, ReverseResolver};

    struct EchoResolver;

    impl ReverseResolver for EchoResolver {
        fn reverse(&self, ip: IpAddr) -> std::io::Result<String> {
            Ok(format!("host-{}", ip))
        }
    }

    fn watch(name: &str, service: &str, criteria: &[(&str, &str)]) -> WatchConfig {
        WatchConfig {
            name: name.to_string(),
            service: service.to_string(),
            scope: String::new(),
            protocol: None,
            criteria: criteria
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn services(discovery: MemoryDiscovery) -> Arc<SlpServices<MemoryDiscovery>> {
        Arc::new(SlpServices::new(
            discovery,
            Arc::new(DnsReverseCache::with_resolver(EchoResolver)),
        ))
    }

    #[tokio::test]
    async fn test_poll_watch_stores_matching_records() {
        let (hash_tx, hash_rx) = watch::channel(String::new());
        let store = StoreHandle::spawn(WatchDb::open(":memory:").unwrap(), hash_tx);
        let services = services(
            MemoryDiscovery::new()
                .with_service("service:ldap://10.0.0.1:389", &[("desc", "backup")])
                .with_service("service:ldap://10.0.0.2:389", &[("desc", "main")]),
        );
        let main = watch("main", "ldap", &[("desc", "main")]);

        assert!(poll_watch(&services, &store, &main).await.unwrap());
        assert!(!poll_watch(&services, &store, &main).await.unwrap());

        let stored = store.get_watch("main".to_string()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].record.ip, "10.0.0.2");
        assert_eq!(stored[0].record.host, "host-10.0.0.2");
        assert!(!hash_rx.borrow().is_empty());

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_query_leaves_store_untouched() {
        let (hash_tx, _hash_rx) = watch::channel(String::new());
        let store = StoreHandle::spawn(WatchDb::open(":memory:").unwrap(), hash_tx);
        let services = services(MemoryDiscovery::new().failing_services());

        assert!(poll_watch(&services, &store, &watch("ldap", "ldap", &[])).await.is_err());
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_marks_missing_records_gone() {
        let (hash_tx, _hash_rx) = watch::channel(String::new());
        let store = StoreHandle::spawn(WatchDb::open(":memory:").unwrap(), hash_tx);
        let full = services(
            MemoryDiscovery::new()
                .with_service("service:ldap://10.0.0.1:389", &[])
                .with_service("service:ldap://10.0.0.2:389", &[]),
        );
        let partial = services(MemoryDiscovery::new().with_service("service:ldap://10.0.0.1:389", &[]));
        let ldap = watch("ldap", "ldap", &[]);

        poll_watch(&full, &store, &ldap).await.unwrap();
        assert!(poll_watch(&partial, &store, &ldap).await.unwrap());

        let stored = store.get_watch("ldap".to_string()).await.unwrap();
        let alive: Vec<&str> = stored
            .iter()
            .filter(|r| r.alive)
            .map(|r| r.record.ip.as_str())
            .collect();
        assert_eq!(stored.len(), 2);
        assert_eq!(alive, vec!["10.0.0.1"]);
    }
}
