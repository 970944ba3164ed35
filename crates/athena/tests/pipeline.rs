//! End-to-end phase tests: in-memory shares, a static name service, loopback
//! probing and a real SQLite store.

use async_trait::async_trait;
use athena::discovery::NameService;
use athena::smb::memory::{MemoryShare, MemoryTransport};
use athena::smb::ProtocolErrorKind;
use athena::{AthenaConfig, Phase, PhaseQueue, Pipeline, SearchService};
use athena_db::{AthenaDb, FileEntry, Repository};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

const LOOPBACK: &str = "127.0.0.1";

struct StaticNames(HashMap<IpAddr, String>);

#[async_trait]
impl NameService for StaticNames {
    async fn reverse(&self, addr: IpAddr) -> Option<String> {
        self.0.get(&addr).cloned()
    }
}

fn loopback() -> IpAddr {
    LOOPBACK.parse().unwrap()
}

fn names(name: &str) -> Arc<StaticNames> {
    Arc::new(StaticNames(HashMap::from([(loopback(), name.to_string())])))
}

struct Harness {
    _tmp: TempDir,
    db: AthenaDb,
    config: AthenaConfig,
    /// Keeps the probe port open
    _listener: Option<TcpListener>,
}

impl Harness {
    async fn new(online: bool) -> Self {
        let tmp = TempDir::new().unwrap();
        let db = AthenaDb::open(tmp.path().join("athena.sqlite3")).await.unwrap();

        let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut config = AthenaConfig::default();
        config.database_path = tmp.path().join("athena.sqlite3");
        config.discovery.range = format!("{LOOPBACK}/32");
        config.discovery.port = port;
        config.discovery.probe_timeout_ms = 300;
        config.discovery.probe_attempts = 1;
        config.smb.batch_size = 2;
        config.pools.index = 2;

        Self {
            _tmp: tmp,
            db,
            config,
            _listener: online.then_some(listener),
        }
    }

    fn pipeline(&self, transport: MemoryTransport, hostname: &str) -> Pipeline {
        Pipeline::new(&self.config, Arc::new(self.db.clone()), Arc::new(transport), names(hostname))
    }

    /// Record the loopback host with one share, bypassing discovery
    async fn seed_share(&self, share: &str) -> i64 {
        let host_id = self.db.upsert_host(LOOPBACK, "nas").await.unwrap();
        self.db.upsert_share(host_id, share).await.unwrap()
    }

    async fn files(&self, share_id: i64) -> Vec<FileEntry> {
        let mut entries: Vec<FileEntry> = self
            .db
            .list_files(share_id)
            .await
            .unwrap()
            .iter()
            .map(|record| record.entry())
            .collect();
        entries.sort_by(|a, b| (&a.path, &a.filename).cmp(&(&b.path, &b.filename)));
        entries
    }
}

fn sample_tree() -> MemoryShare {
    MemoryShare::new()
        .file("a.txt", 100)
        .file("sub\\b.bin", 50)
        .file("sub\\c.bin", 25)
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_discovery_records_host_and_visible_shares() {
    let harness = Harness::new(true).await;
    let transport = MemoryTransport::new()
        .share(loopback(), "public", MemoryShare::new())
        .share(loopback(), "ADMIN$", MemoryShare::new());
    let pipeline = harness.pipeline(transport, "NAS.Local");

    let summary = pipeline.discover_new_hosts().await.unwrap();
    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.recorded, 1);

    // Running again changes nothing
    pipeline.discover_new_hosts().await.unwrap();

    let hosts = harness.db.list_hosts_with_shares().await.unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].ip, LOOPBACK);
    assert_eq!(hosts[0].hostname, "nas.local");
    let shares: Vec<&str> = hosts[0].shares.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(shares, vec!["public"]);
}

#[tokio::test]
async fn test_minimized_discovery_skips_offline_unresolved_and_shareless_hosts() {
    // Offline
    let harness = Harness::new(false).await;
    let transport = MemoryTransport::new().share(loopback(), "public", MemoryShare::new());
    harness.pipeline(transport, "nas").discover_new_hosts().await.unwrap();
    assert!(harness.db.list_hosts().await.unwrap().is_empty());

    // Online but without a reverse name
    let harness = Harness::new(true).await;
    let transport = MemoryTransport::new().share(loopback(), "public", MemoryShare::new());
    let pipeline = Pipeline::new(
        &harness.config,
        Arc::new(harness.db.clone()),
        Arc::new(transport),
        Arc::new(StaticNames(HashMap::new())),
    );
    pipeline.discover_new_hosts().await.unwrap();
    assert!(harness.db.list_hosts().await.unwrap().is_empty());

    // Online, named, but only administrative shares
    let harness = Harness::new(true).await;
    let transport = MemoryTransport::new().share(loopback(), "C$", MemoryShare::new());
    harness.pipeline(transport, "nas").discover_new_hosts().await.unwrap();
    assert!(harness.db.list_hosts().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_discovery_without_minimize() {
    // Silent on the probe port but still exposing shares
    let mut harness = Harness::new(false).await;
    harness.config.discovery.minimize = false;
    let transport = MemoryTransport::new().share(loopback(), "public", MemoryShare::new());
    harness.pipeline(transport, "nas").discover_new_hosts().await.unwrap();
    assert_eq!(harness.db.list_hosts().await.unwrap().len(), 1);

    // Answering the probe with no shares at all
    let mut harness = Harness::new(true).await;
    harness.config.discovery.minimize = false;
    let transport = MemoryTransport::new().refuse_listing(loopback(), ProtocolErrorKind::AccessDenied);
    harness.pipeline(transport, "nas").discover_new_hosts().await.unwrap();
    let hosts = harness.db.list_hosts_with_shares().await.unwrap();
    assert_eq!(hosts.len(), 1);
    assert!(hosts[0].shares.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_discovery_records_every_host_of_a_wide_range() {
    let mut harness = Harness::new(false).await;
    harness.config.discovery.range = "127.0.1.1-127.0.1.120".to_string();
    // Keeps the probe from gating so every address reaches the store
    harness.config.discovery.minimize = false;

    let mut transport = MemoryTransport::new();
    let mut names = HashMap::new();
    for last in 1..=120u8 {
        let addr: IpAddr = format!("127.0.1.{last}").parse().unwrap();
        transport = transport.share(addr, "public", MemoryShare::new());
        names.insert(addr, format!("host-{last}"));
    }
    let pipeline = Pipeline::new(
        &harness.config,
        Arc::new(harness.db.clone()),
        Arc::new(transport),
        Arc::new(StaticNames(names)),
    );

    let summary = pipeline.discover_new_hosts().await.unwrap();
    assert_eq!(summary.candidates, 120);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.recorded, 120);

    let hosts = harness.db.list_hosts_with_shares().await.unwrap();
    assert_eq!(hosts.len(), 120);
    assert!(hosts.iter().all(|h| h.shares.len() == 1));
}

#[tokio::test]
async fn test_ping_refreshes_only_online_hosts() {
    let harness = Harness::new(true).await;
    let host_id = harness.db.upsert_host(LOOPBACK, "nas").await.unwrap();
    let stale = harness.db.upsert_host("127.0.0.2", "gone").await.unwrap();
    let before = harness.db.list_hosts().await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let summary = harness
        .pipeline(MemoryTransport::new(), "nas")
        .ping_known_hosts()
        .await
        .unwrap();
    assert_eq!(summary.known, 2);

    let after = harness.db.list_hosts().await.unwrap();
    assert!(last_seen(&after, host_id) > last_seen(&before, host_id));
    // Nothing listens on 127.0.0.2
    assert_eq!(summary.online, 1);
    assert_eq!(last_seen(&after, stale), last_seen(&before, stale));
}

fn last_seen(hosts: &[athena_db::Host], id: i64) -> chrono::DateTime<chrono::Utc> {
    hosts.iter().find(|h| h.id == id).unwrap().last_seen
}

// ============================================================================
// Indexing
// ============================================================================

#[tokio::test]
async fn test_index_aggregates_sizes() {
    let harness = Harness::new(true).await;
    let share_id = harness.seed_share("public").await;
    let transport = MemoryTransport::new().share(loopback(), "public", sample_tree());

    let summary = harness.pipeline(transport, "nas").index_known_hosts().await.unwrap();
    assert_eq!(summary.indexed, 1);

    let share = harness.db.get_share(share_id).await.unwrap().unwrap();
    assert_eq!((share.size, share.file_count), (175, 3));

    assert_eq!(
        harness.files(share_id).await,
        vec![
            FileEntry::file("", "a.txt", 100),
            FileEntry::directory("", "sub", 75),
            FileEntry::file("sub\\", "b.bin", 50),
            FileEntry::file("sub\\", "c.bin", 25),
        ]
    );

    let history = harness.db.host_history(share.host_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!((history[0].size, history[0].file_count), (175, 3));
}

#[tokio::test]
async fn test_reindex_replaces_files() {
    let harness = Harness::new(true).await;
    let share_id = harness.seed_share("public").await;

    let first = MemoryTransport::new().share(loopback(), "public", sample_tree());
    harness.pipeline(first, "nas").index_known_hosts().await.unwrap();

    let second = MemoryTransport::new().share(loopback(), "public", MemoryShare::new().file("only.txt", 7));
    harness.pipeline(second, "nas").index_known_hosts().await.unwrap();

    assert_eq!(harness.files(share_id).await, vec![FileEntry::file("", "only.txt", 7)]);
    let share = harness.db.get_share(share_id).await.unwrap().unwrap();
    assert_eq!((share.size, share.file_count), (7, 1));
}

#[tokio::test]
async fn test_unreadable_subdirectory_degrades_gracefully() {
    let harness = Harness::new(true).await;
    let share_id = harness.seed_share("public").await;
    let tree = sample_tree().deny("sub\\private", ProtocolErrorKind::AccessDenied);
    let transport = MemoryTransport::new().share(loopback(), "public", tree);

    harness.pipeline(transport, "nas").index_known_hosts().await.unwrap();

    let share = harness.db.get_share(share_id).await.unwrap().unwrap();
    assert_eq!((share.size, share.file_count), (175, 3));
    assert!(harness
        .files(share_id)
        .await
        .contains(&FileEntry::directory("sub\\", "private", 0)));
}

#[tokio::test]
async fn test_unreachable_share_keeps_previous_index() {
    let harness = Harness::new(true).await;
    let share_id = harness.seed_share("public").await;

    let first = MemoryTransport::new().share(loopback(), "public", sample_tree());
    harness.pipeline(first, "nas").index_known_hosts().await.unwrap();

    let locked = MemoryShare::new().refuse(ProtocolErrorKind::AuthFailure);
    let second = MemoryTransport::new().share(loopback(), "public", locked);
    let summary = harness.pipeline(second, "nas").index_known_hosts().await.unwrap();
    assert_eq!(summary.indexed, 0);

    assert_eq!(harness.files(share_id).await.len(), 4);
    let share = harness.db.get_share(share_id).await.unwrap().unwrap();
    assert_eq!((share.size, share.file_count), (175, 3));
    // No new history point for a host with nothing indexed
    assert_eq!(harness.db.host_history(share.host_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_share_with_unlistable_root_keeps_previous_index() {
    let harness = Harness::new(true).await;
    let share_id = harness.seed_share("public").await;

    let first = MemoryTransport::new().share(loopback(), "public", sample_tree());
    harness.pipeline(first, "nas").index_known_hosts().await.unwrap();

    let stalled = MemoryShare::new().deny("", ProtocolErrorKind::Timeout);
    let second = MemoryTransport::new().share(loopback(), "public", stalled);
    let summary = harness.pipeline(second, "nas").index_known_hosts().await.unwrap();
    assert_eq!(summary.indexed, 0);

    assert_eq!(harness.files(share_id).await.len(), 4);
    let share = harness.db.get_share(share_id).await.unwrap().unwrap();
    assert_eq!((share.size, share.file_count), (175, 3));
}

// ============================================================================
// Post-processing, search and scheduling
// ============================================================================

#[tokio::test]
async fn test_full_discovery_through_the_queue() {
    let harness = Harness::new(true).await;
    let tree = MemoryShare::new()
        .file("Holiday Photos\\beach.jpg", 300)
        .file("holiday-plan.odt", 20)
        .file("taxes.pdf", 80);
    let transport = MemoryTransport::new().share(loopback(), "media", tree);
    let repo: Arc<dyn Repository> = Arc::new(harness.db.clone());
    let pipeline = Pipeline::new(&harness.config, repo.clone(), Arc::new(transport), names("nas"));

    let queue = PhaseQueue::start(Arc::new(pipeline), repo.clone());
    for rx in queue.enqueue_all(&Phase::FULL_DISCOVERY).unwrap() {
        let outcome = rx.await.unwrap();
        assert!(outcome.is_success(), "{:?}", outcome.error);
    }
    queue.shutdown().await;

    for phase in Phase::FULL_DISCOVERY {
        assert_eq!(harness.db.count_scans(phase.as_str()).await.unwrap(), 1);
    }
    assert_eq!(harness.db.count_scans("ping_known_hosts").await.unwrap(), 0);

    let keywords = harness.db.keywords(1).await.unwrap();
    assert_eq!(keywords[0].keyword, "holiday");
    assert_eq!(keywords[0].count, 2);

    let service = SearchService::new(repo, 100);
    let hits = service.search("holiday", 0, 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].full_path, "\\\\nas\\media\\Holiday Photos");

    let stats = service.get_statistics().await.unwrap();
    assert!(stats.last_full_scan.is_some());
    assert_eq!(stats.hosts[0].shares[0].size, 400);
    assert_eq!(stats.hosts[0].shares[0].file_count, 3);
}
