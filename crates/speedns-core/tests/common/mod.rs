//! Test doubles and common utilities for contract tests
//!
//! - [`MockZoneApi`]: in-memory zone that records every call and can be told
//!   to fail specific operations
//! - [`MockZoneApiFactory`]: hands out clones of one [`MockZoneApi`]
//! - [`TestEnv`]: a temporary data directory wired to a [`RunCoordinator`]
//! - [`fake_tool`]: shell script standing in for the measurement executable

#![allow(dead_code)]

use speedns_core::error::{Error, Result};
use speedns_core::traits::{DnsRecord, NewRecord, ZoneApi, ZoneApiFactory};
use speedns_core::{ApiCredentials, ConfigStore, DataLayout, LogSink, RunConfig, RunCoordinator};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// One call received by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ZoneName,
    List(String),
    Delete(String),
    Create {
        name: String,
        record_type: String,
        content: String,
    },
}

#[derive(Debug, Default)]
struct MockState {
    zone: String,
    records: Vec<DnsRecord>,
    calls: Vec<ApiCall>,
    zone_lookup_fails: bool,
    failing_lists: HashSet<String>,
    failing_deletes: HashSet<String>,
    failing_creates: HashSet<String>,
}

/// In-memory zone API
///
/// Created names are scoped like a hosted zone: `@` is the apex, names that
/// already end in the zone are kept, anything else gets `.zone` appended.
#[derive(Debug, Clone)]
pub struct MockZoneApi {
    state: Arc<Mutex<MockState>>,
    next_id: Arc<AtomicUsize>,
}

impl MockZoneApi {
    pub fn new(zone: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                zone: zone.to_string(),
                ..Default::default()
            })),
            next_id: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Seed an existing record
    pub fn with_record(self, fqdn: &str, record_type: &str, content: &str) -> Self {
        let id = self.allocate_id();
        self.state.lock().unwrap().records.push(DnsRecord {
            id,
            name: fqdn.to_string(),
            record_type: record_type.to_string(),
            content: content.to_string(),
        });
        self
    }

    pub fn fail_zone_lookup(self) -> Self {
        self.state.lock().unwrap().zone_lookup_fails = true;
        self
    }

    pub fn fail_list_for(self, fqdn: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_lists
            .insert(fqdn.to_string());
        self
    }

    pub fn fail_delete_of(self, record_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(record_id.to_string());
        self
    }

    pub fn fail_create_for(self, content: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_creates
            .insert(content.to_string());
        self
    }

    /// Every call, in order
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Create calls, in order
    pub fn creates(&self) -> Vec<(String, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Create {
                    name,
                    record_type,
                    content,
                } => Some((name, record_type, content)),
                _ => None,
            })
            .collect()
    }

    /// Delete calls, in order
    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Ids of the records currently stored under `fqdn`
    pub fn ids_for(&self, fqdn: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.name.eq_ignore_ascii_case(fqdn))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Sorted (type, content) pairs currently stored under `fqdn`
    pub fn records_for(&self, fqdn: &str) -> Vec<(String, String)> {
        let mut records: Vec<(String, String)> = self
            .state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.name.eq_ignore_ascii_case(fqdn))
            .map(|r| (r.record_type.clone(), r.content.clone()))
            .collect();
        records.sort();
        records
    }

    /// Sorted (name, type, content) of the whole zone
    pub fn snapshot(&self) -> Vec<(String, String, String)> {
        let mut all: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .records
            .iter()
            .map(|r| (r.name.clone(), r.record_type.clone(), r.content.clone()))
            .collect();
        all.sort();
        all
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn allocate_id(&self) -> String {
        format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn scoped_name(zone: &str, name: &str) -> String {
        if zone.is_empty() {
            return name.to_string();
        }
        if name == "@" {
            return zone.to_string();
        }
        let lower = name.to_ascii_lowercase();
        let zone_lower = zone.to_ascii_lowercase();
        if lower == zone_lower || lower.ends_with(&format!(".{}", zone_lower)) {
            name.to_string()
        } else {
            format!("{}.{}", name, zone)
        }
    }
}

#[async_trait::async_trait]
impl ZoneApi for MockZoneApi {
    async fn zone_name(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::ZoneName);
        if state.zone_lookup_fails {
            return Err(Error::provider("mock", "zone lookup refused"));
        }
        Ok(state.zone.clone())
    }

    async fn list_records(&self, fqdn: &str) -> Result<Vec<DnsRecord>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::List(fqdn.to_string()));
        if state.failing_lists.contains(fqdn) {
            return Err(Error::provider("mock", "list refused"));
        }
        Ok(state
            .records
            .iter()
            .filter(|r| r.name.eq_ignore_ascii_case(fqdn))
            .cloned()
            .collect())
    }

    async fn delete_record(&self, record_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::Delete(record_id.to_string()));
        if state.failing_deletes.contains(record_id) {
            return Err(Error::provider("mock", "delete refused"));
        }
        let before = state.records.len();
        state.records.retain(|r| r.id != record_id);
        if state.records.len() == before {
            return Err(Error::not_found(record_id.to_string()));
        }
        Ok(())
    }

    async fn create_record(&self, record: &NewRecord) -> Result<String> {
        let id = self.allocate_id();
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::Create {
            name: record.name.clone(),
            record_type: record.record_type.to_string(),
            content: record.content.clone(),
        });
        if state.failing_creates.contains(&record.content) {
            return Err(Error::provider("mock", "create refused"));
        }
        let name = Self::scoped_name(&state.zone, &record.name);
        state.records.push(DnsRecord {
            id: id.clone(),
            name,
            record_type: record.record_type.to_string(),
            content: record.content.clone(),
        });
        Ok(id)
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Factory handing out clones of one mock
pub struct MockZoneApiFactory {
    api: MockZoneApi,
    created: AtomicUsize,
}

impl MockZoneApiFactory {
    pub fn new(api: MockZoneApi) -> Self {
        Self {
            api,
            created: AtomicUsize::new(0),
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ZoneApiFactory for MockZoneApiFactory {
    fn create(&self, _credentials: &ApiCredentials) -> Result<Box<dyn ZoneApi>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.api.clone()))
    }
}

/// Open a sink in `dir`
pub async fn sink_in(dir: &TempDir) -> LogSink {
    let (sink, _writer) = LogSink::open(dir.path().join("app.log"))
        .await
        .expect("log sink opens");
    sink
}

/// Lines of the sink, flushed
pub async fn log_text(sink: &LogSink) -> String {
    sink.read_from(0).await.expect("log is readable").text
}

/// Shell script standing in for the measurement executable
///
/// Records its arguments in `args.txt` (relative to its working directory),
/// prints a line to each stream, optionally sleeps, writes `rows` under a
/// header to the `-o` path, and exits with `exit_code`.
pub fn fake_tool(rows: &[&str], exit_code: i32, sleep_secs: u32) -> String {
    let mut script = String::from("#!/bin/sh\n");
    script.push_str("echo \"$*\" > args.txt\n");
    script.push_str("out=\"\"\n");
    script.push_str(
        "while [ $# -gt 0 ]; do\n  case \"$1\" in\n    -o) out=\"$2\"; shift 2 ;;\n    *) shift ;;\n  esac\ndone\n",
    );
    script.push_str("echo \"testing endpoints\"\n");
    script.push_str("echo \"progress on stderr\" >&2\n");
    if sleep_secs > 0 {
        script.push_str(&format!("sleep {}\n", sleep_secs));
    }
    script.push_str("cat > \"$out\" <<'CSV'\n");
    script.push_str("IP,Sent,Received,Loss,Latency,Speed\n");
    for row in rows {
        script.push_str(row);
        script.push('\n');
    }
    script.push_str("CSV\n");
    script.push_str(&format!("exit {}\n", exit_code));
    script
}

/// A ranked result row for `ip`
pub fn row(ip: &str) -> String {
    format!("{},4,4,0.00,120.00,10.00", ip)
}

/// Temporary data directory wired to a coordinator
pub struct TestEnv {
    pub dir: TempDir,
    pub layout: DataLayout,
    pub api: MockZoneApi,
    pub factory: Arc<MockZoneApiFactory>,
    pub coordinator: Arc<RunCoordinator>,
}

impl TestEnv {
    /// Environment with `config` saved and both endpoint pools present
    pub async fn new(api: MockZoneApi, config: RunConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = DataLayout::new(dir.path());

        std::fs::write(layout.ipv4_list(), "104.16.0.0/13\n").expect("write v4 pool");
        std::fs::write(layout.ipv6_list(), "2606:4700::/32\n").expect("write v6 pool");

        let store = ConfigStore::open(layout.config_file())
            .await
            .expect("config store opens");
        store.replace(config).await.expect("config saved");

        let (sink, _writer) = LogSink::open(layout.log_file())
            .await
            .expect("log sink opens");

        let factory = Arc::new(MockZoneApiFactory::new(api.clone()));
        let coordinator = Arc::new(RunCoordinator::new(
            store,
            layout.clone(),
            sink,
            factory.clone(),
        ));

        Self {
            dir,
            layout,
            api,
            factory,
            coordinator,
        }
    }

    /// Install the fake measurement executable
    pub fn install_tool(&self, script: &str) {
        std::fs::write(self.layout.executable(), script).expect("write tool");
    }

    /// Arguments the fake tool was last called with
    pub fn tool_args(&self) -> Option<String> {
        std::fs::read_to_string(self.layout.data_dir().join("args.txt"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    pub async fn log(&self) -> String {
        log_text(self.coordinator.sink()).await
    }
}

/// Configuration with credentials and the given domains
pub fn config_for(domains: &str) -> RunConfig {
    let mut config = RunConfig::new();
    config.credentials = ApiCredentials::new("zone-123", "key-abc", "ops@example.com");
    config.main_domain = "example.com".to_string();
    config.domains = domains.to_string();
    config
}
