use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use metrics::counter;
use rekon_apply::{ApplyFilter, KubernetesResource};
use rekon_core::api::{KubernetesApplyStatus, KubernetesDiscovery, RestartOnSpec};
use rekon_core::{zero_time, Config, NamespacedName, TypeMeta};
use rekon_kubehub::{FetchCtx, KubeStore, MemStore, ObjectStore};
use rekon_owners::{EvictionPolicy, OwnerFetcher};
use rekon_restart::{DependencyFetcher, RestartChecker, TriggerQueue};
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rekonctl", version, about = "Rekon dependency and trigger inspector")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace (default: current context)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    /// Read objects from a multi-document YAML file instead of the cluster
    #[arg(long = "fixture", global = true)]
    fixture: Option<PathBuf>,

    /// Deadline for all fetches of one command (overrides REKON_FETCH_TIMEOUT_MS)
    #[arg(long = "timeout-ms", global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the ownership ancestry of an object
    Owners {
        /// GVK key, e.g. "v1/Pod" or "apps/v1/ReplicaSet"
        gvk: String,
        name: String,
    },
    /// Decide whether a target's dependencies ask for a rebuild
    Restart {
        target: String,
        /// FileWatch the target restarts on (repeatable)
        #[arg(long = "file-watch")]
        file_watches: Vec<String>,
        /// UIButton the target restarts on (repeatable)
        #[arg(long = "button")]
        buttons: Vec<String>,
        /// Time of the last build (RFC3339); default: never built
        #[arg(long = "since")]
        since: Option<DateTime<Utc>>,
    },
    /// Show the trigger queue, or one target's place in it
    Queue {
        target: Option<String>,
    },
    /// Build an apply filter from a KubernetesApplyStatus YAML file
    ApplyFilter {
        status: PathBuf,
        /// KubernetesDiscovery YAML whose pods to narrow
        #[arg(long = "discovery")]
        discovery: Option<PathBuf>,
    },
}

fn init_tracing() {
    let env = std::env::var("REKON_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("REKON_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid REKON_METRICS_ADDR; expected host:port");
        }
    }
}

/// "v1/Pod" or "apps/v1/Deployment" into apiVersion and kind.
fn parse_gvk(key: &str) -> Option<TypeMeta> {
    let (api_version, kind) = key.rsplit_once('/')?;
    if api_version.is_empty() || kind.is_empty() || api_version.matches('/').count() > 1 {
        return None;
    }
    Some(TypeMeta::new(api_version, kind))
}

async fn open_store(fixture: Option<&Path>) -> Result<Arc<dyn ObjectStore>> {
    match fixture {
        Some(path) => {
            let yaml = std::fs::read_to_string(path).with_context(|| format!("reading fixture {}", path.display()))?;
            let store = MemStore::from_yaml(&yaml).map_err(|e| anyhow!("loading fixture {}: {}", path.display(), e))?;
            info!(path = %path.display(), objects = store.len(), "fixture store loaded");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(KubeStore::try_default().await?)),
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(v: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let config = Config::from_env();

    let timeout = cli.timeout_ms.map(Duration::from_millis).or(config.fetch_timeout);
    let ctx = match timeout {
        Some(t) => FetchCtx::with_timeout(t),
        None => FetchCtx::new(),
    };
    tokio::spawn({
        let ctx = ctx.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received; canceling fetches");
                ctx.cancel();
            }
        }
    });

    let t0 = Instant::now();
    counter!("cli_commands", 1u64);
    match cli.command {
        Commands::Owners { gvk, name } => {
            let types = parse_gvk(&gvk).ok_or_else(|| anyhow!("invalid GVK key {:?}; expected version/Kind or group/version/Kind", gvk))?;
            let key = match cli.namespace.as_deref() {
                Some(ns) => NamespacedName::namespaced(ns, &name),
                None => NamespacedName::cluster(&name),
            };
            info!(gvk = %gvk, key = %key, "owners invoked");
            let store = open_store(cli.fixture.as_deref()).await?;
            let obj = ctx.run(store.get(&types, &key)).await?;
            let fetcher = OwnerFetcher::with_policy(store, EvictionPolicy::from_cap(config.owner_cache_cap));
            let tree = fetcher.owner_tree_of(&ctx, &obj).await?;
            match cli.output {
                Output::Human => {
                    println!("{}", tree);
                    let roots: Vec<String> = tree.roots().iter().map(|r| format!("{}:{}", r.kind, r.name)).collect();
                    println!("roots: {}", roots.join(", "));
                }
                Output::Json => print_json(&tree)?,
            }
        }
        Commands::Restart { target, file_watches, buttons, since } => {
            info!(target = %target, file_watches = file_watches.len(), buttons = buttons.len(), "restart invoked");
            let store = open_store(cli.fixture.as_deref()).await?;
            let spec = RestartOnSpec { file_watches, ui_buttons: buttons };
            let checker = RestartChecker::new(DependencyFetcher::new(store), config.trigger_queue.clone());
            let decision = checker.check(&ctx, &target, Some(&spec), since.unwrap_or_else(zero_time)).await?;
            match (cli.output, decision) {
                (Output::Json, d) => print_json(&d)?,
                (Output::Human, None) => println!("{}: up to date", target),
                (Output::Human, Some(d)) => {
                    println!("{}: rebuild ({})", target, d.reason);
                    println!("last event: {}", d.last_event.to_rfc3339());
                    for f in &d.changed_files {
                        println!("  {}", f);
                    }
                }
            }
        }
        Commands::Queue { target } => {
            info!(queue = %config.trigger_queue, target = ?target, "queue invoked");
            let store = open_store(cli.fixture.as_deref()).await?;
            let queue = TriggerQueue::fetch(store.as_ref(), &ctx, &config.trigger_queue).await?;
            match target {
                Some(t) => {
                    let reason = queue.reason_for(&t);
                    match cli.output {
                        Output::Human if queue.is_queued(&t) => println!("{}: queued ({})", t, reason),
                        Output::Human => println!("{}: not queued", t),
                        Output::Json => {
                            print_json(&serde_json::json!({"target": t, "queued": queue.is_queued(&t), "reason": reason.bits()}))?
                        }
                    }
                }
                None => match cli.output {
                    Output::Human => {
                        println!("TARGET                 REASON");
                        for name in queue.queued_names() {
                            println!("{:<22} {}", name, queue.reason_for(name));
                        }
                    }
                    Output::Json => {
                        let rows: Vec<_> = queue
                            .queued_names()
                            .into_iter()
                            .map(|n| serde_json::json!({"target": n, "reason": queue.reason_for(n).bits()}))
                            .collect();
                        print_json(&rows)?
                    }
                },
            }
        }
        Commands::ApplyFilter { status, discovery } => {
            info!(status = %status.display(), "apply-filter invoked");
            let status: KubernetesApplyStatus = read_yaml(&status)?;
            match discovery {
                None => {
                    let filter = ApplyFilter::with_limits(&status, &config.manifest)?;
                    match cli.output {
                        Output::Human => {
                            for r in &filter.deployed_refs {
                                println!("{}  uid={}", r, r.uid);
                            }
                            let hashes: Vec<&str> = filter.pod_template_spec_hashes.iter().map(|h| h.as_str()).collect();
                            println!("pod template hashes: {}", hashes.join(", "));
                        }
                        Output::Json => print_json(&filter)?,
                    }
                }
                Some(path) => {
                    let discovery: KubernetesDiscovery = read_yaml(&path)?;
                    let res = KubernetesResource::new(discovery, Some(status))?;
                    let pods = res.filtered_pods();
                    match cli.output {
                        Output::Human => {
                            println!("NAMESPACE   NAME                           PHASE");
                            for p in pods {
                                let ns_col = if p.namespace.is_empty() { "-" } else { p.namespace.as_str() };
                                println!("{:<11} {:<30} {}", ns_col, p.name, p.phase);
                            }
                        }
                        Output::Json => print_json(&pods)?,
                    }
                    info!(discovery = %res.discovery.metadata.name, "apply-filter done");
                }
            }
        }
    }
    info!(took_ms = %t0.elapsed().as_millis(), "command complete");
    Ok(())
}
