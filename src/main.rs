use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;

use metaffix::cluster::client::{MeshClient, build_router};
use metaffix::cluster::clients::ClientManager;
use metaffix::cluster::fault::FaultManager;
use metaffix::cluster::server::IndexServer;
use metaffix::config::ClusterConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut rank: Option<usize> = None;
    let mut num_servers: Option<usize> = None;
    let mut config_overrides = ClusterConfig::new(0);

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rank" => {
                rank = Some(next_value(&args, i)?.parse()?);
                i += 2;
            }
            "--config" => {
                let loaded = ClusterConfig::load(std::path::Path::new(next_value(&args, i)?))?;
                num_servers = Some(loaded.num_servers);
                config_overrides = loaded;
                i += 2;
            }
            "--servers" => {
                num_servers = Some(next_value(&args, i)?.parse()?);
                i += 2;
            }
            "--host" => {
                config_overrides.host = next_value(&args, i)?.to_string();
                i += 2;
            }
            "--base-port" => {
                config_overrides.base_port = next_value(&args, i)?.parse()?;
                i += 2;
            }
            "--data-dir" => {
                config_overrides.data_dir = next_value(&args, i)?.into();
                i += 2;
            }
            "--suffix-mode" => {
                config_overrides.suffix_mode = true;
                i += 1;
            }
            "--replication-ratio" => {
                config_overrides.replication_ratio = next_value(&args, i)?.parse()?;
                i += 2;
            }
            "--popularity-threshold" => {
                config_overrides.popularity_threshold = next_value(&args, i)?.parse()?;
                i += 2;
            }
            "--decay" => {
                config_overrides.decay_factor = next_value(&args, i)?.parse()?;
                i += 2;
            }
            "--adaptive" => {
                config_overrides.adaptive_enabled = true;
                i += 1;
            }
            other => {
                bail!("unknown argument '{}'", other);
            }
        }
    }

    let (Some(rank), Some(num_servers)) = (rank, num_servers) else {
        eprintln!(
            "Usage: {} --rank <n> --servers <n> [--config <file.json>] [--host <ip>] \
             [--base-port <p>] [--data-dir <path>] [--suffix-mode] \
             [--replication-ratio <f>] [--popularity-threshold <f>] [--decay <f>] [--adaptive]",
            args[0]
        );
        eprintln!("Rank 0 is the client process; rank r > 0 runs index server r - 1.");
        std::process::exit(1);
    };

    if rank > num_servers {
        bail!("rank {} is out of range for {} servers", rank, num_servers);
    }

    let mut config = config_overrides;
    config.num_servers = num_servers;
    config.max_replication_factor = num_servers;
    let config = Arc::new(config);

    if rank == 0 {
        run_client(config).await
    } else {
        let server = IndexServer::new(rank - 1, config)?;
        server.run().await
    }
}

fn next_value<'a>(args: &'a [String], i: usize) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("missing value for {}", args[i]))
}

/// The rank-0 process: fault detection plus a line-oriented operational
/// console on stdin.
async fn run_client(config: Arc<ClusterConfig>) -> Result<()> {
    let router = Arc::new(RwLock::new(build_router(&config)));
    let fault = FaultManager::new(Arc::clone(&config), Arc::clone(&router)).await?;
    fault.start();

    let manager = ClientManager::new(Arc::clone(&config), Some(Arc::clone(&fault)));
    let client = Arc::new(MeshClient::with_router(
        Arc::clone(&config),
        router,
        Some(Arc::clone(&fault)),
    ));

    tracing::info!(
        "client ready ({} servers, suffix mode {}, adaptive {})",
        config.num_servers,
        config.suffix_mode,
        config.adaptive_enabled
    );
    println!("commands: insert <key> <value> <id> | delete <key> <value> <id> | search <query>");
    println!("          checkpoint | recover | stats | register | unregister <id> | clients");
    println!("          shutdown | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.splitn(2, ' ');
        let command = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();

        match command {
            "insert" | "delete" => {
                let fields: Vec<&str> = rest.split_whitespace().collect();
                let &[key, value, id] = fields.as_slice() else {
                    println!("usage: {} <key> <value> <id>", command);
                    continue;
                };
                let Ok(object_id) = id.parse() else {
                    println!("invalid object id '{}'", id);
                    continue;
                };

                let outcome = if command == "insert" {
                    client.create_md_index(key, value, object_id).await
                } else {
                    client.delete_md_index(key, value, object_id).await
                };
                match outcome {
                    Ok(()) => println!("ok"),
                    Err(e) => println!("error: {}", e),
                }
            }
            "search" => match client.md_search(rest).await {
                Ok(results) => println!("found {} objects: {:?}", results.len(), results),
                Err(e) => println!("error: {}", e),
            },
            "checkpoint" => {
                for (server_id, ok) in client.checkpoint_all().await {
                    println!("server {}: {}", server_id, if ok { "ok" } else { "failed" });
                }
            }
            "recover" => {
                for (server_id, ok) in client.recover_all().await {
                    println!("server {}: {}", server_id, if ok { "ok" } else { "failed" });
                }
            }
            "stats" => {
                let stats = client.popularity_stats().await;
                if stats.is_empty() {
                    println!("no tracked patterns");
                }
                for (pattern, score) in stats {
                    println!("{:>10.3}  {}", score, pattern);
                }
            }
            "register" => {
                println!("registered client {}", manager.register_client());
            }
            "unregister" => match rest.trim().parse::<u64>() {
                Ok(client_id) => manager.unregister_client(client_id),
                Err(_) => println!("usage: unregister <id>"),
            },
            "clients" => {
                println!(
                    "{} registered client handle(s): {:?}",
                    manager.client_count(),
                    manager.active_client_ids()
                );
            }
            "shutdown" => {
                for (server_id, ok) in client.shutdown_all().await {
                    println!("server {}: {}", server_id, if ok { "ok" } else { "failed" });
                }
            }
            "quit" | "exit" => break,
            other => println!("unknown command '{}'", other),
        }
    }

    fault.stop();
    Ok(())
}
