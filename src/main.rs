//! Kubernetes secret provider diagnostic tool
//!
//! Builds a provider from a store manifest, the same way an operator would,
//! and runs a single lookup against the cluster.
//!
//! Usage: kubernetes-secret-provider <store.yaml> <namespace> <command>
//!
//! Commands:
//!   get <key> [property]
//!   get-map <key>
//!   find-name <regexp>
//!   find-tags <k=v[,k=v...]>
//!   validate

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kubernetes_secret_provider::{
    adapters::secrets::KubeClient, crd::load_store, FindSpec, ProviderKubernetes, SecretReference,
};

const USAGE: &str = "usage: kubernetes-secret-provider <store.yaml> <namespace> \
(get <key> [property] | get-map <key> | find-name <regexp> | find-tags <k=v,...> | validate)";

/// A single lookup requested on the command line
enum Command {
    Get(SecretReference),
    GetMap(SecretReference),
    Find(FindSpec),
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (store_path, namespace, command) = parse_args(&args)?;

    let store = load_store(&store_path)?;
    info!(
        "Loaded {} {} from {}",
        store.kind(),
        store.name(),
        store_path.display()
    );

    let kube = KubeClient::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received CTRL+C signal, cancelling");
            guard.cancel();
        }
    });

    let provider = ProviderKubernetes::new_client(&store, &kube, &namespace, &cancel).await?;
    info!("Reading secrets from namespace {}", provider.namespace());

    let mut stdout = std::io::stdout();
    match command {
        Command::Get(reference) => {
            let value = provider.get_secret(&cancel, &reference).await?;
            stdout.write_all(&value)?;
            writeln!(stdout)?;
        }
        Command::GetMap(reference) => {
            let map = provider.get_secret_map(&cancel, &reference).await?;
            print_map(&mut stdout, &map)?;
        }
        Command::Find(find) => {
            let secrets = provider.get_all_secrets(&cancel, &find).await?;
            print_map(&mut stdout, &secrets)?;
        }
        Command::Validate => {
            provider.validate(&cancel).await?;
            writeln!(stdout, "ok")?;
        }
    }

    Ok(())
}

fn parse_args(args: &[String]) -> anyhow::Result<(PathBuf, String, Command)> {
    let [store, namespace, command, rest @ ..] = args else {
        bail!(USAGE);
    };

    let command = match (command.as_str(), rest) {
        ("get", [key]) => Command::Get(SecretReference::new(key)),
        ("get", [key, property]) => Command::Get(SecretReference::new(key).with_property(property)),
        ("get-map", [key]) => Command::GetMap(SecretReference::new(key)),
        ("find-name", [pattern]) => Command::Find(FindSpec::by_name(pattern)?),
        ("find-tags", [tags]) => Command::Find(FindSpec::by_tags(parse_tags(tags)?)?),
        ("validate", []) => Command::Validate,
        _ => bail!(USAGE),
    };

    Ok((PathBuf::from(store), namespace.clone(), command))
}

fn parse_tags(raw: &str) -> anyhow::Result<BTreeMap<String, String>> {
    raw.split(',')
        .filter(|term| !term.is_empty())
        .map(|term| {
            term.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow!("tag '{}' is not in key=value form", term))
        })
        .collect()
}

fn print_map(out: &mut impl Write, map: &BTreeMap<String, Vec<u8>>) -> anyhow::Result<()> {
    for (name, value) in map {
        writeln!(out, "{}: {}", name, String::from_utf8_lossy(value))?;
    }
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,kubernetes_secret_provider=debug,kube=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();
}
