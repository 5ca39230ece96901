use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use blobkeep_crypto::{hash_reader, VerifyingReader};
use blobkeep_store::{enumerate_all, BlobHub, BlobReceiver, BlobStorage, FileBackend, Gate};
use blobkeep_types::{BlobRef, SizedRef};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::*;
use crate::config::Config;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    if let Command::Version = cli.command {
        println!("blobkeep {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(&cli.config)?;
    let store = Store::open(&config).await?;
    match cli.command {
        Command::Version => Ok(()),
        Command::Put(args) => cmd_put(&store, &config, args).await,
        Command::Get(args) => cmd_get(&store, args).await,
        Command::Stat(args) => cmd_stat(&store, args).await,
        Command::List(args) => cmd_list(&store, args).await,
        Command::Rm(args) => cmd_rm(&store, args).await,
        Command::Sweep => cmd_sweep(&store).await,
    }
}

/// One backend and one hub, with the receive protocol wired to both.
pub struct Store {
    backend: Arc<FileBackend>,
    receiver: BlobReceiver<FileBackend>,
}

impl Store {
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let mut backend = FileBackend::open(&config.root)
            .await
            .with_context(|| format!("opening store at {}", config.root.display()))?
            .with_stat_cache(config.stat_cache_entries);
        if let Some(gate) = Gate::from_limit(config.max_temp_files) {
            backend = backend.with_gate(gate);
        }
        let backend = Arc::new(backend);
        let receiver = BlobReceiver::new(Arc::clone(&backend), Arc::new(BlobHub::new()));
        Ok(Self { backend, receiver })
    }
}

fn parse_refs(refs: &[String]) -> anyhow::Result<Vec<BlobRef>> {
    refs.iter()
        .map(|s| BlobRef::parse(s).with_context(|| format!("invalid blob ref {s:?}")))
        .collect()
}

async fn put_file(receiver: &BlobReceiver<FileBackend>, path: &Path) -> anyhow::Result<SizedRef> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let hashed = hash_reader(file).await?;
    // Re-read for upload; the receiver checks the content against the ref.
    let file = tokio::fs::File::open(path).await?;
    let sized = receiver
        .receive(&hashed.blob_ref, file)
        .await
        .with_context(|| format!("storing {}", path.display()))?;
    Ok(sized)
}

async fn cmd_put(store: &Store, config: &Config, args: PutArgs) -> anyhow::Result<()> {
    let hub = store.receiver.hub();
    let (tx, mut rx) = mpsc::channel(config.listener_capacity.max(1));
    let listener = hub.register_listener(tx);
    let watcher = tokio::spawn(async move {
        while let Some(blob_ref) = rx.recv().await {
            info!(blob = %blob_ref, "blob available");
        }
    });

    let mut failed = 0usize;
    for path in &args.paths {
        match put_file(&store.receiver, path).await {
            Ok(sized) => println!("{} {}  {}", "✓".green(), sized, path.display()),
            Err(e) => {
                failed += 1;
                eprintln!("{} {:#}", "✗".red().bold(), e);
            }
        }
    }

    hub.unregister_listener(listener);
    watcher.await?;
    if failed > 0 {
        anyhow::bail!("{failed} of {} files failed", args.paths.len());
    }
    Ok(())
}

async fn cmd_get(store: &Store, args: GetArgs) -> anyhow::Result<()> {
    let blob_ref = BlobRef::parse(&args.blob_ref)
        .with_context(|| format!("invalid blob ref {:?}", args.blob_ref))?;
    let (reader, size) = store.backend.fetch(&blob_ref).await?;
    // Fails at the end if the stored bytes no longer match the ref.
    let mut reader = VerifyingReader::new(reader, blob_ref);
    let check_size = |copied: u64| {
        if copied != u64::from(size) {
            anyhow::bail!("read {copied} bytes of {blob_ref}, expected {size}");
        }
        Ok(())
    };
    match &args.output {
        Some(path) => {
            // Written beside the target and renamed over it only once the
            // whole blob has been read and verified.
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let temp = tempfile::Builder::new()
                .prefix(".blobkeep-get.")
                .tempfile_in(dir)
                .with_context(|| format!("creating temp file in {}", dir.display()))?;
            let (file, temp_path) = temp.into_parts();
            let mut out = tokio::fs::File::from_std(file);
            let copied = tokio::io::copy(&mut reader, &mut out).await?;
            check_size(copied)?;
            out.sync_all().await?;
            drop(out);
            temp_path
                .persist(path)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            let copied = tokio::io::copy(&mut reader, &mut tokio::io::stdout()).await?;
            check_size(copied)?;
        }
    }
    Ok(())
}

async fn cmd_stat(store: &Store, args: StatArgs) -> anyhow::Result<()> {
    let refs = parse_refs(&args.refs)?;
    let mut found = Vec::new();
    store
        .backend
        .stat_blobs(&refs, &mut |sized| {
            found.push(sized);
            Ok(())
        })
        .await?;
    for blob_ref in &refs {
        match found.iter().find(|s| s.blob_ref == *blob_ref) {
            Some(sized) => println!("{}  {} bytes", sized.blob_ref.to_string().yellow(), sized.size),
            None => println!("{}  {}", blob_ref.to_string().yellow(), "missing".red()),
        }
    }
    Ok(())
}

async fn cmd_list(store: &Store, args: ListArgs) -> anyhow::Result<()> {
    let blobs = enumerate_all(&*store.backend, &args.after, args.limit).await?;
    for sized in &blobs {
        println!("{}  {}", sized.blob_ref.to_string().yellow(), sized.size);
    }
    if blobs.is_empty() {
        println!("{}", "no blobs".dimmed());
    }
    Ok(())
}

async fn cmd_rm(store: &Store, args: RmArgs) -> anyhow::Result<()> {
    let refs = parse_refs(&args.refs)?;
    store.backend.remove_blobs(&refs).await?;
    println!("{} Removed {} blob(s)", "✓".green(), refs.len());
    Ok(())
}

async fn cmd_sweep(store: &Store) -> anyhow::Result<()> {
    let removed = store.backend.remove_stale_temp_files().await?;
    println!("{} Swept {} stale temp file(s)", "✓".green(), removed);
    Ok(())
}
