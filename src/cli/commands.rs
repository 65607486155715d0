//! CLI command implementations
//!
//! Every command loads and validates the config first, then opens the
//! file store under `data_dir`. The local CLI user acts with operator
//! authority.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::annotation::LegacyAddressing;
use crate::api::{Caller, MigrationService};
use crate::block::{parse, StableId};
use crate::config::Config;
use crate::errors::MigrationError;
use crate::http_server::HttpServer;
use crate::orchestrator::{
    CancellationToken, FileJobStore, JobStore, MigrationOrchestrator,
};
use crate::store::{
    AnnotationRecord, Document, DocumentId, DocumentStore, FileStore, LegacyAddress, CORPUS_FILE,
};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments, dispatches, and writes an error envelope on failure.
/// This is the only function main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command).map_err(|e| {
        // stdout may be gone; the exit code still reports the failure
        let _ = write_error(e.code_str(), e.message());
        e
    })
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Import { config, file } => import(&config, &file),
        Command::Scan { config } => scan(&config),
        Command::Migrate {
            config,
            batch_size,
            max_chunks,
        } => migrate(&config, batch_size, max_chunks),
        Command::Status { config } => status(&config),
        Command::Inspect { config, document } => inspect(&config, document),
        Command::Serve { config, port } => serve(&config, port),
    }
}

/// Create the data directory and an empty corpus file.
pub fn init(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    if is_initialized(config.data_path()) {
        return Err(CliError::already_initialized());
    }
    let store = FileStore::open(config.data_path())?;
    write_response(json!({
        "initialized": true,
        "corpus_file": store.path().display().to_string(),
    }))
}

/// Import file layout
#[derive(Debug, Deserialize)]
struct ImportFile {
    #[serde(default)]
    documents: Vec<ImportDocument>,
    #[serde(default)]
    annotations: Vec<AnnotationRecord>,
}

#[derive(Debug, Deserialize)]
struct ImportDocument {
    id: DocumentId,
    #[serde(rename = "type", default = "default_doc_type")]
    doc_type: String,
    #[serde(default)]
    title: String,
    content: String,
    #[serde(default)]
    edit_url: Option<String>,
}

fn default_doc_type() -> String {
    "post".to_string()
}

impl From<ImportDocument> for Document {
    fn from(imported: ImportDocument) -> Self {
        let mut document = Document::new(
            imported.id,
            imported.doc_type,
            imported.title,
            imported.content,
        );
        if let Some(url) = imported.edit_url {
            document.edit_url = url;
        }
        document
    }
}

/// Load documents and annotations; each record is one durable write.
pub fn import(config_path: &Path, file: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let store = open_store(&config)?;

    let raw = fs::read_to_string(file).map_err(|e| {
        CliError::io_error(format!("Failed to read {}: {}", file.display(), e))
    })?;
    let import: ImportFile = serde_json::from_str(&raw)?;

    let documents = import.documents.len();
    let annotations = import.annotations.len();
    for document in import.documents {
        store.put_document(document.into())?;
    }
    for annotation in import.annotations {
        store.put_annotation(annotation)?;
    }

    write_response(json!({
        "documents": documents,
        "annotations": annotations,
    }))
}

pub fn scan(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let service = build_service(&config, None)?;
    let report = service.scan(&local_operator())?;
    write_response(report)
}

/// Run or resume the migration job.
///
/// With `max_chunks` the job stops after that many chunks and stays
/// paused; running the command again resumes it.
pub fn migrate(
    config_path: &Path,
    batch_size: Option<usize>,
    max_chunks: Option<usize>,
) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let service = build_service(&config, batch_size)?;
    let outcome = service.run_job(&local_operator(), &CancellationToken::new(), max_chunks)?;
    write_response(outcome)
}

/// Print the persisted job record, or null.
pub fn status(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let job = FileJobStore::new(config.data_path()).load()?;
    write_response(json!({ "job": job }))
}

#[derive(Debug, Serialize)]
struct BlockListing {
    position: usize,
    name: String,
    depth: usize,
    stable_id: Option<StableId>,
    legacy_address: LegacyAddress,
}

/// List a document's blocks with their legacy addresses, the keys
/// annotations written before migration use.
pub fn inspect(config_path: &Path, document_id: DocumentId) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let store = open_store(&config)?;
    let addressing = config.orchestrator_config()?.addressing;

    let document = store.read_document(document_id)?;
    let parsed = parse(&document.content).map_err(MigrationError::from)?;
    let blocks: Vec<BlockListing> = parsed
        .blocks
        .iter()
        .map(|block| BlockListing {
            position: block.position,
            name: block.name.clone(),
            depth: block.depth,
            stable_id: block.stable_id.clone(),
            legacy_address: addressing.address(block),
        })
        .collect();

    write_response(json!({
        "id": document.id,
        "title": document.title,
        "legacy_address_version": addressing.version(),
        "blocks": blocks,
    }))
}

/// Serve the HTTP surface until ctrl-c.
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = Config::load(config_path)?;
    if let Some(port) = port {
        config.http.port = port;
    }
    let service = Arc::new(build_service(&config, None)?);
    let server = HttpServer::new(config.http.clone(), service);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("Failed to start runtime: {}", e)))?;
    runtime
        .block_on(server.start())
        .map_err(|e| CliError::io_error(format!("HTTP server failed: {}", e)))
}

fn is_initialized(data_dir: &Path) -> bool {
    data_dir.join("data").join(CORPUS_FILE).exists()
}

fn open_store(config: &Config) -> CliResult<Arc<FileStore>> {
    if !is_initialized(config.data_path()) {
        return Err(CliError::not_initialized());
    }
    Ok(Arc::new(FileStore::open(config.data_path())?))
}

fn build_service(config: &Config, batch_size: Option<usize>) -> CliResult<MigrationService> {
    let mut orchestrator_config = config.orchestrator_config()?;
    if let Some(batch_size) = batch_size {
        if batch_size == 0 {
            return Err(CliError::config_error("--batch-size must be > 0"));
        }
        orchestrator_config.batch_size = batch_size;
    }

    let store = open_store(config)?;
    let jobs = Arc::new(FileJobStore::new(config.data_path()));
    Ok(MigrationService::new(MigrationOrchestrator::new(
        store,
        jobs,
        orchestrator_config,
    )))
}

fn local_operator() -> Caller {
    let user = std::env::var("USER").unwrap_or_else(|_| "cli".to_string());
    Caller::migrator(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AnnotationStore, BlockReference};
    use tempfile::TempDir;

    fn write_config(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("blockmark.json");
        let data_dir = dir.path().join("data_root");
        fs::write(
            &path,
            json!({ "data_dir": data_dir.display().to_string(), "batch_size": 1 }).to_string(),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_commands_require_init() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir);
        let err = scan(&config).unwrap_err();
        assert_eq!(err.code_str(), "BLOCKMARK_CLI_NOT_INITIALIZED");

        init(&config).unwrap();
        let err = init(&config).unwrap_err();
        assert_eq!(err.code_str(), "BLOCKMARK_CLI_ALREADY_INITIALIZED");
    }

    #[test]
    fn test_import_then_migrate_in_chunks() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(&dir);
        init(&config_path).unwrap();

        let import_path = dir.path().join("import.json");
        fs::write(
            &import_path,
            json!({
                "documents": [
                    {"id": 1, "title": "One", "content": "<!-- wp:paragraph /-->"},
                    {"id": 2, "type": "page", "title": "Two", "content": "<!-- wp:image /-->"}
                ],
                "annotations": [
                    {"id": 10, "document_id": 1, "reference": {"legacy": "nowhere"}, "payload": {}}
                ]
            })
            .to_string(),
        )
        .unwrap();
        import(&config_path, &import_path).unwrap();

        migrate(&config_path, None, Some(1)).unwrap();
        let config = Config::load(&config_path).unwrap();
        let job = FileJobStore::new(config.data_path()).load().unwrap().unwrap();
        assert_eq!(job.processed, 1);
        assert!(job.is_resumable());

        migrate(&config_path, None, None).unwrap();
        let job = FileJobStore::new(config.data_path()).load().unwrap().unwrap();
        assert_eq!(job.processed, 2);
        assert!(!job.is_resumable());

        let store = FileStore::open(config.data_path()).unwrap();
        for id in [1, 2] {
            let parsed = parse(&store.read_document(id).unwrap().content).unwrap();
            assert_eq!(parsed.blocks_without_stable_id(), 0);
        }
        // An address that matches no block is left untouched.
        assert_eq!(
            store.annotations_for(1).unwrap()[0].reference,
            BlockReference::legacy("nowhere")
        );
    }
}
