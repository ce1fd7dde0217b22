//! Per-request upload sessions and the ingest entry points

use bytes::Bytes;
use filedrop_core::{FileDropError, FileName, NamePolicy, Outcome, Result};
use futures::{Stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::dispatcher::{DispatchEvent, DispatchState, Dispatcher};
use crate::progress::ProgressRegistry;
use crate::sink::{OverwritePolicy, SinkFactory};
use crate::writer::ProgressWriter;

/// State of one upload, owned by the request handling it
#[derive(Debug, Default)]
pub struct UploadSession {
    state: DispatchState,
    declared_length: Option<u64>,
    file_name: Option<FileName>,
    bytes_written: u64,
    destination_created: bool,
}

impl UploadSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn declared_length(&self) -> Option<u64> {
        self.declared_length
    }

    pub fn file_name(&self) -> Option<&FileName> {
        self.file_name.as_ref()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn destination_created(&self) -> bool {
        self.destination_created
    }

    pub(crate) fn set_state(&mut self, state: DispatchState) {
        self.state = state;
    }

    /// Fix the declared total. Only effective before any file byte.
    pub(crate) fn prime_length(&mut self, total: u64) {
        if self.file_name.is_none() {
            self.declared_length = Some(total);
        }
    }

    pub(crate) fn disable_totals(&mut self) {
        self.declared_length = None;
    }

    /// The first name wins
    pub(crate) fn set_file_name(&mut self, name: FileName) {
        if self.file_name.is_none() {
            self.file_name = Some(name);
        }
    }

    pub(crate) fn mark_destination_created(&mut self) {
        self.destination_created = true;
    }

    /// Record the running byte count; never moves backwards
    pub(crate) fn record_bytes(&mut self, bytes_written: u64) {
        self.bytes_written = self.bytes_written.max(bytes_written);
    }
}

/// Settings shared by all sessions
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory destination files are created in
    pub base_dir: PathBuf,
    pub name_policy: NamePolicy,
    pub overwrite: OverwritePolicy,
    /// Delete the destination when a session fails after creating it
    pub remove_partial: bool,
    /// Upper bound for one whole upload
    pub timeout: Option<Duration>,
}

impl IngestConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        IngestConfig {
            base_dir: base_dir.into(),
            name_policy: NamePolicy::Permissive,
            overwrite: OverwritePolicy::Overwrite,
            remove_partial: false,
            timeout: None,
        }
    }
}

/// Entry point for request handlers. Cheap to clone.
#[derive(Clone)]
pub struct Ingestor {
    sinks: SinkFactory,
    registry: Arc<ProgressRegistry>,
    config: Arc<IngestConfig>,
}

impl Ingestor {
    pub fn new(config: IngestConfig, registry: Arc<ProgressRegistry>) -> Self {
        Ingestor {
            sinks: SinkFactory::new(config.base_dir.clone(), config.overwrite),
            registry,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<ProgressRegistry> {
        &self.registry
    }

    /// Ingest a `multipart/form-data` body
    pub async fn ingest_multipart<S, O, E>(&self, body: S, boundary: impl Into<String>) -> Outcome
    where
        S: Stream<Item = std::result::Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let mut multipart = multer::Multipart::new(body, boundary.into());
        let mut session = UploadSession::new();

        let outcome = {
            let mut dispatcher =
                Dispatcher::new(&self.sinks, &self.registry, self.config.name_policy, &mut session);
            self.bounded(dispatcher.consume(&mut multipart)).await
        };

        self.conclude(outcome, &session).await
    }

    /// Ingest a raw body named by the `X-File-Name` header
    pub async fn ingest_raw<S, E>(
        &self,
        file_name: Option<&str>,
        content_length: Option<u64>,
        body: S,
    ) -> Outcome
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send,
        E: std::fmt::Display,
    {
        let mut session = UploadSession::new();

        let outcome = {
            let copy = self.copy_raw(&mut session, file_name, content_length, body);
            self.bounded(async { copy.await.map_or_else(Outcome::from, Outcome::Completed) })
                .await
        };

        self.conclude(outcome, &session).await
    }

    async fn copy_raw<S, E>(
        &self,
        session: &mut UploadSession,
        file_name: Option<&str>,
        content_length: Option<u64>,
        body: S,
    ) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send,
        E: std::fmt::Display,
    {
        let file_name = FileName::new(file_name.unwrap_or_default(), self.config.name_policy)?;

        // The request's content length plays the role of the length field.
        if let Some(total) = content_length {
            let (next, _) = session.state().on(DispatchEvent::LengthValid(total));
            session.set_state(next);
            session.prime_length(total);
        }
        let (next, _) = session.state().on(DispatchEvent::File);
        session.set_state(next);
        session.set_file_name(file_name.clone());

        let sink = self.sinks.create(&file_name).await?;
        session.mark_destination_created();

        let handle = self.registry.register(file_name.clone(), session.declared_length());
        let mut writer = ProgressWriter::new(sink, handle);

        let copied = copy_stream(body, &mut writer).await;
        session.record_bytes(writer.bytes_written());
        if let Err(e) = copied {
            let (next, _) = session.state().on(DispatchEvent::CopyFailed);
            session.set_state(next);
            return Err(e);
        }

        let (sink, handle) = writer.into_parts();
        sink.close().await?;
        handle.finish(true);

        let (next, _) = session.state().on(DispatchEvent::CopyFinished);
        session.set_state(next);
        Ok(session.bytes_written())
    }

    async fn bounded<F>(&self, work: F) -> Outcome
    where
        F: std::future::Future<Output = Outcome>,
    {
        match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(outcome) => outcome,
                Err(_) => FileDropError::Timeout(limit).into(),
            },
            None => work.await,
        }
    }

    async fn conclude(&self, outcome: Outcome, session: &UploadSession) -> Outcome {
        let name = session
            .file_name()
            .map(FileName::to_string)
            .unwrap_or_else(|| "<none>".to_string());

        match &outcome {
            Outcome::Completed(n) => info!("Wrote {} bytes to file {}", n, name),
            Outcome::BadRequest(reason) => warn!("Rejected upload {}: {}", name, reason),
            Outcome::ServerError(reason) => {
                error!("Upload {} failed after {} bytes: {}", name, session.bytes_written(), reason)
            }
        }

        if !outcome.is_success() && self.config.remove_partial && session.destination_created() {
            if let Some(file_name) = session.file_name() {
                self.sinks.discard(file_name).await;
            }
        }

        outcome
    }
}

async fn copy_stream<S, E, W>(body: S, writer: &mut ProgressWriter<W>) -> Result<()>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
    W: tokio::io::AsyncWrite + Unpin,
{
    futures::pin_mut!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| FileDropError::BodyRead(e.to_string()))?;
        writer.write_all(&chunk).await.map_err(FileDropError::Write)?;
    }
    Ok(())
}
