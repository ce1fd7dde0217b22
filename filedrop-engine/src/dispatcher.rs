//! Multipart field dispatcher
//!
//! Parts are consumed strictly in arrival order. The first `length` part
//! primes the declared total, the first `file` part is streamed to disk, and
//! everything else is skipped. All state changes go through
//! [`DispatchState::on`].

use filedrop_core::{FileDropError, FileName, NamePolicy, Outcome, Result};
use multer::{Field, Multipart};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::length::read_length;
use crate::progress::ProgressRegistry;
use crate::session::UploadSession;
use crate::sink::SinkFactory;
use crate::writer::ProgressWriter;

/// Form field carrying the declared total size
pub const LENGTH_FIELD: &str = "length";
/// Form field carrying the file content
pub const FILE_FIELD: &str = "file";

/// Dispatcher states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// No file yet. `length_rejected` is set once an invalid `length` part
    /// used up the single length slot.
    Init { length_rejected: bool },
    /// A valid declared length is known.
    LengthParsed(u64),
    /// The file part is being streamed.
    FileReceived,
    /// The file part finished streaming.
    Done,
}

impl Default for DispatchState {
    fn default() -> Self {
        DispatchState::Init { length_rejected: false }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEvent {
    LengthValid(u64),
    LengthInvalid,
    File,
    Unknown,
    CopyFinished,
    CopyFailed,
}

/// What the dispatcher does as a result of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    PrimeLength(u64),
    DisableTotals,
    OpenFile,
    Skip,
    Complete,
    Abort,
}

impl DispatchState {
    /// Exhaustive transition table
    pub fn on(self, event: DispatchEvent) -> (DispatchState, Action) {
        use DispatchEvent as E;
        use DispatchState as S;

        match (self, event) {
            (S::Init { length_rejected: false }, E::LengthValid(n)) => {
                (S::LengthParsed(n), Action::PrimeLength(n))
            }
            (S::Init { length_rejected: false }, E::LengthInvalid) => {
                (S::Init { length_rejected: true }, Action::DisableTotals)
            }
            (S::Init { length_rejected: true }, E::LengthValid(_) | E::LengthInvalid) => {
                (self, Action::Skip)
            }
            (S::LengthParsed(_), E::LengthValid(_) | E::LengthInvalid) => (self, Action::Skip),

            (S::Init { .. } | S::LengthParsed(_), E::File) => (S::FileReceived, Action::OpenFile),

            (S::FileReceived, E::CopyFinished) => (S::Done, Action::Complete),
            (S::FileReceived, E::CopyFailed) => (S::Done, Action::Abort),

            // At most one of each; late parts are ignored.
            (S::FileReceived | S::Done, E::LengthValid(_) | E::LengthInvalid | E::File) => {
                (self, Action::Skip)
            }

            (_, E::Unknown) => (self, Action::Skip),

            // Copy events only make sense while a file is streaming.
            (S::Init { .. } | S::LengthParsed(_) | S::Done, E::CopyFinished | E::CopyFailed) => {
                (self, Action::Skip)
            }
        }
    }

    /// Whether a `length` part would still be honored
    pub fn accepts_length(&self) -> bool {
        matches!(self, DispatchState::Init { length_rejected: false })
    }

    /// Whether a `file` part would still be honored
    pub fn accepts_file(&self) -> bool {
        matches!(self, DispatchState::Init { .. } | DispatchState::LengthParsed(_))
    }
}

/// Routing class of a part, by field name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Length,
    File,
    Other,
}

impl PartKind {
    pub fn of(name: Option<&str>) -> Self {
        match name {
            Some(LENGTH_FIELD) => PartKind::Length,
            Some(FILE_FIELD) => PartKind::File,
            _ => PartKind::Other,
        }
    }
}

/// Drives one [`UploadSession`] through a multipart body
pub struct Dispatcher<'a> {
    sinks: &'a SinkFactory,
    registry: &'a Arc<ProgressRegistry>,
    name_policy: NamePolicy,
    session: &'a mut UploadSession,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        sinks: &'a SinkFactory,
        registry: &'a Arc<ProgressRegistry>,
        name_policy: NamePolicy,
        session: &'a mut UploadSession,
    ) -> Self {
        Dispatcher {
            sinks,
            registry,
            name_policy,
            session,
        }
    }

    /// Consume parts until the body ends or the session fails
    pub async fn consume(&mut self, multipart: &mut Multipart<'_>) -> Outcome {
        loop {
            let mut field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) if self.session.state() == DispatchState::Done => {
                    // The file is already on disk; trailing garbage does not undo it.
                    warn!("Ignoring multipart error after file part: {}", e);
                    break;
                }
                Err(e) => return classify_part_error(e).into(),
            };

            let name = field.name().map(str::to_owned);
            match PartKind::of(name.as_deref()) {
                PartKind::Length if self.session.state().accepts_length() => {
                    let event = match read_length(&mut field).await {
                        Ok(Ok(n)) => DispatchEvent::LengthValid(n),
                        Ok(Err(e)) => {
                            let err = FileDropError::InvalidLength(e.to_string());
                            warn!("{}, progress totals disabled", err);
                            DispatchEvent::LengthInvalid
                        }
                        Err(e) => return classify_part_error(e).into(),
                    };
                    self.apply(event);
                }
                PartKind::File if self.session.state().accepts_file() => {
                    self.apply(DispatchEvent::File);
                    match self.receive_file(field).await {
                        Ok(()) => self.apply(DispatchEvent::CopyFinished),
                        Err(e) => {
                            self.apply(DispatchEvent::CopyFailed);
                            return e.into();
                        }
                    }
                }
                PartKind::Length | PartKind::File => {
                    debug!("Ignoring repeated '{}' part", name.as_deref().unwrap_or_default());
                }
                PartKind::Other => {
                    let name = name.as_deref().unwrap_or("<unnamed>");
                    warn!("Skipping unrecognized part {:?}", name);
                }
            }
        }

        match self.session.state() {
            DispatchState::Done => Outcome::Completed(self.session.bytes_written()),
            _ => FileDropError::MissingFileField.into(),
        }
    }

    fn apply(&mut self, event: DispatchEvent) {
        let (next, action) = self.session.state().on(event);
        debug!("{:?} --{:?}--> {:?} ({:?})", self.session.state(), event, next, action);
        match action {
            Action::PrimeLength(n) => self.session.prime_length(n),
            Action::DisableTotals => self.session.disable_totals(),
            Action::OpenFile | Action::Skip | Action::Complete | Action::Abort => {}
        }
        self.session.set_state(next);
    }

    async fn receive_file(&mut self, mut field: Field<'_>) -> Result<()> {
        let declared = field.file_name().unwrap_or_default();
        let file_name = FileName::new(declared, self.name_policy)?;
        self.session.set_file_name(file_name.clone());

        let sink = self.sinks.create(&file_name).await?;
        self.session.mark_destination_created();

        let handle = self.registry.register(file_name.clone(), self.session.declared_length());
        let mut writer = ProgressWriter::new(sink, handle);

        let copied = copy_field(&mut field, &mut writer).await;
        self.session.record_bytes(writer.bytes_written());
        copied?;

        let (sink, handle) = writer.into_parts();
        sink.close().await?;
        handle.finish(true);

        info!("Received {} ({} bytes)", file_name, self.session.bytes_written());
        Ok(())
    }
}

async fn copy_field<W>(field: &mut Field<'_>, writer: &mut ProgressWriter<W>) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| FileDropError::BodyRead(e.to_string()))?
    {
        writer.write_all(&chunk).await.map_err(FileDropError::Write)?;
    }
    Ok(())
}

/// Map a multipart reader error seen between parts
pub fn classify_part_error(err: multer::Error) -> FileDropError {
    match err {
        multer::Error::StreamReadFailed(e) => FileDropError::BodyRead(e.to_string()),
        other => FileDropError::MalformedMultipart(other.to_string()),
    }
}
