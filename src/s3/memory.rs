//! An in-memory object store implementing [StoreTransport].
//!
//! [MemoryTransport] keeps objects together with the part layout they were
//! uploaded with, performs real byte-range copies, and validates commits the
//! way S3 does: parts must be listed in ascending order with the entity tags
//! returned when they were copied. Every call is recorded as a
//! [TransportEvent] so tests can assert on what was sent to the store.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use derive_more::Debug;

use super::{
    CommitOutcome, CopySession, IntegrityToken, PartHead, PartRange, PartResult, S3Object,
    SessionToken, StoreTransport, TransportError,
};

/// The kind of failure to inject into an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Fails with a retryable error, like S3 returning `SlowDown`.
    Transient,
    /// Fails with an error which must not be retried, like `AccessDenied`.
    Fatal,
}

/// A record of an operation performed against a [MemoryTransport].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    PartHeaded {
        object: S3Object,
        part_number: u32,
    },
    SessionOpened {
        destination: S3Object,
        token: SessionToken,
    },
    RangeCopied {
        part_number: u32,
        copy_source_range: String,
    },
    RangeCopyFailed {
        part_number: u32,
        retryable: bool,
    },
    Committed {
        destination: S3Object,
        part_numbers: Vec<u32>,
    },
    CommitFailed {
        token: SessionToken,
    },
    Aborted {
        token: SessionToken,
    },
}

#[derive(Debug)]
struct StoredObject {
    data: Bytes,
    /// Sizes of the parts the object was uploaded with, `None` for a
    /// single request upload.
    part_sizes: Option<Vec<u64>>,
}

#[derive(Debug)]
struct PendingWrite {
    destination: S3Object,
    parts: BTreeMap<u32, (Bytes, IntegrityToken)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<S3Object, StoredObject>,
    writes: HashMap<SessionToken, PendingWrite>,
    next_upload: u64,
    part_failures: HashMap<u32, (InjectedFailure, usize)>,
    commit_failure: Option<InjectedFailure>,
    abort_failure: bool,
    content_ranges: HashMap<(S3Object, u32), String>,
    events: Vec<TransportEvent>,
}

type Latency = Box<dyn Fn(u32) -> Duration + Send + Sync>;

/// An in-memory [StoreTransport].
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    #[debug(skip)]
    copy_latency: Mutex<Option<Latency>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

fn failure(kind: InjectedFailure, message: String) -> TransportError {
    match kind {
        InjectedFailure::Transient => TransportError::Transient(anyhow!("SlowDown: {message}").into()),
        InjectedFailure::Fatal => TransportError::Service(anyhow!("AccessDenied: {message}").into()),
    }
}

fn service(message: String) -> TransportError {
    TransportError::Service(anyhow!(message).into())
}

fn entity_tag(data: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("\"{:016x}\"", hasher.finish())
}

/// Decrements the in-flight counter when a copy finishes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores an object uploaded with a single request.
    pub fn put_object(&self, object: &S3Object, data: Bytes) {
        self.state().objects.insert(
            object.clone(),
            StoredObject {
                data,
                part_sizes: None,
            },
        );
    }

    /// Stores an object uploaded in parts of `part_size` bytes.
    pub fn put_multipart(&self, object: &S3Object, data: Bytes, part_size: usize) {
        let parts = data
            .chunks(part_size.max(1))
            .map(|chunk| data.slice_ref(chunk))
            .collect();
        self.put_parts(object, parts);
    }

    /// Stores an object uploaded with the given parts, in order.
    pub fn put_parts(&self, object: &S3Object, parts: Vec<Bytes>) {
        let part_sizes = parts.iter().map(|part| part.len() as u64).collect();
        let data: Vec<u8> = parts.iter().flat_map(|part| part.iter().copied()).collect();
        self.state().objects.insert(
            object.clone(),
            StoredObject {
                data: Bytes::from(data),
                part_sizes: Some(part_sizes),
            },
        );
    }

    /// The contents of a stored object.
    pub fn object(&self, object: &S3Object) -> Option<Bytes> {
        self.state()
            .objects
            .get(object)
            .map(|stored| stored.data.clone())
    }

    /// Replaces the content range reported for a part of an object.
    pub fn override_content_range(
        &self,
        object: &S3Object,
        part_number: u32,
        content_range: impl Into<String>,
    ) {
        self.state()
            .content_ranges
            .insert((object.clone(), part_number), content_range.into());
    }

    /// Makes the next `times` copies of `part_number` fail.
    pub fn fail_part(&self, part_number: u32, kind: InjectedFailure, times: usize) {
        self.state()
            .part_failures
            .insert(part_number, (kind, times));
    }

    /// Makes every commit fail.
    pub fn fail_commit(&self, kind: InjectedFailure) {
        self.state().commit_failure = Some(kind);
    }

    /// Makes every abort fail.
    pub fn fail_abort(&self) {
        self.state().abort_failure = true;
    }

    /// Delays each copy of a part by the returned duration.
    pub fn set_copy_latency(&self, latency: impl Fn(u32) -> Duration + Send + Sync + 'static) {
        *self
            .copy_latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Box::new(latency));
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        self.state().events.clone()
    }

    /// Number of multipart writes which are neither committed nor aborted.
    pub fn open_writes(&self) -> usize {
        self.state().writes.len()
    }

    /// The largest number of copies which were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn copy_now(
        &self,
        session: &CopySession,
        source: &S3Object,
        range: &PartRange,
    ) -> Result<IntegrityToken, TransportError> {
        let mut state = self.state();
        let part_number = range.part_number;

        let injected = match state.part_failures.get_mut(&part_number) {
            Some((kind, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Some(*kind)
            }
            _ => None,
        };
        if let Some(kind) = injected {
            state.events.push(TransportEvent::RangeCopyFailed {
                part_number,
                retryable: kind == InjectedFailure::Transient,
            });
            return Err(failure(kind, format!("part {part_number}")));
        }

        let stored = state
            .objects
            .get(source)
            .ok_or_else(|| service(format!("NoSuchKey: {source}")))?;
        let start = usize::try_from(range.start).map_err(|e| service(e.to_string()))?;
        let end = usize::try_from(range.end).map_err(|e| service(e.to_string()))?;
        if start > end || end >= stored.data.len() {
            return Err(service(format!(
                "InvalidRange: {} of {} bytes",
                range.copy_source_range(),
                stored.data.len()
            )));
        }
        let bytes = stored.data.slice(start..=end);
        let token = IntegrityToken::from(entity_tag(&bytes));

        let write = state
            .writes
            .get_mut(&session.token)
            .ok_or_else(|| service(format!("NoSuchUpload: {}", session.token)))?;
        write.parts.insert(part_number, (bytes, token.clone()));
        state.events.push(TransportEvent::RangeCopied {
            part_number,
            copy_source_range: range.copy_source_range(),
        });
        Ok(token)
    }
}

#[async_trait]
impl StoreTransport for MemoryTransport {
    async fn head_part(
        &self,
        source: &S3Object,
        part_number: u32,
    ) -> Result<PartHead, TransportError> {
        let mut state = self.state();
        state.events.push(TransportEvent::PartHeaded {
            object: source.clone(),
            part_number,
        });
        let overridden = state
            .content_ranges
            .get(&(source.clone(), part_number))
            .cloned();
        let stored = state
            .objects
            .get(source)
            .ok_or_else(|| service(format!("NoSuchKey: {source}")))?;
        let total = stored.data.len() as u64;

        let head = match &stored.part_sizes {
            None if part_number == 1 => PartHead {
                parts_count: None,
                content_range: (total > 0).then(|| format!("bytes 0-{}/{total}", total - 1)),
            },
            Some(sizes) if part_number >= 1 && part_number as usize <= sizes.len() => {
                let index = part_number as usize - 1;
                let start: u64 = sizes[..index].iter().sum();
                let end = start + sizes[index] - 1;
                PartHead {
                    parts_count: Some(i32::try_from(sizes.len())?),
                    content_range: Some(format!("bytes {start}-{end}/{total}")),
                }
            }
            _ => return Err(service(format!("InvalidPartNumber: {part_number}"))),
        };

        Ok(PartHead {
            content_range: overridden.or(head.content_range),
            ..head
        })
    }

    async fn open_multipart_write(
        &self,
        destination: &S3Object,
    ) -> Result<SessionToken, TransportError> {
        let mut state = self.state();
        state.next_upload += 1;
        let token = SessionToken::from(format!("upload-{}", state.next_upload));
        state.writes.insert(
            token.clone(),
            PendingWrite {
                destination: destination.clone(),
                parts: BTreeMap::new(),
            },
        );
        state.events.push(TransportEvent::SessionOpened {
            destination: destination.clone(),
            token: token.clone(),
        });
        Ok(token)
    }

    async fn copy_range(
        &self,
        session: &CopySession,
        source: &S3Object,
        range: &PartRange,
    ) -> Result<IntegrityToken, TransportError> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let latency = self
            .copy_latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|latency| latency(range.part_number));
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.copy_now(session, source, range)
    }

    async fn commit_multipart_write(
        &self,
        session: &CopySession,
        parts: &[PartResult],
    ) -> Result<CommitOutcome, TransportError> {
        let mut state = self.state();
        if let Some(kind) = state.commit_failure {
            state.events.push(TransportEvent::CommitFailed {
                token: session.token.clone(),
            });
            return Err(failure(kind, format!("commit of {}", session.token)));
        }

        let write = state
            .writes
            .get(&session.token)
            .ok_or_else(|| service(format!("NoSuchUpload: {}", session.token)))?;
        if parts.is_empty() {
            return Err(service("MalformedXML: no parts".to_owned()));
        }
        if parts
            .windows(2)
            .any(|pair| pair[0].part_number >= pair[1].part_number)
        {
            return Err(service("InvalidPartOrder".to_owned()));
        }

        let mut data = Vec::new();
        let mut part_sizes = Vec::with_capacity(parts.len());
        for part in parts {
            match write.parts.get(&part.part_number) {
                Some((bytes, token)) if *token == part.integrity_token => {
                    data.extend_from_slice(bytes);
                    part_sizes.push(bytes.len() as u64);
                }
                _ => {
                    return Err(service(format!("InvalidPart: {}", part.part_number)));
                }
            }
        }

        let destination = write.destination.clone();
        let e_tag = format!(
            "{}-{}\"",
            entity_tag(&data).trim_end_matches('"'),
            parts.len()
        );
        state.writes.remove(&session.token);
        state.objects.insert(
            destination.clone(),
            StoredObject {
                data: Bytes::from(data),
                part_sizes: Some(part_sizes),
            },
        );
        state.events.push(TransportEvent::Committed {
            destination: destination.clone(),
            part_numbers: parts.iter().map(|part| part.part_number).collect(),
        });

        Ok(CommitOutcome {
            location: Some(format!("memory://{}/{}", destination.bucket, destination.key)),
            bucket: destination.bucket,
            key: destination.key,
            e_tag: Some(e_tag),
            version_id: None,
            parts: parts.len(),
        })
    }

    async fn abort_multipart_write(&self, session: &CopySession) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.abort_failure {
            return Err(failure(
                InjectedFailure::Fatal,
                format!("abort of {}", session.token),
            ));
        }
        state
            .writes
            .remove(&session.token)
            .ok_or_else(|| service(format!("NoSuchUpload: {}", session.token)))?;
        state.events.push(TransportEvent::Aborted {
            token: session.token.clone(),
        });
        Ok(())
    }
}
