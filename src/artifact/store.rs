//! Output directory for synthesized audio.
//!
//! Audio is written to a hidden `.partial-*` file next to its final location
//! and renamed into place on commit, so a lookup either finds a complete WAV
//! or nothing.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::AtomicBool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use hound::{SampleFormat, WavSpec, WavWriter};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::tts::AudioSink;
use crate::voice::VoiceError;

const PARTIAL_PREFIX: &str = ".partial-";

/// A finished audio file.
#[derive(Debug, Clone)]
pub struct SynthesisArtifact {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: OffsetDateTime,
}

/// Result of looking up an artifact by filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub path: PathBuf,
    pub exists: bool,
}

/// Reserves, writes and resolves artifacts in one directory.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    counter: AtomicU64,
    /// Hand out read-only partial files so sample writes fail
    #[cfg(test)]
    fail_writes: AtomicBool,
}

impl ArtifactStore {
    /// Open the store, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, VoiceError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| VoiceError::write_failed(format!("cannot create {}: {}", dir.display(), e)))?;
        let root = dir.canonicalize().map_err(|e| VoiceError::write_failed(format!("cannot resolve {}: {}", dir.display(), e)))?;
        Ok(Self {
            root,
            counter: AtomicU64::new(1),
            #[cfg(test)]
            fail_writes: AtomicBool::new(false),
        })
    }

    #[cfg(test)]
    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Canonical output directory.
    pub fn dir(&self) -> &Path {
        &self.root
    }

    /// Produce a fresh artifact path.
    ///
    /// Names combine the wall clock, a process-wide counter and a random
    /// suffix, so they stay unique within one second and across restarts.
    pub fn reserve(&self) -> Result<PathBuf, VoiceError> {
        loop {
            let seq = self.counter.fetch_add(1, Ordering::Relaxed);
            let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();
            let random = Uuid::new_v4().simple().to_string();
            let path = self.root.join(format!("tts-{}-{:06}-{}.wav", secs, seq, &random[..8]));

            match path.try_exists() {
                Ok(false) => return Ok(path),
                Ok(true) => debug!("Artifact name {} already taken, retrying", path.display()),
                Err(e) => return Err(VoiceError::write_failed(e)),
            }
        }
    }

    /// Start writing a 16-bit mono WAV destined for `path`.
    pub fn begin(&self, path: &Path, sample_rate: u32) -> Result<PendingArtifact, VoiceError> {
        let tmp = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .suffix(".wav")
            .tempfile_in(&self.root)
            .map_err(VoiceError::write_failed)?;
        let file = self.writable_handle(&tmp).map_err(VoiceError::write_failed)?;

        let spec = WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: SampleFormat::Int };
        let writer = WavWriter::new(BufWriter::new(file), spec).map_err(VoiceError::write_failed)?;

        Ok(PendingArtifact { writer: Some(writer), tmp, target: path.to_path_buf(), write_error: None })
    }

    #[cfg(not(test))]
    fn writable_handle(&self, tmp: &NamedTempFile) -> io::Result<File> {
        tmp.as_file().try_clone()
    }

    #[cfg(test)]
    fn writable_handle(&self, tmp: &NamedTempFile) -> io::Result<File> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return File::open(tmp.path());
        }
        tmp.as_file().try_clone()
    }

    /// Map a client-supplied filename to a path inside the store.
    ///
    /// # Errors
    /// `InvalidPath` for anything that is not a plain, visible file name or
    /// that resolves outside the directory.
    pub fn resolve(&self, filename: &str) -> Result<ResolvedArtifact, VoiceError> {
        validate_filename(filename)?;

        let candidate = self.root.join(filename);
        match candidate.canonicalize() {
            Ok(real) if !real.starts_with(&self.root) => Err(VoiceError::InvalidPath(filename.to_string())),
            Ok(real) => {
                let exists = real.is_file();
                Ok(ResolvedArtifact { path: real, exists })
            }
            Err(_) => Ok(ResolvedArtifact { path: candidate, exists: false }),
        }
    }

    /// Size of the file at `path`.
    pub fn stat(&self, path: &Path) -> Result<u64, VoiceError> {
        fs::metadata(path).map(|m| m.len()).map_err(|_| VoiceError::ArtifactNotFound(path.to_path_buf()))
    }
}

fn validate_filename(filename: &str) -> Result<(), VoiceError> {
    let invalid = || VoiceError::InvalidPath(filename.to_string());

    if filename.is_empty() || filename.starts_with('.') || filename.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

/// An artifact being written. Dropping it without `commit` discards the file.
pub struct PendingArtifact {
    writer: Option<WavWriter<BufWriter<File>>>, // dropped before `tmp`
    tmp: NamedTempFile,
    target: PathBuf,
    write_error: Option<String>,
}

impl PendingArtifact {
    /// Final location of the artifact.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// First error hit while writing samples, if any.
    pub fn write_error(&self) -> Option<&str> {
        self.write_error.as_deref()
    }

    /// Finish the WAV and move it to its final name.
    ///
    /// Fails instead of overwriting if the target already exists.
    pub fn commit(mut self) -> Result<SynthesisArtifact, VoiceError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(VoiceError::write_failed)?;
        }
        self.tmp.as_file().sync_all().map_err(VoiceError::write_failed)?;

        let target = self.target;
        self.tmp.persist_noclobber(&target).map_err(|e| VoiceError::write_failed(e.error))?;

        let size_bytes = fs::metadata(&target).map_err(VoiceError::write_failed)?.len();
        let filename = target.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

        Ok(SynthesisArtifact { filename, path: target, size_bytes, created_at: OffsetDateTime::now_utc() })
    }
}

impl AudioSink for PendingArtifact {
    fn write_samples(&mut self, samples: &[f32]) -> io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| io::Error::other("artifact already finalized"))?;
        for sample in samples {
            let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            if let Err(e) = writer.write_sample(scaled) {
                let err = io::Error::other(e);
                self.write_error.get_or_insert_with(|| err.to_string());
                return Err(err);
            }
        }
        Ok(())
    }
}
