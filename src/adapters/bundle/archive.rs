//! Bundle archive codec: a gzip-compressed tar holding `manifest.json` and
//! one audio file per manifest entry.
//!
//! These functions do blocking file I/O; async callers run them on the
//! blocking pool.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::domain::models::{LocalRecording, RecordingKey, RecordingMeta, TaskType};
use crate::domain::ports::FetchError;

/// Manifest file name at the archive root.
pub const MANIFEST_NAME: &str = "manifest.json";

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Patient ID
    pub patient_id: String,
    /// Attempt number
    pub order_num: i64,
    /// Task type code
    pub assess_type: TaskType,
    /// Question code
    pub question_cd: String,
    /// Question number
    pub question_no: i64,
    /// Take number
    pub question_minor_no: i64,
    /// Duration in seconds
    pub duration: f64,
    /// Sample rate in Hz
    pub rate: u32,
    /// Audio file path inside the archive
    pub relative_path: String,
    /// Capture time, when the producer records it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ManifestEntry {
    /// Manifest row for a recording stored at its conventional path.
    pub fn for_meta(meta: &RecordingMeta) -> Self {
        let key = &meta.key;
        Self {
            patient_id: key.patient_id.clone(),
            order_num: key.attempt,
            assess_type: key.task_type,
            question_cd: key.question_code.clone(),
            question_no: key.question_no,
            question_minor_no: key.sub_attempt,
            duration: meta.duration,
            rate: meta.sample_rate,
            relative_path: relative_path_for(key),
            created_at: meta.created_at,
        }
    }

    /// Recording key of the row.
    pub fn key(&self) -> RecordingKey {
        RecordingKey::new(
            self.patient_id.clone(),
            self.order_num,
            self.assess_type,
            self.question_cd.clone(),
            self.question_no,
            self.question_minor_no,
        )
    }

    /// Recording metadata of the row.
    pub fn meta(&self) -> RecordingMeta {
        RecordingMeta {
            key: self.key(),
            duration: self.duration,
            sample_rate: self.rate,
            created_at: self.created_at,
        }
    }
}

/// Conventional in-archive path of a recording.
pub fn relative_path_for(key: &RecordingKey) -> String {
    format!(
        "{}/{}/{}_{}.wav",
        key.task_type, key.question_code, key.question_no, key.sub_attempt
    )
}

/// Write a bundle of `(entry, audio)` pairs to `out`.
pub fn pack<W: Write>(entries: &[(ManifestEntry, Vec<u8>)], out: W) -> std::io::Result<W> {
    let mut builder = tar::Builder::new(GzEncoder::new(out, Compression::default()));

    let manifest: Vec<&ManifestEntry> = entries.iter().map(|(entry, _)| entry).collect();
    let manifest = serde_json::to_vec_pretty(&manifest)?;
    append_file(&mut builder, MANIFEST_NAME, &manifest)?;

    for (entry, audio) in entries {
        append_file(&mut builder, &entry.relative_path, audio)?;
    }

    builder.into_inner()?.finish()
}

fn append_file<W: Write>(builder: &mut tar::Builder<W>, path: &str, data: &[u8]) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, data)
}

/// Unpack the bundle at `archive` into `dest` and validate it.
///
/// `dest` is created if missing. When `expect` is given every manifest entry
/// must belong to that (patient, attempt). Returned recordings follow
/// manifest order.
pub fn unpack(
    archive: &Path,
    dest: &Path,
    expect: Option<(&str, i64)>,
) -> Result<Vec<LocalRecording>, FetchError> {
    let file = File::open(archive)?;
    unpack_from(file, dest, expect)
}

/// [`unpack`] over any gzip stream.
pub fn unpack_from<R: Read>(
    reader: R,
    dest: &Path,
    expect: Option<(&str, i64)>,
) -> Result<Vec<LocalRecording>, FetchError> {
    // unpack_in needs an existing root
    std::fs::create_dir_all(dest)?;
    let mut tar = tar::Archive::new(GzDecoder::new(reader));
    let mut manifest: Option<Vec<ManifestEntry>> = None;

    let entries = tar.entries().map_err(malformed)?;
    for entry in entries {
        let mut entry = entry.map_err(malformed)?;
        let path = entry.path().map_err(malformed)?.into_owned();
        if !is_contained(&path) {
            return Err(FetchError::Malformed(format!(
                "archive entry escapes bundle root: {}",
                path.display()
            )));
        }

        if path == Path::new(MANIFEST_NAME) {
            let mut raw = Vec::new();
            entry.read_to_end(&mut raw).map_err(malformed)?;
            let parsed = serde_json::from_slice(&raw)
                .map_err(|e| FetchError::Malformed(format!("unreadable manifest: {e}")))?;
            manifest = Some(parsed);
        } else if entry.header().entry_type().is_file() || entry.header().entry_type().is_dir() {
            // contained paths were checked above; unpack_in rejects the rest
            if !entry.unpack_in(dest).map_err(malformed)? {
                return Err(FetchError::Malformed(format!(
                    "archive entry escapes bundle root: {}",
                    path.display()
                )));
            }
        }
    }

    let manifest = manifest
        .ok_or_else(|| FetchError::Malformed(format!("{MANIFEST_NAME} missing from bundle")))?;
    resolve_manifest(manifest, dest, expect)
}

fn resolve_manifest(
    manifest: Vec<ManifestEntry>,
    root: &Path,
    expect: Option<(&str, i64)>,
) -> Result<Vec<LocalRecording>, FetchError> {
    manifest
        .into_iter()
        .map(|entry| {
            if let Some((patient_id, attempt)) = expect {
                if entry.patient_id != patient_id || entry.order_num != attempt {
                    return Err(FetchError::Malformed(format!(
                        "manifest entry {} does not belong to {patient_id}/{attempt}",
                        entry.key()
                    )));
                }
            }

            let relative = PathBuf::from(&entry.relative_path);
            if !is_contained(&relative) {
                return Err(FetchError::Malformed(format!(
                    "manifest path escapes bundle root: {}",
                    entry.relative_path
                )));
            }
            let path = root.join(&relative);
            if !path.is_file() {
                return Err(FetchError::Malformed(format!(
                    "manifest lists {} but the bundle has no such file",
                    entry.relative_path
                )));
            }

            Ok(LocalRecording {
                meta: entry.meta(),
                path,
            })
        })
        .collect()
}

/// Relative, with no `..`, root or drive components.
fn is_contained(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn malformed(err: std::io::Error) -> FetchError {
    FetchError::Malformed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pid: &str, attempt: i64, code: &str, qno: i64) -> ManifestEntry {
        ManifestEntry::for_meta(&RecordingMeta {
            key: RecordingKey::new(pid, attempt, TaskType::Language, code, qno, 0),
            duration: 1.5,
            sample_rate: 16_000,
            created_at: None,
        })
    }

    fn bundle(entries: &[(ManifestEntry, Vec<u8>)]) -> Vec<u8> {
        pack(entries, Vec::new()).unwrap()
    }

    #[test]
    fn test_unpack_materializes_every_entry() {
        let bytes = bundle(&[
            (entry("1001", 1, "SAY_ANI", 0), b"RIFFaaaa".to_vec()),
            (entry("1001", 1, "TALK_PIC", 0), b"RIFFbbbb".to_vec()),
        ]);
        let dir = tempfile::tempdir().unwrap();

        let recordings = unpack_from(bytes.as_slice(), dir.path(), Some(("1001", 1))).unwrap();
        assert_eq!(recordings.len(), 2);
        assert_eq!(recordings[0].key().question_code, "SAY_ANI");
        assert_eq!(std::fs::read(&recordings[1].path).unwrap(), b"RIFFbbbb");
        assert!(recordings[0].path.starts_with(dir.path()));
    }

    #[test]
    fn test_unpack_creates_missing_destination() {
        let bytes = bundle(&[(entry("1001", 1, "SAY_ANI", 0), b"RIFFaaaa".to_vec())]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("audio").join("nested");

        let recordings = unpack_from(bytes.as_slice(), &dest, Some(("1001", 1))).unwrap();
        assert_eq!(recordings.len(), 1);
        assert!(recordings[0].path.starts_with(&dest));
        assert_eq!(std::fs::read(&recordings[0].path).unwrap(), b"RIFFaaaa");
    }

    #[test]
    fn test_missing_manifest_is_malformed() {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        append_file(&mut builder, "CLAP-A/SAY_ANI/0_0.wav", b"x").unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = unpack_from(bytes.as_slice(), dir.path(), None).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(msg) if msg.contains("manifest")));
    }

    #[test]
    fn test_manifest_listing_absent_file_is_malformed() {
        let listed = entry("1001", 1, "SAY_ANI", 0);
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        append_file(&mut builder, MANIFEST_NAME, &serde_json::to_vec(&[listed]).unwrap()).unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            unpack_from(bytes.as_slice(), dir.path(), None),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn test_foreign_attempt_is_malformed() {
        let bytes = bundle(&[(entry("1001", 2, "SAY_ANI", 0), b"x".to_vec())]);
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            unpack_from(bytes.as_slice(), dir.path(), Some(("1001", 1))),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn test_escaping_manifest_path_is_malformed() {
        let mut escaping = entry("1001", 1, "SAY_ANI", 0);
        escaping.relative_path = "../outside.wav".to_string();
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        append_file(&mut builder, MANIFEST_NAME, &serde_json::to_vec(&[escaping]).unwrap()).unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            unpack_from(bytes.as_slice(), dir.path(), None),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            unpack_from(&b"definitely not gzip"[..], dir.path(), None),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn test_manifest_uses_upstream_field_names() {
        let json = serde_json::to_value(entry("1001", 3, "GUESS_END", 2)).unwrap();
        assert_eq!(json["order_num"], 3);
        assert_eq!(json["assess_type"], "CLAP-A");
        assert_eq!(json["question_cd"], "GUESS_END");
        assert_eq!(json["relative_path"], "CLAP-A/GUESS_END/2_0.wav");
    }
}
