//! Curriculum documents on local disk.
//!
//! Courses only hold a path relative to the media root. The file behind it can
//! disappear without the database noticing, so every read goes through
//! [`CurriculumStore::inspect`] first.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::Course;
use crate::slug::slugify;

const BLOCKED_EXTENSIONS: [&str; 5] = [".exe", ".bat", ".cmd", ".scr", ".pif"];

/// What a course's curriculum reference resolves to on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurriculumFile {
    /// The course has no curriculum reference.
    Absent,
    /// The course references a file that is no longer in storage.
    Missing { name: String },
    Present {
        name: String,
        path: PathBuf,
        size: u64,
    },
}

/// A curriculum document loaded into memory for transfer or attachment.
#[derive(Debug, Clone)]
pub struct CurriculumDocument {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CurriculumStore {
    media_root: PathBuf,
    max_bytes: u64,
}

impl CurriculumStore {
    pub fn new(media_root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            media_root: media_root.into(),
            max_bytes,
        }
    }

    /// Resolves a course's curriculum reference against storage.
    pub async fn inspect(&self, course: &Course) -> CurriculumFile {
        let Some(name) = course.curriculum_file.as_deref() else {
            debug!(slug = %course.slug, "course has no curriculum file");
            return CurriculumFile::Absent;
        };

        let Some(path) = self.resolve(name) else {
            warn!(slug = %course.slug, file = %name, "curriculum reference escapes media root");
            return CurriculumFile::Missing {
                name: name.to_string(),
            };
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => CurriculumFile::Present {
                name: name.to_string(),
                path,
                size: meta.len(),
            },
            Ok(_) | Err(_) => {
                warn!(
                    slug = %course.slug,
                    file = %name,
                    "curriculum file referenced by course is missing from storage"
                );
                CurriculumFile::Missing {
                    name: name.to_string(),
                }
            }
        }
    }

    /// Reads the course's curriculum into memory. `Ok(None)` when absent or missing on disk.
    pub async fn load(&self, course: &Course) -> Result<Option<CurriculumDocument>, AppError> {
        let CurriculumFile::Present { path, .. } = self.inspect(course).await else {
            return Ok(None);
        };

        let bytes = tokio::fs::read(&path).await?;
        let filename = course
            .curriculum_filename()
            .unwrap_or_else(|| format!("{}_Curriculum", course.title));

        Ok(Some(CurriculumDocument {
            filename,
            content_type: content_type_for(&path),
            bytes,
        }))
    }

    /// Validates and writes an uploaded curriculum file, returning its path relative to the media root.
    pub async fn store(
        &self,
        course_slug: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, AppError> {
        if bytes.len() as u64 > self.max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File size cannot exceed {}MB.",
                self.max_bytes / (1024 * 1024)
            )));
        }

        let base_name = Path::new(original_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("curriculum");
        let (stem, ext) = split_extension(base_name);
        if BLOCKED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return Err(AppError::BadRequest(
                "This file type is not allowed for security reasons.".to_string(),
            ));
        }

        let mut clean_stem = slugify(stem);
        if clean_stem.is_empty() {
            clean_stem = "curriculum".to_string();
        }
        let dir = format!("curriculum_files/{}", course_slug);
        tokio::fs::create_dir_all(self.media_root.join(&dir)).await?;

        // same name within the same second gets a numeric suffix instead of overwriting
        let stamp = format!("{}_{}", clean_stem, Utc::now().timestamp());
        let mut attempt = 0u32;
        let relative = loop {
            let candidate = match attempt {
                0 => format!("{}/{}{}", dir, stamp, ext),
                n => format!("{}/{}_{}{}", dir, stamp, n, ext),
            };
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.media_root.join(&candidate))
                .await;
            match opened {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    break candidate;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(file = %candidate, "curriculum file name taken");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        info!(slug = %course_slug, file = %relative, size = bytes.len(), "stored curriculum file");
        Ok(relative)
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir)
        });
        if escapes {
            return None;
        }
        Some(self.media_root.join(relative))
    }
}

/// Splits `name.ext` into (`name`, `.ext`). Dotfiles have no extension.
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx..]),
        _ => (file_name, ""),
    }
}

/// Content type guessed from the extension, `application/octet-stream` otherwise.
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

/// Human-readable size with base-1024 units: 0 → "0 B", 1536 → "1.5 KB".
pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut index = 0;
    let mut value = size_bytes as f64;
    while value >= 1024.0 && index < UNITS.len() - 1 {
        value /= 1024.0;
        index += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{:.1} {}", rounded, UNITS[index])
    } else {
        format!("{} {}", rounded, UNITS[index])
    }
}
