//! Zip snapshots of the local mirror
//!
//! The coordinator only sees the [`Archiver`] trait; [`ZipArchiver`] is the
//! default implementation. Both directions preserve empty files and empty
//! directories.

use ignore::WalkBuilder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ArchiveError;
use crate::logging::*;

/// Zip/unzip capability
pub trait Archiver: Send + Sync {
	/// Write the tree under `source` into a new archive at `archive`
	fn zip_dir(&self, source: &Path, archive: &Path) -> Result<(), ArchiveError>;

	/// Extract `archive` into `dest`, creating it if needed
	fn unzip(&self, archive: &Path, dest: &Path) -> Result<(), ArchiveError>;
}

/// Run [`Archiver::zip_dir`] on the blocking pool
pub async fn zip_dir_blocking(
	archiver: Arc<dyn Archiver>,
	source: PathBuf,
	archive: PathBuf,
) -> Result<(), ArchiveError> {
	tokio::task::spawn_blocking(move || archiver.zip_dir(&source, &archive))
		.await
		.map_err(|e| ArchiveError::Task { message: e.to_string() })?
}

/// Run [`Archiver::unzip`] on the blocking pool
pub async fn unzip_blocking(
	archiver: Arc<dyn Archiver>,
	archive: PathBuf,
	dest: PathBuf,
) -> Result<(), ArchiveError> {
	tokio::task::spawn_blocking(move || archiver.unzip(&archive, &dest))
		.await
		.map_err(|e| ArchiveError::Task { message: e.to_string() })?
}

/// Deflate-compressed zip archives
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
	fn zip_dir(&self, source: &Path, archive: &Path) -> Result<(), ArchiveError> {
		// Build beside the target so a half-written archive never carries a snapshot name
		let partial = partial_path(archive);
		let result = write_archive(source, &partial)
			.and_then(|_| fs::rename(&partial, archive).map_err(|e| io_err(archive, e)));
		if result.is_err() {
			let _ = fs::remove_file(&partial);
		}
		result?;

		info!("Zipped {} into {}", source.display(), archive.display());
		Ok(())
	}

	fn unzip(&self, archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
		let file = File::open(archive).map_err(|e| io_err(archive, e))?;
		let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|e| zip_err(archive, e))?;

		fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;

		for i in 0..zip.len() {
			let mut entry = zip.by_index(i).map_err(|e| zip_err(archive, e))?;

			let outpath = match entry.enclosed_name() {
				Some(path) => dest.join(path),
				None => {
					warn!("Skipping unsafe entry {:?} in {}", entry.name(), archive.display());
					continue;
				}
			};

			if entry.is_dir() {
				fs::create_dir_all(&outpath).map_err(|e| io_err(&outpath, e))?;
				continue;
			}

			if let Some(parent) = outpath.parent() {
				fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
			}
			let mut out = File::create(&outpath).map_err(|e| io_err(&outpath, e))?;
			io::copy(&mut entry, &mut out).map_err(|e| io_err(&outpath, e))?;
		}

		debug!("Unzipped {} entries from {} into {}", zip.len(), archive.display(), dest.display());
		Ok(())
	}
}

fn write_archive(source: &Path, target: &Path) -> Result<(), ArchiveError> {
	let file = File::create(target).map_err(|e| io_err(target, e))?;
	let mut zip = ZipWriter::new(BufWriter::new(file));
	let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

	let walker = WalkBuilder::new(source)
		.standard_filters(false)
		.follow_links(false)
		.sort_by_file_name(|a, b| a.cmp(b))
		.build();

	for entry in walker {
		let entry = entry.map_err(|e| ArchiveError::Io {
			path: source.display().to_string(),
			source: io::Error::other(e.to_string()),
		})?;
		if entry.depth() == 0 {
			continue;
		}

		let path = entry.path();
		let name = entry_name(source, path)?;
		let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

		if is_dir {
			zip.add_directory(format!("{}/", name), options).map_err(|e| zip_err(target, e))?;
		} else {
			zip.start_file(name, options).map_err(|e| zip_err(target, e))?;
			let mut input = File::open(path).map_err(|e| io_err(path, e))?;
			io::copy(&mut input, &mut zip).map_err(|e| io_err(path, e))?;
		}
	}

	let writer = zip.finish().map_err(|e| zip_err(target, e))?;
	let file = writer.into_inner().map_err(|e| io_err(target, e.into_error()))?;
	file.sync_all().map_err(|e| io_err(target, e))?;
	Ok(())
}

/// Archive entry name: relative path with `/` separators
fn entry_name(root: &Path, path: &Path) -> Result<String, ArchiveError> {
	let relative = path.strip_prefix(root).map_err(|e| ArchiveError::Io {
		path: path.display().to_string(),
		source: io::Error::other(e.to_string()),
	})?;
	let parts: Vec<String> =
		relative.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
	Ok(parts.join("/"))
}

fn partial_path(archive: &Path) -> PathBuf {
	let mut name = archive.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	name.push(".partial");
	archive.with_file_name(name)
}

fn io_err(path: &Path, source: io::Error) -> ArchiveError {
	ArchiveError::Io { path: path.display().to_string(), source }
}

fn zip_err(path: &Path, e: zip::result::ZipError) -> ArchiveError {
	ArchiveError::Zip { path: path.display().to_string(), message: e.to_string() }
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn build_tree(root: &Path) {
		fs::create_dir_all(root.join("audio/en/empty")).unwrap();
		fs::create_dir_all(root.join("meta")).unwrap();
		fs::write(root.join("audio/en/a.a18"), vec![7u8; 4096]).unwrap();
		fs::write(root.join("meta/db.properties"), "version=3\n").unwrap();
		fs::write(root.join("meta/.hidden"), "x").unwrap();
		fs::write(root.join("zero.txt"), "").unwrap();
	}

	#[test]
	fn test_zip_unzip_preserves_tree() {
		let dir = TempDir::new().unwrap();
		let src = dir.path().join("src");
		let out = dir.path().join("out");
		build_tree(&src);

		let archive = dir.path().join("db1.zip");
		ZipArchiver.zip_dir(&src, &archive).unwrap();
		assert!(archive.is_file());
		assert!(!dir.path().join("db1.zip.partial").exists());

		ZipArchiver.unzip(&archive, &out).unwrap();
		assert_eq!(fs::read(out.join("audio/en/a.a18")).unwrap(), vec![7u8; 4096]);
		assert_eq!(fs::read_to_string(out.join("meta/db.properties")).unwrap(), "version=3\n");
		assert!(out.join("meta/.hidden").is_file());
		assert!(out.join("audio/en/empty").is_dir());
		assert_eq!(fs::metadata(out.join("zero.txt")).unwrap().len(), 0);
	}

	#[test]
	fn test_empty_mirror_round_trips() {
		let dir = TempDir::new().unwrap();
		let src = dir.path().join("src");
		fs::create_dir_all(&src).unwrap();

		let archive = dir.path().join("db1.zip");
		ZipArchiver.zip_dir(&src, &archive).unwrap();
		ZipArchiver.unzip(&archive, &dir.path().join("out")).unwrap();
		assert!(dir.path().join("out").is_dir());
	}

	#[test]
	fn test_unzip_garbage_fails() {
		let dir = TempDir::new().unwrap();
		let archive = dir.path().join("db1.zip");
		fs::write(&archive, "not a zip").unwrap();
		let err = ZipArchiver.unzip(&archive, &dir.path().join("out")).unwrap_err();
		assert!(matches!(err, ArchiveError::Zip { .. }));
	}

	#[test]
	fn test_zip_missing_source_leaves_nothing() {
		let dir = TempDir::new().unwrap();
		let archive = dir.path().join("db2.zip");
		assert!(ZipArchiver.zip_dir(&dir.path().join("missing"), &archive).is_err());
		assert!(!archive.exists());
		assert!(!dir.path().join("db2.zip.partial").exists());
	}

	#[tokio::test]
	async fn test_blocking_helpers() {
		let dir = TempDir::new().unwrap();
		let src = dir.path().join("src");
		build_tree(&src);
		let archiver: Arc<dyn Archiver> = Arc::new(ZipArchiver);

		let archive = dir.path().join("db5.zip");
		zip_dir_blocking(Arc::clone(&archiver), src, archive.clone()).await.unwrap();
		unzip_blocking(archiver, archive, dir.path().join("out")).await.unwrap();
		assert!(dir.path().join("out/zero.txt").exists());
	}
}

// vim: ts=4
