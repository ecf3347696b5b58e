//! Request/response operations behind a front end.
//!
//! These are the compress and decompress calls a transport (an HTTP handler,
//! the CLI) forwards to, with the defaulting rules applied: output names
//! derived from the inputs, out-of-range levels reset, extraction directories
//! reduced to a single sanitized name under the working directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sanitize::sanitize_directory_name;
use crate::{Compression, PackOptions};

pub const DEFAULT_LEVEL: i32 = 3;
pub const MIN_LEVEL: i32 = 1;
pub const MAX_LEVEL: i32 = 19;
pub const ARCHIVE_SUFFIX: &str = ".zst";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressRequest {
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub level: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompressRequest {
    pub archive: String,
    #[serde(default)]
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Response<T> {
    fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionStats {
    pub original_size: u64,
    pub compressed_size: u64,
    /// Compressed size as a percentage of the original, 0 for empty input
    pub compression_ratio: f64,
    pub duration: String,
    pub output_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSummary {
    pub extracted_files: u64,
    pub output_dir: PathBuf,
}

/// Packs the requested files into a zstd archive.
pub fn compress(request: &CompressRequest) -> Result<CompressionStats> {
    if request.files.is_empty() {
        return Err(Error::NoSources);
    }
    let output = output_name(&request.files, &request.output);
    let options = PackOptions::default()
        .compression(Compression::Zstd)
        .level(normalize_level(request.level));
    let stats = crate::pack(&output, &request.files, &options)?;
    Ok(CompressionStats {
        original_size: stats.original_size,
        compressed_size: stats.compressed_size,
        compression_ratio: stats.ratio(),
        duration: format!("{:?}", stats.duration),
        output_file: output,
    })
}

/// Extracts the requested archive into a directory under the working
/// directory.
pub fn decompress(request: &DecompressRequest) -> Result<ExtractionSummary> {
    if request.archive.is_empty() {
        return Err(Error::NoArchive);
    }
    let dir_name = output_dir_name(&request.archive, &request.output_dir);
    let report = crate::unpack(&request.archive, &dir_name)?;
    Ok(ExtractionSummary {
        extracted_files: report.extracted_files,
        output_dir: report.destination,
    })
}

pub fn handle_compress(request: &CompressRequest) -> Response<CompressionStats> {
    match compress(request) {
        Ok(stats) => Response::ok("Compression completed successfully", stats),
        Err(Error::NoSources) => Response::failed("No files selected"),
        Err(e) => Response::failed(format!("Compression failed: {}", e)),
    }
}

pub fn handle_decompress(request: &DecompressRequest) -> Response<ExtractionSummary> {
    match decompress(request) {
        Ok(summary) => {
            let dir_name = summary
                .output_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let message = format!(
                "Decompression completed. Extracted {} files to {}",
                summary.extracted_files, dir_name
            );
            Response::ok(message, summary)
        }
        Err(Error::NoArchive) => Response::failed("No archive file specified"),
        Err(e) => Response::failed(format!("Decompression failed: {}", e)),
    }
}

/// Output file name: the requested one, else derived from a single input's
/// stem or `archive`; always ending in `.zst`.
pub fn output_name(files: &[PathBuf], requested: &str) -> String {
    let mut output = if !requested.is_empty() {
        requested.to_string()
    } else if let [single] = files {
        let stem = single
            .file_stem()
            .or_else(|| single.file_name())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        format!("{}{}", stem, ARCHIVE_SUFFIX)
    } else {
        format!("archive{}", ARCHIVE_SUFFIX)
    };
    if !output.ends_with(ARCHIVE_SUFFIX) {
        output.push_str(ARCHIVE_SUFFIX);
    }
    output
}

/// Levels outside `MIN_LEVEL..=MAX_LEVEL` fall back to `DEFAULT_LEVEL`.
pub fn normalize_level(level: i32) -> i32 {
    if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
        level
    } else {
        DEFAULT_LEVEL
    }
}

/// Single-component directory name for an extraction.
pub fn output_dir_name(archive: &str, requested: &str) -> String {
    let name = if requested.is_empty() {
        let base = Path::new(archive)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let base = base.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(&base);
        format!("{}_extracted", sanitize_directory_name(base))
    } else {
        sanitize_directory_name(requested)
    };
    // Separators are already gone; this only guards the contract
    Path::new(&name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn output_names() {
        let one = vec![PathBuf::from("/data/report.pdf")];
        let two = vec![PathBuf::from("a"), PathBuf::from("b")];
        assert_eq!(output_name(&one, ""), "report.zst");
        assert_eq!(output_name(&[PathBuf::from("/data/photos")], ""), "photos.zst");
        assert_eq!(output_name(&two, ""), "archive.zst");
        assert_eq!(output_name(&two, "backup"), "backup.zst");
        assert_eq!(output_name(&two, "backup.zst"), "backup.zst");
    }

    #[test]
    fn levels() {
        assert_eq!(normalize_level(0), DEFAULT_LEVEL);
        assert_eq!(normalize_level(20), DEFAULT_LEVEL);
        assert_eq!(normalize_level(-5), DEFAULT_LEVEL);
        assert_eq!(normalize_level(1), 1);
        assert_eq!(normalize_level(19), 19);
    }

    #[test]
    fn output_dir_names() {
        assert_eq!(output_dir_name("/tmp/up/photos.zst", ""), "photos_extracted");
        assert_eq!(output_dir_name("backup.tar", ""), "backup.tar_extracted");
        assert_eq!(output_dir_name("x.zst", "../../etc"), "_.._etc");
        assert_eq!(output_dir_name("x.zst", "my:files"), "my_files");
        assert_eq!(output_dir_name("x.zst", "..."), "extracted");
    }

    #[test]
    fn empty_requests_fail_early() {
        let response = handle_compress(&CompressRequest::default());
        assert!(!response.success);
        assert_eq!(response.message, "No files selected");
        assert!(response.data.is_none());

        let response = handle_decompress(&DecompressRequest::default());
        assert!(!response.success);
        assert_eq!(response.message, "No archive file specified");
    }

    #[test]
    fn compress_reports_stats() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        fs::write(&file, "zstd ".repeat(1000)).unwrap();
        let request = CompressRequest {
            files: vec![file],
            output: dir.path().join("out").to_string_lossy().into_owned(),
            level: 99,
        };
        let response = handle_compress(&request);
        assert!(response.success, "{}", response.message);
        let stats = response.data.unwrap();
        assert_eq!(stats.original_size, 5000);
        assert!(stats.output_file.ends_with("out.zst"));
        assert!(stats.compression_ratio > 0.0 && stats.compression_ratio < 100.0);
        assert!(Path::new(&stats.output_file).exists());
    }

    #[test]
    fn compress_empty_directory_has_zero_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        fs::create_dir(&empty).unwrap();
        let request = CompressRequest {
            files: vec![empty],
            output: dir.path().join("empty.zst").to_string_lossy().into_owned(),
            level: 3,
        };
        let stats = compress(&request).unwrap();
        assert_eq!(stats.original_size, 0);
        assert_eq!(stats.compression_ratio, 0.0);
    }

    #[test]
    fn response_json_shape() {
        let response = Response::ok(
            "done",
            ExtractionSummary {
                extracted_files: 2,
                output_dir: PathBuf::from("/work/out"),
            },
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["extractedFiles"], 2);
        assert_eq!(json["data"]["outputDir"], "/work/out");

        let failed: Response<ExtractionSummary> = Response::failed("nope");
        let json = serde_json::to_value(&failed).unwrap();
        assert!(json.get("data").is_none());
    }

    #[test]
    fn request_json_defaults() {
        let request: CompressRequest = serde_json::from_str(r#"{"files": ["a", "b"]}"#).unwrap();
        assert_eq!(request.files.len(), 2);
        assert_eq!(request.output, "");
        assert_eq!(request.level, 0);

        let request: DecompressRequest =
            serde_json::from_str(r#"{"archive": "a.zst", "outputDir": "x"}"#).unwrap();
        assert_eq!(request.output_dir, "x");
    }
}
