//! Rendering the first page of a PDF with Poppler.

use std::{collections::BTreeMap, sync::LazyLock};

use clap::Args;
use image::{DynamicImage, ImageFormat};
use regex::Regex;
use tokio::process::Command;

use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    prelude::*,
};

use super::ExtractError;

/// The only input type we accept.
const PDF_MIME_TYPE: &str = "application/pdf";

/// A default error regex for checking command output.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// Poppler complains about damaged cross-reference tables it can repair.
static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this line contain an error?
fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// Options for rendering pages.
#[derive(Args, Clone, Debug)]
pub struct RasterizeOptions {
    /// Resolution of the rendered page. Template regions are in pixels at
    /// this resolution, so changing it moves every region.
    #[clap(long, default_value = "300")]
    pub dpi: u32,
}

impl Default for RasterizeOptions {
    fn default() -> Self {
        Self { dpi: 300 }
    }
}

/// Render page 1 of `path` at the configured resolution.
///
/// Fails with [`ExtractError::NoPages`] for an empty document,
/// [`ExtractError::Io`] if the file or a helper program cannot be read or run,
/// and [`ExtractError::Decode`] for anything that is not a renderable PDF.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), dpi = options.dpi))]
pub async fn render_first_page(
    path: &Path,
    options: &RasterizeOptions,
) -> Result<DynamicImage, ExtractError> {
    let io_error = |source: anyhow::Error| ExtractError::Io {
        path: path.to_owned(),
        source: source.into(),
    };
    let decode_error = |source: anyhow::Error| ExtractError::Decode {
        path: path.to_owned(),
        source: source.into(),
    };

    tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to open {:?}", path.display()))
        .map_err(io_error)?;
    let mime_type = get_mime_type(path).map_err(io_error)?;
    if mime_type.as_deref() != Some(PDF_MIME_TYPE) {
        return Err(decode_error(anyhow!(
            "expected a PDF, found {}",
            mime_type.as_deref().unwrap_or("unknown file type"),
        )));
    }

    let total_pages = get_pdf_page_count(path).await?;
    if total_pages == 0 {
        return Err(ExtractError::NoPages(path.to_owned()));
    }
    debug!(total_pages, "Rendering page 1");

    // Create a temporary directory to hold the PNG file.
    let tmpdir = tempfile::TempDir::with_prefix("page")
        .context("failed to create temporary directory")
        .map_err(io_error)?;
    let out_root = tmpdir.path().join("page");

    // With `-singlefile`, pdftocairo appends only the extension.
    let output = Command::new("pdftocairo")
        .arg("-png")
        .arg("-singlefile")
        .args(["-f", "1", "-l", "1"])
        .arg("-r")
        .arg(options.dpi.to_string())
        .arg(path)
        .arg(&out_root)
        .output()
        .await
        .with_context(|| format!("failed to run pdftocairo on {:?}", path.display()))
        .map_err(io_error)?;
    check_for_command_failure("pdftocairo", &output, Some(&is_error_line))
        .map_err(decode_error)?;

    let png_path = out_root.with_extension("png");
    let png = tokio::fs::read(&png_path)
        .await
        .with_context(|| format!("failed to read rendered page {:?}", png_path.display()))
        .map_err(io_error)?;
    let image = spawn_blocking_propagating_panics(move || {
        image::load_from_memory_with_format(&png, ImageFormat::Png)
    })
    .await
    .context("failed to decode rendered page")
    .map_err(decode_error)?;
    debug!(width = image.width(), height = image.height(), "Rendered page");
    Ok(image)
}

/// Get the number of pages in a PDF file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
async fn get_pdf_page_count(path: &Path) -> Result<usize, ExtractError> {
    let output = Command::new("pdfinfo")
        .arg(path)
        .output()
        .await
        .with_context(|| format!("failed to run pdfinfo on {:?}", path.display()))
        .map_err(|source| ExtractError::Io {
            path: path.to_owned(),
            source: source.into(),
        })?;
    parse_page_count(path, &output).map_err(|source| ExtractError::Decode {
        path: path.to_owned(),
        source: source.into(),
    })
}

/// Check `pdfinfo` output and pull out the page count.
fn parse_page_count(path: &Path, output: &std::process::Output) -> Result<usize> {
    check_for_command_failure("pdfinfo", output, None)?;

    // Parse the output of pdfinfo into properties.
    let output = std::str::from_utf8(&output.stdout)
        .context("pdfinfo output was not valid UTF-8")?;
    let mut properties = BTreeMap::new();
    for line in output.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        properties.insert(key, value);
    }

    let page_count_str = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?;
    page_count_str.parse::<usize>().with_context(|| {
        format!(
            "failed to parse page count for {:?} from pdfinfo output",
            path.display()
        )
    })
}

/// Sniff the MIME type of a file from its contents.
fn get_mime_type(path: &Path) -> Result<Option<String>> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to get MIME type for {:?}", path.display()))?
        .map(|kind| kind.mime_type().to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_PDF_PATH: &str = "tests/fixtures/report.pdf";

    #[cfg(unix)]
    fn pdfinfo_output(stdout: &str) -> std::process::Output {
        use std::os::unix::process::ExitStatusExt as _;
        std::process::Output {
            status: std::process::ExitStatus::from_raw(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: vec![],
        }
    }

    #[test]
    fn is_error_line_works() {
        assert!(is_error_line("error: something went wrong"));
        assert!(is_error_line("Syntax Error: Couldn't find trailer dictionary"));
        assert!(!is_error_line("Warning: something is odd"));
        assert!(!is_error_line(
            "Internal Error: xref num 1234 not found but needed, try to reconstruct"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn page_count_is_parsed_from_pdfinfo() {
        let output = pdfinfo_output("Producer: test\nPages:          3\nEncrypted: no\n");
        assert_eq!(parse_page_count(Path::new("x.pdf"), &output).unwrap(), 3);

        let output = pdfinfo_output("Pages: 0\n");
        assert_eq!(parse_page_count(Path::new("x.pdf"), &output).unwrap(), 0);

        let output = pdfinfo_output("Producer: test\n");
        assert!(parse_page_count(Path::new("x.pdf"), &output).is_err());
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let result =
            render_first_page(Path::new("/nonexistent/report.pdf"), &RasterizeOptions::default())
                .await;
        assert!(matches!(result, Err(ExtractError::Io { .. })));
    }

    #[tokio::test]
    async fn non_pdf_is_decode_error() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("rasterize-test")?;
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"plain text, not a PDF")?;
        let result = render_first_page(&path, &RasterizeOptions::default()).await;
        assert!(matches!(result, Err(ExtractError::Decode { .. })));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn renders_first_page_at_requested_dpi() -> Result<()> {
        let low = render_first_page(Path::new(TEST_PDF_PATH), &RasterizeOptions { dpi: 72 })
            .await?;
        let high = render_first_page(Path::new(TEST_PDF_PATH), &RasterizeOptions { dpi: 144 })
            .await?;
        assert!(high.width() > low.width());
        assert!(high.height() > low.height());
        Ok(())
    }
}
