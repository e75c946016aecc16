//! I/O utilities.
//!
//! We read template files in either JSON or TOML, and we write JSON records to
//! either a file or standard output.

use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt as _, BufWriter},
};

use crate::prelude::*;

/// Does this text look like JSON rather than TOML?
fn looks_like_json(path: &Path, data: &str) -> bool {
    let ext = path.extension().unwrap_or_default();
    ext == "json" || (ext != "toml" && data.trim_start().starts_with('{'))
}

/// Read TOML or JSON from a file.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    if looks_like_json(path, &data) {
        serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        toml::from_str(&data).with_context(|| {
            format!("Failed to parse TOML from file at path: {:?}", path)
        })
    }
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a single value as pretty-printed JSON to either standard output or a
/// file.
pub async fn write_json<T>(path: Option<&Path>, value: &T) -> Result<()>
where
    T: Serialize,
{
    let mut writer = BufWriter::new(create_writer(path).await?);
    let json =
        serde_json::to_string_pretty(value).context("Failed to serialize JSON output")?;
    writer
        .write_all(json.as_bytes())
        .await
        .context("Failed to write JSON to output")?;
    writer
        .write_all(b"\n")
        .await
        .context("Failed to write newline to output")?;
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[tokio::test]
    async fn reads_toml_and_json() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io-test")?;

        let toml_path = dir.path().join("fields.toml");
        std::fs::write(&toml_path, "order = \"10,20,30,40\"\n")?;
        let from_toml: BTreeMap<String, String> = read_json_or_toml(&toml_path).await?;
        assert_eq!(from_toml["order"], "10,20,30,40");

        let json_path = dir.path().join("fields.txt");
        std::fs::write(&json_path, "  {\"order\": \"1,2,3,4\"}")?;
        let from_json: BTreeMap<String, String> = read_json_or_toml(&json_path).await?;
        assert_eq!(from_json["order"], "1,2,3,4");
        Ok(())
    }

    #[tokio::test]
    async fn writes_json_file() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io-test")?;
        let path = dir.path().join("out.json");
        write_json(Some(&path), &serde_json::json!({ "status": "ok" })).await?;
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(written["status"], "ok");
        Ok(())
    }
}
