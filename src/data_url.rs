//! Converting rendered page images to `data:` URLs for JSON output.

use base64::{Engine as _, prelude::BASE64_STANDARD};

/// MIME type of every image we embed.
pub const PNG_MIME_TYPE: &str = "image/png";

/// Convert binary data to a `data:` URL.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    let base64_data = BASE64_STANDARD.encode(data);
    format!("data:{};base64,{}", mime_type, base64_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_png_bytes() {
        let url = data_url(PNG_MIME_TYPE, &[0x89, b'P', b'N', b'G']);
        assert_eq!(url, "data:image/png;base64,iVBORw==");
    }
}
